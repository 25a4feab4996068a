use fs2::FileExt;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::DbError;

/// Anything a region keeps alive while it is held.
pub trait Held {}

impl<T> Held for T {}

/// RAII token for an exclusive region; dropping it releases the hold.
pub struct RegionGuard<'a> {
    _held: Box<dyn Held + 'a>,
}

impl<'a> RegionGuard<'a> {
    pub fn new(held: impl Held + 'a) -> Self {
        RegionGuard {
            _held: Box::new(held),
        }
    }
}

/// A store-wide critical section for writers.
pub trait ExclusiveRegion: Send + Sync {
    /// Block until the region is held or `timeout` elapses.
    fn acquire(&self, timeout: Duration) -> Result<RegionGuard<'_>, DbError>;
}

/// Sidecar lock file for a store: `<store>.lock`.
pub fn lock_path_for(store: &Path) -> PathBuf {
    let mut name = store.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

#[derive(Default)]
struct LockState {
    depth: usize,
    file: Option<File>,
}

/// Reentrant in-process mutex paired with an OS advisory lock on the
/// sidecar file. Only the outermost hold on a thread touches the file lock.
pub struct FileLock {
    lock_path: PathBuf,
    poll: Duration,
    local: ReentrantMutex<RefCell<LockState>>,
}

impl FileLock {
    pub fn new(store: &Path, poll: Duration) -> Self {
        FileLock {
            lock_path: lock_path_for(store),
            poll,
            local: ReentrantMutex::new(RefCell::new(LockState::default())),
        }
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    fn timeout_error(&self, waited: Duration) -> DbError {
        DbError::LockTimeout {
            path: self.lock_path.clone(),
            waited,
        }
    }

    fn lock_file(&self, started: Instant, timeout: Duration) -> Result<File, DbError> {
        if let Some(parent) = self.lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.lock_path)?;
        let contended = fs2::lock_contended_error().raw_os_error();

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(file),
                Err(e) if e.raw_os_error() == contended || e.kind() == std::io::ErrorKind::WouldBlock => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(self.timeout_error(waited));
                    }
                    thread::sleep(self.poll.min(timeout - waited));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl ExclusiveRegion for FileLock {
    fn acquire(&self, timeout: Duration) -> Result<RegionGuard<'_>, DbError> {
        let started = Instant::now();
        let local = self
            .local
            .try_lock_for(timeout)
            .ok_or_else(|| self.timeout_error(started.elapsed()))?;

        {
            let mut state = local.borrow_mut();
            if state.depth == 0 {
                let remaining = timeout.saturating_sub(started.elapsed());
                state.file = Some(self.lock_file(Instant::now(), remaining)?);
                debug!(
                    path = %self.lock_path.display(),
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Acquired store write lock"
                );
            }
            state.depth += 1;
        }

        Ok(RegionGuard::new(FileLockGuard { local }))
    }
}

struct FileLockGuard<'a> {
    local: ReentrantMutexGuard<'a, RefCell<LockState>>,
}

impl Drop for FileLockGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.local.borrow_mut();
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            if let Some(file) = state.file.take() {
                if let Err(e) = FileExt::unlock(&file) {
                    warn!("Failed to release store write lock: {}", e);
                }
            }
        }
    }
}
