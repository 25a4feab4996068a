use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::cache::TableCache;
use super::meta::{read_meta, META_FILE};
use super::{Database, DbError, StoreChangeEvent};
use crate::excel::ExcelError;

const DEBOUNCE: Duration = Duration::from_millis(500);

/// Watches the store directory for commits by other writers.
///
/// Dropping it stops the background thread.
pub struct StoreWatcher {
    _watcher: RecommendedWatcher,
    running: Arc<AtomicBool>,
}

impl Drop for StoreWatcher {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Database {
    /// Start watching the store. Each observed version increase clears this
    /// handle's cache and sends a `StoreChangeEvent` on `events`.
    pub fn watch(&self, events: Sender<StoreChangeEvent>) -> Result<StoreWatcher, DbError> {
        let dir = self
            .path()
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        let (tx, rx) = channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|e| ExcelError::watch_error(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| ExcelError::watch_error(format!("Failed to watch {}: {}", dir.display(), e)))?;

        let running = Arc::new(AtomicBool::new(true));
        let tracker = ChangeTracker::new(self.path().to_path_buf(), self.version(), DEBOUNCE);
        let cache = Arc::clone(&self.cache);
        let flag = Arc::clone(&running);
        thread::spawn(move || process_watch_events(rx, events, tracker, cache, flag));

        debug!(dir = %dir.display(), "Watching store directory");
        Ok(StoreWatcher {
            _watcher: watcher,
            running,
        })
    }
}

fn process_watch_events(
    rx: Receiver<Result<Event, notify::Error>>,
    events: Sender<StoreChangeEvent>,
    mut tracker: ChangeTracker,
    cache: Arc<TableCache>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(Ok(event)) => {
                if tracker.is_relevant(&event) {
                    tracker.note(Instant::now());
                }
            }
            Ok(Err(e)) => warn!("Store watch error: {}", e),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if let Some(change) = tracker.poll(Instant::now()) {
            cache.invalidate_all();
            debug!(version = change.version, "Store changed on disk");
            if events.send(change).is_err() {
                break;
            }
        }
    }
}

/// Debounces file events and turns version increases into change events.
struct ChangeTracker {
    store: PathBuf,
    last_version: u64,
    pending_since: Option<Instant>,
    debounce: Duration,
}

impl ChangeTracker {
    fn new(store: PathBuf, last_version: u64, debounce: Duration) -> Self {
        ChangeTracker {
            store,
            last_version,
            pending_since: None,
            debounce,
        }
    }

    fn is_relevant(&self, event: &Event) -> bool {
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
            return false;
        }
        let store_name = self.store.file_name();
        event.paths.iter().any(|p| {
            let name = p.file_name();
            name == Some(OsStr::new(META_FILE)) || (name.is_some() && name == store_name)
        })
    }

    fn note(&mut self, now: Instant) {
        self.pending_since = Some(now);
    }

    fn poll(&mut self, now: Instant) -> Option<StoreChangeEvent> {
        let since = self.pending_since?;
        if now.duration_since(since) < self.debounce {
            return None;
        }
        self.pending_since = None;

        let meta = read_meta(&self.store);
        if meta.db_version <= self.last_version {
            return None;
        }
        self.last_version = meta.db_version;
        Some(StoreChangeEvent {
            path: self.store.to_string_lossy().into_owned(),
            version: meta.db_version,
            last_write_ts: meta.last_write_ts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::meta::{bump_version, meta_path_for};
    use notify::event::{CreateKind, ModifyKind};

    fn event(kind: EventKind, path: PathBuf) -> Event {
        Event::new(kind).add_path(path)
    }

    #[test]
    fn test_only_store_and_meta_events_are_relevant() {
        let tracker = ChangeTracker::new(PathBuf::from("/data/db.xlsx"), 0, DEBOUNCE);

        assert!(tracker.is_relevant(&event(EventKind::Modify(ModifyKind::Any), PathBuf::from("/data/db_meta.json"))));
        assert!(tracker.is_relevant(&event(EventKind::Create(CreateKind::File), PathBuf::from("/data/db.xlsx"))));
        assert!(!tracker.is_relevant(&event(EventKind::Modify(ModifyKind::Any), PathBuf::from("/data/db.xlsx.lock"))));
        assert!(!tracker.is_relevant(&event(EventKind::Access(notify::event::AccessKind::Any), PathBuf::from("/data/db.xlsx"))));
    }

    #[test]
    fn test_version_increase_is_reported_once_after_debounce() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("db.xlsx");
        let mut tracker = ChangeTracker::new(store.clone(), 0, DEBOUNCE);

        bump_version(&store).unwrap();
        let start = Instant::now();
        tracker.note(start);

        assert!(tracker.poll(start).is_none());
        let change = tracker.poll(start + DEBOUNCE).unwrap();
        assert_eq!(change.version, 1);
        assert!(change.last_write_ts.is_some());

        tracker.note(start);
        assert!(tracker.poll(start + DEBOUNCE).is_none());
        assert!(meta_path_for(&store).exists());
    }
}
