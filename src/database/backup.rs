use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

pub const BACKUP_DIR: &str = "backups";

fn stem_and_ext(store: &Path) -> (String, String) {
    let stem = store
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = store
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (stem, ext)
}

pub fn backup_dir_for(store: &Path) -> PathBuf {
    store
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(BACKUP_DIR)
}

/// Copy the store to `backups/<stem>_<YYYYMMDD_HHMMSS><ext>` and prune old
/// snapshots. Never fails: problems are logged and the write goes on.
pub fn backup_store(store: &Path, keep_last: usize) -> Option<PathBuf> {
    if !store.exists() {
        return None;
    }

    let dir = backup_dir_for(store);
    if let Err(e) = fs::create_dir_all(&dir) {
        warn!(dir = %dir.display(), "Failed to create backup directory: {}", e);
        return None;
    }

    let (stem, ext) = stem_and_ext(store);
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let target = dir.join(format!("{}_{}{}", stem, stamp, ext));

    let copied = match fs::copy(store, &target) {
        Ok(_) => {
            debug!(backup = %target.display(), "Backed up store");
            Some(target)
        }
        Err(e) => {
            warn!(store = %store.display(), "Failed to back up store: {}", e);
            None
        }
    };

    prune_backups(store, keep_last);
    copied
}

/// Snapshots of `store`, newest first.
pub fn list_backups(store: &Path) -> Vec<PathBuf> {
    let dir = backup_dir_for(store);
    let (stem, ext) = stem_and_ext(store);
    let pattern = format!(
        "{}/{}_*{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        glob::Pattern::escape(&stem),
        glob::Pattern::escape(&ext)
    );

    let entries = match glob::glob(&pattern) {
        Ok(paths) => paths,
        Err(e) => {
            warn!("Invalid backup pattern {}: {}", pattern, e);
            return Vec::new();
        }
    };

    let mut found: Vec<(SystemTime, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .map(|p| {
            let modified = fs::metadata(&p)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, p)
        })
        .collect();
    found.sort_by(|a, b| b.cmp(a));
    found.into_iter().map(|(_, p)| p).collect()
}

/// Delete all but the `keep_last` most recent snapshots.
pub fn prune_backups(store: &Path, keep_last: usize) {
    for old in list_backups(store).into_iter().skip(keep_last) {
        if let Err(e) = fs::remove_file(&old) {
            debug!(backup = %old.display(), "Failed to remove old backup: {}", e);
        }
    }
}
