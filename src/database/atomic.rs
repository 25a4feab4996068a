//! Whole-file atomic replacement.
//!
//! The new content goes to a temp file in the destination directory, is
//! flushed and synced, checked by a validation closure, then renamed over
//! the destination. A failure at any step drops the temp file and leaves
//! the destination as it was.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::Builder;

use super::DbError;

fn parent_dir_or_dot(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Write `dest` atomically.
///
/// `write_fn` fills the temp file; `validate_fn` receives the temp path once
/// the content is durable and can veto the replacement.
pub fn atomic_write<T>(
    dest: &Path,
    write_fn: impl FnOnce(&mut File) -> Result<T, DbError>,
    validate_fn: impl FnOnce(&Path) -> Result<(), DbError>,
) -> Result<T, DbError> {
    let dir = parent_dir_or_dot(dest);
    fs::create_dir_all(dir)?;

    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut tmp = Builder::new()
        .prefix(&format!(".{}.", file_name))
        .suffix(".tmp")
        .tempfile_in(dir)?;

    let out = write_fn(tmp.as_file_mut())?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;

    validate_fn(tmp.path())?;

    tmp.persist(dest).map_err(|e| DbError::Io(e.error))?;

    if let Err(e) = sync_parent_dir(dest) {
        tracing::debug!("Directory sync after replace failed: {}", e);
    }

    Ok(out)
}

/// Atomically replace `dest` with `bytes`.
pub fn atomic_write_bytes(dest: &Path, bytes: &[u8]) -> Result<(), DbError> {
    atomic_write(dest, |file| Ok(file.write_all(bytes)?), |_| Ok(()))
}

fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    File::open(parent_dir_or_dot(path))?.sync_all()
}
