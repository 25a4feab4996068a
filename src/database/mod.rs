//! The workbook store.
//!
//! One `Database` handle per process, shared behind an `Arc`. Writers go
//! through a store-wide exclusive region, back up the current file, rewrite
//! the whole workbook atomically and bump the version sidecar. Readers never
//! take the lock and are served from a short-lived, version-checked cache.

pub mod atomic;
pub mod backup;
pub mod cache;
pub mod error;
pub mod export;
pub mod import;
pub mod lock;
pub mod meta;
pub mod schema;
pub mod types;
pub mod watcher;

pub use error::DbError;
pub use lock::{ExclusiveRegion, FileLock, RegionGuard};
pub use meta::VersionMeta;
pub use types::*;
pub use watcher::StoreWatcher;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::excel::{read_sheet, read_workbook, sheet_names, validate_written, write_workbook_file};
use crate::excel::{ExcelErrorType, SheetData};
use crate::normalize::normalize_read;
use cache::TableCache;
use schema::{
    absence_needs_seed, empty_store, merge_into_catalog, missing_tables, require_table, ABSENCE_TABLE, TABLES,
};

/// What a write step decided after looking at the current store.
enum Planned<R> {
    Write(Vec<SheetData>, R),
    Skip(R),
}

pub struct Database {
    path: PathBuf,
    config: StoreConfig,
    region: Arc<dyn ExclusiveRegion>,
    cache: Arc<TableCache>,
}

impl Database {
    /// Open (creating or repairing if needed) the store named by `config`.
    pub fn open(config: StoreConfig) -> Result<Self, DbError> {
        let region = Arc::new(FileLock::new(&config.path, config.lock_poll()));
        Self::open_with_region(config, region)
    }

    /// Open with a caller-supplied exclusive region.
    pub fn open_with_region(config: StoreConfig, region: Arc<dyn ExclusiveRegion>) -> Result<Self, DbError> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let db = Database {
            path: config.path.clone(),
            cache: Arc::new(TableCache::new(config.cache_ttl())),
            config,
            region,
        };

        db.recover_if_needed()?;
        let report = db.ensure_tables()?;
        if !report.is_noop() {
            info!(
                created = report.created.len(),
                seeded_absence_codes = report.seeded_absence_codes,
                "Store schema updated"
            );
        }

        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Current store version from the sidecar (0 when unknown).
    pub fn version(&self) -> u64 {
        self.meta().db_version
    }

    pub fn meta(&self) -> VersionMeta {
        meta::read_meta(&self.path)
    }

    fn store_problem(&self) -> Option<String> {
        match fs::metadata(&self.path) {
            Err(_) => Some("missing".to_string()),
            Ok(m) if m.len() < self.config.min_store_bytes => {
                Some(format!("only {} bytes", m.len()))
            }
            Ok(_) => sheet_names(&self.path).err().map(|e| e.to_string()),
        }
    }

    /// Recreate the store when it is missing, truncated or unreadable.
    ///
    /// A damaged file is first copied to `<store>.bak`. Returns whether the
    /// store was recreated.
    pub fn recover_if_needed(&self) -> Result<bool, DbError> {
        if self.store_problem().is_none() {
            return Ok(false);
        }

        let _guard = self.region.acquire(self.config.lock_timeout())?;
        // Another writer may have fixed it while we waited.
        let Some(reason) = self.store_problem() else {
            return Ok(false);
        };

        if self.path.exists() {
            let mut bak = self.path.as_os_str().to_owned();
            bak.push(".bak");
            match fs::copy(&self.path, &bak) {
                Ok(_) => warn!(
                    store = %self.path.display(),
                    reason = %reason,
                    "Store unusable, recreating it; damaged copy kept as .bak"
                ),
                Err(e) => warn!(
                    store = %self.path.display(),
                    reason = %reason,
                    "Store unusable and could not be copied aside: {}", e
                ),
            }
        } else {
            info!(store = %self.path.display(), "Creating new store");
        }

        self.commit(&empty_store())?;
        Ok(true)
    }

    /// Raw sheets of the store; empty when the file does not exist yet.
    fn read_raw(&self) -> Result<Vec<SheetData>, DbError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        read_workbook(&self.path).map_err(|e| DbError::CorruptStore {
            path: self.path.clone(),
            reason: e.message,
        })
    }

    /// Back up, replace and version the store. The region must be held.
    fn commit(&self, sheets: &[SheetData]) -> Result<(), DbError> {
        backup::backup_store(&self.path, self.config.backup_keep_last);

        atomic::atomic_write(
            &self.path,
            |file| Ok(write_workbook_file(sheets, file)?),
            |tmp| {
                let result = validate_written(tmp, sheets);
                if result.is_valid {
                    Ok(())
                } else {
                    Err(DbError::WriteValidation(result.summary()))
                }
            },
        )?;

        let version = meta::bump_version(&self.path).map(|m| m.db_version);
        self.cache.invalidate_all();
        info!(
            store = %self.path.display(),
            sheets = sheets.len(),
            version = ?version,
            "Committed store write"
        );
        Ok(())
    }

    /// Run `plan` against the current store while holding the region and
    /// commit whatever it asks to write.
    fn write_locked<R>(
        &self,
        plan: impl FnOnce(Vec<SheetData>) -> Result<Planned<R>, DbError>,
    ) -> Result<R, DbError> {
        let _guard = self.region.acquire(self.config.lock_timeout())?;
        let current = self.read_raw()?;
        match plan(current)? {
            Planned::Skip(out) => Ok(out),
            Planned::Write(sheets, out) => {
                self.commit(&sheets)?;
                Ok(out)
            }
        }
    }

    /// True when every catalog table exists and the absence table holds at
    /// least one code. Reads without the lock.
    fn schema_complete(&self) -> bool {
        let Ok(current) = self.read_raw() else {
            return false;
        };
        let names: Vec<&str> = current.iter().map(|s| s.name.as_str()).collect();
        missing_tables(&names).is_empty()
            && current
                .iter()
                .find(|s| s.name == ABSENCE_TABLE)
                .map(|s| !absence_needs_seed(s))
                .unwrap_or(false)
    }

    /// Create missing catalog tables and seed an empty absence table.
    ///
    /// A complete store is detected without the lock and left untouched, so
    /// opening it never waits on another writer.
    pub fn ensure_tables(&self) -> Result<EnsureReport, DbError> {
        if self.schema_complete() {
            return Ok(EnsureReport::default());
        }

        self.write_locked(|current| {
            let (sheets, report) = merge_into_catalog(current, None, true);
            if report.is_noop() {
                Ok(Planned::Skip(report))
            } else {
                debug!(created = ?report.created, "Adding missing tables");
                Ok(Planned::Write(sheets, report))
            }
        })
    }

    /// All rows of a catalog table, normalised.
    pub fn get_all(&self, table: &str) -> Result<Table, DbError> {
        require_table(table)?;

        let version = self.version();
        if let Some(hit) = self.cache.get(table, version) {
            return Ok(hit);
        }

        let sheet = match read_sheet(&self.path, table) {
            Ok(sheet) => sheet,
            Err(e) if e.error_type == ExcelErrorType::SheetNotFound => SheetData::new(table, Vec::new()),
            Err(e) => {
                return Err(DbError::CorruptStore {
                    path: self.path.clone(),
                    reason: e.message,
                })
            }
        };

        let out = normalize_read(table, &sheet);
        self.cache.put(table, version, &out);
        Ok(out)
    }

    /// Replace the contents of one table; every other sheet is kept as is.
    pub fn save_table(&self, table: &str, rows: &Table) -> Result<(), DbError> {
        require_table(table)?;
        let mut rows = rows.clone();
        rows.pad_rows();
        let sheet = rows.to_sheet(table);

        self.write_locked(|current| {
            let (sheets, report) = merge_into_catalog(current, Some(sheet), false);
            if !report.created.is_empty() {
                debug!(created = ?report.created, "Restoring missing tables during save");
            }
            Ok(Planned::Write(sheets, ()))
        })?;

        debug!(table, rows = rows.len(), "Saved table");
        Ok(())
    }

    /// Read-modify-write of one table under the region.
    ///
    /// `change` sees the table as `get_all` would return it; an error from
    /// it aborts without writing.
    fn modify_table<R>(
        &self,
        table: &str,
        change: impl FnOnce(&mut Table) -> Result<R, DbError>,
    ) -> Result<R, DbError> {
        require_table(table)?;

        self.write_locked(|current| {
            let sheet = current
                .iter()
                .find(|s| s.name == table)
                .cloned()
                .unwrap_or_else(|| SheetData::new(table, Vec::new()));
            let mut rows = normalize_read(table, &sheet);
            let out = change(&mut rows)?;

            let (sheets, _) = merge_into_catalog(current, Some(rows.to_sheet(table)), false);
            Ok(Planned::Write(sheets, out))
        })
    }

    pub fn add_record(&self, table: &str, record: &Record) -> Result<(), DbError> {
        self.modify_table(table, |rows| {
            rows.push_record(record);
            Ok(())
        })
    }

    /// Overwrite the given fields of row `index`.
    pub fn update_record(&self, table: &str, index: usize, record: &Record) -> Result<(), DbError> {
        self.modify_table(table, |rows| {
            let len = rows.len();
            if rows.update_row(index, record) {
                Ok(())
            } else {
                Err(DbError::RowOutOfRange {
                    table: table.to_string(),
                    index,
                    len,
                })
            }
        })
    }

    pub fn delete_record(&self, table: &str, index: usize) -> Result<(), DbError> {
        self.modify_table(table, |rows| {
            let len = rows.len();
            rows.remove_row(index).map(|_| ()).ok_or_else(|| DbError::RowOutOfRange {
                table: table.to_string(),
                index,
                len,
            })
        })
    }

    /// Remove every row of a table, keeping its header.
    pub fn clear_table(&self, table: &str) -> Result<(), DbError> {
        self.modify_table(table, |rows| {
            rows.rows.clear();
            Ok(())
        })
    }

    /// Row counts of every table, in catalog order.
    pub fn get_stats(&self) -> Result<Vec<TableCount>, DbError> {
        TABLES
            .iter()
            .map(|table| {
                Ok(TableCount {
                    table: table.to_string(),
                    rows: self.get_all(table)?.len(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excel::CellValue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Region that never blocks and counts acquisitions.
    #[derive(Default)]
    struct CountingRegion {
        acquired: AtomicUsize,
    }

    impl ExclusiveRegion for CountingRegion {
        fn acquire(&self, _timeout: Duration) -> Result<RegionGuard<'_>, DbError> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(RegionGuard::new(()))
        }
    }

    /// Region that is always held by somebody else.
    struct BusyRegion;

    impl ExclusiveRegion for BusyRegion {
        fn acquire(&self, timeout: Duration) -> Result<RegionGuard<'_>, DbError> {
            Err(DbError::LockTimeout {
                path: PathBuf::from("busy"),
                waited: timeout,
            })
        }
    }

    fn config(dir: &Path) -> StoreConfig {
        StoreConfig::new(dir.join("persgest_master.xlsx"))
    }

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), CellValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_open_creates_full_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(config(dir.path())).unwrap();

        let names = sheet_names(db.path()).unwrap();
        assert_eq!(names, TABLES.iter().map(|t| t.to_string()).collect::<Vec<_>>());
        assert_eq!(db.version(), 1);
        assert_eq!(db.get_all("Turni_Assenze").unwrap().len(), 24);
    }

    #[test]
    fn test_writes_go_through_the_region() {
        let dir = tempfile::tempdir().unwrap();
        let region = Arc::new(CountingRegion::default());
        let db = Database::open_with_region(config(dir.path()), region.clone()).unwrap();
        let before = region.acquired.load(Ordering::SeqCst);

        db.add_record("tbl_UO", &record(&[("UO", "Nord")])).unwrap();
        db.get_all("tbl_UO").unwrap();

        assert_eq!(region.acquired.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn test_complete_store_opens_while_region_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(config(dir.path())).unwrap();
        let version = db.version();

        let again = Database::open_with_region(config(dir.path()), Arc::new(BusyRegion)).unwrap();

        assert!(again.ensure_tables().unwrap().is_noop());
        assert_eq!(again.version(), version);
    }

    #[test]
    fn test_save_pads_short_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(config(dir.path())).unwrap();

        let mut table = Table::new(vec!["UO".into(), "note".into()]);
        table.rows.push(vec![CellValue::text("Nord")]);
        db.save_table("tbl_UO", &table).unwrap();

        let back = db.get_all("tbl_UO").unwrap();
        assert_eq!(back.rows, vec![vec![CellValue::text("Nord"), CellValue::Empty]]);
    }

    #[test]
    fn test_busy_region_fails_without_touching_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(config(dir.path())).unwrap();
        let version = db.version();

        let busy = Database {
            path: db.path().to_path_buf(),
            config: db.config().clone(),
            region: Arc::new(BusyRegion),
            cache: Arc::new(TableCache::new(Duration::ZERO)),
        };
        let err = busy.add_record("tbl_UO", &record(&[("UO", "Nord")])).unwrap_err();

        assert!(matches!(err, DbError::LockTimeout { .. }));
        assert_eq!(db.version(), version);
        assert!(db.get_all("tbl_UO").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_table_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(config(dir.path())).unwrap();
        let version = db.version();

        assert!(matches!(db.get_all("Utenti"), Err(DbError::UnknownTable(_))));
        assert!(matches!(
            db.save_table("Utenti", &Table::default()),
            Err(DbError::UnknownTable(_))
        ));
        assert_eq!(db.version(), version);
    }

    #[test]
    fn test_record_operations() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(config(dir.path())).unwrap();

        db.add_record("tbl_UO", &record(&[("UO", "Nord")])).unwrap();
        db.add_record("tbl_UO", &record(&[("UO", "Sud")])).unwrap();
        db.update_record("tbl_UO", 1, &record(&[("UO", "Centro")])).unwrap();
        db.delete_record("tbl_UO", 0).unwrap();

        let table = db.get_all("tbl_UO").unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0, "UO"), Some(&CellValue::text("Centro")));

        let err = db.delete_record("tbl_UO", 7).unwrap_err();
        assert!(matches!(err, DbError::RowOutOfRange { len: 1, .. }));

        db.clear_table("tbl_UO").unwrap();
        let table = db.get_all("tbl_UO").unwrap();
        assert!(table.is_empty());
        assert_eq!(table.columns, vec!["UO"]);
    }

    #[test]
    fn test_stats_follow_catalog_order() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(config(dir.path())).unwrap();
        let stats = db.get_stats().unwrap();

        assert_eq!(stats.len(), TABLES.len());
        assert_eq!(stats[0].table, "Attivita");
        assert_eq!(stats.last().map(|s| s.rows), Some(24));
    }
}
