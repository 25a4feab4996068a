use chrono::Local;
use std::path::Path;
use tracing::info;

use super::atomic::atomic_write;
use super::schema::{require_table, TABLES};
use super::{Database, DbError, ExportResult};
use crate::excel::{compute_checksum, validate_written, write_workbook_file, SheetData};

impl Database {
    /// Write the chosen tables (all by default) to a standalone workbook.
    ///
    /// Without `dest` the file lands in the export directory as
    /// `export_<YYYYMMDD_HHMMSS>.xlsx`.
    pub fn export_workbook(&self, tables: Option<&[&str]>, dest: Option<&Path>) -> Result<ExportResult, DbError> {
        let names: Vec<&str> = tables.map(|t| t.to_vec()).unwrap_or_else(|| TABLES.to_vec());
        for name in &names {
            require_table(name)?;
        }

        let sheets = names
            .iter()
            .map(|name| Ok(self.get_all(name)?.to_sheet(name)))
            .collect::<Result<Vec<SheetData>, DbError>>()?;

        let path = match dest {
            Some(p) => p.to_path_buf(),
            None => self
                .config()
                .export_dir()
                .join(format!("export_{}.xlsx", Local::now().format("%Y%m%d_%H%M%S"))),
        };

        atomic_write(
            &path,
            |file| Ok(write_workbook_file(&sheets, file)?),
            |tmp| {
                let result = validate_written(tmp, &sheets);
                if result.is_valid {
                    Ok(())
                } else {
                    Err(DbError::WriteValidation(result.summary()))
                }
            },
        )?;

        let checksum = compute_checksum(&path)?;
        info!(path = %path.display(), tables = names.len(), "Exported workbook");

        Ok(ExportResult {
            path,
            checksum,
            tables: names.iter().map(|n| n.to_string()).collect(),
        })
    }
}
