use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

use super::schema::{require_table, ACTIVITY_TABLE, SHIFT_TYPES_TABLE};
use super::{Database, DbError, ImportEntry, ImportMode, ImportOutcome, ImportReport, Table};
use crate::excel::{read_workbook, CellValue, SheetData};
use crate::normalize::{normalize_import, reconcile};

impl Database {
    /// Upper-cased primary shift codes from the shift types table.
    pub fn canonical_shifts(&self) -> Result<HashSet<String>, DbError> {
        let table = self.get_all(SHIFT_TYPES_TABLE)?;
        let column = ["turno", "codice", "sigla"].iter().find_map(|name| {
            table
                .columns
                .iter()
                .position(|c| c.to_lowercase() == *name)
        });

        let Some(idx) = column else {
            return Ok(HashSet::new());
        };
        Ok(table
            .rows
            .iter()
            .map(|row| row.get(idx).map(CellValue::as_text).unwrap_or_default().to_uppercase())
            .filter(|code| !code.is_empty())
            .collect())
    }

    /// Import sheets of an external workbook into catalog tables.
    ///
    /// `mapping` pairs a source sheet with its destination table. Each entry
    /// is committed on its own; a source sheet missing from the file, or an
    /// entry that fails, is recorded in the report and the rest go on.
    pub fn import_workbook(
        &self,
        source: &Path,
        mapping: &[(String, String)],
        mode: ImportMode,
    ) -> Result<ImportReport, DbError> {
        for (_, table) in mapping {
            require_table(table)?;
        }

        let sheets = read_workbook(source)?;
        let mut report = ImportReport::default();

        for (sheet_name, table) in mapping {
            let outcome = match sheets.iter().find(|s| &s.name == sheet_name) {
                None => {
                    let err = DbError::ImportMapping {
                        sheet: sheet_name.clone(),
                    };
                    warn!(sheet = %sheet_name, table = %table, "{}", err);
                    ImportOutcome::Skipped {
                        reason: err.to_string(),
                    }
                }
                Some(sheet) => match self.import_sheet(sheet, table, mode) {
                    Ok(rows) => {
                        info!(sheet = %sheet_name, table = %table, rows, mode = ?mode, "Imported sheet");
                        ImportOutcome::Imported { rows }
                    }
                    Err(e) => {
                        warn!(sheet = %sheet_name, table = %table, "Import failed: {}", e);
                        ImportOutcome::Skipped {
                            reason: e.to_string(),
                        }
                    }
                },
            };

            report.entries.push(ImportEntry {
                sheet: sheet_name.clone(),
                table: table.clone(),
                outcome,
            });
        }

        Ok(report)
    }

    fn import_sheet(&self, sheet: &SheetData, table: &str, mode: ImportMode) -> Result<usize, DbError> {
        let canonical = if table == ACTIVITY_TABLE {
            self.canonical_shifts()?
        } else {
            HashSet::new()
        };
        let incoming = normalize_import(table, sheet, &canonical);

        match mode {
            ImportMode::Replace => {
                self.save_table(table, &incoming)?;
                Ok(incoming.len())
            }
            ImportMode::Append => self.modify_table(table, |current| {
                *current = append_rows(current, &incoming, table == ACTIVITY_TABLE, &canonical);
                Ok(current.len())
            }),
        }
    }
}

/// Existing rows first, then the new ones; de-duplicated, and reconciled
/// again for activities.
fn append_rows(current: &Table, incoming: &Table, activity: bool, canonical: &HashSet<String>) -> Table {
    if current.is_empty() {
        return incoming.clone();
    }

    let mut merged = current.clone();
    merged.append(incoming);
    merged.dedup_rows();
    if activity {
        merged = reconcile(&merged, canonical);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uo_table(names: &[&str]) -> Table {
        let mut table = Table::new(vec!["UO".into()]);
        for name in names {
            table.rows.push(vec![CellValue::text(*name)]);
        }
        table
    }

    #[test]
    fn test_append_keeps_existing_rows_first() {
        let merged = append_rows(&uo_table(&["Nord", "Sud"]), &uo_table(&["Sud", "Est"]), false, &HashSet::new());
        let names: Vec<String> = merged.column_values("UO").iter().map(|c| c.as_text()).collect();
        assert_eq!(names, vec!["Nord", "Sud", "Est"]);
    }

    #[test]
    fn test_append_into_empty_table_takes_incoming() {
        let incoming = uo_table(&["Nord"]);
        assert_eq!(append_rows(&Table::default(), &incoming, false, &HashSet::new()), incoming);
    }
}
