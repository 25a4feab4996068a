use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use crate::excel::{column_index_to_letter, CellValue, SheetData};
use crate::normalize::columns::make_unique_columns;

/// A single record keyed by column name
pub type Record = BTreeMap<String, CellValue>;

/// In-memory contents of one catalog table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    /// Interpret a sheet whose first row is the header.
    ///
    /// Header names are made unique, blank headers take the column letter,
    /// rows are padded to the header width and fully empty rows are dropped.
    pub fn from_sheet(sheet: &SheetData) -> Self {
        let Some(header_row) = sheet.rows.first() else {
            return Table::default();
        };

        let width = sheet.rows.iter().map(Vec::len).max().unwrap_or(0);
        let raw: Vec<String> = (0..width)
            .map(|idx| {
                let text = header_row.get(idx).map(CellValue::as_text).unwrap_or_default();
                if text.is_empty() {
                    column_index_to_letter(idx as u32)
                } else {
                    text
                }
            })
            .collect();

        let mut table = Table::new(make_unique_columns(&raw));
        for row in sheet.body() {
            if row.iter().all(CellValue::is_empty) {
                continue;
            }
            let mut padded = row.clone();
            padded.resize(width, CellValue::Empty);
            table.rows.push(padded);
        }

        table
    }

    /// Header row followed by the data rows
    pub fn to_sheet(&self, name: &str) -> SheetData {
        if self.columns.is_empty() && self.rows.is_empty() {
            return SheetData::new(name, Vec::new());
        }
        let mut rows = Vec::with_capacity(self.rows.len() + 1);
        rows.push(self.columns.iter().map(|c| CellValue::text(c.as_str())).collect());
        rows.extend(self.rows.iter().cloned());
        SheetData::new(name, rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_columns(&self, names: &[&str]) -> bool {
        names.iter().all(|n| self.column_index(n).is_some())
    }

    /// Pad short rows with blanks up to the column count. Longer rows are
    /// left alone.
    pub fn pad_rows(&mut self) {
        let width = self.columns.len();
        for row in &mut self.rows {
            if row.len() < width {
                row.resize(width, CellValue::Empty);
            }
        }
    }

    /// Index of `name`, appending it filled with `default` when absent.
    pub fn ensure_column(&mut self, name: &str, default: CellValue) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.pad_rows();
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(default.clone());
        }
        self.columns.len() - 1
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&CellValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Values of one column, top to bottom.
    pub fn column_values(&self, column: &str) -> Vec<CellValue> {
        match self.column_index(column) {
            Some(idx) => self.rows.iter().map(|r| r.get(idx).cloned().unwrap_or_default()).collect(),
            None => Vec::new(),
        }
    }

    pub fn drop_columns(&mut self, names: &[String]) {
        let keep: Vec<bool> = self.columns.iter().map(|c| !names.contains(c)).collect();
        let filter = |values: Vec<CellValue>| {
            values
                .into_iter()
                .zip(keep.iter())
                .filter_map(|(v, k)| k.then_some(v))
                .collect::<Vec<_>>()
        };
        self.columns = self
            .columns
            .drain(..)
            .zip(keep.iter())
            .filter_map(|(c, k)| k.then_some(c))
            .collect();
        self.rows = self.rows.drain(..).map(filter).collect();
    }

    /// Append a record, adding any columns it introduces.
    pub fn push_record(&mut self, record: &Record) {
        for name in record.keys() {
            self.ensure_column(name, CellValue::Empty);
        }
        let mut row = vec![CellValue::Empty; self.columns.len()];
        for (name, value) in record {
            if let Some(idx) = self.column_index(name) {
                row[idx] = value.clone();
            }
        }
        self.rows.push(row);
    }

    /// Overwrite the given fields of row `index`; false when out of range.
    pub fn update_row(&mut self, index: usize, record: &Record) -> bool {
        if index >= self.rows.len() {
            return false;
        }
        self.pad_rows();
        for (name, value) in record {
            let idx = self.ensure_column(name, CellValue::Empty);
            self.rows[index][idx] = value.clone();
        }
        true
    }

    pub fn remove_row(&mut self, index: usize) -> Option<Vec<CellValue>> {
        (index < self.rows.len()).then(|| self.rows.remove(index))
    }

    /// Append another table's rows, unioning the column sets.
    pub fn append(&mut self, other: &Table) {
        self.pad_rows();
        for name in &other.columns {
            self.ensure_column(name, CellValue::Empty);
        }
        for row in &other.rows {
            let mut merged = vec![CellValue::Empty; self.columns.len()];
            for (name, value) in other.columns.iter().zip(row) {
                if let Some(idx) = self.column_index(name) {
                    merged[idx] = value.clone();
                }
            }
            self.rows.push(merged);
        }
    }

    /// Drop exact duplicate rows, keeping the first occurrence.
    pub fn dedup_rows(&mut self) {
        let mut seen = HashSet::new();
        self.rows.retain(|row| seen.insert(format!("{:?}", row)));
    }
}

/// How imported rows combine with the current table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    #[default]
    Replace,
    Append,
}

impl ImportMode {
    /// Unknown modes fall back to `Replace`.
    pub fn parse(mode: &str) -> Self {
        match mode.trim().to_lowercase().as_str() {
            "append" => ImportMode::Append,
            _ => ImportMode::Replace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImportOutcome {
    Imported { rows: usize },
    Skipped { reason: String },
}

/// Outcome of one `{source sheet: destination table}` mapping entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportEntry {
    pub sheet: String,
    pub table: String,
    pub outcome: ImportOutcome,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportReport {
    pub entries: Vec<ImportEntry>,
}

impl ImportReport {
    pub fn imported(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, ImportOutcome::Imported { .. }))
            .count()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &ImportEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, ImportOutcome::Skipped { .. }))
    }
}

/// Result of exporting tables to a standalone workbook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
    pub path: PathBuf,
    pub checksum: String,
    pub tables: Vec<String>,
}

/// Row count of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCount {
    pub table: String,
    pub rows: usize,
}

/// What `ensure_tables` changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsureReport {
    pub created: Vec<String>,
    pub seeded_absence_codes: bool,
}

impl EnsureReport {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && !self.seeded_absence_codes
    }
}

/// Emitted when a writer commits to the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreChangeEvent {
    pub path: String,
    pub version: u64,
    pub last_write_ts: Option<NaiveDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::text(s)
    }

    #[test]
    fn test_from_sheet_pads_rows_and_names_blank_headers() {
        let sheet = SheetData::new(
            "tbl_UO",
            vec![
                vec![text("UO"), CellValue::Empty, text("UO")],
                vec![text("Nord")],
                vec![CellValue::Empty, CellValue::Empty],
                vec![text("Sud"), text("x"), text("y")],
            ],
        );

        let table = Table::from_sheet(&sheet);
        assert_eq!(table.columns, vec!["UO", "B", "UO_1"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0], vec![text("Nord"), CellValue::Empty, CellValue::Empty]);
    }

    #[test]
    fn test_push_and_update_record_add_columns() {
        let mut table = Table::new(vec!["matricola".into()]);
        let mut record = Record::new();
        record.insert("matricola".into(), text("3371N"));
        record.insert("note".into(), text("nuovo"));
        table.push_record(&record);

        assert_eq!(table.columns, vec!["matricola", "note"]);
        assert_eq!(table.get(0, "note"), Some(&text("nuovo")));

        let mut change = Record::new();
        change.insert("UO".into(), text("Nord"));
        assert!(table.update_row(0, &change));
        assert!(!table.update_row(5, &change));
        assert_eq!(table.get(0, "UO"), Some(&text("Nord")));
    }

    #[test]
    fn test_append_unions_columns_and_dedup_keeps_first() {
        let mut left = Table::new(vec!["a".into()]);
        left.rows.push(vec![text("1")]);
        let mut right = Table::new(vec!["b".into(), "a".into()]);
        right.rows.push(vec![text("x"), text("1")]);
        right.rows.push(vec![CellValue::Empty, text("1")]);

        left.append(&right);
        assert_eq!(left.columns, vec!["a", "b"]);
        assert_eq!(left.len(), 3);

        left.dedup_rows();
        assert_eq!(left.rows, vec![vec![text("1"), CellValue::Empty], vec![text("1"), text("x")]]);
    }

    #[test]
    fn test_short_rows_stay_aligned() {
        let mut table = Table::new(vec!["a".into(), "b".into()]);
        table.rows.push(vec![text("1")]);
        assert_eq!(table.column_values("b"), vec![CellValue::Empty]);

        table.ensure_column("c", text("z"));
        assert_eq!(table.rows[0], vec![text("1"), CellValue::Empty, text("z")]);

        let mut short = Table::new(vec!["a".into(), "b".into()]);
        short.rows.push(vec![text("2")]);
        let mut change = Record::new();
        change.insert("b".into(), text("y"));
        assert!(short.update_row(0, &change));
        assert_eq!(short.rows[0], vec![text("2"), text("y")]);

        let mut left = Table::new(vec!["a".into(), "b".into()]);
        left.rows.push(vec![text("3")]);
        left.append(&short);
        assert_eq!(left.rows[0], vec![text("3"), CellValue::Empty]);
        assert_eq!(left.rows[1], vec![text("2"), text("y")]);
    }

    #[test]
    fn test_drop_columns() {
        let mut table = Table::new(vec!["a".into(), "b".into(), "c".into()]);
        table.rows.push(vec![text("1"), text("2"), text("3")]);
        table.drop_columns(&["b".to_string()]);
        assert_eq!(table.columns, vec!["a", "c"]);
        assert_eq!(table.rows[0], vec![text("1"), text("3")]);
    }

    #[test]
    fn test_import_mode_parse() {
        assert_eq!(ImportMode::parse(" Append "), ImportMode::Append);
        assert_eq!(ImportMode::parse("whatever"), ImportMode::Replace);
    }
}
