//! Normalisation of raw sheets into tables.
//!
//! Read path: unique headers, alias normalisation, activity fix-ups and
//! date coercion. Import path: per-destination shaping (holidays, header
//! detection for activities, reconciliation) followed by de-duplication.

pub mod activity;
pub mod coerce;
pub mod columns;
pub mod holidays;
pub mod reconcile;
pub mod roles;

use std::collections::HashSet;

use crate::database::schema::{ACTIVITY_TABLE, HOLIDAYS_TABLE};
use crate::database::Table;
use crate::excel::SheetData;

pub use reconcile::reconcile;
pub use roles::{infer_roles, Role, RoleAssignment};

/// Shape a stored sheet the way collaborators read it.
pub fn normalize_read(table: &str, sheet: &SheetData) -> Table {
    let mut out = Table::from_sheet(sheet);
    columns::normalize_columns_generic(&mut out);

    if table == ACTIVITY_TABLE {
        if !out.has_columns(&["data", "matricola", "turno"]) {
            tracing::debug!(table, "Activity sheet lacks key columns, reading header-less");
            out = activity::normalize_headerless(&sheet.rows);
        }
        activity::ensure_base_columns(&mut out);
        columns::consolidate_value_columns(&mut out);
    }

    coerce::coerce_date_columns(&mut out);
    out
}

/// Shape an imported sheet for its destination table.
///
/// `canonical_shifts` is the set of primary shift codes used to reconcile
/// activity rows.
pub fn normalize_import(table: &str, sheet: &SheetData, canonical_shifts: &HashSet<String>) -> Table {
    let mut out = match table {
        HOLIDAYS_TABLE => holidays::normalize_holidays(sheet),
        ACTIVITY_TABLE => {
            let headered = sheet
                .rows
                .first()
                .map(|row| columns::looks_like_header_row(row))
                .unwrap_or(false);
            let shaped = if headered {
                headered_table(sheet)
            } else {
                activity::normalize_headerless(&sheet.rows)
            };
            reconcile(&shaped, canonical_shifts)
        }
        _ => headered_table(sheet),
    };

    out.dedup_rows();
    out
}

fn headered_table(sheet: &SheetData) -> Table {
    let mut out = Table::from_sheet(sheet);
    columns::normalize_columns_generic(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excel::CellValue;
    use chrono::NaiveDate;

    fn text_row(values: &[&str]) -> Vec<CellValue> {
        values.iter().map(|v| CellValue::from(*v)).collect()
    }

    #[test]
    fn test_read_headerless_activity_sheet() {
        let sheet = SheetData::new(
            ACTIVITY_TABLE,
            vec![text_row(&["Rossi Mario", "A1234B", "UOX", "M78", "ESAU", "05/03/2024", "480", "P1"])],
        );
        let table = normalize_read(ACTIVITY_TABLE, &sheet);

        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0, "matricola"), Some(&CellValue::text("A1234B")));
        assert_eq!(
            table.get(0, "data"),
            Some(&CellValue::Date(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()))
        );
    }

    #[test]
    fn test_read_headered_activity_gets_base_columns() {
        let sheet = SheetData::new(
            ACTIVITY_TABLE,
            vec![
                text_row(&["Data", "Matricola", "Turno"]),
                text_row(&["05/03/2024", "A1234B", "M78"]),
            ],
        );
        let table = normalize_read(ACTIVITY_TABLE, &sheet);

        for column in activity::ACTIVITY_COLUMNS {
            assert!(table.column_index(column).is_some(), "missing {}", column);
        }
        assert_eq!(table.get(0, "valore"), Some(&CellValue::Number(0.0)));
    }

    #[test]
    fn test_import_other_table_deduplicates() {
        let sheet = SheetData::new(
            "tbl_UO",
            vec![text_row(&["UO"]), text_row(&["Nord"]), text_row(&["Nord"]), text_row(&["Sud"])],
        );
        let table = normalize_import("tbl_UO", &sheet, &HashSet::new());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_import_headered_activity_is_reconciled() {
        let sheet = SheetData::new(
            ACTIVITY_TABLE,
            vec![
                text_row(&["matricola", "data", "turno", "minuti"]),
                text_row(&["A1234B", "05/03/2024", "ESAU", "60"]),
                text_row(&["A1234B", "05/03/2024", "M78", "480"]),
            ],
        );
        let canonical: HashSet<String> = ["M78".to_string()].into_iter().collect();
        let table = normalize_import(ACTIVITY_TABLE, &sheet, &canonical);

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "turno"), Some(&CellValue::text("M78")));
        assert_eq!(table.get(1, "att"), Some(&CellValue::text("ESAU")));
    }
}
