use crate::database::Table;
use crate::excel::CellValue;
use crate::normalize::coerce::minutes_to_hours;
use crate::normalize::roles::{infer_roles, Role};

/// Columns of a normalised activity table, in order.
pub const ACTIVITY_COLUMNS: &[&str] = &[
    "nome", "matricola", "uo", "turno", "att", "pox", "data", "minuti", "valore",
];

/// Build an activity table from header-less rows using role inference.
pub fn normalize_headerless(rows: &[Vec<CellValue>]) -> Table {
    let mut out = Table::new(ACTIVITY_COLUMNS.iter().map(|c| c.to_string()).collect());

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let columns: Vec<Vec<CellValue>> = (0..width)
        .map(|idx| {
            rows.iter()
                .map(|row| row.get(idx).cloned().unwrap_or_default())
                .collect::<Vec<_>>()
        })
        .filter(|col: &Vec<CellValue>| col.iter().any(|c| !c.is_empty()))
        .collect();
    if columns.is_empty() {
        return out;
    }

    let roles = infer_roles(&columns);
    let cell = |role: Role, row: usize| -> CellValue {
        roles
            .column(role)
            .and_then(|idx| columns.get(idx))
            .and_then(|col| col.get(row))
            .cloned()
            .unwrap_or_default()
    };
    let text = |role: Role, row: usize| CellValue::from(cell(role, row).as_text());

    for row in 0..rows.len() {
        let minutes = cell(Role::Duration, row).as_f64().unwrap_or(0.0);
        let date = cell(Role::Date, row)
            .as_date()
            .map(CellValue::Date)
            .unwrap_or_default();

        let record = vec![
            text(Role::Name, row),
            text(Role::Identifier, row),
            text(Role::Unit, row),
            text(Role::Shift, row),
            text(Role::Activity, row),
            text(Role::Note, row),
            date,
            CellValue::Number(minutes),
            CellValue::Number(minutes_to_hours(minutes)),
        ];

        let blank = record[0].is_empty()
            && record[1].is_empty()
            && record[3].is_empty()
            && record[6].is_empty()
            && minutes_to_hours(minutes) == 0.0;
        if !blank {
            out.rows.push(record);
        }
    }

    out
}

/// Add any missing activity column: text blank, `minuti`/`valore` zero,
/// `data` empty.
pub fn ensure_base_columns(table: &mut Table) {
    for name in ACTIVITY_COLUMNS {
        let default = match *name {
            "minuti" | "valore" => CellValue::Number(0.0),
            _ => CellValue::Empty,
        };
        table.ensure_column(name, default);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(values: &[&str]) -> Vec<CellValue> {
        values.iter().map(|v| CellValue::from(*v)).collect()
    }

    #[test]
    fn test_headerless_fixture_row() {
        let rows = vec![row(&["Rossi Mario", "A1234B", "UOX", "M78", "ESAU", "05/03/2024", "480", "P1"])];
        let table = normalize_headerless(&rows);

        assert_eq!(table.columns, ACTIVITY_COLUMNS);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0, "nome"), Some(&CellValue::text("Rossi Mario")));
        assert_eq!(table.get(0, "matricola"), Some(&CellValue::text("A1234B")));
        assert_eq!(table.get(0, "uo"), Some(&CellValue::text("UOX")));
        assert_eq!(table.get(0, "turno"), Some(&CellValue::text("M78")));
        assert_eq!(table.get(0, "att"), Some(&CellValue::text("ESAU")));
        assert_eq!(table.get(0, "pox"), Some(&CellValue::text("P1")));
        assert_eq!(
            table.get(0, "data"),
            Some(&CellValue::Date(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()))
        );
        assert_eq!(table.get(0, "minuti"), Some(&CellValue::Number(480.0)));
        assert_eq!(table.get(0, "valore"), Some(&CellValue::Number(8.0)));
    }

    #[test]
    fn test_empty_columns_are_ignored_and_blank_rows_dropped() {
        let rows = vec![
            row(&["", "Rossi Mario", "A1234B", "UOX", "M78", "ESAU", "05/03/2024", "480", "P1"]),
            row(&["", "", "", "UOX", "", "", "", "", ""]),
            row(&["", "Bianchi Anna", "3371N", "UOY", "N11", "", "06/03/2024", "420", "P2"]),
        ];
        let table = normalize_headerless(&rows);

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1, "matricola"), Some(&CellValue::text("3371N")));
        assert_eq!(table.get(1, "valore"), Some(&CellValue::Number(7.0)));
    }

    #[test]
    fn test_empty_input_yields_activity_columns() {
        let table = normalize_headerless(&[]);
        assert!(table.is_empty());
        assert_eq!(table.columns.len(), ACTIVITY_COLUMNS.len());
    }

    #[test]
    fn test_ensure_base_columns_fills_defaults() {
        let mut table = Table::new(vec!["matricola".into()]);
        table.rows.push(vec![CellValue::text("3371N")]);
        ensure_base_columns(&mut table);

        assert_eq!(table.columns.len(), ACTIVITY_COLUMNS.len());
        assert_eq!(table.get(0, "minuti"), Some(&CellValue::Number(0.0)));
        assert_eq!(table.get(0, "turno"), Some(&CellValue::Empty));
    }
}
