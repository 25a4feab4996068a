use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::database::Table;
use crate::excel::CellValue;

/// Columns holding calendar days, coerced on every read.
pub const DATE_COLUMNS: &[&str] = &["data", "data_inizio", "data_fine"];

const DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

// Two-digit years first: `%Y` would happily read `24` as year 24.
const DATE_FORMATS: &[&str] = &[
    "%d/%m/%y", "%d-%m-%y", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d", "%Y/%m/%d",
];

/// Parse text as a day-first date or timestamp (`05/03/2024` is 5 March).
pub fn parse_day_first(text: &str) -> Option<NaiveDateTime> {
    let s = text.trim();
    if s.len() < 6 || !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Hours from minutes, rounded to two decimals.
pub fn minutes_to_hours(minutes: f64) -> f64 {
    round2(minutes / 60.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Numeric value of a cell, zero when absent or unparsable.
pub fn number_or_zero(value: &CellValue) -> f64 {
    value.as_f64().unwrap_or(0.0)
}

/// Day-truncate every parsable value in the date columns.
///
/// Unparsable text is left as it is rather than blanked.
pub fn coerce_date_columns(table: &mut Table) {
    table.pad_rows();
    for name in DATE_COLUMNS {
        let Some(idx) = table.column_index(name) else {
            continue;
        };
        for row in &mut table.rows {
            if let Some(day) = row[idx].as_date() {
                row[idx] = CellValue::Date(day);
            }
        }
    }
}
