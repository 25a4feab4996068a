use calamine::{open_workbook, open_workbook_auto, Data, Range, Reader, Sheets, Xlsx};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::types::*;

const AUTO_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xltx", "xltm", "xlsb", "xls", "xla", "xlam", "ods"];

/// Open a workbook, picking the format from the extension.
///
/// Files without a recognised extension (temp files, oddly named stores) are
/// opened as xlsx.
pub fn open_sheets(path: &Path) -> Result<Sheets<BufReader<File>>, ExcelError> {
    if !path.exists() {
        return Err(ExcelError::file_not_found(&path.display().to_string()));
    }

    let known = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| AUTO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false);

    if known {
        open_workbook_auto(path)
            .map_err(|e| ExcelError::read_error(format!("Failed to open workbook: {}", e)))
    } else {
        let xlsx: Xlsx<_> = open_workbook(path)
            .map_err(|e| ExcelError::invalid_format(format!("Failed to open workbook as xlsx: {}", e)))?;
        Ok(Sheets::Xlsx(xlsx))
    }
}

/// Read every sheet of a workbook as raw rows, in workbook order
pub fn read_workbook(path: &Path) -> Result<Vec<SheetData>, ExcelError> {
    let mut workbook = open_sheets(path)?;
    let sheet_names = workbook.sheet_names().to_vec();

    let mut sheets = Vec::with_capacity(sheet_names.len());
    for name in sheet_names {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ExcelError::read_error(format!("Failed to read sheet '{}': {}", name, e)))?;
        sheets.push(SheetData::new(name, range_to_rows(&range)));
    }

    Ok(sheets)
}

/// Read a single sheet as raw rows
pub fn read_sheet(path: &Path, sheet: &str) -> Result<SheetData, ExcelError> {
    let mut workbook = open_sheets(path)?;

    if !workbook.sheet_names().iter().any(|n| n == sheet) {
        return Err(ExcelError::sheet_not_found(sheet));
    }

    let range = workbook
        .worksheet_range(sheet)
        .map_err(|e| ExcelError::read_error(format!("Failed to read sheet '{}': {}", sheet, e)))?;

    Ok(SheetData::new(sheet, range_to_rows(&range)))
}

/// Get list of sheet names in a workbook
pub fn sheet_names(path: &Path) -> Result<Vec<String>, ExcelError> {
    let workbook = open_sheets(path)?;
    Ok(workbook.sheet_names().to_vec())
}

/// Rows of a used range. Leading blank columns are kept so that column
/// positions match the sheet; leading blank rows are skipped.
fn range_to_rows(range: &Range<Data>) -> Vec<Vec<CellValue>> {
    let col_offset = range.start().map(|(_, col)| col as usize).unwrap_or(0);
    range
        .rows()
        .map(|row| {
            let mut cells = vec![CellValue::Empty; col_offset];
            cells.extend(row.iter().map(|cell| convert_cell_value(Some(cell))));
            cells
        })
        .collect()
}

/// Convert calamine Data to our CellValue
fn convert_cell_value(cell: Option<&Data>) -> CellValue {
    match cell {
        None => CellValue::Empty,
        Some(data) => match data {
            Data::Empty => CellValue::Empty,
            Data::String(s) if s.is_empty() => CellValue::Empty,
            Data::String(s) => CellValue::String(s.clone()),
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Boolean(*b),
            Data::DateTime(dt) => match excel_serial_to_datetime(dt.as_f64()) {
                Some(dt) if dt.time() == NaiveTime::MIN => CellValue::Date(dt.date()),
                Some(dt) => CellValue::DateTime(dt),
                None => CellValue::Number(dt.as_f64()),
            },
            Data::DateTimeIso(s) => {
                match NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(|d| d.and_time(NaiveTime::MIN)))
                {
                    Some(dt) if dt.time() == NaiveTime::MIN => CellValue::Date(dt.date()),
                    Some(dt) => CellValue::DateTime(dt),
                    None => CellValue::String(s.clone()),
                }
            }
            Data::DurationIso(s) => CellValue::String(s.clone()),
            Data::Error(e) => CellValue::Error(format!("{:?}", e)),
        },
    }
}

fn excel_epoch() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1899, 12, 30)
}

/// Convert an Excel serial (days since 1899-12-30) to a timestamp
pub fn excel_serial_to_datetime(value: f64) -> Option<NaiveDateTime> {
    if !value.is_finite() {
        return None;
    }

    let days = value.floor() as i64;
    let time_fraction = value - value.floor();

    let date = excel_epoch()?.checked_add_signed(chrono::Duration::days(days))?;

    let mut total_seconds = (time_fraction * 86400.0).round() as u32;
    if total_seconds >= 86400 {
        total_seconds = 86399;
    }
    let time = NaiveTime::from_num_seconds_from_midnight_opt(total_seconds, 0)?;

    Some(NaiveDateTime::new(date, time))
}

/// Convert a timestamp to an Excel serial (inverse of [`excel_serial_to_datetime`])
pub fn datetime_to_excel_serial(value: &NaiveDateTime) -> f64 {
    let days = excel_epoch()
        .map(|epoch| (value.date() - epoch).num_days())
        .unwrap_or(0);
    let seconds = value.time().num_seconds_from_midnight() as f64;
    days as f64 + seconds / 86400.0
}

/// Convert column index (0-based) to Excel column letter (A, B, ..., Z, AA, AB, ...)
pub fn column_index_to_letter(index: u32) -> String {
    let mut result = String::new();
    let mut n = index + 1;

    while n > 0 {
        n -= 1;
        let c = (b'A' + (n % 26) as u8) as char;
        result.insert(0, c);
        n /= 26;
    }

    result
}

/// Compute SHA-256 checksum of a file
pub fn compute_checksum(path: &Path) -> Result<String, ExcelError> {
    let mut file = File::open(path)
        .map_err(|e| ExcelError::read_error(format!("Failed to open file for checksum: {}", e)))?;

    let mut hasher = Sha256::new();
    let mut buffer = [0; 8192];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| ExcelError::read_error(format!("Failed to read file for checksum: {}", e)))?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    let result = hasher.finalize();
    Ok(format!("{:x}", result))
}
