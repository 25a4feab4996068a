use std::fs::File;
use std::io::{Seek, Write};
use umya_spreadsheet::{new_file_empty_worksheet, writer, Spreadsheet, Worksheet};

use super::reader::datetime_to_excel_serial;
use super::types::{CellValue, ExcelError, SheetData};

const DATE_FORMAT: &str = "yyyy-mm-dd";
const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// Build a workbook holding `sheets` in the given order
pub fn build_workbook(sheets: &[SheetData]) -> Result<Spreadsheet, ExcelError> {
    let mut book = new_file_empty_worksheet();

    for sheet in sheets {
        let worksheet = book.new_sheet(&sheet.name).map_err(|e| {
            ExcelError::write_error(format!("Failed to create sheet '{}': {}", sheet.name, e))
        })?;

        for (row_idx, row) in sheet.rows.iter().enumerate() {
            // Excel uses 1-based indexing
            let row_num = (row_idx + 1) as u32;
            for (col_idx, value) in row.iter().enumerate() {
                write_cell(worksheet, (col_idx + 1) as u32, row_num, value);
            }
        }
    }

    Ok(book)
}

/// Serialize `sheets` as xlsx into `out`
pub fn write_workbook<W: Write + Seek>(sheets: &[SheetData], out: &mut W) -> Result<(), ExcelError> {
    let book = build_workbook(sheets)?;
    writer::xlsx::write_writer(&book, out)
        .map_err(|e| ExcelError::write_error(format!("Failed to save workbook: {}", e)))
}

/// Convenience wrapper used by exports and tests
pub fn write_workbook_file(sheets: &[SheetData], file: &mut File) -> Result<(), ExcelError> {
    write_workbook(sheets, file)?;
    file.flush()
        .map_err(|e| ExcelError::write_error(format!("Failed to flush workbook: {}", e)))
}

/// Write a single value
fn write_cell(worksheet: &mut Worksheet, col_num: u32, row_num: u32, value: &CellValue) {
    match value {
        CellValue::Empty => {}
        CellValue::String(s) => {
            worksheet.get_cell_mut((col_num, row_num)).set_value_string(s);
        }
        CellValue::Number(n) => {
            worksheet.get_cell_mut((col_num, row_num)).set_value_number(*n);
        }
        CellValue::Boolean(b) => {
            worksheet.get_cell_mut((col_num, row_num)).set_value_bool(*b);
        }
        CellValue::Date(d) => {
            let serial = datetime_to_excel_serial(&d.and_time(chrono::NaiveTime::MIN));
            let cell = worksheet.get_cell_mut((col_num, row_num));
            cell.set_value_number(serial);
            cell.get_style_mut()
                .get_number_format_mut()
                .set_format_code(DATE_FORMAT);
        }
        CellValue::DateTime(dt) => {
            let cell = worksheet.get_cell_mut((col_num, row_num));
            cell.set_value_number(datetime_to_excel_serial(dt));
            cell.get_style_mut()
                .get_number_format_mut()
                .set_format_code(DATETIME_FORMAT);
        }
        CellValue::Error(e) => {
            // Can't really set an error value, so set as string
            worksheet
                .get_cell_mut((col_num, row_num))
                .set_value_string(format!("#{}", e));
        }
    }
}
