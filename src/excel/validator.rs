use std::collections::HashMap;
use std::path::Path;

use super::reader::read_workbook;
use super::types::*;

/// Re-open a freshly written workbook and compare it with what was written.
///
/// Every expected sheet must be present, carry the same header row and the
/// same number of non-empty rows.
pub fn validate_written(path: &Path, expected: &[SheetData]) -> ValidationResult {
    let written = match read_workbook(path) {
        Ok(sheets) => sheets,
        Err(e) => {
            return ValidationResult {
                is_valid: false,
                errors: vec![ValidationError {
                    sheet: String::new(),
                    message: format!("Workbook cannot be reopened: {}", e),
                    error_type: ValidationErrorType::Unreadable,
                }],
                sheets_checked: 0,
            };
        }
    };

    let by_name: HashMap<&str, &SheetData> = written.iter().map(|s| (s.name.as_str(), s)).collect();
    let mut errors = Vec::new();

    for sheet in expected {
        let Some(actual) = by_name.get(sheet.name.as_str()) else {
            errors.push(ValidationError {
                sheet: sheet.name.clone(),
                message: "Sheet missing after write".to_string(),
                error_type: ValidationErrorType::MissingSheet,
            });
            continue;
        };

        if let Some(error) = check_header(sheet, actual) {
            errors.push(error);
        }

        let (want, got) = (sheet.non_empty_rows(), actual.non_empty_rows());
        if want != got {
            errors.push(ValidationError {
                sheet: sheet.name.clone(),
                message: format!("Expected {} rows but found {}", want, got),
                error_type: ValidationErrorType::RowCountMismatch,
            });
        }
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
        sheets_checked: expected.len() as u32,
    }
}

/// Trailing blank header cells are not significant.
fn check_header(expected: &SheetData, actual: &SheetData) -> Option<ValidationError> {
    let trim = |mut header: Vec<String>| {
        while header.last().map(|h| h.is_empty()).unwrap_or(false) {
            header.pop();
        }
        header
    };

    let want = trim(expected.header());
    let got = trim(actual.header());

    if want != got {
        return Some(ValidationError {
            sheet: expected.name.clone(),
            message: format!("Header mismatch: expected {:?}, found {:?}", want, got),
            error_type: ValidationErrorType::HeaderMismatch,
        });
    }

    None
}
