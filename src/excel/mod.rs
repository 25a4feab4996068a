//! Excel module for reading, writing and checking the store workbook.
//!
//! This module provides:
//! - Reading workbooks into raw sheet rows (calamine)
//! - Writing whole workbooks (umya-spreadsheet)
//! - Post-write validation of a freshly written file

pub mod types;
pub mod reader;
pub mod validator;
pub mod writer;

// Re-export commonly used types and functions
pub use types::*;
pub use reader::{column_index_to_letter, compute_checksum, read_sheet, read_workbook, sheet_names};
pub use validator::validate_written;
pub use writer::{build_workbook, write_workbook, write_workbook_file};
