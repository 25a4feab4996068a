//! Excel workbook used as the shared database of a personnel-scheduling
//! application.
//!
//! Several users write one workbook. Writes are serialised by a store-wide
//! lock, backed up, replaced atomically and versioned; reads are normalised
//! into tables, including header-less activity sheets whose column roles
//! are inferred.

pub mod config;
pub mod database;
pub mod excel;
pub mod normalize;

pub use config::StoreConfig;
pub use database::{
    Database, DbError, EnsureReport, ExportResult, ImportMode, ImportOutcome, ImportReport, Record,
    StoreChangeEvent, Table, TableCount,
};
pub use excel::CellValue;
