//! `wasteaudit-io`: Record store over a portfolio workbook.
//!
//! Reads the four derived views and per-property ledgers (xlsx/xls/ods via
//! calamine, CSV via the csv crate) and writes operator corrections back.

pub mod backup;
pub mod columns;
pub mod error;
pub mod retry;
pub mod store;
pub mod workbook;

pub use error::StoreError;
pub use store::{Correction, CorrectionAudit, RecordStore, WriteOptions};
pub use workbook::SourceWorkbook;
