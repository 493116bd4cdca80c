use std::path::PathBuf;

use thiserror::Error;

/// Errors from the record store. Load problems that only affect one sheet or
/// cell are `LoadWarning`s instead; these abort the operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The source cannot be opened at all.
    #[error("cannot open {}: {reason}", path.display())]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("sheet '{0}' not found")]
    SheetNotFound(String),

    #[error("sheet '{sheet}' has no column for '{field}'")]
    ColumnNotFound { sheet: String, field: String },

    /// The correction does not address exactly one row.
    #[error("{0}")]
    TargetNotFound(String),

    #[error("{} is locked by another program ({attempts} attempt(s))", path.display())]
    WriteContention { path: PathBuf, attempts: u32 },

    #[error("no backup of {} from the last {max_age_hours}h", path.display())]
    BackupMissing { path: PathBuf, max_age_hours: u64 },

    #[error("cannot write {0} sources; convert to .xlsx or .csv first")]
    UnsupportedFormat(String),

    #[error("cannot render workbook: {0}")]
    Render(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// What the operator can do about it.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::WriteContention { .. } => {
                Some("Close the workbook in Excel (or any program holding it open) and retry")
            }
            Self::BackupMissing { .. } => Some("Run: wasteaudit backup <workbook>, then retry the correction"),
            Self::ColumnNotFound { .. } => Some("Run: wasteaudit sheets <workbook> to list sheet headers"),
            Self::SheetNotFound(_) => Some("Check the [sheets] table in the portfolio config"),
            _ => None,
        }
    }
}
