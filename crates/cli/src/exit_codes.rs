//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Codes
//!
//! | Code | Meaning                                            |
//! |------|----------------------------------------------------|
//! | 0    | Success                                            |
//! | 1    | General error (unspecified)                        |
//! | 2    | CLI usage error (bad args, unknown property/view)  |
//! | 3    | `validate --strict` found error-severity findings  |
//! | 4    | Portfolio config failed to parse or validate       |
//! | 5    | Source workbook cannot be opened                   |
//! | 6    | Source stayed locked through every write attempt   |
//! | 7    | Correction refused: no recent backup               |
//! | 8    | Correction target row or column not found          |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `store_exit_code` / `recon_exit_code` or the command

use wasteaudit_io::StoreError;
use wasteaudit_recon::ReconError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Audit (3-4)
// =============================================================================

/// `validate --strict` and at least one finding has error severity.
pub const EXIT_FINDINGS: u8 = 3;

/// Portfolio TOML did not parse, or failed validation.
pub const EXIT_INVALID_CONFIG: u8 = 4;

// =============================================================================
// Record store (5-8)
// =============================================================================

/// Source workbook missing, unreadable, or not a spreadsheet.
pub const EXIT_SOURCE_UNAVAILABLE: u8 = 5;

/// Write-back retried to exhaustion while another program held the file.
pub const EXIT_WRITE_CONTENTION: u8 = 6;

/// Backup policy `require` and no marker within the max age.
pub const EXIT_BACKUP_MISSING: u8 = 7;

/// The correction did not address exactly one row, or the column is unknown.
pub const EXIT_TARGET_NOT_FOUND: u8 = 8;

// =============================================================================
// Error mapping
// =============================================================================

pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
        ReconError::UnknownProperty(_) => EXIT_USAGE,
    }
}

pub fn store_exit_code(err: &StoreError) -> u8 {
    match err {
        StoreError::SourceUnavailable { .. } => EXIT_SOURCE_UNAVAILABLE,
        StoreError::WriteContention { .. } => EXIT_WRITE_CONTENTION,
        StoreError::BackupMissing { .. } => EXIT_BACKUP_MISSING,
        StoreError::TargetNotFound(_) | StoreError::ColumnNotFound { .. } | StoreError::SheetNotFound(_) => {
            EXIT_TARGET_NOT_FOUND
        }
        StoreError::UnsupportedFormat(_) => EXIT_USAGE,
        StoreError::Render(_) | StoreError::Io(_) => EXIT_ERROR,
    }
}
