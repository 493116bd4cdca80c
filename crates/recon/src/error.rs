use thiserror::Error;

/// Errors surfaced by the engine itself. Per-property check failures never
/// show up here; they become `InternalCheckError` findings instead.
#[derive(Debug, Error)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (duplicate property, bad band, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// A property named on the command line or in a correction is unknown.
    #[error("unknown property: {0}")]
    UnknownProperty(String),
}

/// Failure inside a single check for a single property.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CheckError {
    #[error("{view} has {rows} conflicting rows for this property")]
    AmbiguousRows { view: String, rows: usize },
    #[error("amount overflow while summing {what}")]
    Overflow { what: String },
}
