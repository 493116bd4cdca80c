//! `wasteaudit-recon`: Portfolio consistency validator and metrics engine.
//!
//! Pure engine crate: receives a pre-loaded portfolio, returns findings and
//! metrics. No CLI or IO dependencies.

pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod metrics;
pub mod model;
pub mod parse;
pub mod validator;

pub use config::PortfolioConfig;
pub use engine::{run, RunOptions};
pub use error::{CheckError, ReconError};
pub use model::{Finding, FindingKind, MetricsRecord, Portfolio, PortfolioReport, Severity};
