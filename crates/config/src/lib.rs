// Configuration loading

pub mod settings;

pub use settings::{BackupPolicy, BackupSettings, RetrySettings, Settings};
