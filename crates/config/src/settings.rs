// Operator settings
// Loaded from ~/.config/wasteaudit/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Whether a correction may overwrite the source without a recent backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupPolicy {
    /// Refuse to write without a recent backup marker (default)
    #[default]
    Require,
    /// Write anyway, but log a warning
    Warn,
    /// Do not look for a backup
    Off,
}

impl std::fmt::Display for BackupPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Require => write!(f, "require"),
            Self::Warn => write!(f, "warn"),
            Self::Off => write!(f, "off"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    pub policy: BackupPolicy,

    /// A backup older than this does not count
    #[serde(rename = "maxAgeHours")]
    pub max_age_hours: u64,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self { policy: BackupPolicy::Require, max_age_hours: 24 }
    }
}

/// Write-back retry when the source file is locked by another program
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts, including the first
    pub attempts: u32,

    #[serde(rename = "delayMs")]
    pub delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { attempts: 5, delay_ms: 2000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Portfolio
    #[serde(rename = "portfolio.default")]
    pub default_portfolio: Option<PathBuf>,

    // Output
    #[serde(rename = "output.pretty")]
    pub pretty_json: bool,

    // Write-back
    #[serde(rename = "write.retry")]
    pub write_retry: RetrySettings,

    #[serde(rename = "write.backup")]
    pub backup: BackupSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_portfolio: None,
            pretty_json: true,
            write_retry: RetrySettings::default(),
            backup: BackupSettings::default(),
        }
    }
}

const DEFAULT_SETTINGS: &str = r#"{
    // Portfolio workbook (or CSV directory) used when no source is given
    "portfolio.default": null,

    // Pretty-print JSON reports
    "output.pretty": true,

    // Write-back retry while the workbook is open in a spreadsheet app
    "write.retry": {
        "attempts": 5,
        "delayMs": 2000
    },

    // Backup check before a correction overwrites the source
    // Policy options: "require", "warn", "off"
    "write.backup": {
        "policy": "require",
        "maxAgeHours": 24
    }
}
"#;

/// Strip comments (lines starting with //)
fn strip_comments(contents: &str) -> String {
    contents
        .lines()
        .filter(|line| !line.trim().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wasteaudit");
        config_dir.join("settings.json")
    }

    /// Load settings from the default location, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load settings from a specific file, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            log::debug!("no settings at {}, using defaults", path.display());
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("error parsing {}: {e}; using default settings", path.display());
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("error reading {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Parse settings JSON (with `//` comment lines)
    pub fn parse(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(&strip_comments(contents))
    }

    /// Write the commented default settings file. Never overwrites.
    pub fn write_default(path: &Path) -> Result<bool, String> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        fs::write(path, DEFAULT_SETTINGS).map_err(|e| e.to_string())?;
        Ok(true)
    }

    /// Get the config file path for display/opening
    pub fn config_path_display() -> String {
        Self::config_path().to_string_lossy().to_string()
    }
}
