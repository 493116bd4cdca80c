// wasteaudit CLI - portfolio invoice audits, headless

mod audit;
mod correct;
mod exit_codes;
mod inspect;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use wasteaudit_config::{BackupPolicy, Settings};
use wasteaudit_io::StoreError;
use wasteaudit_recon::model::View;
use wasteaudit_recon::{PortfolioConfig, ReconError};

use exit_codes::{recon_exit_code, store_exit_code, EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "wasteaudit")]
#[command(about = "Cross-check and measure a waste-service invoice portfolio")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Settings file (default: settings.json in the user config dir)
    #[arg(long, global = true, env = "WASTEAUDIT_SETTINGS")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Where the portfolio comes from and what to look at.
#[derive(Args)]
pub struct SourceArgs {
    /// Workbook (.xlsx/.xls/.ods), a .csv file, or a directory of CSVs.
    /// Defaults to "portfolio.default" from settings.
    pub source: Option<PathBuf>,

    /// Portfolio config (TOML)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct AuditArgs {
    #[command(flatten)]
    pub input: SourceArgs,

    /// Only report this property
    #[arg(long, short = 'p')]
    pub property: Option<String>,

    /// Write JSON to this file instead of stdout
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Cross-check the four views and the ledgers; list findings
    #[command(after_help = "\
Exit code 3 with --strict means at least one error-severity finding.

Examples:
  wasteaudit validate Portfolio.xlsx -c texas.portfolio.toml
  wasteaudit validate Portfolio.xlsx -c texas.portfolio.toml --json
  wasteaudit validate Portfolio.xlsx -c texas.portfolio.toml -p 'Orion Prosper' --strict")]
    Validate {
        #[command(flatten)]
        args: AuditArgs,

        /// Exit 3 when any finding has error severity
        #[arg(long)]
        strict: bool,

        /// Output JSON to stdout instead of a finding list
        #[arg(long)]
        json: bool,
    },

    /// Per-property spend, cost per door and yards per door
    #[command(after_help = "\
Examples:
  wasteaudit metrics Portfolio.xlsx -c texas.portfolio.toml
  wasteaudit metrics Portfolio.xlsx -c texas.portfolio.toml --json -o metrics.json")]
    Metrics {
        #[command(flatten)]
        args: AuditArgs,

        /// Output JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Full JSON report: findings, metrics, summary, load warnings
    #[command(after_help = "\
Examples:
  wasteaudit report Portfolio.xlsx -c texas.portfolio.toml
  wasteaudit report Portfolio.xlsx -c texas.portfolio.toml -o report.json")]
    Report {
        #[command(flatten)]
        args: AuditArgs,
    },

    /// Replace one cell in a view sheet and write the source back
    #[command(after_help = "\
Requires a backup from the last 24 hours unless the backup policy says otherwise.

Examples:
  wasteaudit backup Portfolio.xlsx
  wasteaudit correct Portfolio.xlsx -p 'McCord Park' --view overview --field 'Container Count' --value 12
  wasteaudit correct portfolio-csv/ -p 'Orion Prosper' --view contracts --field notice --value '90 days'")]
    Correct {
        #[command(flatten)]
        input: SourceArgs,

        /// Property whose row is corrected
        #[arg(long, short = 'p')]
        property: String,

        /// View sheet: overview, service_details, category_spend, contract_terms
        #[arg(long, value_parser = parse_view)]
        view: View,

        /// Column: field name, header text, or alias
        #[arg(long)]
        field: String,

        /// New value; numbers and dates are stored typed
        #[arg(long, allow_hyphen_values = true)]
        value: String,

        /// Override the backup policy from settings
        #[arg(long, value_parser = parse_backup_policy)]
        backup_policy: Option<BackupPolicy>,

        /// Print the correction audit as JSON
        #[arg(long)]
        json: bool,
    },

    /// Copy the source next to itself as <stem>.backup-YYYYMMDD-HHMMSS
    Backup {
        /// Source file (defaults to "portfolio.default" from settings)
        source: Option<PathBuf>,
    },

    /// Portfolio config and settings file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// List sheets and their header rows
    Sheets {
        source: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Parse and validate a portfolio config without running
    Check {
        /// Path to the portfolio TOML
        config: PathBuf,
    },
    /// Write a commented default settings.json (never overwrites)
    Init {
        /// Destination (default: the user config dir)
        path: Option<PathBuf>,
    },
}

fn parse_view(s: &str) -> Result<View, String> {
    View::parse(s).ok_or_else(|| {
        format!("unknown view '{s}' (expected overview, service_details, category_spend or contract_terms)")
    })
}

fn parse_backup_policy(s: &str) -> Result<BackupPolicy, String> {
    match s.trim().to_lowercase().as_str() {
        "require" => Ok(BackupPolicy::Require),
        "warn" => Ok(BackupPolicy::Warn),
        "off" => Ok(BackupPolicy::Off),
        other => Err(format!("unknown backup policy '{other}' (expected require, warn or off)")),
    }
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = match cli.settings {
        Some(ref path) => Settings::load_from(path),
        None => Settings::load(),
    };

    let result = match cli.command {
        Commands::Validate { args, strict, json } => audit::cmd_validate(args, strict, json, &settings),
        Commands::Metrics { args, json } => audit::cmd_metrics(args, json, &settings),
        Commands::Report { args } => audit::cmd_report(args, &settings),
        Commands::Correct { input, property, view, field, value, backup_policy, json } => {
            correct::cmd_correct(
                correct::CorrectArgs { input, property, view, field, value, backup_policy, json },
                &settings,
            )
        }
        Commands::Backup { source } => correct::cmd_backup(source, &settings),
        Commands::Config { command } => match command {
            ConfigCommands::Check { config } => inspect::cmd_config_check(&config),
            ConfigCommands::Init { path } => inspect::cmd_config_init(path),
        },
        Commands::Sheets { source, json } => inspect::cmd_sheets(source, json, &settings),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn args(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(EXIT_ERROR, msg)
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        Self { code: store_exit_code(&err), message: err.to_string(), hint: err.hint().map(str::to_string) }
    }
}

impl From<ReconError> for CliError {
    fn from(err: ReconError) -> Self {
        let hint = match &err {
            ReconError::UnknownProperty(_) => Some("names must match the Property column exactly".to_string()),
            _ => None,
        };
        Self { code: recon_exit_code(&err), message: err.to_string(), hint }
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Portfolio config from `--config`, or an empty one: every property is then
/// discovered from the workbook.
pub fn load_config(path: Option<&Path>) -> Result<PortfolioConfig, CliError> {
    let Some(path) = path else {
        log::debug!("no --config, using an empty portfolio config");
        return Ok(PortfolioConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::args(format!("cannot read config {}: {e}", path.display())))?;
    let config = PortfolioConfig::from_toml(&text)?;
    log::debug!("loaded {} with {} configured properties", path.display(), config.properties.len());
    Ok(config)
}

pub fn resolve_source(source: Option<PathBuf>, settings: &Settings) -> Result<PathBuf, CliError> {
    source.or_else(|| settings.default_portfolio.clone()).ok_or_else(|| {
        CliError::args("no source workbook given").with_hint(format!(
            "pass a path, or set \"portfolio.default\" in {}",
            Settings::config_path_display()
        ))
    })
}

/// Serialize to `out` when given (noting the path on stderr), else stdout.
pub fn emit_json<T: Serialize>(value: &T, out: Option<&Path>, pretty: bool) -> Result<(), CliError> {
    let json = (if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) })
        .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;
    match out {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))
                .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))?;
            eprintln!("wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
