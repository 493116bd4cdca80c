//! `wasteaudit correct` and `wasteaudit backup`: the only commands that write.

use std::path::PathBuf;

use wasteaudit_config::{BackupPolicy, Settings};
use wasteaudit_io::backup::create_backup;
use wasteaudit_io::retry::{RetryPolicy, ThreadSleeper};
use wasteaudit_io::{Correction, CorrectionAudit, RecordStore, WriteOptions};
use wasteaudit_recon::model::View;
use wasteaudit_recon::parse::infer_value;

use crate::{emit_json, load_config, resolve_source, CliError, SourceArgs};

pub struct CorrectArgs {
    pub input: SourceArgs,
    pub property: String,
    pub view: View,
    pub field: String,
    pub value: String,
    pub backup_policy: Option<BackupPolicy>,
    pub json: bool,
}

fn write_options(settings: &Settings, policy: Option<BackupPolicy>) -> WriteOptions {
    let mut backup = settings.backup.clone();
    if let Some(policy) = policy {
        backup.policy = policy;
    }
    WriteOptions { retry: RetryPolicy::from(&settings.write_retry), backup }
}

fn describe(audit: &CorrectionAudit) -> String {
    let before = audit.before.as_ref().map_or_else(|| "(blank)".to_string(), ToString::to_string);
    format!(
        "{} / {} row {} ({}): {} -> {}",
        audit.sheet, audit.field, audit.row, audit.property, before, audit.after
    )
}

pub fn cmd_correct(args: CorrectArgs, settings: &Settings) -> Result<(), CliError> {
    let config = load_config(args.input.config.as_deref())?;
    let source = resolve_source(args.input.source, settings)?;

    let mut store = RecordStore::open(&source)?;
    let correction = Correction {
        property: args.property,
        view: args.view,
        field: args.field,
        value: infer_value(&args.value),
    };
    let options = write_options(settings, args.backup_policy);
    log::debug!(
        "correcting with backup policy {} and {} attempt(s)",
        options.backup.policy,
        options.retry.attempts
    );

    let audit = store.correct(&config, &correction, &options, &mut ThreadSleeper)?;

    if args.json {
        emit_json(&audit, None, settings.pretty_json)?;
    } else {
        println!("{}", describe(&audit));
    }
    eprintln!("wrote {}", audit.file);
    Ok(())
}

pub fn cmd_backup(source: Option<PathBuf>, settings: &Settings) -> Result<(), CliError> {
    let source = resolve_source(source, settings)?;
    if source.is_dir() {
        return Err(CliError::args(format!("{} is a directory", source.display()))
            .with_hint("back up the individual CSV file that the correction will rewrite"));
    }
    let dest = create_backup(&source)?;
    println!("{}", dest.display());
    Ok(())
}
