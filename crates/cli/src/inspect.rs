//! `wasteaudit config` and `wasteaudit sheets`.

use std::path::{Path, PathBuf};

use serde::Serialize;
use wasteaudit_config::Settings;
use wasteaudit_io::SourceWorkbook;
use wasteaudit_recon::model::View;

use crate::{emit_json, load_config, resolve_source, CliError};

pub fn cmd_config_check(path: &Path) -> Result<(), CliError> {
    let config = load_config(Some(path))?;
    let with_containers = config.properties.iter().filter(|p| !p.containers.is_empty()).count();
    eprintln!(
        "valid: portfolio '{}' with {} propert{} ({} with container config), tolerance {} cent(s)",
        config.name,
        config.properties.len(),
        if config.properties.len() == 1 { "y" } else { "ies" },
        with_containers,
        config.tolerance.currency_cents,
    );
    for view in View::ALL {
        eprintln!("  {view}: '{}'", config.sheets.for_view(view));
    }
    Ok(())
}

pub fn cmd_config_init(path: Option<PathBuf>) -> Result<(), CliError> {
    let path = path.unwrap_or_else(Settings::config_path);
    match Settings::write_default(&path) {
        Ok(true) => eprintln!("wrote {}", path.display()),
        Ok(false) => eprintln!("{} already exists; left unchanged", path.display()),
        Err(e) => return Err(CliError::io(format!("cannot write {}: {e}", path.display()))),
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct SheetInfo {
    name: String,
    /// Non-empty rows below the header.
    rows: usize,
    headers: Vec<String>,
}

pub fn cmd_sheets(source: Option<PathBuf>, json: bool, settings: &Settings) -> Result<(), CliError> {
    let source = resolve_source(source, settings)?;
    let workbook = SourceWorkbook::open(&source)?;
    let sheets: Vec<SheetInfo> = workbook
        .sheets
        .iter()
        .map(|s| SheetInfo {
            name: s.name.clone(),
            rows: s.data_rows().count(),
            headers: s.headers().into_iter().filter(|h| !h.is_empty()).collect(),
        })
        .collect();

    if json {
        return emit_json(&sheets, None, settings.pretty_json);
    }
    for s in &sheets {
        println!("{} ({} rows)", s.name, s.rows);
        if !s.headers.is_empty() {
            println!("  {}", s.headers.join(" | "));
        }
    }
    Ok(())
}
