//! `wasteaudit validate | metrics | report`: load once, then print findings or metrics.

use serde::Serialize;
use wasteaudit_config::Settings;
use wasteaudit_io::RecordStore;
use wasteaudit_recon::model::{Finding, FindingSummary, LoadWarning, MetricsRecord};
use wasteaudit_recon::parse::format_cents;
use wasteaudit_recon::{run, PortfolioReport, RunOptions};

use crate::exit_codes::EXIT_FINDINGS;
use crate::{emit_json, load_config, resolve_source, AuditArgs, CliError};

/// Load the source and run the engine once.
fn build_report(args: &AuditArgs, settings: &Settings) -> Result<PortfolioReport, CliError> {
    let config = load_config(args.input.config.as_deref())?;
    let source = resolve_source(args.input.source.clone(), settings)?;

    let store = RecordStore::open(&source)?;
    let (portfolio, warnings) = store.load(&config);
    let options = RunOptions {
        source: Some(source.display().to_string()),
        property: args.property.clone(),
    };
    Ok(run(&config, &portfolio, warnings, &options)?)
}

/// Human summary to stderr, like every command that produces a report.
fn print_summary(report: &PortfolioReport) {
    let s = &report.summary;
    eprintln!(
        "{}: {} propert{}, {} finding(s): {} error, {} warning, {} info",
        report.meta.portfolio,
        report.meta.properties,
        if report.meta.properties == 1 { "y" } else { "ies" },
        s.total,
        s.errors,
        s.warnings,
        s.info,
    );
    if !report.load_warnings.is_empty() {
        eprintln!("{} load warning(s); rerun with --json for the list", report.load_warnings.len());
    }
}

// ============================================================================
// validate
// ============================================================================

#[derive(Serialize)]
struct ValidateOutput<'a> {
    portfolio: &'a str,
    summary: &'a FindingSummary,
    findings: &'a [Finding],
    load_warnings: &'a [LoadWarning],
}

fn finding_line(f: &Finding) -> String {
    let mut line = format!("{:<7} {:<28} {}", f.severity.to_string(), f.kind.as_str(), f.property);
    if let Some(view) = f.view {
        line.push_str(&format!(" [{view}]"));
    }
    line.push_str(": ");
    line.push_str(&f.detail);
    line
}

pub fn cmd_validate(args: AuditArgs, strict: bool, json: bool, settings: &Settings) -> Result<(), CliError> {
    let report = build_report(&args, settings)?;

    if json || args.out.is_some() {
        let output = ValidateOutput {
            portfolio: &report.meta.portfolio,
            summary: &report.summary,
            findings: &report.findings,
            load_warnings: &report.load_warnings,
        };
        emit_json(&output, args.out.as_deref(), settings.pretty_json)?;
    } else {
        for f in &report.findings {
            println!("{}", finding_line(f));
        }
    }
    print_summary(&report);

    if strict && report.summary.errors > 0 {
        return Err(CliError::new(
            EXIT_FINDINGS,
            format!("{} error-severity finding(s)", report.summary.errors),
        ));
    }
    Ok(())
}

// ============================================================================
// metrics
// ============================================================================

fn dollars(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |d| format!("{d:.2}"))
}

fn metrics_row(m: &MetricsRecord) -> String {
    format!(
        "{:<32} {:>14} {:>5} {:>4} {:>12} {:>6} {:>9} {:>6}  {}",
        m.property,
        format_cents(m.total_spend_cents),
        m.invoice_count,
        m.active_months,
        dollars(m.average_monthly_spend),
        m.unit_count.map_or_else(|| "-".to_string(), |u| u.to_string()),
        dollars(m.cost_per_unit),
        m.yards_per_door.map_or_else(|| "-".to_string(), |y| format!("{y:.2}")),
        m.benchmark,
    )
}

pub fn cmd_metrics(args: AuditArgs, json: bool, settings: &Settings) -> Result<(), CliError> {
    let report = build_report(&args, settings)?;

    if json || args.out.is_some() {
        emit_json(&report.metrics, args.out.as_deref(), settings.pretty_json)?;
    } else {
        println!(
            "{:<32} {:>14} {:>5} {:>4} {:>12} {:>6} {:>9} {:>6}  benchmark",
            "property", "spend", "inv", "mo", "avg/month", "units", "cost/unit", "yd/dr"
        );
        for m in &report.metrics {
            println!("{}", metrics_row(m));
        }
    }
    print_summary(&report);
    Ok(())
}

// ============================================================================
// report
// ============================================================================

pub fn cmd_report(args: AuditArgs, settings: &Settings) -> Result<(), CliError> {
    let report = build_report(&args, settings)?;
    emit_json(&report, args.out.as_deref(), settings.pretty_json)?;
    print_summary(&report);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasteaudit_recon::model::{FindingKind, View};

    #[test]
    fn finding_line_names_view() {
        let f = Finding::new("McCord Park", FindingKind::MissingFromView, "'McCord Park' has no row in Contract Terms")
            .in_view(View::ContractTerms);
        let line = finding_line(&f);
        assert!(line.starts_with("error"));
        assert!(line.contains("McCord Park [contract_terms]: 'McCord Park' has no row"));
    }

    #[test]
    fn missing_metrics_print_as_dash() {
        assert_eq!(dollars(None), "-");
        assert_eq!(dollars(Some(1091.5)), "1091.50");
    }
}
