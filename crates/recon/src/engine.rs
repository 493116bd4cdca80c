use crate::config::PortfolioConfig;
use crate::error::ReconError;
use crate::evidence::summarize;
use crate::metrics::compute_all;
use crate::model::{LoadWarning, Portfolio, PortfolioReport, ReportMeta};
use crate::validator::validate;

/// What to run and how to label it.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Source path recorded in the report metadata.
    pub source: Option<String>,
    /// Restrict findings and metrics to one property. Cross-property checks
    /// still see the whole portfolio.
    pub property: Option<String>,
}

/// Validate and measure a loaded portfolio. Returns findings, metrics and
/// summary in one report. Check failures become findings, not errors.
pub fn run(
    config: &PortfolioConfig,
    portfolio: &Portfolio,
    load_warnings: Vec<LoadWarning>,
    options: &RunOptions,
) -> Result<PortfolioReport, ReconError> {
    config.validate()?;

    if let Some(ref name) = options.property {
        if portfolio.get(name).is_none() {
            return Err(ReconError::UnknownProperty(name.clone()));
        }
    }

    let mut findings = validate(portfolio, config);
    let mut metrics = compute_all(portfolio, config);

    if let Some(ref name) = options.property {
        findings.retain(|f| &f.property == name);
        metrics.retain(|m| &m.property == name);
    }

    let summary = summarize(&findings);
    log::info!(
        "{}: {} properties, {} finding(s) ({} error)",
        config.name,
        metrics.len(),
        summary.total,
        summary.errors
    );

    Ok(PortfolioReport {
        meta: ReportMeta {
            portfolio: config.name.clone(),
            source: options.source.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            properties: metrics.len(),
        },
        summary,
        findings,
        metrics,
        load_warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FindingKind, OverviewRow};

    #[test]
    fn unknown_property_is_rejected() {
        let portfolio = Portfolio::new();
        let options = RunOptions { property: Some("Nowhere".into()), ..Default::default() };
        let err = run(&PortfolioConfig::default(), &portfolio, Vec::new(), &options).unwrap_err();
        assert!(matches!(err, ReconError::UnknownProperty(ref n) if n == "Nowhere"));
    }

    #[test]
    fn property_filter_limits_output() {
        let mut portfolio = Portfolio::new();
        portfolio.add_overview(OverviewRow::new("A"));
        portfolio.add_overview(OverviewRow::new("B"));
        let options = RunOptions { property: Some("B".into()), ..Default::default() };
        let report = run(&PortfolioConfig::default(), &portfolio, Vec::new(), &options).unwrap();
        assert_eq!(report.meta.properties, 1);
        assert!(report.findings.iter().all(|f| f.property == "B"));
        assert_eq!(report.metrics[0].property, "B");
    }

    #[test]
    fn report_carries_warnings_and_summary() {
        let mut portfolio = Portfolio::new();
        portfolio.add_overview(OverviewRow::new("A"));
        let warnings = vec![LoadWarning::SheetNotFound { sheet: "Contract Terms".into() }];
        let report = run(&PortfolioConfig::default(), &portfolio, warnings, &RunOptions::default()).unwrap();
        assert_eq!(report.load_warnings.len(), 1);
        assert_eq!(report.summary.total, report.findings.len());
        assert!(report.findings.iter().any(|f| f.kind == FindingKind::MissingFromView));
        assert_eq!(report.meta.engine_version, env!("CARGO_PKG_VERSION"));
    }
}
