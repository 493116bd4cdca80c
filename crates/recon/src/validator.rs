//! Consistency Validator: cross-checks the four derived views against each
//! other and against raw line items.
//!
//! Every property in the union of views is visited in processing order, and
//! every check runs for every property. A check that fails internally turns
//! into an `InternalCheckError` finding; the remaining checks still run.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{PortfolioConfig, ToleranceConfig};
use crate::error::CheckError;
use crate::model::{
    Category, FieldValue, Finding, FindingKind, OverviewRow, Portfolio, PropertyRecord, SpendLine, View,
};
use crate::parse::{format_cents, looks_like_frequency, parse_financial_number};

/// Placeholder spellings that mean "not known" in contract fields.
const CONTRACT_SENTINELS: &[&str] = &[
    "tbd",
    "tba",
    "unknown",
    "n/a",
    "na",
    "none",
    "-",
    "--",
    "?",
    "pending",
    "not specified",
    "not provided",
];

struct CheckContext<'a> {
    config: &'a PortfolioConfig,
    portfolio: &'a Portfolio,
}

type Check = fn(&CheckContext<'_>, &PropertyRecord) -> Result<Vec<Finding>, CheckError>;

/// Per-property checks, in reporting order.
const CHECKS: &[(&str, Check)] = &[
    ("missing_from_view", check_missing_from_view),
    ("type_corruption", check_type_corruption),
    ("unit_count", check_unit_counts),
    ("container_count", check_container_count),
    ("category_sum", check_category_sum),
    ("base_equals_tax", check_base_equals_tax),
    ("contract_fields", check_contract_fields),
];

/// Run every check over every property. Always completes.
pub fn validate(portfolio: &Portfolio, config: &PortfolioConfig) -> Vec<Finding> {
    let ctx = CheckContext { config, portfolio };
    let mut findings = Vec::new();

    for record in portfolio.ordered() {
        for (name, check) in CHECKS {
            match check(&ctx, record) {
                Ok(found) => {
                    log::debug!("{}: check {name} produced {} finding(s)", record.name, found.len());
                    findings.extend(found);
                }
                Err(e) => {
                    log::warn!("{}: check {name} failed: {e}", record.name);
                    findings.push(Finding::new(
                        &record.name,
                        FindingKind::InternalCheckError,
                        format!("check '{name}' failed: {e}"),
                    ));
                }
            }
        }
    }

    findings.extend(check_name_inconsistency(portfolio));
    findings
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The property's single overview row. Duplicate rows are fine only when
/// they agree.
fn overview_row(record: &PropertyRecord) -> Result<Option<&OverviewRow>, CheckError> {
    let Some(first) = record.overview.first() else {
        return Ok(None);
    };
    if record.overview.iter().skip(1).any(|r| !first.same_values(r)) {
        return Err(CheckError::AmbiguousRows {
            view: View::Overview.to_string(),
            rows: record.overview.len(),
        });
    }
    Ok(Some(first))
}

fn checked_sum(mut values: impl Iterator<Item = i64>, what: &str) -> Result<i64, CheckError> {
    values.try_fold(0i64, |acc, v| {
        acc.checked_add(v).ok_or_else(|| CheckError::Overflow { what: what.to_string() })
    })
}

pub fn is_contract_sentinel(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v.is_empty() || CONTRACT_SENTINELS.contains(&v.as_str())
}

fn signed_cents(cents: i64) -> String {
    if cents >= 0 {
        format!("+{}", format_cents(cents))
    } else {
        format_cents(cents)
    }
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

fn check_missing_from_view(ctx: &CheckContext<'_>, record: &PropertyRecord) -> Result<Vec<Finding>, CheckError> {
    let mut out = Vec::new();
    for view in View::ALL {
        if record.appears_in(view) {
            continue;
        }
        let sheet = ctx.config.sheets.for_view(view);
        let detail = if ctx.portfolio.views_found.contains(&view) {
            format!("'{}' has no row in {sheet}", record.name)
        } else {
            format!("{sheet} was not loaded, so '{}' is absent from it", record.name)
        };
        out.push(
            Finding::new(&record.name, FindingKind::MissingFromView, detail)
                .in_view(view),
        );
    }
    Ok(out)
}

fn check_type_corruption(_ctx: &CheckContext<'_>, record: &PropertyRecord) -> Result<Vec<Finding>, CheckError> {
    let mut out = Vec::new();
    let corrupt = |field: &str, value: &FieldValue, expected: &str, note: &str| {
        Finding::new(
            &record.name,
            FindingKind::TypeCorruption,
            format!("{field} holds '{value}' but should be {expected}{note}"),
        )
        .in_view(View::Overview)
        .on_field(field)
        .with_values(expected, value.to_string())
    };

    for row in &record.overview {
        if let Some(ref value) = row.service_type {
            let bad = match value {
                FieldValue::Text(s) => parse_financial_number(s).is_some(),
                FieldValue::Number(_) | FieldValue::Bool(_) | FieldValue::Date(_) => true,
            };
            if bad {
                out.push(corrupt("Service Type", value, "categorical text", ""));
            }
        }

        if let Some(ref value) = row.container_count {
            if row.container_count().is_none() {
                let note = match value {
                    FieldValue::Text(s) if looks_like_frequency(s) => " (looks like a pickup frequency)",
                    _ => "",
                };
                out.push(corrupt("Container Count", value, "a whole number", note));
            }
        }

        if let Some(ref value) = row.units {
            if row.units().is_none() {
                out.push(corrupt("Units", value, "a positive whole number", ""));
            }
        }

        if let Some(ref pt) = row.property_type {
            if parse_financial_number(pt).is_some() {
                out.push(corrupt("Property Type", &FieldValue::Text(pt.clone()), "categorical text", ""));
            }
        }
    }
    Ok(out)
}

fn check_unit_counts(ctx: &CheckContext<'_>, record: &PropertyRecord) -> Result<Vec<Finding>, CheckError> {
    let mut sources: Vec<(String, u32)> = Vec::new();

    if let Some(units) = ctx.config.property(&record.name).and_then(|p| p.units) {
        sources.push(("config".into(), units));
    }
    if let Some(units) = overview_row(record)?.and_then(|r| r.units()) {
        sources.push((View::Overview.to_string(), units));
    }
    let service_units: BTreeSet<u32> = record.service_details.iter().filter_map(|s| s.units).collect();
    for units in service_units {
        sources.push((View::ServiceDetails.to_string(), units));
    }
    let contract_units: BTreeSet<u32> = record.contract_terms.iter().filter_map(|c| c.units).collect();
    for units in contract_units {
        sources.push((View::ContractTerms.to_string(), units));
    }

    let distinct: BTreeSet<u32> = sources.iter().map(|(_, u)| *u).collect();
    if distinct.len() <= 1 {
        return Ok(Vec::new());
    }

    let listing = sources
        .iter()
        .map(|(src, u)| format!("{src}={u}"))
        .collect::<Vec<_>>()
        .join(", ");
    let (first_src, first) = &sources[0];
    let actual = sources
        .iter()
        .filter(|(_, u)| u != first)
        .map(|(src, u)| format!("{src}={u}"))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(vec![Finding::new(
        &record.name,
        FindingKind::UnitCountMismatch,
        format!("unit counts disagree: {listing}"),
    )
    .on_field("units")
    .with_values(format!("{first_src}={first}"), actual)])
}

fn check_container_count(ctx: &CheckContext<'_>, record: &PropertyRecord) -> Result<Vec<Finding>, CheckError> {
    let Some(expected) = overview_row(record)?.and_then(|r| r.container_count()) else {
        return Ok(Vec::new());
    };
    let expected = i64::from(expected);
    let mut out = Vec::new();

    if !record.service_details.is_empty() {
        let summed = checked_sum(
            record.service_details.iter().filter_map(|s| s.quantity).map(i64::from),
            "service detail quantities",
        )?;
        if summed != expected {
            let missing_qty = record.service_details.iter().filter(|s| s.quantity.is_none()).count();
            let mut detail = format!("overview records {expected} container(s) but service details sum to {summed}");
            if missing_qty > 0 {
                detail.push_str(&format!(" ({missing_qty} service row(s) have no quantity)"));
            }
            out.push(
                Finding::new(&record.name, FindingKind::ContainerCountMismatch, detail)
                    .in_view(View::ServiceDetails)
                    .on_field("Container Count")
                    .with_values(expected.to_string(), summed.to_string()),
            );
        }
    }

    // Configured containers drive the metrics, so they must agree too.
    let configured = ctx.config.property(&record.name).map(|p| p.containers.as_slice()).unwrap_or_default();
    if !configured.is_empty() {
        let summed = checked_sum(configured.iter().map(|c| i64::from(c.quantity)), "configured container quantities")?;
        if summed != expected {
            out.push(
                Finding::new(
                    &record.name,
                    FindingKind::ContainerCountMismatch,
                    format!("overview records {expected} container(s) but the portfolio config declares {summed}"),
                )
                .in_view(View::Overview)
                .on_field("Container Count")
                .with_values(expected.to_string(), summed.to_string()),
            );
        }
    }

    Ok(out)
}

fn check_category_sum(ctx: &CheckContext<'_>, record: &PropertyRecord) -> Result<Vec<Finding>, CheckError> {
    if record.category_spend.is_empty() {
        return Ok(Vec::new());
    }
    let tol: &ToleranceConfig = &ctx.config.tolerance;

    // Category-spend view side.
    let mut summary_by_cat: BTreeMap<Category, i64> = BTreeMap::new();
    let mut grand_total: Option<i64> = None;
    let summary_total = checked_sum(
        record.category_spend.iter().filter_map(|row| {
            let cents = row.total_cents?;
            match row.line {
                SpendLine::Category(c) => {
                    let slot = summary_by_cat.entry(c).or_insert(0);
                    *slot = slot.saturating_add(cents);
                    Some(cents)
                }
                SpendLine::Uncategorized => Some(cents),
                SpendLine::GrandTotal => {
                    grand_total = Some(cents);
                    None
                }
            }
        }),
        "category spend totals",
    )?;

    // Ledger side.
    let items = record.line_items();
    let ledger_total = checked_sum(items.iter().filter_map(|i| i.amount_cents()), "line items")?;
    let uncategorized = checked_sum(
        items.iter().filter(|i| i.category.is_none()).filter_map(|i| i.amount_cents()),
        "uncategorized line items",
    )?;
    let mut ledger_by_cat: BTreeMap<Category, i64> = BTreeMap::new();
    for item in items {
        if let (Some(cat), Some(cents)) = (item.category, item.amount_cents()) {
            let slot = ledger_by_cat.entry(cat).or_insert(0);
            *slot = slot.checked_add(cents).ok_or_else(|| CheckError::Overflow {
                what: format!("{cat} line items"),
            })?;
        }
    }

    let delta = summary_total
        .checked_sub(ledger_total)
        .ok_or_else(|| CheckError::Overflow { what: "category delta".into() })?;
    if tol.within(delta) {
        return Ok(Vec::new());
    }

    let mut detail = format!(
        "category totals {} vs line items {} (delta {})",
        format_cents(summary_total),
        format_cents(ledger_total),
        signed_cents(delta),
    );
    if record.line_items.is_none() {
        detail.push_str("; line items unavailable for this property");
    } else if uncategorized != 0 {
        let cause = if tol.within(delta.saturating_add(uncategorized)) {
            "which accounts for the difference"
        } else {
            "which does not account for the difference"
        };
        detail.push_str(&format!("; uncategorized line items total {} {cause}", format_cents(uncategorized)));
    } else {
        detail.push_str("; no uncategorized line items, cause unexplained");
    }

    let per_cat: Vec<String> = Category::ALL
        .iter()
        .filter_map(|c| {
            let s = summary_by_cat.get(c).copied().unwrap_or(0);
            let l = ledger_by_cat.get(c).copied().unwrap_or(0);
            let d = s.saturating_sub(l);
            (!tol.within(d)).then(|| format!("{c} {}", signed_cents(d)))
        })
        .collect();
    if !per_cat.is_empty() {
        detail.push_str(&format!("; by category: {}", per_cat.join(", ")));
    }

    if let Some(gt) = grand_total {
        let gap = gt.saturating_sub(summary_total);
        if !tol.within(gap) {
            detail.push_str(&format!(
                "; recorded grand total {} differs from category sum by {}",
                format_cents(gt),
                signed_cents(gap)
            ));
        }
    }

    Ok(vec![Finding::new(&record.name, FindingKind::CategorySumMismatch, detail)
        .in_view(View::CategorySpend)
        .with_values(format_cents(ledger_total), format_cents(summary_total))
        .with_delta(delta)])
}

fn check_base_equals_tax(ctx: &CheckContext<'_>, record: &PropertyRecord) -> Result<Vec<Finding>, CheckError> {
    let total_for = |cat: Category| -> Result<Option<i64>, CheckError> {
        let rows: Vec<i64> = record
            .category_spend
            .iter()
            .filter(|r| r.line == SpendLine::Category(cat))
            .filter_map(|r| r.total_cents)
            .collect();
        if rows.is_empty() {
            return Ok(None);
        }
        checked_sum(rows.into_iter(), cat.as_str()).map(Some)
    };

    let (Some(base), Some(tax)) = (total_for(Category::Base)?, total_for(Category::Tax)?) else {
        return Ok(Vec::new());
    };
    if base == 0 || !ctx.config.tolerance.within(base.saturating_sub(tax)) {
        return Ok(Vec::new());
    }

    Ok(vec![Finding::new(
        &record.name,
        FindingKind::SuspiciousBaseEqualsTax,
        format!(
            "base and tax both total {}: tax-inclusive pricing or an extraction error",
            format_cents(base)
        ),
    )
    .in_view(View::CategorySpend)
    .with_values(format_cents(base), format_cents(tax))])
}

fn check_contract_fields(_ctx: &CheckContext<'_>, record: &PropertyRecord) -> Result<Vec<Finding>, CheckError> {
    let mut out = Vec::new();
    for term in &record.contract_terms {
        for (field, value) in term.fields() {
            let missing = value.map_or(true, is_contract_sentinel);
            if !missing {
                continue;
            }
            let shown = value.map(str::trim).filter(|v| !v.is_empty()).unwrap_or("blank");
            out.push(
                Finding::new(
                    &record.name,
                    FindingKind::ContractFieldMissing,
                    format!("contract {field} is missing ({shown})"),
                )
                .in_view(View::ContractTerms)
                .on_field(field),
            );
        }
    }
    Ok(out)
}

/// Portfolio-wide: names where one contains the other, case-insensitively.
/// Candidates only; nothing is merged.
fn check_name_inconsistency(portfolio: &Portfolio) -> Vec<Finding> {
    let names: Vec<&str> = portfolio.ordered().iter().map(|r| r.name.as_str()).collect();
    let mut out = Vec::new();

    for (i, a) in names.iter().enumerate() {
        let a_norm = a.trim().to_lowercase();
        if a_norm.is_empty() {
            continue;
        }
        for b in &names[i + 1..] {
            let b_norm = b.trim().to_lowercase();
            if b_norm.is_empty() || a == b {
                continue;
            }
            if a_norm.contains(&b_norm) || b_norm.contains(&a_norm) {
                let views_a = views_of(portfolio, a);
                let views_b = views_of(portfolio, b);
                out.push(
                    Finding::new(
                        *a,
                        FindingKind::NameInconsistency,
                        format!("'{a}' [{views_a}] and '{b}' [{views_b}] may name the same property"),
                    )
                    .with_values(*a, *b),
                );
            }
        }
    }
    out
}

fn views_of(portfolio: &Portfolio, name: &str) -> String {
    let Some(rec) = portfolio.get(name) else {
        return String::new();
    };
    let views: Vec<&str> = View::ALL
        .iter()
        .filter(|v| rec.appears_in(**v))
        .map(|v| v.as_str())
        .collect();
    if views.is_empty() {
        "no views".into()
    } else {
        views.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CategorySpendRow, ContractTerm, InvoiceLineItem, ServiceConfigEntry, Frequency};

    fn spend(property: &str, line: SpendLine, cents: i64) -> CategorySpendRow {
        CategorySpendRow { property: property.into(), row: 0, line, total_cents: Some(cents) }
    }

    fn complete_contract(property: &str) -> ContractTerm {
        ContractTerm {
            vendor: Some("Republic".into()),
            start_date: Some("2023-01-01".into()),
            term: Some("36 months".into()),
            renewal_clause: Some("auto-renew 12 months".into()),
            notice_period: Some("90 days".into()),
            ..ContractTerm::new(property)
        }
    }

    /// One property present in every view, internally consistent.
    fn clean_portfolio(name: &str) -> Portfolio {
        let mut p = Portfolio::new();
        let mut ov = OverviewRow::new(name);
        ov.units = Some(FieldValue::Number(200.0));
        ov.container_count = Some(FieldValue::Number(2.0));
        ov.service_type = Some(FieldValue::Text("Front Load".into()));
        p.add_overview(ov);
        p.add_service(ServiceConfigEntry::new(name, 8.0, 2, Frequency::PerWeek(2.0)));
        p.add_spend(spend(name, SpendLine::Category(Category::Base), 15_000));
        p.add_contract(complete_contract(name));
        p.set_line_items(
            name,
            vec![
                InvoiceLineItem::new(name, Some(Category::Base), 10_000),
                InvoiceLineItem::new(name, Some(Category::Base), 5_000),
            ],
        );
        p
    }

    fn kinds(findings: &[Finding]) -> Vec<FindingKind> {
        findings.iter().map(|f| f.kind).collect()
    }

    #[test]
    fn clean_portfolio_has_no_findings() {
        let p = clean_portfolio("Orion");
        let findings = validate(&p, &PortfolioConfig::default());
        assert!(findings.is_empty(), "unexpected: {findings:?}");
    }

    #[test]
    fn missing_from_one_view() {
        let mut p = clean_portfolio("X");
        p.records.get_mut("X").unwrap().contract_terms.clear();
        let findings = validate(&p, &PortfolioConfig::default());
        let missing: Vec<&Finding> = findings.iter().filter(|f| f.kind == FindingKind::MissingFromView).collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].view, Some(View::ContractTerms));
        assert_eq!(missing[0].property, "X");
    }

    #[test]
    fn category_sum_mismatch_reports_delta() {
        let mut p = clean_portfolio("P");
        p.records.get_mut("P").unwrap().category_spend = vec![spend("P", SpendLine::Category(Category::Base), 20_000)];
        let findings = validate(&p, &PortfolioConfig::default());
        let f = findings.iter().find(|f| f.kind == FindingKind::CategorySumMismatch).unwrap();
        assert_eq!(f.evidence.delta_cents, Some(5_000));
        assert_eq!(f.delta(), Some(50.0));
        assert!(f.detail.contains("base +$50.00"), "{}", f.detail);
    }

    #[test]
    fn category_sum_within_tolerance() {
        let mut p = clean_portfolio("P");
        p.records.get_mut("P").unwrap().category_spend = vec![spend("P", SpendLine::Category(Category::Base), 15_001)];
        let findings = validate(&p, &PortfolioConfig::default());
        assert!(!kinds(&findings).contains(&FindingKind::CategorySumMismatch));
    }

    #[test]
    fn uncategorized_items_explain_gap() {
        let mut p = clean_portfolio("P");
        p.records
            .get_mut("P")
            .unwrap()
            .line_items
            .as_mut()
            .unwrap()
            .push(InvoiceLineItem::new("P", None, 4_200));
        let findings = validate(&p, &PortfolioConfig::default());
        let f = findings.iter().find(|f| f.kind == FindingKind::CategorySumMismatch).unwrap();
        assert_eq!(f.evidence.delta_cents, Some(-4_200));
        assert!(f.detail.contains("accounts for the difference"), "{}", f.detail);
    }

    #[test]
    fn grand_total_row_is_excluded_from_sum() {
        let mut p = clean_portfolio("P");
        p.records
            .get_mut("P")
            .unwrap()
            .category_spend
            .push(spend("P", SpendLine::GrandTotal, 90_000));
        let findings = validate(&p, &PortfolioConfig::default());
        assert!(!kinds(&findings).contains(&FindingKind::CategorySumMismatch));
    }

    #[test]
    fn missing_ledger_with_spend_rows() {
        let mut p = clean_portfolio("P");
        p.records.get_mut("P").unwrap().line_items = None;
        let findings = validate(&p, &PortfolioConfig::default());
        let f = findings.iter().find(|f| f.kind == FindingKind::CategorySumMismatch).unwrap();
        assert!(f.detail.contains("line items unavailable"));
        assert_eq!(f.evidence.delta_cents, Some(15_000));
    }

    #[test]
    fn base_equals_tax_flagged() {
        let mut p = clean_portfolio("P");
        let rec = p.records.get_mut("P").unwrap();
        rec.category_spend = vec![
            spend("P", SpendLine::Category(Category::Base), 7_500),
            spend("P", SpendLine::Category(Category::Tax), 7_500),
        ];
        let findings = validate(&p, &PortfolioConfig::default());
        assert!(kinds(&findings).contains(&FindingKind::SuspiciousBaseEqualsTax));
    }

    #[test]
    fn type_corruption_per_field() {
        let mut p = clean_portfolio("P");
        let ov = &mut p.records.get_mut("P").unwrap().overview[0];
        ov.service_type = Some(FieldValue::Text("10".into()));
        ov.container_count = Some(FieldValue::Text("3x/week".into()));
        let findings = validate(&p, &PortfolioConfig::default());
        let corrupt: Vec<&Finding> = findings.iter().filter(|f| f.kind == FindingKind::TypeCorruption).collect();
        assert_eq!(corrupt.len(), 2);
        assert_eq!(corrupt[0].field.as_deref(), Some("Service Type"));
        assert_eq!(corrupt[1].field.as_deref(), Some("Container Count"));
        assert!(corrupt[1].detail.contains("pickup frequency"));
        // Corrupt count is not compared against service details.
        assert!(!kinds(&findings).contains(&FindingKind::ContainerCountMismatch));
    }

    #[test]
    fn unit_mismatch_across_views_and_config() {
        let mut p = clean_portfolio("P");
        p.records.get_mut("P").unwrap().contract_terms[0].units = Some(210);
        let config = PortfolioConfig::from_toml(
            r#"
name = "T"
[[properties]]
name = "P"
units = 200
"#,
        )
        .unwrap();
        let findings = validate(&p, &config);
        let f = findings.iter().find(|f| f.kind == FindingKind::UnitCountMismatch).unwrap();
        assert!(f.detail.contains("config=200"));
        assert!(f.detail.contains("contract_terms=210"));
    }

    #[test]
    fn container_count_mismatch() {
        let mut p = clean_portfolio("P");
        p.records.get_mut("P").unwrap().overview[0].container_count = Some(FieldValue::Number(3.0));
        let findings = validate(&p, &PortfolioConfig::default());
        let f = findings.iter().find(|f| f.kind == FindingKind::ContainerCountMismatch).unwrap();
        assert_eq!(f.evidence.expected.as_deref(), Some("3"));
        assert_eq!(f.evidence.actual.as_deref(), Some("2"));
    }

    #[test]
    fn contract_sentinels_are_missing() {
        let mut p = clean_portfolio("P");
        let term = &mut p.records.get_mut("P").unwrap().contract_terms[0];
        term.term = Some("TBD".into());
        term.notice_period = Some(" unknown ".into());
        term.renewal_clause = None;
        let findings = validate(&p, &PortfolioConfig::default());
        let fields: Vec<&str> = findings
            .iter()
            .filter(|f| f.kind == FindingKind::ContractFieldMissing)
            .filter_map(|f| f.field.as_deref())
            .collect();
        assert_eq!(fields, vec!["term", "renewal_clause", "notice_period"]);
    }

    #[test]
    fn name_variants_surface_without_merging() {
        let mut p = clean_portfolio("Orion Prosper Lakes");
        let other = clean_portfolio("Orion Prosper Lakes (Little Elm)");
        p.records.extend(other.records);
        let findings = validate(&p, &PortfolioConfig::default());
        let names: Vec<&Finding> = findings.iter().filter(|f| f.kind == FindingKind::NameInconsistency).collect();
        assert_eq!(names.len(), 1);
        assert_eq!(p.records.len(), 2);
    }

    #[test]
    fn conflicting_overview_rows_become_internal_error() {
        let mut p = clean_portfolio("P");
        let mut dup = p.records["P"].overview[0].clone();
        dup.units = Some(FieldValue::Number(999.0));
        p.records.get_mut("P").unwrap().overview.push(dup);
        let findings = validate(&p, &PortfolioConfig::default());
        let internal = findings.iter().filter(|f| f.kind == FindingKind::InternalCheckError).count();
        // unit_count and container_count both read the overview row.
        assert_eq!(internal, 2);
        // Checks after the failing ones still ran.
        assert!(findings.iter().all(|f| f.property == "P"));
    }

    #[test]
    fn overflow_becomes_internal_error() {
        let mut p = clean_portfolio("P");
        p.records.get_mut("P").unwrap().category_spend = vec![
            spend("P", SpendLine::Category(Category::Base), i64::MAX),
            spend("P", SpendLine::Category(Category::Tax), i64::MAX),
        ];
        let findings = validate(&p, &PortfolioConfig::default());
        assert!(kinds(&findings).contains(&FindingKind::InternalCheckError));
    }

    #[test]
    fn huge_container_quantities_do_not_abort_the_run() {
        let mut p = clean_portfolio("Big");
        p.records.get_mut("Big").unwrap().service_details = vec![
            ServiceConfigEntry::new("Big", 8.0, 3_000_000_000, Frequency::PerWeek(1.0)),
            ServiceConfigEntry::new("Big", 8.0, 3_000_000_000, Frequency::PerWeek(1.0)),
        ];
        p.records.extend(clean_portfolio("Other").records);
        let findings = validate(&p, &PortfolioConfig::default());
        let mismatch = findings
            .iter()
            .find(|f| f.property == "Big" && f.kind == FindingKind::ContainerCountMismatch)
            .unwrap();
        assert_eq!(mismatch.evidence.actual.as_deref(), Some("6000000000"));
        assert!(findings.iter().all(|f| f.property == "Big"));
    }

    fn config_with_quantity(quantity: u32) -> PortfolioConfig {
        let toml = format!(
            r#"
name = "T"

[[properties]]
name = "P"
units = 200

[[properties.containers]]
size_yards = 8
quantity = {quantity}
frequency = "2x/week"
"#
        );
        PortfolioConfig::from_toml(&toml).unwrap()
    }

    #[test]
    fn configured_containers_checked_against_overview() {
        let mut p = clean_portfolio("P");
        p.records.get_mut("P").unwrap().service_details.clear();

        let findings = validate(&p, &config_with_quantity(3));
        let f = findings.iter().find(|f| f.kind == FindingKind::ContainerCountMismatch).unwrap();
        assert!(f.detail.contains("portfolio config declares 3"));
        assert_eq!(f.view, Some(View::Overview));
        assert_eq!(f.evidence.expected.as_deref(), Some("2"));
        assert_eq!(f.evidence.actual.as_deref(), Some("3"));

        let findings = validate(&p, &config_with_quantity(2));
        assert!(!kinds(&findings).contains(&FindingKind::ContainerCountMismatch));
    }

    #[test]
    fn validator_is_idempotent() {
        let mut p = clean_portfolio("A");
        p.records.get_mut("A").unwrap().service_details.clear();
        p.record_mut("B");
        let config = PortfolioConfig::default();
        assert_eq!(validate(&p, &config), validate(&p, &config));
    }
}
