//! Metrics Calculator: canonical per-property metrics from raw line items
//! and container configuration, independent of cached view totals.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Datelike;

use crate::config::{PortfolioConfig, ToleranceConfig};
use crate::model::{
    BenchmarkBand, BenchmarkStatus, Category, Frequency, InvoiceLineItem, MetricsRecord, Portfolio,
    PropertyRecord, ServiceConfigEntry, ValueSource,
};

/// Everything the calculator needs for one property.
#[derive(Debug, Clone)]
pub struct MetricsInput<'a> {
    pub property: &'a str,
    pub line_items: &'a [InvoiceLineItem],
    pub containers: Vec<ServiceConfigEntry>,
    pub containers_source: ValueSource,
    pub units: Option<u32>,
    pub units_source: ValueSource,
    pub band: Option<BenchmarkBand>,
}

/// num ÷ den, or None for a zero / non-finite denominator.
pub fn ratio(num: f64, den: f64) -> Option<f64> {
    if den == 0.0 || !den.is_finite() || !num.is_finite() {
        None
    } else {
        Some(num / den)
    }
}

pub fn benchmark_status(yards_per_door: Option<f64>, band: Option<BenchmarkBand>) -> BenchmarkStatus {
    match (yards_per_door, band) {
        (Some(ypd), Some(band)) if ypd < band.min => BenchmarkStatus::BelowRange,
        (Some(ypd), Some(band)) if ypd > band.max => BenchmarkStatus::AboveRange,
        (Some(_), Some(_)) => BenchmarkStatus::WithinRange,
        _ => BenchmarkStatus::Undefined,
    }
}

/// Resolve config-versus-workbook precedence for one property.
pub fn input_for<'a>(record: &'a PropertyRecord, config: &PortfolioConfig) -> MetricsInput<'a> {
    let prop_config = config.property(&record.name);
    let overview = record.overview.first();

    let configured = prop_config.map(|p| p.service_entries()).unwrap_or_default();
    let (containers, containers_source) = if !configured.is_empty() {
        (configured, ValueSource::Config)
    } else if !record.service_details.is_empty() {
        (record.service_details.clone(), ValueSource::Workbook)
    } else {
        (Vec::new(), ValueSource::Missing)
    };

    let (units, units_source) = match (prop_config.and_then(|p| p.units), overview.and_then(|o| o.units())) {
        (Some(u), _) => (Some(u), ValueSource::Config),
        (None, Some(u)) => (Some(u), ValueSource::Workbook),
        (None, None) => (None, ValueSource::Missing),
    };

    let property_type = prop_config
        .and_then(|p| p.property_type.clone())
        .or_else(|| overview.and_then(|o| o.property_type.clone()));
    let band = property_type.as_deref().and_then(|t| config.band_for(t));

    MetricsInput {
        property: &record.name,
        line_items: record.line_items(),
        containers,
        containers_source,
        units,
        units_source,
        band,
    }
}

/// Compute the fixed metrics record. Never fails; undefined ratios are None.
pub fn compute(input: &MetricsInput<'_>, tolerance: &ToleranceConfig) -> MetricsRecord {
    let items = input.line_items;

    let mut total_spend_cents: i64 = 0;
    let mut uncategorized_cents: i64 = 0;
    let mut category_totals: BTreeMap<Category, i64> = BTreeMap::new();
    let mut unpriced_line_items = 0;
    for item in items {
        let Some(cents) = item.amount_cents() else {
            unpriced_line_items += 1;
            continue;
        };
        total_spend_cents = total_spend_cents.saturating_add(cents);
        match item.category {
            Some(cat) => {
                let slot = category_totals.entry(cat).or_insert(0);
                *slot = slot.saturating_add(cents);
            }
            None => uncategorized_cents = uncategorized_cents.saturating_add(cents),
        }
    }

    let invoices: BTreeSet<&str> = items
        .iter()
        .filter_map(|i| i.invoice_number.as_deref())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .collect();
    let months: BTreeSet<(i32, u32)> = items
        .iter()
        .filter_map(|i| i.billing_date())
        .map(|d| (d.year(), d.month()))
        .collect();

    let total_dollars = total_spend_cents as f64 / 100.0;
    let average_monthly_spend = ratio(total_dollars, months.len() as f64);
    let cost_per_unit = average_monthly_spend.and_then(|avg| ratio(avg, f64::from(input.units.unwrap_or(0))));

    let mut monthly_yards = 0.0;
    let mut on_call_containers: u32 = 0;
    let mut incomplete_container_rows = 0;
    for entry in &input.containers {
        match (entry.frequency, entry.monthly_yards()) {
            (Some(Frequency::OnCall), _) => {
                on_call_containers = on_call_containers.saturating_add(entry.quantity.unwrap_or(0));
            }
            (_, Some(yards)) => monthly_yards += yards,
            (_, None) => incomplete_container_rows += 1,
        }
    }
    let yards_per_door = match input.containers_source {
        ValueSource::Missing => None,
        _ => ratio(monthly_yards, f64::from(input.units.unwrap_or(0))),
    };

    let overage_cents = category_totals.get(&Category::Overage).copied().unwrap_or(0);
    let overage_ratio = ratio(overage_cents as f64, total_spend_cents as f64);

    let tons: Vec<f64> = items.iter().filter_map(|i| i.tonnage).collect();
    let total_tons = (!tons.is_empty()).then(|| tons.iter().sum::<f64>());
    let cost_per_ton = total_tons.and_then(|t| ratio(total_dollars, t));

    let divergent_line_items = items
        .iter()
        .filter_map(|i| i.extension_delta_cents())
        .filter(|d| !tolerance.within(*d))
        .count();

    let record = MetricsRecord {
        property: input.property.to_string(),
        total_spend_cents,
        invoice_count: invoices.len(),
        active_months: months.len(),
        average_monthly_spend,
        unit_count: input.units,
        units_source: input.units_source,
        cost_per_unit,
        monthly_yards,
        containers_source: input.containers_source,
        on_call_containers,
        incomplete_container_rows,
        yards_per_door,
        category_totals,
        uncategorized_cents,
        overage_ratio,
        total_tons,
        cost_per_ton,
        divergent_line_items,
        unpriced_line_items,
        benchmark_band: input.band,
        benchmark: benchmark_status(yards_per_door, input.band),
    };
    log::debug!(
        "{}: spend={} months={} ypd={:?} benchmark={}",
        record.property,
        record.total_spend_cents,
        record.active_months,
        record.yards_per_door,
        record.benchmark
    );
    record
}

/// Metrics for every property, in processing order.
pub fn compute_all(portfolio: &Portfolio, config: &PortfolioConfig) -> Vec<MetricsRecord> {
    portfolio
        .ordered()
        .into_iter()
        .map(|record| compute(&input_for(record, config), &config.tolerance))
        .collect()
}
