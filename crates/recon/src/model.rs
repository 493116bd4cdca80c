use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::parse::{parse_financial_number, whole_number};

/// Weeks per month used for every pickup-volume conversion.
pub const WEEKS_PER_MONTH: f64 = 4.33;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Financial purpose of an invoice line. Unassigned lines carry `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Base,
    Tax,
    Overage,
    ExtraPickup,
    Admin,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Base,
        Category::Tax,
        Category::Overage,
        Category::ExtraPickup,
        Category::Admin,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Tax => "tax",
            Self::Overage => "overage",
            Self::ExtraPickup => "extra_pickup",
            Self::Admin => "admin",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four derived views cross-checked against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Overview,
    ServiceDetails,
    CategorySpend,
    ContractTerms,
}

impl View {
    pub const ALL: [View; 4] = [View::Overview, View::ServiceDetails, View::CategorySpend, View::ContractTerms];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::ServiceDetails => "service_details",
            Self::CategorySpend => "category_spend",
            Self::ContractTerms => "contract_terms",
        }
    }

    /// Default sheet name for this view.
    pub fn default_sheet(&self) -> &'static str {
        match self {
            Self::Overview => "Property Overview",
            Self::ServiceDetails => "Service Details",
            Self::CategorySpend => "Spend by Category",
            Self::ContractTerms => "Contract Terms",
        }
    }

    pub fn parse(s: &str) -> Option<View> {
        match crate::parse::normalize_key(s).as_str() {
            "overview" | "property_overview" => Some(Self::Overview),
            "service_details" | "service" | "services" => Some(Self::ServiceDetails),
            "category_spend" | "spend_by_category" | "spend" => Some(Self::CategorySpend),
            "contract_terms" | "contract" | "contracts" => Some(Self::ContractTerms),
            _ => None,
        }
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Cell values
// ---------------------------------------------------------------------------

/// An untyped cell value as read from the source.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    Text(String),
}

impl FieldValue {
    /// Number, or text that parses as a financial number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => parse_financial_number(s),
            Self::Bool(_) | Self::Date(_) => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            Self::Text(s) => crate::parse::parse_date(s),
            Self::Number(_) | Self::Bool(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_number().is_some()
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Self::Date(d) => write!(f, "{d}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Pickup frequency of a container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    PerWeek(f64),
    OnCall,
}

// ---------------------------------------------------------------------------
// View rows
// ---------------------------------------------------------------------------

/// One row of the Property Overview view. Typed columns stay raw so the
/// validator can report values of the wrong kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewRow {
    pub property: String,
    pub row: usize,
    pub units: Option<FieldValue>,
    pub container_count: Option<FieldValue>,
    pub service_type: Option<FieldValue>,
    pub property_type: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub vendor: Option<String>,
}

impl OverviewRow {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            row: 0,
            units: None,
            container_count: None,
            service_type: None,
            property_type: None,
            city: None,
            state: None,
            vendor: None,
        }
    }

    pub fn units(&self) -> Option<u32> {
        self.units.as_ref()?.as_number().and_then(whole_number).filter(|n| *n > 0)
    }

    pub fn container_count(&self) -> Option<u32> {
        self.container_count.as_ref()?.as_number().and_then(whole_number)
    }

    /// Same content ignoring the source row number.
    pub fn same_values(&self, other: &OverviewRow) -> bool {
        Self { row: 0, ..self.clone() } == Self { row: 0, ..other.clone() }
    }
}

/// One container line of the Service Details view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceConfigEntry {
    pub property: String,
    pub row: usize,
    pub container_type: Option<String>,
    pub size_yards: Option<f64>,
    pub quantity: Option<u32>,
    pub frequency: Option<Frequency>,
    pub units: Option<u32>,
}

impl ServiceConfigEntry {
    pub fn new(property: impl Into<String>, size_yards: f64, quantity: u32, frequency: Frequency) -> Self {
        Self {
            property: property.into(),
            row: 0,
            container_type: None,
            size_yards: Some(size_yards),
            quantity: Some(quantity),
            frequency: Some(frequency),
            units: None,
        }
    }

    /// size × quantity × pickups-per-week × weeks-per-month. None for on-call
    /// or incomplete rows.
    pub fn monthly_yards(&self) -> Option<f64> {
        let per_week = match self.frequency? {
            Frequency::PerWeek(n) => n,
            Frequency::OnCall => return None,
        };
        Some(self.size_yards? * f64::from(self.quantity?) * per_week * WEEKS_PER_MONTH)
    }
}

/// What a Spend by Category row stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendLine {
    Category(Category),
    Uncategorized,
    /// A recorded "Total" row. Never part of the category sum.
    GrandTotal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySpendRow {
    pub property: String,
    pub row: usize,
    pub line: SpendLine,
    pub total_cents: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractTerm {
    pub property: String,
    pub row: usize,
    pub vendor: Option<String>,
    pub start_date: Option<String>,
    pub term: Option<String>,
    pub renewal_clause: Option<String>,
    pub notice_period: Option<String>,
    pub units: Option<u32>,
}

impl ContractTerm {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            row: 0,
            vendor: None,
            start_date: None,
            term: None,
            renewal_clause: None,
            notice_period: None,
            units: None,
        }
    }

    /// Field label and raw value for each tracked contract field.
    pub fn fields(&self) -> [(&'static str, Option<&str>); 5] {
        [
            ("vendor", self.vendor.as_deref()),
            ("contract_start", self.start_date.as_deref()),
            ("term", self.term.as_deref()),
            ("renewal_clause", self.renewal_clause.as_deref()),
            ("notice_period", self.notice_period.as_deref()),
        ]
    }
}

/// A raw invoice line for one property.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceLineItem {
    pub property: String,
    pub row: usize,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub description: String,
    pub category: Option<Category>,
    pub quantity: Option<f64>,
    pub unit_rate: Option<f64>,
    /// Recorded extended amount, kept as-is even when it disagrees with
    /// quantity × rate.
    pub extended_cents: Option<i64>,
    pub vendor: Option<String>,
    pub service_type: Option<String>,
    pub tonnage: Option<f64>,
}

impl InvoiceLineItem {
    pub fn new(property: impl Into<String>, category: Option<Category>, extended_cents: i64) -> Self {
        Self {
            property: property.into(),
            row: 0,
            invoice_number: None,
            invoice_date: None,
            period_start: None,
            period_end: None,
            description: String::new(),
            category,
            quantity: None,
            unit_rate: None,
            extended_cents: Some(extended_cents),
            vendor: None,
            service_type: None,
            tonnage: None,
        }
    }

    fn computed_cents(&self) -> Option<i64> {
        crate::parse::to_cents(self.quantity? * self.unit_rate?)
    }

    /// Recorded amount, or quantity × rate when nothing was recorded.
    pub fn amount_cents(&self) -> Option<i64> {
        self.extended_cents.or_else(|| self.computed_cents())
    }

    /// recorded − (quantity × rate), when both sides exist.
    pub fn extension_delta_cents(&self) -> Option<i64> {
        Some(self.extended_cents?.saturating_sub(self.computed_cents()?))
    }

    /// The month this line is billed in: invoice date, else service start.
    pub fn billing_date(&self) -> Option<NaiveDate> {
        self.invoice_date.or(self.period_start)
    }
}

// ---------------------------------------------------------------------------
// Portfolio arena
// ---------------------------------------------------------------------------

/// Everything loaded for one property name, across all views.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PropertyRecord {
    pub name: String,
    pub overview: Vec<OverviewRow>,
    pub service_details: Vec<ServiceConfigEntry>,
    pub category_spend: Vec<CategorySpendRow>,
    pub contract_terms: Vec<ContractTerm>,
    /// None when the property's line-item sheet could not be loaded.
    pub line_items: Option<Vec<InvoiceLineItem>>,
}

impl PropertyRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn appears_in(&self, view: View) -> bool {
        match view {
            View::Overview => !self.overview.is_empty(),
            View::ServiceDetails => !self.service_details.is_empty(),
            View::CategorySpend => !self.category_spend.is_empty(),
            View::ContractTerms => !self.contract_terms.is_empty(),
        }
    }

    pub fn in_any_view(&self) -> bool {
        View::ALL.iter().any(|v| self.appears_in(*v))
    }

    pub fn line_items(&self) -> &[InvoiceLineItem] {
        self.line_items.as_deref().unwrap_or(&[])
    }
}

/// In-memory store: property name → record, plus processing order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Portfolio {
    pub records: BTreeMap<String, PropertyRecord>,
    /// Declared processing order. Names not listed run after, alphabetically.
    pub order: Vec<String>,
    /// View sheets that were found in the source.
    pub views_found: BTreeSet<View>,
}

impl Portfolio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_mut(&mut self, name: &str) -> &mut PropertyRecord {
        self.records
            .entry(name.to_string())
            .or_insert_with(|| PropertyRecord::new(name))
    }

    pub fn get(&self, name: &str) -> Option<&PropertyRecord> {
        self.records.get(name)
    }

    /// Records in processing order.
    pub fn ordered(&self) -> Vec<&PropertyRecord> {
        let mut out: Vec<&PropertyRecord> = Vec::with_capacity(self.records.len());
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for name in &self.order {
            if let Some(rec) = self.records.get(name) {
                if seen.insert(name.as_str()) {
                    out.push(rec);
                }
            }
        }
        for (name, rec) in &self.records {
            if !seen.contains(name.as_str()) {
                out.push(rec);
            }
        }
        out
    }

    pub fn add_overview(&mut self, row: OverviewRow) {
        self.views_found.insert(View::Overview);
        self.record_mut(&row.property.clone()).overview.push(row);
    }

    pub fn add_service(&mut self, row: ServiceConfigEntry) {
        self.views_found.insert(View::ServiceDetails);
        self.record_mut(&row.property.clone()).service_details.push(row);
    }

    pub fn add_spend(&mut self, row: CategorySpendRow) {
        self.views_found.insert(View::CategorySpend);
        self.record_mut(&row.property.clone()).category_spend.push(row);
    }

    pub fn add_contract(&mut self, row: ContractTerm) {
        self.views_found.insert(View::ContractTerms);
        self.record_mut(&row.property.clone()).contract_terms.push(row);
    }

    pub fn set_line_items(&mut self, property: &str, items: Vec<InvoiceLineItem>) {
        self.record_mut(property).line_items = Some(items);
    }
}

// ---------------------------------------------------------------------------
// Load warnings
// ---------------------------------------------------------------------------

/// Recoverable problems met while loading. None of these abort a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadWarning {
    SheetNotFound { sheet: String },
    ColumnNotFound { sheet: String, column: String },
    UnparseableValue { sheet: String, row: usize, column: String, value: String },
    UnknownCategory { sheet: String, row: usize, value: String },
}

impl std::fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SheetNotFound { sheet } => write!(f, "sheet '{sheet}' not found"),
            Self::ColumnNotFound { sheet, column } => {
                write!(f, "sheet '{sheet}': column '{column}' not found")
            }
            Self::UnparseableValue { sheet, row, column, value } => {
                write!(f, "sheet '{sheet}', row {row}: cannot parse {column} '{value}'")
            }
            Self::UnknownCategory { sheet, row, value } => {
                write!(f, "sheet '{sheet}', row {row}: unknown category '{value}' (treated as uncategorized)")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    MissingFromView,
    UnitCountMismatch,
    ContainerCountMismatch,
    CategorySumMismatch,
    SuspiciousBaseEqualsTax,
    TypeCorruption,
    NameInconsistency,
    ContractFieldMissing,
    InternalCheckError,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingFromView => "missing_from_view",
            Self::UnitCountMismatch => "unit_count_mismatch",
            Self::ContainerCountMismatch => "container_count_mismatch",
            Self::CategorySumMismatch => "category_sum_mismatch",
            Self::SuspiciousBaseEqualsTax => "suspicious_base_equals_tax",
            Self::TypeCorruption => "type_corruption",
            Self::NameInconsistency => "name_inconsistency",
            Self::ContractFieldMissing => "contract_field_missing",
            Self::InternalCheckError => "internal_check_error",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::MissingFromView
            | Self::UnitCountMismatch
            | Self::CategorySumMismatch
            | Self::TypeCorruption
            | Self::InternalCheckError => Severity::Error,
            Self::ContainerCountMismatch | Self::SuspiciousBaseEqualsTax | Self::NameInconsistency => {
                Severity::Warning
            }
            Self::ContractFieldMissing => Severity::Info,
        }
    }
}

impl std::fmt::Display for FindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Evidence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_cents: Option<i64>,
}

/// A single advisory inconsistency. Nothing here is ever auto-corrected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub property: String,
    pub kind: FindingKind,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub detail: String,
    pub evidence: Evidence,
}

impl Finding {
    pub fn new(property: impl Into<String>, kind: FindingKind, detail: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            kind,
            severity: kind.severity(),
            view: None,
            field: None,
            detail: detail.into(),
            evidence: Evidence::default(),
        }
    }

    pub fn in_view(mut self, view: View) -> Self {
        self.view = Some(view);
        self
    }

    pub fn on_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_values(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.evidence.expected = Some(expected.into());
        self.evidence.actual = Some(actual.into());
        self
    }

    pub fn with_delta(mut self, delta_cents: i64) -> Self {
        self.evidence.delta_cents = Some(delta_cents);
        self
    }

    /// Delta in dollars, when the finding carries one.
    pub fn delta(&self) -> Option<f64> {
        self.evidence.delta_cents.map(|c| c as f64 / 100.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FindingSummary {
    pub total: usize,
    pub errors: usize,
    pub warnings: usize,
    pub info: usize,
    pub properties_with_findings: usize,
    pub by_kind: BTreeMap<String, usize>,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Inclusive yards-per-door band for a property type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkBand {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkStatus {
    WithinRange,
    AboveRange,
    BelowRange,
    /// No yards-per-door or no band for the property type.
    Undefined,
}

impl std::fmt::Display for BenchmarkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WithinRange => write!(f, "within range"),
            Self::AboveRange => write!(f, "above range"),
            Self::BelowRange => write!(f, "below range"),
            Self::Undefined => write!(f, "undefined"),
        }
    }
}

/// Where a metrics input came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    Config,
    Workbook,
    Missing,
}

/// Canonical per-property metrics, computed from raw line items only.
/// Ratios are None where the denominator is zero or unknown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsRecord {
    pub property: String,
    pub total_spend_cents: i64,
    pub invoice_count: usize,
    pub active_months: usize,
    pub average_monthly_spend: Option<f64>,
    pub unit_count: Option<u32>,
    pub units_source: ValueSource,
    pub cost_per_unit: Option<f64>,
    pub monthly_yards: f64,
    pub containers_source: ValueSource,
    pub on_call_containers: u32,
    pub incomplete_container_rows: usize,
    pub yards_per_door: Option<f64>,
    pub category_totals: BTreeMap<Category, i64>,
    pub uncategorized_cents: i64,
    pub overage_ratio: Option<f64>,
    pub total_tons: Option<f64>,
    pub cost_per_ton: Option<f64>,
    pub divergent_line_items: usize,
    pub unpriced_line_items: usize,
    pub benchmark_band: Option<BenchmarkBand>,
    pub benchmark: BenchmarkStatus,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub portfolio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub engine_version: String,
    pub run_at: String,
    pub properties: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioReport {
    pub meta: ReportMeta,
    pub summary: FindingSummary,
    pub findings: Vec<Finding>,
    pub metrics: Vec<MetricsRecord>,
    pub load_warnings: Vec<LoadWarning>,
}
