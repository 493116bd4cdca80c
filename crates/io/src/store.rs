//! Record Store: loads the portfolio's four derived views plus per-property
//! ledgers from one source, and owns the only write path back to it.
//!
//! Loading never fails past `open`: missing sheets, missing columns and
//! unparseable cells become `LoadWarning`s and the affected data is absent.

use std::path::{Path, PathBuf};

use serde::Serialize;
use wasteaudit_config::BackupSettings;
use wasteaudit_recon::config::PortfolioConfig;
use wasteaudit_recon::model::{
    Category, CategorySpendRow, ContractTerm, FieldValue, Frequency, InvoiceLineItem, LoadWarning, OverviewRow, Portfolio,
    ServiceConfigEntry, SpendLine, View,
};
use wasteaudit_recon::parse::{
    normalize_key, parse_category, parse_frequency, parse_tonnage, to_cents, whole_number, CategoryCell,
};

use crate::backup::check_backup;
use crate::columns::{self, ColumnMap, FieldSpec};
use crate::error::StoreError;
use crate::retry::{write_with_retry, RetryPolicy, Sleeper};
use crate::workbook::{Sheet, SourceWorkbook};

/// Labels that mark a summary row rather than a property or line item.
const TOTAL_LABELS: &[&str] = &["total", "totals", "grand_total", "subtotal", "portfolio_total"];

fn is_total_label(s: &str) -> bool {
    TOTAL_LABELS.contains(&normalize_key(s).as_str())
}

/// A single-cell change requested by an operator.
#[derive(Debug, Clone)]
pub struct Correction {
    pub property: String,
    pub view: View,
    /// Field key, label, or header alias (e.g. `units`, `Container Count`).
    pub field: String,
    pub value: FieldValue,
}

/// Before/after record of a persisted correction.
#[derive(Debug, Clone, Serialize)]
pub struct CorrectionAudit {
    pub property: String,
    pub view: View,
    pub sheet: String,
    pub field: String,
    pub row: usize,
    pub before: Option<FieldValue>,
    pub after: FieldValue,
    pub file: String,
    pub written_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub retry: RetryPolicy,
    pub backup: BackupSettings,
}

pub struct RecordStore {
    workbook: SourceWorkbook,
}

// ---------------------------------------------------------------------------
// Per-sheet reading helpers
// ---------------------------------------------------------------------------

struct RowReader<'a> {
    sheet: &'a Sheet,
    columns: &'a ColumnMap,
    cells: &'a [Option<FieldValue>],
    row: usize,
}

impl<'a> RowReader<'a> {
    fn raw(&self, key: &str) -> Option<&'a FieldValue> {
        self.cells.get(self.columns.index(key)?)?.as_ref()
    }

    fn text(&self, key: &str) -> Option<String> {
        let s = self.raw(key)?.to_string();
        let trimmed = s.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    fn unparseable(&self, key: &str, value: &FieldValue, warnings: &mut Vec<LoadWarning>) {
        warnings.push(LoadWarning::UnparseableValue {
            sheet: self.sheet.name.clone(),
            row: self.row,
            column: self.columns.header(key).unwrap_or(key).to_string(),
            value: value.to_string(),
        });
    }

    fn number(&self, key: &str, warnings: &mut Vec<LoadWarning>) -> Option<f64> {
        let value = self.raw(key)?;
        let n = value.as_number();
        if n.is_none() {
            self.unparseable(key, value, warnings);
        }
        n
    }

    fn count(&self, key: &str, warnings: &mut Vec<LoadWarning>) -> Option<u32> {
        let value = self.raw(key)?;
        let n = value.as_number().and_then(whole_number);
        if n.is_none() {
            self.unparseable(key, value, warnings);
        }
        n
    }

    fn cents(&self, key: &str, warnings: &mut Vec<LoadWarning>) -> Option<i64> {
        self.number(key, warnings).and_then(to_cents)
    }

    fn date(&self, key: &str, warnings: &mut Vec<LoadWarning>) -> Option<chrono::NaiveDate> {
        let value = self.raw(key)?;
        let d = value.as_date();
        if d.is_none() {
            self.unparseable(key, value, warnings);
        }
        d
    }

    fn frequency(&self, key: &str, warnings: &mut Vec<LoadWarning>) -> Option<Frequency> {
        let value = self.raw(key)?;
        let f = match value {
            FieldValue::Number(n) if *n >= 0.0 => Some(Frequency::PerWeek(*n)),
            FieldValue::Text(s) => parse_frequency(s),
            _ => None,
        };
        if f.is_none() {
            self.unparseable(key, value, warnings);
        }
        f
    }

    /// Category cell: `None` for unassigned; unknown text warns.
    fn category(&self, key: &str, warnings: &mut Vec<LoadWarning>) -> Option<Category> {
        let text = self.text(key)?;
        match parse_category(&text) {
            CategoryCell::Known(c) => Some(c),
            CategoryCell::Unassigned => None,
            CategoryCell::Unknown(value) => {
                warnings.push(LoadWarning::UnknownCategory { sheet: self.sheet.name.clone(), row: self.row, value });
                None
            }
        }
    }
}

/// Resolve columns, warning on missing required ones.
fn resolve_columns(sheet: &Sheet, fields: &[FieldSpec], warnings: &mut Vec<LoadWarning>) -> ColumnMap {
    let (map, missing) = columns::resolve(sheet, fields);
    for spec in missing {
        warnings.push(LoadWarning::ColumnNotFound { sheet: sheet.name.clone(), column: spec.label.to_string() });
    }
    map
}

/// Rows of a view sheet keyed by property name, skipping blank and total rows.
fn property_rows<'a>(sheet: &'a Sheet, map: &'a ColumnMap) -> impl Iterator<Item = (String, RowReader<'a>)> + 'a {
    sheet.data_rows().filter_map(move |(i, cells)| {
        let reader = RowReader { sheet, columns: map, cells, row: sheet.display_row(i) };
        let name = reader.text(columns::PROPERTY.key)?;
        if is_total_label(&name) {
            return None;
        }
        Some((name, reader))
    })
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl RecordStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self { workbook: SourceWorkbook::open(path)? })
    }

    pub fn from_workbook(workbook: SourceWorkbook) -> Self {
        Self { workbook }
    }

    pub fn workbook(&self) -> &SourceWorkbook {
        &self.workbook
    }

    pub fn path(&self) -> &Path {
        &self.workbook.path
    }

    /// Load every view and ledger named by `config`.
    pub fn load(&self, config: &PortfolioConfig) -> (Portfolio, Vec<LoadWarning>) {
        let mut portfolio = Portfolio::new();
        let mut warnings = Vec::new();
        for name in config.declared_order() {
            portfolio.record_mut(&name);
            portfolio.order.push(name);
        }

        for view in View::ALL {
            let sheet_name = config.sheets.for_view(view);
            let Some(sheet) = self.workbook.sheet(sheet_name) else {
                warnings.push(LoadWarning::SheetNotFound { sheet: sheet_name.to_string() });
                continue;
            };
            let map = resolve_columns(sheet, columns::fields_for(view), &mut warnings);
            if !map.contains(columns::PROPERTY.key) {
                // Unkeyed view: treat as not loaded.
                continue;
            }
            let before = warnings.len();
            match view {
                View::Overview => load_overview(sheet, &map, &mut portfolio),
                View::ServiceDetails => load_services(sheet, &map, &mut portfolio, &mut warnings),
                View::CategorySpend => load_spend(sheet, &map, &mut portfolio, &mut warnings),
                View::ContractTerms => load_contracts(sheet, &map, &mut portfolio, &mut warnings),
            }
            // A sheet with a header but no rows still counts as found.
            portfolio.views_found.insert(view);
            log::debug!("{sheet_name}: loaded with {} warning(s)", warnings.len() - before);
        }

        let names: Vec<String> = portfolio.records.keys().cloned().collect();
        for name in names {
            let sheet_name = config.property(&name).map_or(name.as_str(), |p| p.ledger_sheet());
            match self.workbook.sheet(sheet_name) {
                Some(sheet) => {
                    let items = load_ledger(&name, sheet, &mut warnings);
                    log::debug!("{name}: {} line item(s) from '{}'", items.len(), sheet.name);
                    portfolio.set_line_items(&name, items);
                }
                None => warnings.push(LoadWarning::SheetNotFound { sheet: sheet_name.to_string() }),
            }
        }

        for w in &warnings {
            log::warn!("{w}");
        }
        log::info!(
            "loaded {} properties from {} ({} warning(s))",
            portfolio.records.len(),
            self.workbook.path.display(),
            warnings.len()
        );
        (portfolio, warnings)
    }
}

fn load_overview(sheet: &Sheet, map: &ColumnMap, portfolio: &mut Portfolio) {
    for (name, r) in property_rows(sheet, map) {
        let mut row = OverviewRow::new(name);
        row.row = r.row;
        // Typed columns stay raw; the validator reports bad values.
        row.units = r.raw("units").cloned();
        row.container_count = r.raw("container_count").cloned();
        row.service_type = r.raw("service_type").cloned();
        row.property_type = r.text("property_type");
        row.city = r.text("city");
        row.state = r.text("state");
        row.vendor = r.text("vendor");
        portfolio.add_overview(row);
    }
}

fn load_services(sheet: &Sheet, map: &ColumnMap, portfolio: &mut Portfolio, warnings: &mut Vec<LoadWarning>) {
    for (name, r) in property_rows(sheet, map) {
        portfolio.add_service(ServiceConfigEntry {
            property: name,
            row: r.row,
            container_type: r.text("container_type"),
            size_yards: r.number("size_yards", warnings),
            quantity: r.count("quantity", warnings),
            frequency: r.frequency("frequency", warnings),
            units: r.count("units", warnings),
        });
    }
}

fn load_spend(sheet: &Sheet, map: &ColumnMap, portfolio: &mut Portfolio, warnings: &mut Vec<LoadWarning>) {
    for (name, r) in property_rows(sheet, map) {
        let line = match r.text("category") {
            Some(label) if is_total_label(&label) => SpendLine::GrandTotal,
            Some(_) => r.category("category", warnings).map_or(SpendLine::Uncategorized, SpendLine::Category),
            None => SpendLine::Uncategorized,
        };
        portfolio.add_spend(CategorySpendRow { property: name, row: r.row, line, total_cents: r.cents("total", warnings) });
    }
}

fn load_contracts(sheet: &Sheet, map: &ColumnMap, portfolio: &mut Portfolio, warnings: &mut Vec<LoadWarning>) {
    for (name, r) in property_rows(sheet, map) {
        let mut term = ContractTerm::new(name);
        term.row = r.row;
        term.vendor = r.text("vendor");
        term.start_date = r.text("contract_start");
        term.term = r.text("term");
        term.renewal_clause = r.text("renewal_clause");
        term.notice_period = r.text("notice_period");
        term.units = r.count("units", warnings);
        portfolio.add_contract(term);
    }
}

fn load_ledger(property: &str, sheet: &Sheet, warnings: &mut Vec<LoadWarning>) -> Vec<InvoiceLineItem> {
    let map = resolve_columns(sheet, columns::LEDGER, warnings);
    let mut items = Vec::new();

    for (i, cells) in sheet.data_rows() {
        let r = RowReader { sheet, columns: &map, cells, row: sheet.display_row(i) };
        let invoice_number = r.text("invoice_number");
        let description = r.text("description").unwrap_or_default();
        if invoice_number.as_deref().is_some_and(is_total_label) || is_total_label(&description) {
            continue;
        }

        let tonnage = r.number("tonnage", warnings).or_else(|| parse_tonnage(&description));
        items.push(InvoiceLineItem {
            property: property.to_string(),
            row: r.row,
            invoice_number,
            invoice_date: r.date("invoice_date", warnings),
            period_start: r.date("period_start", warnings),
            period_end: r.date("period_end", warnings),
            category: r.category("category", warnings),
            quantity: r.number("quantity", warnings),
            unit_rate: r.number("unit_rate", warnings),
            extended_cents: r.cents("extended", warnings),
            vendor: r.text("vendor"),
            service_type: r.text("service_type"),
            tonnage,
            description,
        });
    }
    items
}

// ---------------------------------------------------------------------------
// Correction write-back
// ---------------------------------------------------------------------------

impl RecordStore {
    /// Replace one cell in a view sheet and persist the whole source.
    ///
    /// Order: backup policy, locate the unique row, edit in memory, render,
    /// write with retry. Nothing is written if any step before the write fails,
    /// and a failed write puts the previous value back in memory.
    pub fn correct(
        &mut self,
        config: &PortfolioConfig,
        correction: &Correction,
        options: &WriteOptions,
        sleeper: &mut dyn Sleeper,
    ) -> Result<CorrectionAudit, StoreError> {
        let sheet_name = config.sheets.for_view(correction.view).to_string();
        let target = self.workbook.target_file(&sheet_name)?;
        check_backup(&target, &options.backup)?;

        let sheet = self
            .workbook
            .sheet_mut(&sheet_name)
            .ok_or_else(|| StoreError::SheetNotFound(sheet_name.clone()))?;
        let fields = columns::fields_for(correction.view);
        let (map, _) = columns::resolve(sheet, fields);

        let property_col = map.index(columns::PROPERTY.key).ok_or_else(|| StoreError::ColumnNotFound {
            sheet: sheet.name.clone(),
            field: columns::PROPERTY.label.to_string(),
        })?;
        let (field_col, field_header) = field_column(sheet, &map, fields, &correction.field)?;

        let wanted = correction.property.trim();
        let matches: Vec<usize> = sheet
            .data_rows()
            .filter(|(_, cells)| {
                cells
                    .get(property_col)
                    .and_then(|c| c.as_ref())
                    .is_some_and(|v| v.to_string().trim() == wanted)
            })
            .map(|(i, _)| i)
            .collect();
        let grid_row = match matches.as_slice() {
            [one] => *one,
            [] => {
                return Err(StoreError::TargetNotFound(format!(
                    "no row for '{wanted}' in sheet '{}'",
                    sheet.name
                )))
            }
            many => {
                return Err(StoreError::TargetNotFound(format!(
                    "{} rows for '{wanted}' in sheet '{}'; correct the duplicates by hand",
                    many.len(),
                    sheet.name
                )))
            }
        };

        let before = sheet.cell(grid_row, field_col).cloned();
        sheet.set(grid_row, field_col, Some(correction.value.clone()));
        let row = sheet.display_row(grid_row);
        let resolved_sheet = sheet.name.clone();

        let persisted = self
            .workbook
            .render(&resolved_sheet)
            .and_then(|bytes| write_with_retry(&options.retry, sleeper, &target, || replace_file(&target, &bytes)));
        if let Err(e) = persisted {
            // Keep memory in step with the file that was not written.
            if let Some(sheet) = self.workbook.sheet_mut(&resolved_sheet) {
                sheet.set(grid_row, field_col, before);
            }
            return Err(e);
        }

        let audit = CorrectionAudit {
            property: wanted.to_string(),
            view: correction.view,
            sheet: resolved_sheet,
            field: field_header,
            row,
            before,
            after: correction.value.clone(),
            file: target.display().to_string(),
            written_at: chrono::Utc::now().to_rfc3339(),
        };
        log::info!(
            "corrected {} / {} row {}: {:?} -> {}",
            audit.sheet,
            audit.field,
            audit.row,
            audit.before.as_ref().map(ToString::to_string),
            audit.after
        );
        Ok(audit)
    }
}

/// Write `<target>.tmp`, then rename it over the target, so a failed write
/// never leaves the source truncated.
fn replace_file(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = target.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, target).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp);
    })
}

/// Column for an operator-named field: a known field of the view, else a
/// header matching the name directly.
fn field_column(
    sheet: &Sheet,
    map: &ColumnMap,
    fields: &[FieldSpec],
    name: &str,
) -> Result<(usize, String), StoreError> {
    if let Some(spec) = columns::lookup(fields, name) {
        if let (Some(i), Some(h)) = (map.index(spec.key), map.header(spec.key)) {
            return Ok((i, h.to_string()));
        }
    }
    let wanted = normalize_key(name);
    sheet
        .headers()
        .into_iter()
        .enumerate()
        .find(|(_, h)| !h.is_empty() && normalize_key(h) == wanted)
        .ok_or_else(|| StoreError::ColumnNotFound { sheet: sheet.name.clone(), field: name.to_string() })
}
