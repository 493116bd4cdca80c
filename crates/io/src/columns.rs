// Header-name column resolution. Columns are found by header text, never by
// position, matched against per-field alias lists after key normalization.

use std::collections::BTreeMap;

use wasteaudit_recon::model::View;
use wasteaudit_recon::parse::normalize_key;

use crate::workbook::Sheet;

/// One logical field and the header spellings that mean it.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub aliases: &'static [&'static str],
    /// Missing required columns produce a `ColumnNotFound` warning.
    pub required: bool,
}

const fn field(key: &'static str, label: &'static str, aliases: &'static [&'static str], required: bool) -> FieldSpec {
    FieldSpec { key, label, aliases, required }
}

pub const PROPERTY: FieldSpec = field(
    "property",
    "Property",
    &["Property", "Property Name", "Community", "Site"],
    true,
);

const UNITS: FieldSpec = field("units", "Units", &["Units", "Unit Count", "Units (Doors)", "Doors", "# Units"], false);
const VENDOR: FieldSpec = field("vendor", "Vendor", &["Vendor", "Hauler", "Provider"], false);

pub const OVERVIEW: &[FieldSpec] = &[
    PROPERTY,
    field("units", "Units", &["Units", "Unit Count", "Units (Doors)", "Doors", "# Units"], true),
    field(
        "container_count",
        "Container Count",
        &["Container Count", "Containers", "# Containers", "Number of Containers"],
        true,
    ),
    field("service_type", "Service Type", &["Service Type", "Service"], false),
    field("property_type", "Property Type", &["Property Type", "Type"], false),
    field("city", "City", &["City"], false),
    field("state", "State", &["State", "ST"], false),
    VENDOR,
];

pub const SERVICE_DETAILS: &[FieldSpec] = &[
    PROPERTY,
    field("container_type", "Container Type", &["Container Type", "Container", "Type"], false),
    field("size_yards", "Size (yd)", &["Container Size", "Size", "Size (yd)", "Size (Yards)", "Yards"], true),
    field("quantity", "Quantity", &["Quantity", "Qty", "Count", "# of Containers"], true),
    field(
        "frequency",
        "Frequency",
        &["Frequency", "Pickup Frequency", "Service Frequency", "Pickups per Week", "Frequency (per week)"],
        true,
    ),
    UNITS,
];

pub const CATEGORY_SPEND: &[FieldSpec] = &[
    PROPERTY,
    field("category", "Category", &["Category", "Spend Category"], true),
    field("total", "Total", &["Total", "Amount", "Spend", "Total Spend"], true),
];

pub const CONTRACT_TERMS: &[FieldSpec] = &[
    PROPERTY,
    VENDOR,
    field(
        "contract_start",
        "Contract Start",
        &["Contract Start", "Start Date", "Effective Date", "Contract Start Date"],
        true,
    ),
    field("term", "Term", &["Term", "Contract Term", "Term Length"], true),
    field("renewal_clause", "Renewal Clause", &["Renewal Clause", "Renewal", "Auto Renewal"], true),
    field(
        "notice_period",
        "Notice Period",
        &["Notice Period", "Notice", "Termination Notice"],
        true,
    ),
    UNITS,
];

pub const LEDGER: &[FieldSpec] = &[
    field("invoice_number", "Invoice Number", &["Invoice Number", "Invoice #", "Invoice No", "Invoice"], true),
    field("invoice_date", "Invoice Date", &["Invoice Date", "Bill Date", "Date"], true),
    field(
        "period_start",
        "Service Period Start",
        &["Service Period Start", "Period Start", "Service Start"],
        false,
    ),
    field("period_end", "Service Period End", &["Service Period End", "Period End", "Service End"], false),
    field("description", "Description", &["Description", "Line Description", "Item"], false),
    field("category", "Category", &["Category"], true),
    field("quantity", "Quantity", &["Quantity", "Qty"], false),
    field("unit_rate", "Unit Rate", &["Unit Rate", "Rate", "Unit Price", "Price"], false),
    field(
        "extended",
        "Extended Amount",
        &["Extended Amount", "Extended", "Amount", "Line Total", "Total"],
        true,
    ),
    VENDOR,
    field("service_type", "Service Type", &["Service Type"], false),
    field("tonnage", "Tonnage", &["Tonnage", "Tons"], false),
];

pub fn fields_for(view: View) -> &'static [FieldSpec] {
    match view {
        View::Overview => OVERVIEW,
        View::ServiceDetails => SERVICE_DETAILS,
        View::CategorySpend => CATEGORY_SPEND,
        View::ContractTerms => CONTRACT_TERMS,
    }
}

/// Field key → (column index, header text) for one sheet.
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    columns: BTreeMap<&'static str, (usize, String)>,
}

impl ColumnMap {
    pub fn index(&self, key: &str) -> Option<usize> {
        self.columns.get(key).map(|(i, _)| *i)
    }

    /// Header text as written in the sheet.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.columns.get(key).map(|(_, h)| h.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.columns.contains_key(key)
    }
}

/// Resolve every field against the sheet headers. Each column satisfies at
/// most one field, in field order. Returns the map and the missing required
/// fields.
pub fn resolve(sheet: &Sheet, fields: &[FieldSpec]) -> (ColumnMap, Vec<FieldSpec>) {
    let raw = sheet.headers();
    let headers: Vec<String> = raw.iter().map(|h| normalize_key(h)).collect();
    let mut claimed = vec![false; headers.len()];
    let mut map = ColumnMap::default();
    let mut missing = Vec::new();

    for spec in fields {
        let found = spec.aliases.iter().find_map(|alias| {
            let key = normalize_key(alias);
            headers
                .iter()
                .enumerate()
                .find(|(i, h)| !claimed[*i] && !h.is_empty() && **h == key)
                .map(|(i, _)| i)
        });
        match found {
            Some(i) => {
                claimed[i] = true;
                map.columns.insert(spec.key, (i, raw[i].clone()));
            }
            None if spec.required => missing.push(*spec),
            None => {}
        }
    }
    (map, missing)
}

/// Field spec named by an operator: key, label, or any alias.
pub fn lookup(fields: &[FieldSpec], name: &str) -> Option<FieldSpec> {
    let wanted = normalize_key(name);
    fields.iter().copied().find(|f| {
        f.key == wanted || normalize_key(f.label) == wanted || f.aliases.iter().any(|a| normalize_key(a) == wanted)
    })
}
