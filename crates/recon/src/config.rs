use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use crate::error::ReconError;
use crate::model::{BenchmarkBand, ServiceConfigEntry, View};
use crate::parse::{normalize_key, parse_frequency};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Declarative per-property table plus run-wide knobs, read from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioConfig {
    pub name: String,
    #[serde(default)]
    pub tolerance: ToleranceConfig,
    #[serde(default)]
    pub sheets: SheetNames,
    /// Yards-per-door bands keyed by property type. Merged over the built-ins.
    #[serde(default)]
    pub benchmarks: BTreeMap<String, BenchmarkBand>,
    #[serde(default)]
    pub properties: Vec<PropertyConfig>,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            name: "Portfolio".into(),
            tolerance: ToleranceConfig::default(),
            sheets: SheetNames::default(),
            benchmarks: BTreeMap::new(),
            properties: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tolerance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ToleranceConfig {
    /// Absolute currency tolerance in cents. Counts always compare exactly.
    #[serde(default = "default_currency_cents")]
    pub currency_cents: i64,
}

fn default_currency_cents() -> i64 {
    1
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            currency_cents: default_currency_cents(),
        }
    }
}

impl ToleranceConfig {
    pub fn within(&self, delta_cents: i64) -> bool {
        delta_cents.unsigned_abs() <= self.currency_cents.unsigned_abs()
    }
}

// ---------------------------------------------------------------------------
// Sheet names
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SheetNames {
    pub overview: String,
    pub service_details: String,
    pub category_spend: String,
    pub contract_terms: String,
}

impl Default for SheetNames {
    fn default() -> Self {
        Self {
            overview: View::Overview.default_sheet().into(),
            service_details: View::ServiceDetails.default_sheet().into(),
            category_spend: View::CategorySpend.default_sheet().into(),
            contract_terms: View::ContractTerms.default_sheet().into(),
        }
    }
}

impl SheetNames {
    pub fn for_view(&self, view: View) -> &str {
        match view {
            View::Overview => &self.overview,
            View::ServiceDetails => &self.service_details,
            View::CategorySpend => &self.category_spend,
            View::ContractTerms => &self.contract_terms,
        }
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PropertyConfig {
    pub name: String,
    #[serde(default)]
    pub units: Option<u32>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    /// Line-item sheet. Defaults to the property name.
    #[serde(default)]
    pub ledger_sheet: Option<String>,
    #[serde(default)]
    pub containers: Vec<ContainerConfig>,
}

impl PropertyConfig {
    pub fn ledger_sheet(&self) -> &str {
        self.ledger_sheet.as_deref().unwrap_or(&self.name)
    }

    /// Configured containers as service entries. Rows whose frequency does
    /// not parse are dropped here; `validate` rejects them up front.
    pub fn service_entries(&self) -> Vec<ServiceConfigEntry> {
        self.containers
            .iter()
            .filter_map(|c| {
                let frequency = parse_frequency(&c.frequency)?;
                let mut entry = ServiceConfigEntry::new(&self.name, c.size_yards, c.quantity, frequency);
                entry.container_type = c.container_type.clone();
                entry.units = self.units;
                Some(entry)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerConfig {
    #[serde(default)]
    pub container_type: Option<String>,
    pub size_yards: f64,
    pub quantity: u32,
    pub frequency: String,
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Built-in yards-per-door bands by normalized property type.
pub fn builtin_benchmarks() -> BTreeMap<String, BenchmarkBand> {
    [
        ("garden_style", 2.0, 2.5),
        ("mid_rise", 1.5, 2.0),
        ("high_rise", 1.0, 1.5),
        ("townhome", 2.5, 3.0),
    ]
    .into_iter()
    .map(|(k, min, max)| (k.to_string(), BenchmarkBand { min, max }))
    .collect()
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl PortfolioConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: PortfolioConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.tolerance.currency_cents < 0 {
            return Err(ReconError::ConfigValidation(format!(
                "tolerance.currency_cents must be >= 0, got {}",
                self.tolerance.currency_cents
            )));
        }

        let mut sheet_names = BTreeSet::new();
        for view in View::ALL {
            let sheet = self.sheets.for_view(view).trim();
            if sheet.is_empty() {
                return Err(ReconError::ConfigValidation(format!("sheets.{view} must not be empty")));
            }
            if !sheet_names.insert(sheet.to_lowercase()) {
                return Err(ReconError::ConfigValidation(format!(
                    "sheet '{sheet}' is used for more than one view"
                )));
            }
        }

        for (key, band) in &self.benchmarks {
            if !band.min.is_finite() || !band.max.is_finite() || band.min < 0.0 || band.min > band.max {
                return Err(ReconError::ConfigValidation(format!(
                    "benchmark '{key}': need 0 <= min <= max, got [{}, {}]",
                    band.min, band.max
                )));
            }
        }

        let mut names = BTreeSet::new();
        for prop in &self.properties {
            let name = prop.name.trim();
            if name.is_empty() {
                return Err(ReconError::ConfigValidation("property with empty name".into()));
            }
            if !names.insert(name.to_string()) {
                return Err(ReconError::ConfigValidation(format!("duplicate property '{name}'")));
            }
            if prop.units == Some(0) {
                return Err(ReconError::ConfigValidation(format!(
                    "property '{name}': units must be positive"
                )));
            }
            for (i, c) in prop.containers.iter().enumerate() {
                if !(c.size_yards.is_finite() && c.size_yards > 0.0) || c.quantity == 0 {
                    return Err(ReconError::ConfigValidation(format!(
                        "property '{name}', container {}: size and quantity must be positive",
                        i + 1
                    )));
                }
                if parse_frequency(&c.frequency).is_none() {
                    return Err(ReconError::ConfigValidation(format!(
                        "property '{name}', container {}: cannot parse frequency '{}'",
                        i + 1,
                        c.frequency
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn property(&self, name: &str) -> Option<&PropertyConfig> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn declared_order(&self) -> Vec<String> {
        self.properties.iter().map(|p| p.name.clone()).collect()
    }

    /// Band for a property type, configured bands first.
    pub fn band_for(&self, property_type: &str) -> Option<BenchmarkBand> {
        let key = normalize_key(property_type);
        self.benchmarks
            .iter()
            .find(|(k, _)| normalize_key(k) == key)
            .map(|(_, band)| *band)
            .or_else(|| builtin_benchmarks().get(&key).copied())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Frequency;

    const VALID: &str = r#"
name = "Texas Portfolio"

[tolerance]
currency_cents = 1

[benchmarks.garden_style]
min = 2.1
max = 2.6

[[properties]]
name = "Orion Prosper"
units = 453
property_type = "Garden-Style"
city = "Prosper"
state = "TX"

[[properties.containers]]
container_type = "front_end_load"
size_yards = 8
quantity = 8
frequency = "3x/week"

[[properties.containers]]
container_type = "front_end_load"
size_yards = 10
quantity = 2
frequency = "3x/week"

[[properties]]
name = "Bella Mirage"
units = 715
property_type = "mid rise"
ledger_sheet = "Bella Mirage Invoices"
"#;

    #[test]
    fn parse_valid() {
        let config = PortfolioConfig::from_toml(VALID).unwrap();
        assert_eq!(config.name, "Texas Portfolio");
        assert_eq!(config.properties.len(), 2);
        assert_eq!(config.declared_order(), vec!["Orion Prosper", "Bella Mirage"]);
        assert_eq!(config.sheets.overview, "Property Overview");

        let orion = config.property("Orion Prosper").unwrap();
        assert_eq!(orion.ledger_sheet(), "Orion Prosper");
        let entries = orion.service_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].frequency, Some(Frequency::PerWeek(3.0)));
        assert_eq!(entries[1].size_yards, Some(10.0));

        let bella = config.property("Bella Mirage").unwrap();
        assert_eq!(bella.ledger_sheet(), "Bella Mirage Invoices");
    }

    #[test]
    fn defaults_when_sections_absent() {
        let config = PortfolioConfig::from_toml("name = \"Bare\"").unwrap();
        assert_eq!(config.tolerance.currency_cents, 1);
        assert!(config.properties.is_empty());
        assert_eq!(config.sheets.for_view(View::CategorySpend), "Spend by Category");
    }

    #[test]
    fn configured_band_overrides_builtin() {
        let config = PortfolioConfig::from_toml(VALID).unwrap();
        let band = config.band_for("Garden-Style").unwrap();
        assert_eq!(band.min, 2.1);
        let builtin = config.band_for("Mid Rise").unwrap();
        assert_eq!((builtin.min, builtin.max), (1.5, 2.0));
        assert!(config.band_for("warehouse").is_none());
    }

    #[test]
    fn tolerance_is_inclusive() {
        let tol = ToleranceConfig { currency_cents: 1 };
        assert!(tol.within(1));
        assert!(tol.within(-1));
        assert!(!tol.within(2));
    }

    #[test]
    fn reject_duplicate_property() {
        let input = r#"
name = "Dup"
[[properties]]
name = "A"
[[properties]]
name = "A"
"#;
        let err = PortfolioConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("duplicate property 'A'"));
    }

    #[test]
    fn reject_inverted_band() {
        let input = r#"
name = "Bad"
[benchmarks.garden_style]
min = 3.0
max = 2.0
"#;
        let err = PortfolioConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("garden_style"));
    }

    #[test]
    fn reject_unparseable_frequency() {
        let input = r#"
name = "Bad"
[[properties]]
name = "A"
[[properties.containers]]
size_yards = 8
quantity = 1
frequency = "sometimes"
"#;
        let err = PortfolioConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("sometimes"));
    }

    #[test]
    fn reject_zero_units() {
        let input = r#"
name = "Bad"
[[properties]]
name = "A"
units = 0
"#;
        assert!(PortfolioConfig::from_toml(input).is_err());
    }

    #[test]
    fn reject_shared_sheet_names() {
        let input = r#"
name = "Bad"
[sheets]
overview = "Data"
contract_terms = "data"
"#;
        let err = PortfolioConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("more than one view"));
    }

    #[test]
    fn reject_malformed_toml() {
        let err = PortfolioConfig::from_toml("name = ").unwrap_err();
        assert!(matches!(err, ReconError::ConfigParse(_)));
    }
}
