use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Finding, FindingSummary, Severity};

/// Counts by kind and severity.
pub fn summarize(findings: &[Finding]) -> FindingSummary {
    let mut by_kind: BTreeMap<String, usize> = BTreeMap::new();
    let mut properties: BTreeSet<&str> = BTreeSet::new();
    let mut errors = 0;
    let mut warnings = 0;
    let mut info = 0;

    for f in findings {
        *by_kind.entry(f.kind.to_string()).or_insert(0) += 1;
        properties.insert(f.property.as_str());

        match f.severity {
            Severity::Error => errors += 1,
            Severity::Warning => warnings += 1,
            Severity::Info => info += 1,
        }
    }

    FindingSummary {
        total: findings.len(),
        errors,
        warnings,
        info,
        properties_with_findings: properties.len(),
        by_kind,
    }
}
