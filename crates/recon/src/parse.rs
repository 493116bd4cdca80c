// Best-effort value parsing for hand-maintained spreadsheet cells.
// Anything that does not parse comes back as None, never as zero.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::model::{Category, FieldValue, Frequency, WEEKS_PER_MONTH};

// ---------------------------------------------------------------------------
// Numbers and money
// ---------------------------------------------------------------------------

/// Parse a financial number string:
/// - Strip `$`, commas, whitespace
/// - Handle `(123.45)` → `-123.45`
/// - Returns None if non-numeric characters remain after stripping
pub fn parse_financial_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (is_negative, inner) = if trimmed.starts_with('(') && trimmed.ends_with(')') {
        (true, &trimmed[1..trimmed.len() - 1])
    } else {
        (false, trimmed)
    };

    let cleaned: String = inner
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    for (i, c) in cleaned.chars().enumerate() {
        match c {
            '0'..='9' | '.' => {}
            '-' | '+' if i == 0 && !is_negative => {}
            _ => return None,
        }
    }

    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if is_negative { -value } else { value })
}

/// Dollars to integer cents, half away from zero.
pub fn to_cents(dollars: f64) -> Option<i64> {
    if !dollars.is_finite() {
        return None;
    }
    let cents = (dollars * 100.0).round();
    if cents.abs() > i64::MAX as f64 / 2.0 {
        return None;
    }
    Some(cents as i64)
}

/// Render cents as `$1,234.56` / `-$12.00`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let whole = (abs / 100).to_string();
    let frac = abs % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}${grouped}.{frac:02}")
}

/// A count column: must be a non-negative whole number.
pub fn parse_count(s: &str) -> Option<u32> {
    let n = parse_financial_number(s)?;
    whole_number(n)
}

pub fn whole_number(n: f64) -> Option<u32> {
    if n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64 {
        Some(n as u32)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%Y/%m/%d", "%b %d, %Y", "%B %d, %Y"];

/// Parse the date spellings that show up in invoice exports.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    // Datetime text: keep the date part.
    let date_part = trimmed.split(['T', ' ']).next().unwrap_or(trimmed);
    for candidate in [date_part, trimmed] {
        for fmt in DATE_FORMATS {
            if let Ok(d) = NaiveDate::parse_from_str(candidate, fmt) {
                return Some(d);
            }
        }
    }
    None
}

/// Typed value for operator-entered text: number, then date, else text.
pub fn infer_value(s: &str) -> FieldValue {
    let trimmed = s.trim();
    if let Some(n) = parse_financial_number(trimmed) {
        return FieldValue::Number(n);
    }
    if let Some(d) = parse_date(trimmed) {
        return FieldValue::Date(d);
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => FieldValue::Bool(true),
        "false" => FieldValue::Bool(false),
        _ => FieldValue::Text(trimmed.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Categories, frequencies, tonnage
// ---------------------------------------------------------------------------

/// Outcome of reading a category cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryCell {
    Known(Category),
    Unassigned,
    Unknown(String),
}

pub fn parse_category(s: &str) -> CategoryCell {
    let key = normalize_key(s);
    if key.is_empty() {
        return CategoryCell::Unassigned;
    }
    match key.as_str() {
        "base" | "base_service" => CategoryCell::Known(Category::Base),
        "tax" | "taxes" => CategoryCell::Known(Category::Tax),
        "overage" | "overages" => CategoryCell::Known(Category::Overage),
        "extra_pickup" | "extra_pickups" | "extra" => CategoryCell::Known(Category::ExtraPickup),
        "admin" | "administrative" | "admin_fee" => CategoryCell::Known(Category::Admin),
        "other" => CategoryCell::Known(Category::Other),
        "uncategorized" | "unassigned" | "none" => CategoryCell::Unassigned,
        _ => CategoryCell::Unknown(s.trim().to_string()),
    }
}

static FREQUENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d+(?:\.\d+)?)\s*(?:x|times)?\s*(?:/|per\s+|a\s+|every\s+)?\s*(week|wk|w|weekly|month|mo|monthly)?$",
    )
    .expect("frequency pattern is valid")
});

static ON_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(on[\s-]?call|as[\s-]needed|will[\s-]call)$").expect("on-call pattern is valid"));

/// Parse a service frequency cell (`3x/week`, `3`, `on-call`, `1x/month`).
pub fn parse_frequency(s: &str) -> Option<Frequency> {
    let lower = s.trim().to_ascii_lowercase();
    if lower.is_empty() {
        return None;
    }
    if ON_CALL_RE.is_match(&lower) {
        return Some(Frequency::OnCall);
    }
    let caps = FREQUENCY_RE.captures(&lower)?;
    let n: f64 = caps.get(1)?.as_str().parse().ok()?;
    match caps.get(2).map(|m| m.as_str()) {
        Some("month" | "mo" | "monthly") => Some(Frequency::PerWeek(n / WEEKS_PER_MONTH)),
        _ => Some(Frequency::PerWeek(n)),
    }
}

/// True when a cell reads like a pickup frequency rather than a plain count.
pub fn looks_like_frequency(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    if parse_financial_number(&lower).is_some() {
        return false;
    }
    ON_CALL_RE.is_match(&lower) || FREQUENCY_RE.is_match(&lower)
}

static TONNAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:,\d{3})*(?:\.\d+)?)\s*(?:tons?|tn)\b").expect("tonnage pattern is valid")
});

/// Tonnage mentioned in a line description (`Disposal 4.27 tons`).
pub fn parse_tonnage(description: &str) -> Option<f64> {
    let caps = TONNAGE_RE.captures(description)?;
    parse_financial_number(caps.get(1)?.as_str())
}

/// Normalize a free-text key: lowercase, runs of space/hyphen/slash become `_`.
pub fn normalize_key(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_sep = false;
    for ch in s.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}
