//! Raw-value coercions shared by all sources
//!
//! Source formats vary: financial figures arrive as plain numbers or as
//! currency strings with thousands separators, dates in several spellings.
//! Every function here coerces or rejects to None, never errors.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::model::Officer;

/// Reason a raw record failed normalization
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid record: {reason}")]
pub struct InvalidRecord {
    pub reason: String,
}

impl InvalidRecord {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Coerce a raw numeric string to a finite float.
///
/// Strips whitespace (including NBSP) and the euro sign, accepts comma as the
/// decimal separator.
pub fn clean_numeric(raw: &str) -> Option<f64> {
    let mut cleaned = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_whitespace() {
            continue;
        }
        match c {
            '€' => {}
            ',' => cleaned.push('.'),
            _ => cleaned.push(c),
        }
    }
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Deserialize an optional value that could be a number or a formatted string
pub fn flexible_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Float(f64),
        Int(i64),
        String(String),
        Null,
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        Some(NumberOrString::Float(f)) if f.is_finite() => Ok(Some(f)),
        Some(NumberOrString::Float(_)) => Ok(None),
        Some(NumberOrString::Int(i)) => Ok(Some(i as f64)),
        Some(NumberOrString::String(s)) => Ok(clean_numeric(&s)),
        Some(NumberOrString::Null) | None => Ok(None),
    }
}

/// Parse a date in any of the spellings the sources emit.
///
/// `DD/MM/YYYY`, ISO `YYYY-MM-DD`, `DD-MM-YYYY` and an ISO datetime prefix all
/// normalize to the same value.
pub fn clean_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let date_part = raw.split(|c| c == 'T' || c == ' ').next().unwrap_or(raw);
    for format in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, format) {
            return Some(date);
        }
    }
    None
}

/// Validate and normalize a SIREN: exactly 9 ASCII digits after trimming
pub fn normalize_siren(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.len() == 9 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        Some(trimmed.to_string())
    } else {
        None
    }
}

/// Join address parts into one line: `line1, postal city`.
///
/// The postal/city part is appended only when both are present.
pub fn format_address(
    line1: Option<&str>,
    postal_code: Option<&str>,
    city: Option<&str>,
) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();

    if let Some(line) = line1.map(str::trim).filter(|s| !s.is_empty()) {
        parts.push(line.to_string());
    }

    let postal = postal_code.map(str::trim).filter(|s| !s.is_empty());
    let city = city.map(str::trim).filter(|s| !s.is_empty());
    if let (Some(postal), Some(city)) = (postal, city) {
        parts.push(format!("{} {}", postal, city));
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

/// Display line for an officer: `Name (Role)` or the name alone
pub fn officer_line(officer: &Officer) -> String {
    match officer.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        Some(role) => format!("{} ({})", officer.name, role),
        None => officer.name.clone(),
    }
}
