//! Lenient numeric input handling
//!
//! Table cells arrive as whatever the operator typed: numbers, numeric text,
//! blanks or nulls. Anything that is not a finite number collapses to the
//! field's default instead of failing the whole estimate.

use serde::{Deserialize, Deserializer};

/// Untyped cell as it appears in YAML or JSON input
#[derive(Deserialize)]
#[serde(untagged)]
enum RawCell {
    Number(f64),
    Text(String),
    Bool(bool),
}

/// Parse a cell value, returning `None` for blanks and non-numeric text
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim().replace(',', "");
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn lenient<'de, D>(deserializer: D, default: f64) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawCell>::deserialize(deserializer).unwrap_or(None);
    let value = match raw {
        Some(RawCell::Number(n)) if n.is_finite() => n,
        Some(RawCell::Text(s)) => parse_number(&s).unwrap_or(default),
        _ => default,
    };
    // Inputs are quantities; negatives clamp to zero
    Ok(value.max(0.0))
}

/// Numeric field defaulting to 0 (prices, weights, rates, times)
pub fn zero_default<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    lenient(deserializer, 0.0)
}

/// Numeric field defaulting to 1 (U/S, headcount)
pub fn one_default<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    lenient(deserializer, 1.0)
}

/// Text field that also accepts numbers (SCRAP weight, codes typed as numbers)
pub fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawCell>::deserialize(deserializer).unwrap_or(None);
    Ok(match raw {
        Some(RawCell::Text(s)) => s,
        Some(RawCell::Number(n)) => format_plain(n),
        Some(RawCell::Bool(b)) => b.to_string(),
        _ => String::new(),
    })
}

/// Render a number without a trailing `.0` for integral values
pub fn format_plain(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

pub(crate) fn one() -> f64 {
    1.0
}
