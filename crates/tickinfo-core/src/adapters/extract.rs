//! Text and payload helpers shared by the scraping adapters.
//!
//! Every helper returns `Option`: a value that cannot be found or parsed is
//! `None` and ends up as a `null` field, never as an adapter error.

use serde_json::Value;

use crate::{FieldName, FieldSet, FieldValue, Record};

/// Extraction function for one field over a parsed upstream payload.
pub(crate) type Extractor<P> = fn(&P) -> FieldValue;

/// Evaluates the extractor of every requested field.
///
/// `table` maps a field to its extractor; fields without one are `null`.
pub(crate) fn evaluate<P>(
    payload: &P,
    fields: &FieldSet,
    table: fn(FieldName) -> Option<Extractor<P>>,
) -> Record {
    fields
        .iter()
        .map(|field| {
            let value = table(field).map_or(FieldValue::Null, |extract| extract(payload));
            (field, value)
        })
        .collect()
}

/// Decimal convention of a number rendered as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberFormat {
    /// `1,234.5`
    DecimalPoint,
    /// `1.234,5`
    DecimalComma,
}

/// Text between the first `start` marker and the next `end` marker.
pub fn anchored<'t>(text: &'t str, start: &str, end: &str) -> Option<&'t str> {
    let from = text.find(start)? + start.len();
    let rest = &text[from..];
    let to = rest.find(end)?;
    let slice = &rest[..to];
    (!slice.is_empty()).then_some(slice)
}

/// Like [`anchored`], with line breaks and HTML tags removed and the result
/// trimmed.
pub fn anchored_text(text: &str, start: &str, end: &str) -> Option<String> {
    let raw = anchored(text, start, end)?;
    let flattened: String = raw.chars().filter(|c| *c != '\n' && *c != '\t').collect();
    let cleaned = strip_tags(&flattened).replace("&amp;", "&");
    let cleaned = cleaned.trim();
    (!cleaned.is_empty()).then(|| cleaned.to_owned())
}

pub fn strip_tags(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => output.push(ch),
            _ => {}
        }
    }
    output
}

/// Parses numbers such as `R$ 1.234,56`, `US$12.5`, `-3.2%` or `1,024`.
///
/// A percent sign is dropped without scaling.
pub fn parse_number(text: &str, format: NumberFormat) -> Option<f64> {
    let separators_fixed = match format {
        NumberFormat::DecimalPoint => text.replace(',', ""),
        NumberFormat::DecimalComma => text.replace('.', "").replace(',', "."),
    };
    let cleaned: String = separators_fixed
        .replace("US$", "")
        .replace("R$", "")
        .replace(['$', '%'], "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Parses a number carrying a magnitude such as `2.95T`, `15.5M`, `830K` or
/// `1,2 Bilhões`.
pub fn parse_magnitude(text: &str, format: NumberFormat) -> Option<f64> {
    const WORDS: [(&str, f64); 3] = [
        ("Trilhões", 1e12),
        ("Bilhões", 1e9),
        ("Milhões", 1e6),
    ];

    let trimmed = text.trim();
    for (word, factor) in WORDS {
        if trimmed.contains(word) {
            return parse_number(&trimmed.replace(word, ""), format).map(|value| value * factor);
        }
    }

    let factor = match trimmed.chars().last() {
        Some('K') => 1e3,
        Some('M') => 1e6,
        Some('B') => 1e9,
        Some('T') => 1e12,
        _ => return parse_number(trimmed, format),
    };
    let digits = &trimmed[..trimmed.len() - 1];
    parse_number(digits, format).map(|value| value * factor)
}

/// Drops standalone `REIT`, `STOCK` and `ETF` words from a display name.
pub fn strip_kind_suffix(name: &str) -> String {
    name.split_whitespace()
        .filter(|word| !matches!(*word, "REIT" | "STOCK" | "ETF"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `numerator / denominator`, or `None` when either is missing or the
/// denominator is zero.
pub fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(numerator), Some(denominator)) if denominator != 0.0 => {
            Some(numerator / denominator).filter(|value| value.is_finite())
        }
        _ => None,
    }
}

/// Numeric JSON value; strings are parsed with [`parse_number`].
pub fn json_number(value: &Value, format: NumberFormat) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => parse_number(text, format),
        _ => None,
    }
}

/// Numeric JSON value with an optional magnitude suffix.
pub fn json_magnitude(value: &Value, format: NumberFormat) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => parse_magnitude(text, format),
        _ => None,
    }
}

/// Text JSON value; numbers are rendered, empty strings are `None`.
pub fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Number or text, whichever the JSON value holds.
pub fn json_scalar(value: &Value) -> FieldValue {
    match value {
        Value::Number(number) => number.as_f64().map_or(FieldValue::Null, FieldValue::number),
        Value::String(text) if !text.trim().is_empty() => FieldValue::text(text.trim()),
        _ => FieldValue::Null,
    }
}

/// One annual dividend total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DividendPoint {
    pub year: i32,
    pub amount: f64,
}

/// Reads `[{"created_at": 2024, "price": 1.5}, ...]`, skipping entries that
/// lack either member.
pub fn dividend_points(payload: &Value) -> Vec<DividendPoint> {
    payload
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let year = json_number(entry.get("created_at")?, NumberFormat::DecimalPoint)?;
                    let amount = json_number(entry.get("price")?, NumberFormat::DecimalPoint)?;
                    Some(DividendPoint {
                        year: year as i32,
                        amount,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// This year's total, falling back to last year's. A zero total counts as
/// missing.
pub fn latest_dividend(points: &[DividendPoint], current_year: i32) -> Option<f64> {
    let for_year = |year: i32| {
        points
            .iter()
            .find(|point| point.year == year)
            .map(|point| point.amount)
            .filter(|amount| *amount != 0.0)
    };
    for_year(current_year).or_else(|| for_year(current_year - 1))
}

pub fn mean_dividend(points: &[DividendPoint]) -> Option<f64> {
    if points.is_empty() {
        return None;
    }
    let total: f64 = points.iter().map(|point| point.amount).sum();
    Some(total / points.len() as f64)
}

/// One hop through a SvelteKit `__data.json` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hop {
    Key(&'static str),
    Index(usize),
}

/// Location of a value inside a SvelteKit data node.
///
/// The node's `data` array stores values by reference: objects and arrays
/// hold integer positions into the same array. Starting from `data[root]`,
/// every hop reads a position and jumps to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SveltePath {
    pub node: usize,
    pub root: usize,
    pub hops: &'static [Hop],
}

impl SveltePath {
    pub const fn new(node: usize, root: usize, hops: &'static [Hop]) -> Self {
        Self { node, root, hops }
    }

    pub fn resolve<'d>(&self, document: &'d Value) -> Option<&'d Value> {
        let data = document
            .get("nodes")?
            .get(self.node)?
            .get("data")?
            .as_array()?;

        let mut current = data.get(self.root)?;
        for hop in self.hops {
            let pointer = match hop {
                Hop::Key(key) => current.get(*key)?,
                Hop::Index(index) => current.get(*index)?,
            };
            let position = usize::try_from(pointer.as_u64()?).ok()?;
            current = data.get(position)?;
        }
        Some(current)
    }
}
