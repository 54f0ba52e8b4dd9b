//! [`Value`]: a structured payload with types plain JSON cannot carry.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// A regular expression literal, kept as source text and flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegExp {
    /// Pattern source, without the surrounding slashes.
    pub source: String,
    /// Flag characters, e.g. `"gi"`.
    pub flags: String,
}

impl RegExp {
    /// Build a regular expression literal.
    pub fn new(source: impl Into<String>, flags: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            flags: flags.into(),
        }
    }

    /// `/source/flags` literal form.
    pub fn to_literal(&self) -> String {
        format!("/{}/{}", self.source, self.flags)
    }

    /// Parse a `/source/flags` literal. The last `/` separates the flags.
    pub fn from_literal(s: &str) -> Option<Self> {
        let body = s.strip_prefix('/')?;
        let end = body.rfind('/')?;
        Some(Self::new(&body[..end], &body[end + 1..]))
    }
}

/// A structured payload value.
///
/// Mirrors what a job payload can hold on the producing side: besides the
/// plain JSON types it keeps dates, big integers, non-finite numbers, an
/// explicit "undefined", regular expressions, sets and maps with arbitrary keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A missing value that is still present as a key or array slot.
    Undefined,
    Null,
    Bool(bool),
    /// Any IEEE-754 double, including NaN, ±Infinity and -0.
    Number(f64),
    BigInt(i128),
    String(String),
    Date(DateTime<Utc>),
    RegExp(RegExp),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    /// Ordered collection of distinct values.
    Set(Vec<Value>),
    /// Ordered key/value pairs; keys may be any value.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Returns the date if this is a [`Value::Date`].
    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the number if this is a [`Value::Number`].
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string slice if this is a [`Value::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a member of a [`Value::Object`].
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Project onto plain JSON, dropping type information.
    ///
    /// Dates become RFC 3339 strings, big integers and non-finite numbers
    /// become strings, sets become arrays, maps become arrays of pairs and
    /// `Undefined` becomes `null`.
    pub fn into_json(self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Value::Undefined | Value::Null => J::Null,
            Value::Bool(b) => J::Bool(b),
            Value::Number(n) => number_to_json(n).unwrap_or_else(|| J::String(special_number(n).into())),
            Value::BigInt(i) => J::String(i.to_string()),
            Value::String(s) => J::String(s),
            Value::Date(d) => J::String(format_date(&d)),
            Value::RegExp(r) => J::String(r.to_literal()),
            Value::Array(items) | Value::Set(items) => {
                J::Array(items.into_iter().map(Value::into_json).collect())
            }
            Value::Object(map) => J::Object(map.into_iter().map(|(k, v)| (k, v.into_json())).collect()),
            Value::Map(pairs) => J::Array(
                pairs
                    .into_iter()
                    .map(|(k, v)| J::Array(vec![k.into_json(), v.into_json()]))
                    .collect(),
            ),
        }
    }
}

/// Largest integer magnitude a double represents exactly (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// JSON number for a finite, non-negative-zero double; `None` otherwise.
///
/// Integral values in the safe range are written without a fraction.
pub(crate) fn number_to_json(n: f64) -> Option<serde_json::Value> {
    if !n.is_finite() || (n == 0.0 && n.is_sign_negative()) {
        return None;
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Some(serde_json::Value::from(n as i64));
    }
    serde_json::Number::from_f64(n).map(serde_json::Value::Number)
}

/// Text form of a number JSON cannot represent.
pub(crate) fn special_number(n: f64) -> &'static str {
    if n.is_nan() {
        "NaN"
    } else if n == f64::INFINITY {
        "Infinity"
    } else if n == f64::NEG_INFINITY {
        "-Infinity"
    } else {
        "-0"
    }
}

pub(crate) fn parse_special_number(s: &str) -> Option<f64> {
    match s {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        "-0" => Some(-0.0),
        _ => None,
    }
}

/// ISO 8601 with millisecond precision and a `Z` suffix.
///
/// Years outside `0..=9999` are written with a sign and six digits
/// (`+010000-01-01T00:00:00.000Z`), the expanded form JavaScript dates use.
pub(crate) fn format_date(d: &DateTime<Utc>) -> String {
    let year = d.year();
    if (0..=9999).contains(&year) {
        return d.to_rfc3339_opts(SecondsFormat::Millis, true);
    }
    let sign = if year < 0 { '-' } else { '+' };
    format!(
        "{sign}{:06}{}",
        year.unsigned_abs(),
        d.format("-%m-%dT%H:%M:%S%.3fZ")
    )
}

/// Inverse of [`format_date`]. Also accepts any RFC 3339 offset.
pub(crate) fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s.strip_suffix('Z')?, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as J;
        match json {
            J::Null => Value::Null,
            J::Bool(b) => Value::Bool(b),
            J::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            J::String(s) => Value::String(s),
            J::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            J::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<RegExp> for Value {
    fn from(r: RegExp) -> Self {
        Value::RegExp(r)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::Object(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
