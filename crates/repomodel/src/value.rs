//! Scalar values held by fields and rows.
//!
//! [`Value`] is the runtime representation of a scalar field value, and
//! [`ValueKind`] is the declared kind a field expects. Documents carry every
//! scalar as text, so the declared kind decides how text is parsed back.
//!
//! [`DocDate`] is the temporal value. It is either a plain day or a full
//! timestamp with a fixed UTC offset:
//!
//! | Input | Rendered |
//! |-------|----------|
//! | `1972-11-10` | `1972-11-10` |
//! | `2010-06-04T22:36:53Z` | `2010-06-04T22:36:53+00:00` |
//! | `2010-06-04T22:36:53+2:3` | `2010-06-04T22:36:53+02:03` |
//!
//! Timestamps without a zone are rejected.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, Result};

/// The declared kind of a scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueKind {
    #[default]
    Text,
    Int,
    Bool,
    Date,
}

impl ValueKind {
    /// Parse document text into a value of this kind.
    pub fn parse(&self, raw: &str) -> Result<Value> {
        match self {
            ValueKind::Text => Ok(Value::Text(raw.to_string())),
            ValueKind::Int => raw
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| ModelError::Argument(format!("'{}' is not an integer", raw))),
            ValueKind::Bool => match raw.trim() {
                "1" | "true" => Ok(Value::Bool(true)),
                "0" | "false" | "" => Ok(Value::Bool(false)),
                other => Err(ModelError::Argument(format!(
                    "'{}' is not a boolean",
                    other
                ))),
            },
            ValueKind::Date => raw.parse::<DocDate>().map(Value::Date),
        }
    }
}

/// Runtime representation of a scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Text(String),
    Int(i64),
    Bool(bool),
    Date(DocDate),
}

impl Value {
    /// Text form used in documents and joined multi-value attributes.
    pub fn render(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Value::Date(d) => d.to_string(),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Text(_) => ValueKind::Text,
            Value::Int(_) => ValueKind::Int,
            Value::Bool(_) => ValueKind::Bool,
            Value::Date(_) => ValueKind::Date,
        }
    }

    /// Only empty text counts as empty; `0` and `false` are values.
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Text(s) if s.is_empty())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DocDate> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Date(d) => serde_json::Value::String(d.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<DocDate> for Value {
    fn from(value: DocDate) -> Self {
        Value::Date(value)
    }
}

/// A calendar day or a timestamp with a fixed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocDate {
    Day(NaiveDate),
    Timestamp(DateTime<FixedOffset>),
}

impl DocDate {
    pub fn now() -> Self {
        DocDate::Timestamp(Utc::now().into())
    }

    pub fn year(&self) -> i32 {
        match self {
            DocDate::Day(d) => d.year(),
            DocDate::Timestamp(t) => t.year(),
        }
    }

    pub fn month(&self) -> u32 {
        match self {
            DocDate::Day(d) => d.month(),
            DocDate::Timestamp(t) => t.month(),
        }
    }

    pub fn day(&self) -> u32 {
        match self {
            DocDate::Day(d) => d.day(),
            DocDate::Timestamp(t) => t.day(),
        }
    }

    pub fn timestamp(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            DocDate::Day(_) => None,
            DocDate::Timestamp(t) => Some(t),
        }
    }
}

impl fmt::Display for DocDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocDate::Day(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            DocDate::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%dT%H:%M:%S%:z")),
        }
    }
}

impl FromStr for DocDate {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ModelError::Argument(format!("invalid date string '{}'", s));

        if !s.is_ascii() {
            return Err(invalid());
        }

        if s.len() == 10 {
            return NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(DocDate::Day)
                .map_err(|_| invalid());
        }

        if s.len() < 20 {
            return Err(invalid());
        }

        let (local, zone) = s.split_at(19);
        let naive =
            NaiveDateTime::parse_from_str(local, "%Y-%m-%dT%H:%M:%S").map_err(|_| invalid())?;
        let offset = parse_offset(zone).ok_or_else(invalid)?;
        let stamp = offset
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(invalid)?;

        Ok(DocDate::Timestamp(stamp))
    }
}

/// Accepts `Z` or `[+-]H:M` with one or two digits per part.
fn parse_offset(zone: &str) -> Option<FixedOffset> {
    if zone == "Z" {
        return FixedOffset::east_opt(0);
    }

    let sign = match zone.chars().next()? {
        '+' => 1,
        '-' => -1,
        _ => return None,
    };
    let (hours, minutes) = zone[1..].split_once(':')?;
    let part = |p: &str| -> Option<i32> {
        if p.is_empty() || p.len() > 2 || !p.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        p.parse().ok()
    };
    let (hours, minutes) = (part(hours)?, part(minutes)?);
    if hours > 23 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl Serialize for DocDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DocDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
