//! Dynamically typed cell values and the per-kind conversion table.
//!
//! Drivers hand back [`Value`]s in whatever native shape they have. Typed
//! fields declare a [`FieldKind`]; [`convert`] is the single place that turns
//! one into the other. Null stays null in the table; the zero value is picked
//! by the receiving Rust type through [`FieldValue::from_value`].

use crate::error::{QueryError, QueryResult};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::Serialize;
use std::fmt;

/// A single dynamically typed value
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
    /// Named fields produced by a record-shaped projection
    Record(Vec<(String, Value)>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// True when the value looks like an unsigned integer when printed
    pub fn is_numeric_text(&self) -> bool {
        let text = self.to_string();
        !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
    }

    /// Field lookup on a record value
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Short name of the variant, used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::DateTime(_) => "datetime",
            Value::Record(_) => "record",
        }
    }

    /// Ordering between two values. Null compares to nothing; text is
    /// compared numerically or as a date when the other side is one.
    pub fn compare(&self, other: &Value) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Text(_), Value::Int(_) | Value::Float(_)) => {
                to_float(self.clone()).ok()?.partial_cmp(&to_float(other.clone()).ok()?)
            }
            (Value::Int(_) | Value::Float(_), Value::Text(_)) => {
                other.compare(self).map(std::cmp::Ordering::reverse)
            }
            (Value::Text(_), Value::DateTime(b)) => to_datetime(self.clone()).ok().map(|a| a.cmp(b)),
            (Value::DateTime(_), Value::Text(_)) => {
                other.compare(self).map(std::cmp::Ordering::reverse)
            }
            _ => None,
        }
    }

    /// Truthiness used when a value stands alone as a predicate
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(x) => *x != 0.0,
            Value::Text(s) => to_bool(Value::Text(s.clone())).unwrap_or(false),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_DISPLAY)),
            Value::Record(fields) => {
                f.write_str("{ ")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} = {}", name, value)?;
                }
                f.write_str(" }")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::DateTime(d.and_time(chrono::NaiveTime::MIN))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => Value::Record(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), v.into()))
                    .collect(),
            ),
            serde_json::Value::Object(map) => {
                Value::Record(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

// ============================================================================
// Conversion table
// ============================================================================

const DATETIME_DISPLAY: &str = "%Y-%m-%d %H:%M:%S";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d-%b-%Y"];

/// Declared type of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Boolean,
    DateTime,
    /// Raw driver value, no conversion
    Any,
}

impl FieldKind {
    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::DateTime => "datetime",
            FieldKind::Any => "any",
        }
    }
}

/// Convert `value` to the representation of `kind`.
///
/// Blank text converts to null for every kind except text.
pub fn convert(value: Value, kind: FieldKind) -> QueryResult<Value> {
    if value.is_null() || kind == FieldKind::Any {
        return Ok(value);
    }
    if kind != FieldKind::Text && matches!(&value, Value::Text(s) if s.trim().is_empty()) {
        return Ok(Value::Null);
    }

    match kind {
        FieldKind::Text => Ok(match value {
            Value::Text(s) => Value::Text(s),
            other => Value::Text(other.to_string()),
        }),
        FieldKind::Integer => to_integer(value).map(Value::Int),
        FieldKind::Float => to_float(value).map(Value::Float),
        FieldKind::Boolean => to_bool(value).map(Value::Bool),
        FieldKind::DateTime => to_datetime(value).map(Value::DateTime),
        FieldKind::Any => Ok(value),
    }
}

fn to_integer(value: Value) -> QueryResult<i64> {
    match value {
        Value::Int(i) => Ok(i),
        Value::Float(x) => whole_number(x.round()).ok_or_else(|| QueryError::conversion(x, "integer")),
        Value::Bool(b) => Ok(b as i64),
        Value::Text(ref s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|x| x.fract() == 0.0)
                        .and_then(whole_number)
                })
                .ok_or_else(|| QueryError::conversion(s, "integer"))
        }
        other => Err(QueryError::conversion(other, "integer")),
    }
}

/// `x` as an `i64` when it is finite and in range
fn whole_number(x: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    (x.is_finite() && x >= i64::MIN as f64 && x < i64::MAX as f64).then(|| x as i64)
}

fn to_float(value: Value) -> QueryResult<f64> {
    match value {
        Value::Float(x) => Ok(x),
        Value::Int(i) => Ok(i as f64),
        Value::Bool(b) => Ok(if b { 1.0 } else { 0.0 }),
        Value::Text(ref s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| QueryError::conversion(s, "float")),
        other => Err(QueryError::conversion(other, "float")),
    }
}

fn to_bool(value: Value) -> QueryResult<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        Value::Int(i) => Ok(i != 0),
        Value::Float(x) => Ok(x != 0.0),
        Value::Text(ref s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(QueryError::conversion(s, "boolean")),
        },
        other => Err(QueryError::conversion(other, "boolean")),
    }
}

fn to_datetime(value: Value) -> QueryResult<NaiveDateTime> {
    match value {
        Value::DateTime(dt) => Ok(dt),
        Value::Int(i) => from_serial_date(i as f64).ok_or_else(|| QueryError::conversion(i, "datetime")),
        Value::Float(x) => from_serial_date(x).ok_or_else(|| QueryError::conversion(x, "datetime")),
        Value::Text(ref s) => parse_datetime(s.trim()).ok_or_else(|| QueryError::conversion(s, "datetime")),
        other => Err(QueryError::conversion(other, "datetime")),
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
}

/// Spreadsheet serial dates count days from 1899-12-30
fn from_serial_date(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_time(chrono::NaiveTime::MIN);
    let millis = whole_number((serial * 86_400_000.0).round())?;
    epoch.checked_add_signed(TimeDelta::try_milliseconds(millis)?)
}

// ============================================================================
// Typed field values
// ============================================================================

/// Rust types that can back a record field or be read out of a cell
pub trait FieldValue: Sized {
    const KIND: FieldKind;

    /// Build from a value; null yields the type's zero value
    fn from_value(value: Value) -> QueryResult<Self>;

    fn to_value(&self) -> Value;
}

impl FieldValue for String {
    const KIND: FieldKind = FieldKind::Text;

    fn from_value(value: Value) -> QueryResult<Self> {
        match convert(value, Self::KIND)? {
            Value::Text(s) => Ok(s),
            _ => Ok(String::new()),
        }
    }

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl FieldValue for i64 {
    const KIND: FieldKind = FieldKind::Integer;

    fn from_value(value: Value) -> QueryResult<Self> {
        match convert(value, Self::KIND)? {
            Value::Int(i) => Ok(i),
            _ => Ok(0),
        }
    }

    fn to_value(&self) -> Value {
        Value::Int(*self)
    }
}

impl FieldValue for i32 {
    const KIND: FieldKind = FieldKind::Integer;

    fn from_value(value: Value) -> QueryResult<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| QueryError::conversion(wide, "32-bit integer"))
    }

    fn to_value(&self) -> Value {
        Value::Int(*self as i64)
    }
}

impl FieldValue for f64 {
    const KIND: FieldKind = FieldKind::Float;

    fn from_value(value: Value) -> QueryResult<Self> {
        match convert(value, Self::KIND)? {
            Value::Float(x) => Ok(x),
            _ => Ok(0.0),
        }
    }

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl FieldValue for bool {
    const KIND: FieldKind = FieldKind::Boolean;

    fn from_value(value: Value) -> QueryResult<Self> {
        match convert(value, Self::KIND)? {
            Value::Bool(b) => Ok(b),
            _ => Ok(false),
        }
    }

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FieldValue for NaiveDateTime {
    const KIND: FieldKind = FieldKind::DateTime;

    fn from_value(value: Value) -> QueryResult<Self> {
        match convert(value, Self::KIND)? {
            Value::DateTime(dt) => Ok(dt),
            _ => Ok(NaiveDateTime::default()),
        }
    }

    fn to_value(&self) -> Value {
        Value::DateTime(*self)
    }
}

impl FieldValue for NaiveDate {
    const KIND: FieldKind = FieldKind::DateTime;

    fn from_value(value: Value) -> QueryResult<Self> {
        NaiveDateTime::from_value(value).map(|dt| dt.date())
    }

    fn to_value(&self) -> Value {
        Value::from(*self)
    }
}

impl FieldValue for Value {
    const KIND: FieldKind = FieldKind::Any;

    fn from_value(value: Value) -> QueryResult<Self> {
        Ok(value)
    }

    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    const KIND: FieldKind = T::KIND;

    fn from_value(value: Value) -> QueryResult<Self> {
        match convert(value, Self::KIND)? {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn to_value(&self) -> Value {
        self.as_ref().map(T::to_value).unwrap_or(Value::Null)
    }
}
