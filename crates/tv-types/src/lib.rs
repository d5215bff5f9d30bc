#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Packed cell identifier: column index in the high 32 bits, row index in the
/// low 32 bits. Row 0 is reserved for column (header) nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    #[must_use]
    pub const fn new(column: u32, row: u32) -> Self {
        Self(((column as u64) << 32) | row as u64)
    }

    #[must_use]
    pub const fn column_header(column: u32) -> Self {
        Self::new(column, 0)
    }

    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn column(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[must_use]
    pub const fn row(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    /// Same column, different row.
    #[must_use]
    pub const fn with_row(self, row: u32) -> Self {
        Self::new(self.column(), row)
    }
}

impl From<u64> for NodeId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.column(), self.row())
    }
}

/// Nominal type a column is declared with. Independent from the runtime tag of
/// the values stored underneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Utf8,
    Timestamp,
    Date,
    Custom,
    Null,
    Unknown,
}

impl FieldType {
    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::UInt8
                | Self::UInt16
                | Self::UInt32
                | Self::UInt64
        )
    }

    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    #[must_use]
    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    #[must_use]
    pub fn is_temporal(self) -> bool {
        matches!(self, Self::Timestamp | Self::Date)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "BOOL",
            Self::Int8 => "INT8",
            Self::Int16 => "INT16",
            Self::Int32 => "INT32",
            Self::Int64 => "INT64",
            Self::UInt8 => "UINT8",
            Self::UInt16 => "UINT16",
            Self::UInt32 => "UINT32",
            Self::UInt64 => "UINT64",
            Self::Float32 => "FLOAT32",
            Self::Float64 => "FLOAT64",
            Self::Utf8 => "STRING",
            Self::Timestamp => "TIMESTAMP",
            Self::Date => "DATE",
            Self::Custom => "CUSTOM",
            Self::Null => "NULL",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Whether a column admits null cells, and what to print for them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nullable {
    pub allowed: bool,
    pub replace_with: Option<String>,
}

impl Nullable {
    #[must_use]
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            replace_with: None,
        }
    }

    #[must_use]
    pub fn forbidden() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_replacement(mut self, replacement: impl Into<String>) -> Self {
        self.replace_with = Some(replacement.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Utf8(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// The field type matching this value's runtime tag.
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Null => FieldType::Null,
            Self::Bool(_) => FieldType::Bool,
            Self::Int8(_) => FieldType::Int8,
            Self::Int16(_) => FieldType::Int16,
            Self::Int32(_) => FieldType::Int32,
            Self::Int64(_) => FieldType::Int64,
            Self::UInt8(_) => FieldType::UInt8,
            Self::UInt16(_) => FieldType::UInt16,
            Self::UInt32(_) => FieldType::UInt32,
            Self::UInt64(_) => FieldType::UInt64,
            Self::Float32(_) => FieldType::Float32,
            Self::Float64(_) => FieldType::Float64,
            Self::Utf8(_) => FieldType::Utf8,
            Self::Timestamp(_) => FieldType::Timestamp,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True when the runtime tag is what a column declared as `field_type`
    /// is expected to hold. Dates are carried as timestamps and custom fields
    /// as strings.
    #[must_use]
    pub fn conforms_to(&self, field_type: FieldType) -> bool {
        match (self, field_type) {
            (Self::Timestamp(_), FieldType::Timestamp | FieldType::Date) => true,
            (Self::Utf8(_), FieldType::Utf8 | FieldType::Custom) => true,
            (_, FieldType::Unknown) => false,
            _ => self.field_type() == field_type,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn epoch_seconds(&self) -> Option<i64> {
        match self {
            Self::Timestamp(ts) => Some(ts.timestamp()),
            _ => None,
        }
    }

    pub fn to_f64(&self) -> Result<f64, TypeError> {
        match self {
            Self::Int8(v) => Ok(f64::from(*v)),
            Self::Int16(v) => Ok(f64::from(*v)),
            Self::Int32(v) => Ok(f64::from(*v)),
            Self::Int64(v) => Ok(*v as f64),
            Self::UInt8(v) => Ok(f64::from(*v)),
            Self::UInt16(v) => Ok(f64::from(*v)),
            Self::UInt32(v) => Ok(f64::from(*v)),
            Self::UInt64(v) => Ok(*v as f64),
            Self::Float32(v) => Ok(f64::from(*v)),
            Self::Float64(v) => Ok(*v),
            Self::Null => Err(TypeError::ValueIsNull),
            other => Err(TypeError::NonNumericValue {
                value: other.to_string(),
                field_type: other.field_type(),
            }),
        }
    }

    /// Order two values carrying the same runtime tag. Timestamps compare by
    /// epoch seconds. `Ok(None)` means the pair is unordered (NaN).
    pub fn partial_order(&self, other: &Self) -> Result<Option<Ordering>, TypeError> {
        let ordering = match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int8(a), Self::Int8(b)) => Some(a.cmp(b)),
            (Self::Int16(a), Self::Int16(b)) => Some(a.cmp(b)),
            (Self::Int32(a), Self::Int32(b)) => Some(a.cmp(b)),
            (Self::Int64(a), Self::Int64(b)) => Some(a.cmp(b)),
            (Self::UInt8(a), Self::UInt8(b)) => Some(a.cmp(b)),
            (Self::UInt16(a), Self::UInt16(b)) => Some(a.cmp(b)),
            (Self::UInt32(a), Self::UInt32(b)) => Some(a.cmp(b)),
            (Self::UInt64(a), Self::UInt64(b)) => Some(a.cmp(b)),
            (Self::Float32(a), Self::Float32(b)) => a.partial_cmp(b),
            (Self::Float64(a), Self::Float64(b)) => a.partial_cmp(b),
            (Self::Utf8(a), Self::Utf8(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.timestamp().cmp(&b.timestamp())),
            _ => {
                return Err(TypeError::IncompatibleValues {
                    left: self.field_type(),
                    right: other.field_type(),
                });
            }
        };
        Ok(ordering)
    }
}

/// Renders the way output writers print cells: booleans as `1`/`0`,
/// timestamps as RFC 3339, null as the empty string.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(v) => f.write_str(if *v { "1" } else { "0" }),
            Self::Int8(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::UInt8(v) => write!(f, "{v}"),
            Self::UInt16(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => f.write_str(v),
            Self::Timestamp(v) => f.write_str(&v.to_rfc3339()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::UInt64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("type mismatch: left is {left}, right is {right}")]
    Mismatch { left: FieldType, right: FieldType },
    #[error("type mismatch: {left} and {right} are not both in the allowed set")]
    NotAllowed { left: FieldType, right: FieldType },
    #[error("values of type {left} and {right} cannot be compared")]
    IncompatibleValues { left: FieldType, right: FieldType },
    #[error("cannot cast value of type {from} to {to}")]
    InvalidCast { from: FieldType, to: FieldType },
    #[error("cannot cast {value} to {to} without loss")]
    LossyCast { value: String, to: FieldType },
    #[error("cannot parse {0:?} as a timestamp")]
    InvalidTimestamp(String),
    #[error("value {value:?} has non-numeric type {field_type}")]
    NonNumericValue { value: String, field_type: FieldType },
    #[error("value is null")]
    ValueIsNull,
}

/// Find the type both operands share within `allowed`. Unknown declared types
/// never resolve.
pub fn resolve_common_type(
    allowed: &[FieldType],
    left: FieldType,
    right: FieldType,
) -> Result<FieldType, TypeError> {
    let admitted = |t: FieldType| t != FieldType::Unknown && allowed.contains(&t);
    if !admitted(left) || !admitted(right) {
        return Err(TypeError::NotAllowed { left, right });
    }
    if left != right {
        return Err(TypeError::Mismatch { left, right });
    }
    Ok(left)
}

/// Cast a value to the runtime representation of `target`. Null casts to null
/// for every target.
pub fn cast_value(value: &Value, target: FieldType) -> Result<Value, TypeError> {
    if value.is_null() || value.conforms_to(target) {
        return Ok(value.clone());
    }

    let from = value.field_type();
    let lossy = || TypeError::LossyCast {
        value: value.to_string(),
        to: target,
    };

    match target {
        FieldType::Null => Ok(Value::Null),
        FieldType::Bool => match value {
            Value::Utf8(v) => match v.trim() {
                "1" | "true" | "TRUE" | "True" => Ok(Value::Bool(true)),
                "0" | "false" | "FALSE" | "False" => Ok(Value::Bool(false)),
                _ => Err(lossy()),
            },
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        t if t.is_integer() => {
            let wide = integral_i128(value).ok_or(TypeError::InvalidCast { from, to: target })?;
            narrow_integer(wide, target).ok_or_else(lossy)
        }
        FieldType::Float32 => Ok(Value::Float32(value.to_f64()? as f32)),
        FieldType::Float64 => Ok(Value::Float64(value.to_f64()?)),
        FieldType::Utf8 | FieldType::Custom => match value {
            Value::Utf8(v) => Ok(Value::Utf8(v.clone())),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        FieldType::Timestamp | FieldType::Date => match value {
            Value::Utf8(v) => parse_timestamp(v).map(Value::Timestamp),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        _ => Err(TypeError::InvalidCast { from, to: target }),
    }
}

/// Parse RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, TypeError> {
    let trimmed = input.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| TypeError::InvalidTimestamp(trimmed.to_owned()))
}

fn integral_i128(value: &Value) -> Option<i128> {
    match value {
        Value::Int8(v) => Some(i128::from(*v)),
        Value::Int16(v) => Some(i128::from(*v)),
        Value::Int32(v) => Some(i128::from(*v)),
        Value::Int64(v) => Some(i128::from(*v)),
        Value::UInt8(v) => Some(i128::from(*v)),
        Value::UInt16(v) => Some(i128::from(*v)),
        Value::UInt32(v) => Some(i128::from(*v)),
        Value::UInt64(v) => Some(i128::from(*v)),
        Value::Float32(v) => float_to_i128(f64::from(*v)),
        Value::Float64(v) => float_to_i128(*v),
        Value::Utf8(v) => v.trim().parse::<i128>().ok(),
        _ => None,
    }
}

fn float_to_i128(v: f64) -> Option<i128> {
    if !v.is_finite() || v != v.trunc() || v.abs() > 1e38 {
        return None;
    }
    Some(v as i128)
}

fn narrow_integer(v: i128, target: FieldType) -> Option<Value> {
    Some(match target {
        FieldType::Int8 => Value::Int8(i8::try_from(v).ok()?),
        FieldType::Int16 => Value::Int16(i16::try_from(v).ok()?),
        FieldType::Int32 => Value::Int32(i32::try_from(v).ok()?),
        FieldType::Int64 => Value::Int64(i64::try_from(v).ok()?),
        FieldType::UInt8 => Value::UInt8(u8::try_from(v).ok()?),
        FieldType::UInt16 => Value::UInt16(u16::try_from(v).ok()?),
        FieldType::UInt32 => Value::UInt32(u32::try_from(v).ok()?),
        FieldType::UInt64 => Value::UInt64(u64::try_from(v).ok()?),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::{FieldType, NodeId, TypeError, Value, cast_value, resolve_common_type};

    #[test]
    fn node_id_packs_column_high_and_row_low() {
        let id = NodeId::new(3, 17);
        assert_eq!(id.raw(), (3_u64 << 32) | 17);
        assert_eq!(id.column(), 3);
        assert_eq!(id.row(), 17);
        assert_eq!(id.with_row(2), NodeId::new(3, 2));
        assert!(NodeId::new(1, u32::MAX) < NodeId::new(2, 0));
    }

    #[test]
    fn resolve_requires_shared_allowed_type() {
        let allowed = [FieldType::Int64, FieldType::Utf8];
        assert_eq!(
            resolve_common_type(&allowed, FieldType::Utf8, FieldType::Utf8),
            Ok(FieldType::Utf8)
        );
        assert_eq!(
            resolve_common_type(&allowed, FieldType::Int64, FieldType::Utf8),
            Err(TypeError::Mismatch {
                left: FieldType::Int64,
                right: FieldType::Utf8
            })
        );
        assert!(matches!(
            resolve_common_type(&allowed, FieldType::Bool, FieldType::Bool),
            Err(TypeError::NotAllowed { .. })
        ));
    }

    #[test]
    fn partial_order_rejects_mixed_tags() {
        let err = Value::Int32(1)
            .partial_order(&Value::Int64(1))
            .expect_err("mixed tags must fail");
        assert_eq!(
            err.to_string(),
            "values of type INT32 and INT64 cannot be compared"
        );
        assert_eq!(
            Value::from("Bar").partial_order(&Value::from("Three")),
            Ok(Some(Ordering::Less))
        );
        assert_eq!(
            Value::Float64(f64::NAN).partial_order(&Value::Float64(1.0)),
            Ok(None)
        );
    }

    #[test]
    fn literal_casts_follow_declared_type() {
        assert_eq!(
            cast_value(&Value::Int64(12), FieldType::UInt8),
            Ok(Value::UInt8(12))
        );
        assert!(matches!(
            cast_value(&Value::Int64(300), FieldType::Int8),
            Err(TypeError::LossyCast { .. })
        ));
        let ts = cast_value(&Value::from("2019-08-01"), FieldType::Date).expect("date parses");
        assert_eq!(ts.epoch_seconds(), Some(1_564_617_600));
        assert_eq!(cast_value(&Value::Null, FieldType::Int32), Ok(Value::Null));
    }

    #[test]
    fn display_renders_output_form() {
        assert_eq!(Value::Bool(true).to_string(), "1");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::from("Foo").to_string(), "Foo");
    }

    #[test]
    fn value_serializes_with_kind_tag() {
        let json = serde_json::to_string(&Value::Int32(7)).expect("serialize");
        assert_eq!(json, r#"{"kind":"int32","value":7}"#);
    }
}
