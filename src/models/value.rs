//! Host values and host types.
//!
//! `Value` is the engine-neutral scalar that flows between records, parameters
//! and result rows. `HostType`/`PropertyType` describe the Rust side of a column,
//! and `DbValue` is implemented by every field type a record may expose.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

/// A scalar value read from or written to the database.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// NULL / database null
    #[default]
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Decimal(Decimal),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Json(JsonValue),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this value for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int16(_) => "i16",
            Self::Int32(_) => "i32",
            Self::Int64(_) => "i64",
            Self::Float32(_) => "f32",
            Self::Float64(_) => "f64",
            Self::Decimal(_) => "Decimal",
            Self::String(_) => "String",
            Self::Bytes(_) => "Vec<u8>",
            Self::Uuid(_) => "Uuid",
            Self::Date(_) => "NaiveDate",
            Self::Time(_) => "NaiveTime",
            Self::DateTime(_) => "NaiveDateTime",
            Self::Json(_) => "JsonValue",
        }
    }

    /// The host type carried by this value. `None` for null.
    pub fn host_type(&self) -> Option<HostType> {
        let host = match self {
            Self::Null => return None,
            Self::Bool(_) => HostType::Bool,
            Self::Int16(_) => HostType::Int16,
            Self::Int32(_) => HostType::Int32,
            Self::Int64(_) => HostType::Int64,
            Self::Float32(_) => HostType::Float32,
            Self::Float64(_) => HostType::Float64,
            Self::Decimal(_) => HostType::Decimal,
            Self::String(_) => HostType::String,
            Self::Bytes(_) => HostType::Bytes,
            Self::Uuid(_) => HostType::Uuid,
            Self::Date(_) => HostType::Date,
            Self::Time(_) => HostType::Time,
            Self::DateTime(_) => HostType::DateTime,
            Self::Json(_) => HostType::Json,
        };
        Some(host)
    }

    /// String form used when a value has to be sent as text.
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(v) => v.to_string(),
            Self::Int16(v) => v.to_string(),
            Self::Int32(v) => v.to_string(),
            Self::Int64(v) => v.to_string(),
            Self::Float32(v) => v.to_string(),
            Self::Float64(v) => v.to_string(),
            Self::Decimal(v) => v.to_string(),
            Self::String(v) => v.clone(),
            Self::Bytes(v) => base64_text(v),
            Self::Uuid(v) => v.to_string(),
            Self::Date(v) => v.format("%Y-%m-%d").to_string(),
            Self::Time(v) => v.format("%H:%M:%S%.f").to_string(),
            Self::DateTime(v) => v.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            Self::Json(v) => v.to_string(),
        }
    }

    /// Convert to JSON. Binary is UTF-8 decoded when `decode_binary` is set
    /// and valid, base64 otherwise.
    pub fn to_json(&self, decode_binary: bool) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(v) => JsonValue::Bool(*v),
            Self::Int16(v) => JsonValue::Number((*v).into()),
            Self::Int32(v) => JsonValue::Number((*v).into()),
            Self::Int64(v) => JsonValue::Number((*v).into()),
            Self::Float32(v) => float_json(*v as f64),
            Self::Float64(v) => float_json(*v),
            // Decimals keep their exact textual representation
            Self::Decimal(v) => JsonValue::String(v.to_string()),
            Self::Bytes(v) => decode_binary_value(v, decode_binary),
            Self::Json(v) => v.clone(),
            other => JsonValue::String(other.to_text()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            other => write!(f, "{}", other.to_text()),
        }
    }
}

fn float_json(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

fn base64_text(bytes: &[u8]) -> String {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    STANDARD.encode(bytes)
}

/// Decode binary data to a JSON value.
///
/// If `decode_binary` is true, attempts to decode as UTF-8 text first.
/// Falls back to base64 encoding if not valid UTF-8 or if `decode_binary` is false.
pub fn decode_binary_value(bytes: &[u8], decode_binary: bool) -> JsonValue {
    if decode_binary {
        if let Ok(s) = std::str::from_utf8(bytes) {
            return JsonValue::String(s.to_string());
        }
    }
    JsonValue::String(base64_text(bytes))
}

// =============================================================================
// Host types
// =============================================================================

/// The Rust-side type of a property or column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HostType {
    Bool,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal,
    String,
    Bytes,
    Uuid,
    Date,
    Time,
    DateTime,
    Json,
    /// A type with no scalar column mapping (nested structs, collections).
    Other(&'static str),
}

impl HostType {
    /// Rust spelling of the type, used in diagnostics and code generation.
    pub fn rust_name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int16 => "i16",
            Self::Int32 => "i32",
            Self::Int64 => "i64",
            Self::Float32 => "f32",
            Self::Float64 => "f64",
            Self::Decimal => "Decimal",
            Self::String => "String",
            Self::Bytes => "Vec<u8>",
            Self::Uuid => "Uuid",
            Self::Date => "NaiveDate",
            Self::Time => "NaiveTime",
            Self::DateTime => "NaiveDateTime",
            Self::Json => "JsonValue",
            Self::Other(name) => name,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Int16 | Self::Int32 | Self::Int64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, Self::Float32 | Self::Float64 | Self::Decimal)
    }
}

/// A host type plus its nullable wrapper (`Option<T>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyType {
    pub host: HostType,
    pub nullable: bool,
}

impl PropertyType {
    pub const fn required(host: HostType) -> Self {
        Self {
            host,
            nullable: false,
        }
    }

    pub const fn nullable(host: HostType) -> Self {
        Self {
            host,
            nullable: true,
        }
    }

    /// Rust spelling including the `Option` wrapper.
    pub fn type_name(&self) -> String {
        if self.nullable {
            format!("Option<{}>", self.host.rust_name())
        } else {
            self.host.rust_name().to_string()
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_name())
    }
}

// =============================================================================
// Conversion
// =============================================================================

/// A value could not be coerced into a field type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot convert {source_type} into {target_type}")]
pub struct ConversionError {
    pub source_type: &'static str,
    pub target_type: String,
}

impl ConversionError {
    fn new(value: &Value, target: PropertyType) -> Self {
        Self {
            source_type: value.type_name(),
            target_type: target.type_name(),
        }
    }
}

/// Implemented by every type that can appear as a record field.
///
/// `from_value(Value::Null)` yields the type's zero value, except for
/// `Option<T>` which yields `None`.
pub trait DbValue: Sized {
    const PROPERTY_TYPE: PropertyType;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self, ConversionError>;
}

fn integer_of(value: &Value) -> Option<i64> {
    match value {
        Value::Bool(v) => Some(*v as i64),
        Value::Int16(v) => Some(*v as i64),
        Value::Int32(v) => Some(*v as i64),
        Value::Int64(v) => Some(*v),
        Value::Float32(v) => whole_f64_to_i64(f64::from(*v)),
        Value::Float64(v) => whole_f64_to_i64(*v),
        Value::Decimal(v) if v.fract().is_zero() => v.to_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// `as` saturates out-of-range floats; those must fail instead
fn whole_f64_to_i64(v: f64) -> Option<i64> {
    (v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64).then(|| v as i64)
}

fn float_of(value: &Value) -> Option<f64> {
    match value {
        Value::Int16(v) => Some(*v as f64),
        Value::Int32(v) => Some(*v as f64),
        Value::Int64(v) => Some(*v as f64),
        Value::Float32(v) => Some(*v as f64),
        Value::Float64(v) => Some(*v),
        Value::Decimal(v) => v.to_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

macro_rules! impl_integer_value {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl DbValue for $ty {
                const PROPERTY_TYPE: PropertyType = PropertyType::required(HostType::$variant);

                fn to_value(&self) -> Value {
                    Value::$variant(*self)
                }

                fn from_value(value: Value) -> Result<Self, ConversionError> {
                    if value.is_null() {
                        return Ok(0);
                    }
                    integer_of(&value)
                        .and_then(|v| <$ty>::try_from(v).ok())
                        .ok_or_else(|| ConversionError::new(&value, Self::PROPERTY_TYPE))
                }
            }
        )+
    };
}

impl_integer_value!(i16 => Int16, i32 => Int32, i64 => Int64);

impl DbValue for f32 {
    const PROPERTY_TYPE: PropertyType = PropertyType::required(HostType::Float32);

    fn to_value(&self) -> Value {
        Value::Float32(*self)
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        if value.is_null() {
            return Ok(0.0);
        }
        float_of(&value)
            .map(|v| v as f32)
            .ok_or_else(|| ConversionError::new(&value, Self::PROPERTY_TYPE))
    }
}

impl DbValue for f64 {
    const PROPERTY_TYPE: PropertyType = PropertyType::required(HostType::Float64);

    fn to_value(&self) -> Value {
        Value::Float64(*self)
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        if value.is_null() {
            return Ok(0.0);
        }
        float_of(&value).ok_or_else(|| ConversionError::new(&value, Self::PROPERTY_TYPE))
    }
}

impl DbValue for bool {
    const PROPERTY_TYPE: PropertyType = PropertyType::required(HostType::Bool);

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match &value {
            Value::Null => Ok(false),
            Value::Bool(v) => Ok(*v),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(ConversionError::new(&value, Self::PROPERTY_TYPE)),
            },
            other => integer_of(other)
                .map(|v| v != 0)
                .ok_or_else(|| ConversionError::new(&value, Self::PROPERTY_TYPE)),
        }
    }
}

impl DbValue for Decimal {
    const PROPERTY_TYPE: PropertyType = PropertyType::required(HostType::Decimal);

    fn to_value(&self) -> Value {
        Value::Decimal(*self)
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        let converted = match &value {
            Value::Null => Some(Decimal::ZERO),
            Value::Decimal(v) => Some(*v),
            Value::Int16(v) => Some(Decimal::from(*v)),
            Value::Int32(v) => Some(Decimal::from(*v)),
            Value::Int64(v) => Some(Decimal::from(*v)),
            Value::Float32(v) => Decimal::try_from(*v).ok(),
            Value::Float64(v) => Decimal::try_from(*v).ok(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        converted.ok_or_else(|| ConversionError::new(&value, Self::PROPERTY_TYPE))
    }
}

impl DbValue for String {
    const PROPERTY_TYPE: PropertyType = PropertyType::required(HostType::String);

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(String::new()),
            Value::String(s) => Ok(s),
            v @ (Value::Uuid(_)
            | Value::Decimal(_)
            | Value::Date(_)
            | Value::Time(_)
            | Value::DateTime(_)) => Ok(v.to_text()),
            other => Err(ConversionError::new(&other, Self::PROPERTY_TYPE)),
        }
    }
}

impl DbValue for Vec<u8> {
    const PROPERTY_TYPE: PropertyType = PropertyType::required(HostType::Bytes);

    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Bytes(b) => Ok(b),
            Value::String(s) => Ok(s.into_bytes()),
            other => Err(ConversionError::new(&other, Self::PROPERTY_TYPE)),
        }
    }
}

impl DbValue for Uuid {
    const PROPERTY_TYPE: PropertyType = PropertyType::required(HostType::Uuid);

    fn to_value(&self) -> Value {
        Value::Uuid(*self)
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        let converted = match &value {
            Value::Null => Some(Uuid::nil()),
            Value::Uuid(v) => Some(*v),
            Value::String(s) => Uuid::parse_str(s.trim()).ok(),
            Value::Bytes(b) => Uuid::from_slice(b).ok(),
            _ => None,
        };
        converted.ok_or_else(|| ConversionError::new(&value, Self::PROPERTY_TYPE))
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.naive_utc())
        })
}

impl DbValue for NaiveDateTime {
    const PROPERTY_TYPE: PropertyType = PropertyType::required(HostType::DateTime);

    fn to_value(&self) -> Value {
        Value::DateTime(*self)
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        let converted = match &value {
            Value::Null => Some(NaiveDateTime::default()),
            Value::DateTime(v) => Some(*v),
            Value::Date(d) => d.and_hms_opt(0, 0, 0),
            Value::String(s) => parse_datetime(s),
            _ => None,
        };
        converted.ok_or_else(|| ConversionError::new(&value, Self::PROPERTY_TYPE))
    }
}

impl DbValue for NaiveDate {
    const PROPERTY_TYPE: PropertyType = PropertyType::required(HostType::Date);

    fn to_value(&self) -> Value {
        Value::Date(*self)
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        let converted = match &value {
            Value::Null => Some(NaiveDate::default()),
            Value::Date(v) => Some(*v),
            Value::DateTime(v) => Some(v.date()),
            Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .ok()
                .or_else(|| parse_datetime(s).map(|dt| dt.date())),
            _ => None,
        };
        converted.ok_or_else(|| ConversionError::new(&value, Self::PROPERTY_TYPE))
    }
}

impl DbValue for NaiveTime {
    const PROPERTY_TYPE: PropertyType = PropertyType::required(HostType::Time);

    fn to_value(&self) -> Value {
        Value::Time(*self)
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        let converted = match &value {
            Value::Null => Some(NaiveTime::default()),
            Value::Time(v) => Some(*v),
            Value::DateTime(v) => Some(v.time()),
            Value::String(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f").ok(),
            _ => None,
        };
        converted.ok_or_else(|| ConversionError::new(&value, Self::PROPERTY_TYPE))
    }
}

impl DbValue for JsonValue {
    const PROPERTY_TYPE: PropertyType = PropertyType::required(HostType::Json);

    fn to_value(&self) -> Value {
        Value::Json(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(JsonValue::Null),
            Value::Json(v) => Ok(v),
            Value::String(s) => serde_json::from_str(&s).map_err(|_| ConversionError {
                source_type: "String",
                target_type: Self::PROPERTY_TYPE.type_name(),
            }),
            other => Ok(other.to_json(false)),
        }
    }
}

impl<T: DbValue> DbValue for Option<T> {
    const PROPERTY_TYPE: PropertyType = PropertyType::nullable(T::PROPERTY_TYPE.host);

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        if value.is_null() {
            return Ok(None);
        }
        T::from_value(value).map(Some).map_err(|e| ConversionError {
            source_type: e.source_type,
            target_type: Self::PROPERTY_TYPE.type_name(),
        })
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )+
    };
}

impl_from_for_value!(
    bool => Bool,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    Decimal => Decimal,
    String => String,
    Vec<u8> => Bytes,
    Uuid => Uuid,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
    JsonValue => Json,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_becomes_zero_value() {
        assert_eq!(i32::from_value(Value::Null).unwrap(), 0);
        assert_eq!(String::from_value(Value::Null).unwrap(), "");
        assert!(!bool::from_value(Value::Null).unwrap());
        assert_eq!(Option::<i32>::from_value(Value::Null).unwrap(), None);
    }

    #[test]
    fn test_integer_narrowing() {
        assert_eq!(i32::from_value(Value::Int64(42)).unwrap(), 42);
        assert!(i16::from_value(Value::Int64(i64::MAX)).is_err());
        assert_eq!(i64::from_value(Value::String(" 7 ".into())).unwrap(), 7);
    }

    #[test]
    fn test_out_of_range_float_is_mismatch() {
        assert_eq!(i64::from_value(Value::Float64(-12.0)).unwrap(), -12);
        assert_eq!(i64::from_value(Value::Float32(3.0)).unwrap(), 3);
        assert_eq!(
            i64::from_value(Value::Float64(i64::MIN as f64)).unwrap(),
            i64::MIN
        );

        let err = i64::from_value(Value::Float64(1e30)).unwrap_err();
        assert_eq!(err.source_type, "f64");
        assert_eq!(err.target_type, "i64");
        assert!(i64::from_value(Value::Float64(i64::MAX as f64)).is_err());
        assert!(i64::from_value(Value::Float32(-1e30)).is_err());
        assert!(i64::from_value(Value::Float64(f64::INFINITY)).is_err());
        assert!(i64::from_value(Value::Float64(f64::NAN)).is_err());
        assert!(i64::from_value(Value::Float64(1.5)).is_err());
    }

    #[test]
    fn test_mismatch_reports_types() {
        let err = i32::from_value(Value::String("abc".into())).unwrap_err();
        assert_eq!(err.source_type, "String");
        assert_eq!(err.target_type, "i32");

        let err = Option::<i32>::from_value(Value::Bytes(vec![1])).unwrap_err();
        assert_eq!(err.target_type, "Option<i32>");
    }

    #[test]
    fn test_bool_from_sqlite_integer() {
        assert!(bool::from_value(Value::Int64(1)).unwrap());
        assert!(!bool::from_value(Value::Int64(0)).unwrap());
    }

    #[test]
    fn test_datetime_from_text() {
        let dt = NaiveDateTime::from_value(Value::String("2024-03-01 10:20:30".into())).unwrap();
        assert_eq!(dt.format("%H:%M").to_string(), "10:20");
    }

    #[test]
    fn test_option_property_type_is_nullable() {
        assert_eq!(
            <Option<i64> as DbValue>::PROPERTY_TYPE,
            PropertyType::nullable(HostType::Int64)
        );
        assert_eq!(<i64 as DbValue>::PROPERTY_TYPE.type_name(), "i64");
    }

    #[test]
    fn test_decode_binary_value() {
        assert_eq!(
            decode_binary_value(b"hello world", true),
            JsonValue::String("hello world".to_string())
        );
        assert_eq!(
            decode_binary_value(b"hello world", false),
            JsonValue::String("aGVsbG8gd29ybGQ=".to_string())
        );
        assert_eq!(
            decode_binary_value(&[0xFF, 0xFE, 0x00, 0x01], true),
            JsonValue::String("//4AAQ==".to_string())
        );
    }
}
