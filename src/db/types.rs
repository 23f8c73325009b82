//! Database-agnostic type mappings.
//!
//! This module maps between host types and provider column types, and decodes
//! driver rows into [`Value`]s.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `host_type_for` classifies a provider type name into a host type
//! 2. Database-specific decoders extract the value for that host type
//!
//! Each dialect owns a [`TypeMapper`] that names provider types for the
//! neutral [`DbType`] codes; the inverse lookup is shared.

use crate::models::{DbType, DbValue, DriverKind, HostType, PropertyType, ProviderType, Value};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};
use std::fmt;
use uuid::Uuid;

/// Default length for text columns without a length annotation.
pub const DEFAULT_TEXT_LENGTH: u32 = 512;
/// Default length for binary columns without a length annotation.
pub const DEFAULT_BINARY_LENGTH: u32 = 4000;
pub const DEFAULT_DECIMAL_PRECISION: u8 = 18;
pub const DEFAULT_DECIMAL_SCALE: u8 = 4;

// =============================================================================
// Type Mapping
// =============================================================================

/// Maps host types to provider types and back.
pub trait TypeMapper: Send + Sync + fmt::Debug {
    fn driver(&self) -> DriverKind;

    /// Base provider type name for a neutral type code.
    fn type_name(&self, db_type: DbType) -> &'static str;

    /// Provider type for a property type. The nullable wrapper is ignored.
    ///
    /// Returns `None` for host types with no scalar mapping; callers fall
    /// back to a textual type.
    fn provider_type(&self, ty: PropertyType) -> Option<ProviderType> {
        let db_type = DbType::for_host(ty.host)?;
        let provider = ProviderType::new(db_type, self.type_name(db_type));
        Some(match db_type {
            DbType::String => provider.with_size(DEFAULT_TEXT_LENGTH),
            DbType::Binary => provider.with_size(DEFAULT_BINARY_LENGTH),
            DbType::Decimal => {
                provider.with_precision(DEFAULT_DECIMAL_PRECISION, DEFAULT_DECIMAL_SCALE)
            }
            _ => provider,
        })
    }

    /// Type declaration used in DDL.
    fn declaration(&self, provider: &ProviderType) -> String {
        provider.declaration()
    }

    /// Host type for a provider type name, e.g. `VARCHAR(50)` or `tinyint(1)`.
    fn host_type(&self, provider_type_name: &str) -> Option<HostType> {
        host_type_for(provider_type_name, self.driver())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerTypeMapper;

impl TypeMapper for SqlServerTypeMapper {
    fn driver(&self) -> DriverKind {
        DriverKind::SqlServer
    }

    fn type_name(&self, db_type: DbType) -> &'static str {
        match db_type {
            DbType::Boolean => "BIT",
            DbType::Int16 => "SMALLINT",
            DbType::Int32 => "INT",
            DbType::Int64 => "BIGINT",
            DbType::Single => "REAL",
            DbType::Double => "FLOAT",
            DbType::Decimal => "DECIMAL",
            DbType::String => "NVARCHAR",
            DbType::Binary => "VARBINARY",
            DbType::Guid => "UNIQUEIDENTIFIER",
            DbType::Date => "DATE",
            DbType::Time => "TIME",
            DbType::DateTime => "DATETIME2",
            DbType::Json => "NVARCHAR(MAX)",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlTypeMapper;

impl TypeMapper for MySqlTypeMapper {
    fn driver(&self) -> DriverKind {
        DriverKind::MySql
    }

    fn type_name(&self, db_type: DbType) -> &'static str {
        match db_type {
            DbType::Boolean => "TINYINT(1)",
            DbType::Int16 => "SMALLINT",
            DbType::Int32 => "INT",
            DbType::Int64 => "BIGINT",
            DbType::Single => "FLOAT",
            DbType::Double => "DOUBLE",
            DbType::Decimal => "DECIMAL",
            DbType::String => "VARCHAR",
            DbType::Binary => "VARBINARY",
            DbType::Guid => "CHAR(36)",
            DbType::Date => "DATE",
            DbType::Time => "TIME",
            DbType::DateTime => "DATETIME",
            DbType::Json => "JSON",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresTypeMapper;

impl TypeMapper for PostgresTypeMapper {
    fn driver(&self) -> DriverKind {
        DriverKind::Postgres
    }

    fn type_name(&self, db_type: DbType) -> &'static str {
        match db_type {
            DbType::Boolean => "BOOLEAN",
            DbType::Int16 => "SMALLINT",
            DbType::Int32 => "INTEGER",
            DbType::Int64 => "BIGINT",
            DbType::Single => "REAL",
            DbType::Double => "DOUBLE PRECISION",
            DbType::Decimal => "NUMERIC",
            DbType::String => "VARCHAR",
            DbType::Binary => "BYTEA",
            DbType::Guid => "UUID",
            DbType::Date => "DATE",
            DbType::Time => "TIME",
            DbType::DateTime => "TIMESTAMP",
            DbType::Json => "JSONB",
        }
    }

    fn declaration(&self, provider: &ProviderType) -> String {
        // BYTEA takes no length
        if provider.db_type == DbType::Binary {
            return provider.name.to_string();
        }
        provider.declaration()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteTypeMapper;

impl TypeMapper for SqliteTypeMapper {
    fn driver(&self) -> DriverKind {
        DriverKind::Sqlite
    }

    fn type_name(&self, db_type: DbType) -> &'static str {
        match db_type {
            DbType::Boolean => "BOOLEAN",
            DbType::Int16 => "SMALLINT",
            DbType::Int32 => "INT",
            DbType::Int64 => "INTEGER",
            DbType::Single => "FLOAT",
            DbType::Double => "DOUBLE",
            DbType::Decimal => "DECIMAL",
            DbType::String => "TEXT",
            DbType::Binary => "BLOB",
            DbType::Guid => "UUID",
            DbType::Date => "DATE",
            DbType::Time => "TIME",
            DbType::DateTime => "DATETIME",
            DbType::Json => "JSON",
        }
    }

    fn declaration(&self, provider: &ProviderType) -> String {
        // Storage classes ignore declared lengths
        match provider.db_type {
            DbType::String | DbType::Binary => provider.name.to_string(),
            _ => provider.declaration(),
        }
    }
}

/// Classify a provider type name into a host type.
pub fn host_type_for(type_name: &str, driver: DriverKind) -> Option<HostType> {
    let lower = type_name.trim().to_lowercase();

    // Booleans stored as one-bit integers
    if lower.starts_with("tinyint(1)")
        || lower.starts_with("bit(1)")
        || matches!(lower.as_str(), "bit" | "bool" | "boolean")
    {
        return Some(HostType::Bool);
    }
    if driver == DriverKind::MySql && lower == "char(36)" {
        return Some(HostType::Uuid);
    }

    let base = lower.split('(').next().unwrap_or("").trim();
    let base = base
        .trim_end_matches(" unsigned")
        .trim_end_matches(" signed")
        .trim();

    let host = match base {
        "smallserial" | "serial2" => HostType::Int16,
        "serial" | "serial4" => HostType::Int32,
        "bigserial" | "serial8" => HostType::Int64,
        "integer" if driver == DriverKind::Sqlite => HostType::Int64,
        "bigint" | "int8" => HostType::Int64,
        "smallint" | "int2" | "tinyint" | "year" => HostType::Int16,
        "int" | "integer" | "int4" | "mediumint" => HostType::Int32,
        "decimal" | "numeric" | "money" | "smallmoney" | "number" => HostType::Decimal,
        "real" if driver == DriverKind::Sqlite => HostType::Float64,
        "real" | "float4" | "single" => HostType::Float32,
        "float" if driver == DriverKind::MySql => HostType::Float32,
        "float" | "float8" | "double" | "double precision" => HostType::Float64,
        "uuid" | "uniqueidentifier" | "guid" => HostType::Uuid,
        "json" | "jsonb" => HostType::Json,
        "date" => HostType::Date,
        _ if base.starts_with("datetime")
            || base.starts_with("timestamp")
            || base == "smalldatetime" =>
        {
            HostType::DateTime
        }
        _ if base.starts_with("time") => HostType::Time,
        _ if base.contains("blob")
            || base.contains("binary")
            || base == "bytea"
            || base == "image" =>
        {
            HostType::Bytes
        }
        _ if base.contains("char")
            || base.contains("text")
            || base.contains("clob")
            || matches!(base, "string" | "enum" | "set" | "xml" | "citext" | "name") =>
        {
            HostType::String
        }
        _ => return None,
    };
    Some(host)
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw MySQL DECIMAL values as strings.
/// This preserves the exact database representation when it does not fit
/// a `Decimal`.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Row Decoding
// =============================================================================

/// A result column as reported by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultColumn {
    pub name: String,
    pub type_name: String,
    pub host_type: Option<HostType>,
}

/// Trait for converting driver rows into values.
pub trait RowValues {
    fn result_columns(&self) -> Vec<ResultColumn>;

    fn value_at(&self, idx: usize, host: Option<HostType>) -> Value;

    fn to_values(&self, columns: &[ResultColumn]) -> Vec<Value> {
        columns
            .iter()
            .enumerate()
            .map(|(idx, col)| self.value_at(idx, col.host_type))
            .collect()
    }
}

fn columns_of<R: Row>(row: &R, driver: DriverKind) -> Vec<ResultColumn> {
    row.columns()
        .iter()
        .map(|col| {
            let type_name = col.type_info().name().to_string();
            ResultColumn {
                name: col.name().to_string(),
                host_type: host_type_for(&type_name, driver),
                type_name,
            }
        })
        .collect()
}

impl RowValues for MySqlRow {
    fn result_columns(&self) -> Vec<ResultColumn> {
        columns_of(self, DriverKind::MySql)
    }

    fn value_at(&self, idx: usize, host: Option<HostType>) -> Value {
        mysql::decode_column(self, idx, host)
    }
}

impl RowValues for PgRow {
    fn result_columns(&self) -> Vec<ResultColumn> {
        columns_of(self, DriverKind::Postgres)
    }

    fn value_at(&self, idx: usize, host: Option<HostType>) -> Value {
        postgres::decode_column(self, idx, host)
    }
}

impl RowValues for SqliteRow {
    fn result_columns(&self) -> Vec<ResultColumn> {
        columns_of(self, DriverKind::Sqlite)
    }

    fn value_at(&self, idx: usize, host: Option<HostType>) -> Value {
        sqlite::decode_column(self, idx, host)
    }
}

fn is_null<R: Row>(row: &R, idx: usize) -> bool
where
    usize: sqlx::ColumnIndex<R>,
{
    row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true)
}

/// Narrow a decoded integer to the requested host width when it fits.
fn narrow(v: i64, host: Option<HostType>) -> Value {
    match host {
        Some(HostType::Int16) => i16::try_from(v).map(Value::Int16).unwrap_or(Value::Int64(v)),
        Some(HostType::Int32) => i32::try_from(v).map(Value::Int32).unwrap_or(Value::Int64(v)),
        _ => Value::Int64(v),
    }
}

/// Convert a storage value into the declared host type, keeping it unchanged
/// when it does not convert.
fn coerce(value: Value, host: Option<HostType>) -> Value {
    let Some(host) = host else {
        return value;
    };
    if value.is_null() || value.host_type() == Some(host) {
        return value;
    }
    let converted = match host {
        HostType::Bool => bool::from_value(value.clone()).map(Value::Bool),
        HostType::Int16 => i16::from_value(value.clone()).map(Value::Int16),
        HostType::Int32 => i32::from_value(value.clone()).map(Value::Int32),
        HostType::Int64 => i64::from_value(value.clone()).map(Value::Int64),
        HostType::Float32 => f32::from_value(value.clone()).map(Value::Float32),
        HostType::Float64 => f64::from_value(value.clone()).map(Value::Float64),
        HostType::Decimal => Decimal::from_value(value.clone()).map(Value::Decimal),
        HostType::Uuid => Uuid::from_value(value.clone()).map(Value::Uuid),
        HostType::Date => NaiveDate::from_value(value.clone()).map(Value::Date),
        HostType::Time => NaiveTime::from_value(value.clone()).map(Value::Time),
        HostType::DateTime => NaiveDateTime::from_value(value.clone()).map(Value::DateTime),
        HostType::Json => JsonValue::from_value(value.clone()).map(Value::Json),
        HostType::String | HostType::Bytes | HostType::Other(_) => return value,
    };
    converted.unwrap_or(value)
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, host: Option<HostType>) -> Value {
        if is_null(row, idx) {
            return Value::Null;
        }
        let decoded = match host {
            Some(HostType::Bool) => row
                .try_get::<bool, _>(idx)
                .ok()
                .map(Value::Bool)
                .or_else(|| decode_integer(row, idx, None).map(|v| coerce(v, host))),
            Some(HostType::Int16 | HostType::Int32 | HostType::Int64) => {
                decode_integer(row, idx, host)
            }
            Some(HostType::Float32 | HostType::Float64) => decode_float(row, idx, host),
            Some(HostType::Decimal) => decode_decimal(row, idx),
            Some(HostType::Date) => row.try_get::<NaiveDate, _>(idx).ok().map(Value::Date),
            Some(HostType::Time) => row.try_get::<NaiveTime, _>(idx).ok().map(Value::Time),
            Some(HostType::DateTime) => row
                .try_get::<NaiveDateTime, _>(idx)
                .ok()
                .or_else(|| {
                    row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx)
                        .ok()
                        .map(|dt| dt.naive_utc())
                })
                .map(Value::DateTime),
            // MySQL JSON type should be decoded as serde_json::Value directly
            Some(HostType::Json) => row.try_get::<JsonValue, _>(idx).ok().map(Value::Json),
            Some(HostType::Uuid) => decode_text(row, idx).map(|v| coerce(v, host)),
            Some(HostType::Bytes) => row.try_get::<Vec<u8>, _>(idx).ok().map(Value::Bytes),
            _ => None,
        };
        decoded.unwrap_or_else(|| decode_fallback(row, idx))
    }

    fn decode_integer(row: &MySqlRow, idx: usize, host: Option<HostType>) -> Option<Value> {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Some(narrow(v, host));
        }
        if let Ok(v) = row.try_get::<u64, _>(idx) {
            return Some(match i64::try_from(v) {
                Ok(v) => narrow(v, host),
                Err(_) => Value::Decimal(Decimal::from(v)),
            });
        }
        None
    }

    fn decode_float(row: &MySqlRow, idx: usize, host: Option<HostType>) -> Option<Value> {
        if host == Some(HostType::Float32) {
            if let Ok(v) = row.try_get::<f32, _>(idx) {
                return Some(Value::Float32(v));
            }
        }
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Some(Value::Float64(v));
        }
        row.try_get::<f32, _>(idx).ok().map(Value::Float32)
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> Option<Value> {
        if let Ok(v) = row.try_get::<Decimal, _>(idx) {
            return Some(Value::Decimal(v));
        }
        match row.try_get::<RawDecimal, _>(idx) {
            Ok(v) => Some(Value::String(v.0)),
            Err(e) => {
                tracing::error!("Failed to decode DECIMAL: {:?}", e);
                None
            }
        }
    }

    /// MySQL may return VARBINARY instead of VARCHAR depending on charset configuration.
    fn decode_text(row: &MySqlRow, idx: usize) -> Option<Value> {
        row.try_get::<String, _>(idx).ok().map(Value::String).or_else(|| {
            row.try_get::<Vec<u8>, _>(idx)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .map(Value::String)
        })
    }

    fn decode_fallback(row: &MySqlRow, idx: usize) -> Value {
        if let Some(v) = decode_text(row, idx) {
            return v;
        }
        if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
            return Value::Bytes(v);
        }
        tracing::warn!(column = idx, "Unsupported MySQL column type, returning NULL");
        Value::Null
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, host: Option<HostType>) -> Value {
        if is_null(row, idx) {
            return Value::Null;
        }
        let decoded = match host {
            Some(HostType::Bool) => row.try_get::<bool, _>(idx).ok().map(Value::Bool),
            Some(HostType::Int16 | HostType::Int32 | HostType::Int64) => decode_integer(row, idx),
            Some(HostType::Float32 | HostType::Float64) => decode_float(row, idx),
            Some(HostType::Decimal) => match row.try_get::<Decimal, _>(idx) {
                Ok(v) => Some(Value::Decimal(v)),
                Err(e) => {
                    tracing::error!("Failed to decode NUMERIC: {:?}", e);
                    None
                }
            },
            Some(HostType::Uuid) => row.try_get::<Uuid, _>(idx).ok().map(Value::Uuid),
            Some(HostType::Date) => row.try_get::<NaiveDate, _>(idx).ok().map(Value::Date),
            Some(HostType::Time) => row.try_get::<NaiveTime, _>(idx).ok().map(Value::Time),
            Some(HostType::DateTime) => row
                .try_get::<NaiveDateTime, _>(idx)
                .ok()
                .or_else(|| {
                    row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx)
                        .ok()
                        .map(|dt| dt.naive_utc())
                })
                .map(Value::DateTime),
            Some(HostType::Json) => row.try_get::<JsonValue, _>(idx).ok().map(Value::Json),
            Some(HostType::Bytes) => row.try_get::<Vec<u8>, _>(idx).ok().map(Value::Bytes),
            _ => None,
        };
        decoded.unwrap_or_else(|| decode_fallback(row, idx))
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Option<Value> {
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Some(Value::Int16(v));
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Some(Value::Int32(v));
        }
        row.try_get::<i64, _>(idx).ok().map(Value::Int64)
    }

    fn decode_float(row: &PgRow, idx: usize) -> Option<Value> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Some(Value::Float64(v));
        }
        row.try_get::<f32, _>(idx).ok().map(Value::Float32)
    }

    fn decode_fallback(row: &PgRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Value::String(v);
        }
        if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
            return Value::Bytes(v);
        }
        tracing::warn!(column = idx, "Unsupported PostgreSQL column type, returning NULL");
        Value::Null
    }
}

mod sqlite {
    use super::*;

    /// SQLite values carry one of five storage classes regardless of the
    /// declared column type; decode the storage value, then convert it to the
    /// declared host type.
    pub fn decode_column(row: &SqliteRow, idx: usize, host: Option<HostType>) -> Value {
        let storage = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return Value::Null,
            Ok(raw) => raw.type_info().name().to_uppercase(),
            Err(_) => return Value::Null,
        };
        let value = match storage.as_str() {
            "INTEGER" | "BOOLEAN" => row.try_get::<i64, _>(idx).ok().map(Value::Int64),
            "REAL" => row.try_get::<f64, _>(idx).ok().map(Value::Float64),
            "BLOB" => row.try_get::<Vec<u8>, _>(idx).ok().map(Value::Bytes),
            _ => row.try_get::<String, _>(idx).ok().map(Value::String),
        };
        match value {
            Some(Value::Bytes(bytes)) if host == Some(HostType::Uuid) => Uuid::from_slice(&bytes)
                .map(Value::Uuid)
                .unwrap_or(Value::Bytes(bytes)),
            Some(v) => coerce(v, host),
            None => decode_fallback(row, idx),
        }
    }

    fn decode_fallback(row: &SqliteRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Value::String(v);
        }
        if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
            return Value::Bytes(v);
        }
        tracing::warn!(column = idx, "Unsupported SQLite value, returning NULL");
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_type_for_integers() {
        assert_eq!(host_type_for("INT", DriverKind::MySql), Some(HostType::Int32));
        assert_eq!(host_type_for("int(11) unsigned", DriverKind::MySql), Some(HostType::Int32));
        assert_eq!(host_type_for("BIGINT", DriverKind::Postgres), Some(HostType::Int64));
        assert_eq!(host_type_for("SERIAL", DriverKind::Postgres), Some(HostType::Int32));
        assert_eq!(host_type_for("INTEGER", DriverKind::Sqlite), Some(HostType::Int64));
        assert_eq!(host_type_for("INTEGER", DriverKind::Postgres), Some(HostType::Int32));
    }

    #[test]
    fn test_host_type_for_booleans() {
        assert_eq!(host_type_for("tinyint(1)", DriverKind::MySql), Some(HostType::Bool));
        assert_eq!(host_type_for("TINYINT", DriverKind::MySql), Some(HostType::Int16));
        assert_eq!(host_type_for("BIT", DriverKind::SqlServer), Some(HostType::Bool));
        assert_eq!(host_type_for("boolean", DriverKind::Sqlite), Some(HostType::Bool));
    }

    #[test]
    fn test_host_type_for_text_and_binary() {
        assert_eq!(host_type_for("NVARCHAR(100)", DriverKind::SqlServer), Some(HostType::String));
        assert_eq!(
            host_type_for("character varying", DriverKind::Postgres),
            Some(HostType::String)
        );
        assert_eq!(host_type_for("VARBINARY(4000)", DriverKind::MySql), Some(HostType::Bytes));
        assert_eq!(host_type_for("bytea", DriverKind::Postgres), Some(HostType::Bytes));
        assert_eq!(host_type_for("geometry", DriverKind::MySql), None);
    }

    #[test]
    fn test_host_type_for_temporal() {
        assert_eq!(host_type_for("DATETIME2", DriverKind::SqlServer), Some(HostType::DateTime));
        assert_eq!(
            host_type_for("timestamp with time zone", DriverKind::Postgres),
            Some(HostType::DateTime)
        );
        assert_eq!(host_type_for("TIME", DriverKind::MySql), Some(HostType::Time));
        assert_eq!(host_type_for("date", DriverKind::Sqlite), Some(HostType::Date));
    }

    #[test]
    fn test_host_type_for_decimal_and_uuid() {
        assert_eq!(host_type_for("DECIMAL(18,4)", DriverKind::MySql), Some(HostType::Decimal));
        assert_eq!(host_type_for("NUMERIC", DriverKind::Sqlite), Some(HostType::Decimal));
        assert_eq!(host_type_for("char(36)", DriverKind::MySql), Some(HostType::Uuid));
        assert_eq!(host_type_for("char(36)", DriverKind::Postgres), Some(HostType::String));
        assert_eq!(
            host_type_for("UNIQUEIDENTIFIER", DriverKind::SqlServer),
            Some(HostType::Uuid)
        );
    }

    #[test]
    fn test_provider_type_defaults() {
        let mapper = SqlServerTypeMapper;
        let text = mapper
            .provider_type(PropertyType::nullable(HostType::String))
            .unwrap();
        assert_eq!(mapper.declaration(&text), "NVARCHAR(512)");

        let bytes = mapper
            .provider_type(PropertyType::required(HostType::Bytes))
            .unwrap();
        assert_eq!(bytes.size, Some(DEFAULT_BINARY_LENGTH));

        let decimal = mapper
            .provider_type(PropertyType::required(HostType::Decimal))
            .unwrap();
        assert_eq!(mapper.declaration(&decimal), "DECIMAL(18,4)");

        assert!(
            mapper
                .provider_type(PropertyType::required(HostType::Other("Address")))
                .is_none()
        );
    }

    #[test]
    fn test_sqlite_declarations_omit_lengths() {
        let mapper = SqliteTypeMapper;
        let text = mapper
            .provider_type(PropertyType::required(HostType::String))
            .unwrap();
        assert_eq!(mapper.declaration(&text), "TEXT");
        assert_eq!(text.size, Some(DEFAULT_TEXT_LENGTH));
    }

    #[test]
    fn test_every_mapper_round_trips_categories() {
        let mappers: [&dyn TypeMapper; 4] = [
            &SqlServerTypeMapper,
            &MySqlTypeMapper,
            &PostgresTypeMapper,
            &SqliteTypeMapper,
        ];
        let hosts = [
            HostType::Bool,
            HostType::Int64,
            HostType::Float64,
            HostType::Decimal,
            HostType::String,
            HostType::Bytes,
            HostType::Uuid,
            HostType::Date,
            HostType::DateTime,
        ];
        for mapper in mappers {
            for host in hosts {
                let provider = mapper.provider_type(PropertyType::required(host)).unwrap();
                let back = mapper.host_type(&mapper.declaration(&provider));
                assert_eq!(back, Some(host), "{:?} via {:?}", host, mapper);
            }
        }
    }

    #[test]
    fn test_coerce_keeps_unconvertible_values() {
        assert_eq!(
            coerce(Value::Int64(1), Some(HostType::Bool)),
            Value::Bool(true)
        );
        assert_eq!(
            coerce(Value::String("abc".into()), Some(HostType::Int32)),
            Value::String("abc".into())
        );
        assert_eq!(coerce(Value::Int64(5), None), Value::Int64(5));
        assert_eq!(
            coerce(Value::Float64(4.0), Some(HostType::Int64)),
            Value::Int64(4)
        );
        // Out of range stays a float so materializing it into i64 fails
        assert_eq!(
            coerce(Value::Float64(1e30), Some(HostType::Int64)),
            Value::Float64(1e30)
        );
    }
}
