//! Schema-related data models.
//!
//! `ColumnSchema` and `TableSchema` describe a relational table, either
//! inferred from a record type or loaded from a live catalog. Both are
//! immutable once built and are shared through `Arc` by the schema cache.

use crate::error::{DbError, DbResult};
use crate::models::value::HostType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Database-neutral type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbType {
    Boolean,
    Int16,
    Int32,
    Int64,
    Single,
    Double,
    Decimal,
    String,
    Binary,
    Guid,
    Date,
    Time,
    DateTime,
    Json,
}

impl DbType {
    /// The neutral code for a host type. `None` for types with no scalar mapping.
    pub fn for_host(host: HostType) -> Option<Self> {
        let db_type = match host {
            HostType::Bool => Self::Boolean,
            HostType::Int16 => Self::Int16,
            HostType::Int32 => Self::Int32,
            HostType::Int64 => Self::Int64,
            HostType::Float32 => Self::Single,
            HostType::Float64 => Self::Double,
            HostType::Decimal => Self::Decimal,
            HostType::String => Self::String,
            HostType::Bytes => Self::Binary,
            HostType::Uuid => Self::Guid,
            HostType::Date => Self::Date,
            HostType::Time => Self::Time,
            HostType::DateTime => Self::DateTime,
            HostType::Json => Self::Json,
            HostType::Other(_) => return None,
        };
        Some(db_type)
    }

    pub fn host_type(&self) -> HostType {
        match self {
            Self::Boolean => HostType::Bool,
            Self::Int16 => HostType::Int16,
            Self::Int32 => HostType::Int32,
            Self::Int64 => HostType::Int64,
            Self::Single => HostType::Float32,
            Self::Double => HostType::Float64,
            Self::Decimal => HostType::Decimal,
            Self::String => HostType::String,
            Self::Binary => HostType::Bytes,
            Self::Guid => HostType::Uuid,
            Self::Date => HostType::Date,
            Self::Time => HostType::Time,
            Self::DateTime => HostType::DateTime,
            Self::Json => HostType::Json,
        }
    }
}

/// A provider-specific column type with its size facets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderType {
    pub db_type: DbType,
    /// Base type name, e.g. "NVARCHAR" or "BIGINT"
    pub name: &'static str,
    pub size: Option<u32>,
    pub precision: Option<u8>,
    pub scale: Option<u8>,
}

impl ProviderType {
    pub fn new(db_type: DbType, name: &'static str) -> Self {
        Self {
            db_type,
            name,
            size: None,
            precision: None,
            scale: None,
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_precision(mut self, precision: u8, scale: u8) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    /// Type declaration as used in DDL, e.g. `VARCHAR(512)` or `DECIMAL(18,4)`.
    pub fn declaration(&self) -> String {
        match (self.size, self.precision, self.scale) {
            (Some(size), _, _) => format!("{}({})", self.name, size),
            (None, Some(p), Some(s)) => format!("{}({},{})", self.name, p, s),
            (None, Some(p), None) => format!("{}({})", self.name, p),
            _ => self.name.to_string(),
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.declaration())
    }
}

/// Descriptor of a single column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSchema {
    name: String,
    /// Zero-based position
    ordinal: usize,
    data_type: HostType,
    provider_type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    precision: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scale: Option<u8>,
    allows_null: bool,
    is_key: bool,
    is_auto_increment: bool,
    is_read_only: bool,
    is_unique: bool,
}

impl ColumnSchema {
    /// Create a new column descriptor.
    pub fn new(
        name: impl Into<String>,
        ordinal: usize,
        data_type: HostType,
        provider_type_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            ordinal,
            data_type,
            provider_type_name: provider_type_name.into(),
            max_length: None,
            precision: None,
            scale: None,
            allows_null: true,
            is_key: false,
            is_auto_increment: false,
            is_read_only: false,
            is_unique: false,
        }
    }

    pub fn with_max_length(mut self, max_length: Option<u32>) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_precision(mut self, precision: Option<u8>, scale: Option<u8>) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    pub fn with_nullable(mut self, allows_null: bool) -> Self {
        self.allows_null = allows_null;
        self
    }

    /// Mark the column as part of the table key.
    pub fn with_key(mut self, is_key: bool) -> Self {
        self.is_key = is_key;
        self
    }

    /// Mark the column as engine-assigned. Identity columns are read-only.
    pub fn with_auto_increment(mut self, is_auto_increment: bool) -> Self {
        self.is_auto_increment = is_auto_increment;
        if is_auto_increment {
            self.is_read_only = true;
        }
        self
    }

    pub fn with_read_only(mut self, is_read_only: bool) -> Self {
        self.is_read_only = is_read_only || self.is_auto_increment;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn data_type(&self) -> HostType {
        self.data_type
    }

    pub fn provider_type_name(&self) -> &str {
        &self.provider_type_name
    }

    pub fn max_length(&self) -> Option<u32> {
        self.max_length
    }

    pub fn precision(&self) -> Option<u8> {
        self.precision
    }

    pub fn scale(&self) -> Option<u8> {
        self.scale
    }

    pub fn allows_null(&self) -> bool {
        self.allows_null
    }

    pub fn is_key(&self) -> bool {
        self.is_key
    }

    pub fn is_auto_increment(&self) -> bool {
        self.is_auto_increment
    }

    pub fn is_read_only(&self) -> bool {
        self.is_read_only
    }

    /// True for a sole key-and-identity column.
    pub fn is_unique(&self) -> bool {
        self.is_unique
    }

    /// Whether an INSERT supplies a value for this column.
    pub fn is_insertable(&self) -> bool {
        !self.is_auto_increment && !self.is_read_only
    }
}

/// Descriptor of a table: its name, namespace and ordered columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    database_name: String,
    table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema_name: Option<String>,
    columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Build a table schema.
    ///
    /// Columns are ordered by ordinal. Fails with a configuration error when
    /// `columns` is empty and with an invalid argument error when two columns
    /// share a name (case-insensitively).
    pub fn new(
        database_name: impl Into<String>,
        table_name: impl Into<String>,
        schema_name: Option<String>,
        mut columns: Vec<ColumnSchema>,
    ) -> DbResult<Self> {
        let table_name = table_name.into();
        if table_name.trim().is_empty() {
            return Err(DbError::invalid_argument("table name cannot be empty"));
        }
        if columns.is_empty() {
            return Err(DbError::configuration(format!(
                "table '{}' has no mappable columns",
                table_name
            )));
        }

        columns.sort_by_key(|c| c.ordinal);

        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.name.to_lowercase()) {
                return Err(DbError::invalid_argument(format!(
                    "duplicate column '{}' in table '{}'",
                    column.name, table_name
                )));
            }
        }

        let identity_keys: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_key && c.is_auto_increment)
            .map(|(i, _)| i)
            .collect();
        if let [only] = identity_keys.as_slice() {
            columns[*only].is_unique = true;
        }

        Ok(Self {
            database_name: database_name.into(),
            table_name,
            schema_name: schema_name.filter(|s| !s.is_empty()),
            columns,
        })
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn schema_name(&self) -> Option<&str> {
        self.schema_name.as_deref()
    }

    /// Get the qualified table name (schema.table or just table).
    pub fn qualified_name(&self) -> String {
        match &self.schema_name {
            Some(schema) => format!("{}.{}", schema, self.table_name),
            None => self.table_name.clone(),
        }
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    /// Find a column by name, ignoring case.
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn key_columns(&self) -> Vec<&ColumnSchema> {
        self.columns.iter().filter(|c| c.is_key).collect()
    }

    pub fn identity_column(&self) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.is_auto_increment)
    }

    /// Columns an INSERT supplies values for: neither identity nor read-only.
    pub fn insertable_columns(&self) -> Vec<&ColumnSchema> {
        self.columns.iter().filter(|c| c.is_insertable()).collect()
    }
}
