//! Command parameters.
//!
//! This module finds, defines and sets named command parameters, and binds
//! them to database-specific sqlx queries at execution time. Provider types
//! come from the dialect's type mapper; unmapped values fall back to text.

use crate::db::dialect::DialectProvider;
use crate::error::{DbError, DbResult};
use crate::models::{ColumnSchema, DbType, HostType, PropertyType, ProviderType, Value};
use crate::record::PropertySource;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres, Sqlite};
use tracing::{debug, warn};

/// Direction of a command parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl ParameterDirection {
    /// Whether a value is sent to the server for this parameter.
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Input | Self::InputOutput)
    }
}

/// A named command parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Prefixed name as it appears in command text, e.g. `@UserId`
    pub name: String,
    bare_name: String,
    pub value: Value,
    pub db_type: DbType,
    pub provider_type_name: &'static str,
    pub size: Option<u32>,
    pub precision: Option<u8>,
    pub scale: Option<u8>,
    pub nullable: bool,
    pub direction: ParameterDirection,
}

impl Parameter {
    fn new(dialect: &dyn DialectProvider, bare_name: String, provider: ProviderType) -> Self {
        Self {
            name: dialect.quote_parameter(&bare_name),
            bare_name,
            value: Value::Null,
            db_type: provider.db_type,
            provider_type_name: provider.name,
            size: provider.size,
            precision: provider.precision,
            scale: provider.scale,
            nullable: true,
            direction: ParameterDirection::Input,
        }
    }

    /// Name without the dialect's parameter prefix.
    pub fn bare_name(&self) -> &str {
        &self.bare_name
    }
}

/// Ordered parameters of a command. Lookup ignores case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterCollection {
    items: Vec<Parameter>,
}

impl ParameterCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a parameter by its bare name.
    pub fn get(&self, bare_name: &str) -> Option<&Parameter> {
        self.items
            .iter()
            .find(|p| p.bare_name.eq_ignore_ascii_case(bare_name))
    }

    pub fn get_mut(&mut self, bare_name: &str) -> Option<&mut Parameter> {
        self.items
            .iter_mut()
            .find(|p| p.bare_name.eq_ignore_ascii_case(bare_name))
    }

    pub fn push(&mut self, parameter: Parameter) {
        self.items.push(parameter);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Something that carries command text and parameters.
pub trait ParameterTarget {
    fn dialect(&self) -> &dyn DialectProvider;

    /// Current command text; `None` while no text has been written.
    fn command_text(&self) -> Option<&str>;

    fn parameters(&self) -> &ParameterCollection;

    fn parameters_mut(&mut self) -> &mut ParameterCollection;
}

/// Parameter name for a column or property name: characters that cannot
/// appear in a parameter name are replaced with `_`.
pub fn parameter_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn bare_name_of(dialect: &dyn DialectProvider, name: &str) -> DbResult<String> {
    let bare = parameter_name(&dialect.unquote_parameter(name));
    if bare.is_empty() {
        return Err(DbError::invalid_argument("parameter name cannot be empty"));
    }
    Ok(bare)
}

/// Set a parameter value, creating the parameter if it does not exist.
///
/// New parameters take their provider type from `host_type`, or from the
/// value itself. Values with no mapping are sent as text.
pub fn set_parameter<T: ParameterTarget + ?Sized>(
    target: &mut T,
    name: &str,
    value: impl Into<Value>,
    host_type: Option<HostType>,
    size: Option<u32>,
) -> DbResult<()> {
    let bare = bare_name_of(target.dialect(), name)?;
    let value = value.into();

    if let Some(existing) = target.parameters_mut().get_mut(&bare) {
        existing.value = value;
        if size.is_some() {
            existing.size = size;
        }
        return Ok(());
    }

    let dialect = target.dialect();
    let host = host_type.or_else(|| value.host_type()).unwrap_or(HostType::String);
    let mapper = dialect.type_mapper();
    let (provider, value) = match mapper.provider_type(PropertyType::nullable(host)) {
        Some(provider) => (provider, value),
        None => {
            warn!(
                parameter = %bare,
                host_type = %host.rust_name(),
                "No provider type mapping, sending parameter as text"
            );
            let text_type = mapper
                .provider_type(PropertyType::nullable(HostType::String))
                .ok_or_else(|| DbError::internal("dialect has no textual type"))?;
            let value = if value.is_null() {
                Value::Null
            } else {
                Value::String(value.to_text())
            };
            (text_type, value)
        }
    };

    let mut parameter = Parameter::new(dialect, bare, provider);
    parameter.value = value;
    if size.is_some() {
        parameter.size = size;
    }
    target.parameters_mut().push(parameter);
    Ok(())
}

/// Bind every scalar property of `source` as a parameter.
///
/// When the target already has command text, only properties whose
/// parameter name appears in the text are bound. Returns the number of
/// parameters set.
pub fn set_parameters_from_object<T: ParameterTarget + ?Sized>(
    target: &mut T,
    source: &dyn PropertySource,
) -> DbResult<usize> {
    let text = target.command_text().map(str::to_owned);
    let mut bound = 0;

    for property in source.property_values() {
        if DbType::for_host(property.ty.host).is_none() {
            continue;
        }
        if let Some(text) = &text {
            let quoted = target
                .dialect()
                .quote_parameter(&parameter_name(&property.name));
            if !contains_parameter(text, &quoted) {
                continue;
            }
        }
        set_parameter(
            target,
            &property.name,
            property.value,
            Some(property.ty.host),
            None,
        )?;
        bound += 1;
    }

    debug!(bound = bound, "Parameters bound from object");
    Ok(bound)
}

/// Pre-declare a parameter's shape from a column, without a value.
///
/// An existing parameter keeps its value and takes the column's shape.
pub fn define_parameter<T: ParameterTarget + ?Sized>(
    target: &mut T,
    column: &ColumnSchema,
    direction: ParameterDirection,
) -> DbResult<()> {
    let bare = bare_name_of(target.dialect(), column.name())?;
    let dialect = target.dialect();
    let mapper = dialect.type_mapper();
    let provider = mapper
        .provider_type(PropertyType::nullable(column.data_type()))
        .or_else(|| mapper.provider_type(PropertyType::nullable(HostType::String)))
        .ok_or_else(|| DbError::internal("dialect has no textual type"))?;

    let mut parameter = Parameter::new(dialect, bare, provider);
    if column.max_length().is_some() {
        parameter.size = column.max_length();
    }
    if column.precision().is_some() {
        parameter.precision = column.precision();
        parameter.scale = column.scale();
    }
    parameter.nullable = column.allows_null();
    parameter.direction = direction;

    let parameters = target.parameters_mut();
    match parameters.get_mut(&parameter.bare_name) {
        Some(existing) => {
            parameter.value = std::mem::take(&mut existing.value);
            *existing = parameter;
        }
        None => parameters.push(parameter),
    }
    Ok(())
}

/// Whether `quoted` appears in `text` as a whole parameter reference.
pub fn contains_parameter(text: &str, quoted: &str) -> bool {
    let haystack = text.to_ascii_lowercase();
    let needle = quoted.to_ascii_lowercase();
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(&needle).any(|(pos, _)| {
        haystack[pos + needle.len()..]
            .chars()
            .next()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_'))
    })
}

// =============================================================================
// Driver binding
// =============================================================================

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &Parameter,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match &param.value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int16(v) => query.bind(*v),
        Value::Int32(v) => query.bind(*v),
        Value::Int64(v) => query.bind(*v),
        Value::Float32(v) => query.bind(*v),
        Value::Float64(v) => query.bind(*v),
        Value::Decimal(v) => query.bind(*v),
        Value::String(v) => query.bind(v.clone()),
        Value::Bytes(v) => query.bind(v.clone()),
        // Stored as CHAR(36)
        Value::Uuid(v) => query.bind(v.to_string()),
        Value::Date(v) => query.bind(*v),
        Value::Time(v) => query.bind(*v),
        Value::DateTime(v) => query.bind(*v),
        Value::Json(v) => query.bind(Json(v.clone())),
    }
}

/// Bind a parameter to a PostgreSQL query.
///
/// Nulls are typed after the parameter's declared type, since PostgreSQL
/// does not coerce a text-typed null into other column types.
pub(crate) fn bind_postgres<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &Parameter,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match &param.value {
        Value::Null => bind_postgres_null(query, param.db_type),
        Value::Bool(v) => query.bind(*v),
        Value::Int16(v) => query.bind(*v),
        Value::Int32(v) => query.bind(*v),
        Value::Int64(v) => query.bind(*v),
        Value::Float32(v) => query.bind(*v),
        Value::Float64(v) => query.bind(*v),
        Value::Decimal(v) => query.bind(*v),
        Value::String(v) => query.bind(v.clone()),
        Value::Bytes(v) => query.bind(v.clone()),
        Value::Uuid(v) => query.bind(*v),
        Value::Date(v) => query.bind(*v),
        Value::Time(v) => query.bind(*v),
        Value::DateTime(v) => query.bind(*v),
        Value::Json(v) => query.bind(Json(v.clone())),
    }
}

fn bind_postgres_null<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    db_type: DbType,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match db_type {
        DbType::Boolean => query.bind(None::<bool>),
        DbType::Int16 => query.bind(None::<i16>),
        DbType::Int32 => query.bind(None::<i32>),
        DbType::Int64 => query.bind(None::<i64>),
        DbType::Single => query.bind(None::<f32>),
        DbType::Double => query.bind(None::<f64>),
        DbType::Decimal => query.bind(None::<rust_decimal::Decimal>),
        DbType::String => query.bind(None::<String>),
        DbType::Binary => query.bind(None::<Vec<u8>>),
        DbType::Guid => query.bind(None::<uuid::Uuid>),
        DbType::Date => query.bind(None::<chrono::NaiveDate>),
        DbType::Time => query.bind(None::<chrono::NaiveTime>),
        DbType::DateTime => query.bind(None::<chrono::NaiveDateTime>),
        DbType::Json => query.bind(None::<Json<serde_json::Value>>),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &Parameter,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match &param.value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int16(v) => query.bind(*v),
        Value::Int32(v) => query.bind(*v),
        Value::Int64(v) => query.bind(*v),
        Value::Float32(v) => query.bind(*v),
        Value::Float64(v) => query.bind(*v),
        // SQLite has no decimal type, store the exact text
        Value::Decimal(v) => query.bind(v.to_string()),
        Value::String(v) => query.bind(v.clone()),
        Value::Bytes(v) => query.bind(v.clone()),
        Value::Uuid(v) => query.bind(v.to_string()),
        Value::Date(v) => query.bind(*v),
        Value::Time(v) => query.bind(*v),
        Value::DateTime(v) => query.bind(*v),
        // SQLite doesn't have native JSON type, store as string
        Value::Json(v) => query.bind(v.to_string()),
    }
}
