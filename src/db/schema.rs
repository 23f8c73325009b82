//! Table schema resolution and caching.
//!
//! A [`TableSchema`] is obtained either by inference from a [`Record`] type or
//! by loading a live table's catalog metadata. Both paths go through the
//! process-wide [`SchemaCache`], so each (source, provider, connection,
//! table, schema) key is resolved once.
//!
//! # Architecture
//!
//! Catalog queries are organized in the `queries` submodule with constants for
//! each database type. Database-specific loaders are in their respective
//! submodules (postgres, mysql, sqlite), each providing the same interface.

use crate::db::dialect::{DialectProvider, SqlServerDialect};
use crate::db::pool::{Connection, DbPool};
use crate::error::{DbError, DbResult};
use crate::models::{ColumnSchema, HostType, TableSchema};
use crate::record::{PropertyInfo, Record};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum SchemaSource {
    Inferred(TypeId),
    Catalog,
}

/// Cache key. The signature holds the connection string, so keys are never
/// logged.
#[derive(Clone, PartialEq, Eq, Hash)]
struct SchemaCacheKey {
    source: SchemaSource,
    provider: &'static str,
    signature: String,
    table: String,
    schema: Option<String>,
}

impl SchemaCacheKey {
    fn new(
        source: SchemaSource,
        provider: &'static str,
        signature: &str,
        table: &str,
        schema: Option<&str>,
    ) -> Self {
        Self {
            source,
            provider,
            signature: signature.to_string(),
            table: table.trim().to_lowercase(),
            schema: schema
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty()),
        }
    }
}

type SchemaCell = Arc<OnceCell<Arc<TableSchema>>>;

static GLOBAL_SCHEMAS: LazyLock<SchemaCache> = LazyLock::new(SchemaCache::new);

/// Cache of resolved table schemas.
///
/// Entries are never evicted automatically; a schema change on the live
/// database needs [`invalidate_table`](Self::invalidate_table) or
/// [`clear`](Self::clear). Failed loads are not cached.
#[derive(Default)]
pub struct SchemaCache {
    entries: Mutex<HashMap<SchemaCacheKey, SchemaCell>>,
    catalog_loads: AtomicUsize,
}

impl fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaCache")
            .field("len", &self.len())
            .field("catalog_loads", &self.catalog_loads())
            .finish()
    }
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide cache.
    pub fn global() -> &'static SchemaCache {
        &GLOBAL_SCHEMAS
    }

    /// Infer the schema of `T`.
    ///
    /// Provider type names come from the connection's dialect, or from the
    /// SQL Server dialect when no connection is given. The table name
    /// defaults to the type's table annotation, then to its type name.
    pub fn infer<T: Record>(
        &self,
        connection: Option<&Connection>,
        table: Option<&str>,
        schema: Option<&str>,
    ) -> DbResult<Arc<TableSchema>> {
        let table = table
            .filter(|t| !t.trim().is_empty())
            .or(T::table().table)
            .unwrap_or(T::type_name());
        let schema = schema.or(T::table().schema);

        let fallback;
        let (dialect, signature, database): (&dyn DialectProvider, &str, &str) = match connection
        {
            Some(conn) => (conn.dialect().as_ref(), conn.signature(), conn.database_name()),
            None => {
                fallback = SqlServerDialect::default();
                (&fallback, "", "")
            }
        };

        let key = SchemaCacheKey::new(
            SchemaSource::Inferred(TypeId::of::<T>()),
            dialect.name(),
            signature,
            table,
            schema,
        );

        // Inference does no I/O, so it runs under the lock.
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = entries.get(&key).and_then(|cell| cell.get()) {
            debug!(record = T::type_name(), table = %table, "Schema cache hit");
            return Ok(cached.clone());
        }

        debug!(record = T::type_name(), table = %table, "Inferring schema");
        let inferred = Arc::new(infer_schema::<T>(dialect, database, table, schema)?);
        entries.insert(key, Arc::new(OnceCell::from(inferred.clone())));
        Ok(inferred)
    }

    /// Load a live table's schema from the connection's catalog.
    ///
    /// Concurrent first loads of the same key share one catalog round-trip.
    pub async fn load(
        &self,
        connection: &Connection,
        table: &str,
        schema: Option<&str>,
        cancel: &CancellationToken,
    ) -> DbResult<Arc<TableSchema>> {
        if table.trim().is_empty() {
            return Err(DbError::invalid_argument("table name cannot be empty"));
        }
        if cancel.is_cancelled() {
            return Err(DbError::cancelled("schema load"));
        }

        let key = SchemaCacheKey::new(
            SchemaSource::Catalog,
            connection.dialect().name(),
            connection.signature(),
            table,
            schema,
        );
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.entry(key.clone()).or_default().clone()
        };

        if let Some(cached) = cell.get() {
            debug!(table = %table, "Schema cache hit");
            return Ok(cached.clone());
        }

        let loaded = cell
            .get_or_try_init(|| async {
                debug!(table = %table, driver = %connection.driver(), "Loading catalog schema");
                self.catalog_loads.fetch_add(1, Ordering::Relaxed);
                tokio::select! {
                    _ = cancel.cancelled() => Err(DbError::cancelled("schema load")),
                    result = load_catalog(connection, table, schema) => result.map(Arc::new),
                }
            })
            .await;
        match loaded {
            Ok(schema) => Ok(schema.clone()),
            Err(e) => {
                self.discard_pending(&key, &cell);
                Err(e)
            }
        }
    }

    /// Remove `cell` from the map if it is still the unresolved entry for
    /// `key`. A concurrent loader may have replaced or resolved it.
    fn discard_pending(&self, key: &SchemaCacheKey, cell: &SchemaCell) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, cell) && !current.initialized())
        {
            entries.remove(key);
        }
    }

    /// Number of catalog round-trips started by [`load`](Self::load).
    pub fn catalog_loads(&self) -> usize {
        self.catalog_loads.load(Ordering::Relaxed)
    }

    /// Drop every inferred schema of `T`. Returns whether any was cached.
    pub fn invalidate<T: Record>(&self) -> bool {
        let source = SchemaSource::Inferred(TypeId::of::<T>());
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|key, _| key.source != source);
        entries.len() != before
    }

    /// Drop the cached catalog schema of a table. Returns whether one was
    /// cached.
    pub fn invalidate_table(
        &self,
        connection: &Connection,
        table: &str,
        schema: Option<&str>,
    ) -> bool {
        let key = SchemaCacheKey::new(
            SchemaSource::Catalog,
            connection.dialect().name(),
            connection.signature(),
            table,
            schema,
        );
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key)
            .is_some_and(|cell| cell.initialized())
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of resolved schemas.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Inference
// =============================================================================

fn infer_schema<T: Record>(
    dialect: &dyn DialectProvider,
    database: &str,
    table: &str,
    schema: Option<&str>,
) -> DbResult<TableSchema> {
    let mapper = dialect.type_mapper();

    let properties: Vec<&'static PropertyInfo> = T::properties()
        .iter()
        .filter(|p| p.readable && !p.ignored && !p.is_nested())
        .filter(|p| mapper.provider_type(p.ty).is_some())
        .collect();

    let mut columns: Vec<ColumnSchema> = Vec::with_capacity(properties.len());
    for (ordinal, property) in properties.iter().enumerate() {
        let Some(mut provider) = mapper.provider_type(property.ty) else {
            continue;
        };
        if let Some(len) = property.max_length {
            provider.size = Some(len);
        }
        if let Some((precision, scale)) = property.precision {
            provider.precision = Some(precision);
            provider.scale = Some(scale);
        }

        let column = ColumnSchema::new(
            property.column_name(),
            ordinal,
            property.ty.host,
            mapper.declaration(&provider),
        )
        .with_max_length(property.max_length)
        .with_precision(
            property.precision.map(|(p, _)| p),
            property.precision.map(|(_, s)| s),
        )
        .with_nullable(property.ty.nullable)
        .with_key(property.key)
        .with_auto_increment(property.identity)
        .with_read_only(property.read_only || !property.writable);
        columns.push(column);
    }

    let annotated = properties.iter().any(|p| p.key || p.identity);
    if !annotated {
        if let Some(index) = infer_identity(&columns) {
            let column = columns.remove(index);
            columns.insert(index, column.with_key(true).with_auto_increment(true));
        }
    }

    TableSchema::new(database, table, schema.map(str::to_string), columns)
}

/// Pick the identity column by naming convention.
///
/// Candidates are non-nullable numeric columns whose name ends in "id"
/// (case-insensitively). A read-only candidate wins; otherwise the lowest
/// ordinal does. This is a best-effort guess: nothing checks that the chosen
/// column is actually unique, and a type with several `*Id` columns may get
/// the wrong one. Annotate the key explicitly when it matters.
fn infer_identity(columns: &[ColumnSchema]) -> Option<usize> {
    let candidates: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, c)| {
            c.name().to_lowercase().ends_with("id")
                && !c.allows_null()
                && c.data_type().is_numeric()
        })
        .map(|(i, _)| i)
        .collect();

    candidates
        .iter()
        .copied()
        .find(|&i| columns[i].is_read_only())
        .or_else(|| {
            candidates
                .iter()
                .copied()
                .min_by(|&a, &b| {
                    columns[a]
                        .ordinal()
                        .cmp(&columns[b].ordinal())
                        .then_with(|| columns[a].name().cmp(columns[b].name()))
                })
        })
}

// =============================================================================
// Live catalog
// =============================================================================

/// A column as reported by a catalog query, before type mapping.
#[derive(Debug, Clone)]
struct CatalogColumn {
    name: String,
    type_name: String,
    nullable: bool,
    is_key: bool,
    is_auto_increment: bool,
    max_length: Option<u32>,
    precision: Option<u8>,
    scale: Option<u8>,
}

async fn load_catalog(
    connection: &Connection,
    table: &str,
    schema: Option<&str>,
) -> DbResult<TableSchema> {
    let (database, columns) = match connection.pool() {
        DbPool::Postgres(p) => (
            connection.database_name().to_string(),
            postgres::fetch_columns(p, table, schema).await?,
        ),
        DbPool::MySql(p) => (
            connection.database_name().to_string(),
            mysql::fetch_columns(p, table, schema).await?,
        ),
        DbPool::SQLite(p) => ("main".to_string(), sqlite::fetch_columns(p, table).await?),
    };

    if columns.is_empty() {
        return Err(DbError::configuration(format!(
            "Table '{}' not found or has no columns",
            table
        )));
    }

    let mapper = connection.dialect().type_mapper();
    let columns = columns
        .into_iter()
        .enumerate()
        .map(|(ordinal, c)| {
            let host = mapper.host_type(&c.type_name).unwrap_or_else(|| {
                debug!(column = %c.name, type_name = %c.type_name, "Unmapped catalog type, using String");
                HostType::String
            });
            let sized = matches!(host, HostType::String | HostType::Bytes);
            let decimal = host == HostType::Decimal;
            ColumnSchema::new(c.name, ordinal, host, c.type_name)
                .with_max_length(c.max_length.filter(|_| sized))
                .with_precision(
                    c.precision.filter(|_| decimal),
                    c.scale.filter(|_| decimal),
                )
                .with_nullable(c.nullable && !c.is_key)
                .with_key(c.is_key)
                .with_auto_increment(c.is_auto_increment)
        })
        .collect();

    TableSchema::new(database, table, schema.map(str::to_string), columns)
}

/// Length, precision and scale from a declared type such as `VARCHAR(50)` or
/// `DECIMAL(10, 2)`.
fn declared_size(type_name: &str) -> (Option<u32>, Option<u8>, Option<u8>) {
    let Some(args) = type_name
        .split_once('(')
        .and_then(|(_, rest)| rest.split_once(')'))
        .map(|(args, _)| args)
    else {
        return (None, None, None);
    };
    let mut parts = args.split(',').map(|p| p.trim());
    let first = parts.next().and_then(|p| p.parse::<u32>().ok());
    let second = parts.next().and_then(|p| p.parse::<u8>().ok());
    match second {
        Some(scale) => (None, first.and_then(|p| u8::try_from(p).ok()), Some(scale)),
        None => (first, first.and_then(|p| u8::try_from(p).ok()), None),
    }
}

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod postgres {
        pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            c.column_name::text AS column_name,
            format_type(a.atttypid, a.atttypmod) AS column_type,
            c.is_nullable::text AS is_nullable,
            c.column_default::text AS column_default,
            c.is_identity::text AS is_identity,
            c.character_maximum_length::int4 AS max_length,
            c.numeric_precision::int4 AS numeric_precision,
            c.numeric_scale::int4 AS numeric_scale,
            CASE WHEN pk.column_name IS NOT NULL THEN true ELSE false END AS is_primary_key
        FROM information_schema.columns c
        JOIN pg_class t ON t.relname = c.table_name
        JOIN pg_namespace n ON n.oid = t.relnamespace AND n.nspname = c.table_schema
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attname = c.column_name
        LEFT JOIN (
            SELECT kcu.column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            WHERE tc.table_name = $1
            AND tc.table_schema = $2
            AND tc.constraint_type = 'PRIMARY KEY'
        ) pk ON c.column_name = pk.column_name
        WHERE c.table_name = $1 AND c.table_schema = $2
        ORDER BY c.ordinal_position
        "#;
    }

    pub mod mysql {
        pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
            CONVERT(COLUMN_TYPE USING utf8) AS COLUMN_TYPE,
            CONVERT(IS_NULLABLE USING utf8) AS IS_NULLABLE,
            CONVERT(COLUMN_KEY USING utf8) AS COLUMN_KEY,
            CONVERT(EXTRA USING utf8) AS EXTRA,
            CHARACTER_MAXIMUM_LENGTH,
            NUMERIC_PRECISION,
            NUMERIC_SCALE
        FROM information_schema.columns
        WHERE TABLE_NAME = ? AND TABLE_SCHEMA = COALESCE(?, DATABASE())
        ORDER BY ORDINAL_POSITION
        "#;
    }
}

// =============================================================================
// PostgreSQL Implementation
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::{PgPool, Row};

    pub async fn fetch_columns(
        pool: &PgPool,
        table_name: &str,
        schema: Option<&str>,
    ) -> DbResult<Vec<CatalogColumn>> {
        let schema_name = schema.unwrap_or("public");
        let rows = sqlx::query(queries::postgres::DESCRIBE_COLUMNS)
            .bind(table_name)
            .bind(schema_name)
            .fetch_all(pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let default_value: Option<String> = row.try_get("column_default").ok().flatten();
                let is_identity: Option<String> = row.try_get("is_identity").ok().flatten();
                let nullable: String = row.try_get("is_nullable").unwrap_or_default();
                let serial = default_value
                    .as_deref()
                    .is_some_and(|d| d.starts_with("nextval("));

                CatalogColumn {
                    name: row.try_get("column_name").unwrap_or_default(),
                    type_name: row.try_get("column_type").unwrap_or_default(),
                    nullable: nullable == "YES",
                    is_key: row.try_get("is_primary_key").unwrap_or(false),
                    is_auto_increment: serial || is_identity.as_deref() == Some("YES"),
                    max_length: int_column(row, "max_length").and_then(|v| u32::try_from(v).ok()),
                    precision: int_column(row, "numeric_precision")
                        .and_then(|v| u8::try_from(v).ok()),
                    scale: int_column(row, "numeric_scale").and_then(|v| u8::try_from(v).ok()),
                }
            })
            .collect())
    }

    fn int_column(row: &sqlx::postgres::PgRow, column: &str) -> Option<i32> {
        row.try_get::<Option<i32>, _>(column).ok().flatten()
    }
}

// =============================================================================
// MySQL Implementation
// =============================================================================

mod mysql {
    use super::*;
    use sqlx::{MySqlPool, Row};

    /// Try to get a u64 value from a row, handling MySQL version differences.
    /// MySQL 5.x may return BIGINT (i64), MySQL 8.x returns BIGINT UNSIGNED (u64).
    fn try_get_u64(row: &sqlx::mysql::MySqlRow, column: &str) -> Option<u64> {
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(column) {
            return Some(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(column) {
            return u64::try_from(v).ok();
        }
        None
    }

    /// Safely get a string from a MySQL row.
    /// MySQL may return VARBINARY instead of VARCHAR depending on charset configuration.
    fn get_string(row: &sqlx::mysql::MySqlRow, column: &str) -> String {
        row.try_get::<String, _>(column)
            .ok()
            .or_else(|| {
                row.try_get::<Vec<u8>, _>(column)
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
            .unwrap_or_default()
    }

    pub async fn fetch_columns(
        pool: &MySqlPool,
        table_name: &str,
        schema: Option<&str>,
    ) -> DbResult<Vec<CatalogColumn>> {
        let rows = sqlx::query(queries::mysql::DESCRIBE_COLUMNS)
            .bind(table_name)
            .bind(schema)
            .fetch_all(pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| CatalogColumn {
                name: get_string(row, "COLUMN_NAME"),
                type_name: get_string(row, "COLUMN_TYPE"),
                nullable: get_string(row, "IS_NULLABLE") == "YES",
                is_key: get_string(row, "COLUMN_KEY") == "PRI",
                is_auto_increment: get_string(row, "EXTRA")
                    .to_lowercase()
                    .contains("auto_increment"),
                max_length: try_get_u64(row, "CHARACTER_MAXIMUM_LENGTH")
                    .and_then(|v| u32::try_from(v).ok()),
                precision: try_get_u64(row, "NUMERIC_PRECISION")
                    .and_then(|v| u8::try_from(v).ok()),
                scale: try_get_u64(row, "NUMERIC_SCALE").and_then(|v| u8::try_from(v).ok()),
            })
            .collect())
    }
}

// =============================================================================
// SQLite Implementation
// =============================================================================

mod sqlite {
    use super::*;
    use sqlx::{Row, SqlitePool};

    pub async fn fetch_columns(pool: &SqlitePool, table_name: &str) -> DbResult<Vec<CatalogColumn>> {
        let pragma_query = format!("PRAGMA table_info('{}')", table_name.replace('\'', "''"));
        let rows = sqlx::query(&pragma_query).fetch_all(pool).await?;

        let mut columns: Vec<CatalogColumn> = rows
            .iter()
            .map(|row| {
                let type_name: String = row.try_get("type").unwrap_or_default();
                let notnull: i64 = row.try_get("notnull").unwrap_or(0);
                let pk: i64 = row.try_get("pk").unwrap_or(0);
                let (max_length, precision, scale) = declared_size(&type_name);
                CatalogColumn {
                    name: row.try_get("name").unwrap_or_default(),
                    type_name,
                    nullable: notnull == 0,
                    is_key: pk > 0,
                    is_auto_increment: false,
                    max_length,
                    precision,
                    scale,
                }
            })
            .collect();

        // A sole INTEGER primary key aliases the rowid and is engine-assigned
        let keys: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_key)
            .map(|(i, _)| i)
            .collect();
        if let [only] = keys.as_slice() {
            if columns[*only].type_name.eq_ignore_ascii_case("integer") {
                columns[*only].is_auto_increment = true;
            }
        }

        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_record;

    #[derive(Debug, Default)]
    struct Order {
        customer_id: i64,
        order_id: i64,
        note: Option<String>,
        total: rust_decimal::Decimal,
        nested_value: i32,
        cached: String,
    }

    impl_record! {
        Order (table = "Orders") {
            customer_id: i64,
            order_id: i64 => read_only(),
            note: Option<String> => max_length(200),
            total: rust_decimal::Decimal => precision(10, 2),
            nested_value: i32 => column("Detail.Value"),
            cached: String => ignore(),
        }
    }

    #[derive(Debug, Default)]
    struct Line {
        order_id: i32,
        line_id: i32,
        qty: i32,
    }

    impl_record! {
        Line {
            order_id: i32 => key(),
            line_id: i32 => key(),
            qty: i32,
        }
    }

    #[derive(Debug, Default)]
    struct Unkeyed {
        label: String,
        maybe_id: Option<i32>,
    }

    impl_record! {
        Unkeyed {
            label: String,
            maybe_id: Option<i32>,
        }
    }

    #[test]
    fn test_infer_skips_nested_and_ignored() {
        let schema = SchemaCache::new().infer::<Order>(None, None, None).unwrap();
        assert_eq!(schema.table_name(), "Orders");
        assert_eq!(
            schema.column_names(),
            vec!["customer_id", "order_id", "note", "total"]
        );
        let ordinals: Vec<_> = schema.columns().iter().map(|c| c.ordinal()).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_infer_annotations() {
        let schema = SchemaCache::new().infer::<Order>(None, None, None).unwrap();
        let note = schema.column("NOTE").unwrap();
        assert!(note.allows_null());
        assert_eq!(note.max_length(), Some(200));
        assert_eq!(note.provider_type_name(), "NVARCHAR(200)");

        let total = schema.column("total").unwrap();
        assert!(!total.allows_null());
        assert_eq!(total.precision(), Some(10));
        assert_eq!(total.scale(), Some(2));
    }

    #[test]
    fn test_identity_heuristic_prefers_read_only_candidate() {
        let schema = SchemaCache::new().infer::<Order>(None, None, None).unwrap();
        let identity = schema.identity_column().unwrap();
        assert_eq!(identity.name(), "order_id");
        assert!(identity.is_key());
        assert!(identity.is_unique());
        assert!(!schema.column("customer_id").unwrap().is_key());
    }

    #[test]
    fn test_explicit_keys_disable_heuristic() {
        let schema = SchemaCache::new().infer::<Line>(None, None, None).unwrap();
        let keys: Vec<_> = schema.key_columns().iter().map(|c| c.name()).collect();
        assert_eq!(keys, vec!["order_id", "line_id"]);
        assert!(schema.identity_column().is_none());
    }

    #[test]
    fn test_heuristic_ignores_nullable_candidates() {
        let schema = SchemaCache::new().infer::<Unkeyed>(None, None, None).unwrap();
        assert!(schema.key_columns().is_empty());
        assert_eq!(schema.table_name(), "Unkeyed");
    }

    #[test]
    fn test_infer_returns_cached_instance() {
        let cache = SchemaCache::new();
        let first = cache.infer::<Order>(None, None, None).unwrap();
        let second = cache.infer::<Order>(None, Some("orders"), None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other = cache.infer::<Order>(None, Some("Archive"), None).unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(other.table_name(), "Archive");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalidate_record() {
        let cache = SchemaCache::new();
        let first = cache.infer::<Order>(None, None, None).unwrap();
        cache.infer::<Line>(None, None, None).unwrap();
        assert!(cache.invalidate::<Order>());
        assert!(!cache.invalidate::<Order>());
        assert_eq!(cache.len(), 1);

        let again = cache.infer::<Order>(None, None, None).unwrap();
        assert!(!Arc::ptr_eq(&first, &again));
        assert_eq!(*first, *again);
    }

    #[tokio::test]
    async fn test_failed_load_leaves_no_entry() {
        let conn = Connection::open("sqlite::memory:").await.unwrap();
        let cache = SchemaCache::new();
        let cancel = CancellationToken::new();
        for _ in 0..3 {
            assert!(cache.load(&conn, "missing", None, &cancel).await.is_err());
        }
        assert_eq!(cache.catalog_loads(), 3);
        assert!(cache.entries.lock().unwrap().is_empty());

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        assert!(cache.load(&conn, "missing", None, &cancelled).await.is_err());
        assert!(cache.entries.lock().unwrap().is_empty());
        conn.close().await;
    }

    #[test]
    fn test_declared_size() {
        assert_eq!(declared_size("VARCHAR(50)"), (Some(50), Some(50), None));
        assert_eq!(declared_size("DECIMAL(10, 2)"), (None, Some(10), Some(2)));
        assert_eq!(declared_size("TEXT"), (None, None, None));
    }
}
