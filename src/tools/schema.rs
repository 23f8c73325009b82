//! Schema subcommands: `describe`, `ddl` and `codegen`.

use crate::db::{Connection, DialectRegistry};
use crate::error::{DbError, DbResult};
use crate::models::DriverKind;
use crate::tools::codegen::generate_record;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Live schema of a table as pretty-printed JSON.
pub async fn describe(
    connection: &Connection,
    table: &str,
    schema: Option<&str>,
    cancel: &CancellationToken,
) -> DbResult<String> {
    info!(table = %table, "Describing table");
    let context = connection.table(table, schema, cancel).await?;
    serde_json::to_string_pretty(context.schema().as_ref())
        .map_err(|e| DbError::internal(format!("Failed to serialize schema: {}", e)))
}

/// `CREATE TABLE` DDL for a live table, rendered in `dialect` (or the
/// connection's own dialect).
pub async fn ddl(
    connection: &Connection,
    table: &str,
    schema: Option<&str>,
    dialect: Option<DriverKind>,
    cancel: &CancellationToken,
) -> DbResult<String> {
    let context = connection.table(table, schema, cancel).await?;
    let provider = match dialect {
        Some(driver) => DialectRegistry::global().resolve(driver)?,
        None => connection.dialect().clone(),
    };
    info!(table = %table, dialect = provider.name(), "Rendering DDL");
    Ok(format!("{};", provider.create_table_ddl(context.schema())))
}

/// Rust record type for a live table.
pub async fn codegen_table(
    connection: &Connection,
    table: &str,
    schema: Option<&str>,
    type_name: Option<&str>,
    cancel: &CancellationToken,
) -> DbResult<String> {
    let context = connection.table(table, schema, cancel).await?;
    Ok(generate_record(context.schema(), type_name))
}
