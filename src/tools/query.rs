//! The `select` subcommand: page through a table's rows.

use crate::config::FormatArg;
use crate::db::{Connection, DynamicRecord, TableContext};
use crate::error::DbResult;
use crate::tools::format::render;
use futures_util::TryStreamExt;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Options for [`select`].
#[derive(Debug, Clone, Copy)]
pub struct SelectOptions {
    pub skip: u64,
    pub take: u64,
    pub format: FormatArg,
    pub decode_binary: bool,
}

/// Read one page of rows from a table.
pub async fn select_page(
    context: &TableContext,
    skip: u64,
    take: u64,
    cancel: &CancellationToken,
) -> DbResult<Vec<DynamicRecord>> {
    let command = context.select_page(skip, take)?;
    command.query_dynamic(cancel)?.try_collect().await
}

/// Read one page of rows from a live table and render it.
pub async fn select(
    connection: &Connection,
    table: &str,
    schema: Option<&str>,
    options: SelectOptions,
    cancel: &CancellationToken,
) -> DbResult<String> {
    let context = connection.table(table, schema, cancel).await?;
    let start = Instant::now();
    let records = select_page(&context, options.skip, options.take, cancel).await?;
    let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    info!(
        table = %table,
        rows = records.len(),
        elapsed_ms,
        "Selected rows"
    );

    let columns: Vec<String> = context
        .schema()
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    Ok(render(
        options.format,
        &columns,
        &records,
        options.decode_binary,
        elapsed_ms,
    ))
}
