//! Command execution.
//!
//! This module executes [`Command`]s with support for:
//! - Named parameters rewritten to driver placeholders
//! - Command timeouts
//! - Cancellation through a `CancellationToken` on every entry point
//! - Lazy, forward-only result streaming
//! - Caller-owned transactions (`*_in` variants)
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific execution
//! - `postgres`: PostgreSQL-specific execution
//! - `sqlite`: SQLite-specific execution
//!
//! Each submodule provides identical functionality adapted to the database's type system.
//!
//! Streaming queries run on a spawned producer task that feeds a bounded
//! channel; the consumer is a [`RowCursor`] or a [`QueryStream`]. Dropping the
//! consumer cancels the producer.

use crate::db::command::Command;
use crate::db::cursor::{QueryStream, ResultRow, RowCursor, RowReceiver};
use crate::db::materialize::{DynamicRecord, parse_dynamic, parse_object};
use crate::db::params::Parameter;
use crate::db::pool::DbPool;
use crate::db::transaction::DbTransaction;
use crate::db::types::{ResultColumn, RowValues};
use crate::error::{DbError, DbResult};
use crate::models::Value;
use crate::record::Record;
use futures_util::{Stream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Rows buffered between the producer task and the consumer.
const ROW_BUFFER: usize = 64;

type RowSender = mpsc::Sender<DbResult<ResultRow>>;

impl Command {
    /// Execute and return the number of affected rows.
    pub async fn execute_non_query(&self, cancel: &CancellationToken) -> DbResult<u64> {
        let (sql, params) = self.begin_execution(cancel, "execute non-query")?;
        let persistent = self.prepared;
        let work = async {
            impl_db_dispatch!(self.connection.pool(), {
                MySql(p) => mysql::execute(p, &sql, &params, persistent).await,
                Postgres(p) => postgres::execute(p, &sql, &params, persistent).await,
                SQLite(p) => sqlite::execute(p, &sql, &params, persistent).await,
            })
        };
        run_cancellable("execute non-query", self.timeout, cancel, work).await
    }

    /// Execute and return the first column of the first row, or
    /// [`Value::Null`] when there are no rows.
    pub async fn execute_scalar(&self, cancel: &CancellationToken) -> DbResult<Value> {
        let (sql, params) = self.begin_execution(cancel, "execute scalar")?;
        let persistent = self.prepared;
        let work = async {
            impl_db_dispatch!(self.connection.pool(), {
                MySql(p) => mysql::scalar(p, &sql, &params, persistent).await,
                Postgres(p) => postgres::scalar(p, &sql, &params, persistent).await,
                SQLite(p) => sqlite::scalar(p, &sql, &params, persistent).await,
            })
        };
        run_cancellable("execute scalar", self.timeout, cancel, work).await
    }

    /// Execute and open a forward-only cursor over the results.
    ///
    /// Must be called within a tokio runtime.
    pub fn execute_reader(&self, cancel: &CancellationToken) -> DbResult<RowCursor> {
        let (receiver, token) = self.spawn_rows(cancel)?;
        Ok(RowCursor::new(receiver, token))
    }

    /// Execute and materialize each row into a `T`, lazily.
    ///
    /// The stream is forward-only and cannot be restarted. Must be called
    /// within a tokio runtime.
    pub fn query<T: Record>(&self, cancel: &CancellationToken) -> DbResult<QueryStream<T>> {
        let (receiver, token) = self.spawn_rows(cancel)?;
        Ok(QueryStream::new(receiver, token, parse_object::<T, ResultRow>))
    }

    /// Execute and materialize each row into a [`DynamicRecord`], lazily.
    pub fn query_dynamic(
        &self,
        cancel: &CancellationToken,
    ) -> DbResult<QueryStream<DynamicRecord>> {
        let (receiver, token) = self.spawn_rows(cancel)?;
        Ok(QueryStream::new(receiver, token, parse_dynamic::<ResultRow>))
    }

    /// Prepare the command on the server.
    ///
    /// A rejected prepare is a recoverable [`DbError::CommandPreparation`];
    /// the command stays executable unprepared.
    pub async fn prepare(&mut self, cancel: &CancellationToken) -> DbResult<()> {
        let (sql, _) = self.begin_execution(cancel, "prepare")?;
        let work = async {
            impl_db_dispatch!(self.connection.pool(), {
                MySql(p) => mysql::prepare(p, &sql).await,
                Postgres(p) => postgres::prepare(p, &sql).await,
                SQLite(p) => sqlite::prepare(p, &sql).await,
            })
        };
        run_cancellable("prepare", self.timeout, cancel, work).await?;
        self.prepared = true;
        debug!(sql = %sql, "Command prepared");
        Ok(())
    }

    /// [`execute_non_query`](Self::execute_non_query) inside a transaction.
    pub async fn execute_non_query_in(
        &self,
        tx: &mut DbTransaction,
        cancel: &CancellationToken,
    ) -> DbResult<u64> {
        self.check_transaction(tx)?;
        let (sql, params) = self.begin_execution(cancel, "execute non-query")?;
        let persistent = self.prepared;
        let work = async {
            match tx {
                DbTransaction::MySql(t) => mysql::execute(&mut **t, &sql, &params, persistent).await,
                DbTransaction::Postgres(t) => {
                    postgres::execute(&mut **t, &sql, &params, persistent).await
                }
                DbTransaction::SQLite(t) => {
                    sqlite::execute(&mut **t, &sql, &params, persistent).await
                }
            }
        };
        run_cancellable("execute non-query", self.timeout, cancel, work).await
    }

    /// [`execute_scalar`](Self::execute_scalar) inside a transaction.
    pub async fn execute_scalar_in(
        &self,
        tx: &mut DbTransaction,
        cancel: &CancellationToken,
    ) -> DbResult<Value> {
        self.check_transaction(tx)?;
        let (sql, params) = self.begin_execution(cancel, "execute scalar")?;
        let persistent = self.prepared;
        let work = async {
            match tx {
                DbTransaction::MySql(t) => mysql::scalar(&mut **t, &sql, &params, persistent).await,
                DbTransaction::Postgres(t) => {
                    postgres::scalar(&mut **t, &sql, &params, persistent).await
                }
                DbTransaction::SQLite(t) => {
                    sqlite::scalar(&mut **t, &sql, &params, persistent).await
                }
            }
        };
        run_cancellable("execute scalar", self.timeout, cancel, work).await
    }

    /// [`query`](Self::query) inside a transaction.
    ///
    /// The transaction's connection is borrowed for the whole read, so the
    /// rows are collected before returning.
    pub async fn query_in<T: Record>(
        &self,
        tx: &mut DbTransaction,
        cancel: &CancellationToken,
    ) -> DbResult<Vec<T>> {
        let rows = self.fetch_all_in(tx, cancel).await?;
        rows.iter().map(parse_object::<T, ResultRow>).collect()
    }

    /// [`query_dynamic`](Self::query_dynamic) inside a transaction.
    pub async fn query_dynamic_in(
        &self,
        tx: &mut DbTransaction,
        cancel: &CancellationToken,
    ) -> DbResult<Vec<DynamicRecord>> {
        let rows = self.fetch_all_in(tx, cancel).await?;
        rows.iter().map(parse_dynamic::<ResultRow>).collect()
    }

    async fn fetch_all_in(
        &self,
        tx: &mut DbTransaction,
        cancel: &CancellationToken,
    ) -> DbResult<Vec<ResultRow>> {
        self.check_transaction(tx)?;
        let (sql, params) = self.begin_execution(cancel, "query")?;
        let persistent = self.prepared;
        let work = async {
            match tx {
                DbTransaction::MySql(t) => {
                    mysql::fetch_all(&mut **t, &sql, &params, persistent).await
                }
                DbTransaction::Postgres(t) => {
                    postgres::fetch_all(&mut **t, &sql, &params, persistent).await
                }
                DbTransaction::SQLite(t) => {
                    sqlite::fetch_all(&mut **t, &sql, &params, persistent).await
                }
            }
        };
        run_cancellable("query", self.timeout, cancel, work).await
    }

    fn check_transaction(&self, tx: &DbTransaction) -> DbResult<()> {
        if tx.driver() != self.connection.driver() {
            return Err(DbError::configuration(format!(
                "Transaction is on {} but the command targets {}",
                tx.driver(),
                self.connection.driver()
            )));
        }
        Ok(())
    }

    /// Rewrite the command for execution, after checking for cancellation.
    fn begin_execution(
        &self,
        cancel: &CancellationToken,
        operation: &str,
    ) -> DbResult<(String, Vec<Parameter>)> {
        if cancel.is_cancelled() {
            return Err(DbError::cancelled(operation));
        }
        if self.text.trim().is_empty() {
            return Err(DbError::invalid_argument("command text cannot be empty"));
        }
        let (sql, params) = self.positional()?;
        debug!(
            sql = %sql,
            params = params.len(),
            timeout_secs = self.timeout.as_secs(),
            prepared = self.prepared,
            "Executing command"
        );
        Ok((sql, params))
    }

    fn spawn_rows(&self, cancel: &CancellationToken) -> DbResult<(RowReceiver, CancellationToken)> {
        let (sql, params) = self.begin_execution(cancel, "query")?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| DbError::internal(format!("Streaming queries need a tokio runtime: {}", e)))?;

        let token = cancel.child_token();
        let (sender, receiver) = mpsc::channel(ROW_BUFFER);
        let producer = RowProducer {
            pool: self.connection.pool().clone(),
            sql,
            params,
            persistent: self.prepared,
            timeout: self.timeout,
            cancel: token.clone(),
            sender,
        };
        runtime.spawn(producer.run());
        Ok((receiver, token))
    }
}

/// Owned state of a spawned streaming query.
struct RowProducer {
    pool: DbPool,
    sql: String,
    params: Vec<Parameter>,
    persistent: bool,
    timeout: Duration,
    cancel: CancellationToken,
    sender: RowSender,
}

impl RowProducer {
    async fn run(self) {
        let Self {
            pool,
            sql,
            params,
            persistent,
            timeout,
            cancel,
            sender,
        } = self;
        let forward = Forward {
            timeout,
            cancel: &cancel,
            sender: &sender,
        };
        impl_db_dispatch!(&pool, {
            MySql(p) => forward.rows(mysql::stream(p, &sql, &params, persistent)).await,
            Postgres(p) => forward.rows(postgres::stream(p, &sql, &params, persistent)).await,
            SQLite(p) => forward.rows(sqlite::stream(p, &sql, &params, persistent)).await,
        });
        debug!("Row producer finished");
    }
}

struct Forward<'a> {
    timeout: Duration,
    cancel: &'a CancellationToken,
    sender: &'a RowSender,
}

impl Forward<'_> {
    /// Send rows to the consumer until the stream ends, an error is sent,
    /// the consumer goes away or the token is cancelled.
    async fn rows<S, R>(&self, mut stream: S)
    where
        S: Stream<Item = Result<R, sqlx::Error>> + Unpin,
        R: RowValues,
    {
        let mut columns: Option<Arc<[ResultColumn]>> = None;
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return,
                next = timeout(self.timeout, stream.next()) => next,
            };
            let item = match next {
                Err(_) => Err(timeout_error("query execution", self.timeout)),
                Ok(None) => return,
                Ok(Some(Err(e))) => Err(DbError::from(e)),
                Ok(Some(Ok(row))) => {
                    let columns = columns
                        .get_or_insert_with(|| Arc::from(row.result_columns()))
                        .clone();
                    let values = row.to_values(&columns);
                    Ok(ResultRow::new(columns, values))
                }
            };
            let last = item.is_err();
            let sent = tokio::select! {
                _ = self.cancel.cancelled() => return,
                sent = self.sender.send(item) => sent.is_ok(),
            };
            if last || !sent {
                return;
            }
        }
    }
}

// =============================================================================
// Common Helper Functions
// =============================================================================

async fn run_cancellable<T, F>(
    operation: &str,
    query_timeout: Duration,
    cancel: &CancellationToken,
    work: F,
) -> DbResult<T>
where
    F: Future<Output = DbResult<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(DbError::cancelled(operation)),
        result = timeout(query_timeout, work) => match result {
            Ok(result) => result,
            Err(_) => Err(timeout_error(operation, query_timeout)),
        },
    }
}

fn timeout_error(operation: &str, timeout: Duration) -> DbError {
    DbError::timeout(operation, u32::try_from(timeout.as_secs()).unwrap_or(u32::MAX))
}

fn first_value<R: RowValues>(row: &R) -> Value {
    row.result_columns()
        .first()
        .map(|column| row.value_at(0, column.host_type))
        .unwrap_or(Value::Null)
}

fn to_result_rows<R: RowValues>(rows: Vec<R>) -> Vec<ResultRow> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let columns: Arc<[ResultColumn]> = Arc::from(first.result_columns());
    rows.iter()
        .map(|row| ResultRow::new(columns.clone(), row.to_values(&columns)))
        .collect()
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// The code structure is intentionally parallel to make differences obvious.
//
// Commands without parameters that were not prepared run as raw SQL to avoid
// prepared statement issues (some SQL like CREATE PROCEDURE doesn't support
// prepared statements). Parameterized commands that were not prepared run
// with a non-persistent statement.

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql;
    use futures_util::stream::BoxStream;
    use sqlx::mysql::{MySqlArguments, MySqlRow};
    use sqlx::{MySql, MySqlPool};

    fn build<'q>(
        sql: &'q str,
        params: &[Parameter],
        persistent: bool,
    ) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
        let mut query = sqlx::query(sql).persistent(persistent);
        for param in params {
            query = bind_mysql(query, param);
        }
        query
    }

    pub async fn execute<'c, E>(
        executor: E,
        sql: &str,
        params: &[Parameter],
        persistent: bool,
    ) -> DbResult<u64>
    where
        E: sqlx::Executor<'c, Database = MySql>,
    {
        let result = if params.is_empty() && !persistent {
            executor.execute(sql).await?
        } else {
            build(sql, params, persistent).execute(executor).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn scalar<'c, E>(
        executor: E,
        sql: &str,
        params: &[Parameter],
        persistent: bool,
    ) -> DbResult<Value>
    where
        E: sqlx::Executor<'c, Database = MySql>,
    {
        let row: Option<MySqlRow> = if params.is_empty() && !persistent {
            executor.fetch_optional(sql).await?
        } else {
            build(sql, params, persistent).fetch_optional(executor).await?
        };
        Ok(row.as_ref().map(first_value).unwrap_or(Value::Null))
    }

    pub async fn fetch_all<'c, E>(
        executor: E,
        sql: &str,
        params: &[Parameter],
        persistent: bool,
    ) -> DbResult<Vec<ResultRow>>
    where
        E: sqlx::Executor<'c, Database = MySql>,
    {
        let rows: Vec<MySqlRow> = if params.is_empty() && !persistent {
            executor.fetch_all(sql).await?
        } else {
            build(sql, params, persistent).fetch_all(executor).await?
        };
        Ok(to_result_rows(rows))
    }

    pub fn stream<'a>(
        pool: &'a MySqlPool,
        sql: &'a str,
        params: &[Parameter],
        persistent: bool,
    ) -> BoxStream<'a, Result<MySqlRow, sqlx::Error>> {
        if params.is_empty() && !persistent {
            use sqlx::Executor;
            pool.fetch(sql)
        } else {
            build(sql, params, persistent).fetch(pool)
        }
    }

    pub async fn prepare(pool: &MySqlPool, sql: &str) -> DbResult<()> {
        use sqlx::Executor;
        pool.prepare(sql)
            .await
            .map(|_| ())
            .map_err(|e| DbError::command_preparation(e.to_string()))
    }
}

mod postgres {
    use super::*;
    use crate::db::params::bind_postgres;
    use futures_util::stream::BoxStream;
    use sqlx::postgres::{PgArguments, PgRow};
    use sqlx::{PgPool, Postgres};

    fn build<'q>(
        sql: &'q str,
        params: &[Parameter],
        persistent: bool,
    ) -> sqlx::query::Query<'q, Postgres, PgArguments> {
        let mut query = sqlx::query(sql).persistent(persistent);
        for param in params {
            query = bind_postgres(query, param);
        }
        query
    }

    pub async fn execute<'c, E>(
        executor: E,
        sql: &str,
        params: &[Parameter],
        persistent: bool,
    ) -> DbResult<u64>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let result = if params.is_empty() && !persistent {
            executor.execute(sql).await?
        } else {
            build(sql, params, persistent).execute(executor).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn scalar<'c, E>(
        executor: E,
        sql: &str,
        params: &[Parameter],
        persistent: bool,
    ) -> DbResult<Value>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let row: Option<PgRow> = if params.is_empty() && !persistent {
            executor.fetch_optional(sql).await?
        } else {
            build(sql, params, persistent).fetch_optional(executor).await?
        };
        Ok(row.as_ref().map(first_value).unwrap_or(Value::Null))
    }

    pub async fn fetch_all<'c, E>(
        executor: E,
        sql: &str,
        params: &[Parameter],
        persistent: bool,
    ) -> DbResult<Vec<ResultRow>>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let rows: Vec<PgRow> = if params.is_empty() && !persistent {
            executor.fetch_all(sql).await?
        } else {
            build(sql, params, persistent).fetch_all(executor).await?
        };
        Ok(to_result_rows(rows))
    }

    pub fn stream<'a>(
        pool: &'a PgPool,
        sql: &'a str,
        params: &[Parameter],
        persistent: bool,
    ) -> BoxStream<'a, Result<PgRow, sqlx::Error>> {
        if params.is_empty() && !persistent {
            use sqlx::Executor;
            pool.fetch(sql)
        } else {
            build(sql, params, persistent).fetch(pool)
        }
    }

    pub async fn prepare(pool: &PgPool, sql: &str) -> DbResult<()> {
        use sqlx::Executor;
        pool.prepare(sql)
            .await
            .map(|_| ())
            .map_err(|e| DbError::command_preparation(e.to_string()))
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite;
    use futures_util::stream::BoxStream;
    use sqlx::sqlite::{SqliteArguments, SqliteRow};
    use sqlx::{Sqlite, SqlitePool};

    fn build<'q>(
        sql: &'q str,
        params: &[Parameter],
        persistent: bool,
    ) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
        let mut query = sqlx::query(sql).persistent(persistent);
        for param in params {
            query = bind_sqlite(query, param);
        }
        query
    }

    pub async fn execute<'c, E>(
        executor: E,
        sql: &str,
        params: &[Parameter],
        persistent: bool,
    ) -> DbResult<u64>
    where
        E: sqlx::Executor<'c, Database = Sqlite>,
    {
        let result = if params.is_empty() && !persistent {
            executor.execute(sql).await?
        } else {
            build(sql, params, persistent).execute(executor).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn scalar<'c, E>(
        executor: E,
        sql: &str,
        params: &[Parameter],
        persistent: bool,
    ) -> DbResult<Value>
    where
        E: sqlx::Executor<'c, Database = Sqlite>,
    {
        let row: Option<SqliteRow> = if params.is_empty() && !persistent {
            executor.fetch_optional(sql).await?
        } else {
            build(sql, params, persistent).fetch_optional(executor).await?
        };
        Ok(row.as_ref().map(first_value).unwrap_or(Value::Null))
    }

    pub async fn fetch_all<'c, E>(
        executor: E,
        sql: &str,
        params: &[Parameter],
        persistent: bool,
    ) -> DbResult<Vec<ResultRow>>
    where
        E: sqlx::Executor<'c, Database = Sqlite>,
    {
        let rows: Vec<SqliteRow> = if params.is_empty() && !persistent {
            executor.fetch_all(sql).await?
        } else {
            build(sql, params, persistent).fetch_all(executor).await?
        };
        Ok(to_result_rows(rows))
    }

    pub fn stream<'a>(
        pool: &'a SqlitePool,
        sql: &'a str,
        params: &[Parameter],
        persistent: bool,
    ) -> BoxStream<'a, Result<SqliteRow, sqlx::Error>> {
        if params.is_empty() && !persistent {
            use sqlx::Executor;
            pool.fetch(sql)
        } else {
            build(sql, params, persistent).fetch(pool)
        }
    }

    pub async fn prepare(pool: &SqlitePool, sql: &str) -> DbResult<()> {
        use sqlx::Executor;
        pool.prepare(sql)
            .await
            .map(|_| ())
            .map_err(|e| DbError::command_preparation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::Connection;
    use crate::impl_record;

    #[derive(Debug, Default, PartialEq)]
    struct Item {
        id: i64,
        name: String,
    }

    impl_record! {
        Item (table = "items") {
            id: i64 => key().identity(),
            name: String,
        }
    }

    async fn connection() -> Connection {
        let conn = Connection::open("sqlite::memory:").await.unwrap();
        let cancel = CancellationToken::new();
        conn.begin_command_text()
            .append_text("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)", false)
            .end_command_text()
            .unwrap()
            .execute_non_query(&cancel)
            .await
            .unwrap();
        conn
    }

    #[test]
    fn test_timeout_error_secs() {
        let err = timeout_error("query execution", Duration::from_secs(5));
        assert!(matches!(err, DbError::Timeout { elapsed_secs: 5, .. }));
    }

    #[tokio::test]
    async fn test_insert_scalar_and_query() {
        let conn = connection().await;
        let cancel = CancellationToken::new();

        let mut insert = conn
            .begin_command_text()
            .append_text("INSERT INTO items (name) VALUES (@name)", false)
            .end_command_text()
            .unwrap();
        for name in ["a", "b", "c"] {
            insert.set_parameter("name", name).unwrap();
            assert_eq!(insert.execute_non_query(&cancel).await.unwrap(), 1);
        }

        let count = conn
            .begin_command_text()
            .append_text("SELECT COUNT(*) FROM items", false)
            .end_command_text()
            .unwrap()
            .execute_scalar(&cancel)
            .await
            .unwrap();
        assert_eq!(count, Value::Int64(3));

        let items: Vec<Item> = conn
            .begin_command_text()
            .append_text("SELECT id, name FROM items ORDER BY id", false)
            .end_command_text()
            .unwrap()
            .query::<Item>(&cancel)
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[2], Item { id: 3, name: "c".into() });
    }

    #[tokio::test]
    async fn test_scalar_without_rows_is_null() {
        let conn = connection().await;
        let value = conn
            .begin_command_text()
            .append_text("SELECT name FROM items WHERE id = 42", false)
            .end_command_text()
            .unwrap()
            .execute_scalar(&CancellationToken::new())
            .await
            .unwrap();
        assert!(value.is_null());
    }

    #[tokio::test]
    async fn test_cancelled_before_execution() {
        let conn = connection().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = conn
            .begin_command_text()
            .append_text("SELECT 1", false)
            .end_command_text()
            .unwrap()
            .execute_scalar(&cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_prepare_failure_is_recoverable() {
        let conn = connection().await;
        let mut command = conn
            .begin_command_text()
            .append_text("SELECT nope FROM missing_table", false)
            .end_command_text()
            .unwrap();
        let err = command.prepare(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, DbError::CommandPreparation { .. }));
        assert!(err.is_recoverable());
        assert!(!command.is_prepared());
    }

    #[tokio::test]
    async fn test_transaction_rollback() {
        let conn = connection().await;
        let cancel = CancellationToken::new();
        let mut tx = conn.begin().await.unwrap();

        let mut insert = conn
            .begin_command_text()
            .append_text("INSERT INTO items (name) VALUES (@name)", false)
            .end_command_text()
            .unwrap();
        insert.set_parameter("name", "temp").unwrap();
        insert.execute_non_query_in(&mut tx, &cancel).await.unwrap();

        let inside: Vec<Item> = conn
            .begin_command_text()
            .append_text("SELECT id, name FROM items", false)
            .end_command_text()
            .unwrap()
            .query_in::<Item>(&mut tx, &cancel)
            .await
            .unwrap();
        assert_eq!(inside.len(), 1);
        tx.rollback().await.unwrap();

        let count = conn
            .begin_command_text()
            .append_text("SELECT COUNT(*) FROM items", false)
            .end_command_text()
            .unwrap()
            .execute_scalar(&cancel)
            .await
            .unwrap();
        assert_eq!(count, Value::Int64(0));
    }
}
