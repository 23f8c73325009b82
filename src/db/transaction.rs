//! Caller-owned transactions.
//!
//! A transaction is begun on a [`Connection`](crate::db::Connection) and
//! passed by `&mut` to the `*_in` execution methods. Dropping it without
//! committing rolls it back.

use crate::db::pool::DbPool;
use crate::error::{DbError, DbResult};
use crate::models::DriverKind;
use sqlx::{MySql, Postgres, Sqlite, Transaction};
use tracing::debug;

/// Database-specific transaction wrapper.
pub enum DbTransaction {
    /// MySQL transaction
    MySql(Transaction<'static, MySql>),
    /// PostgreSQL transaction
    Postgres(Transaction<'static, Postgres>),
    /// SQLite transaction
    SQLite(Transaction<'static, Sqlite>),
}

impl DbTransaction {
    /// Begin a transaction on a pooled connection.
    pub async fn begin(pool: &DbPool) -> DbResult<Self> {
        let tx = match pool {
            DbPool::MySql(p) => DbTransaction::MySql(p.begin().await?),
            DbPool::Postgres(p) => DbTransaction::Postgres(p.begin().await?),
            DbPool::SQLite(p) => DbTransaction::SQLite(p.begin().await?),
        };
        debug!(driver = %tx.driver(), "Transaction started");
        Ok(tx)
    }

    /// Get the driver kind for this transaction.
    pub fn driver(&self) -> DriverKind {
        match self {
            DbTransaction::MySql(_) => DriverKind::MySql,
            DbTransaction::Postgres(_) => DriverKind::Postgres,
            DbTransaction::SQLite(_) => DriverKind::Sqlite,
        }
    }

    /// Commit the transaction.
    pub async fn commit(self) -> DbResult<()> {
        match self {
            DbTransaction::MySql(tx) => tx.commit().await.map_err(DbError::from),
            DbTransaction::Postgres(tx) => tx.commit().await.map_err(DbError::from),
            DbTransaction::SQLite(tx) => tx.commit().await.map_err(DbError::from),
        }
    }

    /// Rollback the transaction.
    pub async fn rollback(self) -> DbResult<()> {
        match self {
            DbTransaction::MySql(tx) => tx.rollback().await.map_err(DbError::from),
            DbTransaction::Postgres(tx) => tx.rollback().await.map_err(DbError::from),
            DbTransaction::SQLite(tx) => tx.rollback().await.map_err(DbError::from),
        }
    }
}

impl std::fmt::Debug for DbTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbTransaction")
            .field("driver", &self.driver())
            .finish()
    }
}
