//! Database dispatch macros for reducing code duplication.
//!
//! The macros generate database-specific match arms while keeping each arm
//! readable on its own line.

/// Macro for generating database dispatch match arms.
///
/// This macro generates match arms for `DbPool` variants, reducing the need
/// to manually write repetitive match statements.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(pool, {
///     MySql(p) => mysql::execute(p, &sql).await,
///     Postgres(p) => postgres::execute(p, &sql).await,
///     SQLite(p) => sqlite::execute(p, &sql).await,
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}
