//! Database access layer.
//!
//! This module provides:
//! - Connections over database-specific pools
//! - Dialect providers and type mappers
//! - Command text building and parameter binding
//! - Command execution with lazy result streaming
//! - Cursors and record materialization
//! - Schema inference and catalog loading, with caching
//! - Table contexts for ready-made CRUD commands

#[macro_use]
pub mod macros;

pub mod command;
pub mod cursor;
pub mod dialect;
pub mod executor;
pub mod materialize;
pub mod params;
pub mod pool;
pub mod schema;
pub mod table;
pub mod transaction;
pub mod types;

pub use command::{Command, CommandSource};
pub use cursor::{
    CollectionCursor, Cursor, DataRow, QueryStream, ReaderState, ResultRow, RowCursor,
};
pub use dialect::{
    ColumnDeclaration, DialectProvider, DialectRegistry, MySqlDialect, PostgresDialect,
    SqlServerDialect, SqliteDialect, UNBOUNDED,
};
pub use materialize::{DynamicRecord, PropertyMap, PropertyMapCache, parse_dynamic, parse_object};
pub use params::{Parameter, ParameterCollection, ParameterDirection, ParameterTarget};
pub use pool::{Connection, DbPool};
pub use schema::SchemaCache;
pub use table::{KeyValue, TableContext};
pub use transaction::DbTransaction;
pub use types::{ResultColumn, TypeMapper};
