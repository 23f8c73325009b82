//! SQL Tablekit Library
//!
//! A provider-agnostic relational data-access layer for SQLite, PostgreSQL
//! and MySQL (plus SQL Server command text): dialect providers, schema
//! inference and catalog loading, a fluent command-text builder, parameter
//! binding, and materialization of rows into typed records or dynamic
//! records.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod record;
pub mod tools;

pub use config::Config;
pub use db::{Command, CommandSource, Connection, TableContext};
pub use error::{DbError, DbResult};
pub use record::{Params, PropertySource, Record};
