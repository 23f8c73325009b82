//! Command-line tool implementations.
//!
//! This module contains the subcommand handlers:
//! - `describe`: Print a table's live schema
//! - `ddl`: Render CREATE TABLE DDL in any dialect
//! - `codegen`: Generate a Rust record type for a table
//! - `select`: Page through a table's rows as JSON, a table or markdown

pub mod codegen;
pub mod format;
pub mod query;
pub mod schema;

pub use codegen::{generate_record, humanize, pascal_case};
pub use query::{SelectOptions, select, select_page};
pub use schema::{codegen_table, ddl, describe};
