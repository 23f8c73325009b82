//! Data models for the data-access engine.
//!
//! This module re-exports the value, schema and connection types used
//! throughout the crate.

pub mod connection;
pub mod schema;
pub mod value;

// Re-export commonly used types
pub use connection::{ConnectionConfig, ConnectionConfigError, ConnectionState, DriverKind};
pub use schema::{ColumnSchema, DbType, ProviderType, TableSchema};
pub use value::{ConversionError, DbValue, HostType, PropertyType, Value, decode_binary_value};
