//! Configuration handling for the command-line tool and connection pools.
//!
//! This module provides configuration management via CLI arguments and environment variables.

use crate::models::DriverKind;
use clap::{Parser, Subcommand, ValueEnum};
use std::time::Duration;

pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Connection pool configuration options.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 10 for MySQL/PostgreSQL, 1 for SQLite)
    pub max_connections: Option<u32>,
    /// Minimum connections in pool (default: 1)
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds (default: 600)
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Whether to test connections before use (default: true)
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    /// Get max_connections with default value based on database type.
    pub fn max_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.max_connections.unwrap_or(if is_sqlite {
            DEFAULT_MAX_CONNECTIONS_SQLITE
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    /// Get min_connections with default value.
    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    /// Get idle_timeout with default value.
    pub fn idle_timeout_or_default(&self) -> u64 {
        self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS)
    }

    /// Get acquire_timeout with default value.
    pub fn acquire_timeout_or_default(&self) -> u64 {
        self.acquire_timeout_secs
            .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS)
    }

    /// Get test_before_acquire with default value.
    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Overlay `other` on top of `self`; values set in `other` win.
    pub fn merge(self, other: PoolOptions) -> PoolOptions {
        PoolOptions {
            max_connections: other.max_connections.or(self.max_connections),
            min_connections: other.min_connections.or(self.min_connections),
            idle_timeout_secs: other.idle_timeout_secs.or(self.idle_timeout_secs),
            acquire_timeout_secs: other.acquire_timeout_secs.or(self.acquire_timeout_secs),
            test_before_acquire: other.test_before_acquire.or(self.test_before_acquire),
        }
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err("max_connections must be greater than 0".to_string());
            }
        }
        if let Some(min) = self.min_connections {
            if min == 0 {
                return Err("min_connections must be greater than 0".to_string());
            }
            if let Some(max) = self.max_connections {
                if min > max {
                    return Err(format!(
                        "min_connections ({}) cannot exceed max_connections ({})",
                        min, max
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Dialect selector for commands that only render SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DialectArg {
    Sqlserver,
    Mysql,
    Postgres,
    Sqlite,
}

impl From<DialectArg> for DriverKind {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Sqlserver => DriverKind::SqlServer,
            DialectArg::Mysql => DriverKind::MySql,
            DialectArg::Postgres => DriverKind::Postgres,
            DialectArg::Sqlite => DriverKind::Sqlite,
        }
    }
}

/// Output format for `select`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FormatArg {
    #[default]
    Json,
    Table,
    Markdown,
}

/// Table selection shared by every subcommand.
#[derive(Debug, Clone, clap::Args)]
pub struct TableArgs {
    /// Table name
    pub table: String,

    /// Schema (namespace) containing the table
    #[arg(long)]
    pub schema: Option<String>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print the live schema of a table as JSON
    Describe(TableArgs),

    /// Print CREATE TABLE DDL for a table in the given dialect
    Ddl {
        #[command(flatten)]
        table: TableArgs,

        /// Target dialect (defaults to the connection's own)
        #[arg(long, value_enum)]
        dialect: Option<DialectArg>,
    },

    /// Generate a Rust record struct for a table
    Codegen {
        #[command(flatten)]
        table: TableArgs,

        /// Struct name (defaults to the table name in PascalCase)
        #[arg(long)]
        type_name: Option<String>,
    },

    /// Select a page of rows from a table
    Select {
        #[command(flatten)]
        table: TableArgs,

        #[arg(long, default_value_t = 0)]
        skip: u64,

        #[arg(long, default_value_t = 100)]
        take: u64,

        #[arg(long, value_enum, default_value = "json")]
        format: FormatArg,

        /// Decode binary columns as UTF-8 text when valid
        #[arg(long)]
        decode_binary: bool,
    },
}

/// Configuration for the `sql-tablekit` command-line tool.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sql-tablekit",
    about = "Inspect tables, render DDL, generate record types and page through rows",
    version,
    author
)]
pub struct Config {
    /// Database connection string.
    /// Add ?read_only=true to open SQLite databases read-only.
    #[arg(short = 'd', long = "database", value_name = "URL", env = "DATABASE_URL")]
    pub database: String,

    /// Command timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_COMMAND_TIMEOUT_SECS,
        env = "TABLEKIT_COMMAND_TIMEOUT"
    )]
    pub command_timeout: u64,

    /// Maximum connections in the pool
    #[arg(long, env = "TABLEKIT_MAX_CONNECTIONS")]
    pub max_connections: Option<u32>,

    /// Minimum connections in the pool
    #[arg(long, env = "TABLEKIT_MIN_CONNECTIONS")]
    pub min_connections: Option<u32>,

    /// Connection acquire timeout in seconds
    #[arg(long, env = "TABLEKIT_ACQUIRE_TIMEOUT")]
    pub acquire_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "TABLEKIT_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "TABLEKIT_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Pool options given on the command line.
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            acquire_timeout_secs: self.acquire_timeout,
            ..PoolOptions::default()
        }
    }

    /// Get the command timeout as a Duration.
    pub fn command_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.command_timeout)
    }
}
