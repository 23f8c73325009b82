//! SQL Tablekit - Main entry point.
//!
//! Inspects tables, renders DDL, generates record types and pages through
//! rows of SQLite, PostgreSQL and MySQL databases.

use sql_tablekit::config::{Command, Config};
use sql_tablekit::db::Connection;
use sql_tablekit::models::ConnectionConfig;
use sql_tablekit::tools::{self, SelectOptions};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so command output stays clean
    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(
    config: &Config,
    cancel: &CancellationToken,
) -> Result<String, Box<dyn std::error::Error>> {
    let connection_config = ConnectionConfig::new(&config.database, config.pool_options())?;
    info!(
        driver = %connection_config.driver,
        database = %connection_config.masked_connection_string(),
        "Connecting"
    );
    let connection = Connection::open_config(connection_config)
        .await?
        .with_command_timeout(config.command_timeout_duration());

    let output = match &config.command {
        Command::Describe(table) => {
            tools::describe(&connection, &table.table, table.schema.as_deref(), cancel).await
        }
        Command::Ddl { table, dialect } => {
            tools::ddl(
                &connection,
                &table.table,
                table.schema.as_deref(),
                dialect.map(Into::into),
                cancel,
            )
            .await
        }
        Command::Codegen { table, type_name } => {
            tools::codegen_table(
                &connection,
                &table.table,
                table.schema.as_deref(),
                type_name.as_deref(),
                cancel,
            )
            .await
        }
        Command::Select {
            table,
            skip,
            take,
            format,
            decode_binary,
        } => {
            let options = SelectOptions {
                skip: *skip,
                take: *take,
                format: *format,
                decode_binary: *decode_binary,
            };
            tools::select(
                &connection,
                &table.table,
                table.schema.as_deref(),
                options,
                cancel,
            )
            .await
        }
    };

    connection.close().await;
    Ok(output?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    // Initialize logging
    init_tracing(&config);

    info!("Starting sql-tablekit v{}", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    match run(&config, &cancel).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            Err(e)
        }
    }
}
