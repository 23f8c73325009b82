//! Integration tests for the describe, ddl, codegen and select subcommands.

use sql_tablekit::config::FormatArg;
use sql_tablekit::db::Connection;
use sql_tablekit::models::DriverKind;
use sql_tablekit::tools::{self, SelectOptions};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

async fn setup() -> (TempDir, Connection) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("library.db").display());
    let conn = Connection::open(&url).await.unwrap();
    let cancel = CancellationToken::new();
    for sql in [
        "CREATE TABLE book_titles (BookId INTEGER PRIMARY KEY, title TEXT NOT NULL, rating REAL)",
        "INSERT INTO book_titles (title, rating) VALUES ('Dune', 4.5), ('Emma', NULL), ('Ubik', 4.0)",
    ] {
        conn.begin_command_text()
            .append_text(sql, false)
            .end_command_text()
            .unwrap()
            .execute_non_query(&cancel)
            .await
            .unwrap();
    }
    (dir, conn)
}

#[tokio::test]
async fn test_describe() {
    let (_dir, conn) = setup().await;
    let json = tools::describe(&conn, "book_titles", None, &CancellationToken::new())
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    let columns = parsed["columns"].as_array().unwrap();
    assert_eq!(columns.len(), 3);
    assert_eq!(columns[0]["name"], "BookId");
}

#[tokio::test]
async fn test_ddl_in_other_dialects() {
    let (_dir, conn) = setup().await;
    let cancel = CancellationToken::new();

    let sqlite = tools::ddl(&conn, "book_titles", None, None, &cancel)
        .await
        .unwrap();
    assert!(sqlite.starts_with("CREATE TABLE \"book_titles\" ("));
    assert!(sqlite.ends_with(");"));

    let mysql = tools::ddl(&conn, "book_titles", None, Some(DriverKind::MySql), &cancel)
        .await
        .unwrap();
    assert!(mysql.starts_with("CREATE TABLE `book_titles` ("));
    assert!(mysql.contains("AUTO_INCREMENT"));

    let sqlserver = tools::ddl(&conn, "book_titles", None, Some(DriverKind::SqlServer), &cancel)
        .await
        .unwrap();
    assert!(sqlserver.contains("[BookId] BIGINT IDENTITY(1,1) NOT NULL PRIMARY KEY"));
}

#[tokio::test]
async fn test_codegen() {
    let (_dir, conn) = setup().await;
    let code = tools::codegen_table(&conn, "book_titles", None, None, &CancellationToken::new())
        .await
        .unwrap();
    assert!(code.starts_with("/// Book titles.\n"));
    assert!(code.contains("pub struct BookTitles {"));
    assert!(code.contains("    pub book_id: i64,"));
    assert!(code.contains("    pub rating: Option<f64>,"));
    assert!(code.contains("book_id: i64 => column(\"BookId\").key().identity(),"));
}

#[tokio::test]
async fn test_select_formats() {
    let (_dir, conn) = setup().await;
    let cancel = CancellationToken::new();

    let table = tools::select(
        &conn,
        "book_titles",
        None,
        SelectOptions {
            skip: 1,
            take: 10,
            format: FormatArg::Table,
            decode_binary: false,
        },
        &cancel,
    )
    .await
    .unwrap();
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines[1], "| BookId | title | rating |");
    assert_eq!(lines[3], "|      2 | Emma  | NULL   |");
    assert!(lines[6].starts_with("2 rows in set"));

    let json = tools::select(
        &conn,
        "book_titles",
        None,
        SelectOptions {
            skip: 0,
            take: 1,
            format: FormatArg::Json,
            decode_binary: false,
        },
        &cancel,
    )
    .await
    .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed[0]["title"], "Dune");
    assert_eq!(parsed[0]["rating"], 4.5);

    let markdown = tools::select(
        &conn,
        "book_titles",
        None,
        SelectOptions {
            skip: 5,
            take: 10,
            format: FormatArg::Markdown,
            decode_binary: false,
        },
        &cancel,
    )
    .await
    .unwrap();
    assert!(markdown.starts_with("| BookId | title | rating |\n"));
    assert!(markdown.ends_with("*0 rows*"));
}

#[tokio::test]
async fn test_missing_table() {
    let (_dir, conn) = setup().await;
    let result = tools::describe(&conn, "nope", None, &CancellationToken::new()).await;
    assert!(result.is_err());
}
