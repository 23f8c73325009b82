//! Integration tests for table contexts against a file-backed SQLite database.

use futures_util::future::join_all;
use futures_util::{StreamExt, TryStreamExt};
use sql_tablekit::db::{Connection, KeyValue, SchemaCache, TableContext};
use sql_tablekit::error::DbError;
use sql_tablekit::impl_record;
use sql_tablekit::models::{HostType, Value};
use sql_tablekit::record::Params;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default, Clone, PartialEq)]
struct Product {
    id: i64,
    name: String,
    price: Option<f64>,
}

impl_record! {
    Product (table = "products") {
        id: i64 => key().identity(),
        name: String,
        price: Option<f64>,
    }
}

/// Open a fresh database file with a `products` table.
async fn setup() -> (TempDir, Connection) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("shop.db").display());
    let conn = Connection::open(&url).await.unwrap();
    conn.begin_command_text()
        .append_text(
            "CREATE TABLE products (id INTEGER PRIMARY KEY, name TEXT NOT NULL, price REAL)",
            false,
        )
        .end_command_text()
        .unwrap()
        .execute_non_query(&CancellationToken::new())
        .await
        .unwrap();
    (dir, conn)
}

async fn insert_products(table: &TableContext, count: usize) {
    let cancel = CancellationToken::new();
    let mut insert = table.insert(None).unwrap();
    for i in 0..count {
        let product = Product {
            id: 0,
            name: format!("product-{}", i),
            price: (i % 2 == 0).then_some(i as f64 * 1.5),
        };
        insert.set_parameters(&product).unwrap();
        assert_eq!(insert.execute_non_query(&cancel).await.unwrap(), 1);
    }
}

#[tokio::test]
async fn test_catalog_schema_load() {
    let (_dir, conn) = setup().await;
    let cancel = CancellationToken::new();

    let table = conn.table("products", None, &cancel).await.unwrap();
    let schema = table.schema();
    assert_eq!(schema.table_name(), "products");
    assert_eq!(schema.database_name(), "main");
    assert_eq!(schema.column_names(), vec!["id", "name", "price"]);

    let id = schema.column("id").unwrap();
    assert!(id.is_key());
    assert!(id.is_auto_increment());
    assert_eq!(id.data_type(), HostType::Int64);

    let name = schema.column("name").unwrap();
    assert!(!name.allows_null());
    assert_eq!(name.data_type(), HostType::String);

    let price = schema.column("price").unwrap();
    assert!(price.allows_null());
    assert_eq!(price.data_type(), HostType::Float64);
}

#[tokio::test]
async fn test_catalog_schema_is_cached_until_invalidated() {
    let (_dir, conn) = setup().await;
    let cancel = CancellationToken::new();
    let cache = SchemaCache::global();

    let first = cache.load(&conn, "products", None, &cancel).await.unwrap();
    let second = cache.load(&conn, "PRODUCTS", None, &cancel).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    assert!(cache.invalidate_table(&conn, "products", None));
    assert!(!cache.invalidate_table(&conn, "products", None));

    let reloaded = cache.load(&conn, "products", None, &cancel).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &reloaded));
    assert_eq!(first.as_ref(), reloaded.as_ref());
}

#[tokio::test]
async fn test_concurrent_first_loads_share_one_catalog_query() {
    let (_dir, conn) = setup().await;
    let cancel = CancellationToken::new();
    let cache = SchemaCache::new();

    let loads = (0..8).map(|_| cache.load(&conn, "products", None, &cancel));
    let schemas: Vec<_> = join_all(loads)
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(schemas.len(), 8);
    assert!(schemas.iter().all(|s| Arc::ptr_eq(s, &schemas[0])));
    assert_eq!(cache.catalog_loads(), 1);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_missing_table_is_not_cached() {
    let (_dir, conn) = setup().await;
    let cancel = CancellationToken::new();

    let err = conn.table("orders", None, &cancel).await.unwrap_err();
    assert!(matches!(err, DbError::Configuration { .. }));

    conn.begin_command_text()
        .append_text("CREATE TABLE orders (order_id INTEGER PRIMARY KEY)", false)
        .end_command_text()
        .unwrap()
        .execute_non_query(&cancel)
        .await
        .unwrap();
    let table = conn.table("orders", None, &cancel).await.unwrap();
    assert_eq!(table.schema().column_names(), vec!["order_id"]);
}

#[tokio::test]
async fn test_insert_and_select_by_key() {
    let (_dir, conn) = setup().await;
    let cancel = CancellationToken::new();
    let table = conn.table("products", None, &cancel).await.unwrap();
    insert_products(&table, 3).await;

    let found: Vec<Product> = table
        .select_by_key(Some(KeyValue::scalar(2i64)))
        .unwrap()
        .query::<Product>(&cancel)
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(
        found,
        vec![Product {
            id: 2,
            name: "product-1".into(),
            price: None,
        }]
    );

    let key = Params::new().with("id", 3i64);
    let mut by_object = table.select_by_key(Some(KeyValue::Object(&key))).unwrap();
    let third: Vec<Product> = by_object
        .query::<Product>(&cancel)
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(third[0].price, Some(3.0));

    // Rebinding the same command reuses its text
    by_object.set_parameter("id", 42i64).unwrap();
    let none: Vec<Product> = by_object
        .query::<Product>(&cancel)
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_record_context_matches_live_table() {
    let (_dir, conn) = setup().await;
    let cancel = CancellationToken::new();

    let inferred = TableContext::for_record::<Product>(&conn).unwrap();
    let insert = inferred
        .insert(Some(&Product {
            id: 77,
            name: "typed".into(),
            price: Some(9.5),
        }))
        .unwrap();
    assert!(insert.parameters().get("id").is_none());
    insert.execute_non_query(&cancel).await.unwrap();

    let rows: Vec<Product> = inferred
        .select_all()
        .unwrap()
        .query::<Product>(&cancel)
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, 1);
    assert_eq!(rows[0].name, "typed");
}

#[tokio::test]
async fn test_select_page() {
    let (_dir, conn) = setup().await;
    let cancel = CancellationToken::new();
    let table = conn.table("products", None, &cancel).await.unwrap();
    insert_products(&table, 10).await;

    let page: Vec<Product> = table
        .select_page(4, 3)
        .unwrap()
        .query::<Product>(&cancel)
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let ids: Vec<i64> = page.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![5, 6, 7]);

    let rest = table
        .select_page(8, u64::MAX)
        .unwrap()
        .query_dynamic(&cancel)
        .unwrap()
        .try_collect::<Vec<_>>()
        .await
        .unwrap();
    assert_eq!(rest.len(), 2);
    assert_eq!(rest[0].get("name"), Some(&Value::from("product-8")));
}

#[tokio::test]
async fn test_dropping_stream_releases_connection() {
    let (_dir, conn) = setup().await;
    let cancel = CancellationToken::new();
    let table = conn.table("products", None, &cancel).await.unwrap();
    insert_products(&table, 200).await;

    {
        let stream = table.select_all().unwrap().query::<Product>(&cancel).unwrap();
        let first: Vec<Product> = stream.take(3).map(|r| r.unwrap()).collect().await;
        assert_eq!(first.len(), 3);
    }

    // The pool holds one connection; this waits for the producer to let go
    let count = conn
        .begin_command_text()
        .append_text("SELECT COUNT(*) FROM products", false)
        .end_command_text()
        .unwrap()
        .execute_scalar(&cancel)
        .await
        .unwrap();
    assert_eq!(count, Value::Int64(200));
}

#[tokio::test]
async fn test_ddl_round_trip() {
    let (_dir, conn) = setup().await;
    let cancel = CancellationToken::new();
    let table = conn.table("products", None, &cancel).await.unwrap();
    let ddl = table.create_table_ddl();

    let columns: Vec<_> = ddl
        .lines()
        .skip(1)
        .filter(|line| !line.starts_with(')'))
        .filter_map(|line| conn.dialect().parse_column_ddl(line))
        .collect();
    assert_eq!(columns.len(), 3);
    assert_eq!(columns[0].name, "id");
    assert!(columns[0].is_key && columns[0].is_auto_increment);
    assert_eq!(columns[1].host_type, Some(HostType::String));
    assert!(!columns[1].nullable);
    assert!(columns[2].nullable);

    // Recreate the table in another database from the rendered DDL
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("copy.db").display());
    let copy = Connection::open(&url).await.unwrap();
    copy.begin_command_text()
        .append_text(&ddl, false)
        .end_command_text()
        .unwrap()
        .execute_non_query(&cancel)
        .await
        .unwrap();
    let copied = copy.table("products", None, &cancel).await.unwrap();
    assert_eq!(copied.schema().column_names(), table.schema().column_names());
    assert!(copied.schema().column("id").unwrap().is_auto_increment());
    assert_eq!(
        copied.schema().column("price").unwrap().data_type(),
        HostType::Float64
    );
}
