//! Table context: ready-made CRUD commands for one table.
//!
//! A [`TableContext`] couples a connection with a cached [`TableSchema`].
//! Its methods build commands through [`CommandSource`] and the parameter
//! binder; none of them execute anything.

use crate::db::command::{Command, CommandSource};
use crate::db::params::{self, ParameterDirection};
use crate::db::pool::Connection;
use crate::db::schema::SchemaCache;
use crate::error::{DbError, DbResult};
use crate::models::{ColumnSchema, TableSchema, Value};
use crate::record::{PropertySource, Record};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Key used by [`TableContext::select_by_key`].
pub enum KeyValue<'a> {
    /// Value of the single key column.
    Scalar(Value),
    /// Source of every key column's value, by column name.
    Object(&'a dyn PropertySource),
}

impl KeyValue<'_> {
    pub fn scalar(value: impl Into<Value>) -> Self {
        Self::Scalar(value.into())
    }
}

impl std::fmt::Debug for KeyValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(v) => f.debug_tuple("Scalar").field(v).finish(),
            Self::Object(_) => f.write_str("Object(..)"),
        }
    }
}

/// Connection-bound CRUD command factory for one table.
#[derive(Debug, Clone)]
pub struct TableContext {
    connection: Connection,
    schema: Arc<TableSchema>,
}

impl TableContext {
    pub fn new(connection: Connection, schema: Arc<TableSchema>) -> Self {
        Self { connection, schema }
    }

    /// Context for a live table, loading its catalog schema through the
    /// global cache.
    pub async fn load(
        connection: &Connection,
        table: &str,
        schema: Option<&str>,
        cancel: &CancellationToken,
    ) -> DbResult<Self> {
        let resolved = SchemaCache::global()
            .load(connection, table, schema, cancel)
            .await?;
        Ok(Self::new(connection.clone(), resolved))
    }

    /// Context for the table a record type maps to, with its schema
    /// inferred from the type.
    pub fn for_record<T: Record>(connection: &Connection) -> DbResult<Self> {
        let schema = SchemaCache::global().infer::<T>(Some(connection), None, None)?;
        Ok(Self::new(connection.clone(), schema))
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn select_from(&self) -> CommandSource {
        let columns = self.schema.column_names();
        self.connection
            .begin_command_text()
            .select(&columns)
            .from(self.schema.table_name(), self.schema.schema_name())
    }

    /// `SELECT <all columns> FROM <table>`.
    pub fn select_all(&self) -> DbResult<Command> {
        self.select_from().end_command_text()
    }

    /// `SELECT <all columns> FROM <table> WHERE <key = parameter AND ...>`.
    ///
    /// Key parameters are always defined. A scalar key binds the single key
    /// column; an object binds every key column it has a value for. Fails
    /// with a configuration error when the table has no key.
    pub fn select_by_key(&self, key: Option<KeyValue<'_>>) -> DbResult<Command> {
        let keys = self.schema.key_columns();
        if keys.is_empty() {
            return Err(DbError::configuration(format!(
                "Table '{}' has no key columns",
                self.schema.qualified_name()
            )));
        }
        let key_names: Vec<&str> = keys.iter().map(|c| c.name()).collect();

        let mut source = self
            .select_from()
            .where_clause(None)
            .fields_and_parameters(&key_names, " AND ", " = ");
        define_all(&mut source, &keys, ParameterDirection::Input)?;

        match key {
            None => {}
            Some(KeyValue::Scalar(value)) => {
                let [only] = keys.as_slice() else {
                    return Err(DbError::invalid_argument(format!(
                        "Table '{}' has a composite key; pass an object with every key column",
                        self.schema.qualified_name()
                    )));
                };
                params::set_parameter(&mut source, only.name(), value, None, None)?;
            }
            Some(KeyValue::Object(values)) => {
                params::set_parameters_from_object(&mut source, values)?;
            }
        }
        source.end_command_text()
    }

    /// `INSERT INTO <table> (<insertable columns>) VALUES (<parameters>)`.
    ///
    /// Identity and read-only columns are left out. Parameters are defined
    /// from the column schema and bound from `values` when given.
    pub fn insert(&self, values: Option<&dyn PropertySource>) -> DbResult<Command> {
        let columns = self.schema.insertable_columns();
        if columns.is_empty() {
            return Err(DbError::configuration(format!(
                "Table '{}' has no insertable columns",
                self.schema.qualified_name()
            )));
        }
        let names: Vec<&str> = columns.iter().map(|c| c.name()).collect();

        let mut source = self
            .connection
            .begin_command_text()
            .insert_into(self.schema.table_name(), self.schema.schema_name())
            .columns(&names)
            .values(&names);
        define_all(&mut source, &columns, ParameterDirection::Input)?;
        if let Some(values) = values {
            params::set_parameters_from_object(&mut source, values)?;
        }
        source.end_command_text()
    }

    /// One page of rows, ordered by key (or by the first column when the
    /// table has no key). `take` of [`UNBOUNDED`](crate::db::dialect::UNBOUNDED) reads to the end.
    pub fn select_page(&self, skip: u64, take: u64) -> DbResult<Command> {
        let keys = self.schema.key_columns();
        let order: Vec<&str> = if keys.is_empty() {
            self.schema.columns().iter().take(1).map(|c| c.name()).collect()
        } else {
            keys.iter().map(|c| c.name()).collect()
        };
        debug!(table = %self.schema.table_name(), skip, take, "Building page query");
        self.select_from()
            .order_by(&order)
            .limit(skip, take)
            .end_command_text()
    }

    /// `CREATE TABLE` statement for this table in the connection's dialect.
    pub fn create_table_ddl(&self) -> String {
        self.connection.dialect().create_table_ddl(&self.schema)
    }
}

fn define_all(
    source: &mut CommandSource,
    columns: &[&ColumnSchema],
    direction: ParameterDirection,
) -> DbResult<()> {
    for column in columns {
        params::define_parameter(source, column, direction)?;
    }
    Ok(())
}

impl Connection {
    /// Table context for a live table. The schema is loaded once per
    /// connection target and cached.
    pub async fn table(
        &self,
        table: &str,
        schema: Option<&str>,
        cancel: &CancellationToken,
    ) -> DbResult<TableContext> {
        TableContext::load(self, table, schema, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_record;
    use crate::record::Params;

    #[derive(Debug, Default)]
    struct Widget {
        widget_id: i64,
        name: String,
        price: Option<f64>,
    }

    impl_record! {
        Widget (table = "Widgets") {
            widget_id: i64 => key().identity(),
            name: String,
            price: Option<f64>,
        }
    }

    #[derive(Debug, Default)]
    struct Tag {
        post_id: i32,
        label: String,
    }

    impl_record! {
        Tag {
            post_id: i32 => key(),
            label: String => key(),
        }
    }

    async fn connection() -> Connection {
        Connection::open("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_select_all() {
        let table = TableContext::for_record::<Widget>(&connection().await).unwrap();
        let command = table.select_all().unwrap();
        assert_eq!(
            command.text(),
            "SELECT \"widget_id\", \"name\", \"price\" FROM \"Widgets\""
        );
        assert!(command.parameters().is_empty());
    }

    #[tokio::test]
    async fn test_select_by_scalar_key() {
        let table = TableContext::for_record::<Widget>(&connection().await).unwrap();
        let command = table.select_by_key(Some(KeyValue::scalar(7i64))).unwrap();
        assert!(command.text().ends_with("WHERE \"widget_id\" = @widget_id"));
        let param = command.parameters().get("widget_id").unwrap();
        assert_eq!(param.value, Value::Int64(7));
        assert!(!param.nullable);
    }

    #[tokio::test]
    async fn test_select_by_composite_key() {
        let table = TableContext::for_record::<Tag>(&connection().await).unwrap();
        let key = Params::new().with("post_id", 1).with("label", "rust").with("extra", 5);
        let command = table.select_by_key(Some(KeyValue::Object(&key))).unwrap();
        assert!(command
            .text()
            .ends_with("WHERE \"post_id\" = @post_id AND \"label\" = @label"));
        assert_eq!(command.parameters().len(), 2);
        assert_eq!(
            command.parameters().get("label").unwrap().value,
            Value::from("rust")
        );

        let err = table.select_by_key(Some(KeyValue::scalar(1))).unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_select_by_key_defines_unbound_parameters() {
        let table = TableContext::for_record::<Widget>(&connection().await).unwrap();
        let command = table.select_by_key(None).unwrap();
        assert!(command.parameters().get("widget_id").unwrap().value.is_null());
    }

    #[tokio::test]
    async fn test_insert_skips_identity() {
        let table = TableContext::for_record::<Widget>(&connection().await).unwrap();
        let widget = Widget {
            widget_id: 99,
            name: "bolt".into(),
            price: Some(1.5),
        };
        let command = table.insert(Some(&widget)).unwrap();
        assert_eq!(
            command.text(),
            "INSERT INTO \"Widgets\" (\"name\", \"price\") VALUES (@name, @price)"
        );
        assert!(command.parameters().get("widget_id").is_none());
        assert_eq!(
            command.parameters().get("price").unwrap().value,
            Value::Float64(1.5)
        );
    }

    #[tokio::test]
    async fn test_select_page_orders_by_key() {
        let table = TableContext::for_record::<Widget>(&connection().await).unwrap();
        let command = table.select_page(20, 10).unwrap();
        assert!(command
            .text()
            .ends_with("ORDER BY \"widget_id\" LIMIT 10 OFFSET 20"));
    }

    #[tokio::test]
    async fn test_create_table_ddl() {
        let table = TableContext::for_record::<Widget>(&connection().await).unwrap();
        let ddl = table.create_table_ddl();
        assert!(ddl.starts_with("CREATE TABLE \"Widgets\" ("));
        assert!(ddl.contains("\"widget_id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(ddl.contains("\"name\" TEXT NOT NULL"));
        assert!(ddl.contains("\"price\" DOUBLE NULL"));
    }
}
