//! SQL dialects.
//!
//! A [`DialectProvider`] is the per-engine policy object used by the command
//! builder, the parameter binder and DDL generation: identifier quoting,
//! parameter prefixing, pagination and identity-column syntax. Providers are
//! stateless and shared; a [`DialectRegistry`] resolves them by driver kind.

use crate::db::types::{
    MySqlTypeMapper, PostgresTypeMapper, SqlServerTypeMapper, SqliteTypeMapper, TypeMapper,
};
use crate::error::{DbError, DbResult};
use crate::models::{ColumnSchema, DbType, DriverKind, HostType, PropertyType, TableSchema};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use std::time::Duration;

/// Take value meaning "no upper bound" for pagination.
pub const UNBOUNDED: u64 = u64::MAX;

/// Keywords that end the type part of a column declaration.
const CONSTRAINT_KEYWORDS: &[&str] = &[
    "NOT",
    "NULL",
    "PRIMARY",
    "IDENTITY",
    "AUTO_INCREMENT",
    "AUTOINCREMENT",
    "DEFAULT",
    "UNIQUE",
    "REFERENCES",
    "CHECK",
];

/// A column fragment parsed back from DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDeclaration {
    pub name: String,
    pub type_name: String,
    pub host_type: Option<HostType>,
    pub nullable: bool,
    pub is_key: bool,
    pub is_auto_increment: bool,
}

/// Engine-specific SQL syntax rules.
pub trait DialectProvider: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn driver(&self) -> DriverKind;

    fn quote_prefix(&self) -> &'static str;

    fn quote_suffix(&self) -> &'static str;

    fn type_mapper(&self) -> &dyn TypeMapper;

    /// Pagination clause for `skip`/`take`. Empty when there is nothing to
    /// page (`skip == 0` and `take == UNBOUNDED`).
    fn pagination_clause(&self, skip: u64, take: u64) -> String;

    /// Column fragment for an auto-increment primary key.
    fn identity_column_ddl(&self, column: &ColumnSchema) -> String;

    fn parameter_prefix(&self) -> &'static str {
        "@"
    }

    fn schema_separator(&self) -> &'static str {
        "."
    }

    fn default_command_timeout(&self) -> Duration {
        Duration::from_secs(crate::config::DEFAULT_COMMAND_TIMEOUT_SECS)
    }

    /// Driver placeholder for the `index`-th bound value (1-based).
    fn positional_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// Wrap a name in quote characters. Already quoted names are returned
    /// trimmed and unchanged.
    fn quote_identifier(&self, name: &str) -> String {
        let name = name.trim();
        let (prefix, suffix) = (self.quote_prefix(), self.quote_suffix());
        if name.len() >= prefix.len() + suffix.len()
            && name.starts_with(prefix)
            && name.ends_with(suffix)
        {
            return name.to_string();
        }
        let escaped = name.replace(suffix, &format!("{}{}", suffix, suffix));
        format!("{}{}{}", prefix, escaped, suffix)
    }

    /// Schema-qualified, quoted table reference.
    fn quote_table(&self, table: &str, schema: Option<&str>) -> String {
        match schema.map(str::trim).filter(|s| !s.is_empty()) {
            Some(schema) => format!(
                "{}{}{}",
                self.quote_identifier(schema),
                self.schema_separator(),
                self.quote_identifier(table)
            ),
            None => self.quote_identifier(table),
        }
    }

    /// Prefix a parameter name. Already prefixed names are returned trimmed.
    fn quote_parameter(&self, name: &str) -> String {
        let name = name.trim();
        if name.starts_with(self.parameter_prefix()) {
            name.to_string()
        } else {
            format!("{}{}", self.parameter_prefix(), name)
        }
    }

    /// Strip the parameter prefix. Bare names are returned trimmed.
    fn unquote_parameter(&self, name: &str) -> String {
        let name = name.trim();
        name.strip_prefix(self.parameter_prefix())
            .unwrap_or(name)
            .to_string()
    }

    /// Provider type declaration for a column, honouring its length and
    /// precision. Unmapped host types fall back to the textual type.
    fn column_type_declaration(&self, column: &ColumnSchema) -> String {
        let mapper = self.type_mapper();
        let ty = PropertyType {
            host: column.data_type(),
            nullable: column.allows_null(),
        };
        let Some(mut provider) = mapper
            .provider_type(ty)
            .or_else(|| mapper.provider_type(PropertyType::required(HostType::String)))
        else {
            return column.provider_type_name().to_string();
        };
        match provider.db_type {
            DbType::String | DbType::Binary => {
                if let Some(len) = column.max_length() {
                    provider.size = Some(len);
                }
            }
            DbType::Decimal => {
                if let Some(p) = column.precision() {
                    provider.precision = Some(p);
                    provider.scale = column.scale();
                }
            }
            _ => {}
        }
        mapper.declaration(&provider)
    }

    /// Column fragment: `<name> <type> [NOT] NULL`, or the identity idiom for
    /// a sole key-and-identity column.
    fn column_ddl(&self, column: &ColumnSchema) -> String {
        if column.is_unique() {
            return self.identity_column_ddl(column);
        }
        format!(
            "{} {} {}",
            self.quote_identifier(column.name()),
            self.column_type_declaration(column),
            if column.allows_null() { "NULL" } else { "NOT NULL" }
        )
    }

    fn create_table_ddl(&self, schema: &TableSchema) -> String {
        let mut lines: Vec<String> = schema
            .columns()
            .iter()
            .map(|c| self.column_ddl(c))
            .collect();

        let has_identity_key = schema.columns().iter().any(|c| c.is_unique());
        let keys = schema.key_columns();
        if !has_identity_key && !keys.is_empty() {
            let names: Vec<String> = keys
                .iter()
                .map(|c| self.quote_identifier(c.name()))
                .collect();
            lines.push(format!("PRIMARY KEY ({})", names.join(", ")));
        }

        format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.quote_table(schema.table_name(), schema.schema_name()),
            lines.join(",\n    ")
        )
    }

    /// Parse a column fragment produced by [`column_ddl`](Self::column_ddl).
    fn parse_column_ddl(&self, fragment: &str) -> Option<ColumnDeclaration> {
        let fragment = fragment.trim().trim_end_matches(',');
        let (prefix, suffix) = (self.quote_prefix(), self.quote_suffix());

        let (name, rest) = if let Some(quoted) = fragment.strip_prefix(prefix) {
            let end = quoted.find(suffix)?;
            (quoted[..end].to_string(), &quoted[end + suffix.len()..])
        } else {
            let mut parts = fragment.splitn(2, char::is_whitespace);
            (parts.next()?.to_string(), parts.next().unwrap_or(""))
        };
        if name.is_empty() {
            return None;
        }

        let tokens: Vec<&str> = rest.split_whitespace().collect();
        let type_end = tokens
            .iter()
            .position(|t| CONSTRAINT_KEYWORDS.contains(&t.to_uppercase().as_str()))
            .unwrap_or(tokens.len());
        let type_name = tokens[..type_end].join(" ");
        if type_name.is_empty() {
            return None;
        }

        let constraints = tokens[type_end..].join(" ").to_uppercase();
        let upper_type = type_name.to_uppercase();
        let is_key = constraints.contains("PRIMARY KEY");
        let is_auto_increment = constraints.contains("IDENTITY")
            || constraints.contains("AUTO_INCREMENT")
            || constraints.contains("AUTOINCREMENT")
            || upper_type.ends_with("SERIAL");

        Some(ColumnDeclaration {
            host_type: self.type_mapper().host_type(&type_name),
            nullable: !constraints.contains("NOT NULL") && !is_key,
            name,
            type_name,
            is_key,
            is_auto_increment,
        })
    }
}

// =============================================================================
// Built-in dialects
// =============================================================================

#[derive(Debug, Default)]
pub struct SqlServerDialect {
    types: SqlServerTypeMapper,
}

impl DialectProvider for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn driver(&self) -> DriverKind {
        DriverKind::SqlServer
    }

    fn quote_prefix(&self) -> &'static str {
        "["
    }

    fn quote_suffix(&self) -> &'static str {
        "]"
    }

    fn type_mapper(&self) -> &dyn TypeMapper {
        &self.types
    }

    fn pagination_clause(&self, skip: u64, take: u64) -> String {
        match (skip, take) {
            (0, UNBOUNDED) => String::new(),
            (skip, UNBOUNDED) => format!("OFFSET {} ROWS", skip),
            (skip, take) => format!("OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", skip, take),
        }
    }

    fn identity_column_ddl(&self, column: &ColumnSchema) -> String {
        format!(
            "{} {} IDENTITY(1,1) NOT NULL PRIMARY KEY",
            self.quote_identifier(column.name()),
            self.column_type_declaration(column)
        )
    }
}

#[derive(Debug, Default)]
pub struct MySqlDialect {
    types: MySqlTypeMapper,
}

impl DialectProvider for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn driver(&self) -> DriverKind {
        DriverKind::MySql
    }

    fn quote_prefix(&self) -> &'static str {
        "`"
    }

    fn quote_suffix(&self) -> &'static str {
        "`"
    }

    fn type_mapper(&self) -> &dyn TypeMapper {
        &self.types
    }

    /// `@name` is a MySQL user variable, so named parameters use `?name`.
    fn parameter_prefix(&self) -> &'static str {
        "?"
    }

    fn pagination_clause(&self, skip: u64, take: u64) -> String {
        match (skip, take) {
            (0, UNBOUNDED) => String::new(),
            // MySQL has no OFFSET without LIMIT; the largest row count stands in
            (skip, take) => format!("LIMIT {} OFFSET {}", take, skip),
        }
    }

    fn identity_column_ddl(&self, column: &ColumnSchema) -> String {
        format!(
            "{} {} NOT NULL AUTO_INCREMENT PRIMARY KEY",
            self.quote_identifier(column.name()),
            self.column_type_declaration(column)
        )
    }
}

#[derive(Debug, Default)]
pub struct SqliteDialect {
    types: SqliteTypeMapper,
}

impl DialectProvider for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn driver(&self) -> DriverKind {
        DriverKind::Sqlite
    }

    fn quote_prefix(&self) -> &'static str {
        "\""
    }

    fn quote_suffix(&self) -> &'static str {
        "\""
    }

    fn type_mapper(&self) -> &dyn TypeMapper {
        &self.types
    }

    fn pagination_clause(&self, skip: u64, take: u64) -> String {
        match (skip, take) {
            (0, UNBOUNDED) => String::new(),
            (skip, UNBOUNDED) => format!("LIMIT -1 OFFSET {}", skip),
            (skip, take) => format!("LIMIT {} OFFSET {}", take, skip),
        }
    }

    /// AUTOINCREMENT is only valid on an `INTEGER PRIMARY KEY` column.
    fn identity_column_ddl(&self, column: &ColumnSchema) -> String {
        format!(
            "{} INTEGER PRIMARY KEY AUTOINCREMENT",
            self.quote_identifier(column.name())
        )
    }
}

#[derive(Debug, Default)]
pub struct PostgresDialect {
    types: PostgresTypeMapper,
}

impl DialectProvider for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn driver(&self) -> DriverKind {
        DriverKind::Postgres
    }

    fn quote_prefix(&self) -> &'static str {
        "\""
    }

    fn quote_suffix(&self) -> &'static str {
        "\""
    }

    fn type_mapper(&self) -> &dyn TypeMapper {
        &self.types
    }

    fn positional_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn pagination_clause(&self, skip: u64, take: u64) -> String {
        match (skip, take) {
            (0, UNBOUNDED) => String::new(),
            (skip, UNBOUNDED) => format!("OFFSET {}", skip),
            (skip, take) => format!("LIMIT {} OFFSET {}", take, skip),
        }
    }

    fn identity_column_ddl(&self, column: &ColumnSchema) -> String {
        let serial = match column.data_type() {
            HostType::Int16 => "SMALLSERIAL",
            HostType::Int64 => "BIGSERIAL",
            _ => "SERIAL",
        };
        format!(
            "{} {} PRIMARY KEY",
            self.quote_identifier(column.name()),
            serial
        )
    }
}

// =============================================================================
// Registry
// =============================================================================

static GLOBAL_REGISTRY: LazyLock<DialectRegistry> = LazyLock::new(DialectRegistry::with_builtins);

/// Dialect providers keyed by driver kind.
#[derive(Debug, Default)]
pub struct DialectRegistry {
    providers: RwLock<HashMap<DriverKind, Arc<dyn DialectProvider>>>,
}

impl DialectRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the SQL Server, MySQL, SQLite and PostgreSQL dialects.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(SqlServerDialect::default()));
        registry.register(Arc::new(MySqlDialect::default()));
        registry.register(Arc::new(SqliteDialect::default()));
        registry.register(Arc::new(PostgresDialect::default()));
        registry
    }

    /// The process-wide registry, initialised with the built-in dialects.
    pub fn global() -> &'static DialectRegistry {
        &GLOBAL_REGISTRY
    }

    /// Register a provider for its driver kind, replacing any existing one.
    pub fn register(&self, provider: Arc<dyn DialectProvider>) {
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        providers.insert(provider.driver(), provider);
    }

    /// Resolve the provider for a driver kind.
    pub fn resolve(&self, driver: DriverKind) -> DbResult<Arc<dyn DialectProvider>> {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        providers.get(&driver).cloned().ok_or_else(|| {
            DbError::configuration(format!(
                "No dialect provider registered for {}",
                driver.display_name()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all() -> Vec<Arc<dyn DialectProvider>> {
        let registry = DialectRegistry::with_builtins();
        [
            DriverKind::SqlServer,
            DriverKind::MySql,
            DriverKind::Sqlite,
            DriverKind::Postgres,
        ]
        .into_iter()
        .map(|d| registry.resolve(d).unwrap())
        .collect()
    }

    #[test]
    fn test_quote_identifier() {
        let sqlserver = SqlServerDialect::default();
        assert_eq!(sqlserver.quote_identifier("Users"), "[Users]");
        assert_eq!(sqlserver.quote_identifier(" [Users] "), "[Users]");
        assert_eq!(MySqlDialect::default().quote_identifier("Users"), "`Users`");
        assert_eq!(SqliteDialect::default().quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_quote_table_with_schema() {
        let sqlserver = SqlServerDialect::default();
        assert_eq!(sqlserver.quote_table("Users", Some("dbo")), "[dbo].[Users]");
        assert_eq!(sqlserver.quote_table("Users", Some("")), "[Users]");
        assert_eq!(
            PostgresDialect::default().quote_table("users", Some("public")),
            "\"public\".\"users\""
        );
    }

    #[test]
    fn test_parameter_quoting_is_idempotent() {
        for dialect in all() {
            for name in ["id", "@id", "?id", "  name  ", ""] {
                assert_eq!(
                    dialect.quote_parameter(&dialect.unquote_parameter(name)),
                    dialect.quote_parameter(name),
                    "{} / {:?}",
                    dialect.name(),
                    name
                );
            }
            let quoted = dialect.quote_parameter("UserId");
            assert_eq!(dialect.quote_parameter(&quoted), quoted);
            assert_eq!(dialect.unquote_parameter("UserId"), "UserId");
        }
    }

    #[test]
    fn test_pagination_unbounded_is_empty() {
        for dialect in all() {
            assert_eq!(dialect.pagination_clause(0, UNBOUNDED), "", "{}", dialect.name());
        }
    }

    #[test]
    fn test_pagination_clauses() {
        assert_eq!(
            MySqlDialect::default().pagination_clause(10, 5),
            "LIMIT 5 OFFSET 10"
        );
        assert_eq!(
            SqliteDialect::default().pagination_clause(10, 5),
            "LIMIT 5 OFFSET 10"
        );
        assert_eq!(
            SqlServerDialect::default().pagination_clause(10, 5),
            "OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"
        );
        assert_eq!(
            SqliteDialect::default().pagination_clause(3, UNBOUNDED),
            "LIMIT -1 OFFSET 3"
        );
        assert_eq!(PostgresDialect::default().pagination_clause(3, UNBOUNDED), "OFFSET 3");
    }

    #[test]
    fn test_identity_ddl() {
        let id = ColumnSchema::new("Id", 0, HostType::Int64, "BIGINT")
            .with_nullable(false)
            .with_key(true)
            .with_auto_increment(true);
        assert_eq!(
            SqlServerDialect::default().identity_column_ddl(&id),
            "[Id] BIGINT IDENTITY(1,1) NOT NULL PRIMARY KEY"
        );
        assert_eq!(
            MySqlDialect::default().identity_column_ddl(&id),
            "`Id` BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY"
        );
        assert_eq!(
            SqliteDialect::default().identity_column_ddl(&id),
            "\"Id\" INTEGER PRIMARY KEY AUTOINCREMENT"
        );
        assert_eq!(
            PostgresDialect::default().identity_column_ddl(&id),
            "\"Id\" BIGSERIAL PRIMARY KEY"
        );
    }

    #[test]
    fn test_create_table_ddl() {
        let schema = TableSchema::new(
            "app",
            "Users",
            Some("dbo".into()),
            vec![
                ColumnSchema::new("Id", 0, HostType::Int32, "INT")
                    .with_nullable(false)
                    .with_key(true)
                    .with_auto_increment(true),
                ColumnSchema::new("Name", 1, HostType::String, "NVARCHAR")
                    .with_nullable(false)
                    .with_max_length(Some(100)),
                ColumnSchema::new("Balance", 2, HostType::Decimal, "DECIMAL")
                    .with_precision(Some(10), Some(2)),
            ],
        )
        .unwrap();

        let ddl = SqlServerDialect::default().create_table_ddl(&schema);
        assert_eq!(
            ddl,
            "CREATE TABLE [dbo].[Users] (\n    \
             [Id] INT IDENTITY(1,1) NOT NULL PRIMARY KEY,\n    \
             [Name] NVARCHAR(100) NOT NULL,\n    \
             [Balance] DECIMAL(10,2) NULL\n)"
        );
    }

    #[test]
    fn test_composite_key_constraint() {
        let schema = TableSchema::new(
            "app",
            "OrderLines",
            None,
            vec![
                ColumnSchema::new("OrderId", 0, HostType::Int32, "INT")
                    .with_nullable(false)
                    .with_key(true),
                ColumnSchema::new("LineNo", 1, HostType::Int32, "INT")
                    .with_nullable(false)
                    .with_key(true),
            ],
        )
        .unwrap();
        let ddl = MySqlDialect::default().create_table_ddl(&schema);
        assert!(ddl.ends_with("PRIMARY KEY (`OrderId`, `LineNo`)\n)"));
    }

    #[test]
    fn test_parse_column_ddl() {
        let dialect = PostgresDialect::default();
        let parsed = dialect
            .parse_column_ddl("\"Total\" DOUBLE PRECISION NOT NULL")
            .unwrap();
        assert_eq!(parsed.name, "Total");
        assert_eq!(parsed.type_name, "DOUBLE PRECISION");
        assert_eq!(parsed.host_type, Some(HostType::Float64));
        assert!(!parsed.nullable);

        let id = dialect.parse_column_ddl("\"Id\" SERIAL PRIMARY KEY").unwrap();
        assert!(id.is_key && id.is_auto_increment);
        assert_eq!(id.host_type, Some(HostType::Int32));

        assert!(dialect.parse_column_ddl("\"Broken\"").is_none());
    }

    #[test]
    fn test_resolve_unregistered_is_configuration_error() {
        let registry = DialectRegistry::new();
        let err = registry.resolve(DriverKind::MySql).unwrap_err();
        assert!(matches!(err, DbError::Configuration { .. }));

        registry.register(Arc::new(MySqlDialect::default()));
        assert_eq!(registry.resolve(DriverKind::MySql).unwrap().name(), "mysql");
    }

    #[test]
    fn test_global_registry_has_builtins() {
        let dialect = DialectRegistry::global().resolve(DriverKind::Sqlite).unwrap();
        assert_eq!(dialect.quote_prefix(), "\"");
        assert_eq!(dialect.default_command_timeout(), Duration::from_secs(30));
    }
}
