//! Command text building.
//!
//! [`CommandSource`] is an append-only fluent builder: every method appends a
//! keyword or a quoted fragment using its dialect and returns the builder.
//! [`CommandSource::end_command_text`] consumes it into an executable
//! [`Command`]; execution lives in the executor module.

use crate::db::dialect::DialectProvider;
use crate::db::params::{
    self, Parameter, ParameterCollection, ParameterTarget, parameter_name,
};
use crate::db::pool::Connection;
use crate::error::{DbError, DbResult};
use crate::models::Value;
use crate::record::PropertySource;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Single-use command text accumulator.
#[derive(Debug)]
pub struct CommandSource {
    dialect: Arc<dyn DialectProvider>,
    connection: Option<Connection>,
    text: String,
    parameters: ParameterCollection,
    timeout: Option<Duration>,
}

impl CommandSource {
    /// Start command text on a connection, using its dialect.
    pub fn new(connection: &Connection) -> Self {
        Self {
            dialect: connection.dialect().clone(),
            connection: Some(connection.clone()),
            text: String::new(),
            parameters: ParameterCollection::new(),
            timeout: None,
        }
    }

    /// Start command text for a dialect alone. The result can be rendered
    /// but not turned into an executable command.
    pub fn for_dialect(dialect: Arc<dyn DialectProvider>) -> Self {
        Self {
            dialect,
            connection: None,
            text: String::new(),
            parameters: ParameterCollection::new(),
            timeout: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Append raw text. With `auto_space`, a single space separates it from
    /// existing text that does not already end in whitespace.
    pub fn append_text(mut self, text: &str, auto_space: bool) -> Self {
        self.push(text, auto_space);
        self
    }

    fn push(&mut self, text: &str, auto_space: bool) {
        if text.is_empty() {
            return;
        }
        if auto_space
            && !self.text.is_empty()
            && !self.text.ends_with(char::is_whitespace)
            && !text.starts_with(char::is_whitespace)
        {
            self.text.push(' ');
        }
        self.text.push_str(text);
    }

    fn quote_list(&self, fields: &[&str]) -> String {
        fields
            .iter()
            .map(|f| {
                if f.trim() == "*" {
                    "*".to_string()
                } else {
                    self.dialect.quote_identifier(f)
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `SELECT <fields>`; an empty list selects `*`.
    pub fn select(mut self, fields: &[&str]) -> Self {
        let list = if fields.is_empty() {
            "*".to_string()
        } else {
            self.quote_list(fields)
        };
        self.push("SELECT", true);
        self.push(&list, true);
        self
    }

    pub fn from(mut self, table: &str, schema: Option<&str>) -> Self {
        let table = self.dialect.quote_table(table, schema);
        self.push("FROM", true);
        self.push(&table, true);
        self
    }

    pub fn insert_into(mut self, table: &str, schema: Option<&str>) -> Self {
        let table = self.dialect.quote_table(table, schema);
        self.push("INSERT INTO", true);
        self.push(&table, true);
        self
    }

    /// Parenthesized, quoted column list.
    pub fn columns(mut self, columns: &[&str]) -> Self {
        let list = format!("({})", self.quote_list(columns));
        self.push(&list, true);
        self
    }

    /// `VALUES (<parameters>)` with one parameter per column name.
    pub fn values(mut self, columns: &[&str]) -> Self {
        let list = columns
            .iter()
            .map(|c| self.dialect.quote_parameter(&parameter_name(c)))
            .collect::<Vec<_>>()
            .join(", ");
        self.push("VALUES", true);
        self.push(&format!("({})", list), true);
        self
    }

    /// `WHERE`, followed by `condition` when given.
    pub fn where_clause(mut self, condition: Option<&str>) -> Self {
        self.push("WHERE", true);
        if let Some(condition) = condition {
            self.push(condition, true);
        }
        self
    }

    pub fn and(mut self, condition: Option<&str>) -> Self {
        self.push("AND", true);
        if let Some(condition) = condition {
            self.push(condition, true);
        }
        self
    }

    pub fn or(mut self, condition: Option<&str>) -> Self {
        self.push("OR", true);
        if let Some(condition) = condition {
            self.push(condition, true);
        }
        self
    }

    /// `<field><op_separator><parameter>` pairs joined by `item_separator`.
    /// Both separators are used verbatim, e.g. `(" AND ", " = ")` for a key
    /// lookup or `(", ", " = ")` for an UPDATE set list.
    pub fn fields_and_parameters(
        mut self,
        columns: &[&str],
        item_separator: &str,
        op_separator: &str,
    ) -> Self {
        let pairs = columns
            .iter()
            .map(|c| {
                format!(
                    "{}{}{}",
                    self.dialect.quote_identifier(c),
                    op_separator,
                    self.dialect.quote_parameter(&parameter_name(c))
                )
            })
            .collect::<Vec<_>>()
            .join(item_separator);
        self.push(&pairs, true);
        self
    }

    /// `ORDER BY <fields>`; nothing is appended for an empty list.
    pub fn order_by(mut self, fields: &[&str]) -> Self {
        if fields.is_empty() {
            return self;
        }
        let list = self.quote_list(fields);
        self.push("ORDER BY", true);
        self.push(&list, true);
        self
    }

    /// Append the dialect's pagination clause. See
    /// [`DialectProvider::pagination_clause`].
    pub fn limit(mut self, skip: u64, take: u64) -> Self {
        let clause = self.dialect.pagination_clause(skip, take);
        self.push(&clause, true);
        self
    }

    /// Command timeout; the connection's default applies otherwise.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set a parameter value. See [`params::set_parameter`].
    pub fn with_parameter(mut self, name: &str, value: impl Into<Value>) -> DbResult<Self> {
        params::set_parameter(&mut self, name, value, None, None)?;
        Ok(self)
    }

    /// Bind the referenced properties of `source`. See
    /// [`params::set_parameters_from_object`].
    pub fn with_parameters(mut self, source: &dyn PropertySource) -> DbResult<Self> {
        params::set_parameters_from_object(&mut self, source)?;
        Ok(self)
    }

    /// Finish building. Fails with a configuration error when the builder
    /// has no connection.
    pub fn end_command_text(self) -> DbResult<Command> {
        let connection = self.connection.ok_or_else(|| {
            DbError::configuration("Command text has no connection to execute on")
        })?;
        debug!(sql = %self.text, params = self.parameters.len(), "Command text built");
        Ok(Command {
            timeout: self.timeout.unwrap_or_else(|| connection.command_timeout()),
            connection,
            text: self.text,
            parameters: self.parameters,
            prepared: false,
        })
    }
}

impl ParameterTarget for CommandSource {
    fn dialect(&self) -> &dyn DialectProvider {
        self.dialect.as_ref()
    }

    fn command_text(&self) -> Option<&str> {
        Some(self.text.as_str()).filter(|t| !t.trim().is_empty())
    }

    fn parameters(&self) -> &ParameterCollection {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut ParameterCollection {
        &mut self.parameters
    }
}

impl Connection {
    /// Start building command text on this connection.
    pub fn begin_command_text(&self) -> CommandSource {
        CommandSource::new(self)
    }
}

/// An executable command: text, parameters and the connection to run on.
#[derive(Debug, Clone)]
pub struct Command {
    pub(crate) connection: Connection,
    pub(crate) text: String,
    pub(crate) parameters: ParameterCollection,
    pub(crate) timeout: Duration,
    pub(crate) prepared: bool,
}

impl Command {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn parameters(&self) -> &ParameterCollection {
        &self.parameters
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn set_parameter(&mut self, name: &str, value: impl Into<Value>) -> DbResult<()> {
        params::set_parameter(self, name, value, None, None)
    }

    pub fn set_parameters(&mut self, source: &dyn PropertySource) -> DbResult<usize> {
        params::set_parameters_from_object(self, source)
    }

    /// Drop every parameter and its bound value.
    pub fn clear_parameters(&mut self) {
        self.parameters.clear();
    }

    /// Command text with named parameters rewritten to driver placeholders,
    /// and the parameters to bind in placeholder order.
    pub fn positional(&self) -> DbResult<(String, Vec<Parameter>)> {
        to_positional(&self.text, self.connection.dialect().as_ref(), &self.parameters)
    }
}

impl ParameterTarget for Command {
    fn dialect(&self) -> &dyn DialectProvider {
        self.connection.dialect().as_ref()
    }

    fn command_text(&self) -> Option<&str> {
        Some(self.text.as_str()).filter(|t| !t.trim().is_empty())
    }

    fn parameters(&self) -> &ParameterCollection {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut ParameterCollection {
        &mut self.parameters
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Rewrite named parameter references to positional placeholders.
///
/// String literals, quoted identifiers and comments are copied unchanged.
/// A name referenced twice is bound twice. Referencing a parameter that is
/// not set, or that is output-only, is an invalid argument.
pub fn to_positional(
    text: &str,
    dialect: &dyn DialectProvider,
    parameters: &ParameterCollection,
) -> DbResult<(String, Vec<Parameter>)> {
    let Some(prefix) = dialect.parameter_prefix().chars().next() else {
        return Ok((text.to_string(), Vec::new()));
    };
    let brackets = dialect.quote_prefix() == "[";

    let chars: Vec<char> = text.chars().collect();
    let mut sql = String::with_capacity(text.len());
    let mut bound: Vec<Parameter> = Vec::new();
    let mut i = 0;

    // Copy chars[i..] up to and including the closing delimiter.
    let copy_until = |sql: &mut String, start: usize, close: char| -> usize {
        let mut j = start;
        while j < chars.len() {
            sql.push(chars[j]);
            if chars[j] == close {
                // Doubled delimiter is an escape
                if j + 1 < chars.len() && chars[j + 1] == close && close != ']' {
                    sql.push(chars[j + 1]);
                    j += 2;
                    continue;
                }
                return j + 1;
            }
            j += 1;
        }
        j
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' | '`' => {
                sql.push(c);
                i = copy_until(&mut sql, i + 1, c);
            }
            '[' if brackets => {
                sql.push(c);
                i = copy_until(&mut sql, i + 1, ']');
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    sql.push(chars[i]);
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                sql.push_str("/*");
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    sql.push(chars[i]);
                    i += 1;
                }
                if i < chars.len() {
                    sql.push_str("*/");
                    i += 2;
                }
            }
            c if c == prefix && chars.get(i + 1) == Some(&prefix) => {
                // System variables such as @@IDENTITY
                sql.push(c);
                sql.push(c);
                i += 2;
                while i < chars.len() && is_ident_char(chars[i]) {
                    sql.push(chars[i]);
                    i += 1;
                }
            }
            c if c == prefix
                && chars
                    .get(i + 1)
                    .is_some_and(|n| n.is_alphabetic() || *n == '_') =>
            {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                let parameter = parameters.get(&name).ok_or_else(|| {
                    DbError::invalid_argument(format!(
                        "Parameter '{}{}' is referenced in the command text but not set",
                        prefix, name
                    ))
                })?;
                if !parameter.direction.is_bound() {
                    return Err(DbError::invalid_argument(format!(
                        "Parameter '{}' is {:?} and cannot be bound to a placeholder",
                        parameter.name, parameter.direction
                    )));
                }
                bound.push(parameter.clone());
                sql.push_str(&dialect.positional_placeholder(bound.len()));
                i = end;
            }
            c => {
                sql.push(c);
                i += 1;
            }
        }
    }

    Ok((sql, bound))
}
