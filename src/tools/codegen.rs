//! Record type generation.
//!
//! Renders a Rust struct and its `impl_record!` invocation from a
//! [`TableSchema`], with humanized doc comments.

use crate::models::{ColumnSchema, HostType, TableSchema};
use std::fmt::Write;

/// Generate Rust source for a record type mapping `schema`.
///
/// `type_name` defaults to the table name in PascalCase. Field names are the
/// snake_case column names; a `column(..)` annotation is added whenever that
/// differs from the column name.
pub fn generate_record(schema: &TableSchema, type_name: Option<&str>) -> String {
    let type_name = type_name
        .map(str::to_string)
        .unwrap_or_else(|| pascal_case(schema.table_name()));
    let fields: Vec<(String, &ColumnSchema)> = schema
        .columns()
        .iter()
        .enumerate()
        .map(|(i, c)| (field_name(c.name(), i), c))
        .collect();

    let mut out = String::new();
    let _ = writeln!(out, "/// {}.", humanize(schema.table_name()));
    let _ = writeln!(out, "#[derive(Debug, Clone, Default, PartialEq)]");
    let _ = writeln!(out, "pub struct {} {{", type_name);
    for (field, column) in &fields {
        let _ = writeln!(out, "    /// {}.", humanize(column.name()));
        let _ = writeln!(out, "    pub {}: {},", field, field_type(column));
    }
    let _ = writeln!(out, "}}");
    let _ = writeln!(out);

    let mut attrs = vec![format!("table = {:?}", schema.table_name())];
    if let Some(ns) = schema.schema_name() {
        attrs.push(format!("schema = {:?}", ns));
    }
    let _ = writeln!(out, "impl_record! {{");
    let _ = writeln!(out, "    {} ({}) {{", type_name, attrs.join(", "));
    for (field, column) in &fields {
        let annotations = annotations(field, column);
        if annotations.is_empty() {
            let _ = writeln!(out, "        {}: {},", field, field_type(column));
        } else {
            let _ = writeln!(
                out,
                "        {}: {} => {},",
                field,
                field_type(column),
                annotations.join(".")
            );
        }
    }
    let _ = writeln!(out, "    }}");
    let _ = writeln!(out, "}}");
    out
}

fn field_type(column: &ColumnSchema) -> String {
    let base = match column.data_type() {
        HostType::Decimal => "rust_decimal::Decimal",
        HostType::Uuid => "uuid::Uuid",
        HostType::Date => "chrono::NaiveDate",
        HostType::Time => "chrono::NaiveTime",
        HostType::DateTime => "chrono::NaiveDateTime",
        HostType::Json => "serde_json::Value",
        HostType::Other(_) => "String",
        other => other.rust_name(),
    };
    if column.allows_null() {
        format!("Option<{}>", base)
    } else {
        base.to_string()
    }
}

fn annotations(field: &str, column: &ColumnSchema) -> Vec<String> {
    let mut out = Vec::new();
    if field != column.name() {
        out.push(format!("column({:?})", column.name()));
    }
    if column.is_key() {
        out.push("key()".to_string());
    }
    if column.is_auto_increment() {
        out.push("identity()".to_string());
    } else if column.is_read_only() {
        out.push("read_only()".to_string());
    }
    if let Some(len) = column.max_length() {
        out.push(format!("max_length({})", len));
    }
    if let (Some(p), Some(s)) = (column.precision(), column.scale()) {
        out.push(format!("precision({}, {})", p, s));
    }
    out
}

/// Split an identifier into lowercase words at `_`, spaces, dashes and
/// lower-to-upper case changes.
fn words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in name.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// `OrderLines` / `order_lines` -> `Order lines`.
pub fn humanize(name: &str) -> String {
    let sentence = words(name).join(" ");
    let mut chars = sentence.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn pascal_case(name: &str) -> String {
    let out: String = words(name)
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();
    match out.chars().next() {
        None => "Record".to_string(),
        Some(c) if c.is_ascii_digit() => format!("T{}", out),
        Some(_) => out,
    }
}

fn field_name(column: &str, index: usize) -> String {
    let name = words(column).join("_");
    match name.chars().next() {
        None => format!("field_{}", index),
        Some(c) if c.is_ascii_digit() => format!("_{}", name),
        Some(_) if is_keyword(&name) => format!("r#{}", name),
        Some(_) => name,
    }
}

fn is_keyword(name: &str) -> bool {
    matches!(
        name,
        "as" | "async" | "await" | "break" | "const" | "continue" | "crate" | "dyn" | "else"
            | "enum" | "extern" | "false" | "fn" | "for" | "if" | "impl" | "in" | "let"
            | "loop" | "match" | "mod" | "move" | "mut" | "pub" | "ref" | "return" | "static"
            | "struct" | "trait" | "true" | "type" | "unsafe" | "use" | "where" | "while"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TableSchema {
        TableSchema::new(
            "shop",
            "OrderLines",
            Some("sales".to_string()),
            vec![
                ColumnSchema::new("OrderLineId", 0, HostType::Int64, "BIGINT")
                    .with_nullable(false)
                    .with_key(true)
                    .with_auto_increment(true),
                ColumnSchema::new("product_name", 1, HostType::String, "VARCHAR(80)")
                    .with_nullable(false)
                    .with_max_length(Some(80)),
                ColumnSchema::new("UnitPrice", 2, HostType::Decimal, "DECIMAL(10,2)")
                    .with_precision(Some(10), Some(2)),
                ColumnSchema::new("type", 3, HostType::String, "TEXT"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize("OrderLines"), "Order lines");
        assert_eq!(humanize("order_line_id"), "Order line id");
        assert_eq!(humanize("HTTPStatus"), "Httpstatus");
        assert_eq!(humanize(""), "");
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("order_lines"), "OrderLines");
        assert_eq!(pascal_case("customer"), "Customer");
        assert_eq!(pascal_case("2024_sales"), "T2024Sales");
    }

    #[test]
    fn test_generate_record() {
        let code = generate_record(&schema(), None);
        assert!(code.starts_with("/// Order lines.\n"));
        assert!(code.contains("pub struct OrderLines {"));
        assert!(code.contains("    pub order_line_id: i64,"));
        assert!(code.contains("    pub unit_price: Option<rust_decimal::Decimal>,"));
        assert!(code.contains("    OrderLines (table = \"OrderLines\", schema = \"sales\") {"));
        assert!(code.contains(
            "        order_line_id: i64 => column(\"OrderLineId\").key().identity(),"
        ));
        assert!(code.contains("        product_name: String => max_length(80),"));
        assert!(code.contains(
            "        unit_price: Option<rust_decimal::Decimal> => column(\"UnitPrice\").precision(10, 2),"
        ));
        assert!(code.contains("        r#type: Option<String> => column(\"type\"),"));
    }

    #[test]
    fn test_generate_record_custom_name() {
        let code = generate_record(&schema(), Some("Line"));
        assert!(code.contains("pub struct Line {"));
        assert!(code.contains("    Line (table = \"OrderLines\""));
    }
}
