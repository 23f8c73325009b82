//! Output formatting for row listings.
//!
//! Rows are rendered from [`DynamicRecord`]s as JSON, an ASCII table (like
//! the MySQL CLI) or a markdown table.

use crate::config::FormatArg;
use crate::db::DynamicRecord;
use serde_json::{Map, Value as JsonValue};
use unicode_width::UnicodeWidthStr;

type JsonRow = Map<String, JsonValue>;

/// Render rows in the requested format.
///
/// `columns` gives the header order; it is used as-is when there are no rows.
pub fn render(
    format: FormatArg,
    columns: &[String],
    records: &[DynamicRecord],
    decode_binary: bool,
    execution_time_ms: u64,
) -> String {
    let rows: Vec<JsonRow> = records.iter().map(|r| r.to_json(decode_binary)).collect();
    let columns: Vec<String> = match records.first() {
        Some(first) => first.names().map(str::to_string).collect(),
        None => columns.to_vec(),
    };
    match format {
        FormatArg::Json => format_as_json(&rows),
        FormatArg::Table => format_as_table(&columns, &rows, execution_time_ms),
        FormatArg::Markdown => format_as_markdown(&columns, &rows),
    }
}

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(arr) => serde_json::to_string(arr).unwrap_or_default(),
        JsonValue::Object(obj) => serde_json::to_string(obj).unwrap_or_default(),
    }
}

pub fn format_as_json(rows: &[JsonRow]) -> String {
    serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string())
}

pub fn format_as_table(columns: &[String], rows: &[JsonRow], execution_time_ms: u64) -> String {
    if columns.is_empty() {
        return "Empty set".to_string();
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.width()).collect();
    for row in rows {
        for (i, col) in columns.iter().enumerate() {
            if let Some(value) = row.get(col) {
                widths[i] = widths[i].max(format_value(value).width());
            }
        }
    }

    let mut output = String::new();
    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    output.push_str(&separator);
    let header: String = columns
        .iter()
        .zip(&widths)
        .map(|(col, w)| format!("| {} ", pad_center(col, *w)))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);
    output.push_str(&separator);

    for row in rows {
        let row_str: String = columns
            .iter()
            .zip(&widths)
            .map(|(col, w)| {
                let value = row.get(col).unwrap_or(&JsonValue::Null);
                let formatted = format_value(value);
                if value.is_number() {
                    format!("| {} ", pad_left(&formatted, *w))
                } else {
                    format!("| {} ", pad_right(&formatted, *w))
                }
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&row_str);
    }

    output.push_str(&separator);

    let row_text = if rows.len() == 1 { "row" } else { "rows" };
    output.push_str(&format!(
        "{} {} in set ({:.2} sec)\n",
        rows.len(),
        row_text,
        execution_time_ms as f64 / 1000.0
    ));

    output
}

pub fn format_as_markdown(columns: &[String], rows: &[JsonRow]) -> String {
    if columns.is_empty() {
        return "*Empty set*".to_string();
    }

    let mut output = String::new();

    let header: String = columns
        .iter()
        .map(|c| format!("| {} ", c))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);

    let sep: String = columns.iter().map(|_| "|---").collect::<String>() + "|\n";
    output.push_str(&sep);

    for row in rows {
        let row_str: String = columns
            .iter()
            .map(|col| {
                let value = row.get(col).unwrap_or(&JsonValue::Null);
                format!("| {} ", format_value(value).replace('|', "\\|"))
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&row_str);
    }

    output.push_str(&format!("\n*{} rows*", rows.len()));

    output
}

// `format!` padding counts chars, not display columns
fn pad_right(s: &str, width: usize) -> String {
    format!("{}{}", s, " ".repeat(width.saturating_sub(s.width())))
}

fn pad_left(s: &str, width: usize) -> String {
    format!("{}{}", " ".repeat(width.saturating_sub(s.width())), s)
}

fn pad_center(s: &str, width: usize) -> String {
    let total = width.saturating_sub(s.width());
    let left = total / 2;
    format!("{}{}{}", " ".repeat(left), s, " ".repeat(total - left))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows() -> Vec<JsonRow> {
        vec![
            json!({"id": 1, "name": "Ada"}).as_object().cloned().unwrap(),
            json!({"id": 22, "name": null}).as_object().cloned().unwrap(),
        ]
    }

    fn columns() -> Vec<String> {
        vec!["id".to_string(), "name".to_string()]
    }

    #[test]
    fn test_format_as_table() {
        let table = format_as_table(&columns(), &rows(), 1500);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "+----+------+");
        assert_eq!(lines[1], "| id | name |");
        assert_eq!(lines[3], "|  1 | Ada  |");
        assert_eq!(lines[4], "| 22 | NULL |");
        assert_eq!(lines[6], "2 rows in set (1.50 sec)");
    }

    #[test]
    fn test_format_as_table_wide_characters() {
        let rows = vec![json!({"name": "日本"}).as_object().cloned().unwrap()];
        let table = format_as_table(&["name".to_string()], &rows, 0);
        assert!(table.contains("| 日本 |"));
    }

    #[test]
    fn test_format_as_markdown() {
        let md = format_as_markdown(&columns(), &rows());
        assert!(md.starts_with("| id | name |\n|---|---|\n| 1 | Ada |\n"));
        assert!(md.ends_with("*2 rows*"));
    }

    #[test]
    fn test_empty_columns() {
        assert_eq!(format_as_table(&[], &[], 0), "Empty set");
        assert_eq!(format_as_markdown(&[], &[]), "*Empty set*");
    }

    #[test]
    fn test_render_json_without_rows() {
        let out = render(FormatArg::Json, &columns(), &[], false, 0);
        assert_eq!(out, "[]");
    }
}
