//! Per-field CSV export of a normalized row.
//!
//! Every sequence field whose first element is a record becomes one file
//! named `<documentId>_<fieldName>.csv`. The header is the first record's
//! keys, unquoted. Every data cell is quoted with embedded quotes doubled.
//! Lines end in CRLF. Later records are assumed to share the first
//! record's shape; keys they lack export as empty cells.

use serde_json::Value;

use crate::normalize::{value_text, Row};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvFile {
    pub file_name: String,
    pub field: String,
    pub contents: String,
}

/// Quotes one data cell.
pub fn quote_cell(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

/// Renders one list of records, or `None` when the list is empty or its
/// first element is not a record.
pub fn render_records(records: &[Value]) -> Option<String> {
    let headers: Vec<&str> = match records.first()? {
        Value::Object(first) => first.keys().map(String::as_str).collect(),
        _ => return None,
    };

    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(headers.join(","));
    for record in records {
        let cells: Vec<String> = headers
            .iter()
            .map(|h| {
                let text = record.get(*h).map(value_text).unwrap_or_default();
                quote_cell(&text)
            })
            .collect();
        lines.push(cells.join(","));
    }
    Some(lines.join("\r\n"))
}

/// Exports every record-list field of `row`, one file per field.
pub fn export_row(row: &Row) -> Vec<CsvFile> {
    row.sequences()
        .filter_map(|(field, items)| {
            render_records(items).map(|contents| CsvFile {
                file_name: format!("{}_{}.csv", row.id, field),
                field: field.to_string(),
                contents,
            })
        })
        .collect()
}
