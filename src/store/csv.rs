//! Append-only flat-file sink.
//!
//! Every value lands on its own line. There is no header and no quoting, so a
//! value containing a newline spans several lines when read back.

use crate::core::table::RateTable;
use crate::store::StoreError;
use csv::{QuoteStyle, WriterBuilder};
use serde_json::{Map, Value};
use std::fs::{self, OpenOptions};
use std::path::Path;
use tracing::debug;

fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Appends each value as one line. Empty values and bare newlines are
/// skipped; other whitespace is written as is. Returns the number of lines
/// written.
pub fn append_values<S: AsRef<str>>(path: &Path, values: &[S]) -> Result<usize, StoreError> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Never)
        .from_writer(file);

    let mut written = 0;
    for value in values {
        let value = value.as_ref();
        if value.is_empty() || value == "\n" {
            continue;
        }
        writer.write_record([value])?;
        written += 1;
    }
    writer.flush()?;
    debug!("Appended {} lines to {}", written, path.display());
    Ok(written)
}

/// Appends the non-null values of a mapping, one per line.
pub fn append_mapping(path: &Path, mapping: &Map<String, Value>) -> Result<usize, StoreError> {
    let values: Vec<String> = mapping.values().filter_map(render).collect();
    append_values(path, &values)
}

/// Appends the non-null values of every mapping, one per line.
pub fn append_mappings(path: &Path, mappings: &[Map<String, Value>]) -> Result<usize, StoreError> {
    let values: Vec<String> = mappings
        .iter()
        .flat_map(|m| m.values().filter_map(render))
        .collect();
    append_values(path, &values)
}

/// Appends each table row as one compact JSON line.
pub fn append_table(path: &Path, table: &RateTable) -> Result<usize, StoreError> {
    append_values(path, &table.to_lines())
}

pub fn read_to_string(path: &Path) -> Result<String, StoreError> {
    Ok(fs::read_to_string(path)?)
}
