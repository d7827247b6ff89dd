//! Row-oriented table used between repair and load.

use crate::core::error::RateError;
use serde_json::{Map, Value};

/// Columns kept by [`project_columns`].
pub const RATE_TABLE_COLUMNS: [&str; 3] = ["date", "base", "rates"];

/// A list of records sharing a column set. Records missing a column hold
/// `null` for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateTable {
    columns: Vec<String>,
    rows: Vec<Map<String, Value>>,
}

impl RateTable {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Map<String, Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Renders each row as one compact JSON line.
    pub fn to_lines(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| {
                let ordered: Map<String, Value> = self
                    .columns
                    .iter()
                    .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                    .collect();
                Value::Object(ordered).to_string()
            })
            .collect()
    }
}

/// Loads a JSON array of mappings into a table.
pub fn records_to_table(records: &Value) -> Result<RateTable, RateError> {
    let items = match records {
        Value::Array(items) => items,
        Value::Null => {
            return Err(RateError::InvalidInput(
                "Input cannot be empty (null).".to_string(),
            ));
        }
        other => {
            return Err(RateError::InvalidInput(format!(
                "Input must be a list, got: {other}"
            )));
        }
    };

    let mut columns: Vec<String> = Vec::new();
    let mut maps = Vec::with_capacity(items.len());
    for item in items {
        let map = item.as_object().ok_or_else(|| {
            RateError::InvalidInput(format!("Every record must be a mapping, got: {item}"))
        })?;
        for key in map.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
        maps.push(map);
    }

    let rows = maps
        .into_iter()
        .map(|map| {
            columns
                .iter()
                .map(|c| (c.clone(), map.get(c).cloned().unwrap_or(Value::Null)))
                .collect()
        })
        .collect();

    Ok(RateTable { columns, rows })
}

/// Keeps only the `date`, `base` and `rates` columns.
pub fn project_columns(table: &RateTable) -> Result<RateTable, RateError> {
    for required in RATE_TABLE_COLUMNS {
        if !table.columns.iter().any(|c| c == required) {
            return Err(RateError::MissingColumn(required.to_string()));
        }
    }

    let columns: Vec<String> = RATE_TABLE_COLUMNS.iter().map(|c| c.to_string()).collect();
    let rows = table
        .rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                .collect()
        })
        .collect();

    Ok(RateTable { columns, rows })
}
