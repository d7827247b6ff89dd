//! Rate records and the abstraction over upstream rate sources

use crate::core::error::RateError;
use crate::store::SqlValue;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Every stored rate is quoted against this currency.
pub const PIVOT_CURRENCY: &str = "EUR";

/// Column order used when inserting a [`RateRecord`].
pub const RATE_COLUMNS: [&str; 4] = [
    "rate_date",
    "base_currency_code",
    "target_currency_code",
    "exchange_rate",
];

/// One persisted EUR -> target rate for a calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateRecord {
    pub rate_date: NaiveDate,
    pub base_currency_code: String,
    pub target_currency_code: String,
    pub exchange_rate: Decimal,
}

impl RateRecord {
    pub fn insert_values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Date(self.rate_date),
            SqlValue::Text(self.base_currency_code.clone()),
            SqlValue::Text(self.target_currency_code.clone()),
            SqlValue::Decimal(self.exchange_rate),
        ]
    }
}

/// A shaped API record: one date, its base, and the raw per-currency rates.
#[derive(Debug, Clone, PartialEq)]
pub struct RatePayload {
    pub date: NaiveDate,
    pub base: String,
    pub rates: BTreeMap<String, Value>,
}

impl RatePayload {
    /// Reads the `date`, `base` and `rates` columns of a shaped row.
    pub fn from_row(row: &Map<String, Value>) -> Result<Self, RateError> {
        let date_text = row
            .get("date")
            .and_then(Value::as_str)
            .ok_or_else(|| RateError::MissingColumn("date".to_string()))?;
        let date = NaiveDate::parse_from_str(date_text, "%Y-%m-%d")
            .map_err(|e| RateError::Format(format!("bad date '{date_text}': {e}")))?;
        let base = row
            .get("base")
            .and_then(Value::as_str)
            .ok_or_else(|| RateError::MissingColumn("base".to_string()))?
            .to_string();
        let rates = match row.get("rates") {
            Some(Value::Object(map)) => map.clone().into_iter().collect(),
            Some(other) => {
                return Err(RateError::Format(format!(
                    "rates must be a mapping, got: {other}"
                )));
            }
            None => return Err(RateError::MissingColumn("rates".to_string())),
        };
        Ok(RatePayload { date, base, rates })
    }

    /// Expands the payload into one record per target currency.
    pub fn records(&self) -> impl Iterator<Item = (String, Result<RateRecord, RateError>)> + '_ {
        self.rates.iter().map(|(target, value)| {
            let record = decimal_from_value(value).map(|exchange_rate| RateRecord {
                rate_date: self.date,
                base_currency_code: self.base.clone(),
                target_currency_code: target.clone(),
                exchange_rate,
            });
            (target.clone(), record)
        })
    }
}

/// Reads a decimal out of a JSON number or numeric string.
///
/// JSON numbers have already been parsed as `f64` by `serde_json`, so they
/// come back in shortest round-trip form (`1.2510` reads as `1.251`). Numeric
/// strings are taken digit for digit.
pub fn decimal_from_value(value: &Value) -> Result<Decimal, RateError> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => {
            return Err(RateError::Format(format!("not a decimal value: {other}")));
        }
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| RateError::Format(format!("not a decimal value '{text}': {e}")))
}

/// Upper-cases a currency code and checks it is three ASCII letters.
pub fn normalize_currency_code(code: &str) -> Result<String, RateError> {
    let code = code.trim();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(RateError::InvalidInput(format!(
            "Currency code must be three letters, got: '{code}'"
        )));
    }
    Ok(code.to_ascii_uppercase())
}

/// Result of asking a rate source for one date.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(Value),
    /// The source answered but holds no rates for the requested date.
    NotFound,
    /// The source could not be reached or answered with something unusable.
    TransientError(String),
}

impl FetchOutcome {
    pub fn into_payload(self) -> Option<Value> {
        match self {
            FetchOutcome::Success(payload) => Some(payload),
            _ => None,
        }
    }
}

#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_for_date(&self, year: i32, month: u32, day: u32) -> FetchOutcome;

    async fn fetch_latest(&self) -> FetchOutcome;
}
