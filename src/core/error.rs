//! Error types shared by the rate pipeline and the conversion service.

use crate::store::StoreError;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RateError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid JSON format: {0}")]
    Format(String),

    #[error("Required column '{0}' not found in table")]
    MissingColumn(String),

    #[error("No exchange rate found for date: {date} and target currency: {currency}")]
    NotFound { date: NaiveDate, currency: String },

    #[error("Found {count} exchange rates for date: {date} and target currency: {currency}")]
    AmbiguousRate {
        date: NaiveDate,
        currency: String,
        count: usize,
    },

    #[error("Exchange rate from EUR to {currency} is zero, cannot convert")]
    ZeroRate { currency: String },

    #[error("{0}")]
    Usage(String),

    #[error("Arithmetic overflow while converting {0}")]
    Arithmetic(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
