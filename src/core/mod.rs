//! Core business logic abstractions

pub mod config;
pub mod conversion;
pub mod date;
pub mod error;
pub mod log;
pub mod rate;
pub mod repair;
pub mod table;

// Re-export main types for cleaner imports
pub use conversion::ConversionService;
pub use error::RateError;
pub use rate::{FetchOutcome, RatePayload, RateRecord, RateSource};
pub use table::RateTable;
