//! Command handlers and terminal rendering.

pub mod convert;
pub mod db;
pub mod fetch;
pub mod rates;
pub mod setup;
pub mod ui;
