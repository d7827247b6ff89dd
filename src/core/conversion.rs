//! Currency conversion against stored EUR-pivoted rates.
//!
//! Every rate in the store is quoted as EUR -> X, so a conversion between two
//! non-EUR currencies always takes two hops through EUR. No rounding is
//! applied; callers round for display.

use crate::core::error::RateError;
use crate::core::rate::{PIVOT_CURRENCY, decimal_from_value, normalize_currency_code};
use crate::store::{Gateway, SqlValue, validate_identifier};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

pub struct ConversionService {
    gateway: Arc<dyn Gateway>,
    table: String,
}

impl ConversionService {
    pub fn new(gateway: Arc<dyn Gateway>, table: &str) -> Result<Self, RateError> {
        let table = validate_identifier(table)?.to_string();
        Ok(Self { gateway, table })
    }

    /// Looks up the EUR -> `target_code` rate stored for `date`.
    pub async fn get_rate(&self, date: NaiveDate, target_code: &str) -> Result<Decimal, RateError> {
        let target_code = normalize_currency_code(target_code)?;
        let sql = format!(
            "SELECT exchange_rate FROM {} WHERE rate_date = {} AND target_currency_code = {} \
             AND base_currency_code = {}",
            self.table,
            self.gateway.placeholder(1),
            self.gateway.placeholder(2),
            self.gateway.placeholder(3)
        );
        let params = [
            SqlValue::Date(date),
            SqlValue::Text(target_code.clone()),
            SqlValue::Text(PIVOT_CURRENCY.to_string()),
        ];
        let rows = self.gateway.fetch(&sql, &params).await?;

        match rows.as_slice() {
            [] => Err(RateError::NotFound {
                date,
                currency: target_code,
            }),
            [row] => {
                let value = row.get("exchange_rate").ok_or_else(|| {
                    RateError::MissingColumn("exchange_rate".to_string())
                })?;
                let rate = decimal_from_value(value)?;
                debug!("Retrieved exchange rate (EUR to {target_code}) for {date}: {rate}");
                Ok(rate)
            }
            _ => Err(RateError::AmbiguousRate {
                date,
                currency: target_code,
                count: rows.len(),
            }),
        }
    }

    /// EUR -> `target_code`.
    pub async fn convert(
        &self,
        amount: Decimal,
        target_code: &str,
        date: NaiveDate,
    ) -> Result<Decimal, RateError> {
        let rate = self.get_rate(date, target_code).await?;
        amount
            .checked_mul(rate)
            .ok_or_else(|| RateError::Arithmetic(format!("{amount} EUR to {target_code}")))
    }

    /// `base_code` -> EUR.
    pub async fn convert_to_eur(
        &self,
        amount: Decimal,
        base_code: &str,
        date: NaiveDate,
    ) -> Result<Decimal, RateError> {
        let rate = self.get_rate(date, base_code).await?;
        if rate.is_zero() {
            return Err(RateError::ZeroRate {
                currency: base_code.to_ascii_uppercase(),
            });
        }
        amount
            .checked_div(rate)
            .ok_or_else(|| RateError::Arithmetic(format!("{amount} {base_code} to EUR")))
    }

    /// `base_code` -> EUR -> `target_code`, for two non-EUR currencies.
    pub async fn convert_cross(
        &self,
        amount: Decimal,
        base_code: &str,
        target_code: &str,
        date: NaiveDate,
    ) -> Result<Decimal, RateError> {
        let base = normalize_currency_code(base_code)?;
        let target = normalize_currency_code(target_code)?;
        if base == PIVOT_CURRENCY || target == PIVOT_CURRENCY {
            return Err(RateError::Usage(
                "Cross conversion is for two non-EUR currencies. Use convert or convert_to_eur instead."
                    .to_string(),
            ));
        }

        let base_rate = self.get_rate(date, &base).await?;
        let target_rate = self.get_rate(date, &target).await?;
        if base_rate.is_zero() {
            return Err(RateError::ZeroRate { currency: base });
        }
        amount
            .checked_div(base_rate)
            .and_then(|eur| eur.checked_mul(target_rate))
            .ok_or_else(|| RateError::Arithmetic(format!("{amount} {base} to {target}")))
    }

    /// Routes a `from` -> `to` conversion to the matching formula.
    pub async fn exchange(
        &self,
        amount: Decimal,
        from: &str,
        to: &str,
        date: NaiveDate,
    ) -> Result<Decimal, RateError> {
        let from = normalize_currency_code(from)?;
        let to = normalize_currency_code(to)?;
        match (from.as_str(), to.as_str()) {
            (f, t) if f == t => Ok(amount),
            (PIVOT_CURRENCY, _) => self.convert(amount, &to, date).await,
            (_, PIVOT_CURRENCY) => self.convert_to_eur(amount, &from, date).await,
            _ => self.convert_cross(amount, &from, &to, date).await,
        }
    }
}
