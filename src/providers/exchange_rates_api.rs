use crate::core::date::format_date_component;
use crate::core::rate::{FetchOutcome, RateSource};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, instrument, warn};

/// API error types that mean "no rates for this date" rather than a failure.
const NOT_FOUND_ERRORS: [&str; 2] = ["invalid_date", "no_rates_available"];

/// Client for an exchangeratesapi.io compatible endpoint.
pub struct ExchangeRatesApiProvider {
    base_url: String,
    access_key: String,
    symbols: Vec<String>,
    client: reqwest::Client,
}

impl ExchangeRatesApiProvider {
    pub fn new(base_url: &str, access_key: &str, symbols: &[String]) -> Result<Self> {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let client = reqwest::Client::builder().user_agent("fxpivot/1.0").build()?;
        Ok(Self {
            base_url,
            access_key: access_key.to_string(),
            symbols: symbols.to_vec(),
            client,
        })
    }

    fn url_for(&self, endpoint: &str) -> String {
        format!(
            "{}{}?access_key={}&symbols={}&format=1",
            self.base_url,
            endpoint,
            self.access_key,
            self.symbols.join(",")
        )
    }

    async fn request(&self, endpoint: &str) -> FetchOutcome {
        let url = self.url_for(endpoint);
        debug!("Requesting rates from {}{}", self.base_url, endpoint);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                let e = e.without_url();
                warn!("Request for {} failed: {}", endpoint, e);
                return FetchOutcome::TransientError(e.to_string());
            }
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("No rates published for {}", endpoint);
            return FetchOutcome::NotFound;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return FetchOutcome::TransientError(e.without_url().to_string()),
        };
        classify_body(status, &body)
    }
}

/// Maps an HTTP status and response body onto a fetch outcome.
fn classify_body(status: StatusCode, body: &str) -> FetchOutcome {
    let payload: Value = match serde_json::from_str(body) {
        Ok(payload) => payload,
        Err(e) => {
            return FetchOutcome::TransientError(format!(
                "Undecodable response ({status}): {e}"
            ));
        }
    };

    if let Some(error) = payload.get("error") {
        let kind = error.get("type").and_then(Value::as_str).unwrap_or_default();
        if NOT_FOUND_ERRORS.contains(&kind) {
            debug!("API reported {}", kind);
            return FetchOutcome::NotFound;
        }
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or(kind)
            .to_string();
        return FetchOutcome::TransientError(format!("API error ({status}): {info}"));
    }

    if !status.is_success() {
        return FetchOutcome::TransientError(format!("Unexpected status: {status}"));
    }
    if payload.get("success") == Some(&Value::Bool(false)) {
        return FetchOutcome::TransientError("API reported success: false".to_string());
    }
    FetchOutcome::Success(payload)
}

#[async_trait]
impl RateSource for ExchangeRatesApiProvider {
    #[instrument(name = "RatesFetch", skip(self), fields(date = %format!("{year}-{month:02}-{day:02}")))]
    async fn fetch_for_date(&self, year: i32, month: u32, day: u32) -> FetchOutcome {
        let endpoint = match (
            format_date_component(i64::from(month)),
            format_date_component(i64::from(day)),
        ) {
            (Ok(mm), Ok(dd)) => format!("{year:04}-{mm}-{dd}"),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Not requesting an invalid date: {}", e);
                return FetchOutcome::TransientError(e.to_string());
            }
        };
        self.request(&endpoint).await
    }

    #[instrument(name = "RatesFetchLatest", skip(self))]
    async fn fetch_latest(&self) -> FetchOutcome {
        self.request("latest").await
    }
}
