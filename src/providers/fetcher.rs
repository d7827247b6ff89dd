//! Batch iteration over a [`RateSource`].
//!
//! Calls are strictly sequential and every call is followed by the configured
//! delay, whatever its outcome. A failed day or month is dropped from the
//! result and never aborts the batch.

use crate::core::rate::{FetchOutcome, RateSource};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

pub struct RateFetcher<'a> {
    source: &'a dyn RateSource,
    delay: Duration,
    on_call: Option<&'a (dyn Fn() + Send + Sync)>,
}

impl<'a> RateFetcher<'a> {
    pub fn new(source: &'a dyn RateSource, delay: Duration) -> Self {
        Self {
            source,
            delay,
            on_call: None,
        }
    }

    /// Invokes `callback` after every upstream call.
    pub fn with_progress(mut self, callback: &'a (dyn Fn() + Send + Sync)) -> Self {
        self.on_call = Some(callback);
        self
    }

    async fn after_call(&self) {
        if let Some(callback) = self.on_call {
            callback();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    pub async fn fetch_for_date(&self, year: i32, month: u32, day: u32) -> FetchOutcome {
        let outcome = self.source.fetch_for_date(year, month, day).await;
        match &outcome {
            FetchOutcome::Success(_) => debug!("Fetched rates for {year}-{month:02}-{day:02}"),
            FetchOutcome::NotFound => debug!("No rates for {year}-{month:02}-{day:02}"),
            FetchOutcome::TransientError(reason) => {
                warn!("Fetching {year}-{month:02}-{day:02} failed: {reason}")
            }
        }
        self.after_call().await;
        outcome
    }

    /// Every day 1..=31 of the month, keyed by day. Days the calendar does
    /// not have are expected to come back as not found.
    pub async fn fetch_for_month(&self, year: i32, month: u32) -> BTreeMap<u32, Value> {
        self.fetch_days(year, month, 1..=31).await
    }

    /// The first day of every month, keyed by month.
    pub async fn fetch_for_year(&self, year: i32) -> BTreeMap<u32, Value> {
        let mut results = BTreeMap::new();
        for month in 1..=12 {
            if let Some(payload) = self.fetch_for_date(year, month, 1).await.into_payload() {
                results.insert(month, payload);
            }
        }
        results
    }

    /// Days `start_day..=end_day`, keyed by day. Returns nothing without
    /// calling the source unless `1 <= start_day <= end_day <= 31`.
    pub async fn fetch_for_range(
        &self,
        year: i32,
        month: u32,
        start_day: u32,
        end_day: u32,
    ) -> BTreeMap<u32, Value> {
        if !is_valid_range(start_day, end_day) {
            warn!("Invalid day range {start_day}..={end_day}, nothing to fetch");
            return BTreeMap::new();
        }
        self.fetch_days(year, month, start_day..=end_day).await
    }

    pub async fn fetch_latest(&self) -> FetchOutcome {
        let outcome = self.source.fetch_latest().await;
        if let FetchOutcome::TransientError(reason) = &outcome {
            warn!("Fetching latest rates failed: {reason}");
        }
        self.after_call().await;
        outcome
    }

    async fn fetch_days(
        &self,
        year: i32,
        month: u32,
        days: impl IntoIterator<Item = u32>,
    ) -> BTreeMap<u32, Value> {
        let mut results = BTreeMap::new();
        for day in days {
            if let Some(payload) = self.fetch_for_date(year, month, day).await.into_payload() {
                results.insert(day, payload);
            }
        }
        results
    }
}

pub fn is_valid_range(start_day: u32, end_day: u32) -> bool {
    1 <= start_day && start_day <= end_day && end_day <= 31
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every date in February up to the 28th, fails on the 13th.
    struct MockSource {
        calls: Mutex<Vec<(i32, u32, u32)>>,
    }

    impl MockSource {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RateSource for MockSource {
        async fn fetch_for_date(&self, year: i32, month: u32, day: u32) -> FetchOutcome {
            self.calls.lock().unwrap().push((year, month, day));
            if day == 13 {
                return FetchOutcome::TransientError("timeout".to_string());
            }
            if month == 2 && day > 28 {
                return FetchOutcome::NotFound;
            }
            FetchOutcome::Success(json!({
                "date": format!("{year}-{month:02}-{day:02}"),
                "base": "EUR",
                "rates": {"USD": 1.1}
            }))
        }

        async fn fetch_latest(&self) -> FetchOutcome {
            self.calls.lock().unwrap().push((0, 0, 0));
            FetchOutcome::Success(json!({"date": "2024-01-02", "base": "EUR", "rates": {}}))
        }
    }

    #[tokio::test]
    async fn test_fetch_for_month_keeps_successes() {
        let source = MockSource::new();
        let fetcher = RateFetcher::new(&source, Duration::ZERO);

        let results = fetcher.fetch_for_month(2018, 2).await;

        assert_eq!(source.call_count(), 31);
        assert_eq!(results.len(), 27);
        assert!(!results.contains_key(&13));
        assert!(!results.contains_key(&29));
        assert_eq!(results[&1]["date"], json!("2018-02-01"));
    }

    #[tokio::test]
    async fn test_fetch_for_year_samples_first_day() {
        let source = MockSource::new();
        let fetcher = RateFetcher::new(&source, Duration::ZERO);

        let results = fetcher.fetch_for_year(2019).await;

        assert_eq!(results.len(), 12);
        let calls = source.calls.lock().unwrap();
        assert!(calls.iter().all(|&(y, _, d)| y == 2019 && d == 1));
        assert_eq!(results[&12]["date"], json!("2019-12-01"));
    }

    #[tokio::test]
    async fn test_fetch_for_range_inclusive() {
        let source = MockSource::new();
        let fetcher = RateFetcher::new(&source, Duration::ZERO);

        let results = fetcher.fetch_for_range(2020, 3, 10, 14).await;

        assert_eq!(source.call_count(), 5);
        assert_eq!(results.keys().copied().collect::<Vec<_>>(), vec![10, 11, 12, 14]);
    }

    #[tokio::test]
    async fn test_invalid_range_makes_no_calls() {
        let source = MockSource::new();
        let fetcher = RateFetcher::new(&source, Duration::ZERO);

        assert!(fetcher.fetch_for_range(2020, 3, 5, 3).await.is_empty());
        assert!(fetcher.fetch_for_range(2020, 3, 0, 3).await.is_empty());
        assert!(fetcher.fetch_for_range(2020, 3, 30, 32).await.is_empty());
        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_follows_every_call() {
        let source = MockSource::new();
        let fetcher = RateFetcher::new(&source, Duration::from_secs(4));

        let started = tokio::time::Instant::now();
        fetcher.fetch_for_date(2020, 1, 13).await;
        fetcher.fetch_latest().await;

        assert!(started.elapsed() >= Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_progress_callback_counts_calls() {
        let source = MockSource::new();
        let counter = AtomicUsize::new(0);
        let tick = || {
            counter.fetch_add(1, Ordering::SeqCst);
        };
        let fetcher = RateFetcher::new(&source, Duration::ZERO).with_progress(&tick);

        fetcher.fetch_for_range(2020, 1, 1, 3).await;
        fetcher.fetch_latest().await;

        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }
}
