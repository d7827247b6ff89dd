pub mod exchange_rates_api;
pub mod fetcher;

pub use exchange_rates_api::ExchangeRatesApiProvider;
pub use fetcher::RateFetcher;
