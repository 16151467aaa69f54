pub mod client;
pub mod fetcher;
pub mod headers;
pub mod retry;

pub use client::{MarketDataClient, MarketDataError};
pub use fetcher::{FetchError, Fetcher, FetcherConfig, Route};
pub use retry::RetryPolicy;
