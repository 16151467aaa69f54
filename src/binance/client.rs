// =============================================================================
// Binance Futures Market Data Client — public, unauthenticated endpoints
// =============================================================================
//
// Thin domain layer over the resilient `Fetcher`:
//
//   - latest daily long/short ratio (three variants, one record each)
//   - exchangeInfo, reduced to tradable USDT perpetuals
//   - 24h ticker statistics for every symbol
//
// Ratio calls distinguish an empty data set (`NoData`) from a record that
// cannot be parsed (`InvalidRecord`); both are symbol-level failures and are
// never retried at the transport layer.
// =============================================================================

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::fetcher::{FetchError, Fetcher};
use crate::futures_intel::long_short_ratio::{InvalidRecord, LongShortMetric};
use crate::types::{MetricKind, Ticker24h};

/// Ratio period requested from the futures data endpoints.
pub const RATIO_PERIOD: &str = "1d";

pub const EXCHANGE_INFO_PATH: &str = "/fapi/v1/exchangeInfo";
pub const TICKER_24H_PATH: &str = "/fapi/v1/ticker/24hr";

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("no data returned for {symbol} at {path}")]
    NoData { symbol: String, path: &'static str },

    #[error(transparent)]
    InvalidRecord(#[from] InvalidRecord),

    #[error("unexpected response shape from {path}: {detail}")]
    UnexpectedShape { path: &'static str, detail: String },
}

/// Binance USDⓈ-M futures market data client.
#[derive(Debug)]
pub struct MarketDataClient {
    fetcher: Fetcher,
}

impl MarketDataClient {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    // -------------------------------------------------------------------------
    // Long/short ratios
    // -------------------------------------------------------------------------

    /// Top traders' long/short ratio by account count.
    pub async fn top_trader_accounts(&mut self, symbol: &str) -> Result<LongShortMetric, MarketDataError> {
        self.metric(MetricKind::Accounts, symbol).await
    }

    /// Top traders' long/short ratio by position size.
    pub async fn top_trader_positions(&mut self, symbol: &str) -> Result<LongShortMetric, MarketDataError> {
        self.metric(MetricKind::Positions, symbol).await
    }

    /// Long/short ratio across all accounts.
    pub async fn global_long_short(&mut self, symbol: &str) -> Result<LongShortMetric, MarketDataError> {
        self.metric(MetricKind::Global, symbol).await
    }

    /// Latest daily record of `kind` for `symbol`, parsed.
    #[instrument(skip(self), name = "binance::metric")]
    pub async fn metric(&mut self, kind: MetricKind, symbol: &str) -> Result<LongShortMetric, MarketDataError> {
        let record = self.latest_record(kind.path(), symbol).await?;
        let metric = LongShortMetric::from_record(&record)?;
        debug!(
            symbol,
            %kind,
            ratio = %format_args!("{:.3}", metric.ratio),
            long_pct = %format_args!("{:.2}", metric.long_pct),
            "ratio fetched"
        );
        Ok(metric)
    }

    /// GET `path` for the single most recent daily record; the last array
    /// element is the newest.
    async fn latest_record(&mut self, path: &'static str, symbol: &str) -> Result<Value, MarketDataError> {
        let body = self
            .fetcher
            .request(path, &[("symbol", symbol), ("period", RATIO_PERIOD), ("limit", "1")])
            .await?;

        match body {
            Value::Array(mut records) => records.pop().ok_or_else(|| MarketDataError::NoData {
                symbol: symbol.to_string(),
                path,
            }),
            Value::Null => Err(MarketDataError::NoData {
                symbol: symbol.to_string(),
                path,
            }),
            Value::Object(ref map) if map.is_empty() => Err(MarketDataError::NoData {
                symbol: symbol.to_string(),
                path,
            }),
            other => Err(MarketDataError::UnexpectedShape {
                path,
                detail: other.to_string(),
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Symbol universe
    // -------------------------------------------------------------------------

    /// Symbols that are USDT-quoted perpetual contracts currently trading.
    #[instrument(skip(self), name = "binance::usdt_perpetual_symbols")]
    pub async fn usdt_perpetual_symbols(&mut self) -> Result<Vec<String>, MarketDataError> {
        let body = self.fetcher.request(EXCHANGE_INFO_PATH, &[]).await?;
        let symbols = body["symbols"]
            .as_array()
            .ok_or_else(|| MarketDataError::UnexpectedShape {
                path: EXCHANGE_INFO_PATH,
                detail: "missing 'symbols' array".to_string(),
            })?;

        let out: Vec<String> = symbols
            .iter()
            .filter(|s| {
                s["contractType"].as_str() == Some("PERPETUAL")
                    && s["quoteAsset"].as_str() == Some("USDT")
                    && s["status"].as_str() == Some("TRADING")
            })
            .filter_map(|s| s["symbol"].as_str().map(str::to_string))
            .collect();

        debug!(count = out.len(), "usdt perpetual symbols listed");
        Ok(out)
    }

    /// 24h statistics for every symbol, in exchange order.
    #[instrument(skip(self), name = "binance::tickers_24h")]
    pub async fn tickers_24h(&mut self) -> Result<Vec<Ticker24h>, MarketDataError> {
        let body = self.fetcher.request(TICKER_24H_PATH, &[]).await?;
        let raw = body
            .as_array()
            .ok_or_else(|| MarketDataError::UnexpectedShape {
                path: TICKER_24H_PATH,
                detail: "ticker response is not an array".to_string(),
            })?;

        let mut tickers = Vec::with_capacity(raw.len());
        for entry in raw {
            let Some(symbol) = entry["symbol"].as_str() else {
                warn!("skipping ticker entry without symbol");
                continue;
            };
            tickers.push(Ticker24h {
                symbol: symbol.to_string(),
                quote_volume: parse_decimal(&entry["quoteVolume"]),
                last_price: parse_decimal(&entry["lastPrice"]),
                price_change_pct: parse_decimal(&entry["priceChangePercent"]),
            });
        }

        debug!(count = tickers.len(), "24h tickers fetched");
        Ok(tickers)
    }
}

/// Parse a JSON value that may be either a decimal string or a number.
pub fn parse_decimal(val: &Value) -> Option<f64> {
    let n = match val {
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}
