// =============================================================================
// imbalance-report — scheduled long/short report for the configured pairs
// =============================================================================

use anyhow::Context;
use chrono::Utc;
use tracing::info;

use imbalance_reporter::binance::{Fetcher, MarketDataClient};
use imbalance_reporter::init_tracing;
use imbalance_reporter::runner::{run_report, Delivery};
use imbalance_reporter::settings::{Settings, DEFAULT_SETTINGS_PATH};
use imbalance_reporter::telegram::TelegramClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();
    let log_handle = init_tracing();

    let path = std::env::var("SETTINGS_PATH").unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.to_string());
    let settings = Settings::load(&path)?;
    log_handle.set_debug(settings.debug);

    let pairs = settings.require_pairs()?.to_vec();
    let (chat_id, token) = settings.require_telegram()?;
    let telegram = TelegramClient::new(token)?;

    info!(
        pairs = pairs.len(),
        endpoints = settings.base_urls.len(),
        use_proxies = settings.use_proxies,
        "starting long/short report"
    );

    let fetcher = Fetcher::new(settings.fetcher_config()).context("failed to build fetcher")?;
    let mut client = MarketDataClient::new(fetcher);

    let run = run_report(
        &mut client,
        &pairs,
        Some(Delivery {
            telegram: &telegram,
            chat_id,
        }),
        Utc::now(),
    )
    .await?;

    info!(
        pairs = run.pairs.len(),
        warnings = run.errors.len(),
        endpoint = ?client.fetcher().preferred_base(),
        "report sent"
    );
    Ok(())
}
