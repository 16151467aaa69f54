// =============================================================================
// find-imbalanced — scan the most liquid USDT perpetuals for skewed positioning
// =============================================================================

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::info;

use imbalance_reporter::binance::{Fetcher, MarketDataClient};
use imbalance_reporter::init_tracing;
use imbalance_reporter::report::format_console_report;
use imbalance_reporter::runner::{run_scan, Delivery, ScanOptions};
use imbalance_reporter::settings::{Settings, DEFAULT_SETTINGS_PATH};
use imbalance_reporter::telegram::TelegramClient;

#[derive(Debug, Parser)]
#[command(name = "find-imbalanced", about = "Find USDT perpetuals with one-sided long/short positioning")]
struct Args {
    /// Pairs shown in the console summary.
    #[arg(long, default_value_t = 10)]
    limit: usize,

    /// Symbols taken from the 24h quote volume ranking.
    #[arg(long, default_value_t = 120)]
    candidates: usize,

    /// Only consider symbols at or below this 24h quote volume.
    #[arg(long)]
    max_quote_volume: Option<f64>,

    /// Print the Telegram messages instead of sending them.
    #[arg(long)]
    dry_run: bool,

    #[arg(long, env = "SETTINGS_PATH", default_value = DEFAULT_SETTINGS_PATH)]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();
    let args = Args::parse();
    let log_handle = init_tracing();

    let settings = Settings::load(&args.config)?;
    log_handle.set_debug(settings.debug);

    // Fail on missing credentials before spending requests on the scan.
    let telegram = if args.dry_run {
        None
    } else {
        let (chat_id, token) = settings.require_telegram()?;
        Some((TelegramClient::new(token)?, chat_id))
    };

    let fetcher = Fetcher::new(settings.fetcher_config()).context("failed to build fetcher")?;
    let mut client = MarketDataClient::new(fetcher);

    let opts = ScanOptions {
        limit: args.limit,
        candidates: args.candidates,
        max_quote_volume: args.max_quote_volume,
    };
    info!(?opts, dry_run = args.dry_run, "starting imbalance scan");

    let run = run_scan(&mut client, opts, Utc::now()).await?;

    println!("{}", format_console_report(&run.top, &run.tickers));
    if !run.errors.is_empty() {
        println!("\nPartial errors:");
        for err in &run.errors {
            println!("- {err}");
        }
    }

    match &telegram {
        Some((tg, chat_id)) => {
            let delivery = Delivery {
                telegram: tg,
                chat_id: *chat_id,
            };
            delivery.send_all(&run.messages).await?;
            info!(
                messages = run.messages.len(),
                highlighted = run.highlighted.len(),
                "scan report sent"
            );
        }
        None => {
            for msg in &run.messages {
                println!("\n{msg}");
            }
        }
    }
    Ok(())
}
