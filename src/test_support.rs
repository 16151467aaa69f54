//! In-process HTTP fixtures shared by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::Query, routing::get, routing::post, Json, Router};
use serde_json::{json, Value};

use crate::binance::fetcher::FetcherConfig;
use crate::binance::retry::RetryPolicy;
use crate::types::MetricKind;

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Base URL of a port nobody listens on.
pub async fn dead_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Direct-only fetcher settings without sleeps or retries.
pub fn fast_config(base_urls: Vec<String>) -> FetcherConfig {
    FetcherConfig {
        base_urls,
        use_direct: true,
        proxies: None,
        timeout: Duration::from_secs(5),
        retry: RetryPolicy::none(),
        max_attempts: 1,
        backoff_factor: 0.0,
        insecure_skip_tls_verify: false,
    }
}

fn ratio_records(kind: MetricKind, symbol: &str) -> Value {
    match (symbol, kind) {
        ("BTCUSDT", _) => {
            let ratio = match kind {
                MetricKind::Accounts => "3.0000",
                MetricKind::Positions => "1.0000",
                MetricKind::Global => "0.5000",
            };
            json!([{ "symbol": symbol, "longShortRatio": ratio, "timestamp": 1_714_521_600_000i64 }])
        }
        ("FLATUSDT", _) => json!([{ "symbol": symbol, "longShortRatio": "1.0000" }]),
        ("HALFUSDT", MetricKind::Accounts) => json!([{ "symbol": symbol, "longShortRatio": "2.5" }]),
        ("JUNKUSDT", _) => json!([{ "symbol": symbol, "longShortRatio": "not-a-number" }]),
        _ => json!([]),
    }
}

/// GET handler for one ratio feed, keyed on the `symbol` query parameter.
pub fn ratio_route(kind: MetricKind) -> axum::routing::MethodRouter {
    get(move |Query(q): Query<HashMap<String, String>>| async move {
        let symbol = q.get("symbol").cloned().unwrap_or_default();
        Json(ratio_records(kind, &symbol))
    })
}

/// A miniature futures API:
///
/// - ratios: `BTCUSDT` full (3.0 / 1.0 / 0.5), `FLATUSDT` full (1.0),
///   `HALFUSDT` accounts only (2.5), `JUNKUSDT` malformed, anything else empty
/// - exchangeInfo: `AUSDT`, `BUSDT`, `CUSDT` are tradable USDT perpetuals
/// - 24h tickers: A 500, B 1500, C 1000, D unparseable, E 9000 (not listed)
pub async fn market_server() -> String {
    let app = Router::new()
        .route(MetricKind::Accounts.path(), ratio_route(MetricKind::Accounts))
        .route(MetricKind::Positions.path(), ratio_route(MetricKind::Positions))
        .route(MetricKind::Global.path(), ratio_route(MetricKind::Global))
        .route(
            "/fapi/v1/exchangeInfo",
            get(|| async {
                Json(json!({
                    "symbols": [
                        { "symbol": "AUSDT", "contractType": "PERPETUAL", "quoteAsset": "USDT", "status": "TRADING" },
                        { "symbol": "BUSDT", "contractType": "PERPETUAL", "quoteAsset": "USDT", "status": "TRADING" },
                        { "symbol": "AUSDT_240628", "contractType": "CURRENT_QUARTER", "quoteAsset": "USDT", "status": "TRADING" },
                        { "symbol": "ABTC", "contractType": "PERPETUAL", "quoteAsset": "BTC", "status": "TRADING" },
                        { "symbol": "CUSDT", "contractType": "PERPETUAL", "quoteAsset": "USDT", "status": "TRADING" },
                        { "symbol": "EUSDT", "contractType": "PERPETUAL", "quoteAsset": "USDT", "status": "SETTLING" }
                    ]
                }))
            }),
        )
        .route(
            "/fapi/v1/ticker/24hr",
            get(|| async {
                Json(json!([
                    { "symbol": "AUSDT", "quoteVolume": "500", "lastPrice": "1.0", "priceChangePercent": "1.5" },
                    { "symbol": "BUSDT", "quoteVolume": "1500", "lastPrice": "2.5", "priceChangePercent": "-3.2" },
                    { "symbol": "CUSDT", "quoteVolume": "1000", "lastPrice": "0.1", "priceChangePercent": "0" },
                    { "symbol": "DUSDT", "quoteVolume": "abc", "lastPrice": "1", "priceChangePercent": "0" },
                    { "symbol": "EUSDT", "quoteVolume": "9000", "lastPrice": "3", "priceChangePercent": "0" }
                ]))
            }),
        )
        .route("/fapi/v1/ping", get(|| async { Json(json!({})) }));
    serve(app).await
}

/// Bot API stand-in that records every message text it receives.  Returns
/// the API root to pass to `TelegramClient::with_api_root`.
pub async fn telegram_server(token: &str, received: Arc<Mutex<Vec<String>>>) -> String {
    let app = Router::new().route(
        &format!("/bot{token}/sendMessage"),
        post(move |Json(body): Json<Value>| {
            let received = received.clone();
            async move {
                let text = body["text"].as_str().unwrap_or_default().to_string();
                received.lock().unwrap().push(text);
                Json(json!({ "ok": true, "result": { "message_id": 1 } }))
            }
        }),
    );
    serve(app).await
}
