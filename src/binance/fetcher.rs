// =============================================================================
// Resilient Fetcher — multi-endpoint, multi-proxy JSON GET with failover
// =============================================================================
//
// Every request walks, outer to inner:
//
//   base endpoints   (preferred first, then configuration order)
//     routes         (preferred first, then direct, then the proxy pool)
//       attempts     (1..=max_attempts, linear sleep between them)
//         transport  (RetryPolicy: 429/5xx and connection errors)
//
// The first response that is a success status with a JSON body wins and pins
// its endpoint and route as preferred for later calls.  Preferences only
// reorder candidates; nothing is ever evicted from the pool.  When everything
// is exhausted the most recent failure is returned.
//
// The fetcher is owned by a single flow and mutated through `&mut self`.
// =============================================================================

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::headers::browser_headers;
use super::retry::RetryPolicy;
use crate::proxy::{ProxyConfig, ProxyDirectory};

/// Liveness endpoint of the futures API; used to validate proxies.
pub const PING_PATH: &str = "/fapi/v1/ping";

/// Longest sleep between attempts on one (endpoint, route).
const MAX_ATTEMPT_DELAY: Duration = Duration::from_secs(120);

/// Longest slice of an error body kept in [`FetchError::Status`].
const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no candidate base endpoints configured")]
    NoCandidates,

    #[error("failed to build HTTP client for route {route}: {source}")]
    ClientBuild {
        route: String,
        source: reqwest::Error,
    },

    #[error("GET {url} failed: {source}")]
    Network {
        url: String,
        source: reqwest::Error,
    },

    #[error("GET {url} returned {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("GET {url} returned a non-JSON body: {source}")]
    Decode {
        url: String,
        source: serde_json::Error,
    },
}

/// How a request leaves the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Direct,
    Proxy(String),
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Proxy(addr) => write!(f, "{addr}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Candidate base URLs, e.g. `https://fapi.binance.com`.
    pub base_urls: Vec<String>,
    /// Include the direct route in the rotation.
    pub use_direct: bool,
    /// Proxy directory settings; `None` disables proxies.
    pub proxies: Option<ProxyConfig>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Transport-level retry policy.
    pub retry: RetryPolicy,
    /// Attempts per (endpoint, route).
    pub max_attempts: u32,
    /// Seconds slept per failed attempt number between attempts.
    pub backoff_factor: f64,
    pub insecure_skip_tls_verify: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_urls: vec!["https://fapi.binance.com".to_string()],
            use_direct: true,
            proxies: None,
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            max_attempts: 2,
            backoff_factor: 0.5,
            insecure_skip_tls_verify: false,
        }
    }
}

pub struct Fetcher {
    config: FetcherConfig,
    base_urls: Vec<String>,
    preferred_base: Option<String>,
    preferred_route: Option<Route>,
    /// Loaded on first use when proxies are enabled.
    proxy_pool: Option<Vec<String>>,
    clients: HashMap<Route, reqwest::Client>,
}

impl Fetcher {
    /// Build a fetcher.  Base URLs are trimmed and de-duplicated in order.
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let base_urls = normalize_base_urls(&config.base_urls);
        if base_urls.is_empty() {
            return Err(FetchError::NoCandidates);
        }

        debug!(
            bases = ?base_urls,
            proxies_enabled = config.proxies.is_some(),
            max_attempts = config.max_attempts,
            retries = config.retry.retries,
            "fetcher initialised"
        );

        Ok(Self {
            config,
            base_urls,
            preferred_base: None,
            preferred_route: None,
            proxy_pool: None,
            clients: HashMap::new(),
        })
    }

    pub fn base_urls(&self) -> &[String] {
        &self.base_urls
    }

    /// Endpoint of the last successful request.
    pub fn preferred_base(&self) -> Option<&str> {
        self.preferred_base.as_deref()
    }

    /// Route of the last successful request.
    pub fn preferred_route(&self) -> Option<&Route> {
        self.preferred_route.as_ref()
    }

    /// GET `path` with `query` and decode the JSON body.
    pub async fn request(&mut self, path: &str, query: &[(&str, &str)]) -> Result<Value, FetchError> {
        self.request_with_headers(path, query, &HeaderMap::new()).await
    }

    /// Like [`Fetcher::request`]; `headers` replace the browser defaults of
    /// the same name.
    #[instrument(skip(self, query, headers), name = "fetcher::request")]
    pub async fn request_with_headers(
        &mut self,
        path: &str,
        query: &[(&str, &str)],
        headers: &HeaderMap,
    ) -> Result<Value, FetchError> {
        self.ensure_proxy_pool().await;

        let bases = prefer_first(&self.base_urls, self.preferred_base.as_ref());
        let routes = prefer_first(&self.routes(), self.preferred_route.as_ref());
        let mut last_error = None;

        for base in &bases {
            let url = format!("{base}{path}");
            for route in &routes {
                let client = match self.client_for(route) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(route = %route, error = %e, "route unusable, skipping");
                        last_error = Some(e);
                        continue;
                    }
                };

                for attempt in 1..=self.config.max_attempts {
                    match self.attempt(&client, &url, query, headers).await {
                        Ok(body) => {
                            if self.preferred_base.as_ref() != Some(base) {
                                info!(base = %base, "preferred endpoint updated");
                            }
                            self.preferred_base = Some(base.clone());
                            self.preferred_route = Some(route.clone());
                            return Ok(body);
                        }
                        Err(e) => {
                            warn!(
                                url = %url,
                                route = %route,
                                attempt,
                                max_attempts = self.config.max_attempts,
                                error = %e,
                                "request attempt failed"
                            );
                            last_error = Some(e);
                            if attempt < self.config.max_attempts {
                                tokio::time::sleep(self.attempt_delay(attempt)).await;
                            }
                        }
                    }
                }
            }
        }

        Err(last_error.unwrap_or(FetchError::NoCandidates))
    }

    async fn attempt(
        &self,
        client: &reqwest::Client,
        url: &str,
        query: &[(&str, &str)],
        headers: &HeaderMap,
    ) -> Result<Value, FetchError> {
        let resp = self
            .config
            .retry
            .send(|| client.get(url).query(query).headers(headers.clone()).send())
            .await
            .map_err(|source| FetchError::Network {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|source| FetchError::Network {
            url: url.to_string(),
            source,
        })?;

        if status.is_client_error() || status.is_server_error() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }

    fn attempt_delay(&self, attempt: u32) -> Duration {
        let secs = self.config.backoff_factor * f64::from(attempt);
        if secs.is_nan() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(secs).map_or(MAX_ATTEMPT_DELAY, |d| d.min(MAX_ATTEMPT_DELAY))
    }

    /// Direct route (if enabled) followed by the proxy pool.  Falls back to
    /// direct when nothing else is available.
    fn routes(&self) -> Vec<Route> {
        let mut routes = Vec::new();
        if self.config.use_direct {
            routes.push(Route::Direct);
        }
        if let Some(pool) = &self.proxy_pool {
            routes.extend(pool.iter().cloned().map(Route::Proxy));
        }
        if routes.is_empty() {
            routes.push(Route::Direct);
        }
        routes
    }

    async fn ensure_proxy_pool(&mut self) {
        if self.proxy_pool.is_some() {
            return;
        }
        let Some(proxy_config) = self.config.proxies.clone() else {
            return;
        };

        let check_url = format!("{}{PING_PATH}", self.base_urls[0]);
        let directory =
            ProxyDirectory::new(proxy_config, check_url, self.config.insecure_skip_tls_verify);
        let load = directory.load().await;

        for skipped in &load.skipped {
            warn!(
                proxy_type = %skipped.proxy_type,
                url = %skipped.url,
                reason = %skipped.reason,
                "proxy source unavailable"
            );
        }
        if load.proxies.is_empty() && !self.config.use_direct {
            warn!("no proxies available and direct route disabled, falling back to direct");
        }
        info!(count = load.proxies.len(), "proxy pool ready");
        self.proxy_pool = Some(load.proxies);
    }

    fn client_for(&mut self, route: &Route) -> Result<reqwest::Client, FetchError> {
        if let Some(client) = self.clients.get(route) {
            return Ok(client.clone());
        }

        let build_err = |source: reqwest::Error| FetchError::ClientBuild {
            route: route.to_string(),
            source,
        };

        let mut builder = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .default_headers(browser_headers())
            .danger_accept_invalid_certs(self.config.insecure_skip_tls_verify);
        builder = match route {
            Route::Direct => builder.no_proxy(),
            Route::Proxy(addr) => builder.proxy(reqwest::Proxy::all(addr).map_err(build_err)?),
        };
        let client = builder.build().map_err(build_err)?;

        self.clients.insert(route.clone(), client.clone());
        Ok(client)
    }
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("base_urls", &self.base_urls)
            .field("preferred_base", &self.preferred_base)
            .field("preferred_route", &self.preferred_route)
            .field("proxy_pool", &self.proxy_pool.as_ref().map(Vec::len))
            .finish()
    }
}

/// Trim, strip trailing slashes and de-duplicate, keeping first occurrences.
pub fn normalize_base_urls(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for url in raw {
        let url = url.trim().trim_end_matches('/');
        if !url.is_empty() && !out.iter().any(|u| u == url) {
            out.push(url.to_string());
        }
    }
    out
}

/// Copy of `items` with `preferred` moved to the front when present.
pub fn prefer_first<T: Clone + PartialEq>(items: &[T], preferred: Option<&T>) -> Vec<T> {
    let mut out = Vec::with_capacity(items.len());
    if let Some(p) = preferred {
        if items.contains(p) {
            out.push(p.clone());
        }
    }
    out.extend(items.iter().filter(|i| Some(*i) != preferred).cloned());
    out
}

fn truncate(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{dead_endpoint, fast_config, serve};
    use axum::{
        http::{header::USER_AGENT, HeaderMap as AxumHeaders, StatusCode as AxumStatus},
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use reqwest::header::HeaderValue;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn ok_server(tag: &'static str) -> String {
        serve(Router::new().route("/x", get(move || async move { Json(json!({ "from": tag })) }))).await
    }

    async fn counting_failure(hits: Arc<AtomicUsize>) -> String {
        let app = Router::new().route(
            "/x",
            get(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (AxumStatus::INTERNAL_SERVER_ERROR, "boom")
                }
            }),
        );
        serve(app).await
    }

    #[test]
    fn base_urls_are_normalized() {
        let raw = vec![
            " https://a.example/ ".to_string(),
            "https://b.example".to_string(),
            "https://a.example".to_string(),
            "".to_string(),
        ];
        assert_eq!(
            normalize_base_urls(&raw),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn empty_base_list_is_rejected() {
        let cfg = FetcherConfig {
            base_urls: vec!["  ".into()],
            ..FetcherConfig::default()
        };
        assert!(matches!(Fetcher::new(cfg), Err(FetchError::NoCandidates)));
    }

    #[test]
    fn prefer_first_promotes_without_removing() {
        let items = vec!["a", "b", "c"];
        assert_eq!(prefer_first(&items, Some(&"c")), vec!["c", "a", "b"]);
        assert_eq!(prefer_first(&items, Some(&"z")), vec!["a", "b", "c"]);
        assert_eq!(prefer_first(&items, None), vec!["a", "b", "c"]);
    }

    #[test]
    fn attempt_delay_is_linear_and_bounded() {
        let mut cfg = FetcherConfig::default();
        cfg.backoff_factor = 0.5;
        let fetcher = Fetcher::new(cfg.clone()).unwrap();
        assert_eq!(fetcher.attempt_delay(1), Duration::from_millis(500));
        assert_eq!(fetcher.attempt_delay(3), Duration::from_millis(1500));

        cfg.backoff_factor = 1e30;
        let fetcher = Fetcher::new(cfg.clone()).unwrap();
        assert_eq!(fetcher.attempt_delay(2), MAX_ATTEMPT_DELAY);

        cfg.backoff_factor = f64::NAN;
        let fetcher = Fetcher::new(cfg).unwrap();
        assert_eq!(fetcher.attempt_delay(1), Duration::ZERO);
    }

    #[test]
    fn truncates_long_bodies() {
        assert_eq!(truncate("abcdef", 3), "abc…");
        assert_eq!(truncate("abc", 3), "abc");
    }

    #[tokio::test]
    async fn fails_over_to_second_endpoint_and_prefers_it() {
        let e1_hits = Arc::new(AtomicUsize::new(0));
        let e1 = counting_failure(e1_hits.clone()).await;
        let e2 = ok_server("e2").await;

        let mut fetcher = Fetcher::new(fast_config(vec![e1.clone(), e2.clone()])).unwrap();
        let body = fetcher.request("/x", &[]).await.unwrap();
        assert_eq!(body["from"], "e2");
        assert_eq!(fetcher.preferred_base(), Some(e2.as_str()));
        assert_eq!(fetcher.preferred_route(), Some(&Route::Direct));
        assert_eq!(e1_hits.load(Ordering::SeqCst), 1);

        // The second call goes straight to E2.
        let body = fetcher.request("/x", &[]).await.unwrap();
        assert_eq!(body["from"], "e2");
        assert_eq!(e1_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dead_endpoint_is_skipped() {
        let dead = dead_endpoint().await;
        let live = ok_server("live").await;
        let mut fetcher = Fetcher::new(fast_config(vec![dead, live.clone()])).unwrap();
        let body = fetcher.request("/x", &[]).await.unwrap();
        assert_eq!(body["from"], "live");
        assert_eq!(fetcher.preferred_base(), Some(live.as_str()));
    }

    #[tokio::test]
    async fn exhaustion_surfaces_last_failure() {
        let dead = dead_endpoint().await;
        let not_found = serve(Router::new()).await;
        let mut fetcher = Fetcher::new(fast_config(vec![dead, not_found])).unwrap();

        let err = fetcher.request("/x", &[]).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status, .. } if status == StatusCode::NOT_FOUND));
        assert!(fetcher.preferred_base().is_none());
    }

    #[tokio::test]
    async fn non_json_body_is_a_failure() {
        let html = serve(Router::new().route("/x", get(|| async { "<html>blocked</html>" }))).await;
        let mut fetcher = Fetcher::new(fast_config(vec![html])).unwrap();
        let err = fetcher.request("/x", &[]).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[tokio::test]
    async fn every_attempt_is_used_before_moving_on() {
        let hits = Arc::new(AtomicUsize::new(0));
        let failing = counting_failure(hits.clone()).await;
        let mut cfg = fast_config(vec![failing]);
        cfg.max_attempts = 3;
        let mut fetcher = Fetcher::new(cfg).unwrap();

        assert!(fetcher.request("/x", &[]).await.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn transport_retry_absorbs_transient_status() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/x",
            get(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        (AxumStatus::SERVICE_UNAVAILABLE, [("retry-after", "0")], "busy").into_response()
                    } else {
                        Json(json!({ "ok": true })).into_response()
                    }
                }
            }),
        );
        let base = serve(app).await;

        let mut cfg = fast_config(vec![base]);
        cfg.retry = RetryPolicy::new(2, 0.0);
        let mut fetcher = Fetcher::new(cfg).unwrap();

        let body = fetcher.request("/x", &[]).await.unwrap();
        assert_eq!(body["ok"], true);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn query_is_forwarded() {
        let app = Router::new().route(
            "/echo",
            get(|axum::extract::RawQuery(q): axum::extract::RawQuery| async move {
                Json(json!({ "query": q }))
            }),
        );
        let base = serve(app).await;
        let mut fetcher = Fetcher::new(fast_config(vec![base])).unwrap();
        let body = fetcher
            .request("/echo", &[("symbol", "BTCUSDT"), ("limit", "1")])
            .await
            .unwrap();
        assert_eq!(body["query"], "symbol=BTCUSDT&limit=1");
    }

    #[tokio::test]
    async fn browser_headers_apply_unless_overridden() {
        let app = Router::new().route(
            "/ua",
            get(|headers: AxumHeaders| async move {
                let ua = headers
                    .get(USER_AGENT)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({ "ua": ua }))
            }),
        );
        let base = serve(app).await;
        let mut fetcher = Fetcher::new(fast_config(vec![base])).unwrap();

        let body = fetcher.request("/ua", &[]).await.unwrap();
        assert!(body["ua"].as_str().unwrap().starts_with("Mozilla/5.0"));

        let mut custom = HeaderMap::new();
        custom.insert(reqwest::header::USER_AGENT, HeaderValue::from_static("custom/1.0"));
        let body = fetcher.request_with_headers("/ua", &[], &custom).await.unwrap();
        assert_eq!(body["ua"], "custom/1.0");
    }

    #[tokio::test]
    async fn proxy_pool_is_loaded_once_from_directory() {
        let source_hits = Arc::new(AtomicUsize::new(0));
        let counter = source_hits.clone();
        let source = serve(Router::new().route(
            "/list",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    ""
                }
            }),
        ))
        .await;
        let live = ok_server("live").await;

        let mut cfg = fast_config(vec![live]);
        cfg.proxies = Some(ProxyConfig {
            limit: 5,
            types: vec!["http".into()],
            source_url: format!("{source}/list"),
            validate: false,
            validate_timeout: Duration::from_secs(1),
        });
        let mut fetcher = Fetcher::new(cfg).unwrap();

        fetcher.request("/x", &[]).await.unwrap();
        fetcher.request("/x", &[]).await.unwrap();
        assert_eq!(source_hits.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.preferred_route(), Some(&Route::Direct));
    }

    #[tokio::test]
    async fn preferred_proxy_is_tried_first_on_later_calls() {
        // Plain HTTP proxies receive the absolute-form target, which the
        // router matches on its path, so local servers act as the proxies.
        let failing_hits = Arc::new(AtomicUsize::new(0));
        let failing = counting_failure(failing_hits.clone()).await;
        let live_hits = Arc::new(AtomicUsize::new(0));
        let counter = live_hits.clone();
        let live = serve(Router::new().route(
            "/x",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(json!({ "via": "proxy" }))
                }
            }),
        ))
        .await;
        let dead = dead_endpoint().await;

        let addr = |url: &str| url.trim_start_matches("http://").to_string();
        let listing = format!("{}\n{}\n{}\n", addr(&dead), addr(&failing), addr(&live));
        let source = serve(Router::new().route("/list", get(move || async move { listing }))).await;

        let mut cfg = fast_config(vec!["http://exchange.invalid".to_string()]);
        cfg.use_direct = false;
        cfg.proxies = Some(ProxyConfig {
            limit: 10,
            types: vec!["http".into()],
            source_url: format!("{source}/list"),
            validate: false,
            validate_timeout: Duration::from_secs(1),
        });
        let mut fetcher = Fetcher::new(cfg).unwrap();

        let body = fetcher.request("/x", &[]).await.unwrap();
        assert_eq!(body["via"], "proxy");
        let live_route = Route::Proxy(live.clone());
        assert_eq!(fetcher.preferred_route(), Some(&live_route));
        assert_eq!(failing_hits.load(Ordering::SeqCst), 1);
        assert_eq!(live_hits.load(Ordering::SeqCst), 1);

        let body = fetcher.request("/x", &[]).await.unwrap();
        assert_eq!(body["via"], "proxy");
        assert_eq!(fetcher.preferred_route(), Some(&live_route));
        assert_eq!(failing_hits.load(Ordering::SeqCst), 1);
        assert_eq!(live_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn routes_fall_back_to_direct() {
        let cfg = FetcherConfig {
            use_direct: false,
            ..FetcherConfig::default()
        };
        let fetcher = Fetcher::new(cfg).unwrap();
        assert_eq!(fetcher.routes(), vec![Route::Direct]);
    }

    #[test]
    fn routes_put_direct_before_pool() {
        let mut fetcher = Fetcher::new(FetcherConfig::default()).unwrap();
        fetcher.proxy_pool = Some(vec!["http://1.2.3.4:80".into()]);
        assert_eq!(
            fetcher.routes(),
            vec![Route::Direct, Route::Proxy("http://1.2.3.4:80".into())]
        );
    }
}
