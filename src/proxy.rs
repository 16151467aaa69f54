// =============================================================================
// Proxy Directory — public forward-proxy discovery and liveness probing
// =============================================================================
//
// Proxy sources are plain-text lists of `host:port`, one per line.  For every
// requested proxy type the directory downloads the list, normalises each entry
// to `scheme://host:port`, drops duplicates (first seen wins) and, when
// validation is on, keeps only proxies that can reach the exchange ping
// endpoint within the check timeout.
//
// Loading never fails.  Sources that cannot be fetched are reported back in
// `ProxyLoad::skipped` and the directory carries on with the rest.
// =============================================================================

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::binance::headers::browser_headers;

/// Public proxy list; `{type}` is replaced by the proxy protocol.
pub const DEFAULT_PROXY_SOURCE: &str = "https://api.proxyscrape.com/v2/?request=displayproxies&protocol={type}&timeout=10000&country=all&ssl=all&anonymity=all";

/// Timeout for downloading a proxy list.
const SOURCE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    /// Stop once this many proxies are collected.
    pub limit: usize,
    /// Proxy protocols to request, e.g. `http`, `socks5`.
    pub types: Vec<String>,
    /// Source URL template.
    pub source_url: String,
    /// Check proxies before accepting them.
    pub validate: bool,
    pub validate_timeout: Duration,
}

/// A proxy source that was skipped, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSource {
    pub proxy_type: String,
    pub url: String,
    pub reason: String,
}

/// Result of a directory load: proxies in discovery order plus diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProxyLoad {
    pub proxies: Vec<String>,
    pub skipped: Vec<SkippedSource>,
}

pub struct ProxyDirectory {
    config: ProxyConfig,
    check_url: String,
    insecure_skip_tls_verify: bool,
}

impl ProxyDirectory {
    /// `check_url` is the cheap endpoint used for validation (the exchange
    /// ping endpoint in practice).
    pub fn new(config: ProxyConfig, check_url: impl Into<String>, insecure_skip_tls_verify: bool) -> Self {
        Self {
            config,
            check_url: check_url.into(),
            insecure_skip_tls_verify,
        }
    }

    /// Collect up to `limit` proxies across all configured types.
    pub async fn load(&self) -> ProxyLoad {
        let mut load = ProxyLoad::default();
        if self.config.limit == 0 {
            return load;
        }

        let http = match reqwest::Client::builder()
            .timeout(SOURCE_TIMEOUT)
            .default_headers(browser_headers())
            .danger_accept_invalid_certs(self.insecure_skip_tls_verify)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "cannot build proxy source client, no proxies loaded");
                for proxy_type in &self.config.types {
                    load.skipped.push(SkippedSource {
                        proxy_type: proxy_type.clone(),
                        url: self.source_url_for(proxy_type),
                        reason: e.to_string(),
                    });
                }
                return load;
            }
        };

        let mut seen = HashSet::new();
        let mut fetched_urls = HashSet::new();

        for proxy_type in &self.config.types {
            let url = self.source_url_for(proxy_type);
            if !fetched_urls.insert(url.clone()) {
                continue;
            }

            let entries = match fetch_source(&http, &url).await {
                Ok(body) => parse_proxy_list(&body, proxy_type),
                Err(reason) => {
                    warn!(proxy_type = %proxy_type, url = %url, reason = %reason, "proxy source skipped");
                    load.skipped.push(SkippedSource {
                        proxy_type: proxy_type.clone(),
                        url,
                        reason,
                    });
                    continue;
                }
            };
            debug!(proxy_type = %proxy_type, count = entries.len(), "proxy source fetched");

            for proxy in entries {
                if !seen.insert(proxy.clone()) {
                    continue;
                }
                if self.config.validate && !self.is_live(&proxy).await {
                    debug!(proxy = %proxy, "proxy failed liveness check");
                    continue;
                }
                load.proxies.push(proxy);
                if load.proxies.len() >= self.config.limit {
                    info!(count = load.proxies.len(), "proxy limit reached");
                    return load;
                }
            }
        }

        info!(
            count = load.proxies.len(),
            skipped_sources = load.skipped.len(),
            validated = self.config.validate,
            "proxy directory loaded"
        );
        load
    }

    /// `true` when `proxy` answers the check endpoint with a success status.
    pub async fn is_live(&self, proxy: &str) -> bool {
        let proxy_cfg = match reqwest::Proxy::all(proxy) {
            Ok(p) => p,
            Err(e) => {
                debug!(proxy, error = %e, "unusable proxy address");
                return false;
            }
        };
        let client = match reqwest::Client::builder()
            .proxy(proxy_cfg)
            .timeout(self.config.validate_timeout)
            .default_headers(browser_headers())
            .danger_accept_invalid_certs(self.insecure_skip_tls_verify)
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                debug!(proxy, error = %e, "cannot build liveness client");
                return false;
            }
        };

        match client.get(&self.check_url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(proxy, error = %e, "liveness request failed");
                false
            }
        }
    }

    fn source_url_for(&self, proxy_type: &str) -> String {
        self.config.source_url.replace("{type}", proxy_type)
    }
}

async fn fetch_source(http: &reqwest::Client, url: &str) -> Result<String, String> {
    let resp = http.get(url).send().await.map_err(|e| e.to_string())?;
    let status = resp.status();
    if !status.is_success() {
        return Err(format!("source returned {status}"));
    }
    resp.text().await.map_err(|e| e.to_string())
}

/// Parse a newline-delimited proxy list into normalised addresses, keeping
/// order and dropping duplicates within the list.
pub fn parse_proxy_list(body: &str, proxy_type: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    body.lines()
        .filter_map(|line| normalize_proxy(line, proxy_type))
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

/// Turn a `host:port` entry into `scheme://host:port`.  Entries that already
/// carry a scheme are kept; blank lines, comments and entries without a
/// numeric port are rejected.
pub fn normalize_proxy(entry: &str, proxy_type: &str) -> Option<String> {
    let entry = entry.trim();
    if entry.is_empty() || entry.starts_with('#') {
        return None;
    }

    let (scheme, host_port) = match entry.split_once("://") {
        Some((scheme, rest)) => (scheme.to_lowercase(), rest),
        None => (scheme_for(proxy_type), entry),
    };

    let (host, port) = host_port.trim_end_matches('/').rsplit_once(':')?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return None;
    }

    Some(format!("{scheme}://{host}:{port}"))
}

fn scheme_for(proxy_type: &str) -> String {
    match proxy_type.trim().to_lowercase().as_str() {
        "" | "http" | "https" => "http".to_string(),
        other => other.to_string(),
    }
}
