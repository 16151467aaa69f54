// =============================================================================
// Telegram Bot API Client — sendMessage only
// =============================================================================
//
// SECURITY: the bot token is part of the request path, so it is kept out of
// `Debug` output and every error message.
// =============================================================================

use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, instrument};

pub const TELEGRAM_API_ROOT: &str = "https://api.telegram.org";

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("failed to build telegram client: {0}")]
    Client(reqwest::Error),

    #[error("telegram sendMessage request failed: {0}")]
    Http(reqwest::Error),

    #[error("telegram sendMessage returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("telegram API error: {0}")]
    Api(String),
}

#[derive(Clone)]
pub struct TelegramClient {
    base_url: String,
    client: reqwest::Client,
}

impl TelegramClient {
    pub fn new(bot_token: &str) -> Result<Self, TelegramError> {
        Self::with_api_root(bot_token, TELEGRAM_API_ROOT)
    }

    /// Client against a non-default API root (local Bot API server, tests).
    pub fn with_api_root(bot_token: &str, api_root: &str) -> Result<Self, TelegramError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(TelegramError::Client)?;

        Ok(Self {
            base_url: format!("{}/bot{}", api_root.trim_end_matches('/'), bot_token),
            client,
        })
    }

    /// POST sendMessage with HTML parse mode.  Not retried.
    #[instrument(skip(self, text), fields(len = text.len()), name = "telegram::send_message")]
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<Value, TelegramError> {
        let payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let resp = self
            .client
            .post(format!("{}/sendMessage", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| TelegramError::Http(e.without_url()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| TelegramError::Http(e.without_url()))?;

        if !status.is_success() {
            return Err(TelegramError::Status { status, body });
        }

        let data: Value =
            serde_json::from_str(&body).map_err(|_| TelegramError::Api(body.clone()))?;
        if data["ok"].as_bool() != Some(true) {
            return Err(TelegramError::Api(data.to_string()));
        }

        debug!(chat_id, "telegram message sent");
        Ok(data)
    }
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("bot_token", &"<redacted>")
            .finish()
    }
}
