//! Telegram trade alerts
//!
//! Fire-and-forget: a failed or slow delivery is logged and never blocks
//! or fails the trading loop beyond the request timeout.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub enabled: bool,
    /// Overridden by `TELEGRAM_TOKEN`
    pub bot_token: String,
    /// Overridden by `TELEGRAM_CHAT_ID`
    pub chat_id: String,
    pub timeout_secs: u64,
    pub api_url: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bot_token: String::new(),
            chat_id: String::new(),
            timeout_secs: 3,
            api_url: "https://api.telegram.org".to_string(),
        }
    }
}

impl NotifierConfig {
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("TELEGRAM_TOKEN") {
            self.bot_token = token;
        }
        if let Ok(chat_id) = std::env::var("TELEGRAM_CHAT_ID") {
            self.chat_id = chat_id;
        }
    }

    pub fn is_configured(&self) -> bool {
        self.enabled && !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}

pub fn format_message(msg: &str) -> String {
    format!("[VOLT-X] {}", msg)
}

#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    config: NotifierConfig,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(config: NotifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build Telegram HTTP client")?;
        Ok(Self { config, client })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    /// Send `[VOLT-X] {msg}`; no-op when not configured
    pub async fn notify(&self, msg: &str) {
        if !self.is_enabled() {
            debug!("Telegram not configured, skipping alert");
            return;
        }
        if let Err(e) = self.send_message(&format_message(msg)).await {
            warn!("Telegram alert failed: {:#}", e);
        }
    }

    async fn send_message(&self, text: &str) -> Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.api_url.trim_end_matches('/'),
            self.config.bot_token
        );
        let body = serde_json::json!({
            "chat_id": self.config.chat_id,
            "text": text,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Telegram request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Telegram API error ({}): {}", status, body);
        }
        Ok(())
    }
}
