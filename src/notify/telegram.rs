//! # notify::telegram — POST ข้อความไปยัง Telegram Bot API

use std::time::Duration;

use anyhow::Context;
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::json;
use tracing::info;

use crate::config::TelegramConfig;
use crate::notify::Notifier;

const API_BASE: &str = "https://api.telegram.org";
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TelegramNotifier {
    client: reqwest::Client,
    config: TelegramConfig,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(client: reqwest::Client, config: TelegramConfig) -> Self {
        Self { client, config, api_base: API_BASE.to_string() }
    }

    /// Point at a different Bot API host (self-hosted bot server).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.config.bot_token)
    }

    async fn send(&self, message: &str) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(self.url())
            .json(&json!({
                "chat_id": self.config.chat_id,
                "text": message,
                "disable_web_page_preview": true,
            }))
            .timeout(SEND_TIMEOUT)
            .send()
            .await
            .context("Telegram unreachable")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram rejected message: HTTP {status}: {body}");
        }

        info!(chat_id = %self.config.chat_id, "Message delivered to Telegram ✅");
        Ok(())
    }
}

impl Notifier for TelegramNotifier {
    fn channel(&self) -> &str {
        "telegram"
    }

    fn deliver<'a>(&'a self, message: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        self.send(message).boxed()
    }
}
