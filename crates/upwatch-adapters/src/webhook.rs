//! Chat notifications through an incoming webhook.
//!
//! Posts `{"text": "..."}`, which Slack, Mattermost and Discord's
//! Slack-compatible endpoint all accept.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use upwatch_core::{Notifier, UpwatchConfig};

pub const WEBHOOK_URL_ENV: &str = "NOTIFICATION_WEBHOOK_URL";

pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }

    /// `NOTIFICATION_WEBHOOK_URL` wins over the config file. `None` when
    /// neither is set.
    pub fn from_config(config: &UpwatchConfig) -> Result<Option<Self>> {
        let url = std::env::var(WEBHOOK_URL_ENV)
            .ok()
            .or_else(|| config.notifications.webhook_url.clone())
            .filter(|u| !u.trim().is_empty());
        url.map(|u| Self::new(&u)).transpose()
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        let response = self
            .http
            .post(&self.url)
            .json(&json!({ "text": message }))
            .send()
            .await
            .context("posting notification")?;

        let status = response.status();
        if !status.is_success() {
            bail!("webhook answered {status}");
        }
        debug!("notification delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serve_once;

    #[tokio::test]
    async fn posts_text_payload() {
        let (base, request) = serve_once(200, "ok").await;
        let notifier = WebhookNotifier::new(&format!("{base}/hooks/abc")).unwrap();

        notifier.send("🟥 Api is **down**").await.unwrap();

        let request = request.await.unwrap();
        assert!(request.request_line().starts_with("POST /hooks/abc "));
        assert_eq!(request.json(), json!({ "text": "🟥 Api is **down**" }));
    }

    #[tokio::test]
    async fn error_status_fails() {
        let (base, _request) = serve_once(500, "").await;
        let notifier = WebhookNotifier::new(&base).unwrap();
        assert!(notifier.send("x").await.is_err());
    }

    #[test]
    fn config_url_used_when_env_unset() {
        if std::env::var(WEBHOOK_URL_ENV).is_ok() {
            return;
        }
        let config = UpwatchConfig::from_yaml(
            "notifications:\n  webhookUrl: https://hooks.example.com/x\n",
        )
        .unwrap();
        let notifier = WebhookNotifier::from_config(&config).unwrap().unwrap();
        assert_eq!(notifier.url, "https://hooks.example.com/x");
        assert!(WebhookNotifier::from_config(&UpwatchConfig::default()).unwrap().is_none());
    }
}
