use super::{http_client, SummaryNotifier};
use crate::config::NotifierConfig;
use anyhow::Result;
use async_trait::async_trait;
use omniscan_common::ScanSessionSummary;
use reqwest::Client;

/// POSTs the summary as JSON to a configured URL.
pub struct WebhookNotifier {
    client: Client,
    url: String,
    name: String,
}

impl WebhookNotifier {
    pub fn new(config: &NotifierConfig) -> Self {
        Self {
            client: http_client(),
            url: config.url.clone(),
            name: config.name.clone(),
        }
    }
}

#[async_trait]
impl SummaryNotifier for WebhookNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn notify(&self, summary: &ScanSessionSummary) -> Result<()> {
        let response = self.client.post(&self.url).json(summary).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("notifier '{}' rejected summary ({}): {}", self.name, status, body);
        }

        Ok(())
    }
}
