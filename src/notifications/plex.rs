use super::{http_client, RescanTrigger};
use crate::config::MediaServerConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;

/// Partial refresh of one Plex library section.
pub struct PlexClient {
    client: Client,
    base_url: String,
    token: String,
    section_id: String,
    name: String,
}

impl PlexClient {
    pub fn new(config: &MediaServerConfig) -> Result<Self> {
        let section_id = config
            .section_id
            .clone()
            .with_context(|| format!("Plex server '{}' has no section_id", config.name))?;

        Ok(Self {
            client: http_client(),
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.api_key.clone(),
            section_id,
            name: config.name.clone(),
        })
    }
}

#[async_trait]
impl RescanTrigger for PlexClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn trigger_media_server_rescan(&self, directory: &Path) -> Result<()> {
        let url = format!(
            "{}/library/sections/{}/refresh",
            self.base_url, self.section_id
        );

        let response = self
            .client
            .get(&url)
            .query(&[("path", directory.to_string_lossy().as_ref())])
            .header("X-Plex-Token", &self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Plex refresh failed ({}): {}", status, body);
        }

        Ok(())
    }
}
