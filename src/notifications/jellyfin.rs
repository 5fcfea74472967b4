use super::{http_client, RescanTrigger};
use crate::config::MediaServerConfig;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::path::Path;

/// Jellyfin and Emby share the `Library/Media/Updated` endpoint.
pub struct JellyfinClient {
    client: Client,
    base_url: String,
    api_key: String,
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct MediaUpdated<'a> {
    updates: Vec<MediaUpdate<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct MediaUpdate<'a> {
    path: &'a str,
    update_type: &'static str,
}

impl JellyfinClient {
    pub fn new(config: &MediaServerConfig) -> Self {
        Self {
            client: http_client(),
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            name: config.name.clone(),
        }
    }
}

#[async_trait]
impl RescanTrigger for JellyfinClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn trigger_media_server_rescan(&self, directory: &Path) -> Result<()> {
        let url = format!("{}/Library/Media/Updated", self.base_url);
        let path = directory.to_string_lossy();
        let body = MediaUpdated {
            updates: vec![MediaUpdate {
                path: &path,
                update_type: "Modified",
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("X-Emby-Token", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Jellyfin rescan failed ({}): {}", status, body);
        }

        Ok(())
    }
}
