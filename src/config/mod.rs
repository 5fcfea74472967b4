pub mod persist;
mod types;

pub use types::*;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use std::path::Path;

use crate::verify::walk::IgnoreSet;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./config.toml",
        "./omniscan.toml",
        "~/.config/omniscan/config.toml",
        "/etc/omniscan/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Parse a `schedule.start_time` value ("HH:MM", local time).
pub fn parse_start_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .with_context(|| format!("Invalid schedule.start_time {:?}, expected HH:MM", value))
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    let ws = &config.server.webhook_security;
    if ws.signature_verification && ws.signature_secret.as_deref().unwrap_or("").is_empty() {
        anyhow::bail!("Webhook signature verification is enabled but no secret is set");
    }

    let scan = &config.scan;
    if scan.max_workers == 0 {
        anyhow::bail!("scan.max_workers must be at least 1");
    }
    if scan.intra_job_fanout == 0 {
        anyhow::bail!("scan.intra_job_fanout must be at least 1");
    }
    if scan.probe_timeout_secs == 0 {
        anyhow::bail!("scan.probe_timeout_secs must be at least 1");
    }
    if scan.media_extensions.is_empty() {
        anyhow::bail!("scan.media_extensions cannot be empty");
    }
    IgnoreSet::new(&scan.ignore_patterns).context("Invalid scan.ignore_patterns")?;

    if let Some(ref start) = config.schedule.start_time {
        parse_start_time(start)?;
    }

    for root in &config.roots {
        if !root.path.is_absolute() {
            anyhow::bail!("Root path must be absolute: {:?}", root.path);
        }
        if root.enabled && !root.path.exists() {
            tracing::warn!("Root path does not exist: {:?}", root.path);
        }
    }

    for server in &config.media_servers {
        if server.enabled && server.api_key.is_empty() {
            anyhow::bail!("Media server '{}' is enabled but has no API key", server.name);
        }
        if server.enabled
            && server.kind == MediaServerKind::Plex
            && server.section_id.is_none()
        {
            anyhow::bail!("Plex server '{}' requires a section_id", server.name);
        }
    }

    for notifier in &config.notifiers {
        if notifier.enabled && notifier.url.is_empty() {
            anyhow::bail!("Notifier '{}' is enabled but has no URL", notifier.name);
        }
    }

    if config.storage.history_limit == 0 {
        anyhow::bail!("storage.history_limit must be at least 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.scan.debounce_secs, 10);
        assert_eq!(config.scan.max_workers, 4);
        assert_eq!(config.scan.intra_job_fanout, 2);
        assert_eq!(config.scan.deletion_threshold, 50);
        assert!(config.scan.rescan_on_restored);
        assert!(config.scan.abort_on_mass_deletion);
        assert!(config.watch.enabled);
        assert!(!config.scan.ignore_samples);
        assert_eq!(config.scan.min_duration(), None);
        assert!(config.schedule.run_on_startup);
        assert_eq!(config.schedule.interval_hours, 24);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_parse_schedule_and_samples() {
        let config: Config = toml::from_str(
            r#"
            [scan]
            ignore_samples = true
            min_duration_secs = 120

            [schedule]
            run_on_startup = false
            interval_hours = 6
            start_time = "03:30"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.scan.min_duration(),
            Some(std::time::Duration::from_secs(120))
        );
        assert!(!config.schedule.run_on_startup);
        assert_eq!(config.schedule.interval_hours, 6);
        assert!(validate_config(&config).is_ok());
        assert_eq!(
            parse_start_time("03:30").unwrap(),
            NaiveTime::from_hms_opt(3, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_minimal() {
        let config: Config = toml::from_str(
            r#"
            [scan]
            debounce_secs = 3
            rollup_depth = 1

            [[roots]]
            path = "/media/tv"
            recursive = false

            [[media_servers]]
            name = "jf"
            type = "jellyfin"
            url = "http://jf:8096"
            api_key = "k"
            "#,
        )
        .unwrap();

        assert_eq!(config.scan.debounce_secs, 3);
        assert_eq!(config.scan.rollup_depth, Some(1));
        assert_eq!(config.scan.max_workers, 4);
        assert!(config.roots[0].enabled);
        assert!(!config.roots[0].recursive);
        assert_eq!(config.media_servers[0].kind, MediaServerKind::Jellyfin);
        assert!(config.media_servers[0].enabled);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.scan.max_workers = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.roots.push(RootConfig::new("relative/path"));
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.media_servers.push(MediaServerConfig {
            name: "plex".into(),
            kind: MediaServerKind::Plex,
            url: "http://plex:32400".into(),
            api_key: "t".into(),
            enabled: true,
            section_id: None,
        });
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.server.webhook_security.signature_verification = true;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.schedule.start_time = Some("25:00".into());
        assert!(validate_config(&config).is_err());
    }
}
