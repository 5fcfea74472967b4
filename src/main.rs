mod cli;

use omniscan::{
    config::{self, RootConfig},
    notifications::NotificationManager,
    scheduler::{periodic, Scheduler, SchedulerOptions},
    server::{self, auth},
    verify::{classify_file, default_prober},
    watch,
};
use omniscan_common::{HealthStatus, ScanSessionSummary};
use omniscan_db::pool::init_pool;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting omniscan");
    if omniscan::metrics::install().is_none() {
        tracing::warn!("Prometheus metrics unavailable");
    }

    let data_dir = match config.storage.data_dir.clone() {
        Some(dir) => PathBuf::from(shellexpand::tilde(&dir.to_string_lossy()).as_ref()),
        None => config_path
            .and_then(|p| p.parent())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_default()),
    };
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

    let db_path = data_dir.join("omniscan.db");
    let db_path_str = db_path.to_string_lossy();
    tracing::info!("Initializing database at {}", db_path_str);
    let db_pool = init_pool(&db_path_str).context("Failed to open database")?;

    let host = config.server.host.clone();
    let port = config.server.port;

    let scheduler = Scheduler::start(
        config,
        SchedulerOptions {
            db: Some(db_pool),
            config_path: config_path.map(|p| p.to_path_buf()),
            ..Default::default()
        },
    )?;

    let shutdown = CancellationToken::new();
    let watcher = watch::FileWatcher::new(Arc::clone(&scheduler)).start(shutdown.clone())?;
    let schedule = periodic::spawn(Arc::clone(&scheduler), shutdown.clone());

    let server_result =
        server::start_server(Arc::clone(&scheduler), &host, port, shutdown.clone()).await;

    tracing::info!("Shutting down...");
    shutdown.cancel();
    if let Err(e) = watcher.await {
        tracing::warn!("File watcher task failed: {}", e);
    }
    if let Err(e) = schedule.await {
        tracing::warn!("Scan schedule task failed: {}", e);
    }
    scheduler.shutdown().await;

    server_result
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "omniscan=trace,omniscan_probe=debug,omniscan_db=debug,tower_http=debug".to_string()
        } else {
            "omniscan=debug,omniscan_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Scan { dir, flat, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(scan_directory(&dir, !flat, cli.config.as_deref(), json))
        }
        Commands::Check { file, json } => check_file(&file, cli.config.as_deref(), json),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("omniscan {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::GenerateSecret => {
            println!("{}", auth::generate_secret());
            Ok(())
        }
    }
}

/// One-shot scan: the directory becomes the only root, nothing is persisted
/// and no media server is contacted.
async fn scan_directory(
    dir: &Path,
    recursive: bool,
    config_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    let dir = std::fs::canonicalize(dir).with_context(|| format!("Cannot scan {:?}", dir))?;
    if !dir.is_dir() {
        anyhow::bail!("Not a directory: {:?}", dir);
    }

    let mut config = config::load_config_or_default(config_path)?;
    config.roots = vec![RootConfig {
        path: dir.clone(),
        enabled: true,
        recursive,
    }];
    config.watch.enabled = false;

    let scheduler = Scheduler::start(
        config,
        SchedulerOptions {
            notifications: Some(Arc::new(NotificationManager::with_targets(vec![], vec![]))),
            ..Default::default()
        },
    )?;

    let handle = scheduler.trigger_manual_scan(&dir).await?;
    let status = handle.wait().await;
    tracing::debug!(job_id = %handle.id, %status, "scan finished");

    let summary = scheduler
        .history(None)
        .into_iter()
        .find(|s| s.job_id == handle.id)
        .context("Scan finished without a summary")?;
    scheduler.shutdown().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if summary.failed {
        anyhow::bail!(
            "Scan failed: {}",
            summary.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn print_summary(summary: &ScanSessionSummary) {
    println!("Directory: {}", summary.directory.display());
    println!("Status: {}", summary.status);
    println!("Added: {}", summary.counts.added);
    println!("Removed: {}", summary.counts.removed);
    println!("Corrupt: {}", summary.counts.corrupt);
    println!("Restored: {}", summary.counts.restored);
    println!("Unchanged: {}", summary.counts.unchanged);

    let corrupt: Vec<_> = summary.changes.iter().filter(|c| c.to.is_corrupt()).collect();
    if !corrupt.is_empty() {
        println!("\nCorrupt files:");
        for change in corrupt {
            println!("  [{}] {}", change.to, change.path.display());
        }
    }
    for warning in &summary.warnings {
        println!("Warning: {}", warning);
    }
}

fn check_file(file: &Path, config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let prober = default_prober(config.scan.probe_timeout());
    let record = classify_file(file, None, &prober, config.scan.min_duration());

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("File: {}", record.path.display());
        println!("Status: {}", record.status);
        println!("Size: {} bytes", record.size);
        if let Some(ref detail) = record.detail {
            println!("Detail: {}", detail);
        }
    }

    if record.status == HealthStatus::Missing {
        anyhow::bail!("File does not exist: {:?}", file);
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Watch enabled: {}", config.watch.enabled);
            println!("  Roots: {}", config.roots.len());
            println!(
                "    Enabled: {}",
                config.roots.iter().filter(|r| r.enabled).count()
            );
            println!("  Media servers: {}", config.media_servers.len());
            println!("  Notifiers: {}", config.notifiers.len());
            println!("  Debounce: {}s", config.scan.debounce_secs);
            println!(
                "  Scheduled scans: every {}h{}{}",
                config.schedule.interval_hours,
                config
                    .schedule
                    .start_time
                    .as_deref()
                    .map(|t| format!(" from {}", t))
                    .unwrap_or_default(),
                if config.schedule.run_on_startup {
                    ", on startup"
                } else {
                    ""
                }
            );
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}
