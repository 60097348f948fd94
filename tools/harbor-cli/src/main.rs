//! Command-line driver for the Harbor offline worker.
//!
//! Provides commands for:
//! - Validating a worker configuration
//! - Installing a worker and routing requests through it
//! - Previewing the notification built from a push payload
//!
//! ## Usage
//!
//! ```bash
//! # Validate a config and show its cache namespaces
//! harbor check harbor.json
//!
//! # Install against the live origin, then fetch through the worker
//! harbor fetch --config harbor.json /static/app.css /api/products
//!
//! # Same, with the network disabled
//! harbor fetch --config harbor.json --offline --navigate /checkout
//!
//! # Preview a push notification
//! harbor push '{"title":"Order shipped","url":"/orders/42"}'
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use harbor_common::{init_logging, LogConfig, LogFormat};
use harbor_core::{NotificationConfig, WorkerConfig};
use harbor_net::{Fetcher, FetcherConfig, HttpFetcher, OfflineFetcher, Request};
use harbor_sw::{HostEnvironment, Notification, OfflineWorker, PushPayload, Router};
use tracing::debug;

#[derive(Parser)]
#[command(name = "harbor")]
#[command(about = "Offline request-caching and notification worker")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log format: pretty, compact, or json
    #[arg(long, default_value = "compact", global = true)]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a worker configuration
    Check {
        /// Path to the JSON config
        config: PathBuf,
    },

    /// Install a worker and route requests through it
    Fetch {
        /// Path to the JSON config
        #[arg(short, long)]
        config: PathBuf,
        /// Disable the network entirely
        #[arg(long)]
        offline: bool,
        /// Issue navigation requests instead of plain GETs
        #[arg(long)]
        navigate: bool,
        /// Paths or URLs, resolved against the origin
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Show the notification a push payload would produce
    Push {
        /// Raw payload (JSON object or text); omitted means no payload
        payload: Option<String>,
        /// Take notification defaults from this config
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn log_config(verbose: u8, format: &str) -> Result<LogConfig> {
    let format: LogFormat = format.parse()?;
    Ok(LogConfig::for_verbosity(verbose).with_format(format))
}

fn load_config(path: &Path) -> Result<WorkerConfig> {
    WorkerConfig::load(path).with_context(|| format!("failed to load {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(log_config(cli.verbose, &cli.log_format)?)?;

    match cli.command {
        Commands::Check { config } => check(&config),
        Commands::Fetch {
            config,
            offline,
            navigate,
            urls,
        } => fetch(&config, offline, navigate, &urls).await,
        Commands::Push { payload, config } => push(payload.as_deref(), config.as_deref()),
    }
}

fn check(path: &Path) -> Result<()> {
    let config = load_config(path)?;

    println!("Config OK: {}", path.display());
    println!("  App:          {} v{}", config.app_name, config.version);
    println!("  Origin:       {}", config.origin);
    println!("  Static cache: {}", config.static_namespace().name);
    println!(
        "  Dynamic cache: {} (max {} entries)",
        config.dynamic_namespace().name,
        config.dynamic_max_entries
    );
    println!("  Precache:     {} URLs", config.precache.len());
    for rule in Router::from_config(&config).rules() {
        println!("  Route:        {:?} {:?} -> {:?}", rule.pattern.pattern_type, rule.pattern.pattern, rule.route);
    }
    Ok(())
}

async fn fetch(path: &Path, offline: bool, navigate: bool, urls: &[String]) -> Result<()> {
    let config = load_config(path)?;

    let fetcher: Arc<dyn Fetcher> = if offline {
        Arc::new(OfflineFetcher)
    } else {
        Arc::new(HttpFetcher::new(FetcherConfig {
            default_timeout: config.network_timeout(),
            ..Default::default()
        })?)
    };

    let targets = urls
        .iter()
        .map(|u| config.resolve(u))
        .collect::<Result<Vec<_>, _>>()?;

    let (host, _events) = HostEnvironment::in_memory(config.origin.clone(), fetcher);
    let worker = OfflineWorker::new(config, host);
    let report = worker.init().await?;

    println!(
        "Installed {}: {} precached, {} failed",
        worker.id(),
        report.precache.cached.len(),
        report.precache.failed.len()
    );
    for url in &report.precache.failed {
        println!("  failed: {}", url);
    }

    for url in targets {
        let request = if navigate {
            Request::navigate(url.clone())
        } else {
            Request::get(url.clone())
        };

        match worker.handle_fetch(&request).await {
            Some(served) => println!(
                "{} {:<14} {} ({} bytes)",
                served.response.status.as_u16(),
                served.source.to_string(),
                url,
                served.response.body_len()
            ),
            None => println!("--- {:<14} {}", "passthrough", url),
        }
    }

    worker.teardown().await;
    Ok(())
}

fn push(payload: Option<&str>, config: Option<&Path>) -> Result<()> {
    let defaults = match config {
        Some(path) => load_config(path)?.notifications,
        None => NotificationConfig::default(),
    };

    let parsed = PushPayload::parse(payload.map(str::as_bytes));
    debug!(?parsed, "Parsed push payload");
    let notification = Notification::from_payload(parsed, &defaults);
    println!("{}", serde_json::to_string_pretty(&notification)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tracing::Level;

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "harbor", "-vv", "fetch", "--config", "harbor.json", "--offline", "/", "/api/a",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Fetch { offline, urls, .. } => {
                assert!(offline);
                assert_eq!(urls, vec!["/".to_string(), "/api/a".to_string()]);
            }
            _ => panic!("expected fetch"),
        }

        assert!(Cli::try_parse_from(["harbor", "fetch", "--config", "harbor.json"]).is_err());
    }

    #[test]
    fn test_log_config() {
        assert_eq!(log_config(0, "json").unwrap().level, Level::WARN);
        assert_eq!(log_config(1, "pretty").unwrap().level, Level::DEBUG);
        assert!(log_config(0, "xml").is_err());
    }

    #[test]
    fn test_check_and_push() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"app_name":"shop","version":"3","origin":"https://shop.example/","precache":["/offline.html"]}}"#
        )
        .unwrap();

        check(file.path()).unwrap();
        push(Some("plain text"), Some(file.path())).unwrap();
        push(None, None).unwrap();
        assert!(check(Path::new("/nonexistent/harbor.json")).is_err());
    }

    #[tokio::test]
    async fn test_fetch_offline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"app_name":"shop","version":"3","origin":"https://shop.example/"}}"#
        )
        .unwrap();

        fetch(file.path(), true, true, &["/checkout".to_string()])
            .await
            .unwrap();
    }
}
