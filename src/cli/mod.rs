//! dealsync CLI
//!
//! Commands:
//! - `dealsync watch` - Run the live dashboard pipeline
//! - `dealsync report` - Fetch one analytics report
//! - `dealsync check-config` - Load and validate configuration

pub mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

use crate::adapters::{
    AnalyticsSource, DocumentStore, HttpAnalyticsClient, StoreRuntime, WsDocumentStore,
};
use crate::config::AppConfig;
use crate::services::DashboardSync;
use output::OutputMode;

/// Hybrid push/poll sync for the deal dashboard
#[derive(Parser, Debug)]
#[command(name = "dealsync")]
#[command(author, version, about = "Live + polled dashboard sync", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Subscribe to the live store, poll analytics and print the merged view
    Watch {
        /// Configuration directory
        #[arg(short, long, env = "DEALSYNC_CONFIG_DIR", default_value = "config")]
        config: String,
        /// Print the first settled view and exit
        #[arg(long)]
        once: bool,
    },
    /// Fetch one analytics report
    Report {
        /// Configuration directory
        #[arg(short, long, env = "DEALSYNC_CONFIG_DIR", default_value = "config")]
        config: String,
        /// Override the analytics endpoint
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// Load, validate and print configuration
    CheckConfig {
        /// Configuration directory
        #[arg(short, long, env = "DEALSYNC_CONFIG_DIR", default_value = "config")]
        config: String,
    },
}

pub fn load_config(dir: &str) -> Result<AppConfig> {
    AppConfig::load_from(dir).with_context(|| format!("failed to load config from {dir}"))
}

/// How long `watch --once` waits for every source to settle
const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run_watch(config: &AppConfig, once: bool, mode: OutputMode) -> Result<()> {
    if let Err(errors) = config.validate() {
        anyhow::bail!("invalid configuration: {}", errors.join("; "));
    }

    let runtime = StoreRuntime::global();
    let store_config = config.store.clone();
    runtime
        .initialize_with(|| async move {
            WsDocumentStore::connect(&store_config)
                .await
                .map(|store| store as Arc<dyn DocumentStore>)
        })
        .await?;

    let analytics: Arc<dyn AnalyticsSource> = Arc::new(HttpAnalyticsClient::new(
        &config.analytics.endpoint,
        config.analytics.request_timeout(),
    )?);
    let sync = DashboardSync::connect(runtime, analytics, config).await?;
    let mut view = sync.view();

    if once {
        let settled = tokio::time::timeout(SETTLE_TIMEOUT, view.wait_for(|v| !v.loading)).await;
        if settled.is_err() {
            warn!("Sources did not settle within {:?}", SETTLE_TIMEOUT);
        }
        let current = sync.current();
        output::print_view(&current, mode)?;
        sync.shutdown();
        return Ok(());
    }

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    warn!("View channel closed");
                    break;
                }
                let current = view.borrow_and_update().clone();
                output::print_view(&current, mode)?;
            }
            _ = &mut ctrl_c => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    let released = sync.shutdown();
    info!("Released {} components", released);
    Ok(())
}

pub async fn run_report(config: &AppConfig, endpoint: Option<&str>, mode: OutputMode) -> Result<()> {
    let endpoint = endpoint.unwrap_or(&config.analytics.endpoint);
    let client = HttpAnalyticsClient::new(endpoint, config.analytics.request_timeout())?;
    let report = client
        .fetch_report()
        .await
        .with_context(|| format!("analytics fetch from {endpoint} failed"))?;

    match mode {
        OutputMode::Table => output::print_items(&output::report_rows(&report), mode),
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

pub fn check_config(config: &AppConfig, mode: OutputMode) -> Result<()> {
    output::print_items(&output::config_rows(config), mode)?;
    match config.validate() {
        Ok(()) => {
            output::print_success("Configuration is valid");
            Ok(())
        }
        Err(errors) => {
            for e in &errors {
                output::print_error(e);
            }
            anyhow::bail!("{} configuration errors", errors.len())
        }
    }
}
