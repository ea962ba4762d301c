//! # Bibrelay Watch
//!
//! Watches one Winlink messages folder per configured channel, parses bib
//! check-ins out of newly saved messages and forwards them to the ingest
//! service.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bibrelay_core::{
    ActivityLog, ChannelName, ChannelQueues, Forwarder, IngestPipeline,
    MonitorManager, PipelineConfig, SharedRecentActivity, WatchFilter,
};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ChannelConfig, WatchConfig};

#[derive(Parser, Debug)]
#[command(name = "bibrelay-watch")]
#[command(about = "Relays bib check-ins from Winlink message folders")]
struct Cli {
    /// Watch configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ingest service base URL (overrides config)
    #[arg(long, env = "BIBRELAY_ENDPOINT")]
    endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_loaded = dotenvy::dotenv().is_ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
                |_| "info,bibrelay_core=info,notify=warn".into(),
            ),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if env_loaded {
        info!("loaded .env file");
    }

    let (mut config, source) = WatchConfig::load(cli.config.as_deref())?;
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    info!(?source, endpoint = %config.endpoint, "watch configuration loaded");
    if config.channels.is_empty() {
        warn!("no channels configured; nothing will be watched");
    }

    let forwarder = Forwarder::new(&config.endpoint)
        .with_context(|| format!("invalid endpoint {}", config.endpoint))?;
    let activity = ActivityLog::new(&config.activity_log);
    let queues = Arc::new(ChannelQueues::new());
    let manager: MonitorManager<ChannelQueues> =
        MonitorManager::new(WatchFilter::new(&config.extension), Arc::clone(&queues));

    let pipeline = Arc::new(IngestPipeline::new(
        Arc::new(SharedRecentActivity::new()),
        forwarder,
        activity.clone(),
        PipelineConfig {
            settle_delay: config.settle_delay(),
            read_retry: config.read_retry,
            origin_host: config.resolved_origin_host(),
        },
    ));

    let mut workers = Vec::new();
    for channel in &config.channels {
        if let Some(name) = open_channel(&manager, channel, &activity) {
            let queue = queues.queue(&name);
            workers.push(pipeline.spawn_channel(name, queue));
        }
    }
    info!(consumers = workers.len(), "channel consumers running");

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
    info!("ctrl-c received; stopping watch channels");

    manager.shutdown();
    for worker in &workers {
        worker.abort();
    }
    for status in manager.snapshot() {
        info!(channel = %status.name, state = %status.lifecycle, "channel closed");
    }
    activity.write("watcher stopped").await;
    Ok(())
}

/// Register, initialize and optionally start one channel. Failures are
/// logged so the remaining channels still come up. Returns the name of an
/// initialized channel.
fn open_channel(
    manager: &MonitorManager<ChannelQueues>,
    channel: &ChannelConfig,
    activity: &ActivityLog,
) -> Option<ChannelName> {
    let name = ChannelName::new(channel.name.clone());
    manager.register(name.clone());

    if let Err(err) = manager.initialize(&name, &channel.path) {
        error!(channel = %name, error = %err, "channel not initialized");
        activity.submit(format!("channel {name} failed to initialize: {err}"));
        return None;
    }

    if !channel.autostart {
        info!(channel = %name, "channel initialized; autostart disabled");
        return Some(name);
    }

    match manager.start(&name) {
        Ok(()) => activity.submit(format!(
            "channel {name} watching {}",
            channel.path.display()
        )),
        Err(err) => {
            error!(channel = %name, error = %err, "channel not started");
        }
    }
    Some(name)
}
