use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

/// Command line and environment configuration for the ingest service.
#[derive(Parser, Debug, Clone)]
#[command(name = "bibrelay-server")]
#[command(about = "Receives relayed Winlink bib messages, stores and audits them")]
pub struct ServerArgs {
    /// Interface to bind
    #[arg(long, env = "BIBRELAY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "BIBRELAY_PORT", default_value_t = 5150)]
    pub port: u16,

    /// PostgreSQL connection string; messages stay in memory when unset
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Directory receiving one audit file per message id
    #[arg(long, env = "BIBRELAY_AUDIT_DIR", default_value = "audit")]
    pub audit_dir: PathBuf,

    /// Service activity log
    #[arg(
        long,
        env = "BIBRELAY_ACTIVITY_LOG",
        default_value = "logs/bibrelay-server.log"
    )]
    pub activity_log: PathBuf,

    /// Snapshot file imported at startup and exported on shutdown
    #[arg(
        long,
        env = "BIBRELAY_BACKUP_PATH",
        default_value = "backup/messages.json"
    )]
    pub backup_path: PathBuf,

    /// Skip importing the snapshot at startup
    #[arg(long, default_value_t = false)]
    pub no_rehydrate: bool,
}

impl ServerArgs {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| {
                format!("invalid bind address {}:{}", self.host, self.port)
            })
    }
}
