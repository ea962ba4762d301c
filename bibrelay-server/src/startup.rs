use std::sync::Arc;

use anyhow::Context;
use bibrelay_core::ActivityLog;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::MIGRATOR;
use crate::audit::AuditLog;
use crate::backup;
use crate::config::ServerArgs;
use crate::repository::{
    InMemoryMessageRepository, MessageRepository, PostgresMessageRepository,
};
use crate::state::AppState;
use crate::store::MessageStore;

/// Connect and migrate PostgreSQL, or fall back to process memory.
pub async fn connect_repository(
    database_url: Option<&str>,
) -> anyhow::Result<Arc<dyn MessageRepository>> {
    let Some(url) = database_url.filter(|url| !url.trim().is_empty()) else {
        warn!("DATABASE_URL not set; accepted messages are kept in memory only");
        return Ok(Arc::new(InMemoryMessageRepository::new()));
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await
        .context("failed to connect to PostgreSQL")?;
    MIGRATOR
        .run(&pool)
        .await
        .context("failed to apply database migrations")?;
    info!("connected to PostgreSQL and applied migrations");
    Ok(Arc::new(PostgresMessageRepository::new(pool)))
}

/// Build the shared state, rehydrating the store from the snapshot.
pub async fn build_state(args: &ServerArgs) -> anyhow::Result<AppState> {
    let repository = connect_repository(args.database_url.as_deref()).await?;
    let store = Arc::new(MessageStore::new(repository));

    if !args.no_rehydrate {
        let restored = store.rehydrate(backup::import(&args.backup_path).await);
        info!(restored, "store rehydrated from backup");
    }

    tokio::fs::create_dir_all(&args.audit_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create audit directory {}",
                args.audit_dir.display()
            )
        })?;

    Ok(AppState::new(
        store,
        AuditLog::new(&args.audit_dir),
        ActivityLog::new(&args.activity_log),
        args.backup_path.clone(),
    ))
}
