use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bibrelay_server::{backup, config::ServerArgs, routes, startup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_loaded = dotenvy::dotenv().is_ok();
    let args = ServerArgs::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
                |_| "info,bibrelay_server=info,tower_http=warn,sqlx=warn".into(),
            ),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if env_loaded {
        info!("loaded .env file");
    }

    let state = startup::build_state(&args).await?;
    let addr = args.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        %addr,
        backend = state.store.backend(),
        audit_dir = %args.audit_dir.display(),
        "bibrelay-server listening"
    );
    state.activity.submit(format!("service started on {addr}"));

    let app = routes::create_router(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutting down; exporting backup");
    let messages = state.store.messages();
    if let Err(err) = backup::export(&state.backup_path, &messages).await {
        error!(error = %err, "final backup export failed");
    }
    if !state.activity.write("service stopped").await {
        warn!("could not record shutdown in the activity log");
    }
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("ctrl-c received"),
        Err(err) => {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    }
}
