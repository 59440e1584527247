use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

mod app;
mod workers;

#[derive(Parser, Debug)]
#[command(name = "frontdesk", about = "Conversational appointment-booking agent")]
struct Args {
    /// Path to frontdesk.toml (defaults to ~/.frontdesk/frontdesk.toml).
    #[arg(long)]
    config: Option<String>,

    /// Bind address for the webhook/chat surface.
    #[arg(long, default_value = "127.0.0.1:8873")]
    bind: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "frontdesk=info,tower_http=warn".into()),
        )
        .init();

    let args = Args::parse();
    let config = frontdesk_core::config::FrontdeskConfig::load(args.config.as_deref())?;
    // Startup failures are fatal: a half-configured booking agent must
    // not take traffic.
    config.validate()?;

    let state = Arc::new(app::AppState::build(config)?);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker_handles = workers::spawn_all(state.clone(), shutdown_rx);

    let router = app::build_router(state.clone());
    let addr: SocketAddr = args.bind.parse()?;
    info!("frontdesk listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    for handle in worker_handles {
        let _ = handle.await;
    }
    info!("frontdesk stopped");
    Ok(())
}
