//! Animation Server
//!
//! Runs the animation engine and serves viewers over WebSocket.
//!
//! Usage: `animation-server [config.toml]`

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use avatar_animation_sync::{
    config::AppConfig, ui::WebServer, AnimationEngine, AnimationSynchronizer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Animation Server");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load_or_default(config_path.as_deref())?;
    config.validate()?;

    let engine = AnimationEngine::new(config.engine.clone());
    engine.start();

    let synchronizer = Arc::new(AnimationSynchronizer::new(
        engine.clone(),
        config.sync.clone(),
        config.mouth.clone(),
    )?);
    let cleanup = synchronizer
        .spawn_cleanup_task(Duration::from_secs(config.sync.cleanup_interval_secs));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = WebServer::new(
        config.server.clone(),
        engine.clone(),
        synchronizer.clone(),
    );
    let mut server_handle = tokio::spawn(server.run_until(async move {
        let _ = shutdown_rx.await;
    }));

    tracing::info!(
        "Viewers connect at ws://{}/ws",
        config.server.bind_address()
    );

    // The server only finishes early on bind failure
    let early_exit = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Shutting down...");
            None
        }
        result = &mut server_handle => Some(result),
    };

    cleanup.abort();
    engine.shutdown();
    let _ = shutdown_tx.send(());
    match early_exit {
        Some(result) => result??,
        None => server_handle.await??,
    }

    tracing::info!("Animation server stopped");
    Ok(())
}
