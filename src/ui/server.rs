//! Web server hosting the viewer socket and diagnostics

use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::config::ServerConfig;
use crate::engine::AnimationEngine;
use crate::error::{Result, TransportError};
use crate::sync::AnimationSynchronizer;
use crate::ui::handlers;
use crate::ui::websocket::ws_handler;

/// Shared state for request handlers
pub struct AppState {
    pub engine: Arc<AnimationEngine>,
    pub synchronizer: Arc<AnimationSynchronizer>,
    pub started_at: Instant,
}

pub struct WebServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(
        config: ServerConfig,
        engine: Arc<AnimationEngine>,
        synchronizer: Arc<AnimationSynchronizer>,
    ) -> Self {
        let state = Arc::new(AppState {
            engine,
            synchronizer,
            started_at: Instant::now(),
        });
        Self { config, state }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(handlers::get_health))
            .route("/animate/status", get(handlers::get_animation_status))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Serve until `shutdown` resolves, then drain open requests
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::BindFailed(format!("{}: {}", addr, e)))?;

        tracing::info!("Animation server listening on ws://{}/ws", addr);

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        tracing::info!("Animation server stopped");
        Ok(())
    }
}
