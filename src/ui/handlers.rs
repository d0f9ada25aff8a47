//! HTTP diagnostics handlers

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::animation::{AnimationEvent, Payload};
use crate::error::{Error, SyncError};
use crate::queue::QueueStats;
use crate::sync::AnimationStateSnapshot;
use crate::ui::server::AppState;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

impl<T> From<&Error> for ApiResponse<T> {
    fn from(err: &Error) -> Self {
        Self::error(err.to_string())
    }
}

impl Error {
    /// HTTP status reported for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Sync(SyncError::NoViewers | SyncError::EngineNotRunning) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::Sync(_) | Error::Protocol(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()>::from(&self);
        (self.status_code(), Json(body)).into_response()
    }
}

/// Liveness summary
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub engine_running: bool,
    pub connected_viewers: usize,
    pub queue_length: usize,
    pub active_sequences: usize,
    pub average_latency_ms: f64,
    pub latency_samples: usize,
}

/// Animation state plus playback and connection details
#[derive(Debug, Serialize)]
pub struct AnimationStatus {
    pub animation: AnimationStateSnapshot,
    pub current_animation: Option<AnimationEvent>,
    pub queue: QueueStats,
    pub connected_viewers: usize,
    /// Last parameter values reported by a viewer
    pub parameter_feedback: Option<Payload>,
}

pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthStatus>> {
    let engine = &state.engine;
    let running = engine.is_running();
    let health = HealthStatus {
        status: if running { "healthy" } else { "degraded" },
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        engine_running: running,
        connected_viewers: engine.hub().connection_count(),
        queue_length: engine.playback().queue_len(),
        active_sequences: state.synchronizer.get_animation_state().active_sequence_count,
        average_latency_ms: engine.average_latency(),
        latency_samples: engine.hub().latency_sample_count(),
    };

    Json(ApiResponse::ok(health))
}

pub async fn get_animation_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<AnimationStatus>>, Error> {
    let engine = &state.engine;
    if !engine.is_running() {
        return Err(SyncError::EngineNotRunning.into());
    }

    let status = AnimationStatus {
        animation: state.synchronizer.get_animation_state(),
        current_animation: engine.snapshot().current,
        queue: engine.playback().queue_stats(),
        connected_viewers: engine.hub().connection_count(),
        parameter_feedback: engine.hub().last_parameter_feedback(),
    };
    Ok(Json(ApiResponse::ok(status)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, SyncConfig};
    use crate::engine::AnimationEngine;
    use crate::animation::MouthSyncConfig;
    use crate::sync::AnimationSynchronizer;
    use std::time::Instant;

    fn app_state() -> Arc<AppState> {
        let engine = AnimationEngine::new(EngineConfig::default());
        let synchronizer = Arc::new(
            AnimationSynchronizer::new(
                engine.clone(),
                SyncConfig::default(),
                MouthSyncConfig::default(),
            )
            .unwrap(),
        );
        Arc::new(AppState {
            engine,
            synchronizer,
            started_at: Instant::now(),
        })
    }

    #[tokio::test]
    async fn test_health_reports_engine_state() {
        let state = app_state();
        let Json(response) = get_health(State(state.clone())).await;
        let health = response.data.unwrap();
        assert_eq!(health.status, "degraded");
        assert_eq!(health.connected_viewers, 0);
        assert_eq!(health.latency_samples, 0);

        state.engine.start();
        state
            .synchronizer
            .synchronize_with_tts("Hello", "speak", Some(1.0), 0.1)
            .unwrap();
        let Json(response) = get_health(State(state.clone())).await;
        let health = response.data.unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.active_sequences, 1);
        state.engine.shutdown();
    }

    #[tokio::test]
    async fn test_status_requires_running_engine() {
        let state = app_state();
        let err = get_animation_status(State(state.clone())).await.unwrap_err();
        assert!(matches!(err, Error::Sync(SyncError::EngineNotRunning)));
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);

        state.engine.start();
        let Json(response) = get_animation_status(State(state.clone())).await.unwrap();
        assert!(response.success);
        let status = response.data.unwrap();
        assert_eq!(status.animation.current_expression, "neutral");
        assert_eq!(status.queue.capacity, 50);
        assert!(status.parameter_feedback.is_none());
        state.engine.shutdown();
    }

    #[test]
    fn test_errors_map_to_status_and_envelope() {
        let err: Error = SyncError::InvalidIntensity(1.5).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let json = serde_json::to_value(ApiResponse::<()>::from(&err)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "success": false,
                "error": "Sync error: Expression intensity out of range: 1.5",
            })
        );

        let err: Error = SyncError::NoViewers.into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        let err = Error::Config("bad".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_envelope_skips_empty_fields() {
        let json = serde_json::to_value(ApiResponse::ok(3)).unwrap();
        assert_eq!(json, serde_json::json!({ "success": true, "data": 3 }));
        let json = serde_json::to_value(ApiResponse::<()>::error("nope")).unwrap();
        assert_eq!(json, serde_json::json!({ "success": false, "error": "nope" }));
    }
}
