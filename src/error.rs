//! Error types for the animation synchronization engine

use thiserror::Error;

use crate::constants::MAX_EVENT_DURATION_SECS;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Viewer transport errors
///
/// Every variant is recoverable: the affected viewer is dropped and the
/// remaining viewers are unaffected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Send to viewer {0} timed out")]
    SendTimeout(String),

    #[error("Viewer {0} connection closed")]
    ConnectionClosed(String),
}

/// Inbound message errors (logged and ignored)
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid message: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Unsupported frame type")]
    UnsupportedFrame,
}

/// Errors surfaced by orchestrator operations to their caller
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Invalid duration for {field}: {value}")]
    InvalidDuration { field: &'static str, value: f64 },

    #[error("Audio level out of range: {0}")]
    InvalidAudioLevel(f64),

    #[error("Expression intensity out of range: {0}")]
    InvalidIntensity(f64),

    #[error("No timing synchronization data available")]
    MissingTimingData,

    #[error("No viewers connected")]
    NoViewers,

    #[error("Animation engine is not running")]
    EngineNotRunning,
}

impl SyncError {
    /// Validate a duration-like argument: within `[0, MAX_EVENT_DURATION_SECS]`
    pub fn check_duration(field: &'static str, value: f64) -> std::result::Result<f64, SyncError> {
        if (0.0..=MAX_EVENT_DURATION_SECS).contains(&value) {
            Ok(value)
        } else {
            Err(SyncError::InvalidDuration { field, value })
        }
    }
}

/// Result type alias for the engine
pub type Result<T> = std::result::Result<T, Error>;
