//! Application configuration
//!
//! Loaded from a TOML file; every section falls back to its defaults when
//! absent.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::animation::MouthSyncConfig;
use crate::constants::*;
use crate::error::{Error, Result};
use crate::network::HubConfig;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub sync: SyncConfig,
    pub mouth: MouthSyncConfig,
}

/// Viewer socket listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_WS_PORT,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Queue, scheduler and hub tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_queue_size: usize,
    pub heartbeat_interval_secs: u64,
    pub connection_timeout_secs: u64,
    pub tick_interval_ms: u64,
    pub send_timeout_ms: u64,
    pub max_latency_samples: usize,
    /// Per-viewer outbound frame buffer
    pub outbound_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            max_latency_samples: MAX_LATENCY_SAMPLES,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            connection_timeout: self.connection_timeout(),
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            outbound_buffer: self.outbound_buffer,
            max_latency_samples: self.max_latency_samples,
        }
    }
}

/// Orchestrator behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds for the expression transitions around speech
    pub transition_duration: f64,
    /// Acceptable audio/animation drift in seconds
    pub sync_tolerance: f64,
    /// Seconds past expected completion before a sequence is swept
    pub cleanup_grace_secs: f64,
    pub cleanup_interval_secs: u64,
    pub max_accuracy_samples: usize,
    /// Fail sequence-producing operations when no viewer is connected
    pub require_viewers: bool,
    pub initial_expression: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            transition_duration: DEFAULT_TRANSITION_DURATION,
            sync_tolerance: DEFAULT_SYNC_TOLERANCE,
            cleanup_grace_secs: SEQUENCE_GRACE_PERIOD_SECS,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
            max_accuracy_samples: MAX_ACCURACY_SAMPLES,
            require_viewers: false,
            initial_expression: DEFAULT_EXPRESSION.to_string(),
        }
    }
}

impl AppConfig {
    /// Platform config file location
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "avatar", "animation-sync")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load and validate from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: AppConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, else the platform location, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::info!("Loading config from {}", path.display());
                Self::load(path)
            }
            _ => {
                tracing::info!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Write as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.mouth.validate().map_err(Error::Config)?;

        let engine = &self.engine;
        if engine.max_queue_size == 0 {
            return Err(Error::Config("engine.max_queue_size must be at least 1".into()));
        }
        let zero_field = [
            ("engine.heartbeat_interval_secs", engine.heartbeat_interval_secs),
            ("engine.connection_timeout_secs", engine.connection_timeout_secs),
            ("engine.tick_interval_ms", engine.tick_interval_ms),
            ("engine.send_timeout_ms", engine.send_timeout_ms),
            ("sync.cleanup_interval_secs", self.sync.cleanup_interval_secs),
        ]
        .into_iter()
        .find(|(_, v)| *v == 0);
        if let Some((name, _)) = zero_field {
            return Err(Error::Config(format!("{} must be greater than zero", name)));
        }

        let sync = &self.sync;
        for (name, value) in [
            ("sync.transition_duration", sync.transition_duration),
            ("sync.sync_tolerance", sync.sync_tolerance),
            ("sync.cleanup_grace_secs", sync.cleanup_grace_secs),
        ] {
            if !(0.0..=MAX_EVENT_DURATION_SECS).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be between 0 and {} seconds",
                    name, MAX_EVENT_DURATION_SECS
                )));
            }
        }
        if sync.initial_expression.is_empty() {
            return Err(Error::Config("sync.initial_expression must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8765);
        assert_eq!(config.engine.max_queue_size, 50);
        assert_eq!(config.engine.heartbeat_interval_secs, 30);
        assert_eq!(config.engine.connection_timeout_secs, 60);
        assert_eq!(config.mouth.sensitivity, 0.8);
        assert_eq!(config.mouth.max_mouth_open, 0.9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [mouth]
            sensitivity = 1.2
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.mouth.sensitivity, 1.2);
        assert_eq!(config.mouth.min_mouth_open, 0.1);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.mouth.min_mouth_open = 0.95;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = AppConfig::default();
        config.engine.max_queue_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.engine.tick_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.sync.transition_duration = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.sync.transition_duration = 1e20;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("animation-sync-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");

        let mut config = AppConfig::default();
        config.engine.max_queue_size = 20;
        config.sync.require_viewers = true;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        std::fs::remove_dir_all(dir).ok();
    }
}
