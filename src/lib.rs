//! # Avatar Animation Sync
//!
//! Drives a virtual avatar's expressions and lip movement in step with
//! synthesized speech, streamed to live viewers over WebSocket.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    Callers (voice session, HTTP API)                 │
//! └──────────────────────────────────┬──────────────────────────────────┘
//!                                    │ synchronize_with_tts / trigger_*
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │              Animation Synchronizer (sync::synchronizer)             │
//! │   expression state machine · sequences · mouth parameter mapping     │
//! └──────────────────────────────────┬──────────────────────────────────┘
//!                                    │ AnimationChannel
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      Animation Engine (engine)                       │
//! │  ┌──────────────────────┐        ┌──────────────────────────────┐   │
//! │  │ Priority Queue       │ tick   │ Scheduler                    │   │
//! │  │ (queue::priority)    ├───────►│ promote · handlers · timers  │   │
//! │  └──────────────────────┘        └──────────────┬───────────────┘   │
//! │                                                 │ broadcast         │
//! │                                                 ▼                   │
//! │  ┌──────────────────────────────────────────────────────────────┐   │
//! │  │ Connection Hub (network::hub)                                 │   │
//! │  │  viewer registry · heartbeat · latency window · inbound msgs  │   │
//! │  └──────┬───────────────────────┬───────────────────────┬───────┘   │
//! └─────────┼───────────────────────┼───────────────────────┼───────────┘
//!           ▼                       ▼                       ▼
//!     ┌───────────┐           ┌───────────┐           ┌───────────┐
//!     │ Viewer 0  │           │ Viewer 1  │           │ Viewer N  │
//!     │ (ui::ws)  │           │ (ui::ws)  │           │ (ui::ws)  │
//!     └───────────┘           └───────────┘           └───────────┘
//! ```

pub mod animation;
pub mod config;
pub mod engine;
pub mod error;
pub mod network;
pub mod protocol;
pub mod queue;
pub mod sync;
pub mod ui;

pub use engine::{AnimationChannel, AnimationEngine};
pub use error::{Error, Result};
pub use sync::AnimationSynchronizer;

/// Application-wide constants
pub mod constants {
    /// Default listen host for the viewer socket
    pub const DEFAULT_HOST: &str = "localhost";

    /// Default WebSocket port for viewers
    pub const DEFAULT_WS_PORT: u16 = 8765;

    /// Maximum queued events before eviction
    pub const DEFAULT_MAX_QUEUE_SIZE: usize = 50;

    pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;

    /// Idle seconds before a silent viewer is dropped
    pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 60;

    /// Scheduler polling interval
    pub const DEFAULT_TICK_INTERVAL_MS: u64 = 100;

    /// Upper bound on a single viewer send
    pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 1000;

    /// Per-viewer outbound frame buffer
    pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

    /// Latency samples kept for averaging
    pub const MAX_LATENCY_SAMPLES: usize = 100;

    pub const MAX_ACCURACY_SAMPLES: usize = 50;

    /// Seconds for the expression transitions around speech
    pub const DEFAULT_TRANSITION_DURATION: f64 = 1.5;

    pub const DEFAULT_SYNC_TOLERANCE: f64 = 0.05;

    /// Grace period past a sequence's expected end before it is swept
    pub const SEQUENCE_GRACE_PERIOD_SECS: f64 = 5.0;

    /// Longest accepted event or transition duration (seconds)
    pub const MAX_EVENT_DURATION_SECS: f64 = 3600.0;

    pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 10;

    pub const DEFAULT_EXPRESSION: &str = "neutral";

    /// How far ahead of the audio the speaking expression starts
    pub const EXPRESSION_LEAD_SECS: f64 = 0.1;

    /// Gap between mouth-sync stop and the return transition
    pub const RETURN_TRANSITION_GAP_SECS: f64 = 0.2;

    /// Padding added to a speech sequence's expected duration
    pub const SEQUENCE_TAIL_SECS: f64 = 0.5;

    pub const SPEAK_TRANSITION_INTENSITY: f64 = 0.7;
    pub const RETURN_TRANSITION_INTENSITY: f64 = 0.6;

    // Speech rate used to estimate audio length from text
    pub const SPEECH_CHARS_PER_WORD: f64 = 5.0;
    pub const SPEECH_WORDS_PER_MINUTE: f64 = 150.0;

    // Mouth mapping defaults
    pub const DEFAULT_SENSITIVITY: f64 = 0.8;
    pub const DEFAULT_SMOOTHING_FACTOR: f64 = 0.3;
    pub const DEFAULT_MIN_MOUTH_OPEN: f64 = 0.1;
    pub const DEFAULT_MAX_MOUTH_OPEN: f64 = 0.9;
    pub const DEFAULT_FORM_VARIATION: f64 = 0.2;
}
