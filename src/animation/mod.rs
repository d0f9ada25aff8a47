//! Animation data model and pure signal mapping
//!
//! Leaf layer of the engine: event records, the audio-to-mouth mapper and
//! the timing calculator. Nothing here touches the network.

pub mod event;
pub mod mouth;
pub mod timing;

pub use event::{
    now_secs, AnimationEvent, AnimationEventType, AnimationPriority, AnimationSequence, Easing,
    ExpressionTransition, Payload,
};
pub use mouth::{mouth_form, mouth_open, MouthSyncConfig};
pub use timing::{create_timing_sync_at, drift_accuracy, estimate_audio_duration, TimingSyncData};
