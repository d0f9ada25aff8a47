//! Animation event model
//!
//! Immutable records describing one animation action plus the scheduling
//! metadata the queue orders them by. The serde form is the wire form
//! consumed by viewers.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Duration;

/// Event payload: string-keyed map of JSON values specific to the event type
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Closed set of animation event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationEventType {
    ExpressionChange,
    MouthSyncStart,
    MouthSyncUpdate,
    MouthSyncStop,
    AnimationQueue,
    ParameterUpdate,
    SyncTiming,
}

impl AnimationEventType {
    /// Wire name of this event type
    pub fn as_str(&self) -> &'static str {
        match self {
            AnimationEventType::ExpressionChange => "expression_change",
            AnimationEventType::MouthSyncStart => "mouth_sync_start",
            AnimationEventType::MouthSyncUpdate => "mouth_sync_update",
            AnimationEventType::MouthSyncStop => "mouth_sync_stop",
            AnimationEventType::AnimationQueue => "animation_queue",
            AnimationEventType::ParameterUpdate => "parameter_update",
            AnimationEventType::SyncTiming => "sync_timing",
        }
    }
}

impl std::fmt::Display for AnimationEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named priority levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl AnimationPriority {
    /// Integer priority used for queue ordering
    pub fn value(self) -> i32 {
        match self {
            AnimationPriority::Low => 1,
            AnimationPriority::Normal => 5,
            AnimationPriority::High => 8,
            AnimationPriority::Critical => 10,
        }
    }
}

impl Default for AnimationPriority {
    fn default() -> Self {
        AnimationPriority::Normal
    }
}

impl From<AnimationPriority> for i32 {
    fn from(priority: AnimationPriority) -> Self {
        priority.value()
    }
}

/// A single animation action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationEvent {
    /// Kind of action
    #[serde(rename = "event_type")]
    pub kind: AnimationEventType,
    /// Seconds since the Unix epoch at which the event should play
    pub timestamp: f64,
    /// Type-specific parameters
    #[serde(rename = "data", default)]
    pub payload: Payload,
    /// Groups the steps of one logical action
    #[serde(default)]
    pub sequence_id: Option<String>,
    /// Seconds the event occupies playback; `None` means instantaneous
    #[serde(default)]
    pub duration: Option<f64>,
    /// Higher is served first
    #[serde(default)]
    pub priority: i32,
}

impl AnimationEvent {
    pub fn new(kind: AnimationEventType, timestamp: f64) -> Self {
        Self {
            kind,
            timestamp,
            payload: Payload::new(),
            sequence_id: None,
            duration: None,
            priority: AnimationPriority::Normal.value(),
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_sequence(mut self, sequence_id: impl Into<String>) -> Self {
        self.sequence_id = Some(sequence_id.into());
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_priority(mut self, priority: impl Into<i32>) -> Self {
        self.priority = priority.into();
        self
    }

    /// Queue ordering: priority descending, then timestamp ascending.
    ///
    /// `Ordering::Less` means `self` is served before `other`.
    pub fn queue_order(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.timestamp.total_cmp(&other.timestamp))
    }

    /// Duration that should gate the next promotion, if any.
    ///
    /// Values a `Duration` cannot hold (negative, NaN, overflowing) count as
    /// instantaneous.
    pub fn playback_duration(&self) -> Option<Duration> {
        self.duration
            .and_then(|d| Duration::try_from_secs_f64(d).ok())
            .filter(|d| !d.is_zero())
    }
}

/// A group of events forming one composite action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationSequence {
    pub sequence_id: String,
    pub steps: Vec<AnimationEvent>,
    pub total_duration: f64,
    #[serde(rename = "loop", default)]
    pub looping: bool,
    pub priority: AnimationPriority,
    /// Issue time (seconds since epoch); used by the expiry sweep
    pub start_time: f64,
}

impl AnimationSequence {
    /// Whether the sequence is past its expected end plus `grace` seconds
    pub fn is_expired(&self, now: f64, grace: f64) -> bool {
        now - self.start_time > self.total_duration + grace
    }
}

/// Easing curve tag for expression transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Easing {
    #[serde(rename = "linear")]
    Linear,
    #[serde(rename = "easeIn")]
    EaseIn,
    #[serde(rename = "easeOut")]
    EaseOut,
    #[default]
    #[serde(rename = "easeInOut")]
    EaseInOut,
}

/// Transition between two named expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionTransition {
    pub from_expression: String,
    pub to_expression: String,
    pub duration: f64,
    #[serde(rename = "easing_type")]
    pub easing: Easing,
    pub blend_factor: f64,
}

impl ExpressionTransition {
    pub fn new(from: impl Into<String>, to: impl Into<String>, duration: f64) -> Self {
        Self {
            from_expression: from.into(),
            to_expression: to.into(),
            duration,
            easing: Easing::EaseInOut,
            blend_factor: 1.0,
        }
    }
}

/// Current wall-clock time in seconds since the Unix epoch
pub fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_form() {
        let mut payload = Payload::new();
        payload.insert("expression".into(), json!("happy"));
        let event = AnimationEvent::new(AnimationEventType::ExpressionChange, 100.5)
            .with_payload(payload)
            .with_sequence("seq-1")
            .with_duration(2.0)
            .with_priority(AnimationPriority::High);

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], "expression_change");
        assert_eq!(value["timestamp"], 100.5);
        assert_eq!(value["data"]["expression"], "happy");
        assert_eq!(value["sequence_id"], "seq-1");
        assert_eq!(value["duration"], 2.0);
        assert_eq!(value["priority"], 8);

        let back: AnimationEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_queue_order() {
        let low = AnimationEvent::new(AnimationEventType::ExpressionChange, 1.0)
            .with_priority(AnimationPriority::Low);
        let critical_late = AnimationEvent::new(AnimationEventType::MouthSyncUpdate, 9.0)
            .with_priority(AnimationPriority::Critical);
        let critical_early = AnimationEvent::new(AnimationEventType::MouthSyncStart, 2.0)
            .with_priority(AnimationPriority::Critical);

        assert_eq!(critical_late.queue_order(&low), Ordering::Less);
        assert_eq!(critical_early.queue_order(&critical_late), Ordering::Less);
        assert_eq!(low.queue_order(&critical_early), Ordering::Greater);
    }

    #[test]
    fn test_priority_values() {
        let values: Vec<i32> = [
            AnimationPriority::Low,
            AnimationPriority::Normal,
            AnimationPriority::High,
            AnimationPriority::Critical,
        ]
        .iter()
        .map(|p| p.value())
        .collect();
        assert_eq!(values, vec![1, 5, 8, 10]);
    }

    #[test]
    fn test_playback_duration() {
        let event = AnimationEvent::new(AnimationEventType::ExpressionChange, 0.0);
        assert_eq!(event.playback_duration(), None);
        assert_eq!(
            event.clone().with_duration(1.5).playback_duration(),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(event.clone().with_duration(0.0).playback_duration(), None);
        assert_eq!(event.clone().with_duration(-1.0).playback_duration(), None);
        assert_eq!(event.clone().with_duration(f64::NAN).playback_duration(), None);
        assert_eq!(event.with_duration(1e20).playback_duration(), None);
    }

    #[test]
    fn test_sequence_expiry() {
        let sequence = AnimationSequence {
            sequence_id: "s".into(),
            steps: Vec::new(),
            total_duration: 2.0,
            looping: false,
            priority: AnimationPriority::High,
            start_time: 100.0,
        };
        assert!(!sequence.is_expired(106.9, 5.0));
        assert!(sequence.is_expired(107.1, 5.0));
    }

    #[test]
    fn test_transition_easing_tag() {
        let transition = ExpressionTransition::new("neutral", "happy", 1.5);
        let value = serde_json::to_value(&transition).unwrap();
        assert_eq!(value["easing_type"], "easeInOut");
        assert_eq!(value["blend_factor"], 1.0);
    }
}
