//! Audio/animation timing alignment

use serde::{Deserialize, Serialize};

use crate::constants::{SPEECH_CHARS_PER_WORD, SPEECH_WORDS_PER_MINUTE};

/// Alignment between a future audio start and animation playback
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingSyncData {
    /// Seconds since epoch at which speech audio starts
    pub audio_start_time: f64,
    pub audio_duration: f64,
    /// Seconds since epoch at which animation playback begins
    pub animation_start_time: f64,
    pub tts_processing_delay: f64,
    /// Informational, in seconds
    pub network_latency: f64,
}

/// Build timing data for audio issued at `issue_time`.
///
/// `average_latency_ms` is the hub's measured mean viewer latency.
pub fn create_timing_sync_at(
    issue_time: f64,
    audio_duration: f64,
    tts_delay: f64,
    average_latency_ms: f64,
) -> TimingSyncData {
    TimingSyncData {
        audio_start_time: issue_time + tts_delay,
        audio_duration,
        animation_start_time: issue_time,
        tts_processing_delay: tts_delay,
        network_latency: average_latency_ms / 1000.0,
    }
}

/// Estimate speech duration from text length.
///
/// ~150 words per minute at ~5 characters per word, plus 0.5s overhead,
/// never below one second.
pub fn estimate_audio_duration(text: &str) -> f64 {
    let words = text.chars().count() as f64 / SPEECH_CHARS_PER_WORD;
    let duration = words / SPEECH_WORDS_PER_MINUTE * 60.0;
    (duration + 0.5).max(1.0)
}

/// Score a playback drift against `tolerance` (both in seconds).
///
/// Within tolerance scores 1.0; beyond it the score falls off as
/// `tolerance / |drift|`.
pub fn drift_accuracy(drift: f64, tolerance: f64) -> f64 {
    let drift = drift.abs();
    if drift <= tolerance {
        1.0
    } else if tolerance <= 0.0 {
        0.0
    } else {
        tolerance / drift
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_create_timing_sync() {
        let sync = create_timing_sync_at(1_000.0, 2.0, 0.2, 50.0);
        assert_eq!(sync.animation_start_time, 1_000.0);
        assert!((sync.audio_start_time - 1_000.2).abs() < 1e-9);
        assert!((sync.network_latency - 0.05).abs() < 1e-12);
        assert_eq!(sync.audio_duration, 2.0);
    }

    #[test]
    fn test_estimate_audio_duration() {
        assert_eq!(estimate_audio_duration(""), 1.0);
        assert_eq!(estimate_audio_duration("Hi"), 1.0);
        // 750 chars = 150 words = 60s
        let long = "a".repeat(750);
        assert!((estimate_audio_duration(&long) - 60.5).abs() < 1e-9);
    }

    #[test]
    fn test_drift_accuracy() {
        assert_eq!(drift_accuracy(0.0, 0.05), 1.0);
        assert_eq!(drift_accuracy(-0.05, 0.05), 1.0);
        assert!((drift_accuracy(0.2, 0.05) - 0.25).abs() < 1e-12);
        assert!((drift_accuracy(-0.5, 0.05) - 0.1).abs() < 1e-12);
        assert_eq!(drift_accuracy(0.01, 0.0), 0.0);
    }

    proptest! {
        #[test]
        fn prop_delay_preserved(
            issue in 1.6e9f64..2.0e9,
            duration in 0.0f64..600.0,
            delay in 0.0f64..10.0,
        ) {
            let sync = create_timing_sync_at(issue, duration, delay, 0.0);
            let gap = sync.audio_start_time - sync.animation_start_time;
            prop_assert!((gap - delay).abs() < 1e-3);
            prop_assert!(sync.animation_start_time <= issue);
        }

        #[test]
        fn prop_drift_accuracy_bounded(drift in -100.0f64..100.0, tolerance in 0.0f64..1.0) {
            let accuracy = drift_accuracy(drift, tolerance);
            prop_assert!((0.0..=1.0).contains(&accuracy));
        }
    }
}
