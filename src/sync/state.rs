//! Orchestrator state

use serde::Serialize;
use std::collections::HashMap;
use tokio::task::AbortHandle;

use crate::animation::AnimationSequence;
use crate::network::SampleWindow;

/// Pending expression commit timer
pub(crate) struct PendingCommit {
    pub sequence_id: String,
    pub handle: AbortHandle,
}

/// Expression, speaking and sequence state owned by the synchronizer
pub struct EngineState {
    pub current_expression: String,
    pub target_expression: String,
    pub is_speaking: bool,
    pub is_transitioning: bool,
    pub active_sequences: HashMap<String, AnimationSequence>,
    pub audio_start_time: Option<f64>,
    pub audio_duration: Option<f64>,
    pub(crate) sync_accuracy: SampleWindow,
    pub(crate) pending_commit: Option<PendingCommit>,
}

impl EngineState {
    pub fn new(initial_expression: &str, max_accuracy_samples: usize) -> Self {
        Self {
            current_expression: initial_expression.to_string(),
            target_expression: initial_expression.to_string(),
            is_speaking: false,
            is_transitioning: false,
            active_sequences: HashMap::new(),
            audio_start_time: None,
            audio_duration: None,
            sync_accuracy: SampleWindow::new(max_accuracy_samples),
            pending_commit: None,
        }
    }

    /// Mean recorded sync accuracy; 1.0 before any sample
    pub fn average_sync_accuracy(&self) -> f64 {
        self.sync_accuracy.average().unwrap_or(1.0)
    }

    /// Commit the target expression and leave the transitioning state
    pub(crate) fn commit_transition(&mut self, sequence_id: &str) {
        self.current_expression = self.target_expression.clone();
        self.is_transitioning = false;
        self.active_sequences.remove(sequence_id);
        if self
            .pending_commit
            .as_ref()
            .is_some_and(|p| p.sequence_id == sequence_id)
        {
            self.pending_commit = None;
        }
    }

    pub fn snapshot(&self) -> AnimationStateSnapshot {
        AnimationStateSnapshot {
            current_expression: self.current_expression.clone(),
            target_expression: self.target_expression.clone(),
            is_speaking: self.is_speaking,
            is_transitioning: self.is_transitioning,
            active_sequence_count: self.active_sequences.len(),
            average_sync_accuracy: self.average_sync_accuracy(),
            audio_active: self.audio_start_time.is_some(),
        }
    }
}

/// Read-only view returned by `get_animation_state`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationStateSnapshot {
    pub current_expression: String,
    pub target_expression: String,
    pub is_speaking: bool,
    pub is_transitioning: bool,
    pub active_sequence_count: usize,
    pub average_sync_accuracy: f64,
    pub audio_active: bool,
}
