//! Animation synchronizer
//!
//! Public entry point for collaborators (voice session, HTTP layer). Turns
//! high-level requests such as "speak this line with this expression" into
//! queued event sequences and tracks expression/speaking state.
//!
//! Expression state is a two-state machine, `Idle` and `Transitioning`. A
//! trigger while idle arms one commit timer; further triggers while
//! transitioning only move `target_expression`, and the first timer
//! commits whatever target is set when it fires. Passing
//! `interrupt_current = true` cancels the pending commit and arms a fresh
//! timer with the new duration instead.
//!
//! A sequence record lives until its last step finishes playing; the expiry
//! sweep catches sequences whose steps never play.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::{AbortHandle, JoinHandle};
use uuid::Uuid;

use crate::animation::{
    drift_accuracy, estimate_audio_duration, mouth_form, mouth_open, now_secs, AnimationEvent,
    AnimationEventType, AnimationPriority, AnimationSequence, ExpressionTransition,
    MouthSyncConfig, Payload,
};
use crate::config::SyncConfig;
use crate::constants::{
    EXPRESSION_LEAD_SECS, RETURN_TRANSITION_GAP_SECS, RETURN_TRANSITION_INTENSITY,
    SEQUENCE_TAIL_SECS, SPEAK_TRANSITION_INTENSITY,
};
use crate::engine::AnimationChannel;
use crate::error::{Error, Result, SyncError};
use crate::queue::event_handler;
use crate::sync::state::{AnimationStateSnapshot, EngineState, PendingCommit};

pub struct AnimationSynchronizer {
    channel: Arc<dyn AnimationChannel>,
    state: Arc<Mutex<EngineState>>,
    config: SyncConfig,
    mouth: MouthSyncConfig,
    runtime: Handle,
}

impl AnimationSynchronizer {
    /// Create a synchronizer bound to the current Tokio runtime.
    ///
    /// Fails with `Error::Config` outside a runtime; use `with_runtime` there.
    pub fn new(
        channel: Arc<dyn AnimationChannel>,
        config: SyncConfig,
        mouth: MouthSyncConfig,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Config(format!("Synchronizer needs a Tokio runtime: {}", e)))?;
        Ok(Self::with_runtime(channel, config, mouth, runtime))
    }

    /// Create a synchronizer whose timers run on `runtime`; operations may
    /// then be called from any thread.
    pub fn with_runtime(
        channel: Arc<dyn AnimationChannel>,
        config: SyncConfig,
        mouth: MouthSyncConfig,
        runtime: Handle,
    ) -> Self {
        let state = Arc::new(Mutex::new(EngineState::new(
            &config.initial_expression,
            config.max_accuracy_samples,
        )));
        let synchronizer = Self {
            channel,
            state,
            config,
            mouth,
            runtime,
        };
        synchronizer.register_event_handlers();
        synchronizer.register_completion_hook();
        synchronizer
    }

    /// Keep speaking/expression state in step with what viewers are playing
    fn register_event_handlers(&self) {
        let state = self.state.clone();
        let tolerance = self.config.sync_tolerance;
        self.channel.register_handler(
            AnimationEventType::MouthSyncStart,
            event_handler(move |event| {
                // Lip sync is what must line up with audio
                let drift = now_secs() - event.timestamp;
                let mut state = state.lock();
                state.is_speaking = true;
                state.sync_accuracy.record(drift_accuracy(drift, tolerance));
                tracing::debug!("Mouth sync started via event (drift {:.3}s)", drift);
                Ok(())
            }),
        );

        let state = self.state.clone();
        self.channel.register_handler(
            AnimationEventType::MouthSyncStop,
            event_handler(move |_| {
                state.lock().is_speaking = false;
                tracing::debug!("Mouth sync stopped via event");
                Ok(())
            }),
        );

        let state = self.state.clone();
        self.channel.register_handler(
            AnimationEventType::ExpressionChange,
            event_handler(move |event| {
                if let Some(expression) = event.payload.get("expression").and_then(Value::as_str) {
                    state.lock().target_expression = expression.to_string();
                    tracing::debug!("Expression change handled: {}", expression);
                }
                Ok(())
            }),
        );
    }

    /// Drop a sequence record once its last step has played
    fn register_completion_hook(&self) {
        let state = self.state.clone();
        self.channel.on_step_complete(Arc::new(move |event: &AnimationEvent| {
            let Some(sequence_id) = event.sequence_id.as_deref() else {
                return;
            };
            let mut state = state.lock();
            let finished = state
                .active_sequences
                .get(sequence_id)
                .is_some_and(|s| s.steps.last() == Some(event));
            if finished {
                state.active_sequences.remove(sequence_id);
                tracing::debug!("Sequence finished: {}", sequence_id);
            }
        }));
    }

    fn ensure_viewers(&self) -> Result<()> {
        if self.config.require_viewers && self.channel.connection_count() == 0 {
            return Err(SyncError::NoViewers.into());
        }
        Ok(())
    }

    /// Schedule expression and lip-sync events around a line of speech.
    ///
    /// Returns the sequence id grouping the queued steps.
    pub fn synchronize_with_tts(
        &self,
        text: &str,
        expression: &str,
        audio_duration: Option<f64>,
        tts_processing_delay: f64,
    ) -> Result<String> {
        self.ensure_viewers()?;
        let delay = SyncError::check_duration("tts_processing_delay", tts_processing_delay)?;
        let audio_duration = match audio_duration {
            Some(duration) => SyncError::check_duration("audio_duration", duration)?,
            None => estimate_audio_duration(text),
        };

        let timing = self.channel.create_timing_sync(audio_duration, delay);
        let sequence_id = Uuid::new_v4().to_string();

        let steps = {
            let mut state = self.state.lock();
            let sequence = self.build_tts_sequence(
                &sequence_id,
                text,
                expression,
                audio_duration,
                delay,
                timing.animation_start_time,
                &state.current_expression,
            );
            let steps = sequence.steps.clone();
            state.active_sequences.insert(sequence_id.clone(), sequence);
            state.audio_start_time = Some(timing.audio_start_time);
            state.audio_duration = Some(audio_duration);
            steps
        };

        for step in steps {
            self.channel.queue_animation(step);
        }

        tracing::info!(
            "TTS animation synchronized: {} ({:.2}s)",
            sequence_id,
            audio_duration
        );
        Ok(sequence_id)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_tts_sequence(
        &self,
        sequence_id: &str,
        text: &str,
        expression: &str,
        audio_duration: f64,
        delay: f64,
        issue_time: f64,
        current_expression: &str,
    ) -> AnimationSequence {
        let transition_duration = self.config.transition_duration;
        let changes_expression = expression != current_expression;
        let mut steps = Vec::with_capacity(4);

        if changes_expression {
            let lead = (delay - EXPRESSION_LEAD_SECS).max(0.0);
            steps.push(
                AnimationEvent::new(AnimationEventType::ExpressionChange, issue_time + lead)
                    .with_payload(object(json!({
                        "expression": expression,
                        "intensity": SPEAK_TRANSITION_INTENSITY,
                        "duration": transition_duration,
                        "transition_type": "smooth",
                    })))
                    .with_sequence(sequence_id)
                    .with_duration(transition_duration)
                    .with_priority(AnimationPriority::High),
            );
        }

        steps.push(
            AnimationEvent::new(AnimationEventType::MouthSyncStart, issue_time + delay)
                .with_payload(object(json!({
                    "text": text,
                    "audio_duration": audio_duration,
                    "sync_config": serde_json::to_value(&self.mouth).unwrap_or_default(),
                })))
                .with_sequence(sequence_id)
                .with_duration(audio_duration)
                .with_priority(AnimationPriority::Critical),
        );

        steps.push(
            AnimationEvent::new(
                AnimationEventType::MouthSyncStop,
                issue_time + delay + audio_duration,
            )
            .with_payload(object(json!({ "return_to_expression": current_expression })))
            .with_sequence(sequence_id)
            .with_priority(AnimationPriority::High),
        );

        if changes_expression {
            steps.push(
                AnimationEvent::new(
                    AnimationEventType::ExpressionChange,
                    issue_time + delay + audio_duration + RETURN_TRANSITION_GAP_SECS,
                )
                .with_payload(object(json!({
                    "expression": current_expression,
                    "intensity": RETURN_TRANSITION_INTENSITY,
                    "duration": transition_duration,
                    "transition_type": "smooth",
                })))
                .with_sequence(sequence_id)
                .with_duration(transition_duration)
                .with_priority(AnimationPriority::Normal),
            );
        }

        AnimationSequence {
            sequence_id: sequence_id.to_string(),
            steps,
            total_duration: audio_duration + transition_duration * 2.0 + SEQUENCE_TAIL_SECS,
            looping: false,
            priority: AnimationPriority::High,
            start_time: issue_time,
        }
    }

    /// Queue a transition to `expression` and track it to completion
    pub fn trigger_expression_change(
        &self,
        expression: &str,
        intensity: f64,
        duration: f64,
        priority: AnimationPriority,
        interrupt_current: bool,
    ) -> Result<String> {
        self.ensure_viewers()?;
        let duration = SyncError::check_duration("duration", duration)?;
        if !(0.0..=1.0).contains(&intensity) {
            return Err(SyncError::InvalidIntensity(intensity).into());
        }

        let sequence_id = Uuid::new_v4().to_string();
        let now = now_secs();

        let event = {
            let mut state = self.state.lock();

            if interrupt_current {
                if let Some(pending) = state.pending_commit.take() {
                    pending.handle.abort();
                    state.active_sequences.remove(&pending.sequence_id);
                    state.is_transitioning = false;
                    tracing::debug!("Interrupted pending transition {}", pending.sequence_id);
                }
            }

            let transition = (expression != state.current_expression).then(|| {
                ExpressionTransition::new(state.current_expression.as_str(), expression, duration)
            });
            let transition_value = transition
                .as_ref()
                .and_then(|t| serde_json::to_value(t).ok())
                .unwrap_or(Value::Null);

            let event = AnimationEvent::new(AnimationEventType::ExpressionChange, now)
                .with_payload(object(json!({
                    "expression": expression,
                    "intensity": intensity,
                    "duration": duration,
                    "transition": transition_value,
                    "interrupt_current": interrupt_current,
                })))
                .with_sequence(sequence_id.as_str())
                .with_duration(duration)
                .with_priority(priority);

            state.target_expression = expression.to_string();

            if transition.is_some() || state.is_transitioning {
                state.active_sequences.insert(
                    sequence_id.clone(),
                    AnimationSequence {
                        sequence_id: sequence_id.clone(),
                        steps: vec![event.clone()],
                        total_duration: duration,
                        looping: false,
                        priority,
                        start_time: now,
                    },
                );
            }

            if transition.is_some() && !state.is_transitioning {
                state.is_transitioning = true;
                let handle = self.spawn_commit(sequence_id.clone(), duration);
                state.pending_commit = Some(PendingCommit {
                    sequence_id: sequence_id.clone(),
                    handle,
                });
            }

            event
        };

        self.channel.queue_animation(event);
        tracing::info!(
            "Expression change triggered: {} ({}, {}s)",
            expression,
            intensity,
            duration
        );
        Ok(sequence_id)
    }

    fn spawn_commit(&self, sequence_id: String, duration: f64) -> AbortHandle {
        let state = self.state.clone();
        let delay = Duration::try_from_secs_f64(duration).unwrap_or(Duration::ZERO);
        self.runtime
            .spawn(async move {
                tokio::time::sleep(delay).await;
                let mut state = state.lock();
                state.commit_transition(&sequence_id);
                tracing::debug!("Expression committed: {}", state.current_expression);
            })
            .abort_handle()
    }

    /// Begin lip sync. Returns `None` if already speaking.
    pub fn start_mouth_sync(&self, duration: Option<f64>) -> Result<Option<String>> {
        self.ensure_viewers()?;
        let duration = duration
            .map(|d| SyncError::check_duration("duration", d))
            .transpose()?;

        {
            let mut state = self.state.lock();
            if state.is_speaking {
                tracing::warn!("Mouth sync already active");
                return Ok(None);
            }
            state.is_speaking = true;
        }

        let sequence_id = Uuid::new_v4().to_string();
        let mut event = AnimationEvent::new(AnimationEventType::MouthSyncStart, now_secs())
            .with_payload(object(json!({
                "duration": duration,
                "config": serde_json::to_value(&self.mouth).unwrap_or_default(),
            })))
            .with_sequence(sequence_id.as_str())
            .with_priority(AnimationPriority::Critical);
        event.duration = duration;

        self.channel.queue_animation(event);
        tracing::info!("Mouth synchronization started");
        Ok(Some(sequence_id))
    }

    /// End lip sync. Returns `None` if not speaking.
    pub fn stop_mouth_sync(&self) -> Result<Option<String>> {
        {
            let mut state = self.state.lock();
            if !state.is_speaking {
                return Ok(None);
            }
            state.is_speaking = false;
        }

        let sequence_id = Uuid::new_v4().to_string();
        let event = AnimationEvent::new(AnimationEventType::MouthSyncStop, now_secs())
            .with_payload(object(json!({ "return_to_neutral": true })))
            .with_sequence(sequence_id.as_str())
            .with_priority(AnimationPriority::Critical);

        self.channel.queue_animation(event);
        tracing::info!("Mouth synchronization stopped");
        Ok(Some(sequence_id))
    }

    /// Stream one frame of mouth parameters while speaking
    pub fn update_mouth_parameters(
        &self,
        audio_level: f64,
        frequency_bins: Option<&[f64]>,
    ) -> Result<()> {
        if !(0.0..=1.0).contains(&audio_level) {
            return Err(SyncError::InvalidAudioLevel(audio_level).into());
        }
        if !self.state.lock().is_speaking {
            return Ok(());
        }

        let open = mouth_open(audio_level, &self.mouth);
        let form = frequency_bins.map_or(0.0, |bins| mouth_form(bins, &self.mouth));

        let event = AnimationEvent::new(AnimationEventType::MouthSyncUpdate, now_secs())
            .with_payload(object(json!({
                "mouth_open": open,
                "mouth_form": form,
                "audio_level": audio_level,
            })))
            .with_sequence(Uuid::new_v4().to_string())
            .with_priority(AnimationPriority::Critical);

        self.channel.queue_animation(event);
        Ok(())
    }

    /// Drop sequences past their expected end plus the grace period
    pub fn cleanup_expired_sequences(&self) -> usize {
        self.cleanup_expired_sequences_at(now_secs())
    }

    pub fn cleanup_expired_sequences_at(&self, now: f64) -> usize {
        let grace = self.config.cleanup_grace_secs;
        let expired: Vec<String> = {
            let mut state = self.state.lock();
            let expired: Vec<String> = state
                .active_sequences
                .values()
                .filter(|s| s.is_expired(now, grace))
                .map(|s| s.sequence_id.clone())
                .collect();
            for sequence_id in &expired {
                state.active_sequences.remove(sequence_id);
            }
            expired
        };

        for sequence_id in &expired {
            let dropped = self.channel.expire_sequence(sequence_id);
            tracing::debug!(
                "Cleaned up expired sequence: {} ({} queued steps dropped)",
                sequence_id,
                dropped
            );
        }
        expired.len()
    }

    /// Run the expiry sweep every `interval`
    pub fn spawn_cleanup_task(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let synchronizer = Arc::clone(self);
        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                synchronizer.cleanup_expired_sequences();
            }
        })
    }

    pub fn get_animation_state(&self) -> AnimationStateSnapshot {
        self.state.lock().snapshot()
    }

    /// Record one accuracy sample in `[0, 1]`
    pub fn record_sync_accuracy(&self, accuracy: f64) {
        if accuracy.is_finite() {
            self.state.lock().sync_accuracy.record(accuracy.clamp(0.0, 1.0));
        }
    }

    pub fn sync_accuracy(&self) -> f64 {
        self.state.lock().average_sync_accuracy()
    }

    pub fn active_sequence(&self, sequence_id: &str) -> Option<AnimationSequence> {
        self.state.lock().active_sequences.get(sequence_id).cloned()
    }

    pub fn is_speaking(&self) -> bool {
        self.state.lock().is_speaking
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

fn object(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}
