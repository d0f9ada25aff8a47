//! Engine assembly
//!
//! `AnimationEngine` owns the playback queue, the connection hub, the
//! handler registry and the scheduler, and runs the background loops. The
//! orchestrator talks to it only through [`AnimationChannel`], so tests can
//! substitute a recording fake.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::animation::{create_timing_sync_at, now_secs, AnimationEvent, AnimationEventType, TimingSyncData};
use crate::config::EngineConfig;
use crate::error::SyncError;
use crate::network::ConnectionHub;
use crate::queue::{
    AnimationScheduler, CompletionHook, EventHandler, HandlerRegistry, Playback, PlaybackSnapshot,
};

/// What the orchestrator needs from the engine
pub trait AnimationChannel: Send + Sync {
    /// Add an event to the playback queue
    fn queue_animation(&self, event: AnimationEvent);

    /// Timing data for audio issued now, including measured latency
    fn create_timing_sync(&self, audio_duration: f64, tts_delay: f64) -> TimingSyncData;

    /// Run `handler` whenever an event of `kind` starts playing
    fn register_handler(&self, kind: AnimationEventType, handler: EventHandler);

    /// Run `hook` whenever an event finishes playing
    fn on_step_complete(&self, hook: CompletionHook);

    /// Forget a stale sequence: drop its queued steps and end its playback
    fn expire_sequence(&self, sequence_id: &str) -> usize;

    fn connection_count(&self) -> usize;
}

pub struct AnimationEngine {
    config: EngineConfig,
    playback: Arc<Playback>,
    hub: Arc<ConnectionHub>,
    handlers: Arc<HandlerRegistry>,
    scheduler: Arc<AnimationScheduler>,
    timing: Mutex<Option<TimingSyncData>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl AnimationEngine {
    pub fn new(config: EngineConfig) -> Arc<Self> {
        let playback = Arc::new(Playback::new(config.max_queue_size));
        let hub = Arc::new(ConnectionHub::new(playback.clone(), config.hub_config()));
        let handlers = Arc::new(HandlerRegistry::new());
        let scheduler = Arc::new(AnimationScheduler::new(
            playback.clone(),
            hub.clone(),
            handlers.clone(),
            config.tick_interval(),
        ));

        Arc::new(Self {
            config,
            playback,
            hub,
            handlers,
            scheduler,
            timing: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        })
    }

    /// Spawn the scheduler, heartbeat and idle-viewer loops
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(self.scheduler.clone().run()));
        tasks.push(tokio::spawn(self.hub.clone().heartbeat_loop()));
        tasks.push(tokio::spawn(self.hub.clone().idle_sweep_loop()));
        tracing::info!(
            "Animation engine started (queue {}, heartbeat {}s)",
            self.config.max_queue_size,
            self.config.heartbeat_interval_secs
        );
    }

    /// Cancel background loops, drop viewers and pending playback
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.scheduler.stop();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.hub.close_all();
        self.playback.clear();
        tracing::info!("Animation engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    pub fn playback(&self) -> &Arc<Playback> {
        &self.playback
    }

    pub fn scheduler(&self) -> &Arc<AnimationScheduler> {
        &self.scheduler
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.playback.snapshot()
    }

    /// Most recent timing data produced by `create_timing_sync`
    pub fn last_timing_sync(&self) -> Result<TimingSyncData, SyncError> {
        (*self.timing.lock()).ok_or(SyncError::MissingTimingData)
    }

    /// Mean viewer latency in milliseconds
    pub fn average_latency(&self) -> f64 {
        self.hub.average_latency()
    }
}

impl AnimationChannel for AnimationEngine {
    fn queue_animation(&self, event: AnimationEvent) {
        self.playback.enqueue(event);
    }

    fn create_timing_sync(&self, audio_duration: f64, tts_delay: f64) -> TimingSyncData {
        let sync = create_timing_sync_at(now_secs(), audio_duration, tts_delay, self.hub.average_latency());
        *self.timing.lock() = Some(sync);
        sync
    }

    fn register_handler(&self, kind: AnimationEventType, handler: EventHandler) {
        self.handlers.register_handler(kind, handler);
    }

    fn on_step_complete(&self, hook: CompletionHook) {
        self.playback.on_complete(hook);
    }

    fn expire_sequence(&self, sequence_id: &str) -> usize {
        self.playback.expire_sequence(sequence_id)
    }

    fn connection_count(&self) -> usize {
        self.hub.connection_count()
    }
}

impl Drop for AnimationEngine {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
