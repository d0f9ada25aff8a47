//! Playback state and the scheduler tick loop
//!
//! The scheduler promotes at most one event per tick, and only when nothing
//! is playing. A promoted event is broadcast, handed to its handlers, and
//! then either completes immediately (no duration) or arms a completion
//! timer. Every promotion gets a playback id so a stale timer can never
//! clear a later event.
//!
//! Completion hooks see each event that finishes playing, whether its timer
//! ran out or a viewer reported it done. Expiry and `clear` drop events
//! without calling them.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

use crate::animation::{AnimationEvent, AnimationEventType};
use crate::network::ConnectionHub;
use crate::queue::handlers::HandlerRegistry;
use crate::queue::priority::{AnimationQueue, QueueStats};

/// Callback run after an event leaves the current slot by completing
pub type CompletionHook = Arc<dyn Fn(&AnimationEvent) + Send + Sync>;

/// Event currently occupying playback
struct CurrentEvent {
    playback_id: u64,
    event: AnimationEvent,
    completion: Option<AbortHandle>,
}

struct PlaybackInner {
    queue: AnimationQueue,
    current: Option<CurrentEvent>,
}

/// Queue plus the "currently playing" slot, shared by hub and scheduler
pub struct Playback {
    inner: Mutex<PlaybackInner>,
    next_playback_id: AtomicU64,
    completion_hooks: RwLock<Vec<CompletionHook>>,
}

/// Point-in-time view for snapshots and heartbeats
#[derive(Debug, Clone)]
pub struct PlaybackSnapshot {
    pub current: Option<AnimationEvent>,
    pub queue_length: usize,
}

impl Playback {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            inner: Mutex::new(PlaybackInner {
                queue: AnimationQueue::new(max_queue_size),
                current: None,
            }),
            next_playback_id: AtomicU64::new(1),
            completion_hooks: RwLock::new(Vec::new()),
        }
    }

    pub fn on_complete(&self, hook: CompletionHook) {
        self.completion_hooks.write().push(hook);
    }

    fn notify_complete(&self, event: &AnimationEvent) {
        let hooks: Vec<CompletionHook> = self.completion_hooks.read().clone();
        for hook in hooks {
            hook(event);
        }
    }

    /// Add an event to the queue, evicting the weakest member when full
    pub fn enqueue(&self, event: AnimationEvent) -> Option<AnimationEvent> {
        let kind = event.kind;
        let evicted = self.inner.lock().queue.push(event);
        match &evicted {
            Some(dropped) => tracing::warn!(
                "Animation queue full, evicted {} (priority {})",
                dropped.kind,
                dropped.priority
            ),
            None => tracing::debug!("Queued animation event: {}", kind),
        }
        evicted
    }

    /// Pop the head into the current slot if nothing is playing
    pub fn promote(&self) -> Option<(u64, AnimationEvent)> {
        let mut inner = self.inner.lock();
        if inner.current.is_some() {
            return None;
        }
        let event = inner.queue.pop()?;
        let playback_id = self.next_playback_id.fetch_add(1, Ordering::Relaxed);
        inner.current = Some(CurrentEvent {
            playback_id,
            event: event.clone(),
            completion: None,
        });
        Some((playback_id, event))
    }

    /// Store the completion timer for a promoted event.
    ///
    /// If the event already left playback the timer is aborted instead.
    pub fn attach_completion(&self, playback_id: u64, handle: AbortHandle) {
        let mut inner = self.inner.lock();
        match inner.current.as_mut() {
            Some(current) if current.playback_id == playback_id => {
                current.completion = Some(handle);
            }
            _ => handle.abort(),
        }
    }

    /// Clear the current slot if it still holds `playback_id`
    pub fn complete(&self, playback_id: u64) -> bool {
        let finished = {
            let mut inner = self.inner.lock();
            if inner
                .current
                .as_ref()
                .is_some_and(|c| c.playback_id == playback_id)
            {
                inner.current.take()
            } else {
                None
            }
        };
        match finished {
            Some(current) => {
                self.notify_complete(&current.event);
                true
            }
            None => false,
        }
    }

    /// Early completion: clear the current slot if it belongs to `sequence_id`
    pub fn complete_sequence(&self, sequence_id: &str) -> bool {
        let finished = {
            let mut inner = self.inner.lock();
            let matches = inner
                .current
                .as_ref()
                .is_some_and(|c| c.event.sequence_id.as_deref() == Some(sequence_id));
            if matches {
                inner.current.take()
            } else {
                None
            }
        };
        let Some(current) = finished else {
            return false;
        };
        if let Some(handle) = current.completion {
            handle.abort();
        }
        self.notify_complete(&current.event);
        true
    }

    /// Stale-sequence sweep: drop queued steps of `sequence_id` and end its
    /// playback if current. Returns the number of queued steps dropped.
    pub fn expire_sequence(&self, sequence_id: &str) -> usize {
        let mut inner = self.inner.lock();
        let dropped = inner.queue.remove_sequence(sequence_id);
        let playing = inner
            .current
            .as_ref()
            .is_some_and(|c| c.event.sequence_id.as_deref() == Some(sequence_id));
        if playing {
            if let Some(handle) = inner.current.take().and_then(|c| c.completion) {
                handle.abort();
            }
        }
        dropped
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let inner = self.inner.lock();
        PlaybackSnapshot {
            current: inner.current.as_ref().map(|c| c.event.clone()),
            queue_length: inner.queue.len(),
        }
    }

    pub fn current_kind(&self) -> Option<AnimationEventType> {
        self.inner.lock().current.as_ref().map(|c| c.event.kind)
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().current.is_some()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.inner.lock().queue.stats()
    }

    /// Drop everything, aborting any pending completion
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.queue.clear();
        if let Some(handle) = inner.current.take().and_then(|c| c.completion) {
            handle.abort();
        }
    }
}

/// Background loop pacing queued events out to viewers
pub struct AnimationScheduler {
    playback: Arc<Playback>,
    hub: Arc<ConnectionHub>,
    handlers: Arc<HandlerRegistry>,
    tick_interval: Duration,
    running: AtomicBool,
}

impl AnimationScheduler {
    pub fn new(
        playback: Arc<Playback>,
        hub: Arc<ConnectionHub>,
        handlers: Arc<HandlerRegistry>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            playback,
            hub,
            handlers,
            tick_interval,
            running: AtomicBool::new(false),
        }
    }

    /// Run until `stop` is called or the owning task is aborted
    pub async fn run(self: Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Animation scheduler started ({:?} tick)", self.tick_interval);

        while self.running.load(Ordering::SeqCst) {
            self.tick().await;
            tokio::time::sleep(self.tick_interval).await;
        }

        tracing::info!("Animation scheduler stopped");
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// One scheduling step; returns the event promoted, if any
    pub async fn tick(&self) -> Option<AnimationEvent> {
        let (playback_id, event) = self.playback.promote()?;

        let report = self.hub.broadcast(&event).await;
        tracing::debug!(
            "Playing {} (seq {:?}) to {} viewers",
            event.kind,
            event.sequence_id,
            report.delivered
        );

        self.handlers.dispatch(&event);

        match event.playback_duration() {
            Some(duration) => {
                let playback = self.playback.clone();
                let timer = tokio::spawn(async move {
                    tokio::time::sleep(duration).await;
                    playback.complete(playback_id);
                });
                self.playback.attach_completion(playback_id, timer.abort_handle());
            }
            None => {
                self.playback.complete(playback_id);
            }
        }

        Some(event)
    }
}
