//! Connection hub
//!
//! Tracks live viewers and fans serialized events out to all of them. A
//! failed or stalled viewer is dropped on the spot; delivery to the others
//! carries on in the same cycle.

use dashmap::DashMap;
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::animation::{now_secs, AnimationEvent, Payload};
use crate::constants::{
    DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_HEARTBEAT_INTERVAL_SECS, DEFAULT_OUTBOUND_BUFFER,
    DEFAULT_SEND_TIMEOUT_MS, MAX_LATENCY_SAMPLES,
};
use crate::network::latency::SampleWindow;
use crate::network::viewer::ViewerHandle;
use crate::protocol::{ClientMessage, OutboundFrame, ServerMessage};
use crate::queue::Playback;

/// Hub tuning
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub heartbeat_interval: Duration,
    /// Silence after which a viewer is dropped
    pub connection_timeout: Duration,
    pub send_timeout: Duration,
    pub outbound_buffer: usize,
    pub max_latency_samples: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
            connection_timeout: Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT_SECS),
            send_timeout: Duration::from_millis(DEFAULT_SEND_TIMEOUT_MS),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            max_latency_samples: MAX_LATENCY_SAMPLES,
        }
    }
}

/// A freshly registered viewer: its id plus the frames to write to its socket
pub struct AcceptedViewer {
    pub client_id: String,
    pub outbound: mpsc::Receiver<OutboundFrame>,
}

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub removed: usize,
}

/// How an inbound frame was handled
#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    Pong,
    Completed { sequence_id: String, cleared: bool },
    Feedback { parameters: usize },
    Latency(f64),
    Ignored,
}

pub struct ConnectionHub {
    viewers: DashMap<String, Arc<ViewerHandle>>,
    playback: Arc<Playback>,
    latency: Mutex<SampleWindow>,
    parameter_feedback: Mutex<Option<Payload>>,
    config: HubConfig,
}

impl ConnectionHub {
    pub fn new(playback: Arc<Playback>, config: HubConfig) -> Self {
        Self {
            viewers: DashMap::new(),
            playback,
            latency: Mutex::new(SampleWindow::new(config.max_latency_samples)),
            parameter_feedback: Mutex::new(None),
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Register a viewer and send it the current playback snapshot
    pub async fn accept(&self, remote: Option<SocketAddr>) -> AcceptedViewer {
        let client_id = match remote {
            Some(addr) => format!("{}_{}", addr, uuid::Uuid::new_v4().simple()),
            None => uuid::Uuid::new_v4().to_string(),
        };
        let (handle, outbound) = ViewerHandle::channel(client_id.clone(), self.config.outbound_buffer);
        let handle = Arc::new(handle);
        self.viewers.insert(client_id.clone(), handle);
        tracing::info!("New viewer connected: {}", client_id);

        let snapshot = self.playback.snapshot();
        self.send_to(
            &client_id,
            &ServerMessage::ConnectionEstablished {
                client_id: client_id.clone(),
                current_animation: snapshot.current,
                queue_length: snapshot.queue_length,
            },
        )
        .await;

        AcceptedViewer { client_id, outbound }
    }

    /// Forget a viewer; its writer sees the channel close
    pub fn disconnect(&self, client_id: &str) -> bool {
        let removed = self.viewers.remove(client_id).is_some();
        if removed {
            tracing::info!("Viewer {} disconnected", client_id);
        }
        removed
    }

    /// Send one message to one viewer; a failure removes that viewer
    pub async fn send_to(&self, client_id: &str, message: &ServerMessage) -> bool {
        let Some(viewer) = self.viewers.get(client_id).map(|v| v.value().clone()) else {
            return false;
        };
        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Failed to serialize message for {}: {}", client_id, e);
                return false;
            }
        };
        match viewer.send(frame, self.config.send_timeout).await {
            Ok(()) => true,
            Err(e) => {
                tracing::info!("{}; removing viewer", e);
                self.viewers.remove(client_id);
                false
            }
        }
    }

    /// Serialize the event once and deliver it to every viewer
    pub async fn broadcast(&self, event: &AnimationEvent) -> BroadcastReport {
        if self.viewers.is_empty() {
            tracing::debug!("No viewers connected for animation broadcast");
            return BroadcastReport::default();
        }
        let message = ServerMessage::Animation {
            event: event.clone(),
        };
        match message.to_frame() {
            Ok(frame) => self.send_to_all(frame).await,
            Err(e) => {
                tracing::error!("Failed to serialize {} event: {}", event.kind, e);
                BroadcastReport::default()
            }
        }
    }

    async fn send_to_all(&self, frame: OutboundFrame) -> BroadcastReport {
        // Stable snapshot: viewers joining mid-broadcast wait for the next one
        let recipients: Vec<Arc<ViewerHandle>> =
            self.viewers.iter().map(|v| v.value().clone()).collect();
        let timeout = self.config.send_timeout;

        let results = join_all(recipients.iter().map(|viewer| {
            let frame = frame.clone();
            async move { viewer.send(frame, timeout).await }
        }))
        .await;

        let mut report = BroadcastReport::default();
        for (viewer, result) in recipients.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::info!("{}; removing viewer", e);
                    self.viewers.remove(viewer.id());
                    report.removed += 1;
                }
            }
        }
        report
    }

    /// Dispatch one inbound text frame. Never fails: bad input is logged.
    pub async fn handle_inbound(&self, client_id: &str, text: &str) -> InboundOutcome {
        if let Some(viewer) = self.viewers.get(client_id) {
            viewer.touch();
        }

        let message = match ClientMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Malformed message from {}: {}", client_id, e);
                return InboundOutcome::Ignored;
            }
        };

        match message {
            ClientMessage::Ping { timestamp } => {
                let pong = ServerMessage::Pong {
                    timestamp,
                    server_timestamp: now_secs(),
                };
                self.send_to(client_id, &pong).await;
                InboundOutcome::Pong
            }
            ClientMessage::AnimationComplete { sequence_id } => match sequence_id {
                Some(sequence_id) => {
                    let cleared = self.playback.complete_sequence(&sequence_id);
                    if cleared {
                        tracing::debug!("Animation completed by viewer: {}", sequence_id);
                    }
                    InboundOutcome::Completed {
                        sequence_id,
                        cleared,
                    }
                }
                None => InboundOutcome::Ignored,
            },
            ClientMessage::ParameterFeedback { parameters } => {
                let count = parameters.len();
                tracing::debug!("Received parameter feedback: {} parameters", count);
                *self.parameter_feedback.lock() = Some(parameters);
                InboundOutcome::Feedback { parameters: count }
            }
            ClientMessage::LatencyMeasurement { latency } => {
                if self.record_latency(latency) {
                    InboundOutcome::Latency(latency)
                } else {
                    tracing::warn!("Rejected latency sample {} from {}", latency, client_id);
                    InboundOutcome::Ignored
                }
            }
            ClientMessage::Unknown => {
                tracing::warn!("Unknown message type from {}", client_id);
                InboundOutcome::Ignored
            }
        }
    }

    /// Mark a viewer as alive without a text frame (socket ping/pong)
    pub fn touch(&self, client_id: &str) {
        if let Some(viewer) = self.viewers.get(client_id) {
            viewer.touch();
        }
    }

    /// Record a latency sample in milliseconds
    pub fn record_latency(&self, latency_ms: f64) -> bool {
        latency_ms >= 0.0 && self.latency.lock().record(latency_ms)
    }

    /// Mean measured latency in milliseconds (0 with no samples)
    pub fn average_latency(&self) -> f64 {
        self.latency.lock().average().unwrap_or(0.0)
    }

    pub fn latency_sample_count(&self) -> usize {
        self.latency.lock().len()
    }

    pub fn last_parameter_feedback(&self) -> Option<Payload> {
        self.parameter_feedback.lock().clone()
    }

    /// Send one heartbeat to every viewer
    pub async fn heartbeat(&self) -> BroadcastReport {
        if self.viewers.is_empty() {
            return BroadcastReport::default();
        }
        let snapshot = self.playback.snapshot();
        let message = ServerMessage::Heartbeat {
            timestamp: now_secs(),
            queue_length: snapshot.queue_length,
            current_animation: snapshot.current.map(|e| e.kind),
        };
        match message.to_frame() {
            Ok(frame) => self.send_to_all(frame).await,
            Err(e) => {
                tracing::error!("Failed to serialize heartbeat: {}", e);
                BroadcastReport::default()
            }
        }
    }

    /// Periodic heartbeat, independent of the scheduler
    pub async fn heartbeat_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.heartbeat_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let report = self.heartbeat().await;
            if report.removed > 0 {
                tracing::debug!("Heartbeat dropped {} viewers", report.removed);
            }
        }
    }

    /// Drop every viewer silent for at least `connection_timeout`
    pub fn drop_idle_viewers(&self) -> Vec<String> {
        let timeout = self.config.connection_timeout;
        let idle: Vec<String> = self
            .viewers
            .iter()
            .filter(|v| v.value().idle_for() >= timeout)
            .map(|v| v.key().clone())
            .collect();
        for client_id in &idle {
            if self.viewers.remove(client_id).is_some() {
                tracing::info!(
                    "Viewer {} silent for {}s, closing",
                    client_id,
                    timeout.as_secs()
                );
            }
        }
        idle
    }

    /// Periodic idle check; a dropped viewer's session sees its channel close
    pub async fn idle_sweep_loop(self: Arc<Self>) {
        let period = (self.config.connection_timeout / 4).max(Duration::from_millis(100));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.drop_idle_viewers();
        }
    }

    pub fn connection_count(&self) -> usize {
        self.viewers.len()
    }

    pub fn viewer_ids(&self) -> Vec<String> {
        self.viewers.iter().map(|v| v.key().clone()).collect()
    }

    /// Drop every viewer, closing their writers
    pub fn close_all(&self) {
        let count = self.viewers.len();
        self.viewers.clear();
        if count > 0 {
            tracing::info!("Closed {} viewer connections", count);
        }
    }

    /// Register a viewer directly, bypassing the snapshot (used by tests)
    #[cfg(test)]
    pub(crate) fn insert_viewer(&self, handle: ViewerHandle) {
        self.viewers.insert(handle.id().to_string(), Arc::new(handle));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{AnimationEventType, AnimationPriority};

    fn hub() -> (Arc<Playback>, ConnectionHub) {
        let playback = Arc::new(Playback::new(50));
        let hub = ConnectionHub::new(playback.clone(), HubConfig::default());
        (playback, hub)
    }

    fn parse(frame: &str) -> serde_json::Value {
        serde_json::from_str(frame).unwrap()
    }

    #[tokio::test]
    async fn test_accept_sends_snapshot() {
        let (playback, hub) = hub();
        playback.enqueue(AnimationEvent::new(AnimationEventType::ExpressionChange, 1.0));

        let mut viewer = hub.accept(None).await;
        let frame = viewer.outbound.recv().await.unwrap();
        let value = parse(&frame);
        assert_eq!(value["type"], "connection_established");
        assert_eq!(value["client_id"], viewer.client_id.as_str());
        assert_eq!(value["queue_length"], 1);
        assert!(value["current_animation"].is_null());
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_viewer_removed_healthy_viewer_served() {
        let (_, hub) = hub();
        let (broken, broken_rx) = ViewerHandle::channel("broken", 4);
        drop(broken_rx);
        let (healthy, mut healthy_rx) = ViewerHandle::channel("healthy", 4);
        hub.insert_viewer(broken);
        hub.insert_viewer(healthy);

        let event = AnimationEvent::new(AnimationEventType::MouthSyncStart, 5.0)
            .with_priority(AnimationPriority::Critical);
        let report = hub.broadcast(&event).await;

        assert_eq!(report, BroadcastReport { delivered: 1, removed: 1 });
        assert_eq!(hub.viewer_ids(), vec!["healthy".to_string()]);
        let value = parse(&healthy_rx.recv().await.unwrap());
        assert_eq!(value["type"], "animation_event");
        assert_eq!(value["event"]["event_type"], "mouth_sync_start");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_viewer_times_out() {
        let (_, hub) = hub();
        let (stalled, _stalled_rx) = ViewerHandle::channel("stalled", 1);
        let (healthy, mut healthy_rx) = ViewerHandle::channel("healthy", 8);
        hub.insert_viewer(stalled);
        hub.insert_viewer(healthy);

        let event = AnimationEvent::new(AnimationEventType::ParameterUpdate, 1.0);
        hub.broadcast(&event).await;
        let report = hub.broadcast(&event).await;

        assert_eq!(report.removed, 1);
        assert_eq!(hub.connection_count(), 1);
        assert!(healthy_rx.recv().await.is_some());
        assert!(healthy_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (_, hub) = hub();
        let mut viewer = hub.accept(None).await;
        viewer.outbound.recv().await.unwrap();

        let outcome = hub
            .handle_inbound(&viewer.client_id, r#"{"type":"ping","timestamp":123.25}"#)
            .await;
        assert_eq!(outcome, InboundOutcome::Pong);
        let value = parse(&viewer.outbound.recv().await.unwrap());
        assert_eq!(value["type"], "pong");
        assert_eq!(value["timestamp"], 123.25);
        assert!(value["server_timestamp"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_animation_complete_clears_matching_sequence() {
        let (playback, hub) = hub();
        playback.enqueue(
            AnimationEvent::new(AnimationEventType::ExpressionChange, 1.0)
                .with_sequence("seq-1")
                .with_duration(3.0),
        );
        playback.promote().unwrap();

        let outcome = hub
            .handle_inbound("v", r#"{"type":"animation_complete","sequence_id":"other"}"#)
            .await;
        assert_eq!(
            outcome,
            InboundOutcome::Completed { sequence_id: "other".into(), cleared: false }
        );
        assert!(playback.is_playing());

        hub.handle_inbound("v", r#"{"type":"animation_complete","sequence_id":"seq-1"}"#)
            .await;
        assert!(!playback.is_playing());
    }

    #[tokio::test]
    async fn test_latency_window_bounded() {
        let playback = Arc::new(Playback::new(50));
        let hub = ConnectionHub::new(
            playback,
            HubConfig {
                max_latency_samples: 3,
                ..HubConfig::default()
            },
        );
        for latency in [10, 20, 30, 40] {
            let msg = format!(r#"{{"type":"latency_measurement","latency":{}}}"#, latency);
            hub.handle_inbound("v", &msg).await;
        }
        assert_eq!(hub.latency_sample_count(), 3);
        assert!((hub.average_latency() - 30.0).abs() < 1e-9);

        let outcome = hub
            .handle_inbound("v", r#"{"type":"latency_measurement","latency":-5}"#)
            .await;
        assert_eq!(outcome, InboundOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_ignored() {
        let (_, hub) = hub();
        let mut viewer = hub.accept(None).await;
        viewer.outbound.recv().await.unwrap();

        assert_eq!(hub.handle_inbound(&viewer.client_id, "{{nope").await, InboundOutcome::Ignored);
        assert_eq!(
            hub.handle_inbound(&viewer.client_id, r#"{"type":"wave"}"#).await,
            InboundOutcome::Ignored
        );
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_parameter_feedback_recorded() {
        let (_, hub) = hub();
        let outcome = hub
            .handle_inbound(
                "v",
                r#"{"type":"parameter_feedback","parameters":{"ParamMouthOpenY":0.5,"ParamMouthForm":0.1}}"#,
            )
            .await;
        assert_eq!(outcome, InboundOutcome::Feedback { parameters: 2 });
        assert_eq!(hub.last_parameter_feedback().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_loop_sends_every_interval() {
        let playback = Arc::new(Playback::new(50));
        let hub = Arc::new(ConnectionHub::new(
            playback,
            HubConfig {
                heartbeat_interval: Duration::from_secs(30),
                ..HubConfig::default()
            },
        ));
        let mut viewer = hub.accept(None).await;
        viewer.outbound.recv().await.unwrap();

        let task = tokio::spawn(hub.clone().heartbeat_loop());
        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(parse(&viewer.outbound.try_recv().unwrap())["type"], "heartbeat");

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(viewer.outbound.try_recv().is_err());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(parse(&viewer.outbound.try_recv().unwrap())["type"], "heartbeat");
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(parse(&viewer.outbound.try_recv().unwrap())["type"], "heartbeat");

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_viewer_dropped_after_timeout() {
        let playback = Arc::new(Playback::new(50));
        let hub = Arc::new(ConnectionHub::new(
            playback,
            HubConfig {
                connection_timeout: Duration::from_secs(60),
                ..HubConfig::default()
            },
        ));
        let mut silent = hub.accept(None).await;
        let mut chatty = hub.accept(None).await;
        silent.outbound.recv().await.unwrap();
        chatty.outbound.recv().await.unwrap();

        let task = tokio::spawn(hub.clone().idle_sweep_loop());
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_secs(20)).await;
            hub.handle_inbound(&chatty.client_id, r#"{"type":"animation_complete"}"#)
                .await;
        }

        assert_eq!(hub.viewer_ids(), vec![chatty.client_id.clone()]);
        // Writer side observes the close
        assert!(silent.outbound.recv().await.is_none());
        task.abort();
    }

    #[tokio::test]
    async fn test_heartbeat_reports_queue() {
        let (playback, hub) = hub();
        let mut viewer = hub.accept(None).await;
        viewer.outbound.recv().await.unwrap();

        playback.enqueue(AnimationEvent::new(AnimationEventType::MouthSyncStart, 1.0).with_duration(2.0));
        playback.enqueue(AnimationEvent::new(AnimationEventType::MouthSyncStop, 2.0));
        playback.promote();

        hub.heartbeat().await;
        let value = parse(&viewer.outbound.recv().await.unwrap());
        assert_eq!(value["type"], "heartbeat");
        assert_eq!(value["queue_length"], 1);
        assert_eq!(value["current_animation"], "mouth_sync_start");
    }
}
