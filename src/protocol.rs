//! Viewer wire protocol
//!
//! JSON text frames tagged by a `type` field.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::animation::{AnimationEvent, AnimationEventType, Payload};
use crate::error::ProtocolError;

/// Serialized frame shared by every recipient of one broadcast
pub type OutboundFrame = Arc<str>;

/// Server to viewer messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Snapshot sent once on accept
    ConnectionEstablished {
        client_id: String,
        current_animation: Option<AnimationEvent>,
        queue_length: usize,
    },
    #[serde(rename = "animation_event")]
    Animation { event: AnimationEvent },
    Heartbeat {
        timestamp: f64,
        queue_length: usize,
        current_animation: Option<AnimationEventType>,
    },
    Pong {
        /// Echo of the client's ping timestamp
        timestamp: Option<f64>,
        server_timestamp: f64,
    },
}

impl ServerMessage {
    /// Serialize once into a shareable frame
    pub fn to_frame(&self) -> Result<OutboundFrame, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }
}

/// Viewer to server messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping {
        #[serde(default)]
        timestamp: Option<f64>,
    },
    AnimationComplete {
        #[serde(default)]
        sequence_id: Option<String>,
    },
    ParameterFeedback {
        #[serde(default)]
        parameters: Payload,
    },
    LatencyMeasurement {
        /// Milliseconds
        #[serde(default)]
        latency: f64,
    },
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_client_messages() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"ping","timestamp":12.5}"#).unwrap(),
            ClientMessage::Ping { timestamp: Some(12.5) }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"animation_complete","sequence_id":"abc"}"#).unwrap(),
            ClientMessage::AnimationComplete { sequence_id: Some("abc".into()) }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"latency_measurement","latency":42}"#).unwrap(),
            ClientMessage::LatencyMeasurement { latency: 42.0 }
        );
        match ClientMessage::parse(r#"{"type":"parameter_feedback","parameters":{"ParamMouthOpenY":0.4}}"#)
            .unwrap()
        {
            ClientMessage::ParameterFeedback { parameters } => {
                assert_eq!(parameters["ParamMouthOpenY"], json!(0.4));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_and_malformed() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"dance"}"#).unwrap(),
            ClientMessage::Unknown
        );
        assert!(ClientMessage::parse("not json").is_err());
        assert!(ClientMessage::parse(r#"{"timestamp":1}"#).is_err());
    }

    #[test]
    fn test_server_message_tags() {
        let heartbeat = ServerMessage::Heartbeat {
            timestamp: 1.0,
            queue_length: 3,
            current_animation: Some(AnimationEventType::MouthSyncStart),
        };
        let value: serde_json::Value = serde_json::from_str(&heartbeat.to_frame().unwrap()).unwrap();
        assert_eq!(value["type"], "heartbeat");
        assert_eq!(value["current_animation"], "mouth_sync_start");

        let event = ServerMessage::Animation {
            event: AnimationEvent::new(AnimationEventType::SyncTiming, 2.0),
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_frame().unwrap()).unwrap();
        assert_eq!(value["type"], "animation_event");
        assert_eq!(value["event"]["event_type"], "sync_timing");
    }
}
