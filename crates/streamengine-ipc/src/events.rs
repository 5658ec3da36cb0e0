//! IPC event types (server to client).

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use streamengine_core::Notification;

/// Event sent from daemon to subscribed clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type
    pub event: EventType,
    /// Event data
    pub data: Value,
}

/// Types of events that can be subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A channel or preview window started using the pipeline
    HandlingChannel,
    /// Nothing uses the pipeline any more
    NoMoreChannels,
    /// A stream changed state or direction
    StreamStateChanged,
    /// A stream started or stopped receiving
    Receiving,
    /// The engine is going away
    ShutdownRequested,
    /// Error occurred
    Error,
}

/// Error event data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: u32,
    pub message: String,
}

impl From<&Notification> for Event {
    fn from(notification: &Notification) -> Self {
        let (event, data) = match notification {
            Notification::HandlingChannel => (EventType::HandlingChannel, Value::Null),
            Notification::NoMoreChannels => (EventType::NoMoreChannels, Value::Null),
            Notification::StreamStateChanged { channel, stream_id, state, direction } => (
                EventType::StreamStateChanged,
                json!({ "channel": channel, "stream_id": stream_id, "state": state, "direction": direction }),
            ),
            Notification::Receiving { channel, stream_id, receiving } => (
                EventType::Receiving,
                json!({ "channel": channel, "stream_id": stream_id, "receiving": receiving }),
            ),
            Notification::ShutdownRequested => (EventType::ShutdownRequested, Value::Null),
        };
        Self { event, data }
    }
}

impl Event {
    /// Error event for subscribers.
    #[must_use]
    pub fn error(code: u32, message: impl Into<String>) -> Self {
        let data = ErrorData { code, message: message.into() };
        Self { event: EventType::Error, data: serde_json::to_value(data).unwrap_or(json!({})) }
    }
}

#[cfg(test)]
mod tests {
    use streamengine_core::channel::{StreamDirection, StreamState};

    use super::*;

    #[test]
    fn test_stream_state_event() {
        let event = Event::from(&Notification::StreamStateChanged {
            channel: "/chan/1".into(),
            stream_id: 3,
            state: StreamState::Connected,
            direction: StreamDirection::Bidirectional,
        });
        assert_eq!(event.event, EventType::StreamStateChanged);
        assert_eq!(event.data["stream_id"], 3);
        assert_eq!(event.data["state"], "connected");
    }

    #[test]
    fn test_event_type_wire_names() {
        let json = serde_json::to_string(&Event::from(&Notification::NoMoreChannels)).unwrap();
        assert_eq!(json, r#"{"event":"no_more_channels","data":null}"#);
    }
}
