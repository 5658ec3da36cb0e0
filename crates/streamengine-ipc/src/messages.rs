//! IPC message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use streamengine_core::{ErrorCategory, WindowId};

use crate::events::EventType;

/// Request envelope sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique request ID for matching responses
    pub id: u64,
    /// The method to invoke
    pub method: Method,
}

/// Response envelope sent from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Request ID this is responding to
    pub id: u64,
    /// Result of the request
    pub result: Result<Value, ErrorInfo>,
}

/// Error information in a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code
    pub code: i32,
    pub category: ErrorCategory,
    /// Human-readable error message
    pub message: String,
}

impl ErrorInfo {
    /// Create a new error with the code for `category`.
    #[must_use]
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        let code = match category {
            ErrorCategory::InvalidArgument => 400,
            ErrorCategory::NotAvailable => 404,
            ErrorCategory::Failed => 500,
        };
        Self { code, category, message: message.into() }
    }
}

impl From<&streamengine_core::Error> for ErrorInfo {
    fn from(err: &streamengine_core::Error) -> Self {
        Self::new(err.category(), err.to_string())
    }
}

/// Methods that can be invoked via IPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum Method {
    // State queries
    /// Get the current engine snapshot
    GetState,

    // Preview surfaces
    /// Start rendering the local camera into a window
    AddPreviewWindow { window: WindowId },
    /// Stop rendering into a preview window
    RemovePreviewWindow { window: WindowId },

    // Output surfaces
    /// Forget an output window binding
    RemoveOutputWindow { window: WindowId },

    // Stream control
    /// Mute the stream's captured input
    MuteInput { channel: String, stream_id: u32, mute: bool },
    /// Mute the stream's received output
    MuteOutput { channel: String, stream_id: u32, mute: bool },
    /// Set the stream's output volume
    SetOutputVolume { channel: String, stream_id: u32, volume: f64 },
    /// Point the stream's remote video at a window
    SetOutputWindow { channel: String, stream_id: u32, window: WindowId },

    // Channels
    /// A handled channel has closed
    ChannelClosed { channel: String },
    /// Report an error to every handled channel
    Error { code: u32, message: String },

    // Subscriptions
    /// Subscribe to event types
    Subscribe { events: Vec<EventType> },
    /// Unsubscribe from event types
    Unsubscribe { events: Vec<EventType> },

    // System
    /// Request graceful shutdown
    Shutdown,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let json = r#"{"id":7,"method":{"type":"AddPreviewWindow","params":{"window":4194305}}}"#;
        let request: Request = serde_json::from_str(json).unwrap();
        assert_eq!(request.id, 7);
        assert_matches!(request.method, Method::AddPreviewWindow { window } if window == WindowId(4_194_305));

        let json = r#"{"id":8,"method":{"type":"GetState"}}"#;
        let request: Request = serde_json::from_str(json).unwrap();
        assert_matches!(request.method, Method::GetState);
    }

    #[test]
    fn test_error_info_from_engine_error() {
        let info = ErrorInfo::from(&streamengine_core::Error::AlreadyBound(WindowId(3)));
        assert_eq!(info.code, 400);
        assert_eq!(info.category, ErrorCategory::InvalidArgument);

        let info = ErrorInfo::from(&streamengine_core::Error::ChannelNotFound("/chan".into()));
        assert_eq!(info.code, 404);
    }
}
