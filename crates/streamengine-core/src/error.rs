//! Error types for the stream engine core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::binding::WindowId;

/// Core error type for caller-facing engine operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("window ID {0} is already a preview window")]
    AlreadyBound(WindowId),

    #[error("window ID {0} has no binding")]
    NotFound(WindowId),

    #[error("failed to make a video sink: {0}")]
    SinkCreationFailed(String),

    #[error("failed to link sink for window {window}: {reason}")]
    LinkFailed { window: WindowId, reason: String },

    #[error("video pipeline unavailable: {0}")]
    PipelineUnavailable(String),

    #[error("stream engine is not handling the channel {0}")]
    ChannelNotFound(String),

    #[error("the channel {channel} has no stream with id {stream_id}")]
    StreamNotFound { channel: String, stream_id: u32 },

    #[error("stream engine was passed a channel that was not a streamed media channel: {0}")]
    InvalidChannelType(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl Error {
    /// Category reported to remote callers alongside the message.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AlreadyBound(_) | Self::NotFound(_) | Self::InvalidChannelType(_) => {
                ErrorCategory::InvalidArgument
            }
            Self::ChannelNotFound(_) | Self::StreamNotFound { .. } => ErrorCategory::NotAvailable,
            Self::SinkCreationFailed(_)
            | Self::LinkFailed { .. }
            | Self::PipelineUnavailable(_)
            | Self::Stream(_)
            | Self::Graph(_) => ErrorCategory::Failed,
        }
    }
}

/// Coarse error classes carried over the request surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Duplicate binding, unknown window, wrong channel type
    InvalidArgument,
    /// Channel or stream lookup miss
    NotAvailable,
    /// Construction, link, or backend failure
    Failed,
}

/// Failures reported by a [`MediaGraph`](crate::graph::MediaGraph) backend.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("pipeline construction failed: {0}")]
    Construction(String),

    #[error("no render backend could be built")]
    NoRenderBackend,

    #[error("state change failed: {0}")]
    StateChange(String),

    #[error("link failed: {0}")]
    Link(String),

    #[error("unknown sink chain: {0}")]
    UnknownChain(String),

    #[error("pipeline is not running")]
    NotRunning,
}

/// Result type alias for stream engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_and_missing_windows_are_invalid_arguments() {
        assert_eq!(Error::AlreadyBound(WindowId(7)).category(), ErrorCategory::InvalidArgument);
        assert_eq!(Error::NotFound(WindowId(7)).category(), ErrorCategory::InvalidArgument);
    }

    #[test]
    fn test_backend_failures_are_generic_failures() {
        let err = Error::LinkFailed { window: WindowId(3), reason: "tee refused".into() };
        assert_eq!(err.category(), ErrorCategory::Failed);
        assert_eq!(Error::from(GraphError::NotRunning).category(), ErrorCategory::Failed);
    }

    #[test]
    fn test_lookup_misses_are_not_available() {
        let err = Error::StreamNotFound { channel: "/chan/1".into(), stream_id: 2 };
        assert_eq!(err.category(), ErrorCategory::NotAvailable);
        assert_eq!(err.to_string(), "the channel /chan/1 has no stream with id 2");
    }
}
