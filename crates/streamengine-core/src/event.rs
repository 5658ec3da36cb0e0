//! Pipeline events consumed by the Fault Router, and notifications emitted
//! toward observers.

use serde::{Deserialize, Serialize};

use crate::binding::ElementId;
use crate::channel::{StreamDirection, StreamState};

/// Identifies one incarnation of the pipeline; bumped on every rebuild.
pub type Generation = u64;

/// Element state as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Null,
    Ready,
    Paused,
    Playing,
}

/// Error classification carried by a pipeline error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Resource busy: the render surface was taken away
    ResourceBusy,
    /// Resource write failure: the render surface can no longer be drawn to
    ResourceWrite,
    Resource,
    Stream,
    Core,
    Library,
    Other,
}

impl FaultKind {
    /// Whether the error means the render surface itself is gone.
    #[must_use]
    pub fn is_surface_gone(self) -> bool {
        matches!(self, Self::ResourceBusy | Self::ResourceWrite)
    }
}

/// Payload of a pipeline event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEventKind {
    /// The root element changed state
    StateChanged { old: PlaybackState, new: PlaybackState },
    /// An element posted an error; `origin` is the element then its ancestors
    Error { origin: Vec<ElementId>, kind: FaultKind, message: String, debug: Option<String> },
    Warning { origin: Vec<ElementId>, message: String, debug: Option<String> },
}

/// An event from one pipeline generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineEvent {
    pub generation: Generation,
    pub kind: PipelineEventKind,
}

/// Sending half handed to the backend when a pipeline starts.
pub type PipelineEventSender = tokio::sync::mpsc::UnboundedSender<PipelineEvent>;

/// Receiving half drained by the control loop.
pub type PipelineEventReceiver = tokio::sync::mpsc::UnboundedReceiver<PipelineEvent>;

/// Notifications broadcast to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A channel or preview surface started using the pipeline
    HandlingChannel,
    /// No channels and no preview surfaces remain
    NoMoreChannels,
    StreamStateChanged { channel: String, stream_id: u32, state: StreamState, direction: StreamDirection },
    Receiving { channel: String, stream_id: u32, receiving: bool },
    ShutdownRequested,
}
