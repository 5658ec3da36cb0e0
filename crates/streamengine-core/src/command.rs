//! Requests for the engine's control loop.
//!
//! Requests are built by the IPC layer (or in-process collaborators) and
//! answered through the attached oneshot, so all mutation stays on the loop.

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::binding::{SinkChain, WindowId};
use crate::channel::{MediaChannel, MediaStream, StreamDirection, StreamState};
use crate::error::Result;
use crate::sink::SinkPurpose;
use crate::state::EngineSnapshot;

/// A request handled on the control loop.
pub enum EngineRequest {
    AddPreviewWindow { window: WindowId, reply: oneshot::Sender<Result<()>> },
    RemovePreviewWindow { window: WindowId, reply: oneshot::Sender<Result<()>> },
    /// Register a chain the stream has already linked
    AddOutputWindow {
        stream: Arc<dyn MediaStream>,
        chain: SinkChain,
        window: WindowId,
        reply: oneshot::Sender<bool>,
    },
    RemoveOutputWindow { window: WindowId, reply: oneshot::Sender<bool> },
    /// Build an unlinked render chain for a stream collaborator
    MakeVideoSink { purpose: SinkPurpose, reply: oneshot::Sender<Result<SinkChain>> },
    HandleChannel {
        channel_type: String,
        channel: Arc<dyn MediaChannel>,
        reply: oneshot::Sender<Result<()>>,
    },
    ChannelClosed { path: String },
    StreamStateChanged { channel: String, stream_id: u32, state: StreamState, direction: StreamDirection },
    StreamReceiving { channel: String, stream_id: u32, receiving: bool },
    MuteInput { channel: String, stream_id: u32, mute: bool, reply: oneshot::Sender<Result<()>> },
    MuteOutput { channel: String, stream_id: u32, mute: bool, reply: oneshot::Sender<Result<()>> },
    SetOutputVolume { channel: String, stream_id: u32, volume: f64, reply: oneshot::Sender<Result<()>> },
    SetOutputWindow { channel: String, stream_id: u32, window: WindowId, reply: oneshot::Sender<Result<()>> },
    /// Forward an error to every handled channel
    Error { code: u32, message: String },
    GetState { reply: oneshot::Sender<EngineSnapshot> },
    Shutdown,
}

impl EngineRequest {
    /// Short name for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddPreviewWindow { .. } => "add_preview_window",
            Self::RemovePreviewWindow { .. } => "remove_preview_window",
            Self::AddOutputWindow { .. } => "add_output_window",
            Self::RemoveOutputWindow { .. } => "remove_output_window",
            Self::MakeVideoSink { .. } => "make_video_sink",
            Self::HandleChannel { .. } => "handle_channel",
            Self::ChannelClosed { .. } => "channel_closed",
            Self::StreamStateChanged { .. } => "stream_state_changed",
            Self::StreamReceiving { .. } => "stream_receiving",
            Self::MuteInput { .. } => "mute_input",
            Self::MuteOutput { .. } => "mute_output",
            Self::SetOutputVolume { .. } => "set_output_volume",
            Self::SetOutputWindow { .. } => "set_output_window",
            Self::Error { .. } => "error",
            Self::GetState { .. } => "get_state",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Debug for EngineRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
