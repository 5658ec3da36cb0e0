//! Point-in-time view of the engine for inspection and diagnostics.

use serde::{Deserialize, Serialize};

use crate::binding::{BindingKind, PostRemovalAction, RemovalStage, WindowId, WindowSinkBinding};
use crate::event::Generation;
use crate::pipeline::PipelineState;

/// Flags of a single binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingSnapshot {
    pub kind: BindingKind,
    pub window: WindowId,
    /// Owning stream id, for output bindings
    pub stream_id: Option<u32>,
    pub created: bool,
    pub removing: bool,
    pub removal_stage: Option<RemovalStage>,
    pub post_removal_action: PostRemovalAction,
}

impl BindingSnapshot {
    #[must_use]
    pub fn of(kind: BindingKind, binding: &WindowSinkBinding) -> Self {
        Self {
            kind,
            window: binding.window_id(),
            stream_id: binding.owning_stream().map(|s| s.id()),
            created: binding.is_created(),
            removing: binding.is_removing(),
            removal_stage: binding.removal_stage(),
            post_removal_action: binding.post_removal_action(),
        }
    }
}

/// Complete snapshot of the engine's current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Pipeline lifecycle state
    pub pipeline: PipelineState,
    /// Whether the root element is playing
    pub playing: bool,
    /// Current pipeline generation
    pub generation: Generation,
    /// Consumers linked to the junction, keep-alive included
    pub junction_consumers: usize,
    /// Object paths of handled channels
    pub channels: Vec<String>,
    pub previews: Vec<BindingSnapshot>,
    pub outputs: Vec<BindingSnapshot>,
    /// Whether any channel or preview is active
    pub busy: bool,
}

impl EngineSnapshot {
    /// Binding for `window` in either collection, previews first.
    #[must_use]
    pub fn binding(&self, window: WindowId) -> Option<&BindingSnapshot> {
        self.previews.iter().chain(&self.outputs).find(|b| b.window == window)
    }
}
