//! The seam between the resource manager and a concrete media framework.

use crate::binding::{SinkChain, WindowId};
use crate::error::GraphError;
use crate::event::{Generation, PipelineEventSender};
use crate::sink::SinkPurpose;

/// Fired once the junction feed toward a branch is quiescent. May run on any
/// thread; implementations must only schedule work from it.
pub type BlockCallback = Box<dyn FnOnce() + Send + 'static>;

/// One shared media graph: capture branch, junction, keep-alive consumer, and
/// whatever rendering branches are attached.
pub trait MediaGraph: Send {
    /// Build capture, junction and keep-alive branches, start playback, and
    /// begin forwarding events tagged with `generation`.
    fn start(&mut self, generation: Generation, events: PipelineEventSender) -> Result<(), GraphError>;

    /// Stop and release the whole graph. Pending block callbacks may still
    /// fire afterwards and must be tolerated by the caller.
    fn stop(&mut self);

    /// Build a render chain for `purpose` and register it with the graph unlinked.
    fn make_sink(&mut self, purpose: SinkPurpose) -> Result<SinkChain, GraphError>;

    /// Start `chain`, link it to the junction, and route surface requests from
    /// its render element to `window`.
    fn attach(&mut self, chain: &SinkChain, window: WindowId) -> Result<(), GraphError>;

    /// Stop and drop a chain that was never linked or failed to link.
    fn discard(&mut self, chain: &SinkChain);

    /// Ask for the junction feed toward `chain` to block. Returns immediately;
    /// `on_blocked` fires once no further data will cross.
    fn request_block(&mut self, chain: &SinkChain, on_blocked: BlockCallback) -> Result<(), GraphError>;

    /// After a confirmed block: unlink, force to idle with a bounded wait,
    /// release the junction connection point, and unblock the feed.
    fn detach(&mut self, chain: &SinkChain) -> Result<(), GraphError>;

    /// Consumers currently linked to the junction, keep-alive included.
    fn junction_consumers(&self) -> usize;
}
