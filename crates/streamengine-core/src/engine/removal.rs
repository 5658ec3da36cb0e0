//! Safe removal of rendering branches.
//!
//! Preview branches are detached in two phases: the junction feed is blocked,
//! and only once the backend confirms the block (from whatever thread it
//! likes) does a scheduled task unlink and stop the branch. Output branches
//! belong to their stream, which is told to drop its surface instead.

use tracing::{debug, info, warn};

use super::Engine;
use crate::binding::{BindingKind, PostRemovalAction, RemovalStage, WindowId};
use crate::event::Generation;
use crate::graph::MediaGraph;
use crate::scheduler::Task;

impl<G: MediaGraph> Engine<G> {
    /// Start removing a created preview branch.
    pub(super) fn begin_preview_removal(&mut self, window: WindowId, action: PostRemovalAction) {
        let Some(chain) = self.bindings.get(BindingKind::Preview, window).and_then(|b| b.sink_chain().cloned())
        else {
            debug!(%window, "No sink to remove, applying post-removal action");
            self.bindings.begin_removal(BindingKind::Preview, window, RemovalStage::BlockConfirmed, action);
            self.finish_removal(BindingKind::Preview, window);
            return;
        };

        self.bindings.begin_removal(BindingKind::Preview, window, RemovalStage::BlockRequested, action);

        let scheduler = self.scheduler.clone();
        let generation = self.pipeline.generation();
        let on_blocked = Box::new(move || {
            debug!(%window, "Junction blocked, scheduling preview sink removal");
            scheduler.schedule(Task::BlockConfirmed { window, generation });
        });

        if let Err(e) = self.pipeline.graph_mut().request_block(&chain, on_blocked) {
            // Nothing will confirm; the branch is not linked anyway.
            warn!(%window, error = %e, "Failed to block junction, dropping preview sink");
            self.pipeline.graph_mut().discard(&chain);
            self.finish_removal(BindingKind::Preview, window);
            return;
        }

        debug!(%window, "Requested junction block for preview sink");
        self.publish();
    }

    /// Confirmation task: the feed is quiescent, detach the branch.
    pub(super) fn on_block_confirmed(&mut self, window: WindowId, generation: Generation) {
        if !self.pipeline.is_current(generation) {
            debug!(%window, generation, "Block confirmed on a stale pipeline, ignoring");
            return;
        }

        let Some(binding) = self.bindings.get(BindingKind::Preview, window) else {
            debug!(%window, "Block confirmed for a window that is gone");
            return;
        };
        if binding.removal_stage() != Some(RemovalStage::BlockRequested) {
            debug!(%window, stage = ?binding.removal_stage(), "Unexpected block confirmation, ignoring");
            return;
        }
        let chain = binding.sink_chain().cloned();

        self.bindings.set_removal_stage(BindingKind::Preview, window, RemovalStage::BlockConfirmed);
        info!(%window, "Removing defunct preview sink");

        if let Some(chain) = chain {
            if let Err(e) = self.pipeline.graph_mut().detach(&chain) {
                warn!(%window, error = %e, "Failed to detach preview sink cleanly");
            }
        }

        self.finish_removal(BindingKind::Preview, window);
    }

    /// Revoke an output binding's surface and apply `action`.
    pub(super) fn remove_output_binding(&mut self, window: WindowId, action: PostRemovalAction) {
        let Some(stream) = self.bindings.get(BindingKind::Output, window).map(|b| b.owning_stream().cloned())
        else {
            return;
        };

        debug!(%window, "Removing sink for output window");
        self.bindings.begin_removal(BindingKind::Output, window, RemovalStage::BlockConfirmed, action);

        if let Some(stream) = stream {
            if let Err(e) = stream.set_output_window(WindowId::NONE) {
                debug!(%window, stream = stream.id(), error = %e, "Failed to revoke output window");
            }
        }

        self.finish_removal(BindingKind::Output, window);
    }

    /// Apply the binding's post-removal action without publishing.
    pub(super) fn apply_post_removal_action(&mut self, kind: BindingKind, window: WindowId) {
        let Some(action) = self.bindings.get(kind, window).map(|b| b.post_removal_action()) else {
            return;
        };

        match action {
            PostRemovalAction::Destroy => {
                debug!(%kind, %window, "Destroying binding");
                self.bindings.remove(kind, window);
            }
            PostRemovalAction::ResetForReuse | PostRemovalAction::None => {
                debug!(%kind, %window, "Resetting binding for reuse");
                self.bindings.reset_for_reuse(kind, window);
            }
            PostRemovalAction::RecreateAfterRemoval => {
                self.bindings.reset_for_reuse(kind, window);
                if kind == BindingKind::Preview && self.pipeline.is_playing() {
                    debug!(%window, "Recreating preview sink");
                    if let Err(e) = self.attach_preview(window) {
                        warn!(%window, error = %e, "Failed to recreate preview window");
                    }
                } else {
                    debug!(%kind, %window, "Pipeline not playing, binding left pending");
                }
            }
        }
    }

    /// Terminal step of every removal.
    pub(super) fn finish_removal(&mut self, kind: BindingKind, window: WindowId) {
        self.apply_post_removal_action(kind, window);
        self.publish();
        self.check_if_busy();
    }
}
