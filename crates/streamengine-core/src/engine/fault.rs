//! Fault Router: pipeline events, scheduled tasks, and recovery.

use tracing::{debug, error, info, warn};

use super::Engine;
use crate::binding::{BindingKind, ElementId, ElementRole, PostRemovalAction, RemovalStage, WindowId};
use crate::event::{FaultKind, Generation, PipelineEvent, PipelineEventKind};
use crate::graph::MediaGraph;
use crate::pipeline::PipelineState;
use crate::scheduler::Task;

impl<G: MediaGraph> Engine<G> {
    /// Handle one scheduled task.
    pub fn handle_task(&mut self, task: Task) {
        match task {
            Task::BlockConfirmed { window, generation } => self.on_block_confirmed(window, generation),
            Task::RemoveDefunct { window } => self.remove_defunct(window),
            Task::CompleteTeardown { generation } => self.complete_teardown(generation),
        }
    }

    /// Handle one pipeline event.
    pub fn handle_pipeline_event(&mut self, event: PipelineEvent) {
        if !self.pipeline.is_current(event.generation) {
            debug!(generation = event.generation, "Dropping event from stale pipeline");
            return;
        }

        match event.kind {
            PipelineEventKind::StateChanged { old, new } => {
                debug!(?old, ?new, "Pipeline state changed");
                if self.pipeline.on_root_state_changed(event.generation, new) {
                    self.add_pending_previews();
                }
            }
            PipelineEventKind::Error { origin, kind, message, debug: detail } => {
                let source = origin.first().map(ToString::to_string).unwrap_or_default();
                warn!(%source, ?kind, %message, debug = detail.as_deref().unwrap_or(""), "Error on the video pipeline");
                self.handle_pipeline_error(&origin, kind, &message);
            }
            PipelineEventKind::Warning { origin, message, debug: detail } => {
                let source = origin.first().map(ToString::to_string).unwrap_or_default();
                warn!(%source, %message, debug = detail.as_deref().unwrap_or(""), "Warning on the video pipeline");
            }
        }
    }

    fn handle_pipeline_error(&mut self, origin: &[ElementId], kind: FaultKind, message: &str) {
        if kind.is_surface_gone() {
            match self.bindings.find_by_sink_identity(origin) {
                Some(owner) if owner.role == ElementRole::Render => {
                    self.handle_local_fault(owner.kind, owner.window, message);
                    return;
                }
                None => {
                    debug!(?kind, "Surface error from an element without a binding, ignoring");
                    return;
                }
                Some(_) => {}
            }
        }

        self.handle_global_fault(message);
    }

    /// A render surface went away: drop only its binding.
    fn handle_local_fault(&mut self, kind: BindingKind, window: WindowId, message: &str) {
        let Some(binding) = self.bindings.get(kind, window) else {
            return;
        };
        if binding.is_removing() {
            debug!(%kind, %window, "Sink has gone and is already being removed");
            return;
        }

        info!(%kind, %window, "Sink has gone, removing");
        match kind {
            BindingKind::Preview => self.begin_preview_removal(window, PostRemovalAction::Destroy),
            BindingKind::Output => self.remove_output_binding(window, PostRemovalAction::Destroy),
        }
        self.close_all_video_streams(message);
    }

    /// Anything else: sweep every binding and rebuild the pipeline.
    fn handle_global_fault(&mut self, message: &str) {
        error!(%message, "Tearing down video pipeline");
        self.close_all_video_streams(message);

        for (kind, window) in self.bindings.find_by_removing(true) {
            self.bindings.set_removal_stage(kind, window, RemovalStage::PipelineTeardown);
        }

        for (kind, window) in self.bindings.find_by_removing(false) {
            self.bindings.begin_removal(kind, window, RemovalStage::PipelineTeardown, PostRemovalAction::ResetForReuse);
            if kind == BindingKind::Output {
                let stream = self.bindings.get(kind, window).and_then(|b| b.owning_stream().cloned());
                if let Some(stream) = stream {
                    if let Err(e) = stream.set_output_window(WindowId::NONE) {
                        debug!(%window, error = %e, "Failed to revoke output window");
                    }
                }
            }
        }

        self.pipeline.destroy();
        self.scheduler.schedule(Task::CompleteTeardown { generation: self.pipeline.generation() });
        self.publish();
    }

    /// Finish a teardown sweep and rebuild if any preview still wants a
    /// surface.
    fn complete_teardown(&mut self, generation: Generation) {
        if self.pipeline.state() != PipelineState::Destroyed || self.pipeline.generation() != generation {
            debug!(generation, "Teardown already completed");
            return;
        }

        for (kind, window) in self.bindings.find_by_removing(true) {
            let stage = self.bindings.get(kind, window).and_then(|b| b.removal_stage());
            if stage == Some(RemovalStage::PipelineTeardown) {
                self.apply_post_removal_action(kind, window);
            }
        }

        self.pipeline.reset();
        if !self.bindings.pending_previews().is_empty() {
            info!("Creating new pipeline for pending preview windows");
            if let Err(e) = self.pipeline.ensure() {
                error!(error = %e, "Failed to rebuild video pipeline");
            }
        }

        self.publish();
        self.check_if_busy();
    }

    /// Removal scheduled by a window fault; state may have moved on since.
    fn remove_defunct(&mut self, window: WindowId) {
        let Some((kind, binding)) = self.bindings.find_by_window_id(window) else {
            debug!(%window, "Defunct window already gone");
            self.publish();
            return;
        };
        if binding.is_removing() {
            debug!(%kind, %window, "Defunct window already being removed");
            return;
        }
        let created = binding.is_created();

        info!(%kind, %window, "Removing sink for defunct window");
        match kind {
            BindingKind::Preview if created => self.begin_preview_removal(window, PostRemovalAction::Destroy),
            BindingKind::Preview => {
                self.bindings.remove(kind, window);
                self.publish();
                self.check_if_busy();
            }
            BindingKind::Output => self.remove_output_binding(window, PostRemovalAction::Destroy),
        }
    }

    /// Tell every video stream the pipeline failed under it.
    fn close_all_video_streams(&self, message: &str) {
        debug!("Closing all video streams");
        for stream in self.channels.video_streams() {
            stream.notify_error(message);
        }
    }
}
