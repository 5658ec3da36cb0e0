//! The engine: request surface, control loop, and the state it owns.

mod fault;
mod removal;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::binding::{BindingKind, PostRemovalAction, SinkChain, WindowId, WindowSinkBinding};
use crate::busy::BusyTracker;
use crate::channel::{
    ChannelRegistry, MediaChannel, MediaStream, STREAMED_MEDIA_CHANNEL_TYPE, StreamDirection, StreamState,
};
use crate::command::EngineRequest;
use crate::directory::{WindowDirectory, WindowFaultHandle};
use crate::error::{Error, Result};
use crate::event::{Notification, PipelineEventReceiver};
use crate::graph::MediaGraph;
use crate::pipeline::{PipelineController, PipelineState};
use crate::registry::BindingRegistry;
use crate::scheduler::{Scheduler, TaskQueue};
use crate::sink::SinkPurpose;
use crate::state::{BindingSnapshot, EngineSnapshot};

/// Buffered notifications per slow subscriber before it starts lagging.
const NOTIFICATION_CAPACITY: usize = 64;

/// Owns the pipeline, the bindings, and the handled channels. Every method
/// runs on the control loop; other threads go through [`Scheduler`] or
/// [`WindowFaultHandle`].
pub struct Engine<G> {
    pipeline: PipelineController<G>,
    bindings: BindingRegistry,
    channels: ChannelRegistry,
    busy: BusyTracker,
    scheduler: Scheduler,
    tasks: TaskQueue,
    events: PipelineEventReceiver,
    notifications: broadcast::Sender<Notification>,
    directory: Arc<ArcSwap<WindowDirectory>>,
}

impl<G: MediaGraph> Engine<G> {
    /// Create an engine around a graph backend. Nothing is built until the
    /// first window or channel request.
    pub fn new(graph: G) -> Self {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (scheduler, tasks) = Scheduler::channel();
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Self {
            pipeline: PipelineController::new(graph, event_tx),
            bindings: BindingRegistry::new(),
            channels: ChannelRegistry::new(),
            busy: BusyTracker::new(),
            scheduler,
            tasks,
            events,
            notifications,
            directory: Arc::new(ArcSwap::from_pointee(WindowDirectory::default())),
        }
    }

    /// Subscribe to notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Scheduler feeding this engine's high-priority queue.
    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }

    /// Handle for the windowing layer's error callback.
    pub fn window_fault_handle(&self) -> WindowFaultHandle {
        WindowFaultHandle::new(Arc::clone(&self.directory), self.scheduler.clone())
    }

    pub fn pipeline_state(&self) -> PipelineState {
        self.pipeline.state()
    }

    pub fn bindings(&self) -> &BindingRegistry {
        &self.bindings
    }

    pub fn graph(&self) -> &G {
        self.pipeline.graph()
    }

    /// Current state for inspection.
    pub fn snapshot(&self) -> EngineSnapshot {
        let bindings = |kind: BindingKind| -> Vec<BindingSnapshot> {
            self.bindings.iter(kind).map(|b| BindingSnapshot::of(kind, b)).collect()
        };
        EngineSnapshot {
            pipeline: self.pipeline.state(),
            playing: self.pipeline.is_playing(),
            generation: self.pipeline.generation(),
            junction_consumers: self.pipeline.graph().junction_consumers(),
            channels: self.channels.paths().map(ToString::to_string).collect(),
            previews: bindings(BindingKind::Preview),
            outputs: bindings(BindingKind::Output),
            busy: self.busy.is_busy(),
        }
    }

    fn notify(&self, notification: Notification) {
        // no subscribers is fine
        let _ = self.notifications.send(notification);
    }

    /// Republish the window directory read by the fault handle.
    fn publish(&self) {
        self.directory.store(Arc::new(WindowDirectory::from_registry(&self.bindings)));
    }

    fn check_if_busy(&mut self) {
        if self.busy.evaluate(self.channels.len(), self.bindings.active_previews()) {
            info!("No more channels or preview windows");
            self.notify(Notification::NoMoreChannels);
        }
    }

    fn ensure_pipeline(&mut self) -> Result<()> {
        self.pipeline.ensure().map_err(|e| Error::PipelineUnavailable(e.to_string()))
    }

    // ---- windows ----

    /// Bind a preview surface to the capture branch.
    pub fn add_preview_window(&mut self, window: WindowId) -> Result<()> {
        debug!(%window, "Adding preview window");

        if let Some(binding) = self.bindings.get(BindingKind::Preview, window) {
            if binding.is_removing() && binding.post_removal_action() == PostRemovalAction::Destroy {
                debug!(%window, "Preview window is being removed, will recreate it afterwards");
                self.bindings.set_post_removal_action(
                    BindingKind::Preview,
                    window,
                    PostRemovalAction::RecreateAfterRemoval,
                );
                return Ok(());
            }
            return Err(Error::AlreadyBound(window));
        }

        self.ensure_pipeline()?;
        self.bindings.insert(BindingKind::Preview, WindowSinkBinding::preview(window));

        let result = if self.pipeline.is_playing() {
            self.attach_preview(window)
        } else {
            debug!(%window, "Pipeline not playing, preview window will be added later");
            Ok(())
        };

        self.publish();
        self.check_if_busy();
        result
    }

    /// Build and link a chain for a pending preview binding. On failure the
    /// binding is dropped.
    fn attach_preview(&mut self, window: WindowId) -> Result<()> {
        let chain = match self.pipeline.graph_mut().make_sink(SinkPurpose::Preview) {
            Ok(chain) => chain,
            Err(e) => {
                warn!(%window, error = %e, "Failed to make a video sink");
                self.bindings.remove(BindingKind::Preview, window);
                return Err(Error::SinkCreationFailed(e.to_string()));
            }
        };

        if let Err(e) = self.pipeline.graph_mut().attach(&chain, window) {
            warn!(%window, error = %e, "Failed to link preview sink");
            self.pipeline.graph_mut().discard(&chain);
            self.bindings.remove(BindingKind::Preview, window);
            return Err(Error::LinkFailed { window, reason: e.to_string() });
        }

        debug!(%window, root = %chain.root(), "Linked preview sink");
        self.bindings.mark_created(BindingKind::Preview, window, chain);
        self.notify(Notification::HandlingChannel);
        Ok(())
    }

    /// Attach every preview binding still waiting for a chain. Failures are
    /// logged per binding.
    fn add_pending_previews(&mut self) {
        for window in self.bindings.pending_previews() {
            if let Err(e) = self.attach_preview(window) {
                warn!(%window, error = %e, "Failed to add pending preview window");
            }
        }
        self.publish();
        self.check_if_busy();
    }

    /// Unbind a preview surface.
    pub fn remove_preview_window(&mut self, window: WindowId) -> Result<()> {
        debug!(%window, "Removing preview window");

        let Some(binding) = self.bindings.get(BindingKind::Preview, window) else {
            return Err(Error::NotFound(window));
        };

        if binding.is_removing() {
            if binding.post_removal_action() != PostRemovalAction::Destroy {
                debug!(%window, action = ?binding.post_removal_action(), "Already being removed, will destroy");
                self.bindings.set_post_removal_action(BindingKind::Preview, window, PostRemovalAction::Destroy);
            }
            return Ok(());
        }

        if !binding.is_created() {
            debug!(%window, "Preview window not created yet, removing right away");
            self.bindings.remove(BindingKind::Preview, window);
            self.publish();
            self.check_if_busy();
            return Ok(());
        }

        self.begin_preview_removal(window, PostRemovalAction::Destroy);
        Ok(())
    }

    /// Register an output chain the stream has already linked.
    ///
    /// Returns false if the window already has a live output binding; an idle
    /// slot left behind by a pipeline rebuild is replaced.
    pub fn add_output_window(&mut self, stream: Arc<dyn MediaStream>, chain: SinkChain, window: WindowId) -> bool {
        if let Some(existing) = self.bindings.get(BindingKind::Output, window) {
            if existing.is_created() || existing.is_removing() {
                warn!(%window, "Output window already bound");
                return false;
            }
            self.bindings.remove(BindingKind::Output, window);
        }

        debug!(%window, stream = stream.id(), root = %chain.root(), "Adding output window");
        self.bindings.insert(BindingKind::Output, WindowSinkBinding::output(window, stream, chain));
        self.publish();
        true
    }

    /// Forget an output binding. The stream has already quiesced its chain.
    pub fn remove_output_window(&mut self, window: WindowId) -> bool {
        if self.bindings.remove(BindingKind::Output, window).is_none() {
            return false;
        }
        debug!(%window, "Removed output window");
        self.publish();
        self.check_if_busy();
        true
    }

    /// Build an unlinked render chain for a stream collaborator.
    pub fn make_video_sink(&mut self, purpose: SinkPurpose) -> Result<SinkChain> {
        self.ensure_pipeline()?;
        self.pipeline
            .graph_mut()
            .make_sink(purpose)
            .map_err(|e| Error::SinkCreationFailed(e.to_string()))
    }

    // ---- channels ----

    /// Take over a streamed-media channel.
    pub fn handle_channel(&mut self, channel_type: &str, channel: Arc<dyn MediaChannel>) -> Result<()> {
        if channel_type != STREAMED_MEDIA_CHANNEL_TYPE {
            return Err(Error::InvalidChannelType(channel_type.to_string()));
        }

        self.ensure_pipeline()?;
        let path = channel.path().to_string();
        if !self.channels.register(channel) {
            warn!(%path, "Channel already handled, replacing");
        }
        info!(%path, "Handling channel");
        self.notify(Notification::HandlingChannel);
        self.check_if_busy();
        Ok(())
    }

    /// Forget a channel once it has closed.
    pub fn channel_closed(&mut self, path: &str) -> bool {
        if self.channels.unregister(path).is_none() {
            debug!(%path, "Closed channel was not handled");
            return false;
        }
        info!(%path, "Channel closed");
        self.check_if_busy();
        true
    }

    pub fn stream_state_changed(&self, channel: &str, stream_id: u32, state: StreamState, direction: StreamDirection) {
        self.notify(Notification::StreamStateChanged {
            channel: channel.to_string(),
            stream_id,
            state,
            direction,
        });
    }

    pub fn stream_receiving(&self, channel: &str, stream_id: u32, receiving: bool) {
        self.notify(Notification::Receiving { channel: channel.to_string(), stream_id, receiving });
    }

    pub fn mute_input(&self, channel: &str, stream_id: u32, mute: bool) -> Result<()> {
        self.channels.find_stream(channel, stream_id)?.mute_input(mute)
    }

    pub fn mute_output(&self, channel: &str, stream_id: u32, mute: bool) -> Result<()> {
        self.channels.find_stream(channel, stream_id)?.mute_output(mute)
    }

    pub fn set_output_volume(&self, channel: &str, stream_id: u32, volume: f64) -> Result<()> {
        self.channels.find_stream(channel, stream_id)?.set_output_volume(volume)
    }

    pub fn set_output_window(&self, channel: &str, stream_id: u32, window: WindowId) -> Result<()> {
        self.channels.find_stream(channel, stream_id)?.set_output_window(window)
    }

    /// Forward an engine-wide error to every handled channel.
    pub fn error(&self, code: u32, message: &str) {
        warn!(code, %message, "Broadcasting error to channels");
        self.channels.broadcast_error(code, message);
    }

    /// Announce that the engine is going away.
    pub fn shutdown(&self) {
        info!("Shutdown requested");
        self.notify(Notification::ShutdownRequested);
    }

    // ---- control loop ----

    /// Dispatch one request. Returns false when the loop should stop.
    pub fn handle_request(&mut self, request: EngineRequest) -> bool {
        debug!(request = request.name(), "Handling request");
        match request {
            EngineRequest::AddPreviewWindow { window, reply } => {
                let _ = reply.send(self.add_preview_window(window));
            }
            EngineRequest::RemovePreviewWindow { window, reply } => {
                let _ = reply.send(self.remove_preview_window(window));
            }
            EngineRequest::AddOutputWindow { stream, chain, window, reply } => {
                let _ = reply.send(self.add_output_window(stream, chain, window));
            }
            EngineRequest::RemoveOutputWindow { window, reply } => {
                let _ = reply.send(self.remove_output_window(window));
            }
            EngineRequest::MakeVideoSink { purpose, reply } => {
                let _ = reply.send(self.make_video_sink(purpose));
            }
            EngineRequest::HandleChannel { channel_type, channel, reply } => {
                let _ = reply.send(self.handle_channel(&channel_type, channel));
            }
            EngineRequest::ChannelClosed { path } => {
                self.channel_closed(&path);
            }
            EngineRequest::StreamStateChanged { channel, stream_id, state, direction } => {
                self.stream_state_changed(&channel, stream_id, state, direction);
            }
            EngineRequest::StreamReceiving { channel, stream_id, receiving } => {
                self.stream_receiving(&channel, stream_id, receiving);
            }
            EngineRequest::MuteInput { channel, stream_id, mute, reply } => {
                let _ = reply.send(self.mute_input(&channel, stream_id, mute));
            }
            EngineRequest::MuteOutput { channel, stream_id, mute, reply } => {
                let _ = reply.send(self.mute_output(&channel, stream_id, mute));
            }
            EngineRequest::SetOutputVolume { channel, stream_id, volume, reply } => {
                let _ = reply.send(self.set_output_volume(&channel, stream_id, volume));
            }
            EngineRequest::SetOutputWindow { channel, stream_id, window, reply } => {
                let _ = reply.send(self.set_output_window(&channel, stream_id, window));
            }
            EngineRequest::Error { code, message } => self.error(code, &message),
            EngineRequest::GetState { reply } => {
                let _ = reply.send(self.snapshot());
            }
            EngineRequest::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    /// Drain scheduled tasks and pipeline events without waiting. Tasks always
    /// go first. Returns how many inputs were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            if let Some(task) = self.tasks.try_recv() {
                self.handle_task(task);
            } else if let Ok(event) = self.events.try_recv() {
                self.handle_pipeline_event(event);
            } else {
                return handled;
            }
            handled += 1;
        }
    }

    /// Run the control loop until a shutdown request, a shutdown signal, or
    /// the request channel closing.
    pub async fn run(mut self, mut requests: mpsc::Receiver<EngineRequest>, mut shutdown: mpsc::Receiver<()>) {
        info!("Engine control loop running");

        loop {
            tokio::select! {
                biased;

                Some(task) = self.tasks.recv() => self.handle_task(task),

                Some(event) = self.events.recv() => self.handle_pipeline_event(event),

                request = requests.recv() => {
                    let Some(request) = request else {
                        info!("Request channel closed");
                        break;
                    };
                    if !self.handle_request(request) {
                        break;
                    }
                }

                _ = shutdown.recv() => {
                    info!("Shutdown signal received");
                    self.shutdown();
                    break;
                }
            }
        }

        self.pipeline.shutdown();
        info!("Engine control loop stopped");
    }
}
