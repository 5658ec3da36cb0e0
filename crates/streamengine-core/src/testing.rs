//! In-memory collaborators for exercising the engine without a media
//! framework.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::binding::{ElementId, ElementRole, SinkChain, WindowId};
use crate::channel::{MediaChannel, MediaStream, MediaType};
use crate::error::{Error, GraphError, Result};
use crate::event::{FaultKind, Generation, PipelineEvent, PipelineEventKind, PipelineEventSender, PlaybackState};
use crate::graph::{BlockCallback, MediaGraph};
use crate::sink::SinkPurpose;

#[derive(Default)]
struct GraphState {
    running: bool,
    generation: Generation,
    events: Option<PipelineEventSender>,
    starts: usize,
    stops: usize,
    next_element: usize,
    attached: BTreeMap<ElementId, (WindowId, SinkChain)>,
    pending_blocks: Vec<(ElementId, BlockCallback)>,
    detached: Vec<ElementId>,
    discarded: Vec<ElementId>,
    fail_next_start: bool,
    fail_make_sink: bool,
    fail_attach: bool,
}

/// A [`MediaGraph`] that records what it is asked to do.
///
/// Clones share state, so a test keeps one clone while the engine owns the
/// other. Block callbacks are held until [`FakeGraph::confirm_blocks`].
#[derive(Clone, Default)]
pub struct FakeGraph {
    state: Arc<Mutex<GraphState>>,
}

impl FakeGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn starts(&self) -> usize {
        self.state.lock().starts
    }

    #[must_use]
    pub fn stops(&self) -> usize {
        self.state.lock().stops
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Windows whose chains are linked to the junction.
    #[must_use]
    pub fn attached_windows(&self) -> Vec<WindowId> {
        self.state.lock().attached.values().map(|(window, _)| *window).collect()
    }

    /// Render element of the chain attached for `window`.
    #[must_use]
    pub fn render_element(&self, window: WindowId) -> Option<ElementId> {
        self.state
            .lock()
            .attached
            .values()
            .find(|(w, _)| *w == window)
            .and_then(|(_, chain)| chain.render_element().cloned())
    }

    #[must_use]
    pub fn pending_blocks(&self) -> usize {
        self.state.lock().pending_blocks.len()
    }

    #[must_use]
    pub fn detached(&self) -> Vec<ElementId> {
        self.state.lock().detached.clone()
    }

    #[must_use]
    pub fn discarded(&self) -> Vec<ElementId> {
        self.state.lock().discarded.clone()
    }

    pub fn fail_next_start(&self) {
        self.state.lock().fail_next_start = true;
    }

    pub fn fail_make_sink(&self, fail: bool) {
        self.state.lock().fail_make_sink = fail;
    }

    pub fn fail_attach(&self, fail: bool) {
        self.state.lock().fail_attach = fail;
    }

    /// Fire every pending block callback, from the calling thread.
    pub fn confirm_blocks(&self) -> usize {
        let pending = std::mem::take(&mut self.state.lock().pending_blocks);
        let count = pending.len();
        for (_, callback) in pending {
            callback();
        }
        count
    }

    /// Post an event tagged with the current generation.
    pub fn emit(&self, kind: PipelineEventKind) {
        let state = self.state.lock();
        if let Some(events) = &state.events {
            let _ = events.send(PipelineEvent { generation: state.generation, kind });
        }
    }

    /// Post a root state change to playing.
    pub fn emit_playing(&self) {
        self.emit(PipelineEventKind::StateChanged { old: PlaybackState::Paused, new: PlaybackState::Playing });
    }

    /// Post an error originating from `element` inside the chain for `window`.
    pub fn emit_error_from(&self, element: ElementId, kind: FaultKind) {
        let origin = {
            let state = self.state.lock();
            let root = state
                .attached
                .iter()
                .find(|(_, (_, chain))| chain.elements().iter().any(|e| e.id == element))
                .map(|(root, _)| root.clone());
            let mut origin = vec![element.clone()];
            if let Some(root) = root.filter(|root| *root != element) {
                origin.push(root);
            }
            origin.push(ElementId::new("pipeline"));
            origin
        };
        self.emit(PipelineEventKind::Error { origin, kind, message: "fault".to_string(), debug: None });
    }
}

impl MediaGraph for FakeGraph {
    fn start(&mut self, generation: Generation, events: PipelineEventSender) -> std::result::Result<(), GraphError> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_start) {
            return Err(GraphError::Construction("no capture device".to_string()));
        }
        state.running = true;
        state.generation = generation;
        state.events = Some(events);
        state.starts += 1;
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.state.lock();
        state.running = false;
        state.attached.clear();
        state.stops += 1;
    }

    fn make_sink(&mut self, purpose: SinkPurpose) -> std::result::Result<SinkChain, GraphError> {
        let mut state = self.state.lock();
        if !state.running {
            return Err(GraphError::NotRunning);
        }
        if state.fail_make_sink {
            return Err(GraphError::NoRenderBackend);
        }
        state.next_element += 1;
        let n = state.next_element;
        let prefix = match purpose {
            SinkPurpose::Preview => "preview",
            SinkPurpose::Output => "output",
        };
        Ok(SinkChain::composite(ElementId::new(format!("{prefix}-bin{n}")))
            .with_element(ElementId::new(format!("{prefix}-scale{n}")), ElementRole::Scale)
            .with_element(ElementId::new(format!("{prefix}-convert{n}")), ElementRole::Colorspace)
            .with_element(ElementId::new(format!("{prefix}-sink{n}")), ElementRole::Render))
    }

    fn attach(&mut self, chain: &SinkChain, window: WindowId) -> std::result::Result<(), GraphError> {
        let mut state = self.state.lock();
        if !state.running {
            return Err(GraphError::NotRunning);
        }
        if state.fail_attach {
            return Err(GraphError::Link(format!("tee refused {}", chain.root())));
        }
        state.attached.insert(chain.root().clone(), (window, chain.clone()));
        Ok(())
    }

    fn discard(&mut self, chain: &SinkChain) {
        let mut state = self.state.lock();
        state.attached.remove(chain.root());
        state.discarded.push(chain.root().clone());
    }

    fn request_block(&mut self, chain: &SinkChain, on_blocked: BlockCallback) -> std::result::Result<(), GraphError> {
        let mut state = self.state.lock();
        if !state.attached.contains_key(chain.root()) {
            return Err(GraphError::UnknownChain(chain.root().to_string()));
        }
        state.pending_blocks.push((chain.root().clone(), on_blocked));
        Ok(())
    }

    fn detach(&mut self, chain: &SinkChain) -> std::result::Result<(), GraphError> {
        let mut state = self.state.lock();
        if state.attached.remove(chain.root()).is_none() {
            return Err(GraphError::UnknownChain(chain.root().to_string()));
        }
        state.detached.push(chain.root().clone());
        Ok(())
    }

    fn junction_consumers(&self) -> usize {
        let state = self.state.lock();
        if state.running { 1 + state.attached.len() } else { 0 }
    }
}

/// A stream recording what the engine asked of it.
pub struct FakeStream {
    id: u32,
    media_type: MediaType,
    errors: Mutex<Vec<String>>,
    output_windows: Mutex<Vec<WindowId>>,
    input_muted: Mutex<Option<bool>>,
    output_muted: Mutex<Option<bool>>,
    volume: Mutex<Option<f64>>,
}

impl FakeStream {
    #[must_use]
    pub fn new(id: u32, media_type: MediaType) -> Arc<Self> {
        Arc::new(Self {
            id,
            media_type,
            errors: Mutex::new(Vec::new()),
            output_windows: Mutex::new(Vec::new()),
            input_muted: Mutex::new(None),
            output_muted: Mutex::new(None),
            volume: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    /// Every window assigned, in order.
    #[must_use]
    pub fn output_windows(&self) -> Vec<WindowId> {
        self.output_windows.lock().clone()
    }

    #[must_use]
    pub fn input_muted(&self) -> Option<bool> {
        *self.input_muted.lock()
    }

    #[must_use]
    pub fn output_muted(&self) -> Option<bool> {
        *self.output_muted.lock()
    }

    #[must_use]
    pub fn volume(&self) -> Option<f64> {
        *self.volume.lock()
    }
}

impl MediaStream for FakeStream {
    fn id(&self) -> u32 {
        self.id
    }

    fn media_type(&self) -> MediaType {
        self.media_type
    }

    fn notify_error(&self, message: &str) {
        self.errors.lock().push(message.to_string());
    }

    fn set_output_window(&self, window: WindowId) -> Result<()> {
        if self.media_type != MediaType::Video {
            return Err(Error::Stream("not a video stream".to_string()));
        }
        self.output_windows.lock().push(window);
        Ok(())
    }

    fn mute_input(&self, mute: bool) -> Result<()> {
        *self.input_muted.lock() = Some(mute);
        Ok(())
    }

    fn mute_output(&self, mute: bool) -> Result<()> {
        *self.output_muted.lock() = Some(mute);
        Ok(())
    }

    fn set_output_volume(&self, volume: f64) -> Result<()> {
        *self.volume.lock() = Some(volume);
        Ok(())
    }
}

/// A channel holding a fixed set of streams.
pub struct FakeChannel {
    path: String,
    streams: Vec<Arc<dyn MediaStream>>,
    errors: Mutex<Vec<(u32, String)>>,
}

impl FakeChannel {
    #[must_use]
    pub fn new(path: &str, streams: Vec<Arc<FakeStream>>) -> Arc<Self> {
        Arc::new(Self {
            path: path.to_string(),
            streams: streams.into_iter().map(|s| s as Arc<dyn MediaStream>).collect(),
            errors: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn errors(&self) -> Vec<(u32, String)> {
        self.errors.lock().clone()
    }
}

impl MediaChannel for FakeChannel {
    fn path(&self) -> &str {
        &self.path
    }

    fn streams(&self) -> Vec<Arc<dyn MediaStream>> {
        self.streams.clone()
    }

    fn error(&self, code: u32, message: &str) {
        self.errors.lock().push((code, message.to_string()));
    }
}
