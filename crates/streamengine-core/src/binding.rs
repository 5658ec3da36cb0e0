//! Window sink bindings and the element chains they own.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::channel::MediaStream;

/// Opaque handle of a render target supplied by the windowing system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u64);

impl WindowId {
    /// "No surface": assigning this to a stream revokes its output window.
    pub const NONE: Self = Self(0);
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a pipeline element, as named by the graph backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub String);

impl ElementId {
    /// Create an element identity from a backend name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an element does inside a sink chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementRole {
    /// Composite wrapper holding the rest of the chain
    Container,
    /// Bounded queue decoupling the branch from the junction
    Queue,
    /// Rate/scale normalization
    Scale,
    /// Colorspace normalization
    Colorspace,
    /// Platform render element that owns the window surface
    Render,
}

/// One element of a sink chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainElement {
    pub id: ElementId,
    pub role: ElementRole,
}

/// A renderable output chain: the root is what gets linked to the junction,
/// the element list covers everything nested inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkChain {
    root: ElementId,
    elements: Vec<ChainElement>,
}

impl SinkChain {
    /// Chain rooted at a composite container.
    #[must_use]
    pub fn composite(root: ElementId) -> Self {
        let elements = vec![ChainElement { id: root.clone(), role: ElementRole::Container }];
        Self { root, elements }
    }

    /// Chain consisting of a bare render element.
    #[must_use]
    pub fn render_only(render: ElementId) -> Self {
        let elements = vec![ChainElement { id: render.clone(), role: ElementRole::Render }];
        Self { root: render, elements }
    }

    /// Add a nested element.
    #[must_use]
    pub fn with_element(mut self, id: ElementId, role: ElementRole) -> Self {
        self.elements.push(ChainElement { id, role });
        self
    }

    /// Element linked to the junction.
    #[must_use]
    pub fn root(&self) -> &ElementId {
        &self.root
    }

    /// Every element of the chain, root included.
    #[must_use]
    pub fn elements(&self) -> &[ChainElement] {
        &self.elements
    }

    /// The platform render element, if the chain has one.
    #[must_use]
    pub fn render_element(&self) -> Option<&ElementId> {
        self.elements.iter().find(|e| e.role == ElementRole::Render).map(|e| &e.id)
    }
}

/// Which collection a binding lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    /// Local preview surface fed from the capture branch
    Preview,
    /// Remote-call output surface tied to one stream
    Output,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preview => f.write_str("preview"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// What happens to a binding once its branch has been detached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostRemovalAction {
    /// Drop the binding from its collection
    Destroy,
    /// Clear transient state, keep the slot
    ResetForReuse,
    /// Reset, then attach again if the pipeline is playing
    RecreateAfterRemoval,
    #[default]
    None,
}

/// Progress of an in-flight removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalStage {
    /// Junction block requested, waiting for confirmation
    BlockRequested,
    /// Block confirmed, detach in progress
    BlockConfirmed,
    /// Swept by a whole-pipeline teardown
    PipelineTeardown,
}

/// One rendering branch attached (or waiting to be attached) to the junction.
pub struct WindowSinkBinding {
    window_id: WindowId,
    owning_stream: Option<Arc<dyn MediaStream>>,
    sink_chain: Option<SinkChain>,
    created: bool,
    removal: Option<RemovalStage>,
    post_removal_action: PostRemovalAction,
}

impl WindowSinkBinding {
    /// A preview binding with no chain yet.
    #[must_use]
    pub fn preview(window_id: WindowId) -> Self {
        Self {
            window_id,
            owning_stream: None,
            sink_chain: None,
            created: false,
            removal: None,
            post_removal_action: PostRemovalAction::None,
        }
    }

    /// An output binding around a chain the stream already linked.
    #[must_use]
    pub fn output(window_id: WindowId, stream: Arc<dyn MediaStream>, chain: SinkChain) -> Self {
        Self {
            window_id,
            owning_stream: Some(stream),
            sink_chain: Some(chain),
            created: true,
            removal: None,
            post_removal_action: PostRemovalAction::None,
        }
    }

    #[must_use]
    pub fn window_id(&self) -> WindowId {
        self.window_id
    }

    #[must_use]
    pub fn owning_stream(&self) -> Option<&Arc<dyn MediaStream>> {
        self.owning_stream.as_ref()
    }

    #[must_use]
    pub fn sink_chain(&self) -> Option<&SinkChain> {
        self.sink_chain.as_ref()
    }

    /// Whether the chain has been linked and started.
    #[must_use]
    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Whether a removal sequence is in flight.
    #[must_use]
    pub fn is_removing(&self) -> bool {
        self.removal.is_some()
    }

    #[must_use]
    pub fn removal_stage(&self) -> Option<RemovalStage> {
        self.removal
    }

    #[must_use]
    pub fn post_removal_action(&self) -> PostRemovalAction {
        self.post_removal_action
    }

    pub(crate) fn mark_created(&mut self, chain: SinkChain) {
        self.sink_chain = Some(chain);
        self.created = true;
    }

    pub(crate) fn begin_removal(&mut self, stage: RemovalStage, action: PostRemovalAction) {
        self.removal = Some(stage);
        self.post_removal_action = action;
    }

    pub(crate) fn set_removal_stage(&mut self, stage: RemovalStage) {
        self.removal = Some(stage);
    }

    pub(crate) fn set_post_removal_action(&mut self, action: PostRemovalAction) {
        self.post_removal_action = action;
    }

    /// Clear everything transient; returns the chain that was dropped.
    pub(crate) fn reset_for_reuse(&mut self) -> Option<SinkChain> {
        self.owning_stream = None;
        self.created = false;
        self.removal = None;
        self.post_removal_action = PostRemovalAction::None;
        self.sink_chain.take()
    }
}

impl fmt::Debug for WindowSinkBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowSinkBinding")
            .field("window_id", &self.window_id)
            .field("stream", &self.owning_stream.as_ref().map(|s| s.id()))
            .field("sink_chain", &self.sink_chain.as_ref().map(SinkChain::root))
            .field("created", &self.created)
            .field("removal", &self.removal)
            .field("post_removal_action", &self.post_removal_action)
            .finish()
    }
}
