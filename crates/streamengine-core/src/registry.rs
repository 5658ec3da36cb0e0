//! Binding Registry: preview and output bindings plus an element reverse index.

use std::collections::{BTreeMap, HashMap};

use crate::binding::{
    BindingKind, ElementId, ElementRole, PostRemovalAction, RemovalStage, SinkChain, WindowId,
    WindowSinkBinding,
};

/// Where an indexed element lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementOwner {
    pub kind: BindingKind,
    pub window: WindowId,
    pub role: ElementRole,
}

/// Owns every binding, one per window id in each collection.
///
/// Chain elements are indexed when a chain is attached to a binding and
/// unindexed when it is dropped, so element lookups never walk a tree.
#[derive(Debug, Default)]
pub struct BindingRegistry {
    previews: BTreeMap<WindowId, WindowSinkBinding>,
    outputs: BTreeMap<WindowId, WindowSinkBinding>,
    elements: HashMap<ElementId, ElementOwner>,
}

impl BindingRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, kind: BindingKind) -> &BTreeMap<WindowId, WindowSinkBinding> {
        match kind {
            BindingKind::Preview => &self.previews,
            BindingKind::Output => &self.outputs,
        }
    }

    fn collection_mut(&mut self, kind: BindingKind) -> &mut BTreeMap<WindowId, WindowSinkBinding> {
        match kind {
            BindingKind::Preview => &mut self.previews,
            BindingKind::Output => &mut self.outputs,
        }
    }

    fn index_chain(&mut self, kind: BindingKind, window: WindowId, chain: &SinkChain) {
        for element in chain.elements() {
            self.elements
                .insert(element.id.clone(), ElementOwner { kind, window, role: element.role });
        }
    }

    fn unindex_chain(&mut self, chain: &SinkChain) {
        for element in chain.elements() {
            self.elements.remove(&element.id);
        }
    }

    /// Insert a binding. Returns false, leaving the registry untouched, if the
    /// window already has a binding of that kind.
    pub fn insert(&mut self, kind: BindingKind, binding: WindowSinkBinding) -> bool {
        let window = binding.window_id();
        if self.collection(kind).contains_key(&window) {
            return false;
        }
        if let Some(chain) = binding.sink_chain().cloned() {
            self.index_chain(kind, window, &chain);
        }
        self.collection_mut(kind).insert(window, binding);
        true
    }

    /// Remove a binding and unindex its chain.
    pub fn remove(&mut self, kind: BindingKind, window: WindowId) -> Option<WindowSinkBinding> {
        let binding = self.collection_mut(kind).remove(&window)?;
        if let Some(chain) = binding.sink_chain() {
            self.unindex_chain(chain);
        }
        Some(binding)
    }

    #[must_use]
    pub fn get(&self, kind: BindingKind, window: WindowId) -> Option<&WindowSinkBinding> {
        self.collection(kind).get(&window)
    }

    #[must_use]
    pub fn contains(&self, kind: BindingKind, window: WindowId) -> bool {
        self.collection(kind).contains_key(&window)
    }

    #[must_use]
    pub fn len(&self, kind: BindingKind) -> usize {
        self.collection(kind).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.previews.is_empty() && self.outputs.is_empty()
    }

    /// Bindings of one kind, ordered by window id.
    pub fn iter(&self, kind: BindingKind) -> impl Iterator<Item = &WindowSinkBinding> {
        self.collection(kind).values()
    }

    /// Attach a realized chain to a binding.
    pub fn mark_created(&mut self, kind: BindingKind, window: WindowId, chain: SinkChain) -> bool {
        if !self.contains(kind, window) {
            return false;
        }
        self.index_chain(kind, window, &chain);
        if let Some(binding) = self.collection_mut(kind).get_mut(&window) {
            binding.mark_created(chain);
        }
        true
    }

    /// Start a removal sequence on a binding.
    pub fn begin_removal(
        &mut self,
        kind: BindingKind,
        window: WindowId,
        stage: RemovalStage,
        action: PostRemovalAction,
    ) -> bool {
        match self.collection_mut(kind).get_mut(&window) {
            Some(binding) => {
                binding.begin_removal(stage, action);
                true
            }
            None => false,
        }
    }

    /// Advance an in-flight removal.
    pub fn set_removal_stage(&mut self, kind: BindingKind, window: WindowId, stage: RemovalStage) -> bool {
        match self.collection_mut(kind).get_mut(&window) {
            Some(binding) if binding.is_removing() => {
                binding.set_removal_stage(stage);
                true
            }
            _ => false,
        }
    }

    /// Supersede the terminal action of an in-flight removal.
    pub fn set_post_removal_action(
        &mut self,
        kind: BindingKind,
        window: WindowId,
        action: PostRemovalAction,
    ) -> bool {
        match self.collection_mut(kind).get_mut(&window) {
            Some(binding) => {
                binding.set_post_removal_action(action);
                true
            }
            None => false,
        }
    }

    /// Clear a binding's transient state and return the chain it held.
    pub fn reset_for_reuse(&mut self, kind: BindingKind, window: WindowId) -> Option<SinkChain> {
        let chain = self.collection_mut(kind).get_mut(&window)?.reset_for_reuse()?;
        self.unindex_chain(&chain);
        Some(chain)
    }

    /// Look a window up in the preview collection, then the output collection.
    #[must_use]
    pub fn find_by_window_id(&self, window: WindowId) -> Option<(BindingKind, &WindowSinkBinding)> {
        self.previews
            .get(&window)
            .map(|b| (BindingKind::Preview, b))
            .or_else(|| self.outputs.get(&window).map(|b| (BindingKind::Output, b)))
    }

    /// Resolve an element to the binding owning it.
    ///
    /// `ancestry` lists the element first, then its parents outward; the first
    /// indexed entry wins, so elements nested in a composite chain resolve to
    /// their own role rather than the container's.
    #[must_use]
    pub fn find_by_sink_identity(&self, ancestry: &[ElementId]) -> Option<ElementOwner> {
        ancestry.iter().find_map(|id| self.elements.get(id).copied())
    }

    /// Bindings whose removing flag matches `removing`, previews first.
    #[must_use]
    pub fn find_by_removing(&self, removing: bool) -> Vec<(BindingKind, WindowId)> {
        let previews = self.previews.values().map(|b| (BindingKind::Preview, b));
        let outputs = self.outputs.values().map(|b| (BindingKind::Output, b));
        previews
            .chain(outputs)
            .filter(|(_, b)| b.is_removing() == removing)
            .map(|(kind, b)| (kind, b.window_id()))
            .collect()
    }

    /// Whether any binding is mid-removal.
    #[must_use]
    pub fn any_removing(&self) -> bool {
        self.previews.values().chain(self.outputs.values()).any(WindowSinkBinding::is_removing)
    }

    /// Preview bindings still waiting for a chain.
    #[must_use]
    pub fn pending_previews(&self) -> Vec<WindowId> {
        self.previews
            .values()
            .filter(|b| !b.is_created() && !b.is_removing())
            .map(WindowSinkBinding::window_id)
            .collect()
    }

    /// Number of preview bindings that still hold or want a surface.
    #[must_use]
    pub fn active_previews(&self) -> usize {
        self.previews.len()
    }
}
