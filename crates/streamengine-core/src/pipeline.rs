//! Pipeline Controller: lifecycle of the single shared media graph.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::GraphError;
use crate::event::{Generation, PipelineEventSender, PlaybackState};
use crate::graph::MediaGraph;

/// Lifecycle of the shared pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// No graph exists; the next demand builds one
    #[default]
    Uninitialized,
    Playing,
    /// Built but the root has not reached (or has left) playing
    NotPlaying,
    /// Torn down after a fatal fault, waiting for the sweep to finish
    Destroyed,
}

/// Owns the graph backend and its state machine.
pub struct PipelineController<G> {
    graph: G,
    state: PipelineState,
    generation: Generation,
    events: PipelineEventSender,
}

impl<G: MediaGraph> PipelineController<G> {
    pub fn new(graph: G, events: PipelineEventSender) -> Self {
        Self { graph, state: PipelineState::Uninitialized, generation: 0, events }
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.state == PipelineState::Playing
    }

    /// Whether a graph currently exists.
    #[must_use]
    pub fn is_built(&self) -> bool {
        matches!(self.state, PipelineState::Playing | PipelineState::NotPlaying)
    }

    /// Generation of the current (or most recent) graph.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Whether `generation` names the live graph.
    #[must_use]
    pub fn is_current(&self, generation: Generation) -> bool {
        self.is_built() && generation == self.generation
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut G {
        &mut self.graph
    }

    /// Build the graph on first demand.
    ///
    /// A destroyed pipeline is left alone: the teardown sweep rebuilds it once
    /// it has finished with the old bindings.
    pub fn ensure(&mut self) -> Result<(), GraphError> {
        if self.state != PipelineState::Uninitialized {
            return Ok(());
        }

        let generation = self.generation + 1;
        info!(generation, "Creating video pipeline");
        self.graph.start(generation, self.events.clone())?;
        self.generation = generation;
        self.state = PipelineState::NotPlaying;
        Ok(())
    }

    /// Apply a root state change. Returns true when the pipeline just reached
    /// playing.
    pub fn on_root_state_changed(&mut self, generation: Generation, new: PlaybackState) -> bool {
        if !self.is_current(generation) {
            debug!(generation, current = self.generation, "Ignoring state change from stale pipeline");
            return false;
        }

        match (self.state, new) {
            (PipelineState::NotPlaying, PlaybackState::Playing) => {
                info!("Pipeline is playing");
                self.state = PipelineState::Playing;
                true
            }
            (PipelineState::Playing, state) if state != PlaybackState::Playing => {
                info!(?state, "Pipeline is not playing");
                self.state = PipelineState::NotPlaying;
                false
            }
            _ => false,
        }
    }

    /// Stop and release the graph after a fatal fault.
    pub fn destroy(&mut self) {
        if !self.is_built() {
            warn!(state = ?self.state, "Destroy requested with no pipeline");
            return;
        }
        info!(generation = self.generation, "Destroying video pipeline");
        self.graph.stop();
        self.state = PipelineState::Destroyed;
    }

    /// Leave the destroyed state so the next demand rebuilds.
    pub fn reset(&mut self) {
        if self.state == PipelineState::Destroyed {
            self.state = PipelineState::Uninitialized;
        }
    }

    /// Stop the graph for good.
    pub fn shutdown(&mut self) {
        if self.is_built() {
            self.graph.stop();
        }
        self.state = PipelineState::Uninitialized;
    }
}
