//! The shared video pipeline: capture branch, tee junction, keep-alive
//! consumer, and the render branches attached to it.

use std::collections::HashMap;
use std::str::FromStr;

use gstreamer as gst;
use gst::prelude::*;
use parking_lot::Mutex;
use streamengine_core::event::PipelineEventSender;
use streamengine_core::{
    BlockCallback, ElementId, EngineConfig, Generation, GraphError, MediaGraph, PipelineConfig, SinkChain,
    SinkPurpose, WindowId,
};
use tracing::{debug, info, warn};

use crate::bus::{self, Surfaces};
use crate::error::{GstError, GstResult};
use crate::sink::SinkFactory;

const KEEPALIVE_NANOS_PER_MS: u64 = 1_000_000;

/// A render branch known to the running pipeline.
struct Branch {
    bin: gst::Element,
    /// Tee request pad feeding the branch, once linked
    tee_pad: Option<gst::Pad>,
    probe: Option<gst::PadProbeId>,
}

struct RunningPipeline {
    pipeline: gst::Pipeline,
    tee: gst::Element,
    branches: HashMap<ElementId, Branch>,
}

impl RunningPipeline {
    /// Take a blocked branch off the junction. The block probe and the tee
    /// request pad are released even when the bin cannot be removed.
    fn release_branch(&mut self, root: &ElementId, stop_timeout: gst::ClockTime) -> GstResult<()> {
        let branch = self
            .branches
            .remove(root)
            .ok_or_else(|| GstError::UnknownChain(root.to_string()))?;

        if let Some(pad) = &branch.tee_pad {
            if let Some(peer) = pad.peer() {
                let _ = pad.unlink(&peer);
            }
        }
        let removed = self.pipeline.remove(&branch.bin);
        if let Err(e) = &removed {
            warn!(%root, error = %e, "Failed to remove render branch from the pipeline");
        }

        let _ = branch.bin.set_state(gst::State::Null);
        let (result, state, _) = branch.bin.state(stop_timeout);
        if result.is_err() || state != gst::State::Null {
            warn!(%root, ?state, "Render branch did not reach NULL in time");
        }

        if let Some(pad) = branch.tee_pad {
            if let Some(probe) = branch.probe {
                pad.remove_probe(probe);
            }
            self.tee.release_request_pad(&pad);
        }

        removed.map_err(GstError::from)
    }
}

/// GStreamer implementation of [`MediaGraph`].
pub struct GstGraph {
    config: PipelineConfig,
    sinks: SinkFactory,
    surfaces: Surfaces,
    running: Option<RunningPipeline>,
}

impl GstGraph {
    /// Initialize GStreamer and prepare an idle graph.
    pub fn new(config: EngineConfig) -> GstResult<Self> {
        gst::init()?;
        info!(version = %gst::version_string(), "GStreamer initialized");
        Ok(Self {
            config: config.pipeline,
            sinks: SinkFactory::new(config.sinks),
            surfaces: Surfaces::default(),
            running: None,
        })
    }

    fn running(&mut self) -> GstResult<&mut RunningPipeline> {
        self.running.as_mut().ok_or(GstError::NotRunning)
    }

    fn build(&self) -> GstResult<RunningPipeline> {
        let pipeline = gst::Pipeline::builder().name("pipeline").build();

        let source = self.make_source()?;
        let rate = gst::ElementFactory::make("videorate").build()?;
        let convert = gst::ElementFactory::make("videoconvert").build()?;
        let caps = gst::Caps::from_str(&self.config.caps).map_err(|_| GstError::Caps(self.config.caps.clone()))?;
        let filter = gst::ElementFactory::make("capsfilter").property("caps", caps).build()?;
        let tee = gst::ElementFactory::make("tee").name("tee").build()?;

        let keepalive_queue = gst::ElementFactory::make("queue")
            .name("keepalive-queue")
            .property_from_str("leaky", "downstream")
            .property("max-size-buffers", 0u32)
            .property("max-size-bytes", 0u32)
            .property("max-size-time", self.config.keepalive_max_time_ms * KEEPALIVE_NANOS_PER_MS)
            .build()?;
        let keepalive_sink = gst::ElementFactory::make("fakesink")
            .name("keepalive-sink")
            .property("sync", false)
            .property("async", false)
            .build()?;

        pipeline.add_many([&source, &rate, &convert, &filter, &tee, &keepalive_queue, &keepalive_sink])?;
        gst::Element::link_many([&source, &rate, &convert, &filter, &tee])?;
        gst::Element::link_many([&tee, &keepalive_queue, &keepalive_sink])?;

        Ok(RunningPipeline { pipeline, tee, branches: HashMap::new() })
    }

    /// Configured source description, else the first candidate that opens.
    fn make_source(&self) -> GstResult<gst::Element> {
        if let Some(description) = self.config.source.as_deref() {
            info!(%description, "Using configured video source");
            let bin = gst::parse::bin_from_description(description, true)?;
            return Ok(bin.upcast());
        }

        for factory in &self.config.source_candidates {
            let source = match gst::ElementFactory::make(factory).name("videosrc").build() {
                Ok(source) => source,
                Err(e) => {
                    debug!(%factory, error = %e, "Video source unavailable");
                    continue;
                }
            };
            if source.find_property("is-live").is_some() {
                source.set_property("is-live", true);
            }
            if source.set_state(gst::State::Ready).is_err() {
                debug!(%factory, "Video source could not open its device");
                let _ = source.set_state(gst::State::Null);
                continue;
            }
            let _ = source.set_state(gst::State::Null);
            info!(%factory, "Using video source");
            return Ok(source);
        }
        Err(GstError::NoSource)
    }

    fn forget_surfaces(&self, chain: &SinkChain) {
        for element in chain.elements() {
            self.surfaces.forget(&element.id);
        }
    }
}

impl MediaGraph for GstGraph {
    fn start(&mut self, generation: Generation, events: PipelineEventSender) -> Result<(), GraphError> {
        if self.running.is_some() {
            self.stop();
        }

        let running = self.build()?;
        if let Some(bus) = running.pipeline.bus() {
            bus::install(&bus, generation, events, self.surfaces.clone());
        }
        if let Err(e) = running.pipeline.set_state(gst::State::Playing) {
            let _ = running.pipeline.set_state(gst::State::Null);
            return Err(GstError::from(e).into());
        }

        info!(generation, "Video pipeline started");
        self.running = Some(running);
        Ok(())
    }

    fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        if let Some(bus) = running.pipeline.bus() {
            bus.unset_sync_handler();
        }
        if let Err(e) = running.pipeline.set_state(gst::State::Null) {
            warn!(error = %e, "Video pipeline did not stop cleanly");
        }
        for branch in running.branches.into_values() {
            let _ = branch.bin.set_state(gst::State::Null);
        }
        self.surfaces.clear();
        info!("Video pipeline stopped");
    }

    fn make_sink(&mut self, purpose: SinkPurpose) -> Result<SinkChain, GraphError> {
        if self.running.is_none() {
            return Err(GraphError::NotRunning);
        }
        let built = self.sinks.build(purpose)?;
        let running = self.running()?;
        running
            .branches
            .insert(built.chain.root().clone(), Branch { bin: built.bin, tee_pad: None, probe: None });
        Ok(built.chain)
    }

    fn attach(&mut self, chain: &SinkChain, window: WindowId) -> Result<(), GraphError> {
        let surfaces = self.surfaces.clone();
        let running = self.running()?;
        let branch = running
            .branches
            .get_mut(chain.root())
            .ok_or_else(|| GstError::UnknownChain(chain.root().to_string()))?;

        for element in chain.elements() {
            surfaces.bind(&element.id, window);
        }

        running.pipeline.add(&branch.bin).map_err(GstError::from)?;
        let tee_pad = running.tee.request_pad_simple("src_%u").ok_or(GstError::NoRequestPad)?;
        // recorded before linking so a failed attach still releases it
        branch.tee_pad = Some(tee_pad.clone());
        let sink_pad = branch
            .bin
            .static_pad("sink")
            .ok_or_else(|| GstError::MissingPad("sink".to_string()))?;
        tee_pad.link(&sink_pad).map_err(GstError::from)?;
        branch.bin.sync_state_with_parent().map_err(GstError::from)?;

        debug!(root = %chain.root(), pad = %tee_pad.name(), %window, "Attached render branch");
        Ok(())
    }

    fn discard(&mut self, chain: &SinkChain) {
        self.forget_surfaces(chain);
        let Some(running) = self.running.as_mut() else {
            return;
        };
        let Some(branch) = running.branches.remove(chain.root()) else {
            return;
        };

        if let Some(pad) = branch.tee_pad {
            if let Some(peer) = pad.peer() {
                let _ = pad.unlink(&peer);
            }
            running.tee.release_request_pad(&pad);
        }
        let _ = branch.bin.set_state(gst::State::Null);
        if branch.bin.parent().is_some() {
            let _ = running.pipeline.remove(&branch.bin);
        }
        debug!(root = %chain.root(), "Discarded render branch");
    }

    fn request_block(&mut self, chain: &SinkChain, on_blocked: BlockCallback) -> Result<(), GraphError> {
        let running = self.running()?;
        let branch = running
            .branches
            .get_mut(chain.root())
            .ok_or_else(|| GstError::UnknownChain(chain.root().to_string()))?;
        let pad = branch
            .tee_pad
            .clone()
            .ok_or_else(|| GstError::UnknownChain(chain.root().to_string()))?;

        let on_blocked = Mutex::new(Some(on_blocked));
        let probe = pad.add_probe(gst::PadProbeType::BLOCK_DOWNSTREAM, move |_pad, _info| {
            if let Some(callback) = on_blocked.lock().take() {
                callback();
            }
            gst::PadProbeReturn::Ok
        });
        branch.probe = probe;

        debug!(root = %chain.root(), pad = %pad.name(), "Blocking junction pad");
        Ok(())
    }

    fn detach(&mut self, chain: &SinkChain) -> Result<(), GraphError> {
        self.forget_surfaces(chain);
        let stop_timeout = gst::ClockTime::from_seconds(self.config.stop_timeout_secs);
        self.running()?.release_branch(chain.root(), stop_timeout)?;
        debug!(root = %chain.root(), "Detached render branch");
        Ok(())
    }

    fn junction_consumers(&self) -> usize {
        self.running.as_ref().map_or(0, |running| running.tee.src_pads().len())
    }
}
