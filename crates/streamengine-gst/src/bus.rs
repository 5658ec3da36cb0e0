//! Bus sync handler: forwards pipeline events to the control loop and binds
//! render elements to their window when they ask for one.
//!
//! Runs on whichever streaming thread posted the message, so it only reads
//! the surface map and sends on the event channel.

use std::collections::HashMap;
use std::sync::Arc;

use gstreamer as gst;
use gstreamer_video as gst_video;
use gst::glib;
use gst::prelude::*;
use gst_video::prelude::*;
use parking_lot::RwLock;
use streamengine_core::{ElementId, FaultKind, Generation, PipelineEvent, PipelineEventKind, PlaybackState, WindowId};
use streamengine_core::event::PipelineEventSender;
use tracing::{debug, warn};

use crate::sink::apply_policy;

/// Element name to target window, shared with the bus handler.
#[derive(Debug, Clone, Default)]
pub(crate) struct Surfaces {
    inner: Arc<RwLock<HashMap<String, WindowId>>>,
}

impl Surfaces {
    pub(crate) fn bind(&self, element: &ElementId, window: WindowId) {
        self.inner.write().insert(element.0.clone(), window);
    }

    pub(crate) fn forget(&self, element: &ElementId) {
        self.inner.write().remove(&element.0);
    }

    pub(crate) fn clear(&self) {
        self.inner.write().clear();
    }

    /// Window for `object` or its nearest bound ancestor.
    fn resolve(&self, object: &gst::Object) -> Option<WindowId> {
        let map = self.inner.read();
        let mut current = Some(object.clone());
        while let Some(obj) = current {
            if let Some(window) = map.get(obj.name().as_str()) {
                return Some(*window);
            }
            current = obj.parent();
        }
        None
    }
}

/// Install the handler on `bus` for one pipeline generation.
pub(crate) fn install(bus: &gst::Bus, generation: Generation, events: PipelineEventSender, surfaces: Surfaces) {
    bus.set_sync_handler(move |_bus, msg| {
        if let Some(kind) = translate(msg, &surfaces) {
            // a closed receiver means the engine is gone, nothing to tell
            let _ = events.send(PipelineEvent { generation, kind });
        }
        gst::BusSyncReply::Drop
    });
}

fn translate(msg: &gst::Message, surfaces: &Surfaces) -> Option<PipelineEventKind> {
    use gst::MessageView;

    match msg.view() {
        MessageView::Element(_) if gst_video::is_video_overlay_prepare_window_handle_message(msg) => {
            bind_surface(msg, surfaces);
            None
        }
        MessageView::Error(err) => {
            let error = err.error();
            Some(PipelineEventKind::Error {
                origin: origin(msg),
                kind: fault_kind(&error),
                message: error.message().to_string(),
                debug: err.debug().map(|d| d.to_string()),
            })
        }
        MessageView::Warning(warning) => Some(PipelineEventKind::Warning {
            origin: origin(msg),
            message: warning.error().message().to_string(),
            debug: warning.debug().map(|d| d.to_string()),
        }),
        MessageView::StateChanged(change) if is_root(msg) => Some(PipelineEventKind::StateChanged {
            old: playback_state(change.old()),
            new: playback_state(change.current()),
        }),
        _ => None,
    }
}

fn bind_surface(msg: &gst::Message, surfaces: &Surfaces) {
    let Some(src) = msg.src() else {
        return;
    };
    let Some(window) = surfaces.resolve(src) else {
        debug!(element = %src.name(), "Surface requested by an unbound element");
        return;
    };
    let Ok(handle) = usize::try_from(window.0) else {
        warn!(%window, "Window id does not fit a native handle");
        return;
    };

    if let Some(element) = src.downcast_ref::<gst::Element>() {
        apply_policy(element);
    }
    let Some(overlay) = src.dynamic_cast_ref::<gst_video::VideoOverlay>() else {
        debug!(element = %src.name(), "Surface requested by a non-overlay element");
        return;
    };

    debug!(element = %src.name(), %window, "Binding render element to window");
    // SAFETY: the handle names a native window owned by the requesting client
    #[allow(unsafe_code)]
    unsafe {
        overlay.set_window_handle(handle);
    }
}

/// Posting element followed by its ancestors.
fn origin(msg: &gst::Message) -> Vec<ElementId> {
    let mut origin = Vec::new();
    let mut current = msg.src().cloned();
    while let Some(obj) = current {
        origin.push(ElementId::new(obj.name().as_str()));
        current = obj.parent();
    }
    origin
}

fn is_root(msg: &gst::Message) -> bool {
    msg.src().is_some_and(|src| src.is::<gst::Pipeline>() && src.parent().is_none())
}

pub(crate) fn fault_kind(error: &glib::Error) -> FaultKind {
    if let Some(resource) = error.kind::<gst::ResourceError>() {
        return match resource {
            gst::ResourceError::Busy => FaultKind::ResourceBusy,
            gst::ResourceError::Write => FaultKind::ResourceWrite,
            _ => FaultKind::Resource,
        };
    }
    if error.kind::<gst::StreamError>().is_some() {
        FaultKind::Stream
    } else if error.kind::<gst::CoreError>().is_some() {
        FaultKind::Core
    } else if error.kind::<gst::LibraryError>().is_some() {
        FaultKind::Library
    } else {
        FaultKind::Other
    }
}

pub(crate) fn playback_state(state: gst::State) -> PlaybackState {
    match state {
        gst::State::Ready => PlaybackState::Ready,
        gst::State::Paused => PlaybackState::Paused,
        gst::State::Playing => PlaybackState::Playing,
        _ => PlaybackState::Null,
    }
}
