//! Stream Engine GStreamer - the media graph behind the engine.
//!
//! This crate handles all interactions with GStreamer, including:
//! - Building the capture branch, tee junction and keep-alive consumer
//! - Constructing render branches from the configured backends
//! - Blocking, detaching and releasing branches on request
//! - Forwarding bus messages and binding render elements to windows
//! - Routing X errors for bound windows to the engine's fault handle

mod bus;
pub mod error;
pub mod graph;
pub mod sink;
pub mod xerror;

pub use error::{GstError, GstResult};
pub use graph::GstGraph;
pub use sink::{RenderBackend, SinkFactory};
