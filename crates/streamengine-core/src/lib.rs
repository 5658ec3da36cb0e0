//! Stream Engine Core - video output resource management.
//!
//! This crate owns the window sink bindings, the lifecycle of the shared video
//! pipeline, the two-phase removal of rendering branches, and recovery from
//! pipeline and windowing faults. The media framework itself is reached
//! through the [`MediaGraph`] trait.

pub mod binding;
pub mod busy;
pub mod channel;
pub mod command;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod event;
pub mod graph;
pub mod pipeline;
pub mod registry;
pub mod scheduler;
pub mod sink;
pub mod state;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use binding::{BindingKind, ElementId, ElementRole, PostRemovalAction, SinkChain, WindowId, WindowSinkBinding};
pub use channel::{MediaChannel, MediaStream, MediaType};
pub use command::EngineRequest;
pub use config::{EngineConfig, PipelineConfig};
pub use directory::{FaultDisposition, WindowFault, WindowFaultHandle};
pub use engine::Engine;
pub use error::{Error, ErrorCategory, GraphError, Result};
pub use event::{FaultKind, Generation, Notification, PipelineEvent, PipelineEventKind, PlaybackState};
pub use graph::{BlockCallback, MediaGraph};
pub use pipeline::PipelineState;
pub use sink::{SinkConfig, SinkPurpose};
pub use state::EngineSnapshot;
