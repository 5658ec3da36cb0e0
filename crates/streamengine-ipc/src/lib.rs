//! Stream Engine IPC - Unix socket protocol and client library.
//!
//! This crate defines the line-delimited JSON protocol between the daemon
//! and its clients, and provides a client library for connecting to it.

pub mod client;
pub mod error;
pub mod events;
pub mod messages;
pub mod server;

pub use client::IpcClient;
pub use error::{IpcError, IpcResult};
pub use events::{ErrorData, Event, EventType};
pub use messages::{ErrorInfo, Method, Request, Response};
pub use server::{IncomingRequest, IpcServer};

use std::path::PathBuf;

use directories::BaseDirs;

/// Get the default socket path.
///
/// Uses `$XDG_RUNTIME_DIR/streamengine/daemon.sock`, falling back to the
/// system temporary directory when no runtime directory is set.
#[must_use]
pub fn socket_path() -> PathBuf {
    BaseDirs::new()
        .and_then(|dirs| dirs.runtime_dir().map(std::path::Path::to_path_buf))
        .unwrap_or_else(std::env::temp_dir)
        .join("streamengine/daemon.sock")
}
