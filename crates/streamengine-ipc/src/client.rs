//! Client side of the daemon socket.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use streamengine_core::WindowId;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{IpcError, IpcResult};
use crate::events::{Event, EventType};
use crate::messages::{Method, Request, Response};

/// How long a request may wait for its answer.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

type PendingReplies = Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>;

/// One line from the daemon: an answer to a request, or an event.
#[derive(Deserialize)]
#[serde(untagged)]
enum Incoming {
    Response(Response),
    Event(Event),
}

/// Connection to the stream engine daemon.
pub struct IpcClient {
    writer: Mutex<OwnedWriteHalf>,
    next_id: AtomicU64,
    pending: PendingReplies,
    events: mpsc::Receiver<Event>,
    timeout: Duration,
}

impl IpcClient {
    /// Connect to the daemon at the given socket path.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn connect(socket_path: &Path) -> IpcResult<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (reader, writer) = stream.into_split();

        let pending = PendingReplies::default();
        let (event_tx, events) = mpsc::channel(64);
        tokio::spawn(read_loop(reader, Arc::clone(&pending), event_tx));

        Ok(Self {
            writer: Mutex::new(writer),
            next_id: AtomicU64::new(1),
            pending,
            events,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Connect to the daemon at the default socket path.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn connect_default() -> IpcResult<Self> {
        Self::connect(&crate::socket_path()).await
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send a request and wait for the daemon's response envelope.
    ///
    /// # Errors
    /// Returns an error if the request cannot be written, the connection
    /// drops, or no answer arrives in time.
    pub async fn request(&self, method: Method) -> IpcResult<Response> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = serde_json::to_string(&Request { id, method })? + "\n";

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = self.writer.lock().await.write_all(line.as_bytes()).await {
            self.pending.lock().await.remove(&id);
            return Err(e.into());
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(IpcError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(IpcError::Timeout)
            }
        }
    }

    /// Send a request and unwrap its result, turning a daemon-side error
    /// into [`IpcError::Remote`].
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon rejects it.
    pub async fn call(&self, method: Method) -> IpcResult<Value> {
        self.request(method).await?.result.map_err(IpcError::Remote)
    }

    /// Current engine state.
    ///
    /// # Errors
    /// See [`IpcClient::call`].
    pub async fn state(&self) -> IpcResult<Value> {
        self.call(Method::GetState).await
    }

    /// Bind a preview surface.
    ///
    /// # Errors
    /// See [`IpcClient::call`].
    pub async fn add_preview_window(&self, window: WindowId) -> IpcResult<()> {
        self.call(Method::AddPreviewWindow { window }).await.map(drop)
    }

    /// Unbind a preview surface.
    ///
    /// # Errors
    /// See [`IpcClient::call`].
    pub async fn remove_preview_window(&self, window: WindowId) -> IpcResult<()> {
        self.call(Method::RemovePreviewWindow { window }).await.map(drop)
    }

    /// Limit the events delivered on this connection. An empty list means
    /// every event.
    ///
    /// # Errors
    /// See [`IpcClient::call`].
    pub async fn subscribe(&self, events: Vec<EventType>) -> IpcResult<()> {
        self.call(Method::Subscribe { events }).await.map(drop)
    }

    /// Events pushed by the daemon.
    pub fn events(&mut self) -> &mut mpsc::Receiver<Event> {
        &mut self.events
    }
}

async fn read_loop(reader: OwnedReadHalf, pending: PendingReplies, events: mpsc::Sender<Event>) {
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("Daemon closed the connection");
                break;
            }
            Ok(_) => match serde_json::from_str::<Incoming>(&line) {
                Ok(Incoming::Response(response)) => {
                    match pending.lock().await.remove(&response.id) {
                        Some(tx) => {
                            let _ = tx.send(response);
                        }
                        None => debug!(id = response.id, "Response for a request nobody waits on"),
                    }
                }
                Ok(Incoming::Event(event)) => {
                    // a full queue must not hold up responses
                    if let Err(mpsc::error::TrySendError::Full(event)) = events.try_send(event) {
                        warn!(event = ?event.event, "Event queue full, dropping event");
                    }
                }
                Err(e) => warn!(error = %e, "Unreadable line from daemon"),
            },
            Err(e) => {
                warn!(error = %e, "Read from daemon failed");
                break;
            }
        }
    }

    // wake every waiter with a closed channel
    pending.lock().await.clear();
}
