//! Stream Engine Daemon - video preview and output surface service.
//!
//! This is the main entry point for the stream engine daemon, which owns the
//! shared capture pipeline and serves preview and output window requests
//! over a Unix socket.

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod server;
mod signals;

use streamengine_core::{Engine, Notification};
use streamengine_gst::GstGraph;
use streamengine_ipc::{Event, IpcServer, Response, socket_path};

use crate::config::DaemonConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first, it carries the log level
    let config = config::load_config()?;
    init_logging(&config.daemon)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting stream engine daemon");

    // Build the engine around the GStreamer graph
    let graph = GstGraph::new(config.engine()).context("Failed to initialize GStreamer")?;
    let engine = Engine::new(graph);
    let mut notifications = engine.subscribe();

    // Windows destroyed under a render element come back as X errors
    if let Err(e) = streamengine_gst::xerror::install(engine.window_fault_handle()) {
        warn!(error = %e, "X error hook not installed, window faults surface as pipeline errors only");
    }

    let (request_tx, request_rx) = mpsc::channel(64);
    let (engine_shutdown_tx, engine_shutdown_rx) = mpsc::channel(1);
    let mut engine_handle = tokio::spawn(engine.run(request_rx, engine_shutdown_rx));

    // Start IPC server
    let socket = config.daemon.socket_path.clone().unwrap_or_else(socket_path);
    let (server, mut ipc_rx) = IpcServer::bind(&socket).await.context("Failed to start IPC server")?;
    let event_tx = server.event_sender();
    let ipc_handle = tokio::spawn(async move { server.run().await });

    let mut shutdown_rx = signals::setup_signal_handlers()?;

    info!(?socket, "Daemon running. Press Ctrl+C to exit.");

    loop {
        tokio::select! {
            // Handle IPC requests off the loop so a slow engine reply never
            // stalls notifications
            Some((client_id, request, response_tx)) = ipc_rx.recv() => {
                debug!(client_id, request_id = request.id, method = ?request.method, "IPC request");
                let engine = request_tx.clone();
                tokio::spawn(async move {
                    let result = server::dispatch(request.method, &engine).await;
                    let _ = response_tx.send(Response { id: request.id, result }).await;
                });
            }

            // Forward engine notifications to subscribed clients
            notification = notifications.recv() => {
                match notification {
                    Ok(notification) => {
                        if notification == Notification::ShutdownRequested {
                            info!("Engine announced shutdown");
                        }
                        let _ = event_tx.send(Event::from(&notification));
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Notification forwarding fell behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Notification channel closed");
                        break;
                    }
                }
            }

            // The engine stopped on its own (IPC shutdown)
            result = &mut engine_handle => {
                if let Err(e) = result {
                    error!(error = %e, "Engine task failed");
                }
                info!("Engine stopped");
                break;
            }

            // Handle shutdown signal
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received");
                let _ = engine_shutdown_tx.send(()).await;
                if let Err(e) = (&mut engine_handle).await {
                    error!(error = %e, "Engine task failed");
                }
                break;
            }
        }
    }

    // Cleanup
    info!("Shutting down...");
    ipc_handle.abort();
    if let Err(e) = tokio::fs::remove_file(&socket).await {
        debug!(error = %e, "Socket already gone");
    }

    info!("Stream engine daemon stopped");
    Ok(())
}

fn init_logging(config: &DaemonConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Invalid log level")?;

    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}
