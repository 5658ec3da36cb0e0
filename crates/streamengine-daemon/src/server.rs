//! Request handling for the IPC server.
//!
//! Each IPC method becomes an [`EngineRequest`] on the control loop; the
//! answer comes back through a oneshot and is shaped into a response value.

use serde_json::{Value, json};
use streamengine_core::{EngineRequest, ErrorCategory};
use streamengine_ipc::messages::{ErrorInfo, Method};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Handle an IPC request and return a response value.
pub async fn dispatch(method: Method, engine: &mpsc::Sender<EngineRequest>) -> Result<Value, ErrorInfo> {
    match method {
        Method::GetState => {
            let snapshot = ask(engine, |reply| EngineRequest::GetState { reply }).await?;
            Ok(serde_json::to_value(snapshot).unwrap_or(json!({})))
        }

        Method::AddPreviewWindow { window } => {
            ask(engine, |reply| EngineRequest::AddPreviewWindow { window, reply })
                .await?
                .map_err(|e| ErrorInfo::from(&e))?;
            Ok(json!({ "window": window }))
        }

        Method::RemovePreviewWindow { window } => {
            ask(engine, |reply| EngineRequest::RemovePreviewWindow { window, reply })
                .await?
                .map_err(|e| ErrorInfo::from(&e))?;
            Ok(json!({ "window": window }))
        }

        Method::RemoveOutputWindow { window } => {
            let removed = ask(engine, |reply| EngineRequest::RemoveOutputWindow { window, reply }).await?;
            Ok(json!({ "removed": removed }))
        }

        Method::MuteInput { channel, stream_id, mute } => {
            ask(engine, |reply| EngineRequest::MuteInput { channel, stream_id, mute, reply })
                .await?
                .map_err(|e| ErrorInfo::from(&e))?;
            Ok(Value::Null)
        }

        Method::MuteOutput { channel, stream_id, mute } => {
            ask(engine, |reply| EngineRequest::MuteOutput { channel, stream_id, mute, reply })
                .await?
                .map_err(|e| ErrorInfo::from(&e))?;
            Ok(Value::Null)
        }

        Method::SetOutputVolume { channel, stream_id, volume } => {
            ask(engine, |reply| EngineRequest::SetOutputVolume { channel, stream_id, volume, reply })
                .await?
                .map_err(|e| ErrorInfo::from(&e))?;
            Ok(Value::Null)
        }

        Method::SetOutputWindow { channel, stream_id, window } => {
            ask(engine, |reply| EngineRequest::SetOutputWindow { channel, stream_id, window, reply })
                .await?
                .map_err(|e| ErrorInfo::from(&e))?;
            Ok(Value::Null)
        }

        Method::ChannelClosed { channel } => {
            tell(engine, EngineRequest::ChannelClosed { path: channel }).await?;
            Ok(Value::Null)
        }

        Method::Error { code, message } => {
            tell(engine, EngineRequest::Error { code, message }).await?;
            Ok(Value::Null)
        }

        // answered per connection by the IPC server
        Method::Subscribe { .. } | Method::Unsubscribe { .. } => Ok(Value::Null),

        Method::Shutdown => {
            debug!("Shutdown requested over IPC");
            tell(engine, EngineRequest::Shutdown).await?;
            Ok(Value::Null)
        }
    }
}

fn engine_gone() -> ErrorInfo {
    ErrorInfo::new(ErrorCategory::Failed, "stream engine is not running")
}

/// Send a request that carries no reply.
async fn tell(engine: &mpsc::Sender<EngineRequest>, request: EngineRequest) -> Result<(), ErrorInfo> {
    engine.send(request).await.map_err(|_| engine_gone())
}

/// Send a request built around a reply channel and wait for the answer.
async fn ask<T>(
    engine: &mpsc::Sender<EngineRequest>,
    build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
) -> Result<T, ErrorInfo> {
    let (reply, response) = oneshot::channel();
    tell(engine, build(reply)).await?;
    response.await.map_err(|_| engine_gone())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use streamengine_core::testing::FakeGraph;
    use streamengine_core::{Engine, WindowId};

    use super::*;

    const WINDOW: WindowId = WindowId(0x0040_0001);

    fn spawn_engine() -> (mpsc::Sender<EngineRequest>, FakeGraph, tokio::task::JoinHandle<()>) {
        let graph = FakeGraph::new();
        let engine = Engine::new(graph.clone());
        let (request_tx, request_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(async move {
            // a dropped sender reads as a shutdown signal
            engine.run(request_rx, shutdown_rx).await;
            drop(shutdown_tx);
        });
        (request_tx, graph, task)
    }

    #[tokio::test]
    async fn test_preview_requests_reach_the_engine() {
        let (engine, graph, task) = spawn_engine();

        let added = dispatch(Method::AddPreviewWindow { window: WINDOW }, &engine).await.unwrap();
        assert_eq!(added["window"], WINDOW.0);
        assert!(graph.is_running());

        let duplicate = dispatch(Method::AddPreviewWindow { window: WINDOW }, &engine).await;
        assert_matches!(duplicate, Err(ErrorInfo { code: 400, category: ErrorCategory::InvalidArgument, .. }));

        let state = dispatch(Method::GetState, &engine).await.unwrap();
        assert_eq!(state["previews"].as_array().map(Vec::len), Some(1));
        assert_eq!(state["busy"], true);

        dispatch(Method::RemovePreviewWindow { window: WINDOW }, &engine).await.unwrap();
        let state = dispatch(Method::GetState, &engine).await.unwrap();
        assert_eq!(state["previews"].as_array().map(Vec::len), Some(0));

        dispatch(Method::Shutdown, &engine).await.unwrap();
        task.await.unwrap();
        assert_matches!(dispatch(Method::GetState, &engine).await, Err(ErrorInfo { code: 500, .. }));
    }

    #[tokio::test]
    async fn test_stream_requests_without_channel() {
        let (engine, _graph, task) = spawn_engine();

        let muted = dispatch(Method::MuteInput { channel: "/chan/1".into(), stream_id: 1, mute: true }, &engine).await;
        assert_matches!(muted, Err(ErrorInfo { category: ErrorCategory::NotAvailable, .. }));

        let removed = dispatch(Method::RemoveOutputWindow { window: WINDOW }, &engine).await.unwrap();
        assert_eq!(removed["removed"], false);

        dispatch(Method::Shutdown, &engine).await.unwrap();
        task.await.unwrap();
    }
}
