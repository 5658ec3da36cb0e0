use std::sync::Arc;

use assert_matches::assert_matches;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::Engine;
use crate::binding::{BindingKind, ElementId, PostRemovalAction, RemovalStage, WindowId};
use crate::channel::{MediaType, STREAMED_MEDIA_CHANNEL_TYPE, StreamDirection, StreamState};
use crate::command::EngineRequest;
use crate::directory::{FaultDisposition, WindowFault};
use crate::error::Error;
use crate::event::{FaultKind, Notification, PipelineEventKind};
use crate::graph::MediaGraph;
use crate::pipeline::PipelineState;
use crate::sink::SinkPurpose;
use crate::testing::{FakeChannel, FakeGraph, FakeStream};

const W1: WindowId = WindowId(0x10);
const W2: WindowId = WindowId(0x20);
const W3: WindowId = WindowId(0x30);

fn engine() -> (Engine<FakeGraph>, FakeGraph) {
    let graph = FakeGraph::new();
    (Engine::new(graph.clone()), graph)
}

fn playing_engine() -> (Engine<FakeGraph>, FakeGraph) {
    let (mut engine, graph) = engine();
    engine.ensure_pipeline().unwrap();
    graph.emit_playing();
    engine.process_pending();
    assert_eq!(engine.pipeline_state(), PipelineState::Playing);
    (engine, graph)
}

fn drain(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

fn created(engine: &Engine<FakeGraph>, kind: BindingKind, window: WindowId) -> bool {
    engine.bindings().get(kind, window).is_some_and(|b| b.is_created())
}

fn removing(engine: &Engine<FakeGraph>, kind: BindingKind, window: WindowId) -> bool {
    engine.bindings().get(kind, window).is_some_and(|b| b.is_removing())
}

/// An output binding whose chain came from the engine's own sink factory.
fn add_output(engine: &mut Engine<FakeGraph>, stream: &Arc<FakeStream>, window: WindowId) -> ElementId {
    let chain = engine.make_video_sink(SinkPurpose::Output).unwrap();
    let render = chain.render_element().unwrap().clone();
    assert!(engine.add_output_window(stream.clone(), chain, window));
    render
}

fn call_with_video() -> (Arc<FakeChannel>, Arc<FakeStream>, Arc<FakeStream>) {
    let audio = FakeStream::new(1, MediaType::Audio);
    let video = FakeStream::new(2, MediaType::Video);
    let channel = FakeChannel::new("/chan/1", vec![audio.clone(), video.clone()]);
    (channel, audio, video)
}

#[test]
fn test_duplicate_add_rejected() {
    let (mut engine, _graph) = playing_engine();
    engine.add_preview_window(W1).unwrap();
    assert_matches!(engine.add_preview_window(W1), Err(Error::AlreadyBound(w)) if w == W1);
    assert_eq!(engine.bindings().len(BindingKind::Preview), 1);
}

#[test]
fn test_deferred_attachment_on_playing() {
    let (mut engine, graph) = engine();
    let mut rx = engine.subscribe();

    engine.add_preview_window(W1).unwrap();
    assert_eq!(engine.pipeline_state(), PipelineState::NotPlaying);
    assert!(!created(&engine, BindingKind::Preview, W1));
    assert!(drain(&mut rx).is_empty());

    graph.emit_playing();
    engine.process_pending();

    assert!(created(&engine, BindingKind::Preview, W1));
    assert_eq!(graph.attached_windows(), vec![W1]);
    assert_eq!(drain(&mut rx), vec![Notification::HandlingChannel]);
}

#[test]
fn test_remove_before_attachment_is_immediate() {
    let (mut engine, graph) = engine();
    engine.add_preview_window(W1).unwrap();
    engine.remove_preview_window(W1).unwrap();

    assert!(engine.bindings().is_empty());
    assert_eq!(graph.pending_blocks(), 0);
    assert_matches!(engine.remove_preview_window(W1), Err(Error::NotFound(_)));
}

#[test]
fn test_two_phase_removal() {
    let (mut engine, graph) = playing_engine();
    engine.add_preview_window(W1).unwrap();

    engine.remove_preview_window(W1).unwrap();
    let binding = engine.bindings().get(BindingKind::Preview, W1).unwrap();
    assert_eq!(binding.removal_stage(), Some(RemovalStage::BlockRequested));
    // nothing detached until the block is confirmed
    assert_eq!(graph.attached_windows(), vec![W1]);

    // a second request only adjusts the action
    engine.remove_preview_window(W1).unwrap();
    assert_eq!(graph.pending_blocks(), 1);

    assert_eq!(graph.confirm_blocks(), 1);
    engine.process_pending();
    assert!(engine.bindings().is_empty());
    assert!(graph.attached_windows().is_empty());
    assert_eq!(graph.detached().len(), 1);
}

#[test]
fn test_merge_on_recreate() {
    let (mut engine, graph) = playing_engine();
    engine.add_preview_window(W1).unwrap();
    let first = graph.render_element(W1).unwrap();

    engine.remove_preview_window(W1).unwrap();
    engine.add_preview_window(W1).unwrap();
    assert_eq!(
        engine.bindings().get(BindingKind::Preview, W1).unwrap().post_removal_action(),
        PostRemovalAction::RecreateAfterRemoval
    );
    assert_eq!(engine.bindings().len(BindingKind::Preview), 1);

    graph.confirm_blocks();
    engine.process_pending();

    assert_eq!(engine.bindings().len(BindingKind::Preview), 1);
    assert!(created(&engine, BindingKind::Preview, W1));
    assert!(!removing(&engine, BindingKind::Preview, W1));
    assert_ne!(graph.render_element(W1).unwrap(), first);
}

#[test]
fn test_remove_cancels_pending_recreate() {
    let (mut engine, graph) = playing_engine();
    engine.add_preview_window(W1).unwrap();
    engine.remove_preview_window(W1).unwrap();
    engine.add_preview_window(W1).unwrap();
    engine.remove_preview_window(W1).unwrap();

    graph.confirm_blocks();
    engine.process_pending();
    assert!(engine.bindings().is_empty());
}

#[test]
fn test_busy_transition_fires_once_after_removal() {
    let (mut engine, graph) = playing_engine();
    let mut rx = engine.subscribe();

    engine.add_preview_window(W1).unwrap();
    engine.remove_preview_window(W1).unwrap();
    assert!(!drain(&mut rx).contains(&Notification::NoMoreChannels));

    graph.confirm_blocks();
    engine.process_pending();
    let idle = drain(&mut rx).into_iter().filter(|n| *n == Notification::NoMoreChannels).count();
    assert_eq!(idle, 1);

    engine.process_pending();
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn test_junction_never_left_without_consumer() {
    let (mut engine, graph) = playing_engine();
    assert_eq!(graph.junction_consumers(), 1);

    engine.add_preview_window(W1).unwrap();
    engine.add_preview_window(W2).unwrap();
    assert_eq!(engine.snapshot().junction_consumers, 3);

    engine.remove_preview_window(W1).unwrap();
    engine.remove_preview_window(W2).unwrap();
    graph.confirm_blocks();
    engine.process_pending();
    assert_eq!(engine.snapshot().junction_consumers, 1);
}

#[test]
fn test_sink_creation_failure_discards_binding() {
    let (mut engine, graph) = playing_engine();
    graph.fail_make_sink(true);
    assert_matches!(engine.add_preview_window(W1), Err(Error::SinkCreationFailed(_)));
    assert!(engine.bindings().is_empty());

    graph.fail_make_sink(false);
    graph.fail_attach(true);
    let err = engine.add_preview_window(W1).unwrap_err();
    assert_matches!(err, Error::LinkFailed { window, .. } if window == W1);
    assert_eq!(err.category(), crate::error::ErrorCategory::Failed);
    assert_eq!(graph.discarded().len(), 1);
    assert!(engine.bindings().is_empty());
}

#[test]
fn test_pipeline_start_failure_surfaces() {
    let (mut engine, graph) = engine();
    graph.fail_next_start();
    assert_matches!(engine.add_preview_window(W1), Err(Error::PipelineUnavailable(_)));
    assert!(engine.bindings().is_empty());
    engine.add_preview_window(W1).unwrap();
}

#[test]
fn test_local_output_fault_removes_only_that_binding() {
    let (mut engine, graph) = playing_engine();
    let (channel, audio, video) = call_with_video();
    engine.handle_channel(STREAMED_MEDIA_CHANNEL_TYPE, channel).unwrap();

    let other = FakeStream::new(3, MediaType::Video);
    let faulty = add_output(&mut engine, &video, W1);
    add_output(&mut engine, &other, W2);
    engine.add_preview_window(W3).unwrap();
    let before = engine.bindings().len(BindingKind::Output);

    graph.emit_error_from(faulty, FaultKind::ResourceBusy);
    engine.process_pending();

    assert_eq!(engine.bindings().len(BindingKind::Output), before - 1);
    assert!(engine.bindings().get(BindingKind::Output, W1).is_none());
    assert!(created(&engine, BindingKind::Output, W2) && !removing(&engine, BindingKind::Output, W2));
    assert!(created(&engine, BindingKind::Preview, W3) && !removing(&engine, BindingKind::Preview, W3));
    assert_eq!(engine.pipeline_state(), PipelineState::Playing);

    assert_eq!(video.output_windows(), vec![WindowId::NONE]);
    assert_eq!(video.errors().len(), 1);
    assert!(audio.errors().is_empty());
}

#[test]
fn test_local_preview_fault_uses_block_protocol() {
    let (mut engine, graph) = playing_engine();
    engine.add_preview_window(W1).unwrap();
    engine.add_preview_window(W2).unwrap();

    graph.emit_error_from(graph.render_element(W1).unwrap(), FaultKind::ResourceWrite);
    engine.process_pending();
    assert!(removing(&engine, BindingKind::Preview, W1));
    assert!(!removing(&engine, BindingKind::Preview, W2));

    // repeated fault while removing is absorbed
    graph.emit_error_from(graph.render_element(W1).unwrap(), FaultKind::ResourceWrite);
    engine.process_pending();
    assert_eq!(graph.pending_blocks(), 1);

    graph.confirm_blocks();
    engine.process_pending();
    assert!(engine.bindings().get(BindingKind::Preview, W1).is_none());
    assert_eq!(graph.attached_windows(), vec![W2]);
}

#[test]
fn test_surface_error_from_unbound_element_ignored() {
    let (mut engine, graph) = playing_engine();
    engine.add_preview_window(W1).unwrap();

    graph.emit_error_from(ElementId::new("stray-sink"), FaultKind::ResourceBusy);
    engine.process_pending();
    assert_eq!(engine.pipeline_state(), PipelineState::Playing);
    assert!(!removing(&engine, BindingKind::Preview, W1));
}

#[test]
fn test_global_fault_sweeps_and_rebuilds() {
    let (mut engine, graph) = playing_engine();
    let (channel, _audio, video) = call_with_video();
    engine.handle_channel(STREAMED_MEDIA_CHANNEL_TYPE, channel).unwrap();
    engine.add_preview_window(W1).unwrap();
    engine.add_preview_window(W2).unwrap();
    add_output(&mut engine, &video, W3);

    graph.emit(PipelineEventKind::Error {
        origin: vec![ElementId::new("videosrc"), ElementId::new("pipeline")],
        kind: FaultKind::Stream,
        message: "internal data flow error".into(),
        debug: None,
    });
    let event = engine.events.try_recv().unwrap();
    engine.handle_pipeline_event(event);

    assert_eq!(engine.pipeline_state(), PipelineState::Destroyed);
    for window in [W1, W2] {
        assert!(removing(&engine, BindingKind::Preview, window));
    }
    assert!(removing(&engine, BindingKind::Output, W3));
    assert_eq!(video.errors(), vec!["internal data flow error".to_string()]);
    assert_eq!(video.output_windows(), vec![WindowId::NONE]);
    assert_eq!(graph.stops(), 1);

    engine.process_pending();
    assert_eq!(engine.pipeline_state(), PipelineState::NotPlaying);
    assert_eq!(graph.starts(), 2);
    assert!(!removing(&engine, BindingKind::Preview, W1));
    assert!(!created(&engine, BindingKind::Preview, W1));
    assert!(engine.bindings().get(BindingKind::Output, W3).unwrap().owning_stream().is_none());

    graph.emit_playing();
    engine.process_pending();
    assert!(created(&engine, BindingKind::Preview, W1));
    assert!(created(&engine, BindingKind::Preview, W2));
}

#[test]
fn test_recreate_interrupted_by_teardown_becomes_pending() {
    let (mut engine, graph) = playing_engine();
    engine.add_preview_window(W1).unwrap();
    engine.remove_preview_window(W1).unwrap();
    engine.add_preview_window(W1).unwrap();

    graph.emit(PipelineEventKind::Error {
        origin: vec![ElementId::new("pipeline")],
        kind: FaultKind::Core,
        message: "boom".into(),
        debug: None,
    });
    engine.process_pending();

    // the old generation's block confirmation is stale now
    assert_eq!(graph.confirm_blocks(), 1);
    engine.process_pending();
    let binding = engine.bindings().get(BindingKind::Preview, W1).unwrap();
    assert!(!binding.is_created() && !binding.is_removing());

    graph.emit_playing();
    engine.process_pending();
    assert!(created(&engine, BindingKind::Preview, W1));
}

#[test]
fn test_stale_events_dropped_after_rebuild() {
    let (mut engine, graph) = playing_engine();
    engine.add_preview_window(W1).unwrap();
    let old_sink = graph.render_element(W1).unwrap();

    graph.emit(PipelineEventKind::Error {
        origin: vec![ElementId::new("pipeline")],
        kind: FaultKind::Library,
        message: "gone".into(),
        debug: None,
    });
    engine.process_pending();
    let generation = engine.snapshot().generation;

    engine.handle_pipeline_event(crate::event::PipelineEvent {
        generation: generation - 1,
        kind: PipelineEventKind::Error {
            origin: vec![old_sink],
            kind: FaultKind::Core,
            message: "late".into(),
            debug: None,
        },
    });
    assert_eq!(engine.pipeline_state(), PipelineState::NotPlaying);
    assert_eq!(graph.stops(), 1);
}

#[test]
fn test_pipeline_messages_with_debug_detail() {
    let (mut engine, graph) = playing_engine();
    engine.add_preview_window(W1).unwrap();

    graph.emit(PipelineEventKind::Warning {
        origin: vec![ElementId::new("videosrc")],
        message: "can't record audio fast enough".into(),
        debug: Some("gstbasesrc.c(3127): dropped 4 buffers".into()),
    });
    engine.process_pending();
    assert_eq!(engine.pipeline_state(), PipelineState::Playing);
    assert!(created(&engine, BindingKind::Preview, W1));

    graph.emit(PipelineEventKind::Error {
        origin: vec![ElementId::new("videosrc"), ElementId::new("pipeline")],
        kind: FaultKind::Resource,
        message: "could not read from device".into(),
        debug: Some("v4l2src0: poll error 1".into()),
    });
    let event = engine.events.try_recv().unwrap();
    engine.handle_pipeline_event(event);
    assert_eq!(engine.pipeline_state(), PipelineState::Destroyed);
    assert!(removing(&engine, BindingKind::Preview, W1));
}

#[test]
fn test_window_fault_only_schedules_from_foreign_thread() {
    let (mut engine, graph) = playing_engine();
    engine.add_preview_window(W1).unwrap();
    let handle = engine.window_fault_handle();
    let scheduled_before = engine.scheduler().scheduled();

    let disposition = std::thread::spawn(move || handle.report(WindowFault::BadWindow(W1)))
        .join()
        .unwrap();
    assert_eq!(disposition, FaultDisposition::Scheduled);
    assert_eq!(engine.scheduler().scheduled(), scheduled_before + 1);
    // nothing touched until the loop runs the task
    assert!(!removing(&engine, BindingKind::Preview, W1));
    assert_eq!(graph.pending_blocks(), 0);

    engine.process_pending();
    assert!(removing(&engine, BindingKind::Preview, W1));
    assert_eq!(graph.pending_blocks(), 1);

    let handle = engine.window_fault_handle();
    assert_eq!(handle.report(WindowFault::BadDrawable(W1)), FaultDisposition::Ignored);
    assert_eq!(handle.report(WindowFault::BadGraphicsContext(7)), FaultDisposition::Ignored);
    assert_eq!(handle.report(WindowFault::BadWindow(W2)), FaultDisposition::Declined);

    graph.confirm_blocks();
    engine.process_pending();
    assert!(engine.bindings().is_empty());
    assert_eq!(handle.report(WindowFault::BadGraphicsContext(7)), FaultDisposition::Declined);
}

#[test]
fn test_window_fault_for_output_revokes_stream() {
    let (mut engine, _graph) = playing_engine();
    let stream = FakeStream::new(4, MediaType::Video);
    add_output(&mut engine, &stream, W2);

    let handle = engine.window_fault_handle();
    assert_eq!(handle.report(WindowFault::BadDrawable(W2)), FaultDisposition::Scheduled);
    engine.process_pending();

    assert!(engine.bindings().get(BindingKind::Output, W2).is_none());
    assert_eq!(stream.output_windows(), vec![WindowId::NONE]);
}

#[test]
fn test_output_window_bookkeeping() {
    let (mut engine, _graph) = playing_engine();
    let stream = FakeStream::new(5, MediaType::Video);
    add_output(&mut engine, &stream, W1);

    let chain = engine.make_video_sink(SinkPurpose::Output).unwrap();
    assert!(!engine.add_output_window(stream.clone(), chain, W1));

    assert!(engine.remove_output_window(W1));
    assert!(!engine.remove_output_window(W1));
    // removal is bookkeeping only, the stream already let go
    assert!(stream.output_windows().is_empty());
}

#[test]
fn test_channel_lifecycle() {
    let (mut engine, graph) = engine();
    let mut rx = engine.subscribe();
    let (channel, audio, video) = call_with_video();

    assert_matches!(
        engine.handle_channel("org.freedesktop.Telepathy.Channel.Type.Text", channel.clone()),
        Err(Error::InvalidChannelType(_))
    );
    assert_eq!(graph.starts(), 0);

    engine.handle_channel(STREAMED_MEDIA_CHANNEL_TYPE, channel).unwrap();
    assert_eq!(graph.starts(), 1);
    assert_eq!(engine.snapshot().channels, vec!["/chan/1".to_string()]);

    engine.mute_input("/chan/1", 1, true).unwrap();
    engine.set_output_volume("/chan/1", 1, 0.5).unwrap();
    engine.set_output_window("/chan/1", 2, W2).unwrap();
    assert_eq!(audio.input_muted(), Some(true));
    assert_eq!(audio.volume(), Some(0.5));
    assert_eq!(video.output_windows(), vec![W2]);
    assert_matches!(engine.mute_output("/chan/1", 9, true), Err(Error::StreamNotFound { .. }));
    assert_matches!(engine.mute_output("/chan/2", 1, true), Err(Error::ChannelNotFound(_)));

    engine.stream_receiving("/chan/1", 2, true);
    engine.stream_state_changed("/chan/1", 2, StreamState::Connected, StreamDirection::Bidirectional);
    assert!(engine.channel_closed("/chan/1"));
    assert!(!engine.channel_closed("/chan/1"));

    assert_eq!(
        drain(&mut rx),
        vec![
            Notification::HandlingChannel,
            Notification::Receiving { channel: "/chan/1".into(), stream_id: 2, receiving: true },
            Notification::StreamStateChanged {
                channel: "/chan/1".into(),
                stream_id: 2,
                state: StreamState::Connected,
                direction: StreamDirection::Bidirectional,
            },
            Notification::NoMoreChannels,
        ]
    );
}

#[test]
fn test_error_broadcast_reaches_channels() {
    let (mut engine, _graph) = engine();
    let (channel, ..) = call_with_video();
    engine.handle_channel(STREAMED_MEDIA_CHANNEL_TYPE, channel.clone()).unwrap();
    engine.error(0, "device unplugged");
    assert_eq!(channel.errors(), vec![(0, "device unplugged".to_string())]);
}

#[tokio::test]
async fn test_control_loop_serves_requests() {
    let (engine, graph) = engine();
    let mut rx = engine.subscribe();
    let (request_tx, request_rx) = mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let task = tokio::spawn(engine.run(request_rx, shutdown_rx));

    let (reply, response) = oneshot::channel();
    request_tx.send(EngineRequest::AddPreviewWindow { window: W1, reply }).await.unwrap();
    response.await.unwrap().unwrap();

    graph.emit_playing();
    let (reply, response) = oneshot::channel();
    request_tx.send(EngineRequest::GetState { reply }).await.unwrap();
    let snapshot = response.await.unwrap();
    // events are drained before later requests
    assert!(snapshot.playing);
    assert!(snapshot.binding(W1).unwrap().created);

    let (reply, response) = oneshot::channel();
    request_tx.send(EngineRequest::RemovePreviewWindow { window: W2, reply }).await.unwrap();
    assert_matches!(response.await.unwrap(), Err(Error::NotFound(_)));

    request_tx.send(EngineRequest::Shutdown).await.unwrap();
    task.await.unwrap();
    assert!(!graph.is_running());

    let seen = drain(&mut rx);
    assert_eq!(seen.last(), Some(&Notification::ShutdownRequested));
}
