//! End-to-end session scenarios against the simulated backends.
//!
//! Every test runs on a paused clock so timeouts and heartbeat windows are
//! exact.

use capture_session::capture::simulated::SimulatedAcquirer;
use capture_session::capture::{ChannelKind, Constraints, Source, TrackConstraints};
use capture_session::recorder::simulated::{SimulatedBehavior, SimulatedRecorderFactory};
use capture_session::recorder::{HandleState, RecorderHandle};
use capture_session::{CaptureSession, RecordingState, SessionConfig, SessionError, SessionEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

struct Harness {
    session: CaptureSession,
    factory: Arc<SimulatedRecorderFactory>,
    acquirer: Arc<SimulatedAcquirer>,
    source: Source,
}

async fn harness_with(factory: SimulatedRecorderFactory) -> Harness {
    let factory = Arc::new(factory);
    let acquirer = Arc::new(SimulatedAcquirer::new());
    let session =
        CaptureSession::new(SessionConfig::default(), factory.clone(), acquirer.clone()).unwrap();
    let source = session
        .open_source(&Constraints::both(
            TrackConstraints::default(),
            TrackConstraints::default(),
        ))
        .await
        .unwrap();

    Harness {
        session,
        factory,
        acquirer,
        source,
    }
}

async fn harness() -> Harness {
    harness_with(SimulatedRecorderFactory::new()).await
}

/// Let the dispatcher drain queued recorder events
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_five_chunks_finalize_into_one_container() {
    let h = harness().await;
    let mut events = h.session.subscribe();

    h.session.start(&h.source).unwrap();
    let recorder = h.factory.latest().unwrap();

    let sizes = [120usize, 64, 300, 1, 77];
    for (i, size) in sizes.iter().enumerate() {
        recorder.emit_chunk(vec![i as u8; *size]);
        tokio::time::sleep(Duration::from_millis(400)).await;
    }
    assert_eq!(h.session.chunk_count(), 5);

    let container = h.session.stop().await.unwrap();

    assert_eq!(container.len(), sizes.iter().sum::<usize>());
    assert_eq!(container.mime_type(), "video/webm;codecs=vp9,opus");
    assert_eq!(container.chunk_count(), 5);
    assert_eq!(&container.bytes()[..120], &[0u8; 120][..]);
    assert_eq!(h.session.get_state(), RecordingState::Inactive);

    assert_eq!(events.recv().await.unwrap(), SessionEvent::Started);
    match events.recv().await.unwrap() {
        SessionEvent::Stopped { bytes, .. } => assert_eq!(bytes, container.len()),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_immediate_stop_is_no_data() {
    let h = harness().await;
    h.session.start(&h.source).unwrap();

    let err = h.session.stop().await.unwrap_err();

    assert!(matches!(err, SessionError::NoData));
    assert_eq!(h.session.get_state(), RecordingState::Inactive);
    assert_eq!(h.session.chunk_count(), 0);
    assert_eq!(h.factory.latest().unwrap().flush_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_without_recording_fails() {
    let h = harness().await;
    assert!(matches!(h.session.stop().await, Err(SessionError::NotRecording)));

    h.session.start(&h.source).unwrap();
    h.factory.latest().unwrap().emit_chunk(vec![1]);
    settle().await;
    h.session.stop().await.unwrap();

    assert!(matches!(h.session.stop().await, Err(SessionError::NotRecording)));
}

#[tokio::test(start_paused = true)]
async fn test_silent_recorder_stops_within_timeout() {
    let h = harness_with(SimulatedRecorderFactory::with_behavior(SimulatedBehavior {
        signals_stop: false,
        ..SimulatedBehavior::default()
    }))
    .await;

    h.session.start(&h.source).unwrap();
    let recorder = h.factory.latest().unwrap();
    recorder.emit_chunk(vec![3; 32]);
    settle().await;

    let started = Instant::now();
    let container = h.session.stop().await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(3000));
    assert!(elapsed <= Duration::from_millis(3050), "stop took {:?}", elapsed);
    assert_eq!(container.len(), 32);
    assert_eq!(h.session.get_state(), RecordingState::Inactive);
}

#[tokio::test(start_paused = true)]
async fn test_stop_from_paused_includes_final_flush() {
    let h = harness().await;
    h.session.start(&h.source).unwrap();
    let recorder = h.factory.latest().unwrap();

    recorder.emit_chunk(b"head".to_vec());
    settle().await;
    recorder.push_pending(b"tail");
    h.session.pause();

    let container = h.session.stop().await.unwrap();
    assert_eq!(container.bytes(), b"headtail");
}

#[tokio::test(start_paused = true)]
async fn test_stop_failure_is_reported() {
    let h = harness_with(SimulatedRecorderFactory::with_behavior(SimulatedBehavior {
        fail_stop: true,
        ..SimulatedBehavior::default()
    }))
    .await;

    h.session.start(&h.source).unwrap();
    h.factory.latest().unwrap().emit_chunk(vec![1, 2]);
    settle().await;

    let err = h.session.stop().await.unwrap_err();
    assert!(matches!(err, SessionError::StopFailed(_)));
    assert_eq!(h.session.get_state(), RecordingState::Inactive);
}

#[tokio::test(start_paused = true)]
async fn test_chunks_frozen_while_paused() {
    let h = harness().await;
    h.session.start(&h.source).unwrap();
    let recorder = h.factory.latest().unwrap();

    recorder.emit_chunk(vec![1]);
    settle().await;
    h.session.pause();

    recorder.emit_chunk(vec![2]);
    settle().await;
    assert_eq!(h.session.chunk_count(), 1);

    h.session.resume();
    recorder.emit_chunk(vec![3]);
    settle().await;
    assert_eq!(h.session.chunk_count(), 2);

    let container = h.session.stop().await.unwrap();
    assert_eq!(container.bytes(), &[1, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_flushes_once_per_stall_window() {
    let h = harness().await;
    h.session.start(&h.source).unwrap();
    let recorder = h.factory.latest().unwrap();

    // Ticks at 2s and 4s both find the recorder stalled
    tokio::time::sleep(Duration::from_millis(4500)).await;
    assert_eq!(recorder.flush_calls(), 2);

    // No probes while paused
    h.session.pause();
    tokio::time::sleep(Duration::from_millis(6000)).await;
    assert_eq!(recorder.flush_calls(), 2);

    // No probes while data keeps flowing
    h.session.resume();
    for i in 0..10u8 {
        recorder.emit_chunk(vec![i]);
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    assert_eq!(recorder.flush_calls(), 2);
    assert_eq!(h.session.chunk_count(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_flush_data_is_buffered() {
    let h = harness().await;
    h.session.start(&h.source).unwrap();
    let recorder = h.factory.latest().unwrap();
    recorder.push_pending(b"stuck");

    tokio::time::sleep(Duration::from_millis(2100)).await;

    assert_eq!(recorder.flush_calls(), 1);
    assert_eq!(h.session.buffered_bytes(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_error_with_data_restarts_exactly_once() {
    let h = harness().await;
    let mut events = h.session.subscribe();
    h.session.start(&h.source).unwrap();
    let first = h.factory.latest().unwrap();

    first.emit_chunk(b"before".to_vec());
    settle().await;

    first.emit_error("device lost");
    first.emit_error("device lost again");
    settle().await;
    assert_eq!(h.factory.created(), 1);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(h.factory.created(), 2);
    assert_eq!(first.stop_calls(), 1);
    assert_eq!(h.session.get_state(), RecordingState::Recording);

    let second = h.factory.latest().unwrap();
    assert_eq!(second.source_id(), h.source.id());
    second.emit_chunk(b"after".to_vec());
    settle().await;

    let container = h.session.stop().await.unwrap();
    assert_eq!(container.bytes(), b"beforeafter");
    assert_eq!(h.factory.created(), 2);

    assert_eq!(events.recv().await.unwrap(), SessionEvent::Started);
    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::Recovering {
            error: "device lost".to_string()
        }
    );
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Recovered);
}

#[tokio::test(start_paused = true)]
async fn test_error_without_data_fails_session() {
    let h = harness().await;
    let mut events = h.session.subscribe();
    h.session.start(&h.source).unwrap();
    let recorder = h.factory.latest().unwrap();

    recorder.emit_error("encoder crashed");
    settle().await;
    tokio::time::sleep(Duration::from_millis(1000)).await;

    assert_eq!(h.session.get_state(), RecordingState::Inactive);
    assert_eq!(h.factory.created(), 1);
    assert_eq!(recorder.stop_calls(), 1);

    assert_eq!(events.recv().await.unwrap(), SessionEvent::Started);
    match events.recv().await.unwrap() {
        SessionEvent::Failed { error } => assert!(error.contains("encoder crashed")),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_restart_is_surfaced() {
    let h = harness_with(SimulatedRecorderFactory::failing_after(1)).await;
    let mut events = h.session.subscribe();
    h.session.start(&h.source).unwrap();
    let recorder = h.factory.latest().unwrap();

    recorder.emit_chunk(vec![1, 2, 3]);
    settle().await;
    recorder.emit_error("device lost");
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(h.factory.create_attempts(), 2);
    assert_eq!(h.session.get_state(), RecordingState::Inactive);
    assert_eq!(h.session.chunk_count(), 0);
    assert_eq!(h.session.buffered_bytes(), 0);
    assert!(matches!(h.session.stop().await, Err(SessionError::NotRecording)));

    assert_eq!(events.recv().await.unwrap(), SessionEvent::Started);
    assert!(matches!(events.recv().await.unwrap(), SessionEvent::Recovering { .. }));
    match events.recv().await.unwrap() {
        SessionEvent::Failed { error } => assert!(error.contains("restart failed")),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_recovery_backoff_keeps_data() {
    let h = harness().await;
    h.session.start(&h.source).unwrap();
    let recorder = h.factory.latest().unwrap();

    recorder.emit_chunk(b"kept".to_vec());
    settle().await;
    recorder.emit_error("device lost");
    settle().await;

    let container = h.session.stop().await.unwrap();
    assert_eq!(container.bytes(), b"kept");

    // The abandoned restart never runs
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(h.factory.created(), 1);
    assert_eq!(h.session.get_state(), RecordingState::Inactive);
}

#[tokio::test(start_paused = true)]
async fn test_audio_swap_keeps_video_identity() {
    let h = harness().await;
    let video_before = h.source.channels_of(ChannelKind::Video);
    assert_eq!(video_before.len(), 1);

    let constraints = Constraints::audio(TrackConstraints::device("usb-mic"));
    let updated = h.session.update_channels(&h.source, &constraints).await.unwrap();

    assert!(updated.same_source(&h.source));
    let video_after = updated.channels_of(ChannelKind::Video);
    assert_eq!(video_after.len(), 1);
    assert!(video_after[0].same_track(&video_before[0]));
    assert!(video_after[0].is_live());

    let audio = updated.channels_of(ChannelKind::Audio);
    assert_eq!(audio.len(), 1);
    assert_eq!(audio[0].label(), "usb-mic");

    // One initial acquisition plus exactly one audio-only swap
    let requests = h.acquirer.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1], constraints);
    assert_eq!(h.acquirer.peak_live(ChannelKind::Audio), 1);

    // The swapped source records like any other
    h.session.start(&updated).unwrap();
    assert_eq!(h.factory.latest().unwrap().source_id(), h.source.id());
}

#[tokio::test(start_paused = true)]
async fn test_stop_after_recorder_ended_on_its_own_keeps_data() {
    let h = harness().await;
    h.session.start(&h.source).unwrap();
    let recorder = h.factory.latest().unwrap();

    recorder.emit_chunk(vec![9; 100]);
    settle().await;
    recorder.stop().unwrap();
    settle().await;
    assert_eq!(h.session.chunk_count(), 1);

    // The dead handle is no longer probed
    tokio::time::sleep(Duration::from_millis(5000)).await;
    assert_eq!(recorder.flush_calls(), 0);

    let started = Instant::now();
    let container = h.session.stop().await.unwrap();

    assert_eq!(container.len(), 100);
    assert!(started.elapsed() < Duration::from_millis(3000));
    assert_eq!(recorder.stop_calls(), 1);
    assert_eq!(h.session.get_state(), RecordingState::Inactive);
}

#[tokio::test(start_paused = true)]
async fn test_dispose_during_recovery_backoff() {
    let h = harness().await;
    h.session.start(&h.source).unwrap();
    let first = h.factory.latest().unwrap();

    first.emit_chunk(b"lost".to_vec());
    settle().await;
    first.emit_error("device lost");
    settle().await;

    h.session.dispose();

    assert_eq!(first.state(), HandleState::Inactive);
    assert_eq!(first.stop_calls(), 1);

    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(h.factory.created(), 1);
    assert_eq!(h.session.get_state(), RecordingState::Inactive);
    assert_eq!(h.session.chunk_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_start_during_recovery_backoff_supersedes_restart() {
    let h = harness().await;
    h.session.start(&h.source).unwrap();
    let first = h.factory.latest().unwrap();

    first.emit_chunk(b"old".to_vec());
    settle().await;
    first.emit_error("device lost");
    settle().await;

    h.session.start(&h.source).unwrap();
    assert_eq!(first.state(), HandleState::Inactive);
    assert_eq!(first.stop_calls(), 1);
    assert_eq!(h.factory.created(), 2);

    // The superseded restart never builds a third recorder
    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(h.factory.created(), 2);

    let second = h.factory.latest().unwrap();
    second.emit_chunk(b"new".to_vec());
    settle().await;
    let container = h.session.stop().await.unwrap();
    assert_eq!(container.bytes(), b"new");
}
