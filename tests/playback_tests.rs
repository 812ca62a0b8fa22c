// Integration tests for the playback engine
//
// These tests verify gap-free ordering, the init/stop lifecycle and the
// coalescing of concurrent init calls.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::FakeOutput;
use voice_session::audio::{AudioChunk, InitOutcome, PlaybackEngine, PlaybackState};
use voice_session::error::ResourceInitError;

fn chunk(samples: &[i16]) -> AudioChunk {
    AudioChunk::new(samples.to_vec())
}

#[tokio::test]
async fn test_chunks_render_contiguously() {
    let output = Arc::new(FakeOutput::default());
    let engine = PlaybackEngine::new(output.clone());

    assert_eq!(engine.init(24000).await.unwrap(), InitOutcome::Ready);
    assert_eq!(engine.state(), PlaybackState::Ready);
    assert_eq!(engine.sample_rate(), Some(24000));

    assert!(engine.enqueue(chunk(&[1, 2, 3])));
    assert!(engine.enqueue(chunk(&[4])));
    assert!(engine.enqueue(chunk(&[5, 6])));
    assert_eq!(engine.state(), PlaybackState::Playing);
    assert_eq!(engine.queued_samples(), 6);

    // The device pulls in blocks that do not line up with chunk boundaries
    let queue = output.last_queue().unwrap();
    let mut first = [0i16; 4];
    let mut second = [0i16; 4];
    queue.render(&mut first);
    queue.render(&mut second);

    assert_eq!(first, [1, 2, 3, 4]);
    assert_eq!(second, [5, 6, 0, 0]);
    assert_eq!(engine.state(), PlaybackState::Ready);
}

#[tokio::test]
async fn test_enqueue_before_init_is_dropped() {
    let output = Arc::new(FakeOutput::default());
    let engine = PlaybackEngine::new(output.clone());

    assert!(!engine.enqueue(chunk(&[1, 2, 3])));
    assert_eq!(engine.state(), PlaybackState::Uninitialized);

    engine.init(24000).await.unwrap();
    assert_eq!(engine.queued_samples(), 0);
}

#[tokio::test]
async fn test_stop_then_init_behaves_like_fresh_engine() {
    let output = Arc::new(FakeOutput::default());
    let engine = PlaybackEngine::new(output.clone());

    engine.init(24000).await.unwrap();
    engine.enqueue(chunk(&[9, 9, 9]));
    engine.stop();

    assert_eq!(engine.state(), PlaybackState::Uninitialized);
    assert_eq!(output.released(), 1);
    assert!(!engine.enqueue(chunk(&[1])));

    engine.init(24000).await.unwrap();
    engine.enqueue(chunk(&[7, 8]));

    let queue = output.last_queue().unwrap();
    let mut out = [0i16; 3];
    assert_eq!(queue.render(&mut out), 2);
    assert_eq!(out, [7, 8, 0]);
    assert_eq!(output.acquired(), 2);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let output = Arc::new(FakeOutput::default());
    let engine = PlaybackEngine::new(output.clone());

    engine.stop();
    engine.init(24000).await.unwrap();
    engine.stop();
    engine.stop();

    assert_eq!(output.released(), 1);
    assert_eq!(engine.state(), PlaybackState::Uninitialized);
}

#[tokio::test]
async fn test_init_on_active_engine_rebuilds() {
    let output = Arc::new(FakeOutput::default());
    let engine = PlaybackEngine::new(output.clone());

    engine.init(24000).await.unwrap();
    engine.enqueue(chunk(&[1, 2]));
    engine.init(24000).await.unwrap();

    assert_eq!(output.acquired(), 2);
    assert_eq!(output.released(), 1);
    assert_eq!(engine.queued_samples(), 0);
}

#[tokio::test]
async fn test_concurrent_init_acquires_once() {
    let (output, gate) = FakeOutput::gated();
    let engine = PlaybackEngine::new(output.clone());

    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.init(24000).await }
    });
    while engine.state() != PlaybackState::Initializing {
        tokio::task::yield_now().await;
    }

    let second = engine.init(24000).await.unwrap();
    assert_eq!(second, InitOutcome::AlreadyInFlight);

    gate.notify_one();
    assert_eq!(first.await.unwrap().unwrap(), InitOutcome::Ready);

    engine.stop();
    assert_eq!(output.acquired(), 1);
    assert_eq!(output.released(), 1);
}

#[tokio::test]
async fn test_stop_during_init_releases_late_resource() {
    let (output, gate) = FakeOutput::gated();
    let engine = PlaybackEngine::new(output.clone());

    let pending = engine.begin_init(24000);
    assert_eq!(engine.state(), PlaybackState::Initializing);
    engine.stop();

    gate.notify_one();
    assert_eq!(pending.acquire().await.unwrap(), InitOutcome::Superseded);

    assert_eq!(output.acquired(), 1);
    assert_eq!(output.released(), 1);
    assert_eq!(engine.state(), PlaybackState::Uninitialized);
}

#[tokio::test]
async fn test_init_failure_leaves_engine_uninitialized() {
    let output = Arc::new(FakeOutput::default());
    output.fail.store(true, Ordering::SeqCst);
    let engine = PlaybackEngine::new(output.clone());

    let err = engine.init(24000).await.unwrap_err();

    assert!(matches!(err, ResourceInitError::Output(_)));
    assert_eq!(engine.state(), PlaybackState::Uninitialized);

    output.fail.store(false, Ordering::SeqCst);
    assert_eq!(engine.init(24000).await.unwrap(), InitOutcome::Ready);
}
