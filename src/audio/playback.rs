//! Playback of streamed assistant audio.
//!
//! Decoded chunks are appended to a FIFO [`PlaybackQueue`]; the output device
//! pulls samples from it on its own clock. Because the device renders from a
//! single contiguous queue, each chunk starts exactly where the previous one
//! ends no matter how the chunks were sized or timed on arrival. Silence is
//! only produced when the queue runs dry.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::chunk::AudioChunk;
use crate::error::ResourceInitError;

/// Pending audio owned by the playback engine
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    chunks: VecDeque<AudioChunk>,
    /// Read position inside the front chunk
    cursor: usize,
    /// Samples handed to the device so far
    rendered: u64,
    /// Samples of silence the device had to fill because the queue was empty
    starved: u64,
}

impl PlaybackQueue {
    pub fn push(&mut self, chunk: AudioChunk) {
        if !chunk.is_empty() {
            self.chunks.push_back(chunk);
        }
    }

    /// Fill `out` with queued samples in arrival order, zero-filling the rest.
    ///
    /// Returns the number of queued samples written.
    pub fn render(&mut self, out: &mut [i16]) -> usize {
        let mut written = 0;

        while written < out.len() {
            let Some(front) = self.chunks.front() else {
                break;
            };

            let available = &front.samples[self.cursor..];
            let n = available.len().min(out.len() - written);
            out[written..written + n].copy_from_slice(&available[..n]);
            written += n;
            self.cursor += n;

            if self.cursor == front.samples.len() {
                self.chunks.pop_front();
                self.cursor = 0;
            }
        }

        out[written..].fill(0);
        self.rendered += written as u64;
        self.starved += (out.len() - written) as u64;
        written
    }

    /// Take every queued sample, in order
    pub fn drain_available(&mut self) -> Vec<i16> {
        let mut samples = Vec::with_capacity(self.pending_samples());
        for (i, chunk) in self.chunks.drain(..).enumerate() {
            let start = if i == 0 { self.cursor } else { 0 };
            samples.extend_from_slice(&chunk.samples[start..]);
        }
        self.cursor = 0;
        self.rendered += samples.len() as u64;
        samples
    }

    pub fn pending_samples(&self) -> usize {
        self.chunks.iter().map(AudioChunk::len).sum::<usize>() - self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn rendered_samples(&self) -> u64 {
        self.rendered
    }

    pub fn starved_samples(&self) -> u64 {
        self.starved
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.cursor = 0;
    }
}

/// Shared handle to a [`PlaybackQueue`], given to the output device
#[derive(Debug, Clone, Default)]
pub struct QueueHandle(Arc<Mutex<PlaybackQueue>>);

impl QueueHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, PlaybackQueue> {
        // A panic on the audio thread must not take playback down with it
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn render(&self, out: &mut [i16]) -> usize {
        self.lock().render(out)
    }

    pub fn drain_available(&self) -> Vec<i16> {
        self.lock().drain_available()
    }
}

/// Audio output hardware (or a stand-in for it)
///
/// Implementations:
/// - `WavOutput`: writes rendered audio to WAV files
/// - `SpeakerOutput` (feature `device`): cpal default output device
#[async_trait]
pub trait OutputDevice: Send + Sync {
    /// Claim the output resource and start pulling samples from `queue`
    async fn acquire(
        &self,
        sample_rate: u32,
        queue: QueueHandle,
    ) -> Result<Box<dyn OutputStream>, ResourceInitError>;

    fn name(&self) -> &str;
}

/// A claimed output resource
pub trait OutputStream: Send {
    /// Halt output immediately and release the resource
    fn release(self: Box<Self>);
}

/// Observable engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Uninitialized,
    /// Output resource acquisition in flight
    Initializing,
    /// Output claimed, nothing queued
    Ready,
    /// Output claimed, audio queued
    Playing,
}

/// Result of a call to [`PlaybackEngine::init`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// The engine is ready to accept chunks
    Ready,
    /// Another `init` was already acquiring the output; nothing was done
    AlreadyInFlight,
    /// `stop` (or a newer `init`) ran while acquiring; the resource was released
    Superseded,
}

enum Phase {
    Uninitialized,
    Initializing,
    Active {
        stream: Box<dyn OutputStream>,
        queue: QueueHandle,
        sample_rate: u32,
    },
}

struct EngineInner {
    phase: Phase,
    /// Bumped by every `init` and `stop`; an acquisition completing under a
    /// different generation has been superseded
    generation: u64,
}

/// Gap-free playback of streamed PCM chunks
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct PlaybackEngine {
    device: Arc<dyn OutputDevice>,
    inner: Arc<Mutex<EngineInner>>,
}

impl PlaybackEngine {
    pub fn new(device: Arc<dyn OutputDevice>) -> Self {
        Self {
            device,
            inner: Arc::new(Mutex::new(EngineInner {
                phase: Phase::Uninitialized,
                generation: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Acquire the output resource and start a fresh queue
    ///
    /// Calling `init` on an active engine rebuilds it from scratch. A call
    /// made while another `init` is still acquiring is a no-op.
    pub async fn init(&self, sample_rate: u32) -> Result<InitOutcome, ResourceInitError> {
        self.begin_init(sample_rate).acquire().await
    }

    /// The synchronous half of [`PlaybackEngine::init`]
    ///
    /// The engine is `Initializing` as soon as this returns, so a `stop`
    /// issued before the returned [`PendingInit`] runs still supersedes it.
    pub fn begin_init(&self, sample_rate: u32) -> PendingInit {
        let (ticket, previous) = {
            let mut inner = self.lock();
            if matches!(inner.phase, Phase::Initializing) {
                debug!("Playback init already in flight");
                (None, None)
            } else {
                let previous = std::mem::replace(&mut inner.phase, Phase::Initializing);
                inner.generation += 1;
                (Some(inner.generation), Some(previous))
            }
        };

        if let Some(Phase::Active { stream, queue, .. }) = previous {
            info!("Rebuilding playback engine");
            queue.lock().clear();
            stream.release();
        }

        PendingInit {
            engine: self.clone(),
            sample_rate,
            ticket,
        }
    }

    /// Append a chunk to the playback queue
    ///
    /// Returns `false` (and logs a warning) when the engine is not ready.
    pub fn enqueue(&self, chunk: AudioChunk) -> bool {
        let inner = self.lock();
        match &inner.phase {
            Phase::Active { queue, .. } => {
                debug!("Queueing {} samples for playback", chunk.len());
                queue.lock().push(chunk);
                true
            }
            Phase::Initializing | Phase::Uninitialized => {
                warn!(
                    "Playback engine not ready, dropping {} samples",
                    chunk.len()
                );
                false
            }
        }
    }

    /// Halt output, discard queued audio and release the output resource
    ///
    /// Safe to call repeatedly and from any state; an in-flight `init` will
    /// release whatever it acquires.
    pub fn stop(&self) {
        let previous = {
            let mut inner = self.lock();
            inner.generation += 1;
            std::mem::replace(&mut inner.phase, Phase::Uninitialized)
        };

        match previous {
            Phase::Active { stream, queue, .. } => {
                let discarded = {
                    let mut queue = queue.lock();
                    let pending = queue.pending_samples();
                    queue.clear();
                    pending
                };
                stream.release();
                info!(
                    "Playback stopped ({} queued samples discarded)",
                    discarded
                );
            }
            Phase::Initializing => debug!("Playback stopped while initializing"),
            Phase::Uninitialized => {}
        }
    }

    pub fn state(&self) -> PlaybackState {
        match &self.lock().phase {
            Phase::Uninitialized => PlaybackState::Uninitialized,
            Phase::Initializing => PlaybackState::Initializing,
            Phase::Active { queue, .. } if queue.lock().is_empty() => PlaybackState::Ready,
            Phase::Active { .. } => PlaybackState::Playing,
        }
    }

    pub fn queued_samples(&self) -> usize {
        match &self.lock().phase {
            Phase::Active { queue, .. } => queue.lock().pending_samples(),
            _ => 0,
        }
    }

    pub fn sample_rate(&self) -> Option<u32> {
        match &self.lock().phase {
            Phase::Active { sample_rate, .. } => Some(*sample_rate),
            _ => None,
        }
    }
}

/// An `init` that has claimed the `Initializing` phase but not yet the
/// output resource
pub struct PendingInit {
    engine: PlaybackEngine,
    sample_rate: u32,
    /// Generation this init owns; `None` if another init was in flight
    ticket: Option<u64>,
}

impl PendingInit {
    pub async fn acquire(self) -> Result<InitOutcome, ResourceInitError> {
        let Some(generation) = self.ticket else {
            return Ok(InitOutcome::AlreadyInFlight);
        };
        let sample_rate = self.sample_rate;

        info!(
            "Initializing playback on {} ({}Hz)",
            self.engine.device.name(),
            sample_rate
        );

        let queue = QueueHandle::new();
        let result = self.engine.device.acquire(sample_rate, queue.clone()).await;

        let mut inner = self.engine.lock();
        let current =
            inner.generation == generation && matches!(inner.phase, Phase::Initializing);

        match result {
            Ok(stream) if current => {
                inner.phase = Phase::Active {
                    stream,
                    queue,
                    sample_rate,
                };
                info!("Playback engine ready");
                Ok(InitOutcome::Ready)
            }
            Ok(stream) => {
                drop(inner);
                info!("Playback init superseded, releasing output");
                stream.release();
                Ok(InitOutcome::Superseded)
            }
            Err(e) => {
                if current {
                    inner.phase = Phase::Uninitialized;
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(samples: &[i16]) -> AudioChunk {
        AudioChunk::new(samples.to_vec())
    }

    #[test]
    fn test_render_concatenates_across_chunk_boundaries() {
        let mut queue = PlaybackQueue::default();
        queue.push(chunk(&[1, 2, 3]));
        queue.push(chunk(&[4]));
        queue.push(chunk(&[5, 6]));

        let mut out = [0i16; 4];
        assert_eq!(queue.render(&mut out), 4);
        assert_eq!(out, [1, 2, 3, 4]);

        let mut out = [9i16; 4];
        assert_eq!(queue.render(&mut out), 2);
        assert_eq!(out, [5, 6, 0, 0]);
        assert_eq!(queue.starved_samples(), 2);
        assert_eq!(queue.rendered_samples(), 6);
    }

    #[test]
    fn test_drain_respects_partial_front_chunk() {
        let mut queue = PlaybackQueue::default();
        queue.push(chunk(&[1, 2, 3]));
        queue.push(chunk(&[4, 5]));

        let mut out = [0i16; 2];
        queue.render(&mut out);

        assert_eq!(queue.pending_samples(), 3);
        assert_eq!(queue.drain_available(), vec![3, 4, 5]);
        assert!(queue.is_empty());
        assert_eq!(queue.pending_samples(), 0);
    }

    #[test]
    fn test_empty_chunks_are_ignored() {
        let mut queue = PlaybackQueue::default();
        queue.push(AudioChunk::default());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear_discards_everything() {
        let mut queue = PlaybackQueue::default();
        queue.push(chunk(&[1, 2, 3]));
        let mut out = [0i16; 1];
        queue.render(&mut out);
        queue.clear();

        let mut out = [7i16; 2];
        assert_eq!(queue.render(&mut out), 0);
        assert_eq!(out, [0, 0]);
    }
}
