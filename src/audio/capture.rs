use async_trait::async_trait;
use tokio::sync::mpsc;

use super::chunk::AudioChunk;
use crate::error::ResourceInitError;

/// Configuration for a capture source
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Sample rate delivered to the session (the wire rate)
    pub sample_rate: u32,
    /// Samples per delivered chunk
    pub chunk_samples: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: super::SAMPLE_RATE,
            chunk_samples: 4800, // 200ms at 24kHz
        }
    }
}

/// Live audio input
///
/// Implementations:
/// - `FileCapture`: replays a WAV file at real-time pace
/// - `MicrophoneCapture` (feature `device`): cpal default input device
///
/// Chunks are pushed into the returned channel in production order as soon
/// as they are available. After `stop` returns the input resource is
/// released and the channel receives nothing further.
#[async_trait]
pub trait CaptureSource: Send {
    /// Acquire the input resource and start producing chunks
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioChunk>, ResourceInitError>;

    /// Release the input resource. Safe to call when not capturing.
    async fn stop(&mut self);

    fn is_capturing(&self) -> bool;

    /// Source name for logging
    fn name(&self) -> &str;
}
