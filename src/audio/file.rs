use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use hound::WavReader;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::capture::{CaptureConfig, CaptureSource};
use super::chunk::{AudioChunk, CHANNELS};
use crate::error::ResourceInitError;

/// A WAV recording loaded into memory
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Samples in the session's wire format (mono at `target_rate`)
    pub fn to_session_format(&self, target_rate: u32) -> Result<Vec<i16>> {
        if self.sample_rate != target_rate || self.channels != CHANNELS {
            anyhow::bail!(
                "Unsupported input format. Expected {}Hz mono, got {}Hz {}ch",
                target_rate,
                self.sample_rate,
                self.channels
            )
        }
        Ok(self.samples.clone())
    }
}

/// Capture source that replays a WAV file as if it were a live microphone
///
/// Chunks are released at the pace they would be recorded, so the backend's
/// voice-activity detection sees realistic timing.
pub struct FileCapture {
    path: PathBuf,
    config: CaptureConfig,
    task: Option<JoinHandle<()>>,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>, config: CaptureConfig) -> Self {
        Self {
            path: path.into(),
            config,
            task: None,
        }
    }

    fn load(&self) -> Result<Vec<i16>> {
        AudioFile::open(&self.path)?.to_session_format(self.config.sample_rate)
    }
}

#[async_trait]
impl CaptureSource for FileCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioChunk>, ResourceInitError> {
        if self.task.is_some() {
            warn!("File capture already running, restarting");
            self.stop().await;
        }

        let samples = self
            .load()
            .map_err(|e| ResourceInitError::Microphone(format!("{:#}", e)))?;

        let chunk_samples = self.config.chunk_samples.max(1);
        let period = Duration::from_micros(
            chunk_samples as u64 * 1_000_000 / self.config.sample_rate.max(1) as u64,
        );
        let (tx, rx) = mpsc::channel(32);

        info!(
            "Replaying {} as capture input ({} samples per chunk)",
            self.path.display(),
            chunk_samples
        );

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            for chunk in samples.chunks(chunk_samples) {
                ticker.tick().await;
                if tx.send(AudioChunk::new(chunk.to_vec())).await.is_err() {
                    break;
                }
            }
            info!("Capture input file exhausted");
        }));

        Ok(rx)
    }

    async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("File capture stopped");
        }
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &str {
        "WAV file replay"
    }
}
