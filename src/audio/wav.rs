use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::chunk::CHANNELS;
use super::playback::{OutputDevice, OutputStream, QueueHandle};
use crate::error::ResourceInitError;

type SharedWriter = Arc<Mutex<Option<hound::WavWriter<BufWriter<File>>>>>;

/// How often queued audio is flushed to disk
const RENDER_INTERVAL: Duration = Duration::from_millis(20);

/// Output device that records the assistant's audio to WAV files
///
/// Every acquisition writes a new file named
/// `{prefix}-{index:03}.wav` inside `output_dir`.
pub struct WavOutput {
    output_dir: PathBuf,
    prefix: String,
    next_index: AtomicUsize,
}

impl WavOutput {
    pub fn new(output_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            prefix: prefix.into(),
            next_index: AtomicUsize::new(0),
        }
    }

    /// Path the next acquisition will write to
    pub fn next_path(&self) -> PathBuf {
        self.path_for(self.next_index.load(Ordering::SeqCst))
    }

    fn path_for(&self, index: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}-{:03}.wav", self.prefix, index))
    }
}

#[async_trait]
impl OutputDevice for WavOutput {
    async fn acquire(
        &self,
        sample_rate: u32,
        queue: QueueHandle,
    ) -> Result<Box<dyn OutputStream>, ResourceInitError> {
        fs::create_dir_all(&self.output_dir)
            .map_err(|e| ResourceInitError::Output(format!("{}: {}", self.output_dir.display(), e)))?;

        let path = self.path_for(self.next_index.fetch_add(1, Ordering::SeqCst));
        let spec = hound::WavSpec {
            channels: CHANNELS,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&path, spec)
            .map_err(|e| ResourceInitError::Output(format!("{}: {}", path.display(), e)))?;
        let writer: SharedWriter = Arc::new(Mutex::new(Some(writer)));

        info!("Recording playback to {}", path.display());

        let task = tokio::spawn(render_loop(queue, Arc::clone(&writer)));

        Ok(Box::new(WavStream {
            path,
            writer,
            task: Some(task),
        }))
    }

    fn name(&self) -> &str {
        "WAV recorder"
    }
}

async fn render_loop(queue: QueueHandle, writer: SharedWriter) {
    let mut ticker = tokio::time::interval(RENDER_INTERVAL);
    loop {
        ticker.tick().await;

        let samples = queue.drain_available();
        if samples.is_empty() {
            continue;
        }

        let mut guard = writer.lock().unwrap_or_else(|p| p.into_inner());
        let Some(writer) = guard.as_mut() else {
            break;
        };
        for sample in samples {
            if let Err(e) = writer.write_sample(sample) {
                warn!("Failed to write playback sample: {}", e);
                return;
            }
        }
    }
}

struct WavStream {
    path: PathBuf,
    writer: SharedWriter,
    task: Option<JoinHandle<()>>,
}

impl WavStream {
    fn finish(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let writer = self
            .writer
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();

        if let Some(writer) = writer {
            match writer.finalize() {
                Ok(()) => info!("Playback recording saved: {}", self.path.display()),
                Err(e) => warn!("Failed to finalize {}: {}", self.path.display(), e),
            }
        }
    }
}

impl OutputStream for WavStream {
    fn release(mut self: Box<Self>) {
        self.finish();
    }
}

impl Drop for WavStream {
    fn drop(&mut self) {
        self.finish();
    }
}
