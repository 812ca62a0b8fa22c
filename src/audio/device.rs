//! Microphone capture and speaker output through cpal.
//!
//! cpal streams are not `Send` on every platform, so each stream lives on a
//! dedicated thread that owns it until told to stop.

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use super::capture::{CaptureConfig, CaptureSource};
use super::chunk::{AudioChunk, CHANNELS};
use super::playback::{OutputDevice, OutputStream, QueueHandle};
use crate::error::ResourceInitError;

/// Keeps a cpal stream alive on its own thread until dropped
struct StreamThread {
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl StreamThread {
    /// Build a stream on a new thread and wait for it to start playing
    async fn spawn<F>(name: &str, build: F) -> Result<Self, String>
    where
        F: FnOnce() -> Result<cpal::Stream, String> + Send + 'static,
    {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                // Blocks until the owner drops or signals the sender
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| e.to_string())?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(Self {
                stop_tx: Some(stop_tx),
                thread: Some(thread),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err("audio thread exited during startup".to_string()),
        }
    }

    fn shutdown(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Audio stream thread panicked");
            }
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn stream_config(sample_rate: u32) -> StreamConfig {
    StreamConfig {
        channels: CHANNELS,
        sample_rate: SampleRate(sample_rate),
        buffer_size: BufferSize::Default,
    }
}

/// Default input device, delivering fixed-size chunks
pub struct MicrophoneCapture {
    config: CaptureConfig,
    stream: Option<StreamThread>,
}

impl MicrophoneCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    /// List available input devices
    pub fn list_input_devices() -> Vec<String> {
        cpal::default_host()
            .input_devices()
            .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CaptureSource for MicrophoneCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioChunk>, ResourceInitError> {
        if self.stream.is_some() {
            warn!("Microphone already capturing, restarting");
            self.stop().await;
        }

        let (tx, rx) = mpsc::channel(64);
        let config = stream_config(self.config.sample_rate);
        let chunk_samples = self.config.chunk_samples.max(1);

        info!(
            "Starting microphone capture ({}Hz, {} samples per chunk)",
            self.config.sample_rate, chunk_samples
        );

        let stream = StreamThread::spawn("mic-capture", move || {
            let device = cpal::default_host()
                .default_input_device()
                .ok_or_else(|| "no input device available".to_string())?;
            info!(
                "Using input device: {}",
                device.name().unwrap_or_else(|_| "Unknown".to_string())
            );

            let mut pending: Vec<i16> = Vec::with_capacity(chunk_samples);
            device
                .build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        for &sample in data {
                            pending.push(sample);
                            if pending.len() >= chunk_samples {
                                let chunk = AudioChunk::new(std::mem::take(&mut pending));
                                if tx.try_send(chunk).is_err() {
                                    warn!("Capture consumer lagging, dropping chunk");
                                }
                                pending.reserve(chunk_samples);
                            }
                        }
                    },
                    |err| warn!("Microphone stream error: {}", err),
                    None,
                )
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(ResourceInitError::Microphone)?;

        self.stream = Some(stream);
        info!("Microphone capture started");
        Ok(rx)
    }

    async fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown();
            info!("Microphone capture stopped");
        }
    }

    fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

/// Default output device
#[derive(Debug, Default)]
pub struct SpeakerOutput;

#[async_trait]
impl OutputDevice for SpeakerOutput {
    async fn acquire(
        &self,
        sample_rate: u32,
        queue: QueueHandle,
    ) -> Result<Box<dyn OutputStream>, ResourceInitError> {
        let config = stream_config(sample_rate);

        let stream = StreamThread::spawn("speaker-output", move || {
            let device = cpal::default_host()
                .default_output_device()
                .ok_or_else(|| "no output device available".to_string())?;
            info!(
                "Using output device: {}",
                device.name().unwrap_or_else(|_| "Unknown".to_string())
            );

            device
                .build_output_stream(
                    &config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        queue.render(data);
                    },
                    |err| warn!("Speaker stream error: {}", err),
                    None,
                )
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(ResourceInitError::Output)?;

        Ok(Box::new(SpeakerStream(stream)))
    }

    fn name(&self) -> &str {
        "cpal speaker"
    }
}

struct SpeakerStream(StreamThread);

impl OutputStream for SpeakerStream {
    fn release(mut self: Box<Self>) {
        self.0.shutdown();
    }
}
