use std::time::Duration;

use crate::audio::SAMPLE_RATE;
use crate::config::Config;

/// Runtime configuration of the session orchestrator
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket URL of the realtime middle tier
    pub endpoint: String,

    /// Sample rate for playback (the backend streams 24kHz PCM16)
    pub sample_rate: u32,

    /// Model for input transcription; `None` disables user transcripts
    pub transcription_model: Option<String>,

    /// Pause after the socket opens before sending `session.update`,
    /// leaving the backend time for its own post-open setup
    pub settle_delay: Duration,

    /// Abort a connection still opening after this long
    pub connect_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8765/realtime".to_string(),
            sample_rate: SAMPLE_RATE,
            transcription_model: Some("whisper-1".to_string()),
            settle_delay: Duration::from_millis(100),
            connect_timeout: None,
        }
    }
}

impl From<&Config> for SessionConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            endpoint: cfg.realtime.endpoint.clone(),
            sample_rate: cfg.audio.sample_rate,
            transcription_model: cfg
                .realtime
                .enable_input_audio_transcription
                .then(|| cfg.realtime.transcription_model.clone()),
            settle_delay: cfg.realtime.settle_delay(),
            connect_timeout: cfg.realtime.connect_timeout(),
        }
    }
}
