use std::path::PathBuf;
use std::time::Duration;

use anyhow::{ensure, Result};
use serde::Deserialize;

use crate::audio::SAMPLE_RATE;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// WebSocket URL of the middle tier, e.g. `ws://localhost:8765/realtime`
    pub endpoint: String,
    #[serde(default = "default_true")]
    pub enable_input_audio_transcription: bool,
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
    /// Pause between the socket opening and `session.update`
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Give up on a connection still opening after this long (unset = wait forever)
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Wire rate; only 24000 is accepted
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Samples per capture chunk
    #[serde(default = "default_chunk_samples")]
    pub chunk_samples: usize,
    /// WAV file replayed in place of a microphone
    #[serde(default)]
    pub input_file: Option<PathBuf>,
    /// Directory receiving WAV recordings of the assistant's audio
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            chunk_samples: default_chunk_samples(),
            input_file: None,
            output_dir: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_settle_delay_ms() -> u64 {
    100
}

fn default_sample_rate() -> u32 {
    SAMPLE_RATE
}

fn default_chunk_samples() -> usize {
    4800 // 200ms at 24kHz
}

impl Config {
    /// Load `path` (any format the `config` crate understands, extension
    /// optional) overlaid by `VOICE_SESSION__SECTION__KEY` environment variables.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("VOICE_SESSION").separator("__"))
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        ensure!(
            cfg.audio.sample_rate == SAMPLE_RATE,
            "audio.sample_rate must be {} (got {})",
            SAMPLE_RATE,
            cfg.audio.sample_rate
        );
        Ok(cfg)
    }
}

impl RealtimeConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[service]
name = "voice-session"

[service.http]
bind = "127.0.0.1"
port = 8080

[realtime]
endpoint = "ws://localhost:8765/realtime"
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn test_load_applies_defaults() {
        let file = write_config(MINIMAL);

        let cfg = Config::load(file.path().to_str().unwrap()).unwrap();

        assert_eq!(cfg.service.http.port, 8080);
        assert_eq!(cfg.realtime.endpoint, "ws://localhost:8765/realtime");
        assert!(cfg.realtime.enable_input_audio_transcription);
        assert_eq!(cfg.realtime.transcription_model, "whisper-1");
        assert_eq!(cfg.realtime.settle_delay(), Duration::from_millis(100));
        assert_eq!(cfg.realtime.connect_timeout(), None);
        assert_eq!(cfg.audio.sample_rate, 24000);
        assert_eq!(cfg.audio.chunk_samples, 4800);
        assert!(cfg.audio.input_file.is_none());
    }

    #[test]
    fn test_load_rejects_other_sample_rates() {
        let file = write_config(&format!("{}\n[audio]\nsample_rate = 16000\n", MINIMAL));

        let err = Config::load(file.path().to_str().unwrap()).unwrap_err();

        assert!(err.to_string().contains("audio.sample_rate must be 24000"));
    }
}
