pub mod capture;
pub mod chunk;
pub mod codec;
pub mod file;
pub mod playback;
pub mod wav;

#[cfg(feature = "device")]
pub mod device;

pub use capture::{CaptureConfig, CaptureSource};
pub use chunk::{AudioChunk, CHANNELS, SAMPLE_RATE};
pub use codec::{decode_pcm16, encode_pcm16};
pub use file::{AudioFile, FileCapture};
pub use playback::{
    InitOutcome, OutputDevice, OutputStream, PendingInit, PlaybackEngine, PlaybackQueue,
    PlaybackState, QueueHandle,
};
pub use wav::WavOutput;

#[cfg(feature = "device")]
pub use device::{MicrophoneCapture, SpeakerOutput};
