pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod protocol;
pub mod session;
pub mod transport;

pub use audio::{
    AudioChunk, AudioFile, CaptureConfig, CaptureSource, FileCapture, OutputDevice,
    PlaybackEngine, PlaybackQueue, WavOutput,
};
pub use config::Config;
pub use error::{Error, Result};
pub use http::{create_router, AppState};
pub use protocol::{ClientEvent, GroundingReference, ServerEvent};
pub use session::{
    Orchestrator, SessionConfig, SessionHandle, SessionSnapshot, SessionStatus, SessionUpdate,
};
pub use transport::{ConnectLatch, ConnectionEvent, Transport, TransportEvent, WebSocketTransport};
