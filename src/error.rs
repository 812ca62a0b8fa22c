//! Error types for the realtime voice session.
//!
//! Per-frame errors (`ParseError`, `DecodeError`, `ToolResultParseError`) are
//! logged and the offending frame dropped; they never reach [`Error`].
//! Lifecycle errors (`TransportError`, `ResourceInitError`) are surfaced to
//! the caller and force a teardown of the session.

use thiserror::Error;

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the session transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// `send` was called while the transport was not open.
    #[error("transport is not connected")]
    NotConnected,

    /// The initial handshake with `endpoint` failed.
    #[error("connection to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// An outbound command could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// An inbound frame was not well-formed JSON or did not match its tag's shape.
#[derive(Error, Debug)]
#[error("malformed frame: {0}")]
pub struct ParseError(#[from] pub serde_json::Error);

/// A base64 PCM16 payload could not be turned into samples.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid base64 audio payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("audio payload has odd byte length {0}")]
    OddLength(usize),
}

/// The JSON string carried by a tool response could not be parsed.
#[derive(Error, Debug)]
#[error("malformed tool result: {0}")]
pub struct ToolResultParseError(#[from] pub serde_json::Error);

/// Acquiring an audio resource failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceInitError {
    #[error("microphone unavailable: {0}")]
    Microphone(String),

    #[error("audio output unavailable: {0}")]
    Output(String),
}

/// An operation was requested in a state that forbids it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot {operation} while {state}")]
pub struct InvalidStateError {
    pub operation: &'static str,
    pub state: String,
}

/// Umbrella error for the crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    ResourceInit(#[from] ResourceInitError),

    #[error(transparent)]
    InvalidState(#[from] InvalidStateError),

    /// The orchestrator behind a session handle has exited.
    #[error("session closed")]
    SessionClosed,
}
