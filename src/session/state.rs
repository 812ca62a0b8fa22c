use std::fmt;

use serde::Serialize;

use super::conversation::Turn;
use crate::protocol::GroundingReference;

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    /// Audio output is being claimed or the connection is opening
    Connecting,
    /// Connected; `recording` is true while the microphone streams
    Active { recording: bool },
}

impl SessionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Active { recording: true })
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Active { recording: false } => write!(f, "active"),
            Self::Active { recording: true } => write!(f, "recording"),
        }
    }
}

/// Everything a presentation layer needs to render the session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Option<String>,
    pub status: SessionStatus,
    pub turns: Vec<Turn>,
    pub grounding: Vec<GroundingReference>,
    pub last_error: Option<String>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            session_id: None,
            status: SessionStatus::Idle,
            turns: Vec::new(),
            grounding: Vec::new(),
            last_error: None,
        }
    }
}

/// Incremental notifications for subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    StatusChanged(SessionStatus),
    TurnAppended(Turn),
    GroundingAdded(Vec<GroundingReference>),
    /// Partial assistant transcript while audio is still streaming
    TranscriptDelta {
        response_id: Option<String>,
        delta: String,
    },
    /// Backend VAD detected the caller speaking
    SpeechStarted,
    /// `error` event from the backend; the connection stays up
    ServerError(String),
    /// A lifecycle failure that sent the session back to idle, or a
    /// microphone that could not be started
    Failure(String),
}
