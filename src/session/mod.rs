//! Voice session management
//!
//! This module provides the `Orchestrator` that owns one voice session at a
//! time:
//! - Claims audio output before connecting so early replies are not lost
//! - Opens the transport and sends the session configuration
//! - Streams microphone chunks while recording
//! - Routes backend events to playback, the transcript and grounding
//! - Tears everything down on end, failure or a dropped connection

mod config;
mod conversation;
mod event;
mod handle;
mod orchestrator;
mod state;

pub use config::SessionConfig;
pub use conversation::{Conversation, Role, Turn};
pub use event::{Command, EventQueue, Reply, SessionEvent};
pub use handle::SessionHandle;
pub use orchestrator::Orchestrator;
pub use state::{SessionSnapshot, SessionStatus, SessionUpdate};
