//! HTTP API for driving the voice session from another process
//!
//! - POST /session/start - Start a session
//! - POST /session/microphone - Toggle microphone streaming
//! - POST /session/end - End the session
//! - GET /session/status - Current lifecycle state
//! - GET /session/transcript - Conversation turns so far
//! - GET /session/grounding - Grounding references so far
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
