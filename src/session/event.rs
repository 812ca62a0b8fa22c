use tokio::sync::{mpsc, oneshot};

use super::state::SessionStatus;
use crate::audio::{AudioChunk, InitOutcome};
use crate::error::{ResourceInitError, Result};
use crate::transport::{ConnectionEvent, TransportEvent};

/// Caller intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    ToggleMicrophone,
    End,
    /// End the session and stop the orchestrator's event loop
    Shutdown,
}

pub type Reply = oneshot::Sender<Result<SessionStatus>>;

/// Everything the orchestrator reacts to, delivered through one queue and
/// processed strictly in order
#[derive(Debug)]
pub enum SessionEvent {
    Command(Command, Option<Reply>),
    /// Transport activity on the connection opened for session `connection`
    Transport {
        connection: u64,
        event: TransportEvent,
    },
    /// Playback engine initialization finished for session `epoch`
    PlaybackReady {
        epoch: u64,
        result: std::result::Result<InitOutcome, ResourceInitError>,
    },
    /// Settle delay after opening elapsed for session `epoch`
    Settled { epoch: u64 },
    /// Connect timeout elapsed for session `epoch`
    ConnectTimeout { epoch: u64 },
    /// A chunk from capture run `generation`
    Captured { generation: u64, chunk: AudioChunk },
}

impl From<ConnectionEvent> for SessionEvent {
    fn from(tagged: ConnectionEvent) -> Self {
        Self::Transport {
            connection: tagged.connection,
            event: tagged.event,
        }
    }
}

/// Producer/consumer halves of the orchestrator's event queue
pub struct EventQueue {
    pub(crate) tx: mpsc::UnboundedSender<SessionEvent>,
    pub(crate) rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// A producer handle, e.g. for a transport
    pub fn sender(&self) -> mpsc::UnboundedSender<SessionEvent> {
        self.tx.clone()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
