//! Duplex connection to the realtime backend.
//!
//! A transport never reconnects on its own: once closed it stays closed until
//! the orchestrator asks for a fresh `open`, and `open` does nothing unless
//! the connect latch is set.

mod websocket;

pub use websocket::WebSocketTransport;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::TransportError;
use crate::protocol::ClientEvent;

/// Readiness of the underlying connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Lifecycle and traffic reported by a transport, in delivery order
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The connection is physically open
    Opened,
    /// One text frame from the backend
    Frame(String),
    /// The backend (or network) closed the connection
    Closed,
    /// Opening failed or the connection broke
    Error(String),
}

/// A [`TransportEvent`] tagged with the `connection` id passed to
/// [`Transport::open`]
///
/// Lets a receiver drop events from a connection it has since closed, even
/// when they were queued before the close.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionEvent {
    pub connection: u64,
    pub event: TransportEvent,
}

/// Permission for the transport to connect
///
/// Written only by the orchestrator; transports only read it.
#[derive(Debug, Clone, Default)]
pub struct ConnectLatch(Arc<AtomicBool>);

impl ConnectLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Session transport contract
///
/// Lifecycle changes are reported asynchronously through the event channel
/// the implementation was built with, as [`ConnectionEvent`]s; exactly one
/// event per physical open, close or error. A close requested through
/// [`Transport::close`] is not reported.
pub trait Transport: Send {
    /// Start connecting, tagging every event of this connection with
    /// `connection`. No-op if already connecting/open or if the connect
    /// latch is not set.
    fn open(&mut self, endpoint: &str, connection: u64);

    fn ready_state(&self) -> ReadyState;

    /// Send one command. Fails with `NotConnected` unless open.
    fn send(&mut self, event: &ClientEvent) -> Result<(), TransportError>;

    /// Drop the connection. Always succeeds; the state becomes `Closed`.
    fn close(&mut self);
}
