use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::event::{Command, SessionEvent};
use super::state::{SessionSnapshot, SessionStatus, SessionUpdate};
use crate::error::{Error, Result};

/// Cloneable front door to a running [`super::Orchestrator`]
///
/// Intents are queued behind any events already waiting, so a call returns
/// once the orchestrator has processed everything that arrived before it.
#[derive(Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
    snapshot: watch::Receiver<SessionSnapshot>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl SessionHandle {
    pub(crate) fn new(
        events: mpsc::UnboundedSender<SessionEvent>,
        snapshot: watch::Receiver<SessionSnapshot>,
        updates: broadcast::Sender<SessionUpdate>,
    ) -> Self {
        Self {
            events,
            snapshot,
            updates,
        }
    }

    /// Begin a session. Resolves once connecting has begun, not once open.
    pub async fn start(&self) -> Result<SessionStatus> {
        self.request(Command::Start).await
    }

    pub async fn toggle_microphone(&self) -> Result<SessionStatus> {
        self.request(Command::ToggleMicrophone).await
    }

    pub async fn end(&self) -> Result<SessionStatus> {
        self.request(Command::End).await
    }

    /// End the session and stop the orchestrator
    pub async fn shutdown(&self) -> Result<()> {
        match self.request(Command::Shutdown).await {
            Ok(_) | Err(Error::SessionClosed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn request(&self, command: Command) -> Result<SessionStatus> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(SessionEvent::Command(command, Some(tx)))
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }

    /// Latest published state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.snapshot.borrow().status
    }

    /// Wait until the published state satisfies `predicate`
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<SessionSnapshot>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| Error::SessionClosed)?;
        Ok((*snapshot).clone())
    }

    /// Stream of incremental updates from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }
}
