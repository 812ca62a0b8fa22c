//! WebSocket transport.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info};

use super::{ConnectLatch, ConnectionEvent, ReadyState, Transport, TransportEvent};
use crate::error::TransportError;
use crate::protocol::ClientEvent;

struct Link {
    state: ReadyState,
    /// Identifies the current connection; bumped by `open` and `close` so a
    /// superseded connection task can tell it must stay quiet
    connection: u64,
    /// Caller's tag for the current connection
    tag: u64,
    writer: Option<mpsc::UnboundedSender<Message>>,
    task: Option<JoinHandle<()>>,
}

fn lock(link: &Mutex<Link>) -> MutexGuard<'_, Link> {
    link.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Transport over a single WebSocket connection
///
/// Events are delivered as `E` so the transport can feed a caller's event
/// queue directly.
pub struct WebSocketTransport<E> {
    latch: ConnectLatch,
    events: mpsc::UnboundedSender<E>,
    link: Arc<Mutex<Link>>,
}

impl<E> WebSocketTransport<E>
where
    E: From<ConnectionEvent> + Send + 'static,
{
    pub fn new(latch: ConnectLatch, events: mpsc::UnboundedSender<E>) -> Self {
        Self {
            latch,
            events,
            link: Arc::new(Mutex::new(Link {
                state: ReadyState::Closed,
                connection: 0,
                tag: 0,
                writer: None,
                task: None,
            })),
        }
    }
}

impl<E> Transport for WebSocketTransport<E>
where
    E: From<ConnectionEvent> + Send + 'static,
{
    fn open(&mut self, endpoint: &str, connection: u64) {
        if !self.latch.is_set() {
            debug!("Connect latch not set, not opening {}", endpoint);
            return;
        }

        let mut link = lock(&self.link);
        if matches!(link.state, ReadyState::Connecting | ReadyState::Open) {
            debug!("Transport already {:?}", link.state);
            return;
        }

        link.connection += 1;
        link.tag = connection;
        link.state = ReadyState::Connecting;
        info!("Connecting to {} (connection {})", endpoint, connection);

        link.task = Some(tokio::spawn(run_connection(
            link.connection,
            endpoint.to_string(),
            Arc::clone(&self.link),
            self.events.clone(),
        )));
    }

    fn ready_state(&self) -> ReadyState {
        lock(&self.link).state
    }

    fn send(&mut self, event: &ClientEvent) -> Result<(), TransportError> {
        let link = lock(&self.link);
        let writer = match (link.state, link.writer.as_ref()) {
            (ReadyState::Open, Some(writer)) => writer,
            _ => return Err(TransportError::NotConnected),
        };

        let text = serde_json::to_string(event)?;
        debug!("Sending {} ({} bytes)", event.kind(), text.len());

        writer
            .send(Message::Text(text.into()))
            .map_err(|_| TransportError::NotConnected)
    }

    fn close(&mut self) {
        let mut link = lock(&self.link);
        link.connection += 1;
        let previous = std::mem::replace(&mut link.state, ReadyState::Closed);

        // An open connection finishes its closing handshake in the background
        if let Some(writer) = link.writer.take() {
            let _ = writer.send(Message::Close(None));
        }
        if let Some(task) = link.task.take() {
            if previous == ReadyState::Connecting {
                task.abort();
            }
        }

        if previous != ReadyState::Closed {
            info!("Transport closed (was {:?})", previous);
        }
    }
}

impl<E> Drop for WebSocketTransport<E> {
    fn drop(&mut self) {
        let mut link = lock(&self.link);
        link.connection += 1;
        link.state = ReadyState::Closed;
        link.writer = None;
        if let Some(task) = link.task.take() {
            task.abort();
        }
    }
}

/// Report an event if `id` is still the current connection
fn emit<E: From<ConnectionEvent>>(
    link: &Mutex<Link>,
    events: &mpsc::UnboundedSender<E>,
    id: u64,
    event: TransportEvent,
) {
    let link = lock(link);
    if link.connection == id {
        deliver(&link, events, event);
    }
}

fn deliver<E: From<ConnectionEvent>>(
    link: &Link,
    events: &mpsc::UnboundedSender<E>,
    event: TransportEvent,
) {
    let _ = events.send(
        ConnectionEvent {
            connection: link.tag,
            event,
        }
        .into(),
    );
}

/// Mark the connection closed and report why, if it is still current
fn finish<E: From<ConnectionEvent>>(
    link: &Mutex<Link>,
    events: &mpsc::UnboundedSender<E>,
    id: u64,
    event: TransportEvent,
) {
    let mut link = lock(link);
    if link.connection == id {
        link.state = ReadyState::Closed;
        link.writer = None;
        link.task = None;
        deliver(&link, events, event);
    }
}

async fn run_connection<E>(
    id: u64,
    endpoint: String,
    link: Arc<Mutex<Link>>,
    events: mpsc::UnboundedSender<E>,
) where
    E: From<ConnectionEvent> + Send + 'static,
{
    let ws_stream = match connect_async(endpoint.as_str()).await {
        Ok((ws_stream, _response)) => ws_stream,
        Err(source) => {
            let err = TransportError::Connect {
                endpoint: endpoint.clone(),
                source,
            };
            error!("{}", err);
            finish(&link, &events, id, TransportEvent::Error(err.to_string()));
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    let (write_tx, mut write_rx) = mpsc::unbounded_channel();

    let accepted = {
        let mut guard = lock(&link);
        if guard.connection == id {
            guard.state = ReadyState::Open;
            guard.writer = Some(write_tx);
            deliver(&guard, &events, TransportEvent::Opened);
            true
        } else {
            false
        }
    };

    if !accepted {
        debug!("Connection to {} superseded before opening", endpoint);
        let _ = write.close().await;
        return;
    }

    info!("Connected to {}", endpoint);

    let outcome = loop {
        tokio::select! {
            outgoing = write_rx.recv() => match outgoing {
                None | Some(Message::Close(_)) => {
                    let _ = write.close().await;
                    break None;
                }
                Some(msg) => {
                    if let Err(e) = write.send(msg).await {
                        let err = TransportError::from(e);
                        error!("Write failed: {}", err);
                        break Some(TransportEvent::Error(err.to_string()));
                    }
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    emit(&link, &events, id, TransportEvent::Frame(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!("Ignoring {}-byte binary frame", data.len());
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!("WebSocket closed by server");
                    let mut guard = lock(&link);
                    if guard.connection == id {
                        guard.state = ReadyState::Closing;
                    }
                    break Some(TransportEvent::Closed);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let err = TransportError::from(e);
                    error!("Read failed: {}", err);
                    break Some(TransportEvent::Error(err.to_string()));
                }
            },
        }
    };

    if let Some(event) = outcome {
        finish(&link, &events, id, event);
    }
}
