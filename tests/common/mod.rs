// Test doubles for the session's hardware and network seams

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use voice_session::audio::{
    AudioChunk, CaptureSource, OutputDevice, OutputStream, PlaybackEngine, QueueHandle,
};
use voice_session::error::{ResourceInitError, TransportError};
use voice_session::session::{EventQueue, Orchestrator, SessionConfig, SessionEvent};
use voice_session::transport::{ConnectLatch, ReadyState, Transport};
use voice_session::{ClientEvent, TransportEvent};

// ============================================================================
// Output device
// ============================================================================

/// Output device that counts acquisitions and keeps every queue it was given
#[derive(Default)]
pub struct FakeOutput {
    pub acquired: AtomicUsize,
    pub released: Arc<AtomicUsize>,
    pub fail: AtomicBool,
    /// When set, `acquire` waits for a notification before returning
    pub gate: Option<Arc<Notify>>,
    queues: Mutex<Vec<QueueHandle>>,
}

impl FakeOutput {
    pub fn gated() -> (Arc<Self>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let output = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (Arc::new(output), gate)
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Queue handed to the most recent acquisition
    pub fn last_queue(&self) -> Option<QueueHandle> {
        self.queues.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl OutputDevice for FakeOutput {
    async fn acquire(
        &self,
        _sample_rate: u32,
        queue: QueueHandle,
    ) -> Result<Box<dyn OutputStream>, ResourceInitError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ResourceInitError::Output("device busy".into()));
        }

        self.acquired.fetch_add(1, Ordering::SeqCst);
        self.queues.lock().unwrap().push(queue);
        Ok(Box::new(FakeStream {
            released: Arc::clone(&self.released),
        }))
    }

    fn name(&self) -> &str {
        "fake output"
    }
}

struct FakeStream {
    released: Arc<AtomicUsize>,
}

impl OutputStream for FakeStream {
    fn release(self: Box<Self>) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Capture source
// ============================================================================

#[derive(Default)]
pub struct CaptureLog {
    pub starts: usize,
    pub stops: usize,
    /// Sender feeding the current capture run
    pub feed: Option<mpsc::Sender<AudioChunk>>,
    pub fail: bool,
}

/// Capture source whose chunks are pushed by the test
#[derive(Clone, Default)]
pub struct FakeCapture {
    pub log: Arc<Mutex<CaptureLog>>,
}

impl FakeCapture {
    pub fn starts(&self) -> usize {
        self.log.lock().unwrap().starts
    }

    pub fn stops(&self) -> usize {
        self.log.lock().unwrap().stops
    }

    pub fn is_running(&self) -> bool {
        self.log.lock().unwrap().feed.is_some()
    }

    pub async fn push(&self, samples: Vec<i16>) {
        let feed = self.log.lock().unwrap().feed.clone();
        if let Some(feed) = feed {
            feed.send(AudioChunk::new(samples)).await.unwrap();
        }
    }
}

#[async_trait]
impl CaptureSource for FakeCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioChunk>, ResourceInitError> {
        let mut log = self.log.lock().unwrap();
        if log.fail {
            return Err(ResourceInitError::Microphone("permission denied".into()));
        }
        let (tx, rx) = mpsc::channel(16);
        log.starts += 1;
        log.feed = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) {
        let mut log = self.log.lock().unwrap();
        if log.feed.take().is_some() {
            log.stops += 1;
        }
    }

    fn is_capturing(&self) -> bool {
        self.is_running()
    }

    fn name(&self) -> &str {
        "fake capture"
    }
}

// ============================================================================
// Transport
// ============================================================================

pub struct TransportLog {
    pub opens: Vec<String>,
    /// Connection id passed to each open
    pub connections: Vec<u64>,
    pub sent: Vec<ClientEvent>,
    pub closes: usize,
    pub state: ReadyState,
}

impl Default for TransportLog {
    fn default() -> Self {
        Self {
            opens: Vec::new(),
            connections: Vec::new(),
            sent: Vec::new(),
            closes: 0,
            state: ReadyState::Closed,
        }
    }
}

/// Transport that records traffic; the test decides when it "opens"
#[derive(Clone)]
pub struct FakeTransport {
    pub log: Arc<Mutex<TransportLog>>,
    latch: ConnectLatch,
}

impl FakeTransport {
    pub fn new(latch: ConnectLatch) -> Self {
        Self {
            log: Arc::default(),
            latch,
        }
    }

    pub fn opens(&self) -> usize {
        self.log.lock().unwrap().opens.len()
    }

    /// Id of the most recently opened connection
    pub fn connection(&self) -> u64 {
        self.log
            .lock()
            .unwrap()
            .connections
            .last()
            .copied()
            .expect("transport was never opened")
    }

    pub fn closes(&self) -> usize {
        self.log.lock().unwrap().closes
    }

    pub fn sent(&self) -> Vec<ClientEvent> {
        self.log.lock().unwrap().sent.clone()
    }

    pub fn sent_kinds(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().sent.iter().map(|e| e.kind()).collect()
    }

    pub fn set_state(&self, state: ReadyState) {
        self.log.lock().unwrap().state = state;
    }
}

impl Transport for FakeTransport {
    fn open(&mut self, endpoint: &str, connection: u64) {
        let mut log = self.log.lock().unwrap();
        if !self.latch.is_set() || matches!(log.state, ReadyState::Connecting | ReadyState::Open) {
            return;
        }
        log.opens.push(endpoint.to_string());
        log.connections.push(connection);
        log.state = ReadyState::Connecting;
    }

    fn ready_state(&self) -> ReadyState {
        self.log.lock().unwrap().state
    }

    fn send(&mut self, event: &ClientEvent) -> Result<(), TransportError> {
        let mut log = self.log.lock().unwrap();
        if log.state != ReadyState::Open {
            return Err(TransportError::NotConnected);
        }
        log.sent.push(event.clone());
        Ok(())
    }

    fn close(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.closes += 1;
        log.state = ReadyState::Closed;
    }
}

// ============================================================================
// Harness
// ============================================================================

/// An orchestrator wired to fakes, driven one event at a time
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub events: mpsc::UnboundedSender<SessionEvent>,
    pub transport: FakeTransport,
    pub capture: FakeCapture,
    pub output: Arc<FakeOutput>,
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        endpoint: "ws://test/realtime".to_string(),
        settle_delay: std::time::Duration::ZERO,
        ..SessionConfig::default()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_output(Arc::new(FakeOutput::default()))
    }

    pub fn with_output(output: Arc<FakeOutput>) -> Self {
        Self::with_config(test_config(), output)
    }

    pub fn with_config(config: SessionConfig, output: Arc<FakeOutput>) -> Self {
        let queue = EventQueue::new();
        let events = queue.sender();
        let latch = ConnectLatch::new();
        let transport = FakeTransport::new(latch.clone());
        let capture = FakeCapture::default();

        let orchestrator = Orchestrator::new(
            config,
            queue,
            latch,
            Box::new(transport.clone()),
            Box::new(capture.clone()),
            PlaybackEngine::new(output.clone()),
        );

        Self {
            orchestrator,
            events,
            transport,
            capture,
            output,
        }
    }

    /// Process the next queued event
    pub async fn step(&mut self) {
        assert!(self.orchestrator.step().await);
    }

    pub async fn deliver(&mut self, event: SessionEvent) {
        self.orchestrator.handle_event(event).await;
    }

    /// Start, let playback initialize, and simulate the socket opening
    pub async fn connect(&mut self) {
        self.orchestrator.start().unwrap();
        // PlaybackReady
        self.step().await;
        self.open().await;
    }

    pub async fn open(&mut self) {
        self.transport.set_state(ReadyState::Open);
        self.transport_event(TransportEvent::Opened).await;
    }

    pub async fn frame(&mut self, json: serde_json::Value) {
        self.transport_event(TransportEvent::Frame(json.to_string()))
            .await;
    }

    /// Deliver an event from the most recently opened connection
    pub async fn transport_event(&mut self, event: TransportEvent) {
        let connection = self.transport.connection();
        self.deliver(SessionEvent::Transport { connection, event })
            .await;
    }
}
