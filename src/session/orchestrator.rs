use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::conversation::Conversation;
use super::event::{Command, EventQueue, Reply, SessionEvent};
use super::handle::SessionHandle;
use super::state::{SessionSnapshot, SessionStatus, SessionUpdate};
use crate::audio::{
    decode_pcm16, AudioChunk, CaptureSource, InitOutcome, OutputDevice, PlaybackEngine,
};
use crate::error::{InvalidStateError, ResourceInitError, Result};
use crate::protocol::messages::{
    AudioDelta, ResponseDone, ServerError, ToolResponse, TranscriptDelta, TranscriptionCompleted,
};
use crate::protocol::{commands, dispatch, parse_tool_result, EventHandler};
use crate::transport::{ConnectLatch, ReadyState, Transport, TransportEvent, WebSocketTransport};

/// Capacity of the update broadcast; slow subscribers skip ahead
const UPDATE_CAPACITY: usize = 256;

/// Coordinates the connection, playback and capture of one voice session
/// at a time
///
/// All state changes happen inside [`Orchestrator::handle_event`], fed from a
/// single queue. Slow work (claiming audio output, opening the socket, the
/// settle delay) runs in spawned tasks that post their result back to the
/// queue tagged with the session epoch; results for an epoch that has since
/// ended are discarded. The transport tags its events the same way.
pub struct Orchestrator {
    /// Session configuration
    config: SessionConfig,

    status: SessionStatus,

    /// Identifier of the current session (new on every start)
    session_id: Option<String>,

    /// Bumped on every start and teardown
    epoch: u64,

    /// Gate for the transport; only the orchestrator writes it
    latch: ConnectLatch,

    transport: Box<dyn Transport>,

    capture: Box<dyn CaptureSource>,

    /// Bumped whenever capture stops; chunks from older runs are dropped
    capture_generation: u64,

    /// Task forwarding captured chunks into the event queue
    capture_pump: Option<JoinHandle<()>>,

    playback: PlaybackEngine,

    conversation: Conversation,

    last_error: Option<String>,

    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,

    snapshot: watch::Sender<SessionSnapshot>,
    /// Whether `snapshot` is behind the current state
    dirty: bool,

    updates: broadcast::Sender<SessionUpdate>,
}

impl Orchestrator {
    /// Build an orchestrator around already-constructed collaborators
    ///
    /// `transport` must report its events into `queue` and read `latch`.
    pub fn new(
        config: SessionConfig,
        queue: EventQueue,
        latch: ConnectLatch,
        transport: Box<dyn Transport>,
        capture: Box<dyn CaptureSource>,
        playback: PlaybackEngine,
    ) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot::default());
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);

        Self {
            config,
            status: SessionStatus::Idle,
            session_id: None,
            epoch: 0,
            latch,
            transport,
            capture,
            capture_generation: 0,
            capture_pump: None,
            playback,
            conversation: Conversation::new(),
            last_error: None,
            events_tx: queue.tx,
            events_rx: queue.rx,
            snapshot,
            dirty: false,
            updates,
        }
    }

    /// Orchestrator talking to the backend over WebSocket
    pub fn with_websocket(
        config: SessionConfig,
        capture: Box<dyn CaptureSource>,
        output: Arc<dyn OutputDevice>,
    ) -> Self {
        let queue = EventQueue::new();
        let latch = ConnectLatch::new();
        let transport = WebSocketTransport::new(latch.clone(), queue.sender());

        Self::new(
            config,
            queue,
            latch,
            Box::new(transport),
            capture,
            PlaybackEngine::new(output),
        )
    }

    /// Handle for callers and presentation layers
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(
            self.events_tx.clone(),
            self.snapshot.subscribe(),
            self.updates.clone(),
        )
    }

    /// Process events until shut down
    pub async fn run(mut self) {
        info!("Session orchestrator running");
        while self.step().await {}
        info!("Session orchestrator stopped");
    }

    /// Wait for and process one event. Returns `false` once shut down.
    pub async fn step(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => self.handle_event(event).await,
            None => false,
        }
    }

    /// Process one event. Returns `false` if it was a shutdown command.
    pub async fn handle_event(&mut self, event: SessionEvent) -> bool {
        let keep_running = match event {
            SessionEvent::Command(command, reply) => self.on_command(command, reply).await,
            SessionEvent::Transport { connection, event } => {
                self.on_transport_event(connection, event).await;
                true
            }
            SessionEvent::PlaybackReady { epoch, result } => {
                self.on_playback_ready(epoch, result).await;
                true
            }
            SessionEvent::Settled { epoch } => {
                self.on_settled(epoch);
                true
            }
            SessionEvent::ConnectTimeout { epoch } => {
                self.on_connect_timeout(epoch).await;
                true
            }
            SessionEvent::Captured { generation, chunk } => {
                self.on_captured(generation, chunk);
                true
            }
        };

        self.publish_snapshot();
        keep_running
    }

    async fn on_command(&mut self, command: Command, reply: Option<Reply>) -> bool {
        let result = match command {
            Command::Start => self.start(),
            Command::ToggleMicrophone => self.toggle_microphone().await,
            Command::End | Command::Shutdown => {
                self.end().await;
                Ok(self.status)
            }
        };

        // Callers reading the snapshot after the reply see its effect
        self.publish_snapshot();
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
        command != Command::Shutdown
    }

    // ========================================================================
    // Caller intents
    // ========================================================================

    /// Begin a session: claim audio output, then connect
    pub fn start(&mut self) -> Result<SessionStatus> {
        if self.status != SessionStatus::Idle {
            warn!("Cannot start a session while {}", self.status);
            return Err(InvalidStateError {
                operation: "start a session",
                state: self.status.to_string(),
            }
            .into());
        }

        self.epoch += 1;
        let epoch = self.epoch;
        let session_id = format!("session-{}", uuid::Uuid::new_v4());
        info!("Starting session {}", session_id);

        self.session_id = Some(session_id);
        self.conversation.clear();
        self.last_error = None;
        self.set_status(SessionStatus::Connecting);

        // Audio may arrive as soon as the backend acknowledges the session,
        // so the output is claimed before connecting
        let pending = self.playback.begin_init(self.config.sample_rate);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = pending.acquire().await;
            let _ = tx.send(SessionEvent::PlaybackReady { epoch, result });
        });

        if let Some(timeout) = self.config.connect_timeout {
            let tx = self.events_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let _ = tx.send(SessionEvent::ConnectTimeout { epoch });
            });
        }

        Ok(self.status)
    }

    /// Start or stop streaming the microphone
    pub async fn toggle_microphone(&mut self) -> Result<SessionStatus> {
        let recording = match self.status {
            SessionStatus::Active { recording } => recording,
            other => {
                warn!("Cannot toggle microphone while {}", other);
                return Err(InvalidStateError {
                    operation: "toggle the microphone",
                    state: other.to_string(),
                }
                .into());
            }
        };

        if recording {
            self.stop_capture().await;
            self.set_status(SessionStatus::Active { recording: false });
            info!("Microphone stopped");
            return Ok(self.status);
        }

        info!("Starting microphone ({})", self.capture.name());
        let mut chunks = match self.capture.start().await {
            Ok(chunks) => chunks,
            Err(e) => {
                error!("Failed to start microphone: {}", e);
                self.report_failure(e.to_string());
                return Err(e.into());
            }
        };

        self.capture_generation += 1;
        let generation = self.capture_generation;
        let tx = self.events_tx.clone();
        self.capture_pump = Some(tokio::spawn(async move {
            while let Some(chunk) = chunks.recv().await {
                if tx.send(SessionEvent::Captured { generation, chunk }).is_err() {
                    break;
                }
            }
        }));

        self.set_status(SessionStatus::Active { recording: true });
        info!("Microphone started");
        Ok(self.status)
    }

    /// End the session from any state, releasing everything it holds
    pub async fn end(&mut self) {
        if self.status != SessionStatus::Idle {
            info!("Ending session (was {})", self.status);
        }
        self.teardown(true).await;
    }

    // ========================================================================
    // Asynchronous completions
    // ========================================================================

    async fn on_playback_ready(
        &mut self,
        epoch: u64,
        result: std::result::Result<InitOutcome, ResourceInitError>,
    ) {
        if epoch != self.epoch || self.status != SessionStatus::Connecting {
            debug!("Discarding playback init for superseded session");
            return;
        }

        match result {
            Ok(InitOutcome::Ready) => {
                info!("Audio output ready, connecting to {}", self.config.endpoint);
                self.latch.set();
                self.transport.open(&self.config.endpoint, epoch);
            }
            Ok(outcome) => {
                warn!("Playback init did not complete ({:?})", outcome);
                self.fail("audio output initialization was interrupted".to_string())
                    .await;
            }
            Err(e) => {
                error!("Failed to initialize audio output: {}", e);
                self.fail(e.to_string()).await;
            }
        }
    }

    fn on_settled(&mut self, epoch: u64) {
        if epoch != self.epoch || !self.status.is_active() {
            return;
        }
        self.send_session_update();
    }

    async fn on_connect_timeout(&mut self, epoch: u64) {
        if epoch == self.epoch && self.status == SessionStatus::Connecting {
            error!("Timed out connecting to {}", self.config.endpoint);
            self.fail("timed out connecting".to_string()).await;
        }
    }

    fn on_captured(&mut self, generation: u64, chunk: AudioChunk) {
        if generation != self.capture_generation || !self.status.is_recording() {
            debug!("Dropping {} samples from stopped capture", chunk.len());
            return;
        }

        if let Err(e) = self.transport.send(&commands::audio_append(&chunk)) {
            warn!("Failed to send audio chunk: {}", e);
        }
    }

    async fn on_transport_event(&mut self, connection: u64, event: TransportEvent) {
        // The connection id is the epoch it was opened for; anything queued
        // by a connection that has since been closed is stale
        if connection != self.epoch {
            debug!(
                "Dropping transport event from closed connection {} (current {})",
                connection, self.epoch
            );
            return;
        }

        match event {
            TransportEvent::Opened => {
                if self.status != SessionStatus::Connecting {
                    debug!("Ignoring transport open while {}", self.status);
                    return;
                }
                info!("Transport connected, session active");
                self.set_status(SessionStatus::Active { recording: false });
                self.schedule_session_update();
            }
            TransportEvent::Frame(frame) => {
                if !self.status.is_active() {
                    debug!("Ignoring frame while {}", self.status);
                    return;
                }
                dispatch(&frame, self);
            }
            TransportEvent::Closed | TransportEvent::Error(_) => {
                let reason = match &event {
                    TransportEvent::Error(reason) => format!("connection error: {}", reason),
                    _ => "connection closed".to_string(),
                };

                match self.status {
                    SessionStatus::Idle => debug!("Ignoring transport shutdown while idle"),
                    SessionStatus::Connecting => {
                        error!("Failed to connect: {}", reason);
                        self.fail(reason).await;
                    }
                    SessionStatus::Active { .. } => {
                        warn!("Session ended by transport: {}", reason);
                        if matches!(event, TransportEvent::Error(_)) {
                            self.last_error = Some(reason);
                        }
                        self.teardown(false).await;
                    }
                }
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn schedule_session_update(&mut self) {
        let delay = self.config.settle_delay;
        if delay.is_zero() {
            self.send_session_update();
            return;
        }

        let epoch = self.epoch;
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SessionEvent::Settled { epoch });
        });
    }

    fn send_session_update(&mut self) {
        let command = commands::session_update(self.config.transcription_model.as_deref());
        match self.transport.send(&command) {
            Ok(()) => info!("Session configuration sent"),
            Err(e) => warn!("Failed to send session configuration: {}", e),
        }
    }

    async fn stop_capture(&mut self) {
        self.capture_generation += 1;
        if let Some(pump) = self.capture_pump.take() {
            pump.abort();
        }
        self.capture.stop().await;
    }

    /// Release capture, playback and the connection; back to idle
    async fn teardown(&mut self, clear_input: bool) {
        self.stop_capture().await;
        self.playback.stop();

        if clear_input && self.transport.ready_state() == ReadyState::Open {
            match self.transport.send(&commands::audio_buffer_clear()) {
                Ok(()) => info!("Input audio buffer cleared"),
                Err(e) => warn!("Failed to clear input audio buffer: {}", e),
            }
        }

        self.transport.close();
        self.latch.clear();
        self.epoch += 1;
        self.set_status(SessionStatus::Idle);
    }

    async fn fail(&mut self, reason: String) {
        self.report_failure(reason);
        self.teardown(false).await;
    }

    fn report_failure(&mut self, reason: String) {
        self.last_error = Some(reason.clone());
        self.dirty = true;
        self.notify(SessionUpdate::Failure(reason));
    }

    fn set_status(&mut self, status: SessionStatus) {
        if self.status != status {
            debug!("Session status {} -> {}", self.status, status);
            self.status = status;
            self.dirty = true;
            self.notify(SessionUpdate::StatusChanged(status));
        }
    }

    fn notify(&self, update: SessionUpdate) {
        // No subscribers is fine
        let _ = self.updates.send(update);
    }

    fn publish_snapshot(&mut self) {
        if !std::mem::take(&mut self.dirty) {
            return;
        }
        self.snapshot.send_replace(SessionSnapshot {
            session_id: self.session_id.clone(),
            status: self.status,
            turns: self.conversation.turns().to_vec(),
            grounding: self.conversation.grounding().to_vec(),
            last_error: self.last_error.clone(),
        });
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn playback(&self) -> &PlaybackEngine {
        &self.playback
    }

    pub fn latch(&self) -> &ConnectLatch {
        &self.latch
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

impl EventHandler for Orchestrator {
    fn on_session_updated(&mut self) {
        info!("Session configuration acknowledged");
    }

    fn on_audio_delta(&mut self, delta: AudioDelta) {
        if delta.delta.is_empty() {
            return;
        }
        match decode_pcm16(&delta.delta) {
            Ok(chunk) => {
                self.playback.enqueue(chunk);
            }
            Err(e) => warn!("Dropping audio delta: {}", e),
        }
    }

    fn on_transcript_delta(&mut self, delta: TranscriptDelta) {
        self.notify(SessionUpdate::TranscriptDelta {
            response_id: delta.response_id,
            delta: delta.delta,
        });
    }

    fn on_response_done(&mut self, done: ResponseDone) {
        match self.conversation.complete_response(&done) {
            Some(turn) => {
                let turn = turn.clone();
                info!("Assistant turn {} recorded", turn.id);
                self.dirty = true;
                self.notify(SessionUpdate::TurnAppended(turn));
            }
            None => debug!("Response {} carried no transcript", done.response.id),
        }
    }

    fn on_input_transcription_completed(&mut self, completed: TranscriptionCompleted) {
        let turn = self
            .conversation
            .append_user(completed.item_id, completed.transcript)
            .clone();
        info!("User turn {} recorded", turn.id);
        self.dirty = true;
        self.notify(SessionUpdate::TurnAppended(turn));
    }

    fn on_tool_response(&mut self, response: ToolResponse) {
        match parse_tool_result(&response.tool_result) {
            Ok(references) if references.is_empty() => {}
            Ok(references) => {
                info!("{} grounding references received", references.len());
                self.conversation.add_grounding(&references);
                self.dirty = true;
                self.notify(SessionUpdate::GroundingAdded(references));
            }
            Err(e) => warn!("Ignoring tool response: {}", e),
        }
    }

    fn on_speech_started(&mut self) {
        debug!("Speech started");
        self.notify(SessionUpdate::SpeechStarted);
    }

    fn on_error(&mut self, error: ServerError) {
        let message = error.message();
        error!("Backend reported error: {}", message);
        self.last_error = Some(message.clone());
        self.dirty = true;
        self.notify(SessionUpdate::ServerError(message));
    }
}
