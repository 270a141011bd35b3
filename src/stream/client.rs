use base64::Engine;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::envelope::{
    AudioMetadata, InboundEnvelope, MeetingEventData, MeetingEventKind, OutboundEnvelope,
};
use super::transport::StreamTransport;
use crate::relay::AudioChunk;
use crate::session::{Participant, Platform, SessionId};

const COMMAND_CAPACITY: usize = 256;
const AUDIO_FORMAT: &str = "pcm_s16le";
const CLIENT_TYPE: &str = "tab-recorder";

#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Delay between reconnect attempts. Fixed, not exponential.
    pub reconnect_delay: Duration,
    /// Delay before retrying a send that found the connection closed.
    pub send_retry_delay: Duration,
    pub max_retries: u32,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(2),
            send_retry_delay: Duration::from_millis(500),
            max_retries: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Closed,
    Connecting,
    Open,
}

/// Connection bookkeeping. Reset to zero retries on every successful open
/// and when a new session starts.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Set when the controller enters `Flushing`; the only thing that
    /// suppresses reconnection.
    pub shutting_down: bool,
}

impl ConnectionState {
    fn new(max_retries: u32) -> Self {
        Self {
            status: ConnectionStatus::Closed,
            retry_count: 0,
            max_retries,
            shutting_down: false,
        }
    }

    fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Meeting context the client stamps onto every audio envelope.
#[derive(Debug, Clone)]
pub struct StreamSessionContext {
    pub session_id: SessionId,
    pub platform: Platform,
    pub meeting_url: String,
    pub participants: Vec<Participant>,
}

#[derive(Debug)]
enum StreamCommand {
    SessionStarted(StreamSessionContext),
    SendChunk(AudioChunk),
    MeetingEvent(MeetingEventKind),
    UpdateParticipants(Vec<Participant>),
    Shutdown,
}

/// What the streaming client reports back to the controller.
#[derive(Debug)]
pub enum StreamEvent {
    Envelope(InboundEnvelope),
    /// Retry budget exhausted; audio sends are dropped until a new session.
    Degraded,
}

/// Cheap cloneable handle the controller uses to talk to the client task.
#[derive(Clone)]
pub struct StreamingHandle {
    tx: mpsc::Sender<StreamCommand>,
}

impl StreamingHandle {
    async fn send(&self, command: StreamCommand) {
        if self.tx.send(command).await.is_err() {
            debug!("streaming client task is gone");
        }
    }

    pub async fn session_started(&self, context: StreamSessionContext) {
        self.send(StreamCommand::SessionStarted(context)).await;
    }

    pub async fn send_chunk(&self, chunk: AudioChunk) {
        self.send(StreamCommand::SendChunk(chunk)).await;
    }

    pub async fn meeting_event(&self, kind: MeetingEventKind) {
        self.send(StreamCommand::MeetingEvent(kind)).await;
    }

    pub async fn update_participants(&self, participants: Vec<Participant>) {
        self.send(StreamCommand::UpdateParticipants(participants))
            .await;
    }

    /// Suppress reconnection for the rest of the session.
    pub async fn begin_shutdown(&self) {
        self.send(StreamCommand::Shutdown).await;
    }
}

enum Pump {
    Command(Option<StreamCommand>),
    Inbound(Option<Result<InboundEnvelope, super::transport::StreamError>>),
}

/// Owns exactly one logical connection to the transcription service and the
/// reconnect policy around it.
pub struct StreamingClient {
    config: StreamingConfig,
    transport: Box<dyn StreamTransport>,
    commands: mpsc::Receiver<StreamCommand>,
    events: mpsc::Sender<StreamEvent>,
    conn: Option<Box<dyn super::transport::StreamConnection>>,
    state: ConnectionState,
    session: Option<StreamSessionContext>,
    degraded_notified: bool,
}

impl StreamingClient {
    pub fn new(
        config: StreamingConfig,
        transport: Box<dyn StreamTransport>,
        events: mpsc::Sender<StreamEvent>,
    ) -> (StreamingHandle, Self) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let state = ConnectionState::new(config.max_retries);
        let client = Self {
            config,
            transport,
            commands: rx,
            events,
            conn: None,
            state,
            session: None,
            degraded_notified: false,
        };
        (StreamingHandle { tx }, client)
    }

    pub async fn run(mut self) {
        loop {
            let pump = match self.conn.as_mut() {
                Some(conn) => tokio::select! {
                    command = self.commands.recv() => Pump::Command(command),
                    inbound = conn.recv() => Pump::Inbound(inbound),
                },
                None => Pump::Command(self.commands.recv().await),
            };

            match pump {
                Pump::Command(None) => break,
                Pump::Command(Some(command)) => self.handle_command(command).await,
                Pump::Inbound(Some(Ok(envelope))) => self.dispatch(envelope).await,
                Pump::Inbound(Some(Err(e))) => {
                    warn!(error = %e, "inbound envelope error");
                }
                Pump::Inbound(None) => self.handle_disconnect().await,
            }
        }
        debug!("streaming client task finished");
    }

    async fn handle_command(&mut self, command: StreamCommand) {
        match command {
            StreamCommand::SessionStarted(context) => {
                info!(session = %context.session_id, "streaming session started");
                self.session = Some(context);
                self.conn = None;
                self.state = ConnectionState::new(self.config.max_retries);
                self.degraded_notified = false;
                self.ensure_connected().await;
            }
            StreamCommand::SendChunk(chunk) => {
                let Some(envelope) = self.chunk_envelope(&chunk) else {
                    debug!(chunk = %chunk.chunk_id, "no session context, dropping chunk");
                    return;
                };
                if !self.try_send(&envelope).await {
                    debug!(chunk = %chunk.chunk_id, "chunk dropped, streaming unavailable");
                }
            }
            StreamCommand::MeetingEvent(kind) => self.send_meeting_event(kind).await,
            StreamCommand::UpdateParticipants(participants) => {
                if let Some(session) = self.session.as_mut() {
                    session.participants = participants;
                }
            }
            StreamCommand::Shutdown => {
                info!("streaming client shutting down, reconnection suppressed");
                self.state.shutting_down = true;
            }
        }
    }

    async fn dispatch(&mut self, envelope: InboundEnvelope) {
        if matches!(envelope, InboundEnvelope::Unknown) {
            debug!("ignoring unknown inbound envelope type");
            return;
        }
        if self.events.send(StreamEvent::Envelope(envelope)).await.is_err() {
            debug!("controller is gone, dropping inbound envelope");
        }
    }

    async fn handle_disconnect(&mut self) {
        self.conn = None;
        self.state.status = ConnectionStatus::Closed;
        if self.state.shutting_down {
            info!("connection closed during shutdown, not reconnecting");
            return;
        }
        warn!("connection closed unexpectedly, reconnecting");
        sleep(self.config.reconnect_delay).await;
        self.ensure_connected().await;
    }

    /// Open the connection if it is not, within the bounded retry budget.
    /// Once the budget is exhausted no further attempts happen until a new
    /// session resets the state.
    async fn ensure_connected(&mut self) -> bool {
        if self.conn.is_some() {
            return true;
        }
        if self.state.shutting_down {
            return false;
        }

        while !self.state.retries_exhausted() {
            self.state.status = ConnectionStatus::Connecting;
            match self.transport.connect().await {
                Ok(mut conn) => {
                    self.state.status = ConnectionStatus::Open;
                    if let Some(handshake) = self.handshake_envelope() {
                        if let Err(e) = conn.send(&handshake).await {
                            warn!(error = %e, "handshake failed");
                            self.state.status = ConnectionStatus::Closed;
                            self.state.retry_count += 1;
                            if self.state.retries_exhausted() {
                                break;
                            }
                            sleep(self.config.reconnect_delay).await;
                            continue;
                        }
                    }
                    // The budget resets only once the connection proves usable.
                    self.state.retry_count = 0;
                    info!("connected to transcription service");
                    self.conn = Some(conn);
                    return true;
                }
                Err(e) => {
                    self.state.status = ConnectionStatus::Closed;
                    self.state.retry_count += 1;
                    warn!(
                        error = %e,
                        retry = self.state.retry_count,
                        max = self.state.max_retries,
                        "connection attempt failed"
                    );
                    if self.state.retries_exhausted() {
                        break;
                    }
                    sleep(self.config.reconnect_delay).await;
                }
            }
        }

        self.note_degraded().await;
        false
    }

    /// Send with one bounded retry; a failed send closes the connection and
    /// goes back through the reconnect policy.
    async fn try_send(&mut self, envelope: &OutboundEnvelope) -> bool {
        for attempt in 0..2 {
            if !self.ensure_connected().await {
                return false;
            }
            let Some(conn) = self.conn.as_mut() else {
                continue;
            };
            match conn.send(envelope).await {
                Ok(()) => return true,
                Err(e) => {
                    warn!(error = %e, attempt, "send failed, closing connection");
                    self.conn = None;
                    self.state.status = ConnectionStatus::Closed;
                    sleep(self.config.send_retry_delay).await;
                }
            }
        }
        false
    }

    async fn send_meeting_event(&mut self, kind: MeetingEventKind) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let envelope = OutboundEnvelope::MeetingEvent {
            event_type: kind,
            data: MeetingEventData {
                meeting_id: session.session_id.to_string(),
                participants: session.participants.clone(),
                platform: session.platform,
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
        };
        match kind {
            // `ended` goes out only if the connection is still open; teardown
            // must not wait on a reconnect cycle.
            MeetingEventKind::Ended => {
                if let Some(conn) = self.conn.as_mut() {
                    if let Err(e) = conn.send(&envelope).await {
                        debug!(error = %e, "could not send meeting-ended event");
                        self.conn = None;
                        self.state.status = ConnectionStatus::Closed;
                    }
                }
            }
            MeetingEventKind::Started => {
                if !self.try_send(&envelope).await {
                    debug!("meeting-started event dropped, streaming unavailable");
                }
            }
        }
    }

    fn handshake_envelope(&self) -> Option<OutboundEnvelope> {
        let session = self.session.as_ref()?;
        Some(OutboundEnvelope::Handshake {
            client_type: CLIENT_TYPE.to_string(),
            platform: session.platform,
            meeting_url: session.meeting_url.clone(),
        })
    }

    fn chunk_envelope(&self, chunk: &AudioChunk) -> Option<OutboundEnvelope> {
        let session = self.session.as_ref()?;
        Some(OutboundEnvelope::AudioChunkEnhanced {
            data: base64::engine::general_purpose::STANDARD.encode(&chunk.payload),
            timestamp: chunk.captured_at.to_rfc3339(),
            platform: session.platform,
            meeting_url: session.meeting_url.clone(),
            participants: session.participants.clone(),
            participant_count: session.participants.len(),
            metadata: AudioMetadata {
                chunk_size: chunk.payload.len(),
                sample_rate: chunk.sample_rate,
                channels: chunk.channels,
                format: AUDIO_FORMAT.to_string(),
            },
        })
    }

    async fn note_degraded(&mut self) {
        if self.degraded_notified {
            return;
        }
        self.degraded_notified = true;
        warn!("retry budget exhausted, streaming degraded until next session");
        if self.events.send(StreamEvent::Degraded).await.is_err() {
            debug!("controller is gone, degraded event dropped");
        }
    }
}
