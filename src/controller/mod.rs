//! The recorder controller context. Owns the `RecordingSession` state
//! machine, the transcript log, and the bridge between the capture agent
//! (via the relay) and the streaming client.

pub mod launch;

pub use launch::{
    AgentLauncher, ContextLauncher, NoopSessionSink, SessionSink, SessionStartRecord,
};

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::agent::CaptureTarget;
use crate::relay::{
    AgentMessage, AudioChunk, CaptureFailureReason, ContextId, ControllerMessage, Delivery, Relay,
    RelayPayload,
};
use crate::session::{
    FailureReason, Platform, RecordingSession, SessionId, SessionState, StartRequest,
    TranscriptLog, TranscriptLogEntry,
};
use crate::stream::{
    InboundEnvelope, MeetingEventKind, StreamEvent, StreamSessionContext, StreamingHandle,
};

const COMMAND_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// How long to wait for `CAPTURE_STARTED` after launching the agent.
    pub selection_timeout: Duration,
    /// How long `Flushing` may wait for a completion signal before the stop
    /// is force-completed. Independent of the agent's own flush timeout.
    pub processing_timeout: Duration,
    /// How many times late audio or a processing-status message may push the
    /// processing deadline back. Bounded to avoid unbounded stalls.
    pub max_deadline_extensions: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            selection_timeout: Duration::from_secs(60),
            processing_timeout: Duration::from_secs(10),
            max_deadline_extensions: 3,
        }
    }
}

/// Point-in-time view of the current session for status rendering.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub state: SessionState,
    pub platform: Platform,
    pub meeting_url: String,
    pub participant_count: usize,
    pub chunks_forwarded: usize,
}

/// Status surface for the (out-of-scope) control panel.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged {
        session_id: SessionId,
        state: SessionState,
    },
    TranscriptAppended(TranscriptLogEntry),
    /// The streaming client exhausted its retry budget; recording continues
    /// without streaming.
    StreamDegraded,
}

enum SessionCommand {
    Start {
        request: StartRequest,
        reply: oneshot::Sender<Result<SessionId>>,
    },
    Stop,
    Snapshot {
        reply: oneshot::Sender<Option<SessionSnapshot>>,
    },
    Transcript {
        reply: oneshot::Sender<Vec<TranscriptLogEntry>>,
    },
    ExportTranscript {
        reply: oneshot::Sender<String>,
    },
}

#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl ControllerHandle {
    pub async fn start(&self, request: StartRequest) -> Result<SessionId> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Start { request, reply })
            .await
            .map_err(|_| anyhow!("recorder controller is gone"))?;
        rx.await.context("recorder controller dropped the request")?
    }

    pub async fn stop(&self) {
        let _ = self.tx.send(SessionCommand::Stop).await;
    }

    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Snapshot { reply })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    pub async fn transcript(&self) -> Vec<TranscriptLogEntry> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(SessionCommand::Transcript { reply })
            .await
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn export_transcript(&self) -> String {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(SessionCommand::ExportTranscript { reply })
            .await
            .is_err()
        {
            return String::new();
        }
        rx.await.unwrap_or_default()
    }
}

enum Tick {
    Command(Option<SessionCommand>),
    Relay(Option<Delivery>),
    Stream(Option<StreamEvent>),
    Deadline,
}

pub struct RecorderController {
    config: ControllerConfig,
    context_id: ContextId,
    relay: Relay,
    mailbox: mpsc::Receiver<Delivery>,
    commands: mpsc::Receiver<SessionCommand>,
    stream: StreamingHandle,
    stream_events: mpsc::Receiver<StreamEvent>,
    launcher: Box<dyn ContextLauncher>,
    sink: Arc<dyn SessionSink>,
    events: mpsc::Sender<SessionEvent>,
    transcript: TranscriptLog,
    session: Option<RecordingSession>,
}

impl RecorderController {
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        config: ControllerConfig,
        relay: Relay,
        stream: StreamingHandle,
        stream_events: mpsc::Receiver<StreamEvent>,
        launcher: Box<dyn ContextLauncher>,
        sink: Arc<dyn SessionSink>,
        events: mpsc::Sender<SessionEvent>,
    ) -> (ControllerHandle, Self) {
        let (context_id, mailbox) = relay.register().await;
        let (tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        info!(context = %context_id, "recorder controller registered");
        let controller = Self {
            config,
            context_id,
            relay,
            mailbox,
            commands,
            stream,
            stream_events,
            launcher,
            sink,
            events,
            transcript: TranscriptLog::new(),
            session: None,
        };
        (ControllerHandle { tx }, controller)
    }

    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    pub async fn run(mut self) {
        loop {
            let deadline = self.session.as_ref().and_then(|s| s.deadline);
            let tick = match deadline {
                Some(deadline) => tokio::select! {
                    command = self.commands.recv() => Tick::Command(command),
                    delivery = self.mailbox.recv() => Tick::Relay(delivery),
                    event = self.stream_events.recv() => Tick::Stream(event),
                    _ = sleep_until(deadline) => Tick::Deadline,
                },
                None => tokio::select! {
                    command = self.commands.recv() => Tick::Command(command),
                    delivery = self.mailbox.recv() => Tick::Relay(delivery),
                    event = self.stream_events.recv() => Tick::Stream(event),
                },
            };

            match tick {
                Tick::Command(None) => break,
                Tick::Command(Some(command)) => self.handle_command(command).await,
                Tick::Relay(None) => break,
                Tick::Relay(Some(delivery)) => self.handle_delivery(delivery).await,
                Tick::Stream(None) => {
                    warn!("streaming client event channel closed");
                    break;
                }
                Tick::Stream(Some(event)) => self.handle_stream_event(event).await,
                Tick::Deadline => self.handle_deadline().await,
            }
        }
        self.relay.unregister(self.context_id).await;
        debug!("recorder controller task finished");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start { request, reply } => {
                let result = self.handle_start(request).await;
                let _ = reply.send(result);
            }
            SessionCommand::Stop => self.handle_stop().await,
            SessionCommand::Snapshot { reply } => {
                let snapshot = self.session.as_ref().map(|s| SessionSnapshot {
                    id: s.id,
                    state: s.state,
                    platform: s.platform,
                    meeting_url: s.meeting_url.clone(),
                    participant_count: s.participants.len(),
                    chunks_forwarded: s.chunks_forwarded(),
                });
                let _ = reply.send(snapshot);
            }
            SessionCommand::Transcript { reply } => {
                let _ = reply.send(self.transcript.entries().to_vec());
            }
            SessionCommand::ExportTranscript { reply } => {
                let _ = reply.send(self.transcript.export_text());
            }
        }
    }

    async fn handle_start(&mut self, request: StartRequest) -> Result<SessionId> {
        if let Some(session) = &self.session {
            if session.state.is_live() {
                return Err(anyhow!(
                    "a capture session is already in progress ({})",
                    session.state.label()
                ));
            }
        }

        self.transcript.clear();
        let mut session = RecordingSession::new(request);
        let id = session.id;
        info!(session = %id, platform = %session.platform, "starting recording session");

        self.stream
            .session_started(StreamSessionContext {
                session_id: id,
                platform: session.platform,
                meeting_url: session.meeting_url.clone(),
                participants: session.participants.clone(),
            })
            .await;

        let target = CaptureTarget {
            platform: session.platform,
            meeting_url: session.meeting_url.clone(),
        };

        match self.launcher.launch(self.context_id, target).await {
            Ok(agent_id) => {
                session.agent_context_id = Some(agent_id);
                session.deadline = Some(Instant::now() + self.config.selection_timeout);
                self.session = Some(session);
                self.set_state(SessionState::AwaitingCaptureSelection).await;
                Ok(id)
            }
            Err(e) => {
                error!(error = %e, "failed to create capture agent context");
                self.session = Some(session);
                self.set_state(SessionState::Failed {
                    reason: FailureReason::AgentCreationFailed,
                })
                .await;
                Err(e.context("failed to create capture agent context"))
            }
        }
    }

    async fn handle_stop(&mut self) {
        let Some(session) = self.session.as_mut() else {
            warn!("stop requested with no session");
            return;
        };

        match session.state {
            SessionState::Recording | SessionState::AwaitingCaptureSelection => {
                let was_recording = session.state == SessionState::Recording;
                let agent = session.agent_context_id;
                session.extensions_used = 0;
                session.deadline = Some(Instant::now() + self.config.processing_timeout);
                info!(session = %session.id, "stop requested, entering flush");

                if was_recording {
                    self.stream.meeting_event(MeetingEventKind::Ended).await;
                }
                self.stream.begin_shutdown().await;

                if let Some(agent) = agent {
                    if let Err(e) = self
                        .relay
                        .send(
                            self.context_id,
                            agent,
                            RelayPayload::ToAgent(ControllerMessage::FlushAndStopRecording),
                        )
                        .await
                    {
                        // Non-fatal: the processing timeout guarantees the
                        // stop completes even if the agent never hears us.
                        debug!(error = %e, "agent unreachable on stop");
                    }
                }

                self.set_state(SessionState::Flushing).await;
            }
            _ => warn!(state = session.state.label(), "stop requested in invalid state"),
        }
    }

    async fn handle_delivery(&mut self, delivery: Delivery) {
        let RelayPayload::ToController(message) = delivery.payload else {
            debug!("ignoring misrouted agent-bound payload");
            return;
        };

        match message {
            AgentMessage::CaptureStarted => self.handle_capture_started().await,
            AgentMessage::CaptureFailed { reason, detail } => {
                self.handle_capture_failed(reason, detail).await;
            }
            AgentMessage::AudioData { chunk } => {
                self.handle_audio_data(delivery.from, chunk).await;
            }
            AgentMessage::AudioFlushComplete {
                timed_out,
                chunks_remaining,
            } => {
                self.handle_flush_complete(timed_out, chunks_remaining).await;
            }
            AgentMessage::CaptureStopped => {
                debug!("capture agent finished teardown");
            }
            AgentMessage::StatusResponse {
                recording,
                pending_chunks,
                chunks_produced,
            } => {
                debug!(recording, pending_chunks, chunks_produced, "agent status");
            }
        }
    }

    async fn handle_capture_started(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.state != SessionState::AwaitingCaptureSelection {
            debug!(state = session.state.label(), "ignoring late CAPTURE_STARTED");
            return;
        }

        session.deadline = None;
        let record = SessionStartRecord {
            session_id: session.id,
            platform: session.platform,
            meeting_url: session.meeting_url.clone(),
            started_at: session.started_at,
            participants: session.participants.clone(),
        };
        self.set_state(SessionState::Recording).await;
        self.sink.session_started(record).await;
        self.stream.meeting_event(MeetingEventKind::Started).await;
    }

    async fn handle_capture_failed(&mut self, reason: CaptureFailureReason, detail: String) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.state.is_terminal() {
            return;
        }

        error!(?reason, detail, "capture failed");
        let failure = match reason {
            CaptureFailureReason::NoAudioTrack => FailureReason::NoAudioTrack,
            _ => FailureReason::CaptureFailed,
        };
        self.set_state(SessionState::Failed { reason: failure }).await;
    }

    /// Forward a chunk to the streaming client (once) and acknowledge it to
    /// the agent. Late chunks arriving after `Flushing` begins are still
    /// genuinely captured audio and are forwarded too. Chunk ids restart at
    /// zero for every agent, so anything not from the current session's agent
    /// context is dropped before it can shadow a live chunk.
    async fn handle_audio_data(&mut self, from: ContextId, chunk: AudioChunk) {
        let Some(session) = self.session.as_mut() else {
            debug!(chunk = %chunk.chunk_id, "audio data with no session, dropping");
            return;
        };

        if session.agent_context_id != Some(from) {
            debug!(
                chunk = %chunk.chunk_id,
                from = %from,
                "audio data from a foreign context, dropping"
            );
            return;
        }

        match session.state {
            SessionState::Recording | SessionState::Flushing => {
                let chunk_id = chunk.chunk_id;
                if session.mark_forwarded(chunk_id) {
                    self.stream.send_chunk(chunk).await;
                } else {
                    debug!(chunk = %chunk_id, "duplicate chunk, not forwarding");
                }

                if let Err(e) = self
                    .relay
                    .send(
                        self.context_id,
                        from,
                        RelayPayload::ToAgent(ControllerMessage::ChunkProcessed { chunk_id }),
                    )
                    .await
                {
                    debug!(error = %e, "could not acknowledge chunk");
                }

                self.try_extend_processing_deadline();
            }
            _ => {
                debug!(
                    state = session.state.label(),
                    chunk = %chunk.chunk_id,
                    "audio data in unexpected state, dropping"
                );
            }
        }
    }

    async fn handle_flush_complete(&mut self, timed_out: bool, chunks_remaining: usize) {
        let Some(session) = self.session.as_ref() else {
            return;
        };

        match session.state {
            SessionState::Flushing => {
                self.complete_stop(timed_out || chunks_remaining > 0).await;
            }
            SessionState::Recording => {
                // The track ended upstream and the agent flushed on its own.
                info!("agent flushed without a stop request (track ended)");
                self.stream.meeting_event(MeetingEventKind::Ended).await;
                self.stream.begin_shutdown().await;
                self.complete_stop(timed_out || chunks_remaining > 0).await;
            }
            _ => debug!(
                state = session.state.label(),
                "ignoring flush completion in terminal state"
            ),
        }
    }

    async fn handle_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Envelope(envelope) => self.handle_envelope(envelope).await,
            StreamEvent::Degraded => {
                warn!("streaming degraded; recording continues without streaming");
                self.emit(SessionEvent::StreamDegraded).await;
            }
        }
    }

    async fn handle_envelope(&mut self, envelope: InboundEnvelope) {
        match envelope {
            InboundEnvelope::TranscriptionResult { data } => {
                let Some(session) = self.session.as_ref() else {
                    debug!("transcription result with no session, dropping");
                    return;
                };
                let entry = TranscriptLogEntry {
                    timestamp: chrono::Utc::now(),
                    text: data.text,
                    session_id: session.id,
                };
                self.transcript.append(entry.clone());
                self.emit(SessionEvent::TranscriptAppended(entry)).await;
            }
            InboundEnvelope::ProcessingStatus { data } => {
                debug!(message = data.message, "processing status");
                self.try_extend_processing_deadline();
            }
            InboundEnvelope::ProcessingComplete { timeout } => {
                if self
                    .session
                    .as_ref()
                    .is_some_and(|s| s.state == SessionState::Flushing)
                {
                    info!(timeout, "remote processing complete");
                    self.complete_stop(timeout).await;
                }
            }
            InboundEnvelope::MeetingUpdate { data } => {
                if let Some(session) = self.session.as_mut() {
                    session.participants = data.participants.clone();
                    self.stream.update_participants(data.participants).await;
                }
            }
            InboundEnvelope::Unknown => debug!("ignoring unknown envelope"),
        }
    }

    /// Exactly one of these resolves each waiting state; a fire after the
    /// awaited event already happened is ignored by the state guards.
    async fn handle_deadline(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.deadline = None;

        match session.state {
            SessionState::AwaitingCaptureSelection => {
                error!("capture selection timed out");
                self.set_state(SessionState::Failed {
                    reason: FailureReason::CaptureTimeout,
                })
                .await;
            }
            SessionState::Flushing => {
                warn!("processing timeout elapsed, forcing stop completion");
                self.complete_stop(true).await;
            }
            state => debug!(state = state.label(), "stale deadline, ignoring"),
        }
    }

    async fn complete_stop(&mut self, partial: bool) {
        if partial {
            warn!("recording may be incomplete");
        }
        self.set_state(SessionState::Stopped { partial }).await;
    }

    fn try_extend_processing_deadline(&mut self) {
        let max = self.config.max_deadline_extensions;
        let timeout = self.config.processing_timeout;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.state != SessionState::Flushing {
            return;
        }
        if session.extensions_used >= max {
            debug!("deadline extension budget exhausted");
            return;
        }
        session.extensions_used += 1;
        session.deadline = Some(Instant::now() + timeout);
        debug!(
            extensions = session.extensions_used,
            "processing deadline extended"
        );
    }

    async fn set_state(&mut self, state: SessionState) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.state = state;
        let mut stale_agent = None;
        if state.is_terminal() {
            session.deadline = None;
            stale_agent = session.agent_context_id.take();
        }
        let session_id = session.id;

        // An agent still waiting on its grant when the session ends would
        // otherwise record unattended once the grant resolves.
        if let Some(agent) = stale_agent {
            if let Err(e) = self
                .relay
                .send(
                    self.context_id,
                    agent,
                    RelayPayload::ToAgent(ControllerMessage::FlushAndStopRecording),
                )
                .await
            {
                debug!(error = %e, "agent already gone at session end");
            }
        }

        info!(session = %session_id, state = state.label(), "session state changed");
        self.emit(SessionEvent::StateChanged { session_id, state }).await;
    }

    async fn emit(&self, event: SessionEvent) {
        if self.events.send(event).await.is_err() {
            debug!("no session event listener");
        }
    }
}
