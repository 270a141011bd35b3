//! The capture agent context. Owns the raw audio pipeline: turns a
//! user-granted stream into a sequence of chunks and guarantees none are
//! silently lost when the recording stops.

pub mod chunker;
pub mod export;
pub mod source;

pub use chunker::ChunkAssembler;
pub use source::{
    AudioFrame, CaptureSource, CaptureTarget, GrantError, GrantedMedia, MediaTrack,
    SyntheticCaptureSource, TrackKind,
};

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::relay::{
    AgentMessage, ChunkId, ContextId, ControllerMessage, Delivery, Relay, RelayPayload,
};

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Cadence at which accumulated samples are cut into chunks.
    pub chunk_interval: Duration,
    /// How long to wait for outstanding acknowledgements on stop.
    pub flush_timeout: Duration,
    pub sample_rate: u32,
    pub channels: u16,
    /// When set, the raw-sample accumulator is written here as WAV on stop.
    pub export_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            chunk_interval: Duration::from_secs(1),
            flush_timeout: Duration::from_secs(5),
            sample_rate: 16_000,
            channels: 1,
            export_dir: None,
        }
    }
}

enum StopReason {
    /// `FLUSH_AND_STOP_RECORDING` arrived from the controller.
    Requested,
    /// The captured track ended; treated as an implicit stop request.
    TrackEnded,
    RelayGone,
}

pub struct CaptureAgent {
    config: AgentConfig,
    context_id: ContextId,
    controller_id: ContextId,
    relay: Relay,
    mailbox: mpsc::Receiver<Delivery>,
    source: Box<dyn CaptureSource>,
    target: CaptureTarget,
    assembler: ChunkAssembler,
    /// Chunks handed to the relay whose `CHUNK_PROCESSED` has not arrived.
    pending: HashSet<ChunkId>,
    /// Raw samples kept for the optional local WAV export.
    export_samples: Vec<i16>,
    chunks_produced: u64,
}

impl CaptureAgent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AgentConfig,
        context_id: ContextId,
        controller_id: ContextId,
        relay: Relay,
        mailbox: mpsc::Receiver<Delivery>,
        source: Box<dyn CaptureSource>,
        target: CaptureTarget,
    ) -> Self {
        let assembler = ChunkAssembler::new(config.sample_rate, config.channels);
        Self {
            config,
            context_id,
            controller_id,
            relay,
            mailbox,
            source,
            target,
            assembler,
            pending: HashSet::new(),
            export_samples: Vec::new(),
            chunks_produced: 0,
        }
    }

    pub async fn run(mut self) {
        info!(context = %self.context_id, "capture agent starting");

        let media = match self.source.request_grant(&self.target).await {
            Ok(media) => media,
            Err(e) => {
                warn!(error = %e, "capture grant failed");
                self.send_to_controller(AgentMessage::CaptureFailed {
                    reason: e.reason(),
                    detail: e.to_string(),
                })
                .await;
                self.relay.unregister(self.context_id).await;
                return;
            }
        };

        // Video is discarded on the spot; only the first audio track is used.
        let mut frames = None;
        for track in media.tracks {
            match track.kind() {
                TrackKind::Video => {
                    debug!(label = track.label(), "discarding video track");
                }
                TrackKind::Audio if frames.is_none() => {
                    debug!(label = track.label(), "using audio track");
                    frames = track.into_frames();
                }
                TrackKind::Audio => {
                    debug!(label = track.label(), "ignoring extra audio track");
                }
            }
        }

        let Some(mut frames) = frames else {
            warn!("granted stream has no audio track");
            self.send_to_controller(AgentMessage::CaptureFailed {
                reason: GrantError::NoAudioTrack.reason(),
                detail: GrantError::NoAudioTrack.to_string(),
            })
            .await;
            self.relay.unregister(self.context_id).await;
            return;
        };

        self.send_to_controller(AgentMessage::CaptureStarted).await;
        info!("capture started, producing chunks");

        let mut cadence = tokio::time::interval(self.config.chunk_interval);
        cadence.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Some(frame) => {
                        let samples = self.assembler.normalize(frame);
                        if self.config.export_dir.is_some() {
                            self.export_samples.extend_from_slice(&samples);
                        }
                        self.assembler.extend(&samples);
                    }
                    None => break StopReason::TrackEnded,
                },
                _ = cadence.tick() => self.emit_chunk().await,
                delivery = self.mailbox.recv() => match delivery {
                    Some(delivery) => {
                        if let Some(reason) = self.handle_delivery(delivery).await {
                            break reason;
                        }
                    }
                    None => break StopReason::RelayGone,
                },
            }
        };

        // Dropping the receiver releases the capture grant.
        drop(frames);
        self.flush(reason).await;
    }

    async fn handle_delivery(&mut self, delivery: Delivery) -> Option<StopReason> {
        match delivery.payload {
            RelayPayload::ToAgent(ControllerMessage::FlushAndStopRecording) => {
                Some(StopReason::Requested)
            }
            RelayPayload::ToAgent(ControllerMessage::ChunkProcessed { chunk_id }) => {
                // Removing an absent id is a no-op, so duplicate acks cannot
                // drive the pending set below zero.
                self.pending.remove(&chunk_id);
                None
            }
            RelayPayload::ToAgent(ControllerMessage::StatusRequest) => {
                self.send_to_controller(AgentMessage::StatusResponse {
                    recording: true,
                    pending_chunks: self.pending.len(),
                    chunks_produced: self.chunks_produced,
                })
                .await;
                None
            }
            RelayPayload::ToController(_) => {
                debug!("ignoring misrouted controller-bound payload");
                None
            }
        }
    }

    async fn emit_chunk(&mut self) {
        let Some(chunk) = self.assembler.cut() else {
            return;
        };

        self.chunks_produced += 1;
        // Tracked before sending: if the relay drops the chunk, the flush
        // accounting still knows it was never acknowledged.
        self.pending.insert(chunk.chunk_id);

        debug!(
            chunk = %chunk.chunk_id,
            samples = chunk.sample_count(),
            "chunk emitted"
        );
        self.send_to_controller(AgentMessage::AudioData { chunk }).await;
    }

    /// Drain unacknowledged chunks under the flush timeout, report the
    /// outcome, then tear down. Runs for every stop path.
    async fn flush(&mut self, reason: StopReason) {
        match reason {
            StopReason::Requested => info!("flush-and-stop requested by controller"),
            StopReason::TrackEnded => info!("captured track ended, flushing"),
            StopReason::RelayGone => warn!("relay mailbox closed, flushing"),
        }

        // The in-progress partial chunk is genuinely captured audio.
        self.emit_chunk().await;

        let deadline = Instant::now() + self.config.flush_timeout;
        let mut timed_out = false;

        while !self.pending.is_empty() {
            match timeout_at(deadline, self.mailbox.recv()).await {
                Err(_) => {
                    timed_out = true;
                    break;
                }
                Ok(None) => break,
                Ok(Some(delivery)) => {
                    if let RelayPayload::ToAgent(ControllerMessage::ChunkProcessed { chunk_id }) =
                        delivery.payload
                    {
                        self.pending.remove(&chunk_id);
                    }
                }
            }
        }

        let chunks_remaining = self.pending.len();
        if timed_out {
            warn!(chunks_remaining, "flush timed out with unacknowledged chunks");
        } else {
            info!("flush complete, all chunks acknowledged");
        }

        self.send_to_controller(AgentMessage::AudioFlushComplete {
            timed_out,
            chunks_remaining,
        })
        .await;
        self.pending.clear();

        if let Some(dir) = self.config.export_dir.clone() {
            let stem = format!("capture-{}", chrono::Utc::now().format("%Y%m%d-%H%M%S"));
            if let Err(e) = export::write_wav(
                &dir,
                &stem,
                &self.export_samples,
                self.config.sample_rate,
                self.config.channels,
            ) {
                warn!(error = %e, "local WAV export failed");
            }
        }

        self.send_to_controller(AgentMessage::CaptureStopped).await;
        self.relay.unregister(self.context_id).await;
        info!(context = %self.context_id, "capture agent finished");
    }

    async fn send_to_controller(&mut self, message: AgentMessage) {
        if let Err(e) = self
            .relay
            .send(
                self.context_id,
                self.controller_id,
                RelayPayload::ToController(message),
            )
            .await
        {
            // The controller being gone is non-fatal; keep going.
            debug!(error = %e, "relay delivery to controller failed");
        }
    }
}
