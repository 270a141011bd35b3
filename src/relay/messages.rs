use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ContextId;

/// Identifier minted by the capture agent for each produced chunk.
/// Monotonic per agent; acknowledgements and the forward-once guard key on it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChunkId(pub u64);

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk-{}", self.0)
    }
}

/// A unit of captured audio. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioChunk {
    pub chunk_id: ChunkId,
    /// PCM16 little-endian samples.
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    pub captured_at: DateTime<Utc>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioChunk {
    /// Number of samples encoded in the payload.
    pub fn sample_count(&self) -> usize {
        self.payload.len() / 2
    }
}

/// Why a capture grant could not be turned into a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureFailureReason {
    PermissionDenied,
    NoAudioTrack,
    SourceUnavailable,
}

/// Messages the capture agent sends to the recorder controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentMessage {
    /// The user granted capture and the pipeline is producing chunks.
    CaptureStarted,
    CaptureFailed {
        reason: CaptureFailureReason,
        detail: String,
    },
    /// Informational: the agent finished its teardown.
    CaptureStopped,
    AudioData {
        chunk: AudioChunk,
    },
    /// Emitted once the pending set drained or the flush timeout fired.
    AudioFlushComplete {
        timed_out: bool,
        chunks_remaining: usize,
    },
    StatusResponse {
        recording: bool,
        pending_chunks: usize,
        chunks_produced: u64,
    },
}

/// Messages the recorder controller sends to the capture agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControllerMessage {
    /// Stop producing chunks, drain unacknowledged ones, then tear down.
    FlushAndStopRecording,
    /// The chunk with this id was forwarded to the streaming client.
    ChunkProcessed { chunk_id: ChunkId },
    StatusRequest,
}

/// Direction-tagged relay payload. The relay itself never matches on this;
/// receivers ignore payloads addressed to the other role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel")]
pub enum RelayPayload {
    #[serde(rename = "CONTROLLER_TO_AGENT")]
    ToAgent(ControllerMessage),
    #[serde(rename = "AGENT_TO_CONTROLLER")]
    ToController(AgentMessage),
}

/// What lands in a context's mailbox.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub from: ContextId,
    pub payload: RelayPayload,
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}
