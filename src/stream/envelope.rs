//! Envelope protocol spoken over the persistent connection to the
//! transcription service. JSON objects tagged on `type`, ISO-8601 timestamps,
//! audio payloads base64-encoded.

use serde::{Deserialize, Serialize};

use crate::session::{Participant, Platform};

/// Fixed description of the audio carried by one chunk envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioMetadata {
    pub chunk_size: usize,
    pub sample_rate: u32,
    pub channels: u16,
    pub format: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingEventKind {
    Started,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingEventData {
    pub meeting_id: String,
    pub participants: Vec<Participant>,
    pub platform: Platform,
    pub timestamp: String,
}

/// Envelopes sent to the transcription service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundEnvelope {
    #[serde(rename = "HANDSHAKE")]
    Handshake {
        client_type: String,
        platform: Platform,
        meeting_url: String,
    },
    #[serde(rename = "AUDIO_CHUNK_ENHANCED")]
    AudioChunkEnhanced {
        /// Base64-encoded PCM16-LE payload.
        data: String,
        timestamp: String,
        platform: Platform,
        meeting_url: String,
        participants: Vec<Participant>,
        participant_count: usize,
        metadata: AudioMetadata,
    },
    #[serde(rename = "MEETING_EVENT")]
    MeetingEvent {
        event_type: MeetingEventKind,
        data: MeetingEventData,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionPayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStatusPayload {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingUpdatePayload {
    pub participants: Vec<Participant>,
}

/// Envelopes received from the transcription service. Unknown types map to
/// `Unknown` and are ignored, not fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEnvelope {
    #[serde(rename = "transcription_result", alias = "TRANSCRIPTION_RESULT")]
    TranscriptionResult { data: TranscriptionPayload },
    #[serde(rename = "PROCESSING_STATUS")]
    ProcessingStatus { data: ProcessingStatusPayload },
    #[serde(rename = "PROCESSING_COMPLETE")]
    ProcessingComplete {
        #[serde(default)]
        timeout: bool,
    },
    #[serde(rename = "MEETING_UPDATE")]
    MeetingUpdate { data: MeetingUpdatePayload },
    #[serde(other)]
    Unknown,
}
