use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tokio::time::Instant;

use super::state::SessionState;
use super::{Participant, Platform, SessionId};
use crate::relay::{ChunkId, ContextId};

/// Everything the controller needs to start a session. The participant
/// snapshot comes from the upstream presence detector.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub platform: Platform,
    pub meeting_url: String,
    pub participants: Vec<Participant>,
}

/// One meeting recording attempt. Owned exclusively by the recorder
/// controller and mutated only by its state machine.
#[derive(Debug)]
pub struct RecordingSession {
    pub id: SessionId,
    pub platform: Platform,
    pub meeting_url: String,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub participants: Vec<Participant>,
    /// Handle to the capture agent context, None until created.
    pub agent_context_id: Option<ContextId>,
    /// Chunk ids already forwarded to the streaming client. Forwarding is
    /// idempotent: a chunk relayed twice goes out once.
    forwarded: HashSet<ChunkId>,
    /// Active selection or processing deadline, if any.
    pub(crate) deadline: Option<Instant>,
    /// How often the processing deadline has been pushed back.
    pub(crate) extensions_used: u32,
}

impl RecordingSession {
    pub fn new(request: StartRequest) -> Self {
        Self {
            id: SessionId::new(),
            platform: request.platform,
            meeting_url: request.meeting_url,
            state: SessionState::Idle,
            started_at: Utc::now(),
            participants: request.participants,
            agent_context_id: None,
            forwarded: HashSet::new(),
            deadline: None,
            extensions_used: 0,
        }
    }

    /// Record that a chunk was forwarded. Returns false if it already was.
    pub fn mark_forwarded(&mut self, chunk_id: ChunkId) -> bool {
        self.forwarded.insert(chunk_id)
    }

    pub fn chunks_forwarded(&self) -> usize {
        self.forwarded.len()
    }
}
