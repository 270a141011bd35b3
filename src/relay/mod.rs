pub mod messages;

pub use messages::{
    AgentMessage, AudioChunk, CaptureFailureReason, ChunkId, ControllerMessage, Delivery,
    RelayPayload,
};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Mailbox depth per registered context. Bounded so a stalled context applies
/// backpressure to its senders instead of buffering without limit.
const MAILBOX_CAPACITY: usize = 256;

/// Handle to an isolated execution context registered with the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    /// The target context no longer exists. Callers log this and move on;
    /// a missing target is often expected (the user closed the helper tab).
    #[error("target context {0} is gone")]
    TargetGone(ContextId),
}

/// Stateless fan-out between isolated contexts.
///
/// The relay delivers a payload to a named target and gives no guarantee
/// beyond best-effort, at-most-once, FIFO per sender-to-receiver pair. It
/// never inspects or transforms payloads, so the controller and the capture
/// agent can evolve their protocol without touching this code.
#[derive(Clone, Default)]
pub struct Relay {
    contexts: Arc<Mutex<HashMap<ContextId, mpsc::Sender<Delivery>>>>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new context and hand back its mailbox.
    pub async fn register(&self) -> (ContextId, mpsc::Receiver<Delivery>) {
        let id = ContextId::new();
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        self.contexts.lock().await.insert(id, tx);
        debug!(context = %id, "context registered with relay");
        (id, rx)
    }

    /// Remove a context. Deliveries addressed to it fail softly afterwards.
    pub async fn unregister(&self, id: ContextId) {
        if self.contexts.lock().await.remove(&id).is_some() {
            debug!(context = %id, "context unregistered from relay");
        }
    }

    /// Attempt delivery to `to`. A closed or unknown target surfaces as
    /// `TargetGone`, which callers must treat as non-fatal.
    pub async fn send(
        &self,
        from: ContextId,
        to: ContextId,
        payload: RelayPayload,
    ) -> Result<(), RelayError> {
        let sender = {
            let contexts = self.contexts.lock().await;
            contexts.get(&to).cloned()
        };

        let Some(sender) = sender else {
            return Err(RelayError::TargetGone(to));
        };

        if sender.send(Delivery { from, payload }).await.is_err() {
            // Receiver dropped without unregistering; clean up the stale entry.
            self.contexts.lock().await.remove(&to);
            return Err(RelayError::TargetGone(to));
        }

        Ok(())
    }
}
