use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::agent::{AgentConfig, CaptureAgent, CaptureSource, CaptureTarget};
use crate::relay::{ContextId, Relay};
use crate::session::{Participant, Platform, SessionId};

/// Materializes a capture agent context on behalf of the controller. The
/// controller never constructs agents itself; it receives this seam at
/// construction so the platform glue stays out of the state machine.
#[async_trait]
pub trait ContextLauncher: Send + Sync {
    async fn launch(&self, controller: ContextId, target: CaptureTarget) -> Result<ContextId>;
}

/// What the persistence collaborator is told when a recording begins.
#[derive(Debug, Clone)]
pub struct SessionStartRecord {
    pub session_id: SessionId,
    pub platform: Platform,
    pub meeting_url: String,
    pub started_at: DateTime<Utc>,
    pub participants: Vec<Participant>,
}

/// Out-of-scope persistence collaborator, interface only.
#[async_trait]
pub trait SessionSink: Send + Sync {
    async fn session_started(&self, record: SessionStartRecord);
}

/// Default sink that only logs.
pub struct NoopSessionSink;

#[async_trait]
impl SessionSink for NoopSessionSink {
    async fn session_started(&self, record: SessionStartRecord) {
        debug!(
            session = %record.session_id,
            participants = record.participants.len(),
            "session start recorded (noop sink)"
        );
    }
}

type SourceFactory = Box<dyn Fn() -> Box<dyn CaptureSource> + Send + Sync>;

/// Standard launcher: registers a fresh context with the relay and spawns a
/// `CaptureAgent` task on it.
pub struct AgentLauncher {
    relay: Relay,
    config: AgentConfig,
    sources: SourceFactory,
}

impl AgentLauncher {
    pub fn new(relay: Relay, config: AgentConfig, sources: SourceFactory) -> Self {
        Self {
            relay,
            config,
            sources,
        }
    }
}

#[async_trait]
impl ContextLauncher for AgentLauncher {
    async fn launch(&self, controller: ContextId, target: CaptureTarget) -> Result<ContextId> {
        let (agent_id, mailbox) = self.relay.register().await;
        let agent = CaptureAgent::new(
            self.config.clone(),
            agent_id,
            controller,
            self.relay.clone(),
            mailbox,
            (self.sources)(),
            target,
        );
        tokio::spawn(agent.run());
        info!(context = %agent_id, "capture agent context created");
        Ok(agent_id)
    }
}
