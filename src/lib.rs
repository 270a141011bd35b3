pub mod agent;
pub mod config;
pub mod controller;
pub mod relay;
pub mod session;
pub mod stream;

pub use agent::{
    AgentConfig, AudioFrame, CaptureAgent, CaptureSource, CaptureTarget, ChunkAssembler,
    GrantError, GrantedMedia, MediaTrack, SyntheticCaptureSource, TrackKind,
};
pub use config::Config;
pub use controller::{
    AgentLauncher, ContextLauncher, ControllerConfig, ControllerHandle, NoopSessionSink,
    RecorderController, SessionEvent, SessionSink, SessionSnapshot, SessionStartRecord,
};
pub use relay::{
    AgentMessage, AudioChunk, CaptureFailureReason, ChunkId, ContextId, ControllerMessage,
    Delivery, Relay, RelayError, RelayPayload,
};
pub use session::{
    FailureReason, Participant, Platform, RecordingSession, SessionId, SessionState, StartRequest,
    TranscriptLog, TranscriptLogEntry,
};
pub use stream::{
    ConnectionState, ConnectionStatus, InboundEnvelope, MeetingEventKind, OutboundEnvelope,
    StreamConnection, StreamError, StreamEvent, StreamSessionContext, StreamTransport,
    StreamingClient, StreamingConfig, StreamingHandle, WsTransport,
};
