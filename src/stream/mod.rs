pub mod client;
pub mod envelope;
pub mod transport;

pub use client::{
    ConnectionState, ConnectionStatus, StreamEvent, StreamSessionContext, StreamingClient,
    StreamingConfig, StreamingHandle,
};
pub use envelope::{
    AudioMetadata, InboundEnvelope, MeetingEventData, MeetingEventKind, MeetingUpdatePayload,
    OutboundEnvelope, ProcessingStatusPayload, TranscriptionPayload,
};
pub use transport::{StreamConnection, StreamError, StreamTransport, WsTransport};
