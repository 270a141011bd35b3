use serde::{Deserialize, Serialize};

/// Why a session ended up in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The capture agent context could not be materialized.
    AgentCreationFailed,
    /// The user denied the grant or capture could not start.
    CaptureFailed,
    /// No `CAPTURE_STARTED` arrived within the selection timeout.
    CaptureTimeout,
    /// The granted stream carried no audio track.
    NoAudioTrack,
}

/// Session lifecycle. `Failed` is an absorbing state reachable from any
/// non-terminal state; `Stopped` records whether completion was forced by a
/// timeout (audio possibly incomplete).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SessionState {
    Idle,
    AwaitingCaptureSelection,
    Recording,
    Flushing,
    Stopped { partial: bool },
    Failed { reason: FailureReason },
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped { .. } | Self::Failed { .. })
    }

    /// A new capture request may not be issued while a session is live.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            Self::AwaitingCaptureSelection | Self::Recording | Self::Flushing
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingCaptureSelection => "awaiting_capture_selection",
            Self::Recording => "recording",
            Self::Flushing => "flushing",
            Self::Stopped { .. } => "stopped",
            Self::Failed { .. } => "failed",
        }
    }
}
