pub mod session;
pub mod state;
pub mod transcript;

pub use session::{RecordingSession, StartRequest};
pub use state::{FailureReason, SessionState};
pub use transcript::{TranscriptLog, TranscriptLogEntry};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque, globally unique id for one meeting recording attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Supported call platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    GoogleMeet,
    Zoom,
    Teams,
    Webex,
    Unknown,
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google-meet" | "meet" => Ok(Self::GoogleMeet),
            "zoom" => Ok(Self::Zoom),
            "teams" => Ok(Self::Teams),
            "webex" => Ok(Self::Webex),
            "unknown" => Ok(Self::Unknown),
            other => anyhow::bail!("unsupported platform: {other}"),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GoogleMeet => "google-meet",
            Self::Zoom => "zoom",
            Self::Teams => "teams",
            Self::Webex => "webex",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// One entry of the participant roster, as detected by the (out-of-scope)
/// presence scraper and refreshed by `MEETING_UPDATE` envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub is_host: bool,
    pub join_time: chrono::DateTime<chrono::Utc>,
}
