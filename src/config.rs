use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::agent::AgentConfig;
use crate::controller::ControllerConfig;
use crate::stream::StreamingConfig;

/// All timeout durations live here rather than as literals in the code; the
/// useful values are deployment-specific.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub stream: StreamSettings,
    pub capture: CaptureSettings,
    pub session: SessionSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamSettings {
    /// WebSocket endpoint of the transcription service.
    pub url: String,
    pub connect_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    pub send_retry_delay_ms: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_interval_ms: u64,
    pub flush_timeout_ms: u64,
    /// Directory for the optional local WAV export; disabled when unset.
    pub export_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    pub selection_timeout_ms: u64,
    pub processing_timeout_ms: u64,
    pub max_deadline_extensions: u32,
}

impl Config {
    /// Load configuration from a named file, falling back to defaults for
    /// anything the file does not set. A missing file yields pure defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("stream.url", "ws://localhost:8089/stream")?
            .set_default("stream.connect_timeout_ms", 10_000i64)?
            .set_default("stream.reconnect_delay_ms", 2_000i64)?
            .set_default("stream.send_retry_delay_ms", 500i64)?
            .set_default("stream.max_retries", 5i64)?
            .set_default("capture.sample_rate", 16_000i64)?
            .set_default("capture.channels", 1i64)?
            .set_default("capture.chunk_interval_ms", 1_000i64)?
            .set_default("capture.flush_timeout_ms", 5_000i64)?
            .set_default("session.selection_timeout_ms", 60_000i64)?
            .set_default("session.processing_timeout_ms", 10_000i64)?
            .set_default("session.max_deadline_extensions", 3i64)?
            .add_source(config::File::with_name(path).required(false))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn streaming(&self) -> StreamingConfig {
        StreamingConfig {
            reconnect_delay: Duration::from_millis(self.stream.reconnect_delay_ms),
            send_retry_delay: Duration::from_millis(self.stream.send_retry_delay_ms),
            max_retries: self.stream.max_retries,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.stream.connect_timeout_ms)
    }

    pub fn agent(&self) -> AgentConfig {
        AgentConfig {
            chunk_interval: Duration::from_millis(self.capture.chunk_interval_ms),
            flush_timeout: Duration::from_millis(self.capture.flush_timeout_ms),
            sample_rate: self.capture.sample_rate,
            channels: self.capture.channels,
            export_dir: self.capture.export_dir.clone(),
        }
    }

    pub fn controller(&self) -> ControllerConfig {
        ControllerConfig {
            selection_timeout: Duration::from_millis(self.session.selection_timeout_ms),
            processing_timeout: Duration::from_millis(self.session.processing_timeout_ms),
            max_deadline_extensions: self.session.max_deadline_extensions,
        }
    }
}
