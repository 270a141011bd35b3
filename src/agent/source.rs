//! Capture grant seam. The agent runs in its own context precisely because
//! the platform forbids a context from capturing its own output; the grant it
//! requests is always scoped to the *meeting* context.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::relay::CaptureFailureReason;
use crate::session::Platform;

/// Audio sample data (16-bit PCM, interleaved).
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Milliseconds since capture started.
    pub timestamp_ms: u64,
}

/// The context whose output the grant covers.
#[derive(Debug, Clone)]
pub struct CaptureTarget {
    pub platform: Platform,
    pub meeting_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// One track of a granted media stream. Video tracks carry no frames here;
/// the agent discards them immediately.
pub struct MediaTrack {
    kind: TrackKind,
    label: String,
    frames: Option<mpsc::Receiver<AudioFrame>>,
}

impl MediaTrack {
    pub fn audio(label: impl Into<String>, frames: mpsc::Receiver<AudioFrame>) -> Self {
        Self {
            kind: TrackKind::Audio,
            label: label.into(),
            frames: Some(frames),
        }
    }

    pub fn video(label: impl Into<String>) -> Self {
        Self {
            kind: TrackKind::Video,
            label: label.into(),
            frames: None,
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Frame receiver; closes when the track ends.
    pub fn into_frames(self) -> Option<mpsc::Receiver<AudioFrame>> {
        self.frames
    }
}

pub struct GrantedMedia {
    pub tracks: Vec<MediaTrack>,
}

#[derive(Debug, Error)]
pub enum GrantError {
    #[error("capture permission denied by the user")]
    PermissionDenied,
    #[error("granted stream has no audio track")]
    NoAudioTrack,
    #[error("capture source unavailable: {0}")]
    SourceUnavailable(String),
}

impl GrantError {
    pub fn reason(&self) -> CaptureFailureReason {
        match self {
            Self::PermissionDenied => CaptureFailureReason::PermissionDenied,
            Self::NoAudioTrack => CaptureFailureReason::NoAudioTrack,
            Self::SourceUnavailable(_) => CaptureFailureReason::SourceUnavailable,
        }
    }
}

/// A user-mediated capture grant provider.
#[async_trait]
pub trait CaptureSource: Send {
    async fn request_grant(&mut self, target: &CaptureTarget) -> Result<GrantedMedia, GrantError>;
}

/// Synthetic sine-tone source for demos and tests. Grants one video track
/// (exercising the discard path) and one audio track that produces frames
/// until the receiver is dropped.
pub struct SyntheticCaptureSource {
    pub sample_rate: u32,
    pub frequency: f32,
    pub frame_duration: Duration,
}

impl Default for SyntheticCaptureSource {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frequency: 440.0,
            frame_duration: Duration::from_millis(100),
        }
    }
}

#[async_trait]
impl CaptureSource for SyntheticCaptureSource {
    async fn request_grant(&mut self, target: &CaptureTarget) -> Result<GrantedMedia, GrantError> {
        debug!(
            platform = %target.platform,
            meeting_url = %target.meeting_url,
            "granting synthetic capture"
        );

        let (tx, rx) = mpsc::channel(32);
        let sample_rate = self.sample_rate;
        let frequency = self.frequency;
        let frame_duration = self.frame_duration;

        tokio::spawn(async move {
            let samples_per_frame =
                (sample_rate as u64 * frame_duration.as_millis() as u64 / 1000) as usize;
            let mut ticker = tokio::time::interval(frame_duration);
            let mut elapsed_ms = 0u64;
            let mut phase = 0usize;

            loop {
                ticker.tick().await;
                let samples: Vec<i16> = (0..samples_per_frame)
                    .map(|i| {
                        let t = (phase + i) as f32 / sample_rate as f32;
                        let value = (t * frequency * 2.0 * std::f32::consts::PI).sin();
                        (value * 0.3 * i16::MAX as f32) as i16
                    })
                    .collect();
                phase += samples_per_frame;

                let frame = AudioFrame {
                    samples,
                    sample_rate,
                    channels: 1,
                    timestamp_ms: elapsed_ms,
                };
                elapsed_ms += frame_duration.as_millis() as u64;

                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        Ok(GrantedMedia {
            tracks: vec![
                MediaTrack::video("synthetic-video"),
                MediaTrack::audio("synthetic-tone", rx),
            ],
        })
    }
}
