//! Shared fakes for integration tests: a scripted capture source and a
//! channel-backed stream transport.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use tabcast::{
    AgentConfig, AgentLauncher, AudioFrame, CaptureSource, CaptureTarget, ContextId,
    ContextLauncher, ControllerConfig, ControllerHandle, GrantError, GrantedMedia,
    InboundEnvelope, MediaTrack, NoopSessionSink, OutboundEnvelope, Participant, Platform,
    RecorderController, Relay, SessionEvent, SessionState, StartRequest, StreamConnection,
    StreamError, StreamTransport, StreamingClient, StreamingConfig,
};

pub const TEST_SAMPLE_RATE: u32 = 16_000;

/// Always-fail marker for `TransportLog::fail_remaining`.
pub const FAIL_FOREVER: usize = usize::MAX;

// ---------------------------------------------------------------------------
// Scripted capture source

pub enum GrantScript {
    /// The user denies the grant.
    Denied,
    /// Grant succeeds but carries only a video track.
    VideoOnly,
    /// Send the given frames spaced by `gap`, then end the track.
    Frames { frames: Vec<AudioFrame>, gap: Duration },
    /// Send the frames, then keep the track open until the agent drops it.
    FramesThenHold { frames: Vec<AudioFrame>, gap: Duration },
    /// Wait before granting, then hold an idle audio track open.
    DelayedHold { delay: Duration },
}

pub struct ScriptedCaptureSource {
    script: Option<GrantScript>,
}

impl ScriptedCaptureSource {
    pub fn new(script: GrantScript) -> Self {
        Self {
            script: Some(script),
        }
    }
}

#[async_trait]
impl CaptureSource for ScriptedCaptureSource {
    async fn request_grant(&mut self, _target: &CaptureTarget) -> Result<GrantedMedia, GrantError> {
        let script = self.script.take().expect("grant requested twice");
        match script {
            GrantScript::Denied => Err(GrantError::PermissionDenied),
            GrantScript::VideoOnly => Ok(GrantedMedia {
                tracks: vec![MediaTrack::video("scripted-video")],
            }),
            GrantScript::Frames { frames, gap } => {
                let (tx, rx) = mpsc::channel(64);
                tokio::spawn(async move {
                    for frame in frames {
                        if tx.send(frame).await.is_err() {
                            return;
                        }
                        tokio::time::sleep(gap).await;
                    }
                });
                Ok(GrantedMedia {
                    tracks: vec![
                        MediaTrack::video("scripted-video"),
                        MediaTrack::audio("scripted-audio", rx),
                    ],
                })
            }
            GrantScript::FramesThenHold { frames, gap } => {
                let (tx, rx) = mpsc::channel(64);
                tokio::spawn(async move {
                    for frame in frames {
                        if tx.send(frame).await.is_err() {
                            return;
                        }
                        tokio::time::sleep(gap).await;
                    }
                    // Keep the track alive until the agent releases the grant.
                    tx.closed().await;
                });
                Ok(GrantedMedia {
                    tracks: vec![MediaTrack::audio("scripted-audio", rx)],
                })
            }
            GrantScript::DelayedHold { delay } => {
                tokio::time::sleep(delay).await;
                let (tx, rx) = mpsc::channel::<AudioFrame>(64);
                tokio::spawn(async move {
                    tx.closed().await;
                });
                Ok(GrantedMedia {
                    tracks: vec![MediaTrack::audio("scripted-audio", rx)],
                })
            }
        }
    }
}

pub fn tone_frames(count: usize, samples_per_frame: usize) -> Vec<AudioFrame> {
    (0..count)
        .map(|i| AudioFrame {
            samples: vec![(i as i16 + 1) * 100; samples_per_frame],
            sample_rate: TEST_SAMPLE_RATE,
            channels: 1,
            timestamp_ms: (i * 100) as u64,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Channel-backed stream transport

pub struct TransportLog {
    pub connect_attempts: AtomicUsize,
    /// Number of upcoming connects that must fail (`FAIL_FOREVER` = all).
    pub fail_remaining: AtomicUsize,
    /// When set, every send on an open connection fails.
    pub fail_sends: AtomicBool,
    pub sent: Mutex<Vec<OutboundEnvelope>>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<InboundEnvelope>>,
}

impl TransportLog {
    pub fn connects(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    pub fn set_fail_sends(&self, on: bool) {
        self.fail_sends.store(on, Ordering::SeqCst);
    }

    pub fn sent_envelopes(&self) -> Vec<OutboundEnvelope> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

pub struct FakeTransport {
    pub log: Arc<TransportLog>,
}

pub fn fake_transport(
    fail_remaining: usize,
) -> (
    FakeTransport,
    Arc<TransportLog>,
    mpsc::UnboundedSender<InboundEnvelope>,
) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let log = Arc::new(TransportLog {
        connect_attempts: AtomicUsize::new(0),
        fail_remaining: AtomicUsize::new(fail_remaining),
        fail_sends: AtomicBool::new(false),
        sent: Mutex::new(Vec::new()),
        inbound: tokio::sync::Mutex::new(inbound_rx),
    });
    (
        FakeTransport {
            log: Arc::clone(&log),
        },
        log,
        inbound_tx,
    )
}

#[async_trait]
impl StreamTransport for FakeTransport {
    async fn connect(&mut self) -> Result<Box<dyn StreamConnection>, StreamError> {
        self.log.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.log.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != FAIL_FOREVER {
                self.log.fail_remaining.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(StreamError::Connect("scripted connect failure".into()));
        }
        Ok(Box::new(FakeConnection {
            log: Arc::clone(&self.log),
        }))
    }
}

struct FakeConnection {
    log: Arc<TransportLog>,
}

#[async_trait]
impl StreamConnection for FakeConnection {
    async fn send(&mut self, envelope: &OutboundEnvelope) -> Result<(), StreamError> {
        if self.log.fail_sends.load(Ordering::SeqCst) {
            return Err(StreamError::Transport("scripted send failure".into()));
        }
        self.log.sent.lock().unwrap().push(envelope.clone());
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<InboundEnvelope, StreamError>> {
        let mut inbound = self.log.inbound.lock().await;
        inbound.recv().await.map(Ok)
    }
}

// ---------------------------------------------------------------------------
// Full wiring

pub fn fast_agent_config() -> AgentConfig {
    AgentConfig {
        chunk_interval: Duration::from_millis(50),
        flush_timeout: Duration::from_millis(300),
        sample_rate: TEST_SAMPLE_RATE,
        channels: 1,
        export_dir: None,
    }
}

pub fn fast_controller_config() -> ControllerConfig {
    ControllerConfig {
        selection_timeout: Duration::from_millis(500),
        processing_timeout: Duration::from_millis(300),
        max_deadline_extensions: 3,
    }
}

pub fn fast_streaming_config() -> StreamingConfig {
    StreamingConfig {
        reconnect_delay: Duration::from_millis(20),
        send_retry_delay: Duration::from_millis(20),
        max_retries: 5,
    }
}

pub struct Harness {
    pub relay: Relay,
    pub handle: ControllerHandle,
    pub controller_id: ContextId,
    pub events: mpsc::Receiver<SessionEvent>,
    pub transport: Arc<TransportLog>,
    pub inbound: mpsc::UnboundedSender<InboundEnvelope>,
}

/// Wire a controller, streaming client, and a launcher together the way
/// `main` does, with test-grade timeouts. The closure receives the harness
/// relay so custom launchers can register contexts on it.
pub async fn harness_with_launcher(
    make_launcher: impl FnOnce(Relay) -> Box<dyn ContextLauncher>,
) -> Harness {
    let relay = Relay::new();

    let (transport, log, inbound) = fake_transport(0);
    let (stream_events_tx, stream_events_rx) = mpsc::channel(256);
    let (stream_handle, stream_client) = StreamingClient::new(
        fast_streaming_config(),
        Box::new(transport),
        stream_events_tx,
    );
    tokio::spawn(stream_client.run());

    let (events_tx, events_rx) = mpsc::channel(256);
    let (handle, controller) = RecorderController::new(
        fast_controller_config(),
        relay.clone(),
        stream_handle,
        stream_events_rx,
        make_launcher(relay.clone()),
        Arc::new(NoopSessionSink),
        events_tx,
    )
    .await;
    let controller_id = controller.context_id();
    tokio::spawn(controller.run());

    Harness {
        relay,
        handle,
        controller_id,
        events: events_rx,
        transport: log,
        inbound,
    }
}

/// Harness whose launcher spawns real capture agents fed by the given script
/// factory.
pub async fn harness(
    scripts: impl Fn() -> GrantScript + Send + Sync + 'static,
) -> Harness {
    harness_with_launcher(|relay| {
        Box::new(AgentLauncher::new(
            relay,
            fast_agent_config(),
            Box::new(move || Box::new(ScriptedCaptureSource::new(scripts()))),
        ))
    })
    .await
}

pub fn start_request() -> StartRequest {
    StartRequest {
        platform: Platform::GoogleMeet,
        meeting_url: "https://meet.example.com/abc-defg-hij".into(),
        participants: vec![Participant {
            id: "p1".into(),
            name: "Ada".into(),
            is_host: true,
            join_time: chrono::Utc::now(),
        }],
    }
}

/// Wait until the controller reports a state matching `pred`.
pub async fn wait_for_state(
    events: &mut mpsc::Receiver<SessionEvent>,
    pred: impl Fn(&SessionState) -> bool,
) -> SessionState {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Some(SessionEvent::StateChanged { state, .. }) if pred(&state) => return state,
                Some(_) => continue,
                None => panic!("session event channel closed while waiting for state"),
            }
        }
    })
    .await
    .expect("timed out waiting for session state")
}
