use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use tabcast::{
    AgentLauncher, Config, NoopSessionSink, Platform, RecorderController, Relay, SessionEvent,
    SessionState, StartRequest, StreamingClient, SyntheticCaptureSource, WsTransport,
};

/// Capture in-call tab audio and stream it to a live transcription service.
///
/// Runs a bounded demo session against a synthetic capture source; the real
/// capture grant flow plugs in behind the same seams.
#[derive(Debug, Parser)]
#[command(name = "tabcast", version)]
struct Cli {
    /// Config file (TOML/YAML/JSON), without extension.
    #[arg(long, default_value = "config/tabcast")]
    config: String,

    /// Override the transcription service endpoint.
    #[arg(long)]
    url: Option<String>,

    /// Call platform of the demo meeting.
    #[arg(long, default_value = "google-meet")]
    platform: Platform,

    /// Meeting URL recorded in the session.
    #[arg(long, default_value = "https://meet.example.com/demo")]
    meeting_url: String,

    /// How long to record before stopping.
    #[arg(long, default_value_t = 10)]
    duration_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut cfg = Config::load(&cli.config)?;
    if let Some(url) = cli.url {
        cfg.stream.url = url;
    }

    info!(url = %cfg.stream.url, "tabcast starting");

    let relay = Relay::new();

    let (stream_events_tx, stream_events_rx) = mpsc::channel(256);
    let transport = WsTransport::new(cfg.stream.url.clone(), cfg.connect_timeout());
    let (stream_handle, stream_client) =
        StreamingClient::new(cfg.streaming(), Box::new(transport), stream_events_tx);
    tokio::spawn(stream_client.run());

    let launcher = AgentLauncher::new(
        relay.clone(),
        cfg.agent(),
        Box::new(|| Box::new(SyntheticCaptureSource::default())),
    );

    let (events_tx, mut events_rx) = mpsc::channel(256);
    let (handle, controller) = RecorderController::new(
        cfg.controller(),
        relay.clone(),
        stream_handle,
        stream_events_rx,
        Box::new(launcher),
        Arc::new(NoopSessionSink),
        events_tx,
    )
    .await;
    tokio::spawn(controller.run());

    let session_id = handle
        .start(StartRequest {
            platform: cli.platform,
            meeting_url: cli.meeting_url,
            participants: Vec::new(),
        })
        .await?;
    info!(%session_id, "session started, recording for {}s", cli.duration_secs);

    let stopper = handle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(cli.duration_secs)).await;
        stopper.stop().await;
    });

    // Drive the UI surface from session events until the session terminates.
    let final_state = loop {
        match events_rx.recv().await {
            Some(SessionEvent::StateChanged { state, .. }) => {
                info!(state = state.label(), "session state");
                if state.is_terminal() {
                    break state;
                }
            }
            Some(SessionEvent::TranscriptAppended(entry)) => {
                println!("{}", entry.text);
            }
            Some(SessionEvent::StreamDegraded) => {
                warn!("streaming degraded; audio is recorded but not streamed");
            }
            None => anyhow::bail!("controller went away before the session finished"),
        }
    };

    if let SessionState::Stopped { partial: true } = final_state {
        warn!("recording may be incomplete (flush or processing timeout fired)");
    }

    if let Some(snapshot) = handle.snapshot().await {
        info!(
            chunks_forwarded = snapshot.chunks_forwarded,
            "session finished"
        );
    }

    let transcript = handle.export_transcript().await;
    if !transcript.is_empty() {
        println!("--- transcript ---\n{transcript}");
    }

    Ok(())
}
