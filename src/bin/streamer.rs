//! Multicast RTP Streamer
//!
//! Streams an H.264 Annex B file to a group as RTP, paced at the file's
//! frame rate.

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use multicast_tester::{
    cli::{resolve_endpoint, NetworkArgs},
    error::SourceError,
    event::EventReceiver,
    network::MulticastEndpoint,
    source::{AnnexBSource, SourceEvent},
    stream::StreamHandle,
    Session, SessionEvent,
};

#[derive(Parser)]
#[command(name = "streamer")]
#[command(version)]
#[command(about = "Stream an H.264 file to a multicast group over RTP")]
struct Cli {
    /// H.264 elementary stream (Annex B, e.g. from `ffmpeg -f h264`)
    file: PathBuf,

    /// Group and port, e.g. 239.1.1.1:5000
    #[arg(short, long)]
    endpoint: Option<MulticastEndpoint>,

    /// Frame rate (defaults to the configured one)
    #[arg(long)]
    fps: Option<f64>,

    /// Start over at the end of the file
    #[arg(short = 'l', long = "loop")]
    repeat: bool,

    #[command(flatten)]
    network: NetworkArgs,
}

enum Outcome {
    Finished(Duration),
    Interrupted,
    StreamEnded,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = cli.network.load_config()?;
    if let Some(fps) = cli.fps {
        config.stream.fps = fps;
        config.validate()?;
    }
    let endpoint = resolve_endpoint(cli.endpoint, &config)?;
    let fps = config.stream.fps;

    let (mut session, events) = Session::from_config(config);
    let Some(handle) = session.start_streaming(endpoint) else {
        report_errors(&events);
        bail!("Cannot stream to {}", endpoint);
    };

    tracing::info!("Streaming {} to {} at {} fps", cli.file.display(), endpoint, fps);
    tracing::info!("Press Ctrl+C to stop");

    let mut offset = Duration::ZERO;
    let result = loop {
        let source = match AnnexBSource::open(&cli.file, fps) {
            Ok(source) => source,
            Err(e) => break Err(e.into()),
        };

        match play(source, &handle, offset, &events).await {
            Ok(Outcome::Finished(played)) if cli.repeat => {
                tracing::info!("End of file, starting over");
                offset += played;
            }
            Ok(Outcome::Finished(_)) => break Ok(()),
            Ok(Outcome::Interrupted) => {
                tracing::info!("Shutting down...");
                break Ok(());
            }
            Ok(Outcome::StreamEnded) => break Err(anyhow::anyhow!("Stream stopped unexpectedly")),
            Err(e) => break Err(e.into()),
        }
    };

    // Let the dispatch thread drain what was already queued
    while handle.queued() > 0 && session.is_streaming() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    session.stop_streaming();
    report_errors(&events);

    let stats = handle.stats();
    tracing::info!(
        "Sent {} frames as {} packets ({} bytes), {} frames dropped",
        stats.frames_packetized.load(Ordering::Relaxed),
        stats.packets_produced.load(Ordering::Relaxed),
        stats.bytes_produced.load(Ordering::Relaxed),
        stats.frames_dropped.load(Ordering::Relaxed)
    );

    result
}

/// Feed one pass over the file into the stream, one frame per tick
async fn play(
    source: AnnexBSource,
    handle: &StreamHandle,
    offset: Duration,
    events: &EventReceiver,
) -> Result<Outcome, SourceError> {
    let frame_interval = source.frame_interval();
    let mut ticker = tokio::time::interval(frame_interval);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut frames = 0u32;
    for event in source {
        match event? {
            SourceEvent::ParameterSet(parameter_set) => handle.set_parameter_set(parameter_set),
            SourceEvent::Frame(mut frame) => {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = &mut ctrl_c => return Ok(Outcome::Interrupted),
                }

                frame.pts += offset;
                handle.submit(frame);
                frames += 1;

                if report_errors(events) {
                    return Ok(Outcome::StreamEnded);
                }
            }
        }
    }

    Ok(Outcome::Finished(frame_interval * frames))
}

/// Print pending errors; true once the stream has stopped
fn report_errors(events: &EventReceiver) -> bool {
    let mut stopped = false;
    for event in events.try_iter() {
        match event {
            SessionEvent::Error(msg) => eprintln!("Error: {}", msg),
            SessionEvent::StreamStopped => stopped = true,
            _ => {}
        }
    }
    stopped
}
