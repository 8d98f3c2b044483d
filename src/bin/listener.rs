//! Multicast Listener
//!
//! Joins a group and prints every datagram that arrives, labelling the ones
//! this host sent itself.

use anyhow::{bail, Result};
use clap::Parser;
use std::io::Write;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use multicast_tester::{
    cli::{resolve_endpoint, NetworkArgs},
    event::EventReceiver,
    network::MulticastEndpoint,
    Session, SessionEvent,
};

#[derive(Parser)]
#[command(name = "listener")]
#[command(version)]
#[command(about = "Join a multicast group and print what arrives")]
struct Cli {
    /// Group and port, e.g. 239.1.1.1:5000
    endpoint: Option<MulticastEndpoint>,

    /// Show payloads as 0xHH bytes
    #[arg(short = 'x', long)]
    hex: bool,

    #[command(flatten)]
    network: NetworkArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.network.load_config()?;
    let endpoint = resolve_endpoint(cli.endpoint, &config)?;
    let hex = cli.hex || config.console.hex_display;

    let (mut session, events) = Session::from_config(config);
    session.set_hex_display(hex);

    if !session.start_listening(endpoint) {
        let reason = events
            .try_iter()
            .find_map(|event| match event {
                SessionEvent::Error(msg) => Some(msg),
                _ => None,
            })
            .unwrap_or_else(|| "unknown error".into());
        bail!("Cannot listen on {}: {}", endpoint, reason);
    }

    tracing::info!("Press Ctrl+C to stop");

    // Console output stays off the async runtime
    let mut printer =
        tokio::task::spawn_blocking(move || print_events(&events, std::io::stdout()));

    let printer_done = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            false
        }
        _ = &mut printer => true,
    };
    tracing::info!("Shutting down...");

    session.stop_listening();
    drop(session);
    if !printer_done {
        let _ = printer.await;
    }

    Ok(())
}

/// Print lines until the listener stops or `out` can no longer be written
fn print_events<W: Write>(events: &EventReceiver, mut out: W) {
    for event in events.iter() {
        match event {
            SessionEvent::Line(line) => {
                if let Err(e) = out.write_all(line.as_bytes()).and_then(|()| out.flush()) {
                    tracing::debug!("Output closed: {}", e);
                    break;
                }
            }
            SessionEvent::Error(msg) => eprintln!("Error: {}", msg),
            SessionEvent::ListenerStopped | SessionEvent::ConnectivityLost => break,
            SessionEvent::StreamStopped => {}
        }
    }
}
