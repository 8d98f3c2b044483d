//! Multicast Sender
//!
//! Sends a text message to a group, optionally repeating it.

use anyhow::{bail, Result};
use clap::Parser;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use multicast_tester::{
    cli::{resolve_endpoint, NetworkArgs},
    network::MulticastEndpoint,
    Session, SessionEvent,
};

#[derive(Parser)]
#[command(name = "sender")]
#[command(version)]
#[command(about = "Send a text message to a multicast group")]
struct Cli {
    /// Message text; several words are joined with spaces
    #[arg(required = true)]
    message: Vec<String>,

    /// Group and port, e.g. 239.1.1.1:5000
    #[arg(short, long)]
    endpoint: Option<MulticastEndpoint>,

    /// How many times to send the message
    #[arg(short = 'n', long, default_value_t = 1)]
    count: u32,

    /// Pause between repeated sends
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

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
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.network.load_config()?;
    let endpoint = resolve_endpoint(cli.endpoint, &config)?;
    let message = cli.message.join(" ");

    tracing::info!("Sending {:?} to {} ({} times)", message, endpoint, cli.count);

    let (mut session, events) = Session::from_config(config);
    let mut failures = 0u32;

    for i in 0..cli.count {
        if i > 0 {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(cli.interval_ms)) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted");
                    break;
                }
            }
        }

        session.send(endpoint, message.clone());
        session.wait_for_sends();

        for event in events.try_iter() {
            if let SessionEvent::Error(msg) = event {
                eprintln!("Error: {}", msg);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} sends failed", failures, cli.count);
    }
    Ok(())
}
