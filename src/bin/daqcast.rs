//! daqcast - print a daqcast sample stream
//!
//! Connects to a running `daqcastd`, decodes the fixed-width stream and
//! prints one value per line. Reconnects automatically unless told not to.
//!
//! # Usage
//!
//! ```text
//! daqcast                          # follow 127.0.0.1:5025
//! daqcast --host 10.0.0.5 --json   # JSON lines with sequence numbers
//! daqcast --count 400 --no-reconnect
//! ```

use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use daqcast_client::{Reading, StreamClient, StreamConfig, StreamEvent};
use daqcast_core::{DEFAULT_MESSAGE_WIDTH, DEFAULT_PORT};

/// daqcast - print samples broadcast by a daqcast daemon
#[derive(Parser, Debug)]
#[command(name = "daqcast", version, about)]
struct Args {
    /// Daemon host
    #[arg(long, default_value = "127.0.0.1", env = "DAQCAST_HOST")]
    host: String,

    /// Daemon port
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "DAQCAST_PORT")]
    port: u16,

    /// Message width the daemon uses
    #[arg(short, long, default_value_t = DEFAULT_MESSAGE_WIDTH)]
    width: usize,

    /// Print JSON lines instead of plain values
    #[arg(long)]
    json: bool,

    /// Exit after this many samples
    #[arg(short = 'n', long)]
    count: Option<u64>,

    /// Exit instead of reconnecting when the connection fails or ends
    #[arg(long)]
    no_reconnect: bool,
}

/// How readings are printed.
#[derive(Debug, Clone, Copy)]
enum Output {
    Plain,
    Json,
}

impl Output {
    fn write(self, out: &mut impl Write, reading: &Reading) -> Result<()> {
        match self {
            Output::Plain => writeln!(out, "{}", reading.value)?,
            Output::Json => {
                serde_json::to_writer(&mut *out, reading)?;
                writeln!(out)?;
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays pipeable.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("daqcast_client=warn".parse()?),
        )
        .init();

    let config = StreamConfig {
        host: args.host,
        port: args.port,
        width: args.width,
        reconnect: !args.no_reconnect,
        ..StreamConfig::default()
    };
    let output = if args.json { Output::Json } else { Output::Plain };

    let cancel_token = CancellationToken::new();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let client = StreamClient::new(config, event_tx, cancel_token.clone())
        .context("Invalid stream settings")?;
    let client_task = tokio::spawn(async move { client.run().await });

    let ctrl_c_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted");
            ctrl_c_token.cancel();
        }
    });

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut printed = 0u64;

    while let Some(event) = event_rx.recv().await {
        match event {
            StreamEvent::Reading(reading) => {
                if let Err(e) = output.write(&mut out, &reading) {
                    // Broken pipe from `| head` and similar.
                    warn!(error = %e, "Failed to write output");
                    break;
                }
                printed += 1;
                if args.count.is_some_and(|max| printed >= max) {
                    break;
                }
                out.flush().ok();
            }
            StreamEvent::Connected { addr } => info!(%addr, "Connected"),
            StreamEvent::Disconnected { reason } => warn!(%reason, "Disconnected"),
        }
    }
    out.flush().ok();

    cancel_token.cancel();
    drop(event_rx);
    client_task
        .await
        .context("Stream client task failed")?
        .context("Stream client stopped")?;
    Ok(())
}
