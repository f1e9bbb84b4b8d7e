//! daqcast Daemon - fixed-rate sample broadcast server
//!
//! This binary runs the broadcast server: it replays or produces samples
//! and writes one fixed-width message per tick to every connected client.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! daqcastd start --config daqcast.toml
//!
//! # Start the daemon (background/daemonized), replaying a CSV file
//! daqcastd start -d --file output_data.csv --rate 400
//!
//! # Stop the daemon
//! daqcastd stop
//!
//! # Check daemon status
//! daqcastd status
//!
//! # Record 20 s of the simulated differential pair for later replay
//! daqcastd record output_data.csv --duration 20
//! ```

use std::fs::{self, File};
use std::io::{Read, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use daqcast_core::config::{MAX_RATE_HZ, MIN_RATE_HZ};
use daqcast_core::source::{REFERENCE_CHANNEL, SIGNAL_CHANNEL};
use daqcast_core::{
    DaemonConfig, DifferentialSource, Recorder, RecorderSettings, ReplaySource, SimulatedInput,
    SourceConfig,
};
use daqcastd::channel::sample_channel;
use daqcastd::monitor::spawn_monitor_task;
use daqcastd::producer::spawn_producer;
use daqcastd::registry::spawn_registry;
use daqcastd::server::BroadcastServer;

/// daqcast daemon - fixed-rate TCP sample broadcaster
#[derive(Parser, Debug)]
#[command(name = "daqcastd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        #[command(flatten)]
        overrides: ConfigArgs,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
    /// Record the simulated differential pair to a CSV file
    Record(RecordArgs),
}

/// Recorder parameters.
#[derive(ClapArgs, Debug)]
struct RecordArgs {
    /// CSV file to write
    output: PathBuf,

    /// Seconds to record after the warm-up
    #[arg(long, default_value_t = 20.0)]
    duration: f64,

    /// Seconds of readings discarded before recording
    #[arg(long, default_value_t = 2.0)]
    warmup: f64,

    /// Rows per second
    #[arg(short, long, default_value_t = 400.0)]
    rate: f64,

    /// Simulated signal frequency in Hz
    #[arg(long, default_value_t = 1.0)]
    frequency: f64,

    /// Simulated signal amplitude in volts
    #[arg(long, default_value_t = 1.0)]
    amplitude: f64,
}

impl RecordArgs {
    fn settings(&self) -> Result<RecorderSettings> {
        if !(MIN_RATE_HZ..=MAX_RATE_HZ).contains(&self.rate) {
            bail!("Rate {} is outside {MIN_RATE_HZ}..={MAX_RATE_HZ} Hz", self.rate);
        }
        let duration = Duration::try_from_secs_f64(self.duration)
            .with_context(|| format!("Invalid duration {}", self.duration))?;
        let warmup = Duration::try_from_secs_f64(self.warmup)
            .with_context(|| format!("Invalid warm-up {}", self.warmup))?;

        Ok(RecorderSettings {
            rate_hz: self.rate,
            duration,
            warmup,
            ..RecorderSettings::default()
        })
    }
}

/// Configuration file and per-field overrides.
#[derive(ClapArgs, Debug, Default)]
struct ConfigArgs {
    /// TOML configuration file
    #[arg(short, long, env = "DAQCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    host: Option<IpAddr>,

    /// TCP port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Broadcast rate in Hz
    #[arg(short, long)]
    rate: Option<f64>,

    /// Message width in bytes
    #[arg(short, long)]
    width: Option<usize>,

    /// CSV file to replay (second column is the sample)
    #[arg(short, long)]
    file: Option<PathBuf>,
}

impl ConfigArgs {
    /// Loads the file (if any), applies overrides, validates.
    fn resolve(self) -> Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => DaemonConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => DaemonConfig::default(),
        };

        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(rate) = self.rate {
            config.broadcast.sample_rate_hz = rate;
        }
        if let Some(width) = self.width {
            config.broadcast.message_width = width;
        }
        if let Some(path) = self.file {
            let rate_hz = match config.source {
                SourceConfig::File { rate_hz, .. } | SourceConfig::Simulated { rate_hz, .. } => {
                    rate_hz
                }
                SourceConfig::None => None,
            };
            config.source = SourceConfig::File { path, rate_hz };
        }

        // Daemonizing changes the working directory to "/".
        if let SourceConfig::File { path, .. } = &mut config.source {
            *path = fs::canonicalize(&*path)
                .with_context(|| format!("Sample file {} not found", path.display()))?;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("daqcast")
}

fn pid_file_path() -> PathBuf {
    state_dir().join("daqcastd.pid")
}

fn log_file_path() -> PathBuf {
    state_dir().join("daqcastd.log")
}

fn read_pid() -> Option<u32> {
    let path = pid_file_path();
    let mut file = File::open(&path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

fn is_process_running(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        remove_pid_file();
    }
    None
}

fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        overrides: ConfigArgs::default(),
    });

    match command {
        Command::Start { daemon, overrides } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'daqcastd stop' to stop it first.");
                process::exit(1);
            }

            // Resolve before forking so mistakes reach the terminal.
            let config = overrides.resolve()?;

            if daemon {
                daemonize()?;
            }

            write_pid()?;

            let result = run_daemon(config);

            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping daemon (PID {pid})...");
                stop_daemon(pid)?;

                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Daemon is running (PID {pid})");
                let log_path = log_file_path();
                if log_path.exists() {
                    println!("Log: {}", log_path.display());
                }
                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
        Command::Record(args) => record(args),
    }
}

fn record(args: RecordArgs) -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("daqcast_core=info".parse()?),
        )
        .init();

    let settings = args.settings()?;
    let input = SimulatedInput::new(args.frequency, args.amplitude);
    let source = DifferentialSource::new(input, SIGNAL_CHANNEL, REFERENCE_CHANNEL);

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let summary = Recorder::new(source, settings)
        .record(file)
        .context("Recording failed")?;

    println!(
        "Wrote {} rows to {} (loop overhead {:?})",
        summary.rows,
        args.output.display(),
        summary.loop_overhead
    );
    Ok(())
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_daemon(config: DaemonConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("daqcastd=info".parse()?)
                .add_directive("daqcast_core=info".parse()?)
                .add_directive("daqcast_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "daqcast daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let registry = spawn_registry(config.server.max_clients);
    let (sender, receiver) = sample_channel(config.broadcast.channel_capacity);

    let producer = match &config.source {
        SourceConfig::File { path, .. } => {
            let source = ReplaySource::from_path(path)
                .with_context(|| format!("Failed to load samples from {}", path.display()))?;
            info!(file = %path.display(), samples = source.len(), "Replaying sample file");
            let rate_hz = config.source.rate_hz(&config.broadcast);
            Some(spawn_producer(source, sender, rate_hz, cancel_token.clone()))
        }
        SourceConfig::Simulated {
            frequency_hz,
            amplitude,
            ..
        } => {
            let input = SimulatedInput::new(*frequency_hz, *amplitude);
            let source = DifferentialSource::new(input, SIGNAL_CHANNEL, REFERENCE_CHANNEL);
            info!(frequency_hz, amplitude, "Reading simulated differential pair");
            let rate_hz = config.source.rate_hz(&config.broadcast);
            Some(spawn_producer(source, sender, rate_hz, cancel_token.clone()))
        }
        SourceConfig::None => {
            warn!("No sample source configured, broadcasting sentinel values");
            drop(sender);
            None
        }
    };

    let server = BroadcastServer::new(config.clone(), registry, receiver, cancel_token.clone())?;

    let _monitor_handle =
        spawn_monitor_task(config.monitor.clone(), server.stats(), cancel_token.clone());

    let result = server.run().await;

    // The server only returns early on a bind failure; stop the rest too.
    cancel_token.cancel();
    if let Some(producer) = producer {
        if let Ok(summary) = producer.await {
            info!(produced = summary.produced, "Producer finished");
        }
    }

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("daqcast daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
