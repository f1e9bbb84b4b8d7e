//! Integration tests for the broadcast server.
//!
//! Each test runs a complete `BroadcastServer` on a loopback port and talks
//! to it with real TCP clients, decoding the stream with `FixedWidthCodec`.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use daqcast_core::source::{REFERENCE_CHANNEL, SIGNAL_CHANNEL};
use daqcast_core::{DaemonConfig, DifferentialSource, ReplaySource, Sample, SimulatedInput};
use daqcast_protocol::{FixedWidthCodec, MessageFormat};
use daqcastd::channel::{sample_channel, SampleSender};
use daqcastd::producer::spawn_producer;
use daqcastd::registry::{spawn_registry, ClientEvent, RegistryHandle};
use daqcastd::server::{BroadcastServer, ServerError};
use daqcastd::stats::ServerStats;
use futures::StreamExt;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for the registry to see a new client.
const REGISTER_WAIT_TIMEOUT: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Maximum time to wait for a frame.
const FRAME_TIMEOUT: Duration = Duration::from_secs(2);

/// Frames timed per cadence measurement.
const CADENCE_FRAMES: u32 = 25;

/// Maximum time for the server to stop after cancellation.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Test Helpers
// ============================================================================

/// Test server context that manages server lifecycle.
struct TestServer {
    addr: SocketAddr,
    sender: SampleSender,
    registry: RegistryHandle,
    stats: Arc<ServerStats>,
    cancel_token: CancellationToken,
    task: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    /// Spawns a server at 400 Hz with 16-byte messages.
    async fn spawn() -> Self {
        Self::spawn_with(DaemonConfig::default()).await
    }

    async fn spawn_with(config: DaemonConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().unwrap();

        let (sender, receiver) = sample_channel(config.broadcast.channel_capacity);
        let registry = spawn_registry(config.server.max_clients);
        let cancel_token = CancellationToken::new();

        let server =
            BroadcastServer::new(config, registry.clone(), receiver, cancel_token.clone())
                .expect("valid config");
        let stats = server.stats();
        let task = tokio::spawn(server.serve(listener));

        Self {
            addr,
            sender,
            registry,
            stats,
            cancel_token,
            task,
        }
    }

    /// Connects and waits until the registry has `expected` clients.
    async fn connect(&self, expected: usize) -> TestClient {
        let stream = TcpStream::connect(self.addr).await.expect("connect");
        self.wait_for_clients(expected).await;
        TestClient::new(stream, MessageFormat::default())
    }

    async fn wait_for_clients(&self, expected: usize) {
        timeout(REGISTER_WAIT_TIMEOUT, async {
            while self.registry.client_count().await != expected {
                sleep(POLL_INTERVAL).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("registry never reached {expected} clients"));
    }

    /// Cancels and waits for `serve` to return.
    async fn shutdown(self) {
        self.cancel_token.cancel();
        timeout(SHUTDOWN_TIMEOUT, self.task)
            .await
            .expect("server did not stop")
            .unwrap()
            .expect("server returned an error");
    }
}

struct TestClient {
    frames: FramedRead<TcpStream, FixedWidthCodec>,
}

impl TestClient {
    fn new(stream: TcpStream, format: MessageFormat) -> Self {
        Self {
            frames: FramedRead::new(stream, FixedWidthCodec::new(format)),
        }
    }

    async fn next(&mut self) -> Sample {
        timeout(FRAME_TIMEOUT, self.frames.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("frame decodes")
    }

    /// Skips frames until one differs from the sentinel.
    async fn next_non_sentinel(&mut self) -> Sample {
        loop {
            let sample = self.next().await;
            if !sample.is_sentinel() {
                return sample;
            }
        }
    }
}

// ============================================================================
// Broadcast
// ============================================================================

#[tokio::test]
async fn test_sentinel_broadcast_when_channel_empty() {
    let server = TestServer::spawn().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    server.wait_for_clients(1).await;

    let mut raw = [0u8; 16];
    timeout(FRAME_TIMEOUT, stream.read_exact(&mut raw))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&raw, b"000.000000000000");

    assert!(server.stats.snapshot().sentinel_ticks > 0);
    server.shutdown().await;
}

#[tokio::test]
async fn test_end_to_end_values_in_order() {
    let server = TestServer::spawn().await;
    let mut client = server.connect(1).await;

    for value in [1.0, 2.5, -3.0] {
        server.sender.send(Sample::new(value)).unwrap();
    }

    assert_eq!(client.next_non_sentinel().await.value(), 1.0);
    assert_eq!(client.next().await.value(), 2.5);
    assert_eq!(client.next().await.value(), -3.0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_all_clients_see_the_same_stream() {
    let server = TestServer::spawn().await;
    let mut first = server.connect(1).await;
    let mut second = server.connect(2).await;

    server.sender.send(Sample::new(3.14159265)).unwrap();
    server.sender.send(Sample::new(-12.5)).unwrap();

    for client in [&mut first, &mut second] {
        assert_eq!(client.next_non_sentinel().await.value(), 3.14159265);
        assert_eq!(client.next().await.value(), -12.5);
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_custom_width_and_rate() {
    let mut config = DaemonConfig::default();
    config.broadcast.message_width = 20;
    config.broadcast.sample_rate_hz = 100.0;
    let server = TestServer::spawn_with(config).await;

    let stream = TcpStream::connect(server.addr).await.unwrap();
    server.wait_for_clients(1).await;
    let mut client = TestClient::new(stream, MessageFormat::new(20).unwrap());

    server.sender.send(Sample::new(2.5)).unwrap();
    assert_eq!(client.next_non_sentinel().await.value(), 2.5);

    server.shutdown().await;
}

/// Times `CADENCE_FRAMES` frames once the client has caught up with the
/// live stream.
async fn measure_cadence(rate_hz: f64) -> Duration {
    let mut config = DaemonConfig::default();
    config.broadcast.sample_rate_hz = rate_hz;
    let period = config.broadcast.period();
    let server = TestServer::spawn_with(config).await;
    let mut client = server.connect(1).await;

    // Frames sent while waiting for registration are already buffered.
    loop {
        let waited = Instant::now();
        client.next().await;
        if waited.elapsed() >= period / 2 {
            break;
        }
    }

    let start = Instant::now();
    for _ in 0..CADENCE_FRAMES {
        assert!(client.next().await.is_sentinel());
    }
    let elapsed = start.elapsed();

    server.shutdown().await;
    elapsed
}

#[tokio::test]
async fn test_ticks_follow_the_configured_period() {
    // 25 ticks at 50 Hz span 500 ms. Allow late delivery of the first frame
    // and a slow runner, but never a burst.
    let elapsed = measure_cadence(50.0).await;
    assert!(
        elapsed >= Duration::from_millis(400),
        "25 frames at 50 Hz arrived in {elapsed:?}"
    );
    assert!(
        elapsed <= Duration::from_millis(1500),
        "25 frames at 50 Hz took {elapsed:?}"
    );
}

#[tokio::test]
async fn test_default_rate_spaces_frames_by_2_5_ms() {
    // 25 ticks at 400 Hz span 62.5 ms.
    let elapsed = measure_cadence(400.0).await;
    assert!(
        elapsed >= Duration::from_millis(45),
        "25 frames at 400 Hz arrived in {elapsed:?}"
    );
    assert!(
        elapsed <= Duration::from_millis(500),
        "25 frames at 400 Hz took {elapsed:?}"
    );
}

#[tokio::test]
async fn test_simulated_pair_reaches_clients() {
    let input = SimulatedInput::new(2.0, 0.75);
    let source = DifferentialSource::new(input, SIGNAL_CHANNEL, REFERENCE_CHANNEL);

    let server = TestServer::spawn().await;
    let mut client = server.connect(1).await;
    let producer = spawn_producer(
        source,
        server.sender.clone(),
        400.0,
        server.cancel_token.clone(),
    );

    for _ in 0..10 {
        let value = client.next_non_sentinel().await.value();
        assert!(value.abs() <= 0.75 + 1e-9, "{value} exceeds amplitude");
    }

    server.shutdown().await;
    assert!(producer.await.unwrap().produced >= 10);
}

#[tokio::test]
async fn test_replayed_csv_reaches_clients() {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "0.0000,1.5").unwrap();
    writeln!(csv, "0.0025,-2.25").unwrap();
    let source = ReplaySource::from_path(csv.path()).unwrap();

    let server = TestServer::spawn().await;
    let mut client = server.connect(1).await;
    let producer = spawn_producer(
        source,
        server.sender.clone(),
        400.0,
        server.cancel_token.clone(),
    );

    let mut seen = Vec::new();
    while seen.len() < 6 {
        let sample = client.next().await;
        if !sample.is_sentinel() {
            seen.push(sample.value());
        }
    }
    assert!(seen.iter().all(|v| *v == 1.5 || *v == -2.25), "{seen:?}");
    assert!(seen.contains(&1.5));
    assert!(seen.contains(&-2.25));

    server.shutdown().await;
    producer.await.unwrap();
}

// ============================================================================
// Client Lifecycle
// ============================================================================

#[tokio::test]
async fn test_disconnected_client_is_removed_and_others_continue() {
    let server = TestServer::spawn().await;
    let mut events = server.registry.subscribe();

    let leaving = server.connect(1).await;
    let mut staying = server.connect(2).await;
    drop(leaving);

    timeout(REGISTER_WAIT_TIMEOUT, async {
        loop {
            if let Ok(ClientEvent::Disconnected { .. }) = events.recv().await {
                break;
            }
        }
    })
    .await
    .expect("dropped client was never removed");
    assert_eq!(server.registry.client_count().await, 1);

    server.sender.send(Sample::new(7.0)).unwrap();
    assert_eq!(staying.next_non_sentinel().await.value(), 7.0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_max_clients_enforced() {
    let mut config = DaemonConfig::default();
    config.server.max_clients = Some(1);
    let server = TestServer::spawn_with(config).await;

    let _first = server.connect(1).await;
    let mut rejected = TcpStream::connect(server.addr).await.unwrap();

    // The registry closes the extra connection without sending anything.
    let mut buf = [0u8; 16];
    let read = timeout(FRAME_TIMEOUT, rejected.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read, 0);
    assert_eq!(server.registry.client_count().await, 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_many_clients_connect_while_broadcasting() {
    const CLIENTS: usize = 25;

    let server = TestServer::spawn().await;
    let mut streams = Vec::new();
    for _ in 0..CLIENTS {
        streams.push(TcpStream::connect(server.addr).await.unwrap());
    }
    server.wait_for_clients(CLIENTS).await;

    let mut clients: Vec<TestClient> = streams
        .into_iter()
        .map(|s| TestClient::new(s, MessageFormat::default()))
        .collect();

    server.sender.send(Sample::new(42.0)).unwrap();
    for client in &mut clients {
        assert_eq!(client.next_non_sentinel().await.value(), 42.0);
    }

    assert_eq!(server.stats.snapshot().clients_accepted, CLIENTS as u64);
    server.shutdown().await;
}

// ============================================================================
// Startup and Shutdown
// ============================================================================

#[tokio::test]
async fn test_graceful_shutdown_closes_clients() {
    let server = TestServer::spawn().await;
    let mut client = server.connect(1).await;
    client.next().await;

    server.shutdown().await;

    // Drain whatever was in flight, then EOF.
    let ended = timeout(SHUTDOWN_TIMEOUT, async {
        while let Some(frame) = client.frames.next().await {
            frame.expect("intact frame");
        }
    })
    .await;
    assert!(ended.is_ok(), "client stream did not end after shutdown");
}

#[tokio::test]
async fn test_bind_retries_until_address_is_free() {
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = blocker.local_addr().unwrap().port();

    let mut config = DaemonConfig::default();
    config.server.host = IpAddr::V4(Ipv4Addr::LOCALHOST);
    config.server.port = port;
    config.server.bind_retry_delay_ms = 50;

    let (_sender, receiver) = sample_channel(4);
    let registry = spawn_registry(None);
    let cancel_token = CancellationToken::new();
    let server = BroadcastServer::new(config, registry.clone(), receiver, cancel_token.clone())
        .unwrap();
    let task = tokio::spawn(server.run());

    // Let at least two attempts fail.
    sleep(Duration::from_millis(120)).await;
    assert!(!task.is_finished());
    drop(blocker);

    let mut stream = timeout(Duration::from_secs(3), async {
        loop {
            match TcpStream::connect(("127.0.0.1", port)).await {
                Ok(stream) => break stream,
                Err(_) => sleep(POLL_INTERVAL).await,
            }
        }
    })
    .await
    .expect("server never bound the freed port");

    let mut raw = [0u8; 16];
    timeout(FRAME_TIMEOUT, stream.read_exact(&mut raw))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&raw, b"000.000000000000");

    cancel_token.cancel();
    timeout(SHUTDOWN_TIMEOUT, task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_cancel_during_bind_retry() {
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = blocker.local_addr().unwrap().port();

    let mut config = DaemonConfig::default();
    config.server.host = IpAddr::V4(Ipv4Addr::LOCALHOST);
    config.server.port = port;
    config.server.bind_retry_delay_ms = 60_000;

    let (_sender, receiver) = sample_channel(4);
    let registry = spawn_registry(None);
    let cancel_token = CancellationToken::new();
    let server = BroadcastServer::new(config, registry.clone(), receiver, cancel_token.clone())
        .unwrap();
    let task = tokio::spawn(server.run());

    sleep(Duration::from_millis(50)).await;
    cancel_token.cancel();

    let result = timeout(SHUTDOWN_TIMEOUT, task).await.unwrap().unwrap();
    assert!(result.is_ok());
    drop(blocker);
}
