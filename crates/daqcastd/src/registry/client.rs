//! A connected client as owned by the registry.

use std::fmt;
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

use chrono::{DateTime, Utc};

use super::commands::DisconnectReason;

/// Registry-assigned client identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl ClientId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// An accepted connection.
///
/// The socket is a non-blocking std stream: every send is a single
/// `send(2)` that either takes the whole frame or fails, so one stalled
/// reader can never hold up a tick.
#[derive(Debug)]
pub struct ClientConnection {
    id: ClientId,
    stream: TcpStream,
    peer: SocketAddr,
    connected_since: DateTime<Utc>,
    frames_sent: u64,
}

impl ClientConnection {
    pub fn new(id: ClientId, stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            id,
            stream,
            peer,
            connected_since: Utc::now(),
            frames_sent: 0,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Writes one whole frame or reports why the client must be dropped.
    pub fn send_frame(&mut self, frame: &[u8]) -> Result<(), DisconnectReason> {
        match self.stream.write(frame) {
            Ok(written) if written == frame.len() => {
                self.frames_sent += 1;
                Ok(())
            }
            Ok(written) => Err(DisconnectReason::ShortWrite {
                written,
                expected: frame.len(),
            }),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => self.send_frame(frame),
            Err(e) => Err(DisconnectReason::from_io_error(&e)),
        }
    }

    /// Shuts both directions down. Errors are ignored: the peer may
    /// already be gone.
    pub fn close(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    /// Public view of this connection.
    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            id: self.id,
            peer: self.peer,
            connected_since: self.connected_since,
            frames_sent: self.frames_sent,
        }
    }
}

/// Read-only description of a registered client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub id: ClientId,
    pub peer: SocketAddr,
    pub connected_since: DateTime<Utc>,
    pub frames_sent: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    fn pair() -> (ClientConnection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let remote = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, peer) = listener.accept().unwrap();
        stream.set_nonblocking(true).unwrap();
        (ClientConnection::new(ClientId::new(1), stream, peer), remote)
    }

    #[test]
    fn test_client_id_display() {
        assert_eq!(ClientId::new(7).to_string(), "client-7");
        assert!(ClientId::new(1) < ClientId::new(2));
    }

    #[test]
    fn test_send_frame_delivers_whole_frame() {
        let (mut conn, mut remote) = pair();
        conn.send_frame(b"001.000000000000").unwrap();

        let mut buf = [0u8; 16];
        remote.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"001.000000000000");
        assert_eq!(conn.info().frames_sent, 1);
    }

    #[test]
    fn test_send_frame_fails_after_peer_closes() {
        let (mut conn, remote) = pair();
        drop(remote);

        // The first write after the peer's FIN may still be accepted by the
        // kernel; the reset arrives shortly after.
        let mut failure = None;
        for _ in 0..200 {
            if let Err(reason) = conn.send_frame(b"001.000000000000") {
                failure = Some(reason);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let reason = failure.expect("send to a closed peer never failed");
        assert_eq!(reason, DisconnectReason::Closed);
    }

    #[test]
    fn test_send_frame_reports_stalled_reader() {
        let (mut conn, _remote) = pair();
        let frame = vec![b'0'; 64 * 1024];

        // The remote never reads, so the socket buffers eventually fill.
        let mut failure = None;
        for _ in 0..10_000 {
            if let Err(reason) = conn.send_frame(&frame) {
                failure = Some(reason);
                break;
            }
        }
        let reason = failure.expect("socket buffer never filled");
        assert!(
            matches!(
                reason,
                DisconnectReason::Stalled | DisconnectReason::ShortWrite { .. }
            ),
            "unexpected reason {reason:?}"
        );
    }
}
