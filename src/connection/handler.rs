//! Connection Handler Module
//!
//! Drives one client connection: bytes in, frames through the [`Session`],
//! replies out. Each client gets its own task running this loop.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned with a fresh Session
//!        │
//!        ▼
//! 3. ┌──────────────────────────────────────────┐
//!    │      Main Loop                           │
//!    │                                          │
//!    │  ┌─────────────────────────────────────┐ │
//!    │  │ Decode every buffered frame and     │ │
//!    │  │ run it through Session::handle      │ │
//!    │  └───────────────┬─────────────────────┘ │
//!    │                  │ Immediate: write      │
//!    │                  │ Pending:   nothing    │
//!    │                  │ Close:     flush, end │
//!    │                  ▼                       │
//!    │  ┌─────────────────────────────────────┐ │
//!    │  │ Flush                               │ │
//!    │  └───────────────┬─────────────────────┘ │
//!    │                  ▼                       │
//!    │  ┌─────────────────────────────────────┐ │
//!    │  │ select! { socket read,              │ │
//!    │  │           deferred completion }     │ │
//!    │  └───────────────┬─────────────────────┘ │
//!    │                  ▼                       │
//!    │             [Loop back]                  │
//!    └──────────────────────────────────────────┘
//!        │
//!        ▼
//! 4. Close requested / client disconnects / error
//!        │
//!        ▼
//! 5. Session torn down (deferred cancelled, watches released)
//! ```
//!
//! ## Buffer Management
//!
//! Incoming bytes are read straight into the decoder's `BytesMut`. TCP is
//! a stream protocol, so one read may carry half a command or several
//! pipelined ones; the decoder keeps whatever is incomplete for the next
//! pass. The only bound on buffered input is the decoder's per-frame limit,
//! so a single large bulk argument is read in as many passes as it needs.

use crate::protocol::{FrameDecoder, ParseError, Response};
use crate::session::{Reply, Session};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total frames run through a session
    pub commands_processed: AtomicU64,
    /// Deferred replies written after completing
    pub deferred_replies: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn deferred_delivered(&self) {
        self.deferred_replies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
pub struct ConnectionHandler {
    /// The TCP stream for this connection
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Incoming bytes and the frames decoded from them
    decoder: FrameDecoder,

    /// Per-connection protocol state
    session: Session,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    /// Encoding scratch space, reused for every reply
    out: Vec<u8>,
}

impl ConnectionHandler {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        session: Session,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            decoder: FrameDecoder::with_capacity(INITIAL_BUFFER_SIZE),
            session,
            stats,
            out: Vec::with_capacity(INITIAL_BUFFER_SIZE),
        }
    }

    /// Runs the connection until the client leaves, a close is requested,
    /// or an error occurs. The session is torn down on every exit path.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, session = self.session.id(), "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    debug!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        self.session.teardown();
        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            if self.process_frames().await? == Flow::Close {
                self.stream.shutdown().await?;
                return Ok(());
            }
            self.stream.flush().await?;

            let buffer = self.decoder.buffer_mut();
            if buffer.capacity() - buffer.len() < 1024 {
                buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            tokio::select! {
                read = self.stream.get_mut().read_buf(self.decoder.buffer_mut()) => {
                    let n = read?;
                    if n == 0 {
                        return if self.decoder.is_empty() {
                            Err(ConnectionError::ClientDisconnected)
                        } else {
                            Err(ConnectionError::UnexpectedEof)
                        };
                    }
                    self.stats.bytes_read(n);
                    trace!(client = %self.addr, bytes = n, "Read data");
                }
                response = self.session.next_deferred() => {
                    trace!(client = %self.addr, "Deferred reply completed");
                    self.stats.deferred_delivered();
                    self.write_response(&response).await?;
                }
            }
        }
    }

    /// Runs every complete buffered frame through the session.
    async fn process_frames(&mut self) -> Result<Flow, ConnectionError> {
        loop {
            let invocation = match self.decoder.next_frame() {
                Ok(Some(invocation)) => invocation,
                Ok(None) => return Ok(Flow::Continue),
                Err(e) => {
                    warn!(client = %self.addr, error = %e, "Protocol error");
                    let reply = Response::error(format!("ERR Protocol error: {}", e));
                    self.write_response(&reply).await?;
                    self.stream.flush().await?;
                    return Err(ConnectionError::ParseError(e));
                }
            };

            trace!(client = %self.addr, command = %invocation, "Parsed command");
            self.stats.command_processed();

            match self.session.handle(invocation) {
                Reply::Immediate(response) => self.write_response(&response).await?,
                Reply::Pending => {}
                Reply::Close(reply) => {
                    if let Some(response) = reply {
                        self.write_response(&response).await?;
                    }
                    debug!(client = %self.addr, "Closing on request");
                    return Ok(Flow::Close);
                }
            }
        }
    }

    /// Encodes a reply into the write buffer. Flushing happens once per
    /// batch of pipelined frames.
    async fn write_response(&mut self, response: &Response) -> Result<(), ConnectionError> {
        self.out.clear();
        response.serialize_into(&mut self.out);
        self.stream.write_all(&self.out).await?;
        self.stats.bytes_written(self.out.len());
        trace!(client = %self.addr, bytes = self.out.len(), "Queued response");
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed request stream
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial command)
    #[error("Unexpected end of stream")]
    UnexpectedEof,
}

/// Handles a client connection to completion.
///
/// # Arguments
///
/// * `stream` - The TCP stream for this connection
/// * `addr` - The client's socket address
/// * `session` - Fresh session state for this client
/// * `stats` - Shared connection statistics
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    session: Session,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, session, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{strings, Dispatcher};
    use crate::storage::Keyspace;
    use crate::watch::WatchRegistry;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::time::{timeout, Duration};

    struct TestServer {
        addr: SocketAddr,
        registry: Arc<WatchRegistry>,
        stats: Arc<ConnectionStats>,
    }

    async fn create_test_server() -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = Arc::new(WatchRegistry::new());
        let stats = Arc::new(ConnectionStats::new());

        let mut dispatcher = Dispatcher::new();
        strings::register(
            &mut dispatcher,
            Arc::new(Keyspace::new(0, Arc::clone(&registry))),
        );
        let dispatcher = Arc::new(dispatcher);

        let registry_clone = Arc::clone(&registry);
        let stats_clone = Arc::clone(&stats);
        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let session = Session::new(Arc::clone(&dispatcher), Arc::clone(&registry_clone));
                let stats = Arc::clone(&stats_clone);
                tokio::spawn(handle_connection(stream, client_addr, session, stats));
            }
        });

        TestServer {
            addr,
            registry,
            stats,
        }
    }

    /// Reads exactly `expected.len()` bytes and compares them.
    async fn expect_reply(client: &mut TcpStream, expected: &[u8]) {
        let mut buf = vec![0u8; expected.len()];
        timeout(Duration::from_secs(2), client.read_exact(&mut buf))
            .await
            .expect("timed out waiting for reply")
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&buf),
            String::from_utf8_lossy(expected)
        );
    }

    async fn expect_closed(client: &mut TcpStream) {
        let mut buf = [0u8; 64];
        let n = timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .expect("timed out waiting for close")
            .unwrap();
        assert_eq!(n, 0, "unexpected bytes: {:?}", &buf[..n]);
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let server = create_test_server().await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        expect_reply(&mut client, b"+PONG\r\n").await;

        client.write_all(b"PING\r\n").await.unwrap();
        expect_reply(&mut client, b"+PONG\r\n").await;
    }

    #[tokio::test]
    async fn test_pipelined_transaction() {
        let server = create_test_server().await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client
            .write_all(b"MULTI\r\nSET k1 v1\r\nINCR n\r\nGET k1\r\nEXEC\r\n")
            .await
            .unwrap();
        expect_reply(
            &mut client,
            b"+OK\r\n+QUEUED\r\n+QUEUED\r\n+QUEUED\r\n*3\r\n+OK\r\n:1\r\n$2\r\nv1\r\n",
        )
        .await;
    }

    #[tokio::test]
    async fn test_watch_invalidated_by_other_connection() {
        let server = create_test_server().await;
        let mut watcher = TcpStream::connect(server.addr).await.unwrap();
        let mut writer = TcpStream::connect(server.addr).await.unwrap();

        watcher.write_all(b"WATCH balance\r\n").await.unwrap();
        expect_reply(&mut watcher, b"+OK\r\n").await;

        writer.write_all(b"SET balance 0\r\n").await.unwrap();
        expect_reply(&mut writer, b"+OK\r\n").await;

        watcher
            .write_all(b"MULTI\r\nINCRBY balance 10\r\nEXEC\r\n")
            .await
            .unwrap();
        expect_reply(&mut watcher, b"+OK\r\n+QUEUED\r\n*-1\r\n").await;
        assert_eq!(server.registry.watched_keys(), 0);
    }

    #[tokio::test]
    async fn test_quit_flushes_then_closes() {
        let server = create_test_server().await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client.write_all(b"PING\r\nQUIT\r\nPING\r\n").await.unwrap();
        expect_reply(&mut client, b"+PONG\r\n+OK\r\n").await;
        expect_closed(&mut client).await;
    }

    #[tokio::test]
    async fn test_deferred_reply_follows_synchronous_ones() {
        let server = create_test_server().await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client
            .write_all(b"DEBUG SLEEP 0.05\r\nPING\r\n")
            .await
            .unwrap();
        expect_reply(&mut client, b"+PONG\r\n+OK\r\n").await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(server.stats.deferred_replies.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_handler_error_keeps_connection_open() {
        let server = create_test_server().await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client.write_all(b"NOPE\r\nEXEC\r\nPING\r\n").await.unwrap();
        expect_reply(
            &mut client,
            b"-ERR unknown command 'NOPE'\r\n-ERR EXEC without MULTI\r\n+PONG\r\n",
        )
        .await;
    }

    #[tokio::test]
    async fn test_protocol_error_closes() {
        let server = create_test_server().await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client.write_all(b"*1\r\n:5\r\n").await.unwrap();
        expect_reply(&mut client, b"-ERR Protocol error: expected '$', got ':'\r\n").await;
        expect_closed(&mut client).await;
    }

    #[tokio::test]
    async fn test_value_larger_than_one_read() {
        let server = create_test_server().await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        let value = vec![b'v'; 70 * 1024];
        let mut request = format!("*3\r\n$3\r\nSET\r\n$3\r\nbig\r\n${}\r\n", value.len()).into_bytes();
        request.extend_from_slice(&value);
        request.extend_from_slice(b"\r\n");
        client.write_all(&request).await.unwrap();
        expect_reply(&mut client, b"+OK\r\n").await;

        client.write_all(b"GET big\r\n").await.unwrap();
        let mut expected = format!("${}\r\n", value.len()).into_bytes();
        expected.extend_from_slice(&value);
        expected.extend_from_slice(b"\r\n");
        expect_reply(&mut client, &expected).await;
    }

    #[tokio::test]
    async fn test_disconnect_releases_watches() {
        let server = create_test_server().await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client.write_all(b"WATCH a b\r\n").await.unwrap();
        expect_reply(&mut client, b"+OK\r\n").await;
        assert_eq!(server.registry.watched_keys(), 2);

        drop(client);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.registry.watched_keys(), 0);
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let server = create_test_server().await;
        let stats = &server.stats;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = TcpStream::connect(server.addr).await.unwrap();

        // Give the server time to accept the connection
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        expect_reply(&mut client, b"+PONG\r\n").await;

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(stats.commands_processed.load(Ordering::Relaxed) >= 1);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(stats.bytes_written.load(Ordering::Relaxed) > 0);

        drop(client);

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }
}
