//! Bolt connection for client-side use.
//!
//! A [`Connection`] owns one transport. Requests are appended to an outbound
//! buffer together with a [`Response`], flushed by [`Connection::send`], and
//! replies are matched back to the responses in append order by
//! [`Connection::fetch`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};

use crate::bolt::codec::{BoltResponseCodec, DEFAULT_MAX_MESSAGE_SIZE};
use crate::bolt::handshake::negotiate;
use crate::bolt::{AuthToken, BoltError, BoltRequest, BoltResponse};

use super::driver::ServerAddress;
use super::error::{DriverError, DriverResult};
use super::response::{Completion, Outcome, Response, ResponseHandler};
#[cfg(feature = "tls")]
use super::tls::TlsConnector;

/// Default user agent sent with INIT.
pub const DEFAULT_USER_AGENT: &str = concat!("bolt-driver/", env!("CARGO_PKG_VERSION"));

/// Default timeout for establishing the TCP connection.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Byte stream a connection can run over: TCP, TLS over TCP, or an in-memory
/// pipe in tests.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// A connection shared between a session and its results.
pub type SharedConnection = Arc<tokio::sync::Mutex<Connection>>;

// ============================================================================
// ConnectionHealth
// ============================================================================

/// Health flags, readable without locking the connection.
#[derive(Debug, Default)]
pub struct ConnectionHealth {
    closed: AtomicBool,
    defunct: AtomicBool,
}

impl ConnectionHealth {
    /// Open and not defunct.
    pub fn is_healthy(&self) -> bool {
        !self.is_closed() && !self.is_defunct()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_defunct(&self) -> bool {
        self.defunct.load(Ordering::Acquire)
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn mark_defunct(&self) {
        self.defunct.store(true, Ordering::Release);
    }
}

// ============================================================================
// ConnectOptions
// ============================================================================

/// Settings applied when opening a connection.
#[derive(Clone)]
pub struct ConnectOptions {
    pub auth: AuthToken,
    pub user_agent: String,
    pub connection_timeout: Duration,
    pub max_message_size: usize,
    /// Wraps the socket in TLS when set.
    #[cfg(feature = "tls")]
    pub tls: Option<TlsConnector>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            auth: AuthToken::none(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            #[cfg(feature = "tls")]
            tls: None,
        }
    }
}

impl std::fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("auth", &self.auth)
            .field("user_agent", &self.user_agent)
            .field("connection_timeout", &self.connection_timeout)
            .field("max_message_size", &self.max_message_size)
            .finish()
    }
}

/// Opens a TCP connection to `address` and brings it to the ready state.
pub async fn connect(address: &ServerAddress, options: &ConnectOptions) -> DriverResult<Connection> {
    let stream = tokio::time::timeout(
        options.connection_timeout,
        TcpStream::connect((address.host(), address.port())),
    )
    .await
    .map_err(|_| DriverError::connection(format!("Timed out connecting to {}", address)))?
    .map_err(|e| DriverError::connection(format!("Failed to connect to {}: {}", address, e)))?;

    // Enable TCP nodelay for lower latency
    stream.set_nodelay(true).ok();

    #[cfg(feature = "tls")]
    if let Some(tls) = &options.tls {
        let stream = tls.wrap(address.host(), stream).await?;
        return Connection::open(stream, address.to_string(), options).await;
    }

    Connection::open(stream, address.to_string(), options).await
}

// ============================================================================
// Connection
// ============================================================================

/// Client-side Bolt connection.
pub struct Connection {
    id: u64,
    address: String,
    stream: Box<dyn Transport>,
    codec: BoltResponseCodec,
    read_buffer: BytesMut,
    /// Requests appended but not yet sent
    write_buffer: BytesMut,
    /// Responses awaiting replies, oldest first
    responses: VecDeque<Response>,
    health: Arc<ConnectionHealth>,
    server: Option<String>,
}

impl Connection {
    /// Performs the handshake and INIT over an already open stream.
    pub async fn open<S>(
        mut stream: S,
        address: impl Into<String>,
        options: &ConnectOptions,
    ) -> DriverResult<Self>
    where
        S: Transport + 'static,
    {
        let address = address.into();
        negotiate(&mut stream).await.map_err(|e| match e {
            BoltError::Io(e) => {
                DriverError::connection(format!("Handshake with {} failed: {}", address, e))
            }
            other => DriverError::protocol(other.to_string()),
        })?;

        let mut connection = Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            address,
            stream: Box::new(stream),
            codec: BoltResponseCodec::with_max_size(options.max_message_size),
            read_buffer: BytesMut::with_capacity(8192),
            write_buffer: BytesMut::with_capacity(8192),
            responses: VecDeque::new(),
            health: Arc::new(ConnectionHealth::default()),
            server: None,
        };
        connection
            .init(options.user_agent.clone(), options.auth.clone())
            .await?;

        tracing::debug!(
            connection_id = connection.id,
            address = %connection.address,
            server = ?connection.server,
            "connection opened"
        );
        Ok(connection)
    }

    async fn init(&mut self, user_agent: String, auth: AuthToken) -> DriverResult<()> {
        let done = Completion::new();
        self.append(BoltRequest::Init { user_agent, auth }, done.clone())?;
        self.send().await?;
        while !done.is_done() {
            // The server may hang up after rejecting INIT; report the rejection.
            if let Err(e) = self.fetch().await {
                if !done.is_done() {
                    return Err(e);
                }
            }
        }

        match done.outcome() {
            Outcome::Success(metadata) => {
                self.server = metadata
                    .get("server")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                Ok(())
            }
            Outcome::Failure(failure) => {
                self.close().await;
                Err(DriverError::protocol(format!(
                    "Initialisation failed: {}",
                    failure.message
                )))
            }
            other => {
                self.close().await;
                Err(DriverError::protocol(format!(
                    "Initialisation failed: {:?}",
                    other
                )))
            }
        }
    }

    /// Queues a request and the handler for its replies. Nothing is written
    /// until [`Connection::send`].
    pub fn append(
        &mut self,
        request: BoltRequest,
        handler: impl ResponseHandler + 'static,
    ) -> DriverResult<()> {
        tracing::debug!(connection_id = self.id, request = request.name(), "C: append");
        let name = request.name();
        self.codec.encode(request, &mut self.write_buffer)?;
        self.responses.push_back(Response::new(name, handler));
        Ok(())
    }

    /// Writes every appended request, in append order.
    pub async fn send(&mut self) -> DriverResult<()> {
        self.ensure_usable("write to")?;
        if self.write_buffer.is_empty() {
            return Ok(());
        }

        let written = match self.stream.write_all(&self.write_buffer).await {
            Ok(()) => self.stream.flush().await,
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => {
                tracing::debug!(
                    connection_id = self.id,
                    bytes = self.write_buffer.len(),
                    "C: send"
                );
                self.write_buffer.clear();
                Ok(())
            }
            Err(e) => {
                let reason = format!("Send failed: {}", e);
                self.defunct(&reason).await;
                Err(DriverError::connection(reason))
            }
        }
    }

    /// Reads one message and dispatches it to the oldest pending response.
    ///
    /// A FAILURE is acknowledged before returning, so the server leaves its
    /// failed state; replies that arrive meanwhile go to their own responses.
    pub async fn fetch(&mut self) -> DriverResult<()> {
        self.ensure_usable("read from")?;
        if self.dispatch_next().await? {
            self.acknowledge_failure().await?;
        }
        Ok(())
    }

    /// Returns whether the dispatched message was a FAILURE.
    async fn dispatch_next(&mut self) -> DriverResult<bool> {
        let message = self.receive().await?;
        tracing::debug!(connection_id = self.id, message = message.name(), "S: receive");

        if self.responses.is_empty() {
            let reason = format!("Received {} with no pending request", message.name());
            self.defunct(&reason).await;
            return Err(DriverError::protocol(reason));
        }

        let failed = matches!(message, BoltResponse::Failure(_));
        if message.is_summary() {
            if let Some(mut response) = self.responses.pop_front() {
                response.dispatch(message);
            }
        } else if let Some(response) = self.responses.front_mut() {
            response.dispatch(message);
        }
        Ok(failed)
    }

    async fn acknowledge_failure(&mut self) -> DriverResult<()> {
        let ack = Completion::new();
        self.append(BoltRequest::AckFailure, ack.clone())?;
        self.send().await?;
        while !ack.is_done() {
            self.dispatch_next().await?;
        }
        match ack.outcome() {
            Outcome::Success(_) => Ok(()),
            other => {
                self.defunct("ACK_FAILURE failed").await;
                Err(DriverError::protocol(format!(
                    "ACK_FAILURE failed: {:?}",
                    other
                )))
            }
        }
    }

    async fn receive(&mut self) -> DriverResult<BoltResponse> {
        loop {
            match self.codec.decode(&mut self.read_buffer) {
                Ok(Some(message)) => return Ok(message),
                Ok(None) => {}
                Err(e) => {
                    self.defunct(&format!("Malformed message: {}", e)).await;
                    return Err(e.into());
                }
            }

            let reason = match self.stream.read_buf(&mut self.read_buffer).await {
                Ok(0) => "Connection closed by server".to_string(),
                Ok(_) => continue,
                Err(e) => format!("Read failed: {}", e),
            };
            self.defunct(&reason).await;
            return Err(DriverError::connection(reason));
        }
    }

    /// Returns the server session to a clean state without closing the
    /// transport. Replies still owed to earlier requests are dispatched first.
    pub async fn reset(&mut self) -> DriverResult<()> {
        let done = Completion::new();
        self.append(BoltRequest::Reset, done.clone())?;
        self.send().await?;
        while !done.is_done() {
            self.fetch().await?;
        }
        match done.outcome() {
            Outcome::Success(_) => Ok(()),
            other => {
                self.defunct("RESET failed").await;
                Err(DriverError::protocol(format!("Reset failed: {:?}", other)))
            }
        }
    }

    /// Shuts down the transport. Idempotent.
    pub async fn close(&mut self) {
        if self.health.is_closed() {
            return;
        }
        self.health.mark_closed();
        for mut response in self.responses.drain(..) {
            response.disconnect("Connection closed");
        }
        let _ = self.stream.shutdown().await;
        tracing::debug!(connection_id = self.id, "connection closed");
    }

    /// Marks the connection defunct, fails every pending response and closes
    /// the transport.
    async fn defunct(&mut self, reason: &str) {
        tracing::warn!(connection_id = self.id, reason, "connection defunct");
        self.health.mark_defunct();
        for mut response in self.responses.drain(..) {
            response.disconnect(reason);
        }
        self.close().await;
    }

    fn ensure_usable(&self, action: &str) -> DriverResult<()> {
        if self.health.is_closed() {
            Err(DriverError::protocol(format!(
                "Cannot {} a closed connection",
                action
            )))
        } else if self.health.is_defunct() {
            Err(DriverError::protocol(format!(
                "Cannot {} a defunct connection",
                action
            )))
        } else {
            Ok(())
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Server agent string reported in reply to INIT.
    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    pub fn health(&self) -> Arc<ConnectionHealth> {
        Arc::clone(&self.health)
    }

    pub fn is_healthy(&self) -> bool {
        self.health.is_healthy()
    }

    pub fn is_closed(&self) -> bool {
        self.health.is_closed()
    }

    pub fn is_defunct(&self) -> bool {
        self.health.is_defunct()
    }

    /// Number of requests still waiting for their summary.
    pub fn pending(&self) -> usize {
        self.responses.len()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("pending", &self.responses.len())
            .field("health", &self.health)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bolt::codec::BoltRequestCodec;
    use crate::bolt::handshake::HANDSHAKE_SIZE;
    use crate::bolt::message::{FailureMessage, Metadata, RecordMessage, SuccessMessage};
    use crate::bolt::PackStreamValue;
    use futures::{SinkExt, StreamExt};
    use parking_lot::Mutex;
    use tokio::io::DuplexStream;
    use tokio_util::codec::Framed;

    pub(crate) type FakeServer<S> = Framed<S, BoltRequestCodec>;

    /// Server half of the handshake and INIT exchange.
    pub(crate) async fn accept<S>(mut io: S) -> FakeServer<S>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut preamble = [0u8; HANDSHAKE_SIZE];
        io.read_exact(&mut preamble).await.unwrap();
        io.write_all(&[0, 0, 0, 1]).await.unwrap();
        let mut server = Framed::new(io, BoltRequestCodec::new());
        match server.next().await.unwrap().unwrap() {
            BoltRequest::Init { .. } => {}
            other => panic!("expected INIT, got {:?}", other),
        }
        server.send(success()).await.unwrap();
        server
    }

    pub(crate) fn success() -> BoltResponse {
        BoltResponse::Success(SuccessMessage::default())
    }

    pub(crate) fn record(values: Vec<PackStreamValue>) -> BoltResponse {
        BoltResponse::Record(RecordMessage::new(values))
    }

    pub(crate) async fn expect<S>(server: &mut FakeServer<S>) -> BoltRequest
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        server.next().await.unwrap().unwrap()
    }

    async fn pair() -> (Connection, FakeServer<DuplexStream>) {
        let (client, server) = tokio::io::duplex(8192);
        let options = ConnectOptions::default();
        let (connection, server) = tokio::join!(
            Connection::open(client, "test:7687", &options),
            accept(server)
        );
        (connection.unwrap(), server)
    }

    #[derive(Clone)]
    struct Log {
        name: &'static str,
        events: Arc<Mutex<Vec<String>>>,
    }

    impl Log {
        fn push(&self, event: &str) {
            self.events.lock().push(format!("{} {}", self.name, event));
        }
    }

    impl ResponseHandler for Log {
        fn on_success(&mut self, _metadata: Metadata) {
            self.push("success");
        }

        fn on_record(&mut self, _values: Vec<PackStreamValue>) {
            self.push("record");
        }

        fn on_failure(&mut self, _failure: FailureMessage) {
            self.push("failure");
        }

        fn on_ignored(&mut self) {
            self.push("ignored");
        }

        fn on_disconnect(&mut self, _reason: &str) {
            self.push("disconnect");
        }
    }

    fn logs() -> (Log, Log, Arc<Mutex<Vec<String>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let run = Log {
            name: "run",
            events: Arc::clone(&events),
        };
        let pull = Log {
            name: "pull",
            events: Arc::clone(&events),
        };
        (run, pull, events)
    }

    fn run(statement: &str) -> BoltRequest {
        BoltRequest::Run {
            statement: statement.to_string(),
            parameters: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_replies_match_requests_in_order() {
        let (mut connection, mut server) = pair().await;
        let (run_log, pull_log, events) = logs();

        connection.append(run("RETURN 1"), run_log).unwrap();
        connection.append(BoltRequest::PullAll, pull_log).unwrap();
        connection.send().await.unwrap();

        assert!(matches!(expect(&mut server).await, BoltRequest::Run { .. }));
        assert_eq!(expect(&mut server).await, BoltRequest::PullAll);
        server
            .send(BoltResponse::Success(SuccessMessage::with_fields(&["x"])))
            .await
            .unwrap();
        server.send(record(vec![1i64.into()])).await.unwrap();
        server.send(record(vec![2i64.into()])).await.unwrap();
        server.send(success()).await.unwrap();

        while connection.pending() > 0 {
            connection.fetch().await.unwrap();
        }
        assert_eq!(
            *events.lock(),
            vec!["run success", "pull record", "pull record", "pull success"]
        );
    }

    #[tokio::test]
    async fn test_failure_is_acknowledged() {
        let (mut connection, mut server) = pair().await;
        let (run_log, pull_log, events) = logs();

        connection.append(run("BAD"), run_log).unwrap();
        connection.append(BoltRequest::PullAll, pull_log).unwrap();
        connection.send().await.unwrap();

        let script = tokio::spawn(async move {
            expect(&mut server).await;
            expect(&mut server).await;
            server
                .send(BoltResponse::Failure(FailureMessage::new(
                    "Neo.ClientError.Statement.SyntaxError",
                    "Invalid input",
                )))
                .await
                .unwrap();
            server.send(BoltResponse::Ignored).await.unwrap();
            assert_eq!(expect(&mut server).await, BoltRequest::AckFailure);
            server.send(success()).await.unwrap();
            server
        });

        connection.fetch().await.unwrap();
        assert_eq!(*events.lock(), vec!["run failure", "pull ignored"]);
        assert_eq!(connection.pending(), 0);
        assert!(connection.is_healthy());
        script.await.unwrap();
    }

    #[tokio::test]
    async fn test_eof_marks_defunct_and_fails_pending() {
        let (mut connection, server) = pair().await;
        let (run_log, pull_log, events) = logs();
        connection.append(run("RETURN 1"), run_log).unwrap();
        connection.append(BoltRequest::PullAll, pull_log).unwrap();
        connection.send().await.unwrap();
        drop(server);

        let err = connection.fetch().await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(connection.is_defunct());
        assert!(!connection.is_healthy());
        assert_eq!(*events.lock(), vec!["run disconnect", "pull disconnect"]);

        let err = connection.fetch().await.unwrap_err();
        assert!(matches!(err, DriverError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_fetch_on_closed_connection() {
        let (mut connection, _server) = pair().await;
        connection.close().await;
        connection.close().await;
        assert!(connection.is_closed());
        let err = connection.fetch().await.unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[tokio::test]
    async fn test_unsolicited_message_is_protocol_error() {
        let (mut connection, mut server) = pair().await;
        server.send(success()).await.unwrap();
        let err = connection.fetch().await.unwrap_err();
        assert!(matches!(err, DriverError::Protocol(_)));
        assert!(connection.is_defunct());
    }

    #[tokio::test]
    async fn test_reset() {
        let (mut connection, mut server) = pair().await;
        let script = tokio::spawn(async move {
            assert_eq!(expect(&mut server).await, BoltRequest::Reset);
            server.send(success()).await.unwrap();
            server
        });
        connection.reset().await.unwrap();
        assert!(connection.is_healthy());
        script.await.unwrap();
    }

    #[tokio::test]
    async fn test_init_failure() {
        let (client, mut io) = tokio::io::duplex(8192);
        let script = tokio::spawn(async move {
            let mut preamble = [0u8; HANDSHAKE_SIZE];
            io.read_exact(&mut preamble).await.unwrap();
            io.write_all(&[0, 0, 0, 1]).await.unwrap();
            let mut server = Framed::new(io, BoltRequestCodec::new());
            expect(&mut server).await;
            server
                .send(BoltResponse::Failure(FailureMessage::new(
                    "Neo.ClientError.Security.Unauthorized",
                    "bad credentials",
                )))
                .await
                .unwrap();
        });

        let err = Connection::open(client, "test:7687", &ConnectOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Protocol(_)));
        assert!(err.to_string().contains("Initialisation failed: bad credentials"));
        script.await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_ids_are_unique() {
        let (a, _sa) = pair().await;
        let (b, _sb) = pair().await;
        assert_ne!(a.id(), b.id());
    }
}
