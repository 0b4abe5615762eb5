//! Session Management
//!
//! A session is one logical unit of work bound to one connection. It is
//! either idle or holds one open transaction; statements run directly on the
//! session only while it is idle.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::bolt::{BoltRequest, PackStreamValue};

use super::connection::{Connection, ConnectionHealth, SharedConnection};
use super::error::{DriverError, DriverResult};
use super::pool::SessionPool;
use super::result::StatementResult;
use super::transaction::{Transaction, TransactionHandle};
use super::types::Value;

// ============================================================================
// Query
// ============================================================================

/// Statement text and parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub text: String,
    pub parameters: HashMap<String, Value>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: HashMap<String, Value>) -> Self {
        self.parameters.extend(params);
        self
    }
}

impl From<&str> for Query {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Query {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

// ============================================================================
// SessionCore
// ============================================================================

#[derive(Default)]
struct SessionState {
    transaction: Option<TransactionHandle>,
    /// Most recent result, drained before the connection changes hands
    last_result: Option<StatementResult>,
}

/// State shared by a session and its transactions.
pub(crate) struct SessionCore {
    connection: SharedConnection,
    health: Arc<ConnectionHealth>,
    connection_id: u64,
    pool: Weak<SessionPool>,
    state: Mutex<SessionState>,
}

impl SessionCore {
    /// Appends RUN and PULL_ALL back to back, sends them, and returns the
    /// result without waiting for a reply.
    pub(crate) async fn run_statement(&self, query: Query) -> DriverResult<StatementResult> {
        let parameters: HashMap<String, Value> = query
            .parameters
            .into_iter()
            .map(|(k, v)| (k, v.normalized()))
            .collect();
        let wire: HashMap<String, PackStreamValue> = parameters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone().into()))
            .collect();

        let (result, run, pull) = StatementResult::new(
            Arc::clone(&self.connection),
            Arc::clone(&self.health),
            query.text.clone(),
            parameters,
        );
        {
            let mut connection = self.connection.lock().await;
            connection.append(
                BoltRequest::Run {
                    statement: query.text,
                    parameters: wire,
                },
                run,
            )?;
            connection.append(BoltRequest::PullAll, pull)?;
            connection.send().await?;
        }

        self.state.lock().last_result = Some(result.share());
        Ok(result)
    }

    /// Registers a new transaction unless one is already open.
    pub(crate) fn open_transaction(&self, transaction: &TransactionHandle) -> DriverResult<()> {
        let mut state = self.state.lock();
        if state.transaction.is_some() {
            return Err(DriverError::protocol(
                "Cannot begin a transaction while another is open in this session",
            ));
        }
        state.transaction = Some(Arc::clone(transaction));
        Ok(())
    }

    /// Back to idle.
    pub(crate) fn end_transaction(&self) {
        self.state.lock().transaction = None;
    }

    fn in_transaction(&self) -> bool {
        self.state.lock().transaction.is_some()
    }
}

// ============================================================================
// Session
// ============================================================================

/// Database session. Obtained from [`Driver::session`](super::Driver::session)
/// and handed back with [`Session::close`].
pub struct Session {
    core: Arc<SessionCore>,
}

impl Session {
    pub(crate) fn new(connection: Connection, pool: Weak<SessionPool>) -> Self {
        let health = connection.health();
        let connection_id = connection.id();
        Self {
            core: Arc::new(SessionCore {
                connection: Arc::new(tokio::sync::Mutex::new(connection)),
                health,
                connection_id,
                pool,
                state: Mutex::new(SessionState::default()),
            }),
        }
    }

    /// Runs a statement outside any explicit transaction.
    ///
    /// Fails with a protocol error while a transaction is open; statements
    /// must then go through the transaction.
    pub async fn run(
        &self,
        query: impl Into<Query>,
        params: Option<HashMap<String, Value>>,
    ) -> DriverResult<StatementResult> {
        if self.core.in_transaction() {
            return Err(DriverError::protocol(
                "Statements cannot be run directly on a session with an open transaction; \
                 either run from within the transaction or use a different session",
            ));
        }
        let mut query = query.into();
        if let Some(p) = params {
            query = query.with_params(p);
        }
        self.core.run_statement(query).await
    }

    /// Opens an explicit transaction. Only one may be open at a time.
    pub async fn begin_transaction(&self) -> DriverResult<Transaction> {
        Transaction::begin(Arc::clone(&self.core)).await
    }

    /// Runs `work` inside a new transaction. An error from `work` rolls the
    /// transaction back; otherwise it commits only if `work` called
    /// [`Transaction::commit`].
    pub async fn run_transaction<F, Fut, T>(&self, work: F) -> DriverResult<T>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = DriverResult<T>>,
    {
        self.begin_transaction().await?.scope(work).await
    }

    /// True while a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.core.in_transaction()
    }

    /// The connection is open and not defunct.
    pub fn is_healthy(&self) -> bool {
        self.core.health.is_healthy()
    }

    pub fn connection_id(&self) -> u64 {
        self.core.connection_id
    }

    pub(crate) fn same_as(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    /// Prepares a pooled session for its next user.
    pub(crate) async fn reset(&self) -> DriverResult<()> {
        self.core.state.lock().last_result = None;
        self.core.connection.lock().await.reset().await
    }

    pub(crate) async fn close_connection(&self) {
        self.core.connection.lock().await.close().await;
    }

    /// Drains the last result, closes any open transaction, then offers the
    /// session back to the driver's pool. The connection is closed if the
    /// pool refuses the session or the driver is gone.
    ///
    /// Cleanup always runs to completion; the first error it hit is returned.
    pub async fn close(self) -> DriverResult<()> {
        let (last_result, transaction) = {
            let mut state = self.core.state.lock();
            let transaction = state
                .transaction
                .clone()
                .map(|handle| Transaction::attach(Arc::clone(&self.core), handle));
            (state.last_result.take(), transaction)
        };

        let mut first_error = None;
        if let Some(mut result) = last_result {
            if let Err(e) = result.buffer().await {
                first_error.get_or_insert(e);
            }
        }
        if let Some(transaction) = transaction {
            if !transaction.is_closed() {
                if let Err(e) = transaction.close().await {
                    first_error.get_or_insert(e);
                }
            }
        }

        let refused = match self.core.pool.upgrade() {
            Some(pool) => pool.recycle(self).err(),
            None => Some(self),
        };
        if let Some(session) = refused {
            session.close_connection().await;
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connection_id", &self.core.connection_id)
            .field("healthy", &self.is_healthy())
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bolt::message::{FailureMessage, SuccessMessage};
    use crate::bolt::BoltResponse;
    use crate::driver::connection::tests::{accept, expect, record, success, FakeServer};
    use crate::driver::connection::ConnectOptions;
    use crate::driver::error::ResultError;
    use futures::SinkExt;
    use tokio::io::DuplexStream;

    pub(crate) async fn session_with(
        pool: Weak<SessionPool>,
    ) -> (Session, FakeServer<DuplexStream>) {
        let (client, server) = tokio::io::duplex(8192);
        let options = ConnectOptions::default();
        let (connection, server) = tokio::join!(
            Connection::open(client, "test:7687", &options),
            accept(server)
        );
        (Session::new(connection.unwrap(), pool), server)
    }

    pub(crate) fn statement(request: &BoltRequest) -> &str {
        match request {
            BoltRequest::Run { statement, .. } => statement,
            other => panic!("expected RUN, got {:?}", other),
        }
    }

    /// Answers one RUN/PULL_ALL pair with an empty result.
    pub(crate) async fn answer_empty(server: &mut FakeServer<DuplexStream>) -> String {
        let run = expect(server).await;
        assert_eq!(expect(server).await, BoltRequest::PullAll);
        server
            .send(BoltResponse::Success(SuccessMessage::with_fields::<&str>(&[])))
            .await
            .unwrap();
        server.send(success()).await.unwrap();
        statement(&run).to_string()
    }

    #[tokio::test]
    async fn test_run_and_close() {
        let pool = Arc::new(SessionPool::new(1));
        let (session, mut server) = session_with(Arc::downgrade(&pool)).await;
        let id = session.connection_id();

        let script = tokio::spawn(async move {
            let run = expect(&mut server).await;
            assert_eq!(statement(&run), "RETURN $x AS x");
            if let BoltRequest::Run { parameters, .. } = &run {
                assert_eq!(parameters.get("x"), Some(&PackStreamValue::from("text")));
            }
            expect(&mut server).await;
            server
                .send(BoltResponse::Success(SuccessMessage::with_fields(&["x"])))
                .await
                .unwrap();
            server.send(record(vec!["text".into()])).await.unwrap();
            server.send(success()).await.unwrap();
            server
        });

        let params = HashMap::from([("x".to_string(), Value::Bytes(b"text".to_vec()))]);
        let mut result = session.run("RETURN $x AS x", Some(params)).await.unwrap();
        assert_eq!(result.single().await.unwrap()["x"], Value::from("text"));

        session.close().await.unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.pop().unwrap().connection_id(), id);
        script.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_buffers_unread_result() {
        let pool = Arc::new(SessionPool::new(1));
        let (session, mut server) = session_with(Arc::downgrade(&pool)).await;

        let script = tokio::spawn(async move {
            answer_empty(&mut server).await;
            server
        });

        let result = session.run("MATCH (n) RETURN n", None).await.unwrap();
        session.close().await.unwrap();
        assert!(result.is_consumed());
        assert_eq!(pool.len(), 1);
        script.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_in_transaction_is_protocol_error() {
        let (session, mut server) = session_with(Weak::new()).await;
        let script = tokio::spawn(async move {
            assert_eq!(answer_empty(&mut server).await, "BEGIN");
            server
        });

        let transaction = session.begin_transaction().await.unwrap();
        for statement in ["RETURN 1", "CREATE (n)", ""] {
            let err = session.run(statement, None).await.unwrap_err();
            assert!(matches!(err, DriverError::Protocol(_)));
        }
        let err = session.begin_transaction().await.unwrap_err();
        assert!(matches!(err, DriverError::Protocol(_)));
        assert!(session.in_transaction());
        drop(transaction);
        script.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_rolls_back_open_transaction() {
        let pool = Arc::new(SessionPool::new(1));
        let (session, mut server) = session_with(Arc::downgrade(&pool)).await;
        let script = tokio::spawn(async move {
            assert_eq!(answer_empty(&mut server).await, "BEGIN");
            assert_eq!(answer_empty(&mut server).await, "ROLLBACK");
            server
        });

        let _transaction = session.begin_transaction().await.unwrap();
        session.close().await.unwrap();
        assert_eq!(pool.len(), 1);
        assert!(!pool.pop().unwrap().in_transaction());
        script.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_reports_failure_and_still_recycles() {
        let pool = Arc::new(SessionPool::new(1));
        let (session, mut server) = session_with(Arc::downgrade(&pool)).await;
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

        let _result = session.run("RETRUN 1", None).await.unwrap();
        let err = session.close().await.unwrap_err();
        assert_eq!(err.code(), Some("Neo.ClientError.Statement.SyntaxError"));
        assert_eq!(pool.len(), 1);
        script.await.unwrap();
    }

    #[tokio::test]
    async fn test_statement_after_failed_one_is_not_empty() {
        let (session, mut server) = session_with(Weak::new()).await;
        let script = tokio::spawn(async move {
            for _ in 0..4 {
                expect(&mut server).await;
            }
            server
                .send(BoltResponse::Failure(FailureMessage::new(
                    "Neo.ClientError.Statement.SyntaxError",
                    "Invalid input",
                )))
                .await
                .unwrap();
            for _ in 0..3 {
                server.send(BoltResponse::Ignored).await.unwrap();
            }
            assert_eq!(expect(&mut server).await, BoltRequest::AckFailure);
            server.send(success()).await.unwrap();
            server
        });

        let mut first = session.run("RETRUN 1", None).await.unwrap();
        let mut second = session.run("RETURN 2", None).await.unwrap();

        let err = second.next().await.unwrap_err();
        assert!(matches!(err, DriverError::Result(ResultError::Ignored)));
        let err = first.next().await.unwrap_err();
        assert_eq!(err.code(), Some("Neo.ClientError.Statement.SyntaxError"));
        script.await.unwrap();
    }
}
