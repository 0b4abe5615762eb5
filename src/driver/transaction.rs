//! Transaction API
//!
//! Explicit transactions issued through their session as BEGIN, COMMIT and
//! ROLLBACK statements.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::{DriverError, DriverResult};
use super::result::StatementResult;
use super::session::{Query, SessionCore};
use super::types::Value;

#[derive(Debug, Default)]
pub(crate) struct TransactionState {
    /// Commit on close when true, roll back otherwise
    success: bool,
    closed: bool,
}

/// An open transaction.
///
/// `commit` and `rollback` only decide the outcome; [`Transaction::close`]
/// sends it. Clones refer to the same transaction.
#[derive(Clone)]
pub struct Transaction {
    session: Arc<SessionCore>,
    state: Arc<Mutex<TransactionState>>,
}

/// Flags of an open transaction, as remembered by its session.
pub(crate) type TransactionHandle = Arc<Mutex<TransactionState>>;

impl Transaction {
    pub(crate) async fn begin(session: Arc<SessionCore>) -> DriverResult<Self> {
        let transaction = Self {
            session,
            state: TransactionHandle::default(),
        };
        transaction.session.open_transaction(&transaction.state)?;
        // Wait for BEGIN so that a rejection surfaces here.
        let begun = match transaction.session.run_statement(Query::new("BEGIN")).await {
            Ok(mut result) => result.consume().await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = begun {
            transaction.state.lock().closed = true;
            transaction.session.end_transaction();
            return Err(e);
        }
        Ok(transaction)
    }

    /// Rebuilds the transaction a session is holding open.
    pub(crate) fn attach(session: Arc<SessionCore>, state: TransactionHandle) -> Self {
        Self { session, state }
    }

    /// Runs a statement in this transaction.
    pub async fn run(
        &self,
        query: impl Into<Query>,
        params: Option<HashMap<String, Value>>,
    ) -> DriverResult<StatementResult> {
        self.ensure_open()?;
        let mut query = query.into();
        if let Some(p) = params {
            query = query.with_params(p);
        }
        self.session.run_statement(query).await
    }

    /// Marks the transaction to commit on close. Idempotent.
    pub fn commit(&self) -> DriverResult<()> {
        self.set_success(true)
    }

    /// Marks the transaction to roll back on close.
    pub fn rollback(&self) -> DriverResult<()> {
        self.set_success(false)
    }

    pub fn set_success(&self, success: bool) -> DriverResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(closed_error());
        }
        state.success = success;
        Ok(())
    }

    pub fn success(&self) -> bool {
        self.state.lock().success
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Sends COMMIT if the transaction was marked successful, ROLLBACK
    /// otherwise, and waits for the server to confirm. The session is idle
    /// afterwards, even if the statement failed.
    pub async fn close(&self) -> DriverResult<()> {
        let success = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(closed_error());
            }
            state.closed = true;
            state.success
        };

        let statement = if success { "COMMIT" } else { "ROLLBACK" };
        tracing::debug!(statement, "closing transaction");
        let outcome = match self.session.run_statement(Query::new(statement)).await {
            Ok(mut result) => result.consume().await.map(|_| ()),
            Err(e) => Err(e),
        };
        self.session.end_transaction();
        outcome
    }

    /// Runs `work` with this transaction, then closes it unless `work` did.
    ///
    /// An error from `work` forces a rollback, whatever was decided before.
    pub async fn scope<F, Fut, T>(self, work: F) -> DriverResult<T>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = DriverResult<T>>,
    {
        let outcome = work(self.clone()).await;
        if outcome.is_err() {
            self.state.lock().success = false;
        }
        if !self.is_closed() {
            let closed = self.close().await;
            if outcome.is_ok() {
                closed?;
            }
        }
        outcome
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.is_closed() {
            Err(closed_error())
        } else {
            Ok(())
        }
    }
}

fn closed_error() -> DriverError {
    DriverError::protocol("Transaction closed")
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Transaction")
            .field("success", &state.success)
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::message::FailureMessage;
    use crate::bolt::{BoltRequest, BoltResponse};
    use crate::driver::connection::tests::{expect, success};
    use crate::driver::error::ResultError;
    use crate::driver::session::tests::{answer_empty, session_with, statement};
    use futures::SinkExt;
    use std::sync::Weak;

    #[tokio::test]
    async fn test_commit_issues_commit() {
        let (session, mut server) = session_with(Weak::new()).await;
        let script = tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..3 {
                seen.push(answer_empty(&mut server).await);
            }
            seen
        });

        let tx = session.begin_transaction().await.unwrap();
        tx.run("CREATE (n)", None).await.unwrap();
        tx.commit().unwrap();
        tx.commit().unwrap();
        assert!(tx.success());
        tx.close().await.unwrap();

        assert!(tx.is_closed());
        assert!(!session.in_transaction());
        assert_eq!(script.await.unwrap(), vec!["BEGIN", "CREATE (n)", "COMMIT"]);
    }

    #[tokio::test]
    async fn test_default_is_rollback() {
        let (session, mut server) = session_with(Weak::new()).await;
        let script = tokio::spawn(async move {
            vec![
                answer_empty(&mut server).await,
                answer_empty(&mut server).await,
            ]
        });

        let tx = session.begin_transaction().await.unwrap();
        tx.close().await.unwrap();
        assert_eq!(script.await.unwrap(), vec!["BEGIN", "ROLLBACK"]);
    }

    #[tokio::test]
    async fn test_closed_transaction_rejects_calls() {
        let (session, mut server) = session_with(Weak::new()).await;
        let script = tokio::spawn(async move {
            answer_empty(&mut server).await;
            answer_empty(&mut server).await;
            server
        });

        let tx = session.begin_transaction().await.unwrap();
        tx.rollback().unwrap();
        tx.close().await.unwrap();

        assert!(matches!(tx.close().await, Err(DriverError::Protocol(_))));
        assert!(matches!(tx.commit(), Err(DriverError::Protocol(_))));
        assert!(matches!(tx.rollback(), Err(DriverError::Protocol(_))));
        assert!(matches!(tx.run("RETURN 1", None).await, Err(DriverError::Protocol(_))));
        script.await.unwrap();
    }

    #[tokio::test]
    async fn test_scope_error_forces_rollback() {
        let (session, mut server) = session_with(Weak::new()).await;
        let script = tokio::spawn(async move {
            vec![
                answer_empty(&mut server).await,
                answer_empty(&mut server).await,
            ]
        });

        let outcome: DriverResult<()> = session
            .run_transaction(|tx| async move {
                tx.commit()?;
                Err::<(), _>(DriverError::protocol("work failed"))
            })
            .await;

        assert!(outcome.is_err());
        assert!(!session.in_transaction());
        assert_eq!(script.await.unwrap(), vec!["BEGIN", "ROLLBACK"]);
    }

    #[tokio::test]
    async fn test_scope_commits_when_marked() {
        let (session, mut server) = session_with(Weak::new()).await;
        let script = tokio::spawn(async move {
            vec![
                answer_empty(&mut server).await,
                answer_empty(&mut server).await,
            ]
        });

        let value = session
            .run_transaction(|tx| async move {
                tx.commit()?;
                Ok::<_, DriverError>(42)
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(script.await.unwrap(), vec!["BEGIN", "COMMIT"]);
    }

    #[tokio::test]
    async fn test_rejected_begin_fails_begin() {
        let (session, mut server) = session_with(Weak::new()).await;
        let script = tokio::spawn(async move {
            assert_eq!(statement(&expect(&mut server).await), "BEGIN");
            assert_eq!(expect(&mut server).await, BoltRequest::PullAll);
            server
                .send(BoltResponse::Failure(FailureMessage::new(
                    "Neo.ClientError.Transaction.TransactionStartFailed",
                    "cannot begin",
                )))
                .await
                .unwrap();
            server.send(BoltResponse::Ignored).await.unwrap();
            assert_eq!(expect(&mut server).await, BoltRequest::AckFailure);
            server.send(success()).await.unwrap();
            assert_eq!(answer_empty(&mut server).await, "RETURN 1");
            server
        });

        let err = session.begin_transaction().await.unwrap_err();
        assert_eq!(err.code(), Some("Neo.ClientError.Transaction.TransactionStartFailed"));
        assert!(!session.in_transaction());

        // The session stays usable.
        let mut result = session.run("RETURN 1", None).await.unwrap();
        assert!(result.next().await.unwrap().is_none());
        script.await.unwrap();
    }

    #[tokio::test]
    async fn test_ignored_statement_is_an_error() {
        let (session, mut server) = session_with(Weak::new()).await;
        let script = tokio::spawn(async move {
            assert_eq!(answer_empty(&mut server).await, "BEGIN");
            assert_eq!(statement(&expect(&mut server).await), "CREATE (n)");
            assert_eq!(expect(&mut server).await, BoltRequest::PullAll);
            server.send(BoltResponse::Ignored).await.unwrap();
            server.send(BoltResponse::Ignored).await.unwrap();
            server
        });

        let tx = session.begin_transaction().await.unwrap();
        let mut result = tx.run("CREATE (n)", None).await.unwrap();
        let err = result.consume().await.unwrap_err();
        assert!(matches!(err, DriverError::Result(ResultError::Ignored)));
        let _server = script.await.unwrap();
    }
}
