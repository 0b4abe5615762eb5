//! Response handlers.
//!
//! Every request appended to a connection gets a [`Response`]. Replies are
//! matched to responses strictly in the order the requests were appended:
//! RECORD messages go to the oldest incomplete response, and the summary
//! message (SUCCESS, FAILURE or IGNORED) completes it.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::bolt::message::{FailureMessage, Metadata};
use crate::bolt::{BoltResponse, PackStreamValue};

/// Callbacks for the replies to one request. All methods default to no-ops.
pub trait ResponseHandler: Send {
    /// Successful completion, with the SUCCESS metadata.
    fn on_success(&mut self, _metadata: Metadata) {}

    /// One RECORD of a result stream.
    fn on_record(&mut self, _values: Vec<PackStreamValue>) {}

    /// The server rejected the request.
    fn on_failure(&mut self, _failure: FailureMessage) {}

    /// The server skipped the request after an earlier failure.
    fn on_ignored(&mut self) {}

    /// The connection broke before the request completed.
    fn on_disconnect(&mut self, _reason: &str) {}
}

/// A pending request and its handler.
pub struct Response {
    request: &'static str,
    handler: Box<dyn ResponseHandler>,
    complete: bool,
}

impl Response {
    pub fn new(request: &'static str, handler: impl ResponseHandler + 'static) -> Self {
        Self {
            request,
            handler: Box::new(handler),
            complete: false,
        }
    }

    /// Name of the request this response belongs to.
    pub fn request(&self) -> &'static str {
        self.request
    }

    /// True once a summary message has been dispatched.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Hands one reply to the handler. Summary messages complete the response.
    pub fn dispatch(&mut self, message: BoltResponse) {
        match message {
            BoltResponse::Record(record) => self.handler.on_record(record.fields),
            BoltResponse::Success(success) => {
                self.complete = true;
                self.handler.on_success(success.metadata);
            }
            BoltResponse::Failure(failure) => {
                self.complete = true;
                self.handler.on_failure(failure);
            }
            BoltResponse::Ignored => {
                self.complete = true;
                self.handler.on_ignored();
            }
        }
    }

    pub(crate) fn disconnect(&mut self, reason: &str) {
        self.complete = true;
        self.handler.on_disconnect(reason);
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("request", &self.request)
            .field("complete", &self.complete)
            .finish()
    }
}

/// How a request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Pending,
    Success(Metadata),
    Failure(FailureMessage),
    Ignored,
    Disconnected(String),
}

/// Handler for requests whose only interesting reply is the summary
/// (INIT, RESET, ACK_FAILURE, and BEGIN/COMMIT/ROLLBACK runs).
#[derive(Debug, Clone)]
pub struct Completion {
    outcome: Arc<Mutex<Outcome>>,
}

impl Completion {
    pub fn new() -> Self {
        Self {
            outcome: Arc::new(Mutex::new(Outcome::Pending)),
        }
    }

    pub fn is_done(&self) -> bool {
        !matches!(*self.outcome.lock(), Outcome::Pending)
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome.lock().clone()
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseHandler for Completion {
    fn on_success(&mut self, metadata: Metadata) {
        *self.outcome.lock() = Outcome::Success(metadata);
    }

    fn on_failure(&mut self, failure: FailureMessage) {
        *self.outcome.lock() = Outcome::Failure(failure);
    }

    fn on_ignored(&mut self) {
        *self.outcome.lock() = Outcome::Ignored;
    }

    fn on_disconnect(&mut self, reason: &str) {
        *self.outcome.lock() = Outcome::Disconnected(reason.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::message::{RecordMessage, SuccessMessage};

    #[derive(Clone, Default)]
    struct Trace(Arc<Mutex<Vec<String>>>);

    impl ResponseHandler for Trace {
        fn on_success(&mut self, _metadata: Metadata) {
            self.0.lock().push("success".into());
        }

        fn on_record(&mut self, values: Vec<PackStreamValue>) {
            self.0.lock().push(format!("record {}", values.len()));
        }

        fn on_failure(&mut self, failure: FailureMessage) {
            self.0.lock().push(format!("failure {}", failure.code));
        }
    }

    #[test]
    fn test_records_then_summary() {
        let trace = Trace::default();
        let mut response = Response::new("PULL_ALL", trace.clone());

        response.dispatch(BoltResponse::Record(RecordMessage::new(vec![1i64.into()])));
        assert!(!response.is_complete());
        response.dispatch(BoltResponse::Success(SuccessMessage::default()));
        assert!(response.is_complete());

        assert_eq!(*trace.0.lock(), vec!["record 1", "success"]);
    }

    #[test]
    fn test_unhandled_callbacks_are_noops() {
        let trace = Trace::default();
        let mut response = Response::new("RUN", trace.clone());
        response.dispatch(BoltResponse::Ignored);
        assert!(response.is_complete());
        assert!(trace.0.lock().is_empty());
    }

    #[test]
    fn test_completion_outcomes() {
        let completion = Completion::new();
        let mut response = Response::new("RESET", completion.clone());
        assert!(!completion.is_done());

        response.dispatch(BoltResponse::Failure(FailureMessage::new("X", "boom")));
        assert_eq!(
            completion.outcome(),
            Outcome::Failure(FailureMessage::new("X", "boom"))
        );

        let completion = Completion::new();
        Response::new("INIT", completion.clone()).disconnect("gone");
        assert_eq!(completion.outcome(), Outcome::Disconnected("gone".into()));
    }
}
