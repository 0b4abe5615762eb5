//! Statement results.
//!
//! A [`StatementResult`] is a forward-only cursor over the records of one
//! RUN/PULL_ALL pair. Records are pulled from the connection lazily, one
//! message at a time, and only inside [`StatementResult::next`] and the
//! methods built on it.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use futures::Stream;
use parking_lot::Mutex;

use crate::bolt::message::{FailureMessage, Metadata};
use crate::bolt::PackStreamValue;

use super::connection::{ConnectionHealth, SharedConnection};
use super::error::{DriverError, DriverResult, ResultError};
use super::record::Record;
use super::response::ResponseHandler;
use super::types::Value;

// ============================================================================
// StreamState
// ============================================================================

#[derive(Debug, Default)]
struct StreamState {
    keys: Option<Arc<[String]>>,
    buffer: VecDeque<Record>,
    summary: Option<ResultSummary>,
    /// The stream has ended, successfully or not
    consumed: bool,
    /// Failure waiting to be reported to the caller
    failure: Option<DriverError>,
    /// The result no longer reads from the connection
    released: bool,
}

impl StreamState {
    fn fail(&mut self, error: DriverError) {
        if self.failure.is_none() {
            self.failure = Some(error);
        }
        self.consumed = true;
    }
}

type SharedState = Arc<Mutex<StreamState>>;

/// Replies to RUN: the header carrying the column names.
pub(crate) struct RunHandler {
    state: SharedState,
}

impl ResponseHandler for RunHandler {
    fn on_success(&mut self, metadata: Metadata) {
        let keys: Vec<String> = metadata
            .get("fields")
            .and_then(|v| v.as_list())
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|f| f.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        self.state.lock().keys = Some(keys.into());
    }

    fn on_failure(&mut self, failure: FailureMessage) {
        self.state
            .lock()
            .fail(DriverError::cypher(failure.code, failure.message));
    }

    fn on_ignored(&mut self) {
        self.state.lock().fail(ResultError::Ignored.into());
    }

    fn on_disconnect(&mut self, reason: &str) {
        self.state.lock().fail(DriverError::connection(reason));
    }
}

/// Replies to PULL_ALL: the records and the footer.
pub(crate) struct PullHandler {
    state: SharedState,
    statement: String,
    parameters: HashMap<String, Value>,
}

impl ResponseHandler for PullHandler {
    fn on_record(&mut self, values: Vec<PackStreamValue>) {
        let mut state = self.state.lock();
        if state.consumed {
            return;
        }
        let keys = match state.keys.clone() {
            Some(keys) if keys.len() == values.len() => keys,
            Some(keys) => {
                state.fail(DriverError::protocol(format!(
                    "Record has {} values but the result has {} keys",
                    values.len(),
                    keys.len()
                )));
                return;
            }
            None => {
                state.fail(DriverError::protocol("Record received before the result header"));
                return;
            }
        };
        let values = values.into_iter().map(Value::from).collect();
        state.buffer.push_back(Record::new(keys, values));
    }

    fn on_success(&mut self, metadata: Metadata) {
        let summary = ResultSummary::new(
            std::mem::take(&mut self.statement),
            std::mem::take(&mut self.parameters),
            &metadata,
        );
        let mut state = self.state.lock();
        state.summary = Some(summary);
        state.consumed = true;
    }

    fn on_failure(&mut self, failure: FailureMessage) {
        self.state
            .lock()
            .fail(DriverError::cypher(failure.code, failure.message));
    }

    fn on_ignored(&mut self) {
        self.state.lock().fail(ResultError::Ignored.into());
    }

    fn on_disconnect(&mut self, reason: &str) {
        self.state.lock().fail(DriverError::connection(reason));
    }
}

// ============================================================================
// StatementResult
// ============================================================================

/// Lazy cursor over the records of a statement.
///
/// A server failure for the statement is reported once, by whichever call
/// observes it first; the result counts as consumed afterwards.
pub struct StatementResult {
    connection: SharedConnection,
    health: Arc<ConnectionHealth>,
    state: SharedState,
}

impl StatementResult {
    /// Creates a result and the two handlers to append with RUN and PULL_ALL.
    pub(crate) fn new(
        connection: SharedConnection,
        health: Arc<ConnectionHealth>,
        statement: String,
        parameters: HashMap<String, Value>,
    ) -> (Self, RunHandler, PullHandler) {
        let state = SharedState::default();
        let run = RunHandler {
            state: Arc::clone(&state),
        };
        let pull = PullHandler {
            state: Arc::clone(&state),
            statement,
            parameters,
        };
        (
            Self {
                connection,
                health,
                state,
            },
            run,
            pull,
        )
    }

    /// A second cursor over the same stream, kept by the session so it can
    /// drain the stream before the connection is reused.
    pub(crate) fn share(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
            health: Arc::clone(&self.health),
            state: Arc::clone(&self.state),
        }
    }

    /// Reads one more message from the connection.
    async fn fetch_more(&self) -> DriverResult<()> {
        let fetched = self.connection.lock().await.fetch().await;
        if let Err(e) = fetched {
            // The disconnect notice for this stream is the same failure.
            self.state.lock().failure = None;
            return Err(e);
        }
        Ok(())
    }

    /// Next record, or `None` at the end of the stream.
    pub async fn next(&mut self) -> DriverResult<Option<Record>> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(record) = state.buffer.pop_front() {
                    return Ok(Some(record));
                }
                if let Some(failure) = state.failure.take() {
                    return Err(failure);
                }
                if state.consumed {
                    state.released = true;
                    return Ok(None);
                }
            }
            self.fetch_more().await?;
        }
    }

    /// Column names, waiting for the RUN reply if needed.
    pub async fn keys(&mut self) -> DriverResult<Vec<String>> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(keys) = &state.keys {
                    return Ok(keys.to_vec());
                }
                if let Some(failure) = state.failure.take() {
                    return Err(failure);
                }
                if state.consumed {
                    return Ok(Vec::new());
                }
            }
            self.fetch_more().await?;
        }
    }

    /// The next record without advancing the cursor.
    pub async fn peek(&mut self) -> DriverResult<Record> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(record) = state.buffer.front() {
                    return Ok(record.clone());
                }
                if let Some(failure) = state.failure.take() {
                    return Err(failure);
                }
                if state.consumed {
                    return Err(ResultError::EndOfStream.into());
                }
            }
            self.fetch_more().await?;
        }
    }

    /// Every remaining record.
    pub async fn collect(&mut self) -> DriverResult<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        Ok(records)
    }

    /// The only record of the result.
    pub async fn single(&mut self) -> DriverResult<Record> {
        let mut records = self.collect().await?;
        match records.len() {
            0 => Err(ResultError::EmptyResult.into()),
            1 => Ok(records.remove(0)),
            _ => Err(ResultError::MultipleRecords.into()),
        }
    }

    /// Reads the rest of the stream into the local buffer, releasing the
    /// connection. Records stay available to [`StatementResult::next`].
    pub async fn buffer(&mut self) -> DriverResult<()> {
        if self.is_released() {
            return Ok(());
        }
        loop {
            {
                let mut state = self.state.lock();
                if let Some(failure) = state.failure.take() {
                    state.released = state.consumed;
                    return Err(failure);
                }
                if state.consumed {
                    state.released = true;
                    return Ok(());
                }
            }
            self.fetch_more().await?;
        }
    }

    /// Discards the rest of the stream and returns the summary. `None` when
    /// the stream ended without one.
    pub async fn consume(&mut self) -> DriverResult<Option<ResultSummary>> {
        let drained = self.buffer().await;
        self.state.lock().buffer.clear();
        drained?;
        Ok(self.summary())
    }

    /// The summary, once the stream has ended.
    pub fn summary(&self) -> Option<ResultSummary> {
        self.state.lock().summary.clone()
    }

    /// True once the stream has ended.
    pub fn is_consumed(&self) -> bool {
        self.state.lock().consumed
    }

    fn is_released(&self) -> bool {
        self.state.lock().released || self.health.is_closed()
    }

    /// Adapts the cursor into a [`Stream`] of records.
    pub fn into_stream(self) -> impl Stream<Item = DriverResult<Record>> {
        futures::stream::unfold(Some(self), |cursor| async move {
            let mut cursor = cursor?;
            match cursor.next().await {
                Ok(Some(record)) => Some((Ok(record), Some(cursor))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

impl std::fmt::Debug for StatementResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StatementResult")
            .field("keys", &state.keys)
            .field("buffered", &state.buffer.len())
            .field("consumed", &state.consumed)
            .finish()
    }
}

// ============================================================================
// ResultSummary
// ============================================================================

/// Information about a completed statement, built from the PULL_ALL footer.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSummary {
    pub statement: String,
    pub parameters: HashMap<String, Value>,
    pub statement_type: Option<StatementType>,
    pub counters: Counters,
    /// Execution plan. Also set from `profile` when the statement was profiled.
    pub plan: Option<Plan>,
    pub profile: Option<Plan>,
    pub notifications: Vec<Notification>,
}

impl ResultSummary {
    pub fn new(statement: String, parameters: HashMap<String, Value>, metadata: &Metadata) -> Self {
        let statement_type = metadata
            .get("type")
            .and_then(|v| v.as_str())
            .and_then(StatementType::from_code);
        let counters = metadata
            .get("stats")
            .and_then(|v| v.as_map())
            .map(Counters::from_stats)
            .unwrap_or_default();
        let profile = metadata
            .get("profile")
            .and_then(|v| v.as_map())
            .and_then(Plan::from_map);
        let plan = match &profile {
            Some(profile) => Some(profile.clone()),
            None => metadata
                .get("plan")
                .and_then(|v| v.as_map())
                .and_then(Plan::from_map),
        };
        let notifications = metadata
            .get("notifications")
            .and_then(|v| v.as_list())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|n| n.as_map().map(Notification::from_map))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            statement,
            parameters,
            statement_type,
            counters,
            plan,
            profile,
            notifications,
        }
    }
}

/// Kind of work a statement performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementType {
    /// `r`
    ReadOnly,
    /// `rw`
    ReadWrite,
    /// `w`
    WriteOnly,
    /// `s`
    SchemaWrite,
}

impl StatementType {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "r" => Some(Self::ReadOnly),
            "rw" => Some(Self::ReadWrite),
            "w" => Some(Self::WriteOnly),
            "s" => Some(Self::SchemaWrite),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::ReadOnly => "r",
            Self::ReadWrite => "rw",
            Self::WriteOnly => "w",
            Self::SchemaWrite => "s",
        }
    }
}

/// Update counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    pub nodes_created: i64,
    pub nodes_deleted: i64,
    pub relationships_created: i64,
    pub relationships_deleted: i64,
    pub properties_set: i64,
    pub labels_added: i64,
    pub labels_removed: i64,
    pub indexes_added: i64,
    pub indexes_removed: i64,
    pub constraints_added: i64,
    pub constraints_removed: i64,
}

impl Counters {
    /// Reads the `stats` map. Server keys use dashes (`nodes-created`).
    pub fn from_stats(stats: &HashMap<String, PackStreamValue>) -> Self {
        let mut counters = Self::default();
        for (key, value) in stats {
            let Some(count) = value.as_int() else {
                continue;
            };
            let slot = match key.replace('-', "_").as_str() {
                "nodes_created" => &mut counters.nodes_created,
                "nodes_deleted" => &mut counters.nodes_deleted,
                "relationships_created" => &mut counters.relationships_created,
                "relationships_deleted" => &mut counters.relationships_deleted,
                "properties_set" => &mut counters.properties_set,
                "labels_added" => &mut counters.labels_added,
                "labels_removed" => &mut counters.labels_removed,
                "indexes_added" => &mut counters.indexes_added,
                "indexes_removed" => &mut counters.indexes_removed,
                "constraints_added" => &mut counters.constraints_added,
                "constraints_removed" => &mut counters.constraints_removed,
                _ => continue,
            };
            *slot = count;
        }
        counters
    }

    /// True if any counter is non-zero.
    pub fn contains_updates(&self) -> bool {
        [
            self.nodes_created,
            self.nodes_deleted,
            self.relationships_created,
            self.relationships_deleted,
            self.properties_set,
            self.labels_added,
            self.labels_removed,
            self.indexes_added,
            self.indexes_removed,
            self.constraints_added,
            self.constraints_removed,
        ]
        .iter()
        .any(|c| *c != 0)
    }
}

/// A node of an execution plan tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// From EXPLAIN: the plan without execution statistics.
    Explained {
        operator_type: String,
        identifiers: Vec<String>,
        arguments: HashMap<String, Value>,
        children: Vec<Plan>,
    },
    /// From PROFILE: the plan as executed.
    Profiled {
        operator_type: String,
        identifiers: Vec<String>,
        arguments: HashMap<String, Value>,
        children: Vec<Plan>,
        db_hits: i64,
        rows: i64,
    },
}

impl Plan {
    /// Parses a plan map. Maps carrying `dbHits` or `rows` are profiled.
    pub fn from_map(map: &HashMap<String, PackStreamValue>) -> Option<Self> {
        let operator_type = map.get("operatorType")?.as_str()?.to_string();
        let identifiers = map
            .get("identifiers")
            .and_then(|v| v.as_list())
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let arguments = map
            .get("args")
            .and_then(|v| v.as_map())
            .map(|args| {
                args.iter()
                    .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                    .collect()
            })
            .unwrap_or_default();
        let children = map
            .get("children")
            .and_then(|v| v.as_list())
            .map(|children| {
                children
                    .iter()
                    .filter_map(|c| c.as_map().and_then(Plan::from_map))
                    .collect()
            })
            .unwrap_or_default();

        if map.contains_key("dbHits") || map.contains_key("rows") {
            let counter = |key: &str| map.get(key).and_then(|v| v.as_int()).unwrap_or(0);
            Some(Plan::Profiled {
                operator_type,
                identifiers,
                arguments,
                children,
                db_hits: counter("dbHits"),
                rows: counter("rows"),
            })
        } else {
            Some(Plan::Explained {
                operator_type,
                identifiers,
                arguments,
                children,
            })
        }
    }

    pub fn operator_type(&self) -> &str {
        match self {
            Plan::Explained { operator_type, .. } | Plan::Profiled { operator_type, .. } => {
                operator_type
            }
        }
    }

    pub fn identifiers(&self) -> &[String] {
        match self {
            Plan::Explained { identifiers, .. } | Plan::Profiled { identifiers, .. } => identifiers,
        }
    }

    pub fn arguments(&self) -> &HashMap<String, Value> {
        match self {
            Plan::Explained { arguments, .. } | Plan::Profiled { arguments, .. } => arguments,
        }
    }

    pub fn children(&self) -> &[Plan] {
        match self {
            Plan::Explained { children, .. } | Plan::Profiled { children, .. } => children,
        }
    }

    pub fn db_hits(&self) -> Option<i64> {
        match self {
            Plan::Profiled { db_hits, .. } => Some(*db_hits),
            Plan::Explained { .. } => None,
        }
    }

    pub fn rows(&self) -> Option<i64> {
        match self {
            Plan::Profiled { rows, .. } => Some(*rows),
            Plan::Explained { .. } => None,
        }
    }

    pub fn is_profiled(&self) -> bool {
        matches!(self, Plan::Profiled { .. })
    }
}

/// A warning or hint attached to a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub code: String,
    pub title: String,
    pub description: String,
    pub severity: String,
    pub position: Option<InputPosition>,
}

impl Notification {
    fn from_map(map: &HashMap<String, PackStreamValue>) -> Self {
        let text = |key: &str| {
            map.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let position = map.get("position").and_then(|v| v.as_map()).map(|p| {
            let at = |key: &str| p.get(key).and_then(|v| v.as_int()).unwrap_or(0);
            InputPosition {
                offset: at("offset"),
                line: at("line"),
                column: at("column"),
            }
        });
        Self {
            code: text("code"),
            title: text("title"),
            description: text("description"),
            severity: text("severity"),
            position,
        }
    }
}

/// Location in the statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputPosition {
    pub offset: i64,
    pub line: i64,
    pub column: i64,
}

// ============================================================================
// Tests
// ============================================================================
