//! The tablet-call contract between the scatter core and the routing
//! layer.
//!
//! The gateway owns tablet discovery, health-driven tablet selection,
//! and the connection pool; the scatter core treats it as an oracle
//! that either serves a `Target` on some live tablet or, when asked for
//! a specific `TabletAlias`, refuses with a "wrong tablet" error.
//!
//! Calls that can open a transaction or reserve a connection return
//! their outcome structs rather than a plain `Result`: a tablet may
//! allocate a transaction or reserved connection and *then* fail the
//! query, and the session must learn about those IDs either way.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use harrier_common::cancel::CancelToken;
use harrier_common::error::GateResult;
use harrier_common::types::{TabletAlias, Target};

use crate::query::{ExecuteOptions, QueryResult, Value};

/// Callback receiving partial results on streaming calls. The scatter
/// core guarantees it is never invoked concurrently.
pub type StreamCallback<'a> = &'a (dyn Fn(QueryResult) -> GateResult<()> + Sync);

/// Outcome of a call that may have opened a transaction.
/// `transaction_id` is meaningful even when `result` is an error.
#[derive(Debug)]
pub struct BeginOutcome<T = QueryResult> {
    pub result: GateResult<T>,
    /// New transaction id, 0 when none was opened.
    pub transaction_id: i64,
    /// Alias of the tablet that served the call, when known.
    pub alias: Option<TabletAlias>,
}

/// Outcome of a call that may have reserved a connection.
#[derive(Debug)]
pub struct ReserveOutcome<T = QueryResult> {
    pub result: GateResult<T>,
    /// New reserved connection id, 0 when none was created.
    pub reserved_id: i64,
    pub alias: Option<TabletAlias>,
}

/// Outcome of a call that may have done both.
#[derive(Debug)]
pub struct ReserveBeginOutcome<T = QueryResult> {
    pub result: GateResult<T>,
    pub transaction_id: i64,
    pub reserved_id: i64,
    pub alias: Option<TabletAlias>,
}

/// Query operations a tablet exposes to the scatter core.
pub trait QueryService: Send + Sync {
    /// Execute inside the given transaction and/or reserved connection
    /// (0 = none).
    fn execute(
        &self,
        target: &Target,
        sql: &str,
        bind_vars: &HashMap<String, Value>,
        transaction_id: i64,
        reserved_id: i64,
        options: &ExecuteOptions,
    ) -> GateResult<QueryResult>;

    /// Open a transaction (replaying `savepoints` into it), then execute.
    fn begin_execute(
        &self,
        target: &Target,
        savepoints: &[String],
        sql: &str,
        bind_vars: &HashMap<String, Value>,
        reserved_id: i64,
        options: &ExecuteOptions,
    ) -> BeginOutcome;

    /// Reserve a connection (replaying `pre_queries` on it), then execute.
    fn reserve_execute(
        &self,
        target: &Target,
        pre_queries: &[String],
        sql: &str,
        bind_vars: &HashMap<String, Value>,
        transaction_id: i64,
        options: &ExecuteOptions,
    ) -> ReserveOutcome;

    /// Reserve a connection and open a transaction on it, then execute.
    fn reserve_begin_execute(
        &self,
        target: &Target,
        pre_queries: &[String],
        savepoints: &[String],
        sql: &str,
        bind_vars: &HashMap<String, Value>,
        options: &ExecuteOptions,
    ) -> ReserveBeginOutcome;

    fn stream_execute(
        &self,
        target: &Target,
        sql: &str,
        bind_vars: &HashMap<String, Value>,
        transaction_id: i64,
        reserved_id: i64,
        options: &ExecuteOptions,
        callback: StreamCallback<'_>,
    ) -> GateResult<()>;

    fn begin_stream_execute(
        &self,
        target: &Target,
        savepoints: &[String],
        sql: &str,
        bind_vars: &HashMap<String, Value>,
        reserved_id: i64,
        options: &ExecuteOptions,
        callback: StreamCallback<'_>,
    ) -> BeginOutcome<()>;

    fn reserve_stream_execute(
        &self,
        target: &Target,
        pre_queries: &[String],
        sql: &str,
        bind_vars: &HashMap<String, Value>,
        transaction_id: i64,
        options: &ExecuteOptions,
        callback: StreamCallback<'_>,
    ) -> ReserveOutcome<()>;

    fn reserve_begin_stream_execute(
        &self,
        target: &Target,
        pre_queries: &[String],
        savepoints: &[String],
        sql: &str,
        bind_vars: &HashMap<String, Value>,
        options: &ExecuteOptions,
        callback: StreamCallback<'_>,
    ) -> ReserveBeginOutcome<()>;

    /// Subscribe to the named message table on this target, delivering
    /// batches to `callback` until the stream ends, fails, or `cancel`
    /// fires.
    fn message_stream(
        &self,
        target: &Target,
        name: &str,
        cancel: &CancelToken,
        callback: StreamCallback<'_>,
    ) -> GateResult<()>;

    /// Roll back the given transaction. Returns the reserved connection
    /// id that survives the rollback (0 = the connection is gone too).
    fn rollback(&self, target: &Target, transaction_id: i64) -> GateResult<i64>;

    /// Release a reserved connection and/or transaction.
    fn release(&self, target: &Target, transaction_id: i64, reserved_id: i64) -> GateResult<()>;
}

/// Read-only snapshot of one pooled tablet connection.
#[derive(Debug, Clone, Serialize)]
pub struct TabletCacheStatus {
    pub target: Target,
    pub alias: TabletAlias,
    pub query_count: u64,
    pub error_count: u64,
}

/// Read-only snapshot of one tablet's health as the gateway sees it.
#[derive(Debug, Clone, Serialize)]
pub struct TabletHealthStatus {
    pub target: Target,
    pub alias: TabletAlias,
    pub serving: bool,
    pub replication_lag_secs: u32,
}

/// Health-aware tablet router. Resolving a `Target` through the
/// `QueryService` supertrait picks any live tablet; `query_service_by_alias`
/// demands one specific physical tablet.
pub trait Gateway: QueryService {
    /// Return a handle bound to exactly the given tablet, or a
    /// failed-precondition "wrong tablet" error if that alias no longer
    /// serves the target.
    fn query_service_by_alias(
        &self,
        alias: &TabletAlias,
        target: &Target,
    ) -> GateResult<Arc<dyn QueryService>>;

    /// Snapshot of the connection cache, for observability.
    fn cache_status(&self) -> Vec<TabletCacheStatus>;

    /// Snapshot of tablet health, for observability.
    fn health_status(&self) -> Vec<TabletHealthStatus>;

    fn close(&self) -> GateResult<()>;
}

/// A `Target` paired with the gateway that can reach it. Produced by
/// the routing layer for each query; ephemeral.
#[derive(Clone)]
pub struct ResolvedShard {
    pub target: Target,
    pub gateway: Arc<dyn Gateway>,
}

impl ResolvedShard {
    pub fn new(target: Target, gateway: Arc<dyn Gateway>) -> Self {
        Self { target, gateway }
    }
}

impl std::fmt::Debug for ResolvedShard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedShard")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
