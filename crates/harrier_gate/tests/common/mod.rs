//! Shared test harness: a scriptable in-memory gateway.
//!
//! The fake keeps a serving-tablet map per target, queues of planned
//! failures per (target, operation), and a log of every tablet call it
//! received (including which alias-bound handle was used and which
//! pre-queries were replayed), so tests can assert routing and replay
//! behavior precisely.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use harrier_common::cancel::CancelToken;
use harrier_common::config::GateConfig;
use harrier_common::error::{GateError, GateResult};
use harrier_common::types::{TabletAlias, TabletType, Target};
use harrier_gate::gateway::{
    BeginOutcome, Gateway, QueryService, ReserveBeginOutcome, ReserveOutcome, StreamCallback,
    TabletCacheStatus, TabletHealthStatus,
};
use harrier_gate::query::{ExecuteOptions, Field, QueryResult, Value};
use harrier_gate::{ScatterExecutor, TxnConductor};

/// One recorded tablet call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub op: &'static str,
    pub target: Target,
    /// The alias-bound handle the call came through; `None` when it went
    /// through the gateway's own routing.
    pub via_alias: Option<TabletAlias>,
    pub sql: String,
    pub pre_queries: Vec<String>,
    pub savepoints: Vec<String>,
    pub transaction_id: i64,
    pub reserved_id: i64,
}

/// How the fake serves one `message_stream` subscription attempt.
#[derive(Debug, Clone)]
pub enum StreamPlan {
    /// Deliver these packets, then end the stream cleanly.
    Deliver(Vec<QueryResult>),
    /// Deliver these packets, then block until cancelled.
    DeliverThenBlock(Vec<QueryResult>),
    /// Fail the subscription immediately.
    Fail(GateError),
}

#[derive(Default)]
struct State {
    serving: HashMap<Target, TabletAlias>,
    fail_queues: HashMap<(Target, &'static str), VecDeque<GateError>>,
    /// Failures applied to a reserve call *after* it has allocated its
    /// reserved id: the reservation took, the query on it did not.
    fail_after_reserve: HashMap<Target, VecDeque<GateError>>,
    results: HashMap<Target, QueryResult>,
    stream_packets: HashMap<Target, Vec<QueryResult>>,
    message_plans: HashMap<Target, VecDeque<StreamPlan>>,
    expected_alias: HashMap<Target, TabletAlias>,
    next_transaction_id: i64,
    next_reserved_id: i64,
    calls: Vec<RecordedCall>,
}

/// Performs one tablet call against the shared state. `via` is the
/// alias this handle is bound to, `None` for the gateway itself.
struct Dispatcher {
    state: Arc<Mutex<State>>,
    via: Option<TabletAlias>,
}

pub struct FakeGateway {
    state: Arc<Mutex<State>>,
    dispatcher: Dispatcher,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        let state = Arc::new(Mutex::new(State {
            next_transaction_id: 100,
            next_reserved_id: 500,
            ..State::default()
        }));
        Arc::new(Self {
            dispatcher: Dispatcher {
                state: Arc::clone(&state),
                via: None,
            },
            state,
        })
    }

    /// Register (or re-register) the tablet serving a target.
    pub fn add_tablet(&self, target: Target, alias: TabletAlias) {
        self.state.lock().serving.insert(target, alias);
    }

    /// Replace the tablet serving a target (failover).
    pub fn promote(&self, target: Target, alias: TabletAlias) {
        self.add_tablet(target, alias);
    }

    /// Queue a failure for the next `op` call on `target`.
    pub fn fail_next(&self, target: &Target, op: &'static str, err: GateError) {
        self.state
            .lock()
            .fail_queues
            .entry((target.clone(), op))
            .or_default()
            .push_back(err);
    }

    /// Make the next reserve on `target` allocate a reserved connection
    /// and then fail the query on it.
    pub fn fail_next_after_reserve(&self, target: &Target, err: GateError) {
        self.state
            .lock()
            .fail_after_reserve
            .entry(target.clone())
            .or_default()
            .push_back(err);
    }

    /// Result returned by successful non-streaming calls on `target`.
    pub fn set_result(&self, target: &Target, result: QueryResult) {
        self.state.lock().results.insert(target.clone(), result);
    }

    /// Packets delivered by successful streaming calls on `target`.
    pub fn set_stream_packets(&self, target: &Target, packets: Vec<QueryResult>) {
        self.state
            .lock()
            .stream_packets
            .insert(target.clone(), packets);
    }

    /// Queue one `message_stream` subscription behavior for `target`.
    /// When the queue runs dry the fake blocks until cancelled.
    pub fn push_message_plan(&self, target: &Target, plan: StreamPlan) {
        self.state
            .lock()
            .message_plans
            .entry(target.clone())
            .or_default()
            .push_back(plan);
    }

    /// Make every call for `target` fail unless it arrives through the
    /// handle bound to exactly this alias.
    pub fn expect_alias(&self, target: &Target, alias: TabletAlias) {
        self.state
            .lock()
            .expected_alias
            .insert(target.clone(), alias);
    }

    pub fn set_next_reserved_id(&self, id: i64) {
        self.state.lock().next_reserved_id = id;
    }

    pub fn set_next_transaction_id(&self, id: i64) {
        self.state.lock().next_transaction_id = id;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    pub fn calls_for(&self, op: &'static str) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }
}

impl Dispatcher {
    fn bound(&self, alias: &TabletAlias) -> Dispatcher {
        Dispatcher {
            state: Arc::clone(&self.state),
            via: Some(alias.clone()),
        }
    }

    /// Record the call, honor alias expectations and planned failures,
    /// and verify an alias-bound handle still serves the target.
    #[allow(clippy::too_many_arguments)]
    fn check(
        &self,
        st: &mut State,
        op: &'static str,
        target: &Target,
        sql: &str,
        pre_queries: &[String],
        savepoints: &[String],
        transaction_id: i64,
        reserved_id: i64,
    ) -> GateResult<()> {
        st.calls.push(RecordedCall {
            op,
            target: target.clone(),
            via_alias: self.via.clone(),
            sql: sql.to_string(),
            pre_queries: pre_queries.to_vec(),
            savepoints: savepoints.to_vec(),
            transaction_id,
            reserved_id,
        });

        if let Some(expected) = st.expected_alias.get(target) {
            if self.via.as_ref() != Some(expected) {
                return Err(GateError::internal(format!(
                    "call for {target} arrived via {:?}, expected tablet {expected}",
                    self.via
                )));
            }
        }

        if let Some(queue) = st.fail_queues.get_mut(&(target.clone(), op)) {
            if let Some(err) = queue.pop_front() {
                return Err(err);
            }
        }

        if let Some(via) = &self.via {
            if st.serving.get(target) != Some(via) {
                return Err(GateError::failed_precondition(format!(
                    "wrong tablet type: {via} no longer serves {target}"
                )));
            }
        }

        Ok(())
    }

    fn current_alias(&self, st: &State, target: &Target) -> GateResult<TabletAlias> {
        st.serving
            .get(target)
            .cloned()
            .ok_or_else(|| GateError::unavailable(format!("no serving tablet for {target}")))
    }

    fn result_for(&self, st: &State, target: &Target) -> QueryResult {
        st.results.get(target).cloned().unwrap_or_default()
    }

    fn stream_packets_for(&self, st: &State, target: &Target) -> Vec<QueryResult> {
        st.stream_packets.get(target).cloned().unwrap_or_default()
    }
}

impl QueryService for Dispatcher {
    fn execute(
        &self,
        target: &Target,
        sql: &str,
        _bind_vars: &HashMap<String, Value>,
        transaction_id: i64,
        reserved_id: i64,
        _options: &ExecuteOptions,
    ) -> GateResult<QueryResult> {
        let mut st = self.state.lock();
        self.check(&mut st, "Execute", target, sql, &[], &[], transaction_id, reserved_id)?;
        Ok(self.result_for(&st, target))
    }

    fn begin_execute(
        &self,
        target: &Target,
        savepoints: &[String],
        sql: &str,
        _bind_vars: &HashMap<String, Value>,
        reserved_id: i64,
        _options: &ExecuteOptions,
    ) -> BeginOutcome {
        let mut st = self.state.lock();
        if let Err(e) = self.check(
            &mut st,
            "BeginExecute",
            target,
            sql,
            &[],
            savepoints,
            0,
            reserved_id,
        ) {
            return BeginOutcome {
                result: Err(e),
                transaction_id: 0,
                alias: None,
            };
        }
        let alias = match self.current_alias(&st, target) {
            Ok(a) => a,
            Err(e) => {
                return BeginOutcome {
                    result: Err(e),
                    transaction_id: 0,
                    alias: None,
                }
            }
        };
        let transaction_id = st.next_transaction_id;
        st.next_transaction_id += 1;
        BeginOutcome {
            result: Ok(self.result_for(&st, target)),
            transaction_id,
            alias: Some(alias),
        }
    }

    fn reserve_execute(
        &self,
        target: &Target,
        pre_queries: &[String],
        sql: &str,
        _bind_vars: &HashMap<String, Value>,
        transaction_id: i64,
        _options: &ExecuteOptions,
    ) -> ReserveOutcome {
        let mut st = self.state.lock();
        if let Err(e) = self.check(
            &mut st,
            "ReserveExecute",
            target,
            sql,
            pre_queries,
            &[],
            transaction_id,
            0,
        ) {
            return ReserveOutcome {
                result: Err(e),
                reserved_id: 0,
                alias: None,
            };
        }
        let alias = match self.current_alias(&st, target) {
            Ok(a) => a,
            Err(e) => {
                return ReserveOutcome {
                    result: Err(e),
                    reserved_id: 0,
                    alias: None,
                }
            }
        };
        let reserved_id = st.next_reserved_id;
        st.next_reserved_id += 1;
        if let Some(err) = st
            .fail_after_reserve
            .get_mut(target)
            .and_then(|q| q.pop_front())
        {
            return ReserveOutcome {
                result: Err(err),
                reserved_id,
                alias: Some(alias),
            };
        }
        ReserveOutcome {
            result: Ok(self.result_for(&st, target)),
            reserved_id,
            alias: Some(alias),
        }
    }

    fn reserve_begin_execute(
        &self,
        target: &Target,
        pre_queries: &[String],
        savepoints: &[String],
        sql: &str,
        _bind_vars: &HashMap<String, Value>,
        _options: &ExecuteOptions,
    ) -> ReserveBeginOutcome {
        let mut st = self.state.lock();
        if let Err(e) = self.check(
            &mut st,
            "ReserveBeginExecute",
            target,
            sql,
            pre_queries,
            savepoints,
            0,
            0,
        ) {
            return ReserveBeginOutcome {
                result: Err(e),
                transaction_id: 0,
                reserved_id: 0,
                alias: None,
            };
        }
        let alias = match self.current_alias(&st, target) {
            Ok(a) => a,
            Err(e) => {
                return ReserveBeginOutcome {
                    result: Err(e),
                    transaction_id: 0,
                    reserved_id: 0,
                    alias: None,
                }
            }
        };
        let transaction_id = st.next_transaction_id;
        st.next_transaction_id += 1;
        let reserved_id = st.next_reserved_id;
        st.next_reserved_id += 1;
        ReserveBeginOutcome {
            result: Ok(self.result_for(&st, target)),
            transaction_id,
            reserved_id,
            alias: Some(alias),
        }
    }

    fn stream_execute(
        &self,
        target: &Target,
        sql: &str,
        _bind_vars: &HashMap<String, Value>,
        transaction_id: i64,
        reserved_id: i64,
        _options: &ExecuteOptions,
        callback: StreamCallback<'_>,
    ) -> GateResult<()> {
        let packets = {
            let mut st = self.state.lock();
            self.check(
                &mut st,
                "StreamExecute",
                target,
                sql,
                &[],
                &[],
                transaction_id,
                reserved_id,
            )?;
            self.stream_packets_for(&st, target)
        };
        for packet in packets {
            callback(packet)?;
        }
        Ok(())
    }

    fn begin_stream_execute(
        &self,
        target: &Target,
        savepoints: &[String],
        sql: &str,
        _bind_vars: &HashMap<String, Value>,
        reserved_id: i64,
        _options: &ExecuteOptions,
        callback: StreamCallback<'_>,
    ) -> BeginOutcome<()> {
        let (packets, transaction_id, alias) = {
            let mut st = self.state.lock();
            if let Err(e) = self.check(
                &mut st,
                "BeginStreamExecute",
                target,
                sql,
                &[],
                savepoints,
                0,
                reserved_id,
            ) {
                return BeginOutcome {
                    result: Err(e),
                    transaction_id: 0,
                    alias: None,
                };
            }
            let alias = match self.current_alias(&st, target) {
                Ok(a) => a,
                Err(e) => {
                    return BeginOutcome {
                        result: Err(e),
                        transaction_id: 0,
                        alias: None,
                    }
                }
            };
            let transaction_id = st.next_transaction_id;
            st.next_transaction_id += 1;
            (self.stream_packets_for(&st, target), transaction_id, alias)
        };
        for packet in packets {
            if let Err(e) = callback(packet) {
                return BeginOutcome {
                    result: Err(e),
                    transaction_id,
                    alias: Some(alias),
                };
            }
        }
        BeginOutcome {
            result: Ok(()),
            transaction_id,
            alias: Some(alias),
        }
    }

    fn reserve_stream_execute(
        &self,
        target: &Target,
        pre_queries: &[String],
        sql: &str,
        _bind_vars: &HashMap<String, Value>,
        transaction_id: i64,
        _options: &ExecuteOptions,
        callback: StreamCallback<'_>,
    ) -> ReserveOutcome<()> {
        let (packets, reserved_id, alias) = {
            let mut st = self.state.lock();
            if let Err(e) = self.check(
                &mut st,
                "ReserveStreamExecute",
                target,
                sql,
                pre_queries,
                &[],
                transaction_id,
                0,
            ) {
                return ReserveOutcome {
                    result: Err(e),
                    reserved_id: 0,
                    alias: None,
                };
            }
            let alias = match self.current_alias(&st, target) {
                Ok(a) => a,
                Err(e) => {
                    return ReserveOutcome {
                        result: Err(e),
                        reserved_id: 0,
                        alias: None,
                    }
                }
            };
            let reserved_id = st.next_reserved_id;
            st.next_reserved_id += 1;
            (self.stream_packets_for(&st, target), reserved_id, alias)
        };
        for packet in packets {
            if let Err(e) = callback(packet) {
                return ReserveOutcome {
                    result: Err(e),
                    reserved_id,
                    alias: Some(alias),
                };
            }
        }
        ReserveOutcome {
            result: Ok(()),
            reserved_id,
            alias: Some(alias),
        }
    }

    fn reserve_begin_stream_execute(
        &self,
        target: &Target,
        pre_queries: &[String],
        savepoints: &[String],
        sql: &str,
        _bind_vars: &HashMap<String, Value>,
        _options: &ExecuteOptions,
        callback: StreamCallback<'_>,
    ) -> ReserveBeginOutcome<()> {
        let (packets, transaction_id, reserved_id, alias) = {
            let mut st = self.state.lock();
            if let Err(e) = self.check(
                &mut st,
                "ReserveBeginStreamExecute",
                target,
                sql,
                pre_queries,
                savepoints,
                0,
                0,
            ) {
                return ReserveBeginOutcome {
                    result: Err(e),
                    transaction_id: 0,
                    reserved_id: 0,
                    alias: None,
                };
            }
            let alias = match self.current_alias(&st, target) {
                Ok(a) => a,
                Err(e) => {
                    return ReserveBeginOutcome {
                        result: Err(e),
                        transaction_id: 0,
                        reserved_id: 0,
                        alias: None,
                    }
                }
            };
            let transaction_id = st.next_transaction_id;
            st.next_transaction_id += 1;
            let reserved_id = st.next_reserved_id;
            st.next_reserved_id += 1;
            (
                self.stream_packets_for(&st, target),
                transaction_id,
                reserved_id,
                alias,
            )
        };
        for packet in packets {
            if let Err(e) = callback(packet) {
                return ReserveBeginOutcome {
                    result: Err(e),
                    transaction_id,
                    reserved_id,
                    alias: Some(alias),
                };
            }
        }
        ReserveBeginOutcome {
            result: Ok(()),
            transaction_id,
            reserved_id,
            alias: Some(alias),
        }
    }

    fn message_stream(
        &self,
        target: &Target,
        name: &str,
        cancel: &CancelToken,
        callback: StreamCallback<'_>,
    ) -> GateResult<()> {
        let plan = {
            let mut st = self.state.lock();
            self.check(&mut st, "MessageStream", target, name, &[], &[], 0, 0)?;
            st.message_plans
                .get_mut(target)
                .and_then(|q| q.pop_front())
        };
        match plan {
            Some(StreamPlan::Fail(e)) => Err(e),
            Some(StreamPlan::Deliver(packets)) => {
                for packet in packets {
                    callback(packet)?;
                }
                Ok(())
            }
            Some(StreamPlan::DeliverThenBlock(packets)) => {
                for packet in packets {
                    callback(packet)?;
                }
                cancel.wait_timeout(Duration::from_secs(30));
                Ok(())
            }
            // No plan queued: behave like a healthy idle subscription.
            None => {
                cancel.wait_timeout(Duration::from_secs(30));
                Ok(())
            }
        }
    }

    fn rollback(&self, target: &Target, transaction_id: i64) -> GateResult<i64> {
        let mut st = self.state.lock();
        self.check(&mut st, "Rollback", target, "", &[], &[], transaction_id, 0)?;
        Ok(0)
    }

    fn release(&self, target: &Target, transaction_id: i64, reserved_id: i64) -> GateResult<()> {
        let mut st = self.state.lock();
        self.check(
            &mut st,
            "Release",
            target,
            "",
            &[],
            &[],
            transaction_id,
            reserved_id,
        )
    }
}

impl QueryService for FakeGateway {
    fn execute(
        &self,
        target: &Target,
        sql: &str,
        bind_vars: &HashMap<String, Value>,
        transaction_id: i64,
        reserved_id: i64,
        options: &ExecuteOptions,
    ) -> GateResult<QueryResult> {
        self.dispatcher
            .execute(target, sql, bind_vars, transaction_id, reserved_id, options)
    }

    fn begin_execute(
        &self,
        target: &Target,
        savepoints: &[String],
        sql: &str,
        bind_vars: &HashMap<String, Value>,
        reserved_id: i64,
        options: &ExecuteOptions,
    ) -> BeginOutcome {
        self.dispatcher
            .begin_execute(target, savepoints, sql, bind_vars, reserved_id, options)
    }

    fn reserve_execute(
        &self,
        target: &Target,
        pre_queries: &[String],
        sql: &str,
        bind_vars: &HashMap<String, Value>,
        transaction_id: i64,
        options: &ExecuteOptions,
    ) -> ReserveOutcome {
        self.dispatcher.reserve_execute(
            target,
            pre_queries,
            sql,
            bind_vars,
            transaction_id,
            options,
        )
    }

    fn reserve_begin_execute(
        &self,
        target: &Target,
        pre_queries: &[String],
        savepoints: &[String],
        sql: &str,
        bind_vars: &HashMap<String, Value>,
        options: &ExecuteOptions,
    ) -> ReserveBeginOutcome {
        self.dispatcher.reserve_begin_execute(
            target,
            pre_queries,
            savepoints,
            sql,
            bind_vars,
            options,
        )
    }

    fn stream_execute(
        &self,
        target: &Target,
        sql: &str,
        bind_vars: &HashMap<String, Value>,
        transaction_id: i64,
        reserved_id: i64,
        options: &ExecuteOptions,
        callback: StreamCallback<'_>,
    ) -> GateResult<()> {
        self.dispatcher.stream_execute(
            target,
            sql,
            bind_vars,
            transaction_id,
            reserved_id,
            options,
            callback,
        )
    }

    fn begin_stream_execute(
        &self,
        target: &Target,
        savepoints: &[String],
        sql: &str,
        bind_vars: &HashMap<String, Value>,
        reserved_id: i64,
        options: &ExecuteOptions,
        callback: StreamCallback<'_>,
    ) -> BeginOutcome<()> {
        self.dispatcher.begin_stream_execute(
            target,
            savepoints,
            sql,
            bind_vars,
            reserved_id,
            options,
            callback,
        )
    }

    fn reserve_stream_execute(
        &self,
        target: &Target,
        pre_queries: &[String],
        sql: &str,
        bind_vars: &HashMap<String, Value>,
        transaction_id: i64,
        options: &ExecuteOptions,
        callback: StreamCallback<'_>,
    ) -> ReserveOutcome<()> {
        self.dispatcher.reserve_stream_execute(
            target,
            pre_queries,
            sql,
            bind_vars,
            transaction_id,
            options,
            callback,
        )
    }

    fn reserve_begin_stream_execute(
        &self,
        target: &Target,
        pre_queries: &[String],
        savepoints: &[String],
        sql: &str,
        bind_vars: &HashMap<String, Value>,
        options: &ExecuteOptions,
        callback: StreamCallback<'_>,
    ) -> ReserveBeginOutcome<()> {
        self.dispatcher.reserve_begin_stream_execute(
            target,
            pre_queries,
            savepoints,
            sql,
            bind_vars,
            options,
            callback,
        )
    }

    fn message_stream(
        &self,
        target: &Target,
        name: &str,
        cancel: &CancelToken,
        callback: StreamCallback<'_>,
    ) -> GateResult<()> {
        self.dispatcher.message_stream(target, name, cancel, callback)
    }

    fn rollback(&self, target: &Target, transaction_id: i64) -> GateResult<i64> {
        self.dispatcher.rollback(target, transaction_id)
    }

    fn release(&self, target: &Target, transaction_id: i64, reserved_id: i64) -> GateResult<()> {
        self.dispatcher.release(target, transaction_id, reserved_id)
    }
}

impl Gateway for FakeGateway {
    fn query_service_by_alias(
        &self,
        alias: &TabletAlias,
        _target: &Target,
    ) -> GateResult<Arc<dyn QueryService>> {
        Ok(Arc::new(self.dispatcher.bound(alias)))
    }

    fn cache_status(&self) -> Vec<TabletCacheStatus> {
        let st = self.state.lock();
        st.serving
            .iter()
            .map(|(target, alias)| TabletCacheStatus {
                target: target.clone(),
                alias: alias.clone(),
                query_count: st.calls.iter().filter(|c| c.target == *target).count() as u64,
                error_count: 0,
            })
            .collect()
    }

    fn health_status(&self) -> Vec<TabletHealthStatus> {
        let st = self.state.lock();
        st.serving
            .iter()
            .map(|(target, alias)| TabletHealthStatus {
                target: target.clone(),
                alias: alias.clone(),
                serving: true,
                replication_lag_secs: 0,
            })
            .collect()
    }

    fn close(&self) -> GateResult<()> {
        Ok(())
    }
}

// Fixture helpers shared by the test suites.

pub fn target(shard: &str) -> Target {
    Target::new("ks", shard, TabletType::Primary)
}

pub fn alias(uid: u32) -> TabletAlias {
    TabletAlias::new("zone1", uid)
}

pub fn one_row_result(id: i64) -> QueryResult {
    QueryResult {
        fields: vec![Field::new("id", "INT64")],
        rows: vec![vec![Value::Int(id)]],
        rows_affected: 0,
        insert_id: 0,
    }
}

pub fn fields_packet() -> QueryResult {
    QueryResult {
        fields: vec![Field::new("id", "INT64")],
        rows: vec![],
        rows_affected: 0,
        insert_id: 0,
    }
}

pub fn rows_packet(id: i64) -> QueryResult {
    QueryResult {
        fields: vec![],
        rows: vec![vec![Value::Int(id)]],
        rows_affected: 0,
        insert_id: 0,
    }
}

/// Build an executor over a fresh fake gateway with `n` shards
/// ("s0", "s1", …) each served by tablet `zone1-(10 + i)`.
pub fn setup(n: usize, config: GateConfig) -> (Arc<FakeGateway>, ScatterExecutor, Vec<harrier_gate::ResolvedShard>) {
    let gateway = FakeGateway::new();
    let mut rss = Vec::with_capacity(n);
    for i in 0..n {
        let t = target(&format!("s{i}"));
        gateway.add_tablet(t.clone(), alias(10 + i as u32));
        rss.push(harrier_gate::ResolvedShard::new(
            t,
            gateway.clone() as Arc<dyn Gateway>,
        ));
    }
    let txn = Arc::new(TxnConductor::new(
        gateway.clone() as Arc<dyn Gateway>,
        config.transaction_mode,
    ));
    let executor = ScatterExecutor::new(gateway.clone() as Arc<dyn Gateway>, txn, config);
    (gateway, executor, rss)
}
