//! Parallel fan-out of shard queries.
//!
//! `ScatterExecutor` takes an already-planned list of (resolved shard,
//! bound query) pairs plus the caller's session, runs one task per
//! shard, and consolidates results and errors. Per shard it decides
//! whether the tablet call must also open a transaction or reserve a
//! connection, records the IDs the tablet hands back into the session,
//! and transparently retries once when a reserved connection without an
//! open transaction is lost or its tablet stops serving the target.
//!
//! Errors are recorded positionally: the error at index `i` belongs to
//! shard `i`, and a `None` entry means that shard's rows are in the
//! returned result. Row order across shards is arrival order.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use harrier_common::config::GateConfig;
use harrier_common::error::{GateError, GateResult};
use harrier_common::metrics::{CallKey, ScatterMetrics};
use harrier_common::types::{TabletAlias, Target};

use crate::action::{action_info, ActionNeeded, ShardActionInfo};
use crate::classify::{requires_new_tablet, was_connection_closed};
use crate::gateway::{Gateway, QueryService, ResolvedShard, TabletCacheStatus, TabletHealthStatus};
use crate::query::{BoundQuery, QueryResult};
use crate::session::{SafeSession, ShardSession};
use crate::txn::TxnConductor;

/// Executes planned queries across many shards in parallel.
///
/// Cloning is cheap and shares the gateway, conductor, and metrics.
#[derive(Clone)]
pub struct ScatterExecutor {
    gateway: Arc<dyn Gateway>,
    txn: Arc<TxnConductor>,
    metrics: Arc<ScatterMetrics>,
    config: GateConfig,
}

fn split<T>(result: GateResult<T>) -> (Option<T>, Option<GateError>) {
    match result {
        Ok(v) => (Some(v), None),
        Err(e) => (None, Some(e)),
    }
}

impl ScatterExecutor {
    pub fn new(gateway: Arc<dyn Gateway>, txn: Arc<TxnConductor>, config: GateConfig) -> Self {
        Self {
            gateway,
            txn,
            metrics: Arc::new(ScatterMetrics::new()),
            config,
        }
    }

    pub fn metrics(&self) -> &ScatterMetrics {
        &self.metrics
    }

    pub(crate) fn config(&self) -> &GateConfig {
        &self.config
    }

    pub(crate) fn txn(&self) -> &TxnConductor {
        &self.txn
    }

    /// Execute one bound query per resolved shard.
    ///
    /// Always returns a result (possibly empty) alongside the positional
    /// error list, so callers can consume a partially-successful
    /// operation. The session is updated with whatever transaction and
    /// reserved-connection IDs the tablets handed back, even for shards
    /// that failed.
    pub fn execute_multi_shard(
        &self,
        rss: &[ResolvedShard],
        queries: &[BoundQuery],
        session: &SafeSession,
        autocommit: bool,
        ignore_max_rows: bool,
    ) -> (QueryResult, Vec<Option<GateError>>) {
        if rss.len() != queries.len() {
            let err = GateError::internal(format!(
                "got mismatched number of queries ({}) and shards ({})",
                queries.len(),
                rss.len()
            ));
            err.log_if_internal();
            return (QueryResult::new(), vec![Some(err)]);
        }

        self.maybe_fire_lock_keepalive(session);

        let result = Mutex::new(QueryResult::new());

        let errors = self.multi_go_transaction(
            "Execute",
            rss,
            session,
            autocommit,
            |rs, i, mut info| {
                let opts = session.options();
                let query = &queries[i];

                if autocommit && info.transaction_id != 0 {
                    return (
                        None,
                        Some(GateError::failed_precondition(format!(
                            "in autocommit mode, transaction id should be zero but was: {}",
                            info.transaction_id
                        ))),
                    );
                }

                let qs = match self.query_service(rs, &info) {
                    Ok(qs) => qs,
                    Err(e) => return (None, Some(e)),
                };

                let mut transaction_id = info.transaction_id;
                let mut reserved_id = info.reserved_id;
                let mut alias: Option<TabletAlias> = None;

                let (res, err) = match info.action {
                    ActionNeeded::Nothing => {
                        match qs.execute(
                            &rs.target,
                            &query.sql,
                            &query.bind_vars,
                            transaction_id,
                            reserved_id,
                            &opts,
                        ) {
                            Ok(r) => (Some(r), None),
                            Err(e) => {
                                if self.should_retry_on_fresh_conn(&info, &e, session, &rs.target) {
                                    // The reserved connection is gone; recreate
                                    // it on whichever tablet the gateway offers.
                                    info.action = ActionNeeded::Reserve;
                                    let out = rs.gateway.reserve_execute(
                                        &rs.target,
                                        &session.pre_queries(),
                                        &query.sql,
                                        &query.bind_vars,
                                        0,
                                        &opts,
                                    );
                                    reserved_id = out.reserved_id;
                                    alias = out.alias;
                                    split(out.result)
                                } else {
                                    (None, Some(e))
                                }
                            }
                        }
                    }
                    ActionNeeded::Begin => {
                        let out = qs.begin_execute(
                            &rs.target,
                            &session.savepoints(),
                            &query.sql,
                            &query.bind_vars,
                            reserved_id,
                            &opts,
                        );
                        transaction_id = out.transaction_id;
                        alias = out.alias;
                        match out.result {
                            Ok(r) => (Some(r), None),
                            Err(e) => {
                                if self.should_retry_on_fresh_conn(&info, &e, session, &rs.target) {
                                    info.action = ActionNeeded::ReserveBegin;
                                    let out = rs.gateway.reserve_begin_execute(
                                        &rs.target,
                                        &session.pre_queries(),
                                        &session.savepoints(),
                                        &query.sql,
                                        &query.bind_vars,
                                        &opts,
                                    );
                                    transaction_id = out.transaction_id;
                                    reserved_id = out.reserved_id;
                                    alias = out.alias;
                                    split(out.result)
                                } else {
                                    (None, Some(e))
                                }
                            }
                        }
                    }
                    ActionNeeded::Reserve => {
                        let out = qs.reserve_execute(
                            &rs.target,
                            &session.pre_queries(),
                            &query.sql,
                            &query.bind_vars,
                            transaction_id,
                            &opts,
                        );
                        reserved_id = out.reserved_id;
                        alias = out.alias;
                        split(out.result)
                    }
                    ActionNeeded::ReserveBegin => {
                        let out = qs.reserve_begin_execute(
                            &rs.target,
                            &session.pre_queries(),
                            &session.savepoints(),
                            &query.sql,
                            &query.bind_vars,
                            &opts,
                        );
                        transaction_id = out.transaction_id;
                        reserved_id = out.reserved_id;
                        alias = out.alias;
                        split(out.result)
                    }
                };

                // The session must learn about advanced IDs even when the
                // query itself failed.
                let updated = info.updated(transaction_id, reserved_id, alias);
                if let Some(e) = err {
                    return (updated, Some(e));
                }
                if let Some(r) = res {
                    let mut qr = result.lock();
                    if ignore_max_rows || qr.rows.len() <= self.config.max_memory_rows {
                        qr.append(&r);
                    }
                }
                (updated, None)
            },
        );

        let qr = result.into_inner();
        if !ignore_max_rows && qr.rows.len() > self.config.max_memory_rows {
            return (
                QueryResult::new(),
                vec![Some(GateError::resource_exhausted(format!(
                    "in-memory row count exceeded allowed limit of {}",
                    self.config.max_memory_rows
                )))],
            );
        }
        (qr, errors)
    }

    /// Resolve the tablet handle for one shard call: the exact pinned
    /// tablet when the session recorded an alias, any live tablet
    /// otherwise.
    pub(crate) fn query_service(
        &self,
        rs: &ResolvedShard,
        info: &ShardActionInfo,
    ) -> GateResult<Arc<dyn QueryService>> {
        match &info.alias {
            Some(alias) => rs.gateway.query_service_by_alias(alias, &rs.target),
            None => Ok(Arc::clone(&rs.gateway) as Arc<dyn QueryService>),
        }
    }

    /// Decide whether a failed `Nothing`/`Begin` dispatch gets one
    /// transparent retry: only when the shard held a reserved connection
    /// with no open transaction, and the error says either the
    /// connection is gone or the tablet stopped serving the target. The
    /// pinned shard session is dropped so the retry may pick any tablet.
    ///
    /// `Reserve`/`ReserveBegin` dispatches never retry here: there is no
    /// previously established connection to re-materialize.
    pub(crate) fn should_retry_on_fresh_conn(
        &self,
        info: &ShardActionInfo,
        err: &GateError,
        session: &SafeSession,
        target: &Target,
    ) -> bool {
        if info.reserved_id == 0 || info.transaction_id != 0 {
            return false;
        }
        if !(was_connection_closed(err) || requires_new_tablet(err, target)) {
            return false;
        }
        if let Some(alias) = &info.alias {
            if let Err(reset_err) = session.reset_shard(alias) {
                tracing::warn!("could not reset shard session for {target} on {alias}: {reset_err}");
                return false;
            }
        }
        tracing::warn!("reserved connection to {target} lost ({err}); retrying on a fresh tablet");
        true
    }

    /// Run `action` once per resolved shard, in parallel, threading the
    /// per-shard `ShardActionInfo` through and upserting whatever state
    /// the action reports back. Errors come back positionally. If the
    /// session ends up marked for rollback, the rollback is driven here
    /// before returning.
    pub(crate) fn multi_go_transaction<F>(
        &self,
        operation: &'static str,
        rss: &[ResolvedShard],
        session: &SafeSession,
        autocommit: bool,
        action: F,
    ) -> Vec<Option<GateError>>
    where
        F: Fn(&ResolvedShard, usize, ShardActionInfo) -> (Option<ShardActionInfo>, Option<GateError>)
            + Sync,
    {
        if rss.is_empty() {
            return Vec::new();
        }

        let one_shard = |rs: &ResolvedShard, i: usize| -> Option<GateError> {
            let start = Instant::now();
            let key = CallKey::new(operation, &rs.target);
            let info = action_info(&rs.target, session, autocommit);
            let (updated, mut err) = action(rs, i, info);
            if let Some(updated) = updated {
                if updated.action != ActionNeeded::Nothing
                    && (updated.transaction_id != 0 || updated.reserved_id != 0)
                {
                    let append = session.append_or_update(
                        ShardSession {
                            target: rs.target.clone(),
                            transaction_id: updated.transaction_id,
                            reserved_id: updated.reserved_id,
                            tablet_alias: updated.alias,
                        },
                        self.txn.mode(),
                    );
                    if let Err(append_err) = append {
                        err = Some(append_err);
                    }
                }
            }
            self.end_action(&key, start, err.as_ref(), session);
            err
        };

        let errors = if rss.len() == 1 {
            // One shard: no point paying for a thread.
            vec![one_shard(&rss[0], 0)]
        } else {
            let one_shard = &one_shard;
            std::thread::scope(|scope| {
                let handles: Vec<_> = rss
                    .iter()
                    .enumerate()
                    .map(|(i, rs)| scope.spawn(move || one_shard(rs, i)))
                    .collect();
                handles
                    .into_iter()
                    .map(|h| {
                        h.join().unwrap_or_else(|_| {
                            Some(GateError::internal(
                                "shard task panicked during scatter execution",
                            ))
                        })
                    })
                    .collect()
            })
        };

        if session.must_rollback() {
            if let Err(e) = self.txn.rollback(session) {
                tracing::warn!("rollback after failed scatter reported: {e}");
            }
        }

        errors
    }

    /// Run `action` once per resolved shard, in parallel, without any
    /// transaction handling. Errors come back positionally.
    pub(crate) fn multi_go<F>(
        &self,
        operation: &'static str,
        rss: &[ResolvedShard],
        action: F,
    ) -> Vec<Option<GateError>>
    where
        F: Fn(&ResolvedShard, usize) -> GateResult<()> + Sync,
    {
        if rss.is_empty() {
            return Vec::new();
        }

        let one_shard = |rs: &ResolvedShard, i: usize| -> Option<GateError> {
            let start = Instant::now();
            let key = CallKey::new(operation, &rs.target);
            let err = action(rs, i).err();
            // No caller session on this path; a throwaway one absorbs the
            // rollback marks.
            self.end_action(&key, start, err.as_ref(), &SafeSession::new());
            err
        };

        if rss.len() == 1 {
            vec![one_shard(&rss[0], 0)]
        } else {
            let one_shard = &one_shard;
            std::thread::scope(|scope| {
                let handles: Vec<_> = rss
                    .iter()
                    .enumerate()
                    .map(|(i, rs)| scope.spawn(move || one_shard(rs, i)))
                    .collect();
                handles
                    .into_iter()
                    .map(|h| {
                        h.join().unwrap_or_else(|_| {
                            Some(GateError::internal(
                                "shard task panicked during scatter execution",
                            ))
                        })
                    })
                    .collect()
            })
        }
    }

    /// Timing and error accounting for one finished shard call, plus the
    /// rollback mark for codes that must abort the transaction.
    pub(crate) fn end_action(
        &self,
        key: &CallKey,
        start: Instant,
        err: Option<&GateError>,
        session: &SafeSession,
    ) {
        if let Some(err) = err {
            // Duplicate keys and bad queries are the client's doing, not
            // the tablet's; keep them out of the tablet error counter.
            if !err.is_client_fault() {
                self.metrics.record_error(key);
            }
            if err.forces_rollback() {
                session.set_rollback();
            }
        }
        self.metrics.record_call(key, start.elapsed());
    }

    /// Fire a detached keepalive probe on the held advisory lock when
    /// its heartbeat is due, so the server does not release the lock
    /// while unrelated queries run.
    pub(crate) fn maybe_fire_lock_keepalive(&self, session: &SafeSession) {
        if !(session.in_lock_session()
            && session.trigger_lock_heartbeat(self.config.lock_heartbeat_interval()))
        {
            return;
        }
        let executor = self.clone();
        let session = session.clone();
        std::thread::spawn(move || executor.run_lock_query(&session));
    }

    pub(crate) fn run_lock_query(&self, session: &SafeSession) {
        let Some(lock_session) = session.lock_session() else {
            return;
        };
        let rs = ResolvedShard::new(lock_session.target, Arc::clone(&self.gateway));
        let query = BoundQuery::new("select 1");
        if let Err(e) = self.execute_lock(&rs, &query, session) {
            tracing::warn!("lock heartbeat failed, held locks might be released: {e}");
        }
    }

    /// Close the underlying gateway.
    pub fn close(&self) -> GateResult<()> {
        self.gateway.close()
    }

    /// Displayable snapshot of the gateway's connection cache.
    pub fn gateway_cache_status(&self) -> Vec<TabletCacheStatus> {
        self.gateway.cache_status()
    }

    /// Displayable snapshot of tablet health as the gateway sees it.
    pub fn tablet_health_status(&self) -> Vec<TabletHealthStatus> {
        self.gateway.health_status()
    }
}
