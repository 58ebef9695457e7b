//! Per-client session state shared across parallel shard tasks.
//!
//! `SafeSession` is the single mutable resource the scatter fan-out
//! shares: every mutation goes through one internal mutex, and no raw
//! field access is exposed. Cloning is cheap and shares state, so a
//! detached keepalive task can hold the same session as the caller.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use std::sync::Arc;

use harrier_common::config::TransactionMode;
use harrier_common::error::{GateError, GateResult};
use harrier_common::types::{TabletAlias, Target};

use crate::query::ExecuteOptions;

/// Persistent per-shard record: which transaction and reserved
/// connection this session holds on one target, and on which tablet.
///
/// Invariant: while `reserved_id` is nonzero, every call for this
/// target must be routed to `tablet_alias`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardSession {
    pub target: Target,
    /// 0 = no open transaction on this shard.
    pub transaction_id: i64,
    /// 0 = no reserved connection on this shard.
    pub reserved_id: i64,
    pub tablet_alias: Option<TabletAlias>,
}

impl ShardSession {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            transaction_id: 0,
            reserved_id: 0,
            tablet_alias: None,
        }
    }
}

#[derive(Default)]
struct SessionInner {
    in_transaction: bool,
    in_reserved_conn: bool,
    must_rollback: bool,
    shard_sessions: Vec<ShardSession>,
    lock_session: Option<ShardSession>,
    last_lock_heartbeat: Option<Instant>,
    pre_queries: Vec<String>,
    savepoints: Vec<String>,
    options: ExecuteOptions,
}

/// Thread-safe container for one client's transactional state.
///
/// Created at client connect, mutated by every multi-shard call,
/// dropped at disconnect. Clones share the same state.
#[derive(Clone, Default)]
pub struct SafeSession {
    inner: Arc<Mutex<SessionInner>>,
}

impl SafeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_transaction(&self) -> bool {
        self.inner.lock().in_transaction
    }

    pub fn set_in_transaction(&self, v: bool) {
        self.inner.lock().in_transaction = v;
    }

    pub fn in_reserved_conn(&self) -> bool {
        self.inner.lock().in_reserved_conn
    }

    pub fn set_in_reserved_conn(&self, v: bool) {
        self.inner.lock().in_reserved_conn = v;
    }

    pub fn options(&self) -> ExecuteOptions {
        self.inner.lock().options
    }

    pub fn set_options(&self, options: ExecuteOptions) {
        self.inner.lock().options = options;
    }

    /// Look up the transaction id, reserved id, and pinned alias for a
    /// target. Zeros and `None` when the shard is cold.
    pub fn find(&self, target: &Target) -> (i64, i64, Option<TabletAlias>) {
        let inner = self.inner.lock();
        for ss in &inner.shard_sessions {
            if ss.target == *target {
                return (ss.transaction_id, ss.reserved_id, ss.tablet_alias.clone());
            }
        }
        (0, 0, None)
    }

    /// Upsert a shard session. In single-shard mode, adding a second
    /// distinct shard aborts the transaction.
    pub fn append_or_update(
        &self,
        shard_session: ShardSession,
        mode: TransactionMode,
    ) -> GateResult<()> {
        let mut inner = self.inner.lock();
        if mode == TransactionMode::Single
            && inner
                .shard_sessions
                .iter()
                .any(|ss| ss.target != shard_session.target)
        {
            return Err(GateError::aborted(format!(
                "multi-shard transaction attempted in single-shard mode: {} and {}",
                inner.shard_sessions[0].target, shard_session.target
            )));
        }
        for ss in &mut inner.shard_sessions {
            if ss.target == shard_session.target {
                *ss = shard_session;
                return Ok(());
            }
        }
        inner.shard_sessions.push(shard_session);
        Ok(())
    }

    /// Mark the session so the current call rolls back before
    /// returning. Idempotent.
    pub fn set_rollback(&self) {
        self.inner.lock().must_rollback = true;
    }

    pub fn must_rollback(&self) -> bool {
        self.inner.lock().must_rollback
    }

    /// Drop the shard session pinned to `alias`, so the next attempt on
    /// that target may pick any tablet. Refused while the shard still
    /// has an open transaction.
    pub fn reset_shard(&self, alias: &TabletAlias) -> GateResult<()> {
        let mut inner = self.inner.lock();
        let idx = inner
            .shard_sessions
            .iter()
            .position(|ss| ss.tablet_alias.as_ref() == Some(alias))
            .ok_or_else(|| {
                GateError::not_found(format!("no shard session found for tablet {alias}"))
            })?;
        if inner.shard_sessions[idx].transaction_id != 0 {
            return Err(GateError::internal(format!(
                "cannot reset shard session with an open transaction on tablet {alias}"
            )));
        }
        inner.shard_sessions.remove(idx);
        Ok(())
    }

    /// Snapshot of all shard sessions, in append order.
    pub fn shard_sessions(&self) -> Vec<ShardSession> {
        self.inner.lock().shard_sessions.clone()
    }

    /// Record the end of one shard's transaction after rollback. The
    /// shard session survives with `surviving_reserved_id` when the
    /// tablet kept the reserved connection alive, and is dropped
    /// otherwise.
    pub fn end_shard_transaction(&self, target: &Target, surviving_reserved_id: i64) {
        let mut inner = self.inner.lock();
        if let Some(idx) = inner
            .shard_sessions
            .iter()
            .position(|ss| ss.target == *target)
        {
            if surviving_reserved_id != 0 {
                inner.shard_sessions[idx].transaction_id = 0;
                inner.shard_sessions[idx].reserved_id = surviving_reserved_id;
            } else {
                inner.shard_sessions.remove(idx);
            }
        }
    }

    /// Clear transaction-scoped state once a rollback has been driven
    /// across all shards.
    pub fn finish_rollback(&self) {
        let mut inner = self.inner.lock();
        inner.must_rollback = false;
        inner.in_transaction = false;
        inner.savepoints.clear();
    }

    /// In-flight savepoint statements to replay when a new shard joins
    /// the transaction.
    pub fn savepoints(&self) -> Vec<String> {
        self.inner.lock().savepoints.clone()
    }

    pub fn add_savepoint(&self, sql: impl Into<String>) {
        self.inner.lock().savepoints.push(sql.into());
    }

    /// Session-scoped statements to replay when a reserved connection
    /// is (re)materialized.
    pub fn pre_queries(&self) -> Vec<String> {
        self.inner.lock().pre_queries.clone()
    }

    pub fn set_pre_queries(&self, pre_queries: Vec<String>) {
        self.inner.lock().pre_queries = pre_queries;
    }

    // Lock-session discipline: at most one shard pinned for advisory
    // locks, with a heartbeat timestamp the executors consult.

    pub fn in_lock_session(&self) -> bool {
        self.inner.lock().lock_session.is_some()
    }

    pub fn lock_session(&self) -> Option<ShardSession> {
        self.inner.lock().lock_session.clone()
    }

    pub fn set_lock_session(&self, shard_session: ShardSession) {
        let mut inner = self.inner.lock();
        inner.lock_session = Some(shard_session);
        inner.last_lock_heartbeat = Some(Instant::now());
    }

    pub fn reset_lock(&self) {
        let mut inner = self.inner.lock();
        inner.lock_session = None;
        inner.last_lock_heartbeat = None;
    }

    pub fn update_lock_heartbeat(&self) {
        self.inner.lock().last_lock_heartbeat = Some(Instant::now());
    }

    /// True when the held lock has gone unprobed for at least
    /// `interval` and a keepalive should be fired.
    pub fn trigger_lock_heartbeat(&self, interval: Duration) -> bool {
        let inner = self.inner.lock();
        if inner.lock_session.is_none() {
            return false;
        }
        match inner.last_lock_heartbeat {
            Some(last) => last.elapsed() >= interval,
            None => true,
        }
    }
}
