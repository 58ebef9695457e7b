//! Advisory locks on a pinned reserved connection.
//!
//! MySQL advisory locks (GET_LOCK and friends) live on one server
//! connection, so the session pins a single shard's reserved connection
//! as its lock session. Every lock call must target that same shard
//! until the lock session is released.

use std::time::Instant;

use harrier_common::error::{GateError, GateResult};
use harrier_common::metrics::CallKey;

use crate::action::{lock_info, ActionNeeded};
use crate::classify::was_connection_closed;
use crate::gateway::ResolvedShard;
use crate::query::{BoundQuery, QueryResult};
use crate::scatter::ScatterExecutor;
use crate::session::{SafeSession, ShardSession};

impl ScatterExecutor {
    /// Execute an advisory-lock statement on the session's pinned
    /// reserved connection, reserving one on first use.
    ///
    /// If a lock session exists for a different target (resharding, or a
    /// keyspace that now sorts ahead of the old one), the old lock is
    /// released and `NotFound` is returned; the caller is expected to
    /// retry, which then reserves on the new target.
    pub fn execute_lock(
        &self,
        rs: &ResolvedShard,
        query: &BoundQuery,
        session: &SafeSession,
    ) -> GateResult<QueryResult> {
        let start = Instant::now();
        let key = CallKey::new("ExecuteLock", &rs.target);
        let result = self.execute_lock_inner(rs, query, session);
        self.end_action(&key, start, result.as_ref().err(), session);
        result
    }

    fn execute_lock_inner(
        &self,
        rs: &ResolvedShard,
        query: &BoundQuery,
        session: &SafeSession,
    ) -> GateResult<QueryResult> {
        let opts = session.options();

        let info = match lock_info(&rs.target, session) {
            Ok(info) => info,
            Err(e) => {
                let _ = self.txn().release_lock(session);
                return Err(e.with_context("any previously held locks are released"));
            }
        };

        let qs = self.query_service(rs, &info)?;

        match info.action {
            ActionNeeded::Nothing => {
                if info.reserved_id == 0 {
                    return Err(GateError::internal(format!(
                        "reserved id zero not expected on lock execution for {}",
                        rs.target
                    )));
                }
                let result = match qs.execute(
                    &rs.target,
                    &query.sql,
                    &query.bind_vars,
                    0,
                    info.reserved_id,
                    &opts,
                ) {
                    Err(e) if was_connection_closed(&e) => {
                        // The pinned connection died and the server released
                        // everything held on it.
                        session.reset_lock();
                        Err(e.with_context("held locks released"))
                    }
                    other => other,
                };
                session.update_lock_heartbeat();
                result
            }
            ActionNeeded::Reserve => {
                let out = qs.reserve_execute(
                    &rs.target,
                    &session.pre_queries(),
                    &query.sql,
                    &query.bind_vars,
                    0,
                    &opts,
                );
                // Register the connection even when the lock statement
                // failed on it: the reservation is live on the tablet, and
                // only a registered lock session can be released later.
                if out.reserved_id != 0 {
                    session.set_lock_session(ShardSession {
                        target: rs.target.clone(),
                        transaction_id: 0,
                        reserved_id: out.reserved_id,
                        tablet_alias: out.alias.clone(),
                    });
                }
                out.result
            }
            other => Err(GateError::internal(format!(
                "unexpected action {other:?} on lock execution for {}",
                rs.target
            ))),
        }
    }
}
