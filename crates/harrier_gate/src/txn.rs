//! Cross-shard transaction teardown.
//!
//! Distributed transactions here are best-effort: any shard error marks
//! the session for rollback, and the conductor then drives a rollback
//! across every shard that holds an open transaction. There is no
//! prepare/commit protocol in this core.

use std::sync::Arc;

use harrier_common::config::TransactionMode;
use harrier_common::error::{GateError, GateResult};

use crate::gateway::Gateway;
use crate::session::SafeSession;

/// Drives rollback and reserved-connection release across shards, and
/// owns the configured transaction mode.
pub struct TxnConductor {
    gateway: Arc<dyn Gateway>,
    mode: TransactionMode,
}

impl TxnConductor {
    pub fn new(gateway: Arc<dyn Gateway>, mode: TransactionMode) -> Self {
        Self { gateway, mode }
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Roll back every shard transaction held by the session, in
    /// parallel. Rollback keeps going across all shards even when one
    /// fails; the first failure is surfaced after everything has been
    /// attempted, and the session's transaction state is cleared either
    /// way.
    pub fn rollback(&self, session: &SafeSession) -> GateResult<()> {
        let in_transaction: Vec<_> = session
            .shard_sessions()
            .into_iter()
            .filter(|ss| ss.transaction_id != 0)
            .collect();

        if in_transaction.is_empty() {
            session.finish_rollback();
            return Ok(());
        }

        let one_shard = |ss: &crate::session::ShardSession| -> Option<GateError> {
            match self.gateway.rollback(&ss.target, ss.transaction_id) {
                Ok(surviving_reserved_id) => {
                    session.end_shard_transaction(&ss.target, surviving_reserved_id);
                    None
                }
                Err(e) => {
                    tracing::warn!("rollback failed on {}: {}", ss.target, e);
                    // Connection state is unknown; drop the shard session so
                    // nothing gets pinned to a dead transaction.
                    session.end_shard_transaction(&ss.target, 0);
                    Some(e)
                }
            }
        };

        let errors: Vec<GateError> = if in_transaction.len() == 1 {
            one_shard(&in_transaction[0]).into_iter().collect()
        } else {
            let one_shard = &one_shard;
            std::thread::scope(|scope| {
                let handles: Vec<_> = in_transaction
                    .iter()
                    .map(|ss| scope.spawn(move || one_shard(ss)))
                    .collect();
                handles
                    .into_iter()
                    .filter_map(|h| {
                        h.join()
                            .unwrap_or_else(|_| Some(GateError::internal("rollback task panicked")))
                    })
                    .collect()
            })
        };

        session.finish_rollback();

        match GateError::aggregate(errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Release the advisory-lock reserved connection, if any, and clear
    /// the lock session.
    pub fn release_lock(&self, session: &SafeSession) -> GateResult<()> {
        let Some(lock_session) = session.lock_session() else {
            return Ok(());
        };
        session.reset_lock();
        if lock_session.reserved_id == 0 {
            return Ok(());
        }
        self.gateway
            .release(&lock_session.target, 0, lock_session.reserved_id)
            .map_err(|e| {
                tracing::warn!("lock release failed on {}: {}", lock_session.target, e);
                e
            })
    }
}
