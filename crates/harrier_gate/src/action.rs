//! Per-shard action computation.
//!
//! Before a shard task runs, the executor derives from the session what
//! the tablet call must do besides executing the query: nothing, open a
//! transaction, reserve a connection, or both. The decision is a pure
//! function of (session state, target, autocommit); the shard task gets
//! an immutable `ShardActionInfo` and produces an updated copy carrying
//! whatever IDs the tablet handed back.

use harrier_common::error::{GateError, GateResult};
use harrier_common::types::{TabletAlias, Target};

use crate::session::SafeSession;

/// What one shard call must do besides executing the query.
///
/// Actions form a lattice: a lost reserved connection promotes
/// `Nothing` to `Reserve` (and `Begin` to `ReserveBegin`) on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionNeeded {
    Nothing,
    Begin,
    Reserve,
    ReserveBegin,
}

/// Immutable view of one shard's session state for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardActionInfo {
    pub action: ActionNeeded,
    pub transaction_id: i64,
    pub reserved_id: i64,
    pub alias: Option<TabletAlias>,
}

impl ShardActionInfo {
    /// Copy of this info carrying the IDs and alias returned by the
    /// tablet. `None` when nothing changed, so the caller can skip the
    /// session upsert.
    pub fn updated(
        &self,
        transaction_id: i64,
        reserved_id: i64,
        alias: Option<TabletAlias>,
    ) -> Option<ShardActionInfo> {
        if transaction_id == self.transaction_id && reserved_id == self.reserved_id {
            return None;
        }
        Some(ShardActionInfo {
            action: self.action,
            transaction_id,
            reserved_id,
            alias,
        })
    }
}

/// Decide what the upcoming call on `target` must do.
///
/// `Begin` iff the session is in a transaction, the shard has no
/// transaction id, and autocommit is off. `Reserve` iff the session
/// needs reserved connections and the shard has none. Their conjunction
/// is `ReserveBegin`; otherwise `Nothing`.
pub fn action_info(target: &Target, session: &SafeSession, autocommit: bool) -> ShardActionInfo {
    if !(session.in_transaction() || session.in_reserved_conn()) {
        return ShardActionInfo {
            action: ActionNeeded::Nothing,
            transaction_id: 0,
            reserved_id: 0,
            alias: None,
        };
    }
    // No race with the upsert after the call: the planner never resolves
    // the same target twice within one scatter.
    let (transaction_id, reserved_id, alias) = session.find(target);

    let should_reserve = session.in_reserved_conn() && reserved_id == 0;
    let should_begin = session.in_transaction() && transaction_id == 0 && !autocommit;

    let action = match (should_begin, should_reserve) {
        (true, true) => ActionNeeded::ReserveBegin,
        (false, true) => ActionNeeded::Reserve,
        (true, false) => ActionNeeded::Begin,
        (false, false) => ActionNeeded::Nothing,
    };

    ShardActionInfo {
        action,
        transaction_id,
        reserved_id,
        alias,
    }
}

/// Decide what an advisory-lock call on `target` must do.
///
/// The first lock call reserves; later calls reuse the pinned
/// connection and must name the same target.
pub fn lock_info(target: &Target, session: &SafeSession) -> GateResult<ShardActionInfo> {
    let Some(lock_session) = session.lock_session() else {
        return Ok(ShardActionInfo {
            action: ActionNeeded::Reserve,
            transaction_id: 0,
            reserved_id: 0,
            alias: None,
        });
    };

    if lock_session.target != *target {
        return Err(GateError::not_found(format!(
            "target {} does not match the existing lock session target {}",
            target, lock_session.target
        )));
    }

    Ok(ShardActionInfo {
        action: ActionNeeded::Nothing,
        transaction_id: 0,
        reserved_id: lock_session.reserved_id,
        alias: lock_session.tablet_alias,
    })
}
