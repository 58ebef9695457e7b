//! Named predicates over tablet errors.
//!
//! The text patterns here are brittle by nature; keeping them behind
//! named predicates means the rest of the core never matches on
//! message strings, and the patterns can be swapped for structured
//! codes if the tablet layer grows them.

use std::sync::LazyLock;

use regex::Regex;

use harrier_common::error::{
    ErrorCode, GateError, CR_SERVER_GONE, CR_SERVER_LOST, ER_QUERY_INTERRUPTED,
};
use harrier_common::types::{TabletType, Target};

static TX_CLOSED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"transaction [a-z0-9:]+ (ended|not found)").unwrap());

static WRONG_TABLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(wrong|invalid) tablet type").unwrap());

static OPERATIONAL_EVENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"operation not allowed in state (NOT_SERVING|SHUTTING_DOWN)").unwrap());

/// True when the error means the tablet-side connection is gone: the
/// server went away mid-call, or the query was interrupted because its
/// transaction was closed underneath it.
pub fn was_connection_closed(err: &GateError) -> bool {
    match err.sql_errno() {
        Some(CR_SERVER_GONE) | Some(CR_SERVER_LOST) => true,
        Some(ER_QUERY_INTERRUPTED) => TX_CLOSED.is_match(err.message()),
        _ => false,
    }
}

/// True when the error means this physical tablet can no longer serve
/// the target (demotion, reparent, resharding) and the gateway should
/// pick another one.
pub fn requires_new_tablet(err: &GateError, target: &Target) -> bool {
    match err.code() {
        ErrorCode::FailedPrecondition => WRONG_TABLET.is_match(err.message()),
        ErrorCode::ClusterEvent => {
            target.tablet_type == TabletType::Primary
                || OPERATIONAL_EVENT.is_match(err.message())
        }
        _ => false,
    }
}
