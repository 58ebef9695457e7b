//! Streaming fan-out and message-stream subscriptions.
//!
//! Both paths share one contract with the caller: the callback is never
//! invoked concurrently, the first invocation carries the schema, and
//! field-only packets after the first are swallowed. Every shard stream
//! funnels through a single mutex to get there.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;

use harrier_common::cancel::CancelToken;
use harrier_common::error::{ErrorCode, GateError, GateResult};
use harrier_common::types::Target;

use crate::action::ActionNeeded;
use crate::gateway::{ResolvedShard, StreamCallback};
use crate::query::{QueryResult, Value};
use crate::scatter::ScatterExecutor;
use crate::session::SafeSession;

/// Serializes shard-stream packets into the caller's callback and
/// enforces the fields-first protocol.
struct StreamFunnel<'a> {
    callback: StreamCallback<'a>,
    fields_sent: Mutex<bool>,
}

impl<'a> StreamFunnel<'a> {
    fn new(callback: StreamCallback<'a>) -> Self {
        Self {
            callback,
            fields_sent: Mutex::new(false),
        }
    }

    fn process(&self, result: QueryResult) -> GateResult<()> {
        let mut fields_sent = self.fields_sent.lock();
        if *fields_sent {
            if result.rows.is_empty() {
                // Another shard's field packet; the caller already has the
                // schema.
                return Ok(());
            }
        } else {
            if result.fields.is_empty() {
                // Only a misbehaving tablet sends rows before fields.
                return Err(GateError::internal("received rows before fields"));
            }
            *fields_sent = true;
        }
        // Invoked under the lock: the caller never observes two
        // invocations at once.
        (self.callback)(result)
    }
}

/// Tracks, per target, when deliveries started failing, so the message
/// stream knows when the grace period is spent.
struct TimeTracker {
    timestamps: Mutex<HashMap<Target, Instant>>,
}

impl TimeTracker {
    fn new() -> Self {
        Self {
            timestamps: Mutex::new(HashMap::new()),
        }
    }

    /// Forget the failure timestamp; called on every good delivery.
    fn reset(&self, target: &Target) {
        self.timestamps.lock().remove(target);
    }

    /// Timestamp of the first failure since the last good delivery,
    /// set to now on the first call after a reset.
    fn record(&self, target: &Target) -> Instant {
        *self
            .timestamps
            .lock()
            .entry(target.clone())
            .or_insert_with(Instant::now)
    }
}

impl ScatterExecutor {
    /// Stream one query across many shards, with per-shard bind
    /// variables. Partial results are delivered through `callback`,
    /// serialized and fields-first. Transactional and reserved state is
    /// handled exactly like `execute_multi_shard`, including the
    /// one-shot retry that re-materializes a lost reserved connection.
    pub fn stream_execute_multi(
        &self,
        query: &str,
        rss: &[ResolvedShard],
        bind_vars: &[HashMap<String, Value>],
        session: &SafeSession,
        autocommit: bool,
        callback: StreamCallback<'_>,
    ) -> Vec<Option<GateError>> {
        if rss.len() != bind_vars.len() {
            let err = GateError::internal(format!(
                "got mismatched number of bind variable sets ({}) and shards ({})",
                bind_vars.len(),
                rss.len()
            ));
            err.log_if_internal();
            return vec![Some(err)];
        }

        self.maybe_fire_lock_keepalive(session);

        let funnel = StreamFunnel::new(callback);

        self.multi_go_transaction(
            "StreamExecute",
            rss,
            session,
            autocommit,
            |rs, i, mut info| {
                let opts = session.options();

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
                let mut alias = None;
                let shard_cb = |qr: QueryResult| funnel.process(qr);

                let err = match info.action {
                    ActionNeeded::Nothing => {
                        match qs.stream_execute(
                            &rs.target,
                            query,
                            &bind_vars[i],
                            transaction_id,
                            reserved_id,
                            &opts,
                            &shard_cb,
                        ) {
                            Ok(()) => None,
                            Err(e) => {
                                if self.should_retry_on_fresh_conn(&info, &e, session, &rs.target) {
                                    info.action = ActionNeeded::Reserve;
                                    let out = rs.gateway.reserve_stream_execute(
                                        &rs.target,
                                        &session.pre_queries(),
                                        query,
                                        &bind_vars[i],
                                        0,
                                        &opts,
                                        &shard_cb,
                                    );
                                    reserved_id = out.reserved_id;
                                    alias = out.alias;
                                    out.result.err()
                                } else {
                                    Some(e)
                                }
                            }
                        }
                    }
                    ActionNeeded::Begin => {
                        let out = qs.begin_stream_execute(
                            &rs.target,
                            &session.savepoints(),
                            query,
                            &bind_vars[i],
                            reserved_id,
                            &opts,
                            &shard_cb,
                        );
                        transaction_id = out.transaction_id;
                        alias = out.alias;
                        match out.result {
                            Ok(()) => None,
                            Err(e) => {
                                if self.should_retry_on_fresh_conn(&info, &e, session, &rs.target) {
                                    info.action = ActionNeeded::ReserveBegin;
                                    let out = rs.gateway.reserve_begin_stream_execute(
                                        &rs.target,
                                        &session.pre_queries(),
                                        &session.savepoints(),
                                        query,
                                        &bind_vars[i],
                                        &opts,
                                        &shard_cb,
                                    );
                                    transaction_id = out.transaction_id;
                                    reserved_id = out.reserved_id;
                                    alias = out.alias;
                                    out.result.err()
                                } else {
                                    Some(e)
                                }
                            }
                        }
                    }
                    ActionNeeded::Reserve => {
                        let out = qs.reserve_stream_execute(
                            &rs.target,
                            &session.pre_queries(),
                            query,
                            &bind_vars[i],
                            transaction_id,
                            &opts,
                            &shard_cb,
                        );
                        reserved_id = out.reserved_id;
                        alias = out.alias;
                        out.result.err()
                    }
                    ActionNeeded::ReserveBegin => {
                        let out = qs.reserve_begin_stream_execute(
                            &rs.target,
                            &session.pre_queries(),
                            &session.savepoints(),
                            query,
                            &bind_vars[i],
                            &opts,
                            &shard_cb,
                        );
                        transaction_id = out.transaction_id;
                        reserved_id = out.reserved_id;
                        alias = out.alias;
                        out.result.err()
                    }
                };

                (info.updated(transaction_id, reserved_id, alias), err)
            },
        )
    }

    /// Long-lived message subscription across shards.
    ///
    /// Individual shard streams that end cleanly or fail with
    /// `Unavailable` (a tablet being demoted does both) are resubscribed
    /// after a fraction of the grace period. Once deliveries on a shard
    /// have kept failing for the whole grace period, every sibling
    /// stream is cancelled and the call fails with `DeadlineExceeded`.
    /// Cancellation of `cancel` (client disconnect) ends the call
    /// without error. Any other stream error cancels the siblings and is
    /// surfaced as the call's error.
    pub fn message_stream(
        &self,
        rss: &[ResolvedShard],
        name: &str,
        cancel: &CancelToken,
        callback: StreamCallback<'_>,
    ) -> GateResult<()> {
        let stream_cancel = cancel.child();
        let funnel = StreamFunnel::new(callback);
        let last_errors = TimeTracker::new();
        let grace = self.config().message_stream_grace_period();
        let retry_wait = grace / 5;

        let errors = self.multi_go("MessageStream", rss, |rs, _i| {
            // A reparent can end an individual stream; keep resubscribing
            // until deliveries have failed for the whole grace period.
            loop {
                let shard_cb = |qr: QueryResult| {
                    last_errors.reset(&rs.target);
                    funnel.process(qr)
                };
                match rs
                    .gateway
                    .message_stream(&rs.target, name, &stream_cancel, &shard_cb)
                {
                    // A clean end and Unavailable both mean the tablet may
                    // come back; fall through to the retry wait.
                    Ok(()) => {}
                    Err(e) if e.code() == ErrorCode::Unavailable => {}
                    Err(e) => {
                        stream_cancel.cancel();
                        return Err(e);
                    }
                }

                // Cancelled, most likely a client disconnect: a normal
                // return, not a failure.
                if stream_cancel.is_cancelled() {
                    return Ok(());
                }

                let first_failure = last_errors.record(&rs.target);
                if first_failure.elapsed() >= grace {
                    stream_cancel.cancel();
                    return Err(GateError::deadline_exceeded(format!(
                        "message stream from {} has repeatedly failed for longer than {:?}",
                        rs.target, grace
                    )));
                }

                if stream_cancel.wait_timeout(retry_wait) {
                    return Ok(());
                }
            }
        });

        match GateError::aggregate(errors.into_iter().flatten().collect()) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
