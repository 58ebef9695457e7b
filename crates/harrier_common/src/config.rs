//! Gateway core configuration.
//!
//! All knobs are injected by value into the executors; nothing on the
//! hot path reads process-wide state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Whether a client transaction may span more than one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionMode {
    /// A transaction touching a second shard is aborted.
    Single,
    /// Best-effort multi-shard transactions.
    #[default]
    Multi,
}

/// Configuration for the scatter execution core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// How long a message stream may keep failing before the whole call
    /// gives up with a deadline error. Also sets the retry cadence
    /// (one fifth of the grace period).
    #[serde(default = "default_message_stream_grace_period_ms")]
    pub message_stream_grace_period_ms: u64,

    /// Maximum rows buffered in memory per scatter call before the call
    /// is failed with a resource-exhausted error (unless the caller
    /// opts out).
    #[serde(default = "default_max_memory_rows")]
    pub max_memory_rows: usize,

    /// Transaction mode enforced when shard sessions are appended.
    #[serde(default)]
    pub transaction_mode: TransactionMode,

    /// Interval between keepalive probes on a held advisory-lock
    /// connection.
    #[serde(default = "default_lock_heartbeat_interval_ms")]
    pub lock_heartbeat_interval_ms: u64,
}

fn default_message_stream_grace_period_ms() -> u64 {
    30_000
}

fn default_max_memory_rows() -> usize {
    300_000
}

fn default_lock_heartbeat_interval_ms() -> u64 {
    5_000
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            message_stream_grace_period_ms: default_message_stream_grace_period_ms(),
            max_memory_rows: default_max_memory_rows(),
            transaction_mode: TransactionMode::default(),
            lock_heartbeat_interval_ms: default_lock_heartbeat_interval_ms(),
        }
    }
}

impl GateConfig {
    pub fn message_stream_grace_period(&self) -> Duration {
        Duration::from_millis(self.message_stream_grace_period_ms)
    }

    pub fn lock_heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.lock_heartbeat_interval_ms)
    }
}
