//! Shared foundation for the harrierdb gateway: error taxonomy, target
//! addressing, configuration, cancellation, and per-target call metrics.

pub mod cancel;
pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

pub use cancel::CancelToken;
pub use config::{GateConfig, TransactionMode};
pub use error::{ErrorCode, GateError, GateResult};
pub use metrics::{CallKey, CallStatsSnapshot, ScatterMetrics};
pub use types::{TabletAlias, TabletType, Target};
