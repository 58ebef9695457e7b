//! Gateway error taxonomy.
//!
//! Every error that crosses a component boundary carries one of a small
//! set of codes (`ErrorCode`) so that callers can make retry, rollback,
//! and accounting decisions without parsing messages:
//!
//! - client-caused codes (`AlreadyExists`, `InvalidArgument`) are never
//!   retried and never counted against a tablet
//! - `ResourceExhausted` and `Aborted` mark the session for rollback
//! - `Unavailable` drives the message-stream retry loop
//!
//! Errors reported by the MySQL server on a tablet keep their server
//! errno (`GateError::Tablet`) so the connection-loss predicate can
//! inspect it.

use thiserror::Error;

/// Convenience alias for `Result<T, GateError>`.
pub type GateResult<T> = Result<T, GateError>;

/// Classification code for retry/rollback/accounting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Internal,
    InvalidArgument,
    AlreadyExists,
    FailedPrecondition,
    ResourceExhausted,
    Aborted,
    Unavailable,
    DeadlineExceeded,
    NotFound,
    ClusterEvent,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::FailedPrecondition => "FAILED_PRECONDITION",
            ErrorCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ErrorCode::Aborted => "ABORTED",
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ClusterEvent => "CLUSTER_EVENT",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// MySQL error numbers the scatter core must recognize.

/// Duplicate key on insert/update.
pub const ER_DUP_ENTRY: u16 = 1062;
/// Syntax error in the statement.
pub const ER_PARSE_ERROR: u16 = 1064;
/// Too many connections on the server.
pub const ER_CON_COUNT_ERROR: u16 = 1040;
/// Deadlock detected; transaction rolled back.
pub const ER_LOCK_DEADLOCK: u16 = 1213;
/// Query execution was interrupted.
pub const ER_QUERY_INTERRUPTED: u16 = 1317;
/// MySQL server has gone away.
pub const CR_SERVER_GONE: u16 = 2006;
/// Lost connection to MySQL server during query.
pub const CR_SERVER_LOST: u16 = 2013;

/// Top-level error type for the gateway core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GateError {
    #[error("internal: {0}")]
    Internal(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("aborted: {0}")]
    Aborted(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// An operational event on the cluster (reparent, resharding) made
    /// the target temporarily unreachable at its old location.
    #[error("cluster event: {0}")]
    ClusterEvent(String),

    /// Error reported by the MySQL server on a tablet, with its errno.
    #[error("tablet error {errno}: {message}")]
    Tablet { errno: u16, message: String },
}

impl GateError {
    pub fn internal(msg: impl Into<String>) -> Self {
        GateError::Internal(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        GateError::InvalidArgument(msg.into())
    }

    pub fn failed_precondition(msg: impl Into<String>) -> Self {
        GateError::FailedPrecondition(msg.into())
    }

    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        GateError::ResourceExhausted(msg.into())
    }

    pub fn aborted(msg: impl Into<String>) -> Self {
        GateError::Aborted(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        GateError::Unavailable(msg.into())
    }

    pub fn deadline_exceeded(msg: impl Into<String>) -> Self {
        GateError::DeadlineExceeded(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        GateError::NotFound(msg.into())
    }

    pub fn cluster_event(msg: impl Into<String>) -> Self {
        GateError::ClusterEvent(msg.into())
    }

    /// A MySQL server error from a tablet.
    pub fn tablet(errno: u16, message: impl Into<String>) -> Self {
        GateError::Tablet {
            errno,
            message: message.into(),
        }
    }

    /// Build an error directly from a code and a message.
    pub fn from_code(code: ErrorCode, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match code {
            ErrorCode::Internal => GateError::Internal(msg),
            ErrorCode::InvalidArgument => GateError::InvalidArgument(msg),
            ErrorCode::AlreadyExists => GateError::AlreadyExists(msg),
            ErrorCode::FailedPrecondition => GateError::FailedPrecondition(msg),
            ErrorCode::ResourceExhausted => GateError::ResourceExhausted(msg),
            ErrorCode::Aborted => GateError::Aborted(msg),
            ErrorCode::Unavailable => GateError::Unavailable(msg),
            ErrorCode::DeadlineExceeded => GateError::DeadlineExceeded(msg),
            ErrorCode::NotFound => GateError::NotFound(msg),
            ErrorCode::ClusterEvent => GateError::ClusterEvent(msg),
        }
    }

    /// Classify this error for retry/rollback/accounting decisions.
    pub fn code(&self) -> ErrorCode {
        match self {
            GateError::Internal(_) => ErrorCode::Internal,
            GateError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            GateError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            GateError::FailedPrecondition(_) => ErrorCode::FailedPrecondition,
            GateError::ResourceExhausted(_) => ErrorCode::ResourceExhausted,
            GateError::Aborted(_) => ErrorCode::Aborted,
            GateError::Unavailable(_) => ErrorCode::Unavailable,
            GateError::DeadlineExceeded(_) => ErrorCode::DeadlineExceeded,
            GateError::NotFound(_) => ErrorCode::NotFound,
            GateError::ClusterEvent(_) => ErrorCode::ClusterEvent,
            GateError::Tablet { errno, .. } => code_for_errno(*errno),
        }
    }

    /// The human part of the message, without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            GateError::Internal(m)
            | GateError::InvalidArgument(m)
            | GateError::AlreadyExists(m)
            | GateError::FailedPrecondition(m)
            | GateError::ResourceExhausted(m)
            | GateError::Aborted(m)
            | GateError::Unavailable(m)
            | GateError::DeadlineExceeded(m)
            | GateError::NotFound(m)
            | GateError::ClusterEvent(m) => m,
            GateError::Tablet { message, .. } => message,
        }
    }

    /// The MySQL server errno, when this error came from a tablet.
    pub fn sql_errno(&self) -> Option<u16> {
        match self {
            GateError::Tablet { errno, .. } => Some(*errno),
            _ => None,
        }
    }

    /// True for errors caused by the client's own query (duplicate key,
    /// bad SQL). These are surfaced verbatim, never retried, and never
    /// counted against a tablet.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::AlreadyExists | ErrorCode::InvalidArgument
        )
    }

    /// True for errors that must mark the session for rollback.
    pub fn forces_rollback(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::ResourceExhausted | ErrorCode::Aborted
        )
    }

    /// Prepend context to the message, preserving the classification.
    pub fn with_context(self, ctx: impl Into<String>) -> Self {
        let ctx = ctx.into();
        match self {
            GateError::Tablet { errno, message } => GateError::Tablet {
                errno,
                message: format!("{ctx}: {message}"),
            },
            other => {
                let code = other.code();
                GateError::from_code(code, format!("{ctx}: {}", other.message()))
            }
        }
    }

    /// Collapse a list of shard errors into one surface error.
    ///
    /// Empty list means success. A single error is returned as-is; several
    /// are joined under the first error's code, keeping positional order.
    pub fn aggregate(mut errors: Vec<GateError>) -> Option<GateError> {
        match errors.len() {
            0 => None,
            1 => Some(errors.remove(0)),
            _ => {
                let code = errors[0].code();
                let joined = errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                Some(GateError::from_code(code, joined))
            }
        }
    }

    /// Emit a structured log entry for internal errors. Called before an
    /// `Internal` error is returned to the client.
    pub fn log_if_internal(&self) {
        if let GateError::Internal(message) = self {
            tracing::error!(code = self.code().as_str(), "internal error: {message}");
        }
    }
}

/// Map a MySQL server errno to a gateway error code.
fn code_for_errno(errno: u16) -> ErrorCode {
    match errno {
        ER_DUP_ENTRY => ErrorCode::AlreadyExists,
        ER_PARSE_ERROR => ErrorCode::InvalidArgument,
        ER_CON_COUNT_ERROR => ErrorCode::ResourceExhausted,
        ER_LOCK_DEADLOCK | ER_QUERY_INTERRUPTED => ErrorCode::Aborted,
        CR_SERVER_GONE | CR_SERVER_LOST => ErrorCode::Unavailable,
        _ => ErrorCode::Internal,
    }
}
