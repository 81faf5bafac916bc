//! Battle-level error taxonomy.

use std::time::Duration;

use crate::bot::error::BotError;

/// Failure of one battle choreography run.
///
/// Step-scoped variants (`OfflineOrUnregistered` and the timeouts) leave
/// both connections `Ready`; the caller may retry the whole choreography.
/// `Connection` failures propagate the underlying connection-fatal error.
#[derive(Debug, thiserror::Error)]
pub enum BattleError {
    /// Malformed battle spec. Fails fast; no I/O is performed.
    #[error("invalid battle spec: {0}")]
    InvalidSpec(String),

    /// A candidate player is offline or the name is unregistered.
    #[error("player unavailable: {0}")]
    OfflineOrUnregistered(String),

    /// The challenge was not accepted in time.
    #[error("challenge not accepted within {0:?}")]
    ChallengeTimeout(Duration),

    /// The battle room never initialized.
    #[error("battle room not initialized within {0:?}")]
    SessionInitTimeout(Duration),

    /// The battle never reached a terminal outcome.
    #[error("no battle outcome within {0:?}")]
    OutcomeTimeout(Duration),

    /// The persisted-result confirmation never arrived.
    #[error("no result link within {0:?}")]
    ResultLinkTimeout(Duration),

    /// The pool cannot supply two ready connections.
    #[error("connection pool not ready: {0}")]
    PoolNotReady(String),

    /// The choreography's cancellation scope was aborted mid-run.
    #[error("battle cancelled: {0}")]
    Cancelled(String),

    /// A connection failed underneath the choreography.
    #[error("connection failure during battle: {0}")]
    Connection(#[from] BotError),
}
