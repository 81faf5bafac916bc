//! Connection-level error type.

use crate::bot::auth::AuthError;
use crate::bot::correlate::CorrelateError;
use crate::bot::transport::TransportError;

/// Failure of a bot connection. `Auth` and `Transport` variants are
/// connection-fatal and propagate through the shared cancellation scope.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Handshake or credential rejection.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Socket error or close.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The handshake challenge never arrived, or the wait was torn down.
    #[error("handshake failed: {0}")]
    Handshake(CorrelateError),

    /// The connection's I/O task has already exited.
    #[error("connection closed")]
    ConnectionClosed,
}
