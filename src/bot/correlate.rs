//! Message correlation: awaitable, predicate-gated steps over an
//! unstructured inbound stream.
//!
//! Inbound messages are broadcast lines, not request/response pairs. A
//! protocol step that needs "the next message looking like X" attaches a
//! temporary observer via [`await_match`] and lets a predicate decide, per
//! message, whether the step is done, has failed, or keeps waiting.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::protocol::ServerMessage;

/// Capacity of a connection's inbound broadcast channel.
const BUS_CAPACITY: usize = 256;

/// Verdict of a correlation predicate for one inbound message.
pub enum MatchOutcome<T> {
    /// The message completes the step; resolve with the extracted value.
    Matched(T),
    /// The message signals an explicit protocol-level failure for this step.
    Reject(String),
    /// The message is not relevant to this step; keep listening.
    Pending,
}

/// Failure of one [`await_match`] call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CorrelateError {
    /// No matching message arrived within the configured window.
    #[error("no matching message within {0:?}")]
    Timeout(Duration),

    /// The cancellation scope bounding this wait was aborted.
    #[error("wait cancelled")]
    Cancelled,

    /// The predicate recognized an explicit failure condition.
    #[error("{0}")]
    Rejected(String),

    /// The connection's inbound stream ended while waiting.
    #[error("connection closed while waiting")]
    ConnectionClosed,
}

/// Fan-out point for one connection's inbound messages.
///
/// Every observer gets every message in arrival order. Dropping a
/// subscription is the only deregistration there is, which makes
/// deregistration idempotent and impossible to fire after settlement.
#[derive(Debug, Clone)]
pub struct MessageBus {
    tx: broadcast::Sender<ServerMessage>,
}

impl MessageBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Deliver one inbound message to all attached observers.
    pub fn publish(&self, message: ServerMessage) {
        // No observers attached is normal between steps.
        let _ = self.tx.send(message);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.tx.subscribe()
    }

    /// Number of currently attached observers.
    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for the next inbound message satisfying `predicate`.
///
/// The observer is attached eagerly, before the returned future is first
/// polled, so a caller can attach the wait, then send the command that
/// triggers the reply, without racing the reply.
///
/// The wait settles exactly once: with the matched value, with the
/// predicate's rejection reason, with [`CorrelateError::Timeout`] once
/// `timeout` elapses, or with [`CorrelateError::Cancelled`] if `scope` is
/// aborted first. Messages arriving after settlement are never observed.
pub fn await_match<T>(
    bus: &MessageBus,
    scope: &CancellationToken,
    timeout: Duration,
    mut predicate: impl FnMut(&ServerMessage) -> MatchOutcome<T>,
) -> impl std::future::Future<Output = Result<T, CorrelateError>> {
    let mut rx = bus.subscribe();
    let scope = scope.clone();

    async move {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = scope.cancelled() => return Err(CorrelateError::Cancelled),
                _ = &mut deadline => return Err(CorrelateError::Timeout(timeout)),
                received = rx.recv() => match received {
                    Ok(message) => match predicate(&message) {
                        MatchOutcome::Matched(value) => return Ok(value),
                        MatchOutcome::Reject(reason) => {
                            return Err(CorrelateError::Rejected(reason))
                        }
                        MatchOutcome::Pending => {}
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "correlator lagged behind inbound stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(CorrelateError::ConnectionClosed)
                    }
                },
            }
        }
    }
}
