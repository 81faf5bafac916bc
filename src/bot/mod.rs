//! Bot connections: socket lifecycle, authentication, message correlation
//! and the process-level connection pool.

pub mod account;
pub mod auth;
pub mod connection;
pub mod correlate;
pub mod error;
pub mod mock;
pub mod pool;
pub mod transport;

pub use account::{to_user_id, BotAccount};
pub use auth::{AuthError, HttpLoginService, LoginReply, LoginService};
pub use connection::{BotConnection, ConnectionState};
pub use correlate::{await_match, CorrelateError, MatchOutcome, MessageBus};
pub use error::BotError;
pub use pool::ConnectionPool;
pub use transport::{Transport, TransportError, WsTransport};
