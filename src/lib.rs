pub mod battle;
pub mod bot;
pub mod config;
pub mod protocol;

pub use battle::{BattleError, BattleSession, BattleSpec, SideSpec};
pub use bot::{
    BotAccount, BotConnection, BotError, ConnectionPool, ConnectionState, CorrelateError,
    MatchOutcome, MessageBus,
};
pub use config::{Config, ConfigError, ServerConfig};
pub use protocol::ServerMessage;
