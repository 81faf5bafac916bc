mod settings;

pub use settings::{AccountConfig, Config, ConfigError, ServerConfig};
