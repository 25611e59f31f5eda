mod settings;

pub use settings::{AppEnv, ConfigError, DatabaseConfig, ServerConfig, Settings};
