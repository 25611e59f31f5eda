use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("MONGO_URI is not defined in environment variables")]
    MissingUri,

    #[error("invalid configuration value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub env: AppEnv,
    /// Location of the built frontend, served in production mode.
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    #[default]
    Development,
    Production,
}

impl AppEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub uri: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_static_dir() -> String {
    "frontend/dist".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_max_pool_size() -> u32 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            env: AppEnv::default(),
            static_dir: default_static_dir(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_pool_size: default_max_pool_size(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;
        settings.apply_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Bare environment variables win over the settings file. `MONGO_URI` is
    /// the canonical source for the connection string.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(uri) = std::env::var("MONGO_URI") {
            self.database.uri = uri;
        }

        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                field: "server.port",
                message: format!("PORT must be a port number, got '{}'", port),
            })?;
        }

        if let Ok(env) = std::env::var("APP_ENV") {
            self.server.env = match env.as_str() {
                "production" => AppEnv::Production,
                _ => AppEnv::Development,
            };
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.uri.trim().is_empty() {
            return Err(ConfigError::MissingUri);
        }

        if self.database.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "database.connect_timeout_ms",
                message: "timeout must be greater than zero".to_string(),
            });
        }

        if self.database.max_pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "database.max_pool_size",
                message: "pool size must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    pub fn static_path(&self) -> PathBuf {
        PathBuf::from(&self.server.static_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_driver_expectations() {
        let settings = Settings::default();
        assert_eq!(settings.database.connect_timeout_ms, 5000);
        assert_eq!(settings.database.max_pool_size, 10);
        assert_eq!(settings.server.port, 5000);
        assert_eq!(settings.server.env, AppEnv::Development);
    }

    #[test]
    fn empty_uri_is_rejected_before_any_connection_attempt() {
        let settings = Settings::default();
        match settings.validate() {
            Err(ConfigError::MissingUri) => {}
            other => panic!("expected MissingUri, got {:?}", other),
        }
    }

    #[test]
    fn whitespace_uri_is_rejected() {
        let mut settings = Settings::default();
        settings.database.uri = "   ".to_string();
        assert!(matches!(settings.validate(), Err(ConfigError::MissingUri)));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut settings = Settings::default();
        settings.database.uri = "mongodb://localhost:27017/test".to_string();
        settings.database.connect_timeout_ms = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { field: "database.connect_timeout_ms", .. })
        ));
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let mut settings = Settings::default();
        settings.database.uri = "mongodb://localhost:27017/test".to_string();
        settings.database.max_pool_size = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { field: "database.max_pool_size", .. })
        ));
    }

    #[test]
    fn valid_settings_pass_validation() {
        let mut settings = Settings::default();
        settings.database.uri = "mongodb://localhost:27017/test".to_string();
        assert!(settings.validate().is_ok());
    }
}
