use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::policy::{PolicyError, SecurityPolicy};
use crate::session::FRAMEWORK_DEFAULT_COOKIE_NAME;

/// Application configuration loaded from multiple sources.
///
/// Configuration is loaded in priority order (lowest to highest):
/// 1. Struct defaults
/// 2. config.yaml file (if exists)
/// 3. Environment variables with POSTURE_ prefix (always wins)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub security: SecurityPolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listener port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Listener bind address.
    #[serde(default = "default_host")]
    pub host: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Postgres connection string. Required; there is no compiled-in default.
    /// Its format is checked by the driver when connecting.
    #[serde(default)]
    pub url: String,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long startup waits for the first connection before giving up.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Secret used to sign session cookies. Required; there is no compiled-in default.
    #[serde(default)]
    pub secret: String,

    /// Session cookie name. Must not be the session framework's default.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level filter (debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// PEM certificate chain.
    #[serde(default = "default_cert_path")]
    pub cert_path: PathBuf,

    /// PEM private key.
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TemplatesConfig {
    /// Directory holding `.html` view templates.
    #[serde(default = "default_views_dir")]
    pub views_dir: PathBuf,

    /// Directory served under `/assets`.
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,
}

// These functions cannot be const because serde uses function pointers for defaults
#[allow(clippy::missing_const_for_fn)]
fn default_port() -> u16 {
    4000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_connections() -> u32 {
    10
}

#[allow(clippy::missing_const_for_fn)]
fn default_acquire_timeout_secs() -> u64 {
    10
}

fn default_cookie_name() -> String {
    "sessionId".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cert_path() -> PathBuf {
    PathBuf::from("artifacts/cert/server.crt")
}

fn default_key_path() -> PathBuf {
    PathBuf::from("artifacts/cert/server.key")
}

fn default_views_dir() -> PathBuf {
    PathBuf::from("views")
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("assets")
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: default_cert_path(),
            key_path: default_key_path(),
        }
    }
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            views_dir: default_views_dir(),
            assets_dir: default_assets_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: default_port(),
                host: default_host(),
            },
            database: DatabaseConfig {
                url: String::new(),
                max_connections: default_max_connections(),
                acquire_timeout_secs: default_acquire_timeout_secs(),
            },
            session: SessionConfig {
                secret: String::new(),
                cookie_name: default_cookie_name(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
            },
            tls: TlsConfig::default(),
            templates: TemplatesConfig::default(),
            security: SecurityPolicy::default(),
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("Missing configuration: {0}")]
    Missing(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Security policy error: {0}")]
    Policy(#[from] PolicyError),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Sources are merged in priority order:
    /// 1. Struct defaults (lowest)
    /// 2. config.yaml file (if exists)
    /// 3. Environment variables with POSTURE_ prefix (highest)
    ///
    /// # Errors
    /// Returns an error if configuration cannot be loaded or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config.yaml")
    }

    /// Load configuration with a custom YAML file path.
    ///
    /// # Errors
    /// Returns an error if configuration cannot be loaded or is invalid.
    pub fn load_from(yaml_path: &str) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Yaml::file(yaml_path))
            .merge(Env::prefixed("POSTURE_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns an error if any configuration value is missing or invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Session secret is required
        if self.session.secret.trim().is_empty() {
            return Err(ConfigError::Missing(
                "session.secret is required. Set POSTURE_SESSION__SECRET environment variable or configure in config.yaml.".into(),
            ));
        }

        // Database connection string is required
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Missing(
                "database.url is required. Set POSTURE_DATABASE__URL environment variable or configure in config.yaml.".into(),
            ));
        }

        // Port must be non-zero
        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port cannot be 0".into()));
        }

        // Max connections must be at least 1
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections cannot be 0".into(),
            ));
        }

        let cookie_name = self.session.cookie_name.trim();
        if cookie_name.is_empty() {
            return Err(ConfigError::Validation(
                "session.cookie_name cannot be empty".into(),
            ));
        }
        if cookie_name == FRAMEWORK_DEFAULT_COOKIE_NAME {
            return Err(ConfigError::Validation(format!(
                "session.cookie_name must not be the framework default '{FRAMEWORK_DEFAULT_COOKIE_NAME}'"
            )));
        }

        self.security.validate()?;

        Ok(())
    }
}
