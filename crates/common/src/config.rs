//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Storage backend selection.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Redis configuration. Cross-instance change relay is disabled when absent.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    /// Identity provider configuration.
    pub auth: AuthConfig,
    /// Live feed configuration.
    #[serde(default)]
    pub feed: FeedConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this instance.
    pub url: String,
}

/// Which document store backs profiles and reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    /// `PostgreSQL` through sea-orm.
    #[default]
    Postgres,
    /// In-process store; contents are lost on restart.
    Memory,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Backend to use.
    #[serde(default)]
    pub backend: StorageBackendKind,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    #[serde(default)]
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
    /// Key prefix for all Redis channels.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

/// Identity provider configuration.
///
/// Sign-in credentials are ID tokens signed with `jwt_secret` (HS256).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared secret used to verify ID tokens.
    pub jwt_secret: String,
    /// Expected `iss` claim, if any.
    #[serde(default)]
    pub issuer: Option<String>,
    /// Expected `aud` claim, if any.
    #[serde(default)]
    pub audience: Option<String>,
    /// Lifetime of an application session in seconds.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

/// Live feed configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Capacity of the in-process change channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// First retry delay after a failed snapshot query, in milliseconds.
    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,
    /// Upper bound for the retry delay, in milliseconds.
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            retry_initial_ms: default_retry_initial_ms(),
            retry_max_ms: default_retry_max_ms(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

fn default_redis_prefix() -> String {
    "equalvoice".to_string()
}

const fn default_session_ttl() -> u64 {
    7 * 24 * 60 * 60
}

const fn default_channel_capacity() -> usize {
    1024
}

const fn default_retry_initial_ms() -> u64 {
    250
}

const fn default_retry_max_ms() -> u64 {
    30_000
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `EQUALVOICE_ENV`)
    /// 3. Environment variables with `EQUALVOICE_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("EQUALVOICE_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("EQUALVOICE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("EQUALVOICE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Parse configuration from a TOML document, without environment overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
