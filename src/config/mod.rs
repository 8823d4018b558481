//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::util::rate_limit::DEFAULT_INPUT_RATE_LIMIT;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma-separated); `None` allows any
    pub client_origin: Option<String>,

    /// A world with no streams is reclaimed after this long without activity
    pub world_idle_timeout: Duration,
    /// How often the idle sweep runs
    pub world_cleanup_interval: Duration,
    /// Inbound payloads per second accepted from one connection
    pub input_rate_limit: u32,
    /// Projectiles pass through the ship that fired them
    pub owner_immunity: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // PORT wins over SERVER_ADDR when a platform provides it
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            client_origin: env::var("CLIENT_ORIGIN")
                .ok()
                .filter(|origins| !origins.trim().is_empty()),

            world_idle_timeout: Duration::from_secs(parse_or("WORLD_IDLE_TIMEOUT_SECS", 120)?),
            world_cleanup_interval: Duration::from_secs(
                parse_or::<u64>("WORLD_CLEANUP_INTERVAL_SECS", 30)?.max(1),
            ),
            input_rate_limit: parse_or("INPUT_RATE_LIMIT", DEFAULT_INPUT_RATE_LIMIT)?,
            owner_immunity: parse_or("OWNER_IMMUNITY", false)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            client_origin: None,
            world_idle_timeout: Duration::from_secs(120),
            world_cleanup_interval: Duration::from_secs(30),
            input_rate_limit: DEFAULT_INPUT_RATE_LIMIT,
            owner_immunity: false,
        }
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Environment variable {0} has an invalid value")]
    InvalidValue(&'static str),
}
