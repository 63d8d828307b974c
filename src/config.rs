//! Service configuration, loaded from environment variables.
//!
//! We read `std::env` directly rather than pulling in an env-config crate,
//! since the loading mechanism itself isn't part of the contract — only the
//! shape below is.

use std::env;
use std::time::Duration;

use crate::errors::GeoError;

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, GeoError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| GeoError::Setup(format!("invalid value for {}: {:?}", name, value))),
        Err(_) => Ok(default),
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub service_name: String,
    pub grpc_port: u16,
    pub rest_port: u16,
    pub metrics_port: u16,
    pub environment: String,
    pub database: DatabaseConfig,
}

impl Config {
    /// Load configuration from the environment, applying defaults for
    /// anything unset.
    pub fn from_env() -> Result<Config, GeoError> {
        Ok(Config {
            service_name: env_or("SERVICE_NAME", "geoloc-service"),
            grpc_port: parse_env("APP_GRPC_PORT", 8000)?,
            rest_port: parse_env("APP_REST_PORT", 8080)?,
            metrics_port: parse_env("APP_METRICS_PORT", 8081)?,
            environment: env_or("ENVIRONMENT", "dev"),
            database: DatabaseConfig::from_env()?,
        })
    }

    pub fn is_dev(&self) -> bool {
        self.environment.to_lowercase().starts_with("dev")
    }

    pub fn grpc_addr(&self) -> String {
        format!("0.0.0.0:{}", self.grpc_port)
    }

    /// The address the REST gateway dials to reach the gRPC listener.
    /// `grpc_addr` is a bind address (`0.0.0.0`); a client has to target a
    /// concrete loopback host instead.
    pub fn grpc_dial_addr(&self) -> String {
        format!("127.0.0.1:{}", self.grpc_port)
    }

    pub fn rest_addr(&self) -> String {
        format!("0.0.0.0:{}", self.rest_port)
    }

    pub fn metrics_addr(&self) -> String {
        format!("0.0.0.0:{}", self.metrics_port)
    }
}

/// Database connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub dsn: String,
    pub max_lifetime_secs: u64,
    pub max_idle_conns: u32,
    pub max_open_conns: u32,
}

impl DatabaseConfig {
    fn from_env() -> Result<DatabaseConfig, GeoError> {
        Ok(DatabaseConfig {
            dsn: env::var("DATABASE_DSN")
                .map_err(|_| GeoError::Setup("DATABASE_DSN is required".to_owned()))?,
            max_lifetime_secs: parse_env("MAX_LIFETIME_SECS", 4 * 60 * 60)?,
            max_idle_conns: parse_env("MAX_IDLE_CONNECTIONS", 20)?,
            max_open_conns: parse_env("MAX_OPEN_CONNECTIONS", 20)?,
        })
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}
