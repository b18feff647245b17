use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::{LogFormat, RouteBinding};
use crate::util::env_var;

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub auth: FileAuthConfig,
    #[serde(default)]
    pub password: FilePasswordConfig,
    #[serde(default)]
    pub rate_limit: FileRateLimitConfig,
    #[serde(default)]
    pub circuit_breaker: FileCircuitBreakerConfig,
    #[serde(default)]
    pub logging: FileLoggingConfig,
    #[serde(default)]
    pub routes: Vec<RouteBinding>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileAuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_secret: Option<String>,
    /// Humantime duration, e.g. `15m`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_ttl: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FilePasswordConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salt_length: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileRateLimitConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileCircuitBreakerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_requests: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub half_open_max_calls: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_threshold: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileLoggingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<LogFormat>,
}

/// Environment-derived configuration values, kept raw so the loader can
/// report which variable failed to parse.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<String>,
    pub access_token_secret: Option<String>,
    pub refresh_token_secret: Option<String>,
    pub access_token_ttl: Option<String>,
    pub refresh_token_ttl: Option<String>,
    pub password_iterations: Option<String>,
    pub password_salt_length: Option<String>,
    pub rate_limit_capacity: Option<String>,
    pub rate_limit_period: Option<String>,
    pub breaker_max_requests: Option<String>,
    pub breaker_timeout: Option<String>,
    pub breaker_failure_ratio: Option<String>,
    pub breaker_half_open_calls: Option<String>,
    pub breaker_success_threshold: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: env_var("WARDEN_CONFIG").map(PathBuf::from),
            server_host: env_var("SERVER_HOST"),
            server_port: env_var("SERVER_PORT"),
            access_token_secret: env_var("ACCESS_TOKEN_SECRET_KEY"),
            refresh_token_secret: env_var("REFRESH_TOKEN_SECRET_KEY"),
            access_token_ttl: env_var("ACCESS_TOKEN_EXPIRATION"),
            refresh_token_ttl: env_var("REFRESH_TOKEN_EXPIRATION"),
            password_iterations: env_var("PASSWORD_HASH_ITERATIONS"),
            password_salt_length: env_var("PASSWORD_SALT_LENGTH"),
            rate_limit_capacity: env_var("RATE_LIMIT_CAPACITY"),
            rate_limit_period: env_var("RATE_LIMIT_PERIOD"),
            breaker_max_requests: env_var("CIRCUIT_BREAKER_MAX_REQUESTS"),
            breaker_timeout: env_var("CIRCUIT_BREAKER_TIMEOUT"),
            breaker_failure_ratio: env_var("CIRCUIT_BREAKER_FAILURE_RATIO"),
            breaker_half_open_calls: env_var("CIRCUIT_BREAKER_HALF_OPEN_CALLS"),
            breaker_success_threshold: env_var(
                "CIRCUIT_BREAKER_SUCCESS_THRESHOLD",
            ),
            log_level: env_var("LOG_LEVEL"),
            log_format: env_var("LOG_FORMAT"),
        }
    }
}
