use std::fmt::Display;
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use warden_core::auth::password::{DEFAULT_ITERATIONS, DEFAULT_SALT_LENGTH};
use warden_core::resilience::BreakerConfigError;

use crate::models::{
    AuthConfig, CircuitBreakerConfig, Config, ConfigMetadata, LogFormat,
    LoggingConfig, PasswordConfig, RateLimiterConfig, ServerConfig,
};
use crate::sources::{EnvConfig, FileConfig};
use crate::util::{parse_duration, parse_value};
use crate::validation::{self, ConfigWarnings};

static DEFAULT_CONFIG_LOCATIONS: LazyLock<Vec<PathBuf>> = LazyLock::new(|| {
    vec![
        PathBuf::from("warden.toml"),
        PathBuf::from("config/warden.toml"),
    ]
});

const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);
const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Load `.env`, read the process environment and compose the result
    /// with the TOML file and defaults.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Compose configuration from an already gathered environment.
    pub fn load_with_env(
        &self,
        env: EnvConfig,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file, config_path) = self.load_file_config(&env)?;
        let mut warnings = ConfigWarnings::default();
        if config_path.is_none() {
            warnings.push_with_hint(
                "no warden.toml detected; using environment and defaults",
                "route role bindings can only be declared in the file",
            );
        }

        let config = compose(file.unwrap_or_default(), env, config_path)?;
        warnings.extend(validation::review(&config));
        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env.config_path.clone());

        let path = match explicit {
            Some(path) if !path.exists() => {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            Some(path) => path,
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
            {
                Some(path) => path.clone(),
                None => return Ok((None, None)),
            },
        };

        debug!(path = %path.display(), "reading configuration file");
        let contents =
            fs::read_to_string(&path).map_err(|source| ConfigLoadError::Io {
                path: path.clone(),
                source,
            })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|source| {
                ConfigLoadError::Parse {
                    path: path.clone(),
                    source,
                }
            })?;

        Ok((Some(file_config), Some(path)))
    }
}

fn compose(
    file: FileConfig,
    env: EnvConfig,
    config_path: Option<PathBuf>,
) -> Result<Config, ConfigLoadError> {
    let FileConfig {
        server: file_server,
        auth: file_auth,
        password: file_password,
        rate_limit: file_rate_limit,
        circuit_breaker: file_breaker,
        logging: file_logging,
        routes,
    } = file;

    let server = ServerConfig {
        host: env
            .server_host
            .or(file_server.host)
            .unwrap_or_else(|| "0.0.0.0".to_string()),
        port: parse_value("SERVER_PORT", env.server_port.as_deref())?
            .or(file_server.port)
            .unwrap_or(8080),
    };

    let auth = AuthConfig {
        access_token_secret: env
            .access_token_secret
            .or(file_auth.access_token_secret)
            .ok_or(ConfigLoadError::MissingSecret {
                key: "ACCESS_TOKEN_SECRET_KEY",
            })?,
        refresh_token_secret: env
            .refresh_token_secret
            .or(file_auth.refresh_token_secret)
            .ok_or(ConfigLoadError::MissingSecret {
                key: "REFRESH_TOKEN_SECRET_KEY",
            })?,
        access_token_ttl: layered_duration(
            "ACCESS_TOKEN_EXPIRATION",
            env.access_token_ttl,
            file_auth.access_token_ttl,
        )?
        .unwrap_or(DEFAULT_ACCESS_TTL),
        refresh_token_ttl: layered_duration(
            "REFRESH_TOKEN_EXPIRATION",
            env.refresh_token_ttl,
            file_auth.refresh_token_ttl,
        )?
        .unwrap_or(DEFAULT_REFRESH_TTL),
    };
    ensure_positive_duration(
        "ACCESS_TOKEN_EXPIRATION",
        auth.access_token_ttl,
    )?;
    ensure_positive_duration(
        "REFRESH_TOKEN_EXPIRATION",
        auth.refresh_token_ttl,
    )?;

    let password = PasswordConfig {
        iterations: parse_value(
            "PASSWORD_HASH_ITERATIONS",
            env.password_iterations.as_deref(),
        )?
        .or(file_password.iterations)
        .unwrap_or(DEFAULT_ITERATIONS),
        salt_length: parse_value(
            "PASSWORD_SALT_LENGTH",
            env.password_salt_length.as_deref(),
        )?
        .or(file_password.salt_length)
        .unwrap_or(DEFAULT_SALT_LENGTH),
    };
    ensure_nonzero("PASSWORD_HASH_ITERATIONS", password.iterations as usize)?;
    ensure_nonzero("PASSWORD_SALT_LENGTH", password.salt_length)?;

    let rate_limiter = RateLimiterConfig {
        capacity: parse_value(
            "RATE_LIMIT_CAPACITY",
            env.rate_limit_capacity.as_deref(),
        )?
        .or(file_rate_limit.capacity)
        .unwrap_or(100),
        period: layered_duration(
            "RATE_LIMIT_PERIOD",
            env.rate_limit_period,
            file_rate_limit.period,
        )?
        .unwrap_or(Duration::from_secs(1)),
    };
    ensure_nonzero("RATE_LIMIT_CAPACITY", rate_limiter.capacity)?;
    ensure_positive_duration("RATE_LIMIT_PERIOD", rate_limiter.period)?;

    let circuit_breaker = CircuitBreakerConfig {
        name: file_breaker.name.unwrap_or_else(|| "warden".to_string()),
        max_requests: parse_value(
            "CIRCUIT_BREAKER_MAX_REQUESTS",
            env.breaker_max_requests.as_deref(),
        )?
        .or(file_breaker.max_requests)
        .unwrap_or(10),
        timeout: layered_duration(
            "CIRCUIT_BREAKER_TIMEOUT",
            env.breaker_timeout,
            file_breaker.timeout,
        )?
        .unwrap_or(Duration::from_secs(30)),
        failure_ratio: parse_value(
            "CIRCUIT_BREAKER_FAILURE_RATIO",
            env.breaker_failure_ratio.as_deref(),
        )?
        .or(file_breaker.failure_ratio)
        .unwrap_or(0.5),
        half_open_max_calls: parse_value(
            "CIRCUIT_BREAKER_HALF_OPEN_CALLS",
            env.breaker_half_open_calls.as_deref(),
        )?
        .or(file_breaker.half_open_max_calls)
        .unwrap_or(1),
        success_threshold: parse_value(
            "CIRCUIT_BREAKER_SUCCESS_THRESHOLD",
            env.breaker_success_threshold.as_deref(),
        )?
        .or(file_breaker.success_threshold)
        .unwrap_or(1),
    };
    circuit_breaker.settings().validate()?;

    let logging = LoggingConfig {
        level: env
            .log_level
            .or(file_logging.level)
            .unwrap_or_else(|| "info".to_string()),
        format: parse_value::<LogFormat>(
            "LOG_FORMAT",
            env.log_format.as_deref(),
        )?
        .or(file_logging.format)
        .unwrap_or_default(),
    };

    Ok(Config {
        server,
        auth,
        password,
        rate_limiter,
        circuit_breaker,
        logging,
        routes,
        metadata: ConfigMetadata {
            config_path,
            env_file_loaded: false,
        },
    })
}

/// Environment wins over the file; both are humantime strings.
fn layered_duration(
    key: &'static str,
    env: Option<String>,
    file: Option<String>,
) -> Result<Option<Duration>, ConfigLoadError> {
    match parse_duration(key, env.as_deref())? {
        Some(duration) => Ok(Some(duration)),
        None => parse_duration(key, file.as_deref()),
    }
}

fn ensure_nonzero(
    key: &'static str,
    value: usize,
) -> Result<(), ConfigLoadError> {
    if value == 0 {
        return Err(ConfigLoadError::invalid(
            key,
            "0",
            "must be greater than zero",
        ));
    }
    Ok(())
}

fn ensure_positive_duration(
    key: &'static str,
    value: Duration,
) -> Result<(), ConfigLoadError> {
    if value.is_zero() {
        return Err(ConfigLoadError::invalid(
            key,
            "0s",
            "must be greater than zero",
        ));
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{key} is required but was not provided")]
    MissingSecret { key: &'static str },
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid circuit breaker settings")]
    CircuitBreaker(#[from] BreakerConfigError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

impl ConfigLoadError {
    pub fn invalid(
        key: &'static str,
        value: impl Into<String>,
        reason: impl Display,
    ) -> Self {
        ConfigLoadError::InvalidValue {
            key,
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}
