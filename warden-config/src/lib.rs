//! Configuration for Warden.
//!
//! Values are layered: process environment first, then the TOML file
//! (`--config`, `WARDEN_CONFIG`, `./warden.toml` or
//! `./config/warden.toml`), then built-in defaults. Token secrets have no
//! default and must be supplied.

pub mod loader;
pub mod models;
pub mod sources;
pub mod util;
pub mod validation;

pub use loader::{
    ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions,
};
pub use models::{
    AuthConfig, CircuitBreakerConfig, Config, ConfigMetadata, LogFormat,
    LoggingConfig, PasswordConfig, RateLimiterConfig, RouteBinding,
    ServerConfig,
};
pub use sources::{EnvConfig, FileConfig};
pub use validation::{ConfigWarning, ConfigWarnings};
