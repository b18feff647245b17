use std::fmt;

use crate::models::Config;

/// Shortest secret that does not produce a warning.
pub const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hint {
            Some(hint) => write!(f, "{} ({})", self.message, hint),
            None => f.write_str(&self.message),
        }
    }
}

/// Non-fatal findings collected while loading configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigWarnings {
    items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push(&mut self, message: impl Into<String>) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint(
        &mut self,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

/// Warnings for settings that are valid but risky.
pub fn review(config: &Config) -> ConfigWarnings {
    let mut warnings = ConfigWarnings::default();
    let auth = &config.auth;

    for (name, secret) in [
        ("ACCESS_TOKEN_SECRET_KEY", &auth.access_token_secret),
        ("REFRESH_TOKEN_SECRET_KEY", &auth.refresh_token_secret),
    ] {
        if secret.len() < MIN_SECRET_BYTES {
            warnings.push_with_hint(
                format!("{name} is shorter than {MIN_SECRET_BYTES} bytes"),
                "generate one with `openssl rand -base64 48`",
            );
        }
    }

    if auth.access_token_secret == auth.refresh_token_secret {
        warnings.push_with_hint(
            "access and refresh tokens share a secret",
            "a refresh token would then verify as an access token",
        );
    }

    if auth.access_token_ttl >= auth.refresh_token_ttl {
        warnings.push("access token TTL is not shorter than refresh token TTL");
    }

    if config.routes.is_empty() {
        warnings.push_with_hint(
            "no route role bindings configured",
            "every access check will be denied",
        );
    }

    warnings
}
