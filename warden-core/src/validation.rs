//! Request validation primitives.
//!
//! Validators collect every violation instead of stopping at the first one,
//! so a single response can tell the caller everything that is wrong.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@<>()\[\],;:]+@[^\s@<>()\[\],;:]+\.[^\s@<>()\[\],;:]+$")
        .expect("email pattern is a valid regex")
});

/// Implemented by request types that can be checked before any business
/// logic runs.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationErrors>;
}

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

/// One or more field violations, reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error, Serialize)]
pub struct ValidationErrors {
    violations: Vec<FieldViolation>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.violations.push(FieldViolation {
            field,
            message: message.into(),
        });
    }

    /// Record a violation when `condition` does not hold.
    pub fn ensure(
        &mut self,
        condition: bool,
        field: &'static str,
        message: impl Into<String>,
    ) {
        if !condition {
            self.push(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    /// `Ok(())` when nothing was recorded, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.violations.is_empty() {
            return f.write_str("validation failed");
        }
        let messages: Vec<&str> = self
            .violations
            .iter()
            .map(|violation| violation.message.as_str())
            .collect();
        f.write_str(&messages.join(", "))
    }
}

/// Syntactic email check (`local@domain.tld`, no whitespace or brackets).
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(is_valid_email("a@b.com"));
        assert!(is_valid_email("first.last+tag@sub.example.org"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("spaces in@example.com"));
        assert!(!is_valid_email("user@localhost"));
    }

    #[test]
    fn collects_every_violation() {
        let mut errors = ValidationErrors::new();
        errors.ensure(false, "email", "invalid email");
        errors.ensure(true, "name", "unused");
        errors.ensure(false, "password_confirm", "password mismatch");

        let err = errors.into_result().unwrap_err();
        assert_eq!(err.violations().len(), 2);
        assert_eq!(err.to_string(), "invalid email, password mismatch");
    }
}
