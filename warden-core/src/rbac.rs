//! Role-based endpoint authorization
//!
//! Every principal carries exactly one [`Role`]. Routes are bound to the set
//! of roles allowed to call them; the binding is owned by a
//! [`RouteRoleRepository`] and is read-only from the point of view of the
//! access checker.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Role carried in token claims and stored on the user record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular account
    #[default]
    User,
    /// Administrative account
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Route to allowed-roles lookup.
///
/// An unknown route yields an empty set, which denies every caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RouteRoleRepository: Send + Sync {
    async fn get_route_roles(&self, route: &str)
    -> anyhow::Result<HashSet<Role>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_conversion() {
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Admin.to_string(), "admin");

        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("moderator".parse::<Role>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::User);
    }
}
