use std::sync::Arc;
use tracing::debug;

use super::token::TokenIssuer;
use crate::error::{AuthError, Result, ServiceError};
use crate::rbac::RouteRoleRepository;

const BEARER_PREFIX: &str = "Bearer ";

/// Strip the `Bearer ` scheme from an `Authorization` header value.
///
/// The scheme is matched literally, including case and the single space.
pub fn extract_bearer(
    header: Option<&str>,
) -> std::result::Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingAuthHeader)?;
    header
        .strip_prefix(BEARER_PREFIX)
        .ok_or(AuthError::MalformedAuthHeader)
}

/// Authorizes a bearer access token against the roles bound to an endpoint.
#[derive(Clone)]
pub struct AccessChecker {
    access: TokenIssuer,
    routes: Arc<dyn RouteRoleRepository>,
}

impl std::fmt::Debug for AccessChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessChecker").finish_non_exhaustive()
    }
}

impl AccessChecker {
    pub fn new(
        access: TokenIssuer,
        routes: Arc<dyn RouteRoleRepository>,
    ) -> Self {
        Self { access, routes }
    }

    pub async fn check(
        &self,
        authorization: Option<&str>,
        endpoint: &str,
    ) -> Result<()> {
        let token = extract_bearer(authorization)?;
        let claims = self.access.verify(token).map_err(AuthError::from)?;

        let allowed = self
            .routes
            .get_route_roles(endpoint)
            .await
            .map_err(|err| {
                ServiceError::internal("failed to load route roles", err)
            })?;

        if allowed.contains(&claims.role) {
            debug!(endpoint, role = %claims.role, "access granted");
            Ok(())
        } else {
            debug!(endpoint, role = %claims.role, "access denied");
            Err(AuthError::PermissionDenied.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::{SecretKey, TokenError};
    use crate::error::ErrorKind;
    use crate::rbac::{MockRouteRoleRepository, Role};
    use chrono::Duration;
    use std::collections::HashSet;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(
            SecretKey::new("access-secret").unwrap(),
            Duration::minutes(5),
        )
    }

    fn checker(routes: MockRouteRoleRepository) -> AccessChecker {
        AccessChecker::new(issuer(), Arc::new(routes))
    }

    fn admin_only() -> MockRouteRoleRepository {
        let mut routes = MockRouteRoleRepository::new();
        routes.expect_get_route_roles().returning(|route| {
            Ok(if route == "/admin.Endpoint" {
                HashSet::from([Role::Admin])
            } else {
                HashSet::new()
            })
        });
        routes
    }

    fn bearer(role: Role) -> String {
        format!("Bearer {}", issuer().issue("a@b.com", role).unwrap())
    }

    #[test]
    fn bearer_prefix_is_literal() {
        assert!(matches!(
            extract_bearer(None),
            Err(AuthError::MissingAuthHeader)
        ));
        assert!(matches!(
            extract_bearer(Some("bearer abc")),
            Err(AuthError::MalformedAuthHeader)
        ));
        assert!(matches!(
            extract_bearer(Some("Token abc")),
            Err(AuthError::MalformedAuthHeader)
        ));
        assert_eq!(extract_bearer(Some("Bearer abc")).unwrap(), "abc");
    }

    #[tokio::test]
    async fn admits_bound_roles() {
        let header = bearer(Role::Admin);
        checker(admin_only())
            .check(Some(header.as_str()), "/admin.Endpoint")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn denies_roles_outside_the_binding() {
        let header = bearer(Role::User);
        let err = checker(admin_only())
            .check(Some(header.as_str()), "/admin.Endpoint")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn unknown_routes_deny_everyone() {
        let header = bearer(Role::Admin);
        let err = checker(admin_only())
            .check(Some(header.as_str()), "/unbound")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn header_problems_are_unauthenticated() {
        let mut routes = MockRouteRoleRepository::new();
        routes.expect_get_route_roles().never();
        let checker = checker(routes);

        for header in [None, Some("Basic abc"), Some("Bearer not-a-jwt")] {
            let err =
                checker.check(header, "/admin.Endpoint").await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Unauthenticated);
        }
    }

    #[tokio::test]
    async fn tokens_from_another_key_are_rejected() {
        let foreign = TokenIssuer::new(
            SecretKey::new("refresh-secret").unwrap(),
            Duration::minutes(5),
        )
        .issue("a@b.com", Role::Admin)
        .unwrap();
        let header = format!("Bearer {foreign}");

        let err = checker(admin_only())
            .check(Some(header.as_str()), "/admin.Endpoint")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Auth(AuthError::Token(TokenError::Invalid))
        ));
    }

    #[tokio::test]
    async fn repository_failures_propagate() {
        let mut routes = MockRouteRoleRepository::new();
        routes
            .expect_get_route_roles()
            .returning(|_| Err(anyhow::anyhow!("backend down")));

        let header = bearer(Role::Admin);
        let err = checker(routes)
            .check(Some(header.as_str()), "/admin.Endpoint")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
