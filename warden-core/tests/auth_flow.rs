use chrono::Duration;
use std::sync::Arc;

use warden_core::auth::{
    AccessChecker, AuthService, PasswordHasher, SecretKey, TokenIssuer,
};
use warden_core::repositories::{
    InMemoryRouteRoleRepository, InMemoryUserRepository,
};
use warden_core::users::{CreateUser, UpdateUser, UserService};
use warden_core::{AuthError, ErrorKind, Role, ServiceError};

struct Fixture {
    users: UserService,
    auth: AuthService,
    checker: AccessChecker,
}

fn fixture() -> Fixture {
    let repo = Arc::new(InMemoryUserRepository::new());
    let hasher = PasswordHasher::new(1_000, 12).unwrap();
    let access = TokenIssuer::new(
        SecretKey::new("access-secret").unwrap(),
        Duration::minutes(5),
    );
    let refresh = TokenIssuer::new(
        SecretKey::new("refresh-secret").unwrap(),
        Duration::hours(1),
    );
    let routes = Arc::new(InMemoryRouteRoleRepository::with_bindings([
        ("/admin.Endpoint".to_string(), vec![Role::Admin]),
        ("/user.Endpoint".to_string(), vec![Role::User, Role::Admin]),
    ]));

    Fixture {
        users: UserService::new(repo.clone(), hasher.clone()),
        auth: AuthService::new(repo, hasher, access.clone(), refresh),
        checker: AccessChecker::new(access, routes),
    }
}

fn registration(email: &str, role: Role) -> CreateUser {
    CreateUser {
        name: "Alice".into(),
        email: email.into(),
        password: "Secret123!".into(),
        password_confirm: "Secret123!".into(),
        role,
    }
}

#[tokio::test]
async fn user_role_is_denied_on_admin_endpoint() {
    let fx = fixture();
    fx.users
        .create(registration("a@b.com", Role::User))
        .await
        .unwrap();

    let refresh = fx.auth.login("a@b.com", "Secret123!").await.unwrap();
    let access = fx.auth.get_access_token(&refresh).await.unwrap();
    let header = format!("Bearer {access}");

    fx.checker
        .check(Some(header.as_str()), "/user.Endpoint")
        .await
        .unwrap();

    let err = fx
        .checker
        .check(Some(header.as_str()), "/admin.Endpoint")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Auth(AuthError::PermissionDenied)));
}

#[tokio::test]
async fn admin_role_is_admitted_everywhere_it_is_bound() {
    let fx = fixture();
    fx.users
        .create(registration("root@b.com", Role::Admin))
        .await
        .unwrap();

    let refresh = fx.auth.login("root@b.com", "Secret123!").await.unwrap();
    let access = fx.auth.get_access_token(&refresh).await.unwrap();
    let header = format!("Bearer {access}");

    for endpoint in ["/admin.Endpoint", "/user.Endpoint"] {
        fx.checker.check(Some(header.as_str()), endpoint).await.unwrap();
    }
}

#[tokio::test]
async fn refresh_token_is_not_an_access_token() {
    let fx = fixture();
    fx.users
        .create(registration("a@b.com", Role::Admin))
        .await
        .unwrap();
    let refresh = fx.auth.login("a@b.com", "Secret123!").await.unwrap();
    let header = format!("Bearer {refresh}");

    let err = fx
        .checker
        .check(Some(header.as_str()), "/admin.Endpoint")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);
}

#[tokio::test]
async fn deleted_users_cannot_refresh() {
    let fx = fixture();
    let id = fx
        .users
        .create(registration("a@b.com", Role::User))
        .await
        .unwrap();
    let refresh = fx.auth.login("a@b.com", "Secret123!").await.unwrap();

    fx.users.delete(id).await.unwrap();

    let err = fx.auth.get_access_token(&refresh).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn email_change_moves_the_login() {
    let fx = fixture();
    let id = fx
        .users
        .create(registration("a@b.com", Role::User))
        .await
        .unwrap();

    fx.users
        .update(UpdateUser {
            id,
            name: None,
            email: Some("new@b.com".into()),
        })
        .await
        .unwrap();

    assert!(fx.auth.login("new@b.com", "Secret123!").await.is_ok());
    let err = fx.auth.login("a@b.com", "Secret123!").await.unwrap_err();
    assert!(matches!(err, ServiceError::Auth(AuthError::UserNotFound)));
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let fx = fixture();
    fx.users
        .create(registration("a@b.com", Role::User))
        .await
        .unwrap();

    let err = fx
        .users
        .create(registration("a@b.com", Role::Admin))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}
