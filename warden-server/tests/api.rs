use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tower::ServiceExt;

use warden_config::{
    AuthConfig, CircuitBreakerConfig, Config, ConfigMetadata, LogFormat,
    LoggingConfig, PasswordConfig, RateLimiterConfig, RouteBinding,
    ServerConfig,
};
use warden_core::repositories::InMemoryRouteRoleRepository;
use warden_core::users::{NewUser, User, UserRepository};
use warden_core::{Role, ServiceError};
use warden_server::{AppState, build_router};

fn config(capacity: usize) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
        },
        auth: AuthConfig {
            access_token_secret: "access-secret-access-secret-access-secret"
                .into(),
            refresh_token_secret:
                "refresh-secret-refresh-secret-refresh-secret".into(),
            access_token_ttl: Duration::from_secs(60),
            refresh_token_ttl: Duration::from_secs(3_600),
        },
        password: PasswordConfig {
            iterations: 1_000,
            salt_length: 12,
        },
        rate_limiter: RateLimiterConfig {
            capacity,
            period: Duration::from_secs(60),
        },
        circuit_breaker: CircuitBreakerConfig {
            name: "api".into(),
            max_requests: 2,
            timeout: Duration::from_secs(30),
            failure_ratio: 0.5,
            half_open_max_calls: 1,
            success_threshold: 1,
        },
        logging: LoggingConfig {
            level: "debug".into(),
            format: LogFormat::Pretty,
        },
        routes: vec![
            RouteBinding {
                route: "/admin.Endpoint".into(),
                roles: vec![Role::Admin],
            },
            RouteBinding {
                route: "/user.Endpoint".into(),
                roles: vec![Role::User, Role::Admin],
            },
        ],
        metadata: ConfigMetadata::default(),
    }
}

fn app(capacity: usize) -> Router {
    build_router(AppState::from_config(config(capacity)).unwrap())
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    bearer: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder =
            builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn register(app: &Router, email: &str, role: &str) -> i64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/users",
        Some(json!({
            "name": "Ada",
            "email": email,
            "password": "correct horse",
            "password_confirm": "correct horse",
            "role": role,
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_i64().unwrap()
}

async fn login(app: &Router, email: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/auth/login",
        Some(json!({ "username": email, "password": "correct horse" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["refresh_token"].as_str().unwrap().to_string()
}

async fn access_token(app: &Router, refresh_token: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/auth/access-token",
        Some(json!({ "refresh_token": refresh_token })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["access_token"].as_str().unwrap().to_string()
}

async fn check(
    app: &Router,
    token: Option<&str>,
    endpoint: &str,
) -> StatusCode {
    send(
        app,
        Method::POST,
        "/api/v1/access/check",
        Some(json!({ "endpoint": endpoint })),
        token,
    )
    .await
    .0
}

#[tokio::test]
async fn user_lifecycle() {
    let app = app(100);
    let id = register(&app, "ada@example.com", "user").await;

    let (status, body) =
        send(&app, Method::GET, &format!("/api/v1/users/{id}"), None, None)
            .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "ada@example.com");
    assert_eq!(body["role"], "user");
    assert!(body.get("password_hash").is_none());

    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/api/v1/users/{id}"),
        Some(json!({ "name": "Ada Lovelace" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) =
        send(&app, Method::GET, &format!("/api/v1/users/{id}"), None, None)
            .await;
    assert_eq!(body["name"], "Ada Lovelace");

    let (status, _) =
        send(&app, Method::DELETE, &format!("/api/v1/users/{id}"), None, None)
            .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) =
        send(&app, Method::GET, &format!("/api/v1/users/{id}"), None, None)
            .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["status"], 404);
}

#[tokio::test]
async fn registration_errors_map_to_client_statuses() {
    let app = app(100);
    register(&app, "ada@example.com", "user").await;

    let duplicate = json!({
        "name": "Ada",
        "email": "ADA@example.com",
        "password": "pw",
        "password_confirm": "pw",
    });
    let (status, _) =
        send(&app, Method::POST, "/api/v1/users", Some(duplicate), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let invalid = json!({
        "name": "Bob",
        "email": "not-an-email",
        "password": "one",
        "password_confirm": "two",
    });
    let (status, body) =
        send(&app, Method::POST, "/api/v1/users", Some(invalid), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("invalid email"), "{message}");
    assert!(message.contains("password mismatch"), "{message}");

    let (status, body) =
        send(&app, Method::GET, "/api/v1/users/abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["status"], 400);

    let (status, _) =
        send(&app, Method::GET, "/api/v1/users/0", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn token_flow_and_access_checks() {
    let app = app(100);
    register(&app, "admin@example.com", "admin").await;
    register(&app, "user@example.com", "user").await;

    let admin_refresh = login(&app, "admin@example.com").await;
    let admin_access = access_token(&app, &admin_refresh).await;
    let user_access =
        access_token(&app, &login(&app, "user@example.com").await).await;

    assert_eq!(
        check(&app, Some(admin_access.as_str()), "/admin.Endpoint").await,
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        check(&app, Some(user_access.as_str()), "/user.Endpoint").await,
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        check(&app, Some(user_access.as_str()), "/admin.Endpoint").await,
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        check(&app, Some(admin_access.as_str()), "/unbound.Endpoint").await,
        StatusCode::FORBIDDEN
    );

    // Refresh tokens are signed with a different key
    assert_eq!(
        check(&app, Some(admin_refresh.as_str()), "/admin.Endpoint").await,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        check(&app, None, "/admin.Endpoint").await,
        StatusCode::UNAUTHORIZED
    );

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/auth/refresh-token",
        Some(json!({ "refresh_token": admin_refresh })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rotated = body["refresh_token"].as_str().unwrap();
    access_token(&app, rotated).await;
}

#[tokio::test]
async fn login_failures_are_rejected() {
    let app = app(100);
    register(&app, "ada@example.com", "user").await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        Some(json!({ "username": "ada@example.com", "password": "wrong" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        Some(json!({ "username": "nobody@example.com", "password": "pw" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/auth/access-token",
        Some(json!({ "refresh_token": "not.a.jwt" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn requests_over_capacity_are_rate_limited() {
    let app = app(2);
    let id = register(&app, "ada@example.com", "user").await;

    let uri = format!("/api/v1/users/{id}");
    let (status, _) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["message"], "too many requests");

    // Health and metrics bypass the pipeline
    let (status, _) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn metrics_count_requests_per_method() {
    let app = app(100);
    let id = register(&app, "ada@example.com", "user").await;
    send(&app, Method::GET, &format!("/api/v1/users/{id}"), None, None).await;
    send(&app, Method::GET, "/api/v1/users/999", None, None).await;

    let (status, body) = send(&app, Method::GET, "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requests_total"], 3);
    assert_eq!(body["methods"]["users.create"]["success"], 1);
    assert_eq!(body["methods"]["users.get"]["success"], 1);
    assert_eq!(body["methods"]["users.get"]["error"], 1);

    let buckets = body["methods"]["users.get"]["latency"]["buckets"]
        .as_array()
        .unwrap();
    assert_eq!(buckets.len(), 12);
    assert_eq!(buckets[0]["le_ms"], 5);
    assert!(buckets[11]["le_ms"].is_null());
    let observed: u64 =
        buckets.iter().map(|bucket| bucket["count"].as_u64().unwrap()).sum();
    assert_eq!(observed, 2);

    let error_times = &body["response_time"]["error"]["buckets"];
    let errors: u64 = error_times
        .as_array()
        .unwrap()
        .iter()
        .map(|bucket| bucket["count"].as_u64().unwrap())
        .sum();
    assert_eq!(errors, 1);
}

#[test]
fn out_of_range_rate_period_fails_at_startup() {
    let mut config = config(10);
    config.rate_limiter.period = Duration::from_secs(u64::MAX / 2);

    let err = AppState::from_config(config).unwrap_err();
    assert!(err.to_string().contains("invalid rate limiter settings"));
}

/// Storage that is always down.
#[derive(Debug, Default)]
struct OfflineUsers {
    calls: AtomicUsize,
}

impl OfflineUsers {
    fn fail<T>(&self) -> warden_core::Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ServiceError::unavailable("user store offline"))
    }
}

#[async_trait]
impl UserRepository for OfflineUsers {
    async fn create(&self, _user: NewUser) -> warden_core::Result<User> {
        self.fail()
    }

    async fn get(&self, _id: i64) -> warden_core::Result<Option<User>> {
        self.fail()
    }

    async fn get_by_email(
        &self,
        _email: &str,
    ) -> warden_core::Result<Option<User>> {
        self.fail()
    }

    async fn update(&self, _user: &User) -> warden_core::Result<bool> {
        self.fail()
    }

    async fn delete(&self, _id: i64) -> warden_core::Result<bool> {
        self.fail()
    }
}

#[tokio::test]
async fn storage_outage_opens_the_breaker() {
    let users = Arc::new(OfflineUsers::default());
    let state = AppState::with_repositories(
        config(100),
        users.clone(),
        Arc::new(InMemoryRouteRoleRepository::new()),
    )
    .unwrap();
    let app = build_router(state);

    for _ in 0..2 {
        let (status, body) =
            send(&app, Method::GET, "/api/v1/users/1", None, None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["message"], "user store offline");
    }

    let (status, body) =
        send(&app, Method::GET, "/api/v1/users/1", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["message"], "service unavailable");
    assert_eq!(users.calls.load(Ordering::SeqCst), 2);

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
}
