use anyhow::Context;
use std::fmt;
use std::sync::Arc;

use warden_config::Config;
use warden_core::auth::{
    AccessChecker, AuthService, PasswordHasher, SecretKey, TokenIssuer,
};
use warden_core::pipeline::{
    CircuitBreakerStage, LoggingStage, MetricsStage, Pipeline, RateLimitStage,
    RequestMetrics, ValidationStage,
};
use warden_core::rbac::RouteRoleRepository;
use warden_core::repositories::{
    InMemoryRouteRoleRepository, InMemoryUserRepository,
};
use warden_core::resilience::{CircuitBreaker, TokenBucketLimiter};
use warden_core::users::{UserRepository, UserService};

use crate::dispatch::{ApiRequest, ApiResponse, Dispatcher};

/// Everything a request handler needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Pipeline<ApiRequest, ApiResponse>,
    pub metrics: Arc<RequestMetrics>,
    pub breaker: Arc<CircuitBreaker>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    /// Wire the services over in-memory storage seeded with the
    /// configured route bindings.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let routes = InMemoryRouteRoleRepository::with_bindings(
            config
                .routes
                .iter()
                .map(|binding| (binding.route.clone(), binding.roles.clone())),
        );
        Self::with_repositories(
            config,
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(routes),
        )
    }

    pub fn with_repositories(
        config: Config,
        users: Arc<dyn UserRepository>,
        routes: Arc<dyn RouteRoleRepository>,
    ) -> anyhow::Result<Self> {
        let hasher = PasswordHasher::new(
            config.password.iterations,
            config.password.salt_length,
        )
        .context("invalid password hashing settings")?;

        let access = TokenIssuer::from_std(
            SecretKey::new(&config.auth.access_token_secret)
                .context("invalid access token secret")?,
            config.auth.access_token_ttl,
        );
        let refresh = TokenIssuer::from_std(
            SecretKey::new(&config.auth.refresh_token_secret)
                .context("invalid refresh token secret")?,
            config.auth.refresh_token_ttl,
        );

        let limiter = TokenBucketLimiter::new(
            config.rate_limiter.capacity,
            config.rate_limiter.period,
        )
        .context("invalid rate limiter settings")?;
        let breaker = Arc::new(
            CircuitBreaker::with_default_classifier(
                config.circuit_breaker.settings(),
            )
            .context("invalid circuit breaker settings")?,
        );
        let metrics = Arc::new(RequestMetrics::new());

        let dispatcher = Dispatcher::new(
            Arc::new(UserService::new(users.clone(), hasher.clone())),
            Arc::new(AuthService::new(users, hasher, access.clone(), refresh)),
            Arc::new(AccessChecker::new(access, routes)),
        );

        let pipeline = Pipeline::builder()
            .stage(LoggingStage)
            .stage(MetricsStage::new(metrics.clone()))
            .stage(ValidationStage)
            .stage(RateLimitStage::new(Arc::new(limiter)))
            .stage(CircuitBreakerStage::new(breaker.clone()))
            .build(dispatcher);

        Ok(Self {
            config: Arc::new(config),
            pipeline,
            metrics,
            breaker,
        })
    }

    pub async fn dispatch(
        &self,
        request: ApiRequest,
    ) -> warden_core::Result<ApiResponse> {
        self.pipeline.dispatch(request.method(), request).await
    }
}
