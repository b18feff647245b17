use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::handlers;

/// Create all v1 API routes
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/users", post(handlers::create_user))
        .route(
            "/users/{id}",
            get(handlers::get_user)
                .patch(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route("/auth/login", post(handlers::login))
        .route("/auth/access-token", post(handlers::access_token))
        .route("/auth/refresh-token", post(handlers::refresh_token))
        .route("/access/check", post(handlers::check_access))
}

/// Full application router with state attached.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", create_v1_router())
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
