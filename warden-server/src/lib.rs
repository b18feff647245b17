//! HTTP surface for Warden.
//!
//! Every API call is turned into an [`dispatch::ApiRequest`] and run
//! through the request pipeline (logging, metrics, validation, rate limit,
//! circuit breaker) before it reaches the user, auth or access services.

pub mod dispatch;
pub mod errors;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use routes::build_router;
pub use state::AppState;
