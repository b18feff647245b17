use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
};
use serde::{Deserialize, Serialize};

use warden_core::auth::{LoginRequest, RefreshTokenRequest};
use warden_core::pipeline::MetricsSnapshot;
use warden_core::resilience::{BreakerSnapshot, BreakerState};
use warden_core::users::{CreateUser, UpdateUser, User};

use crate::AppState;
use crate::dispatch::{ApiRequest, ApiResponse};
use crate::errors::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshTokenResponse {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckAccessBody {
    pub endpoint: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub breaker: BreakerSnapshot,
}

fn unexpected(response: ApiResponse) -> AppError {
    AppError::internal(format!("unexpected pipeline response: {response:?}"))
}

pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUser>, JsonRejection>,
) -> AppResult<(StatusCode, Json<CreatedResponse>)> {
    let Json(request) = payload?;
    match state.dispatch(ApiRequest::CreateUser(request)).await? {
        ApiResponse::Created { id } => {
            Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
        }
        other => Err(unexpected(other)),
    }
}

pub async fn get_user(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<User>> {
    let Path(id) = id?;
    match state.dispatch(ApiRequest::GetUser { id }).await? {
        ApiResponse::User(user) => Ok(Json(user)),
        other => Err(unexpected(other)),
    }
}

pub async fn update_user(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateUser>, JsonRejection>,
) -> AppResult<StatusCode> {
    let Path(id) = id?;
    let Json(mut request) = payload?;
    // The path wins over any id in the body
    request.id = id;
    state.dispatch(ApiRequest::UpdateUser(request)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_user(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path(id) = id?;
    state.dispatch(ApiRequest::DeleteUser { id }).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<RefreshTokenResponse>> {
    let Json(request) = payload?;
    match state.dispatch(ApiRequest::Login(request)).await? {
        ApiResponse::RefreshToken(refresh_token) => {
            Ok(Json(RefreshTokenResponse { refresh_token }))
        }
        other => Err(unexpected(other)),
    }
}

pub async fn access_token(
    State(state): State<AppState>,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> AppResult<Json<AccessTokenResponse>> {
    let Json(request) = payload?;
    match state.dispatch(ApiRequest::GetAccessToken(request)).await? {
        ApiResponse::AccessToken(access_token) => {
            Ok(Json(AccessTokenResponse { access_token }))
        }
        other => Err(unexpected(other)),
    }
}

pub async fn refresh_token(
    State(state): State<AppState>,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> AppResult<Json<RefreshTokenResponse>> {
    let Json(request) = payload?;
    match state.dispatch(ApiRequest::GetRefreshToken(request)).await? {
        ApiResponse::RefreshToken(refresh_token) => {
            Ok(Json(RefreshTokenResponse { refresh_token }))
        }
        other => Err(unexpected(other)),
    }
}

/// Authorize the bearer token in `Authorization` for `endpoint`.
pub async fn check_access(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CheckAccessBody>, JsonRejection>,
) -> AppResult<StatusCode> {
    let Json(CheckAccessBody { endpoint }) = payload?;
    // A header that is not valid UTF-8 is treated as malformed downstream
    let authorization = headers.get(AUTHORIZATION).map(|value| {
        value.to_str().map(str::to_owned).unwrap_or_default()
    });

    state
        .dispatch(ApiRequest::CheckAccess {
            authorization,
            endpoint,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn health(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let breaker = state.breaker.snapshot();
    let (status, label) = match breaker.state {
        BreakerState::Closed => (StatusCode::OK, "ok"),
        BreakerState::HalfOpen => (StatusCode::OK, "recovering"),
        BreakerState::Open => (StatusCode::SERVICE_UNAVAILABLE, "degraded"),
    };
    (
        status,
        Json(HealthResponse {
            status: label,
            breaker,
        }),
    )
}

pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
