//! Requests accepted by the HTTP surface and the terminal handler that
//! routes them to the services.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use warden_core::Result;
use warden_core::auth::{
    AccessChecker, AuthService, LoginRequest, RefreshTokenRequest,
};
use warden_core::pipeline::{Call, Handler};
use warden_core::users::{CreateUser, UpdateUser, User, UserService};
use warden_core::validation::{Validate, ValidationErrors};

pub enum ApiRequest {
    CreateUser(CreateUser),
    GetUser { id: i64 },
    UpdateUser(UpdateUser),
    DeleteUser { id: i64 },
    Login(LoginRequest),
    GetAccessToken(RefreshTokenRequest),
    GetRefreshToken(RefreshTokenRequest),
    CheckAccess {
        authorization: Option<String>,
        endpoint: String,
    },
}

impl ApiRequest {
    /// Operation name reported by the logging and metrics stages.
    pub fn method(&self) -> &'static str {
        match self {
            ApiRequest::CreateUser(_) => "users.create",
            ApiRequest::GetUser { .. } => "users.get",
            ApiRequest::UpdateUser(_) => "users.update",
            ApiRequest::DeleteUser { .. } => "users.delete",
            ApiRequest::Login(_) => "auth.login",
            ApiRequest::GetAccessToken(_) => "auth.access_token",
            ApiRequest::GetRefreshToken(_) => "auth.refresh_token",
            ApiRequest::CheckAccess { .. } => "access.check",
        }
    }
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiRequest::CreateUser(request) => fmt::Debug::fmt(request, f),
            ApiRequest::GetUser { id } => {
                f.debug_struct("GetUser").field("id", id).finish()
            }
            ApiRequest::UpdateUser(request) => fmt::Debug::fmt(request, f),
            ApiRequest::DeleteUser { id } => {
                f.debug_struct("DeleteUser").field("id", id).finish()
            }
            ApiRequest::Login(request) => fmt::Debug::fmt(request, f),
            ApiRequest::GetAccessToken(request)
            | ApiRequest::GetRefreshToken(request) => {
                fmt::Debug::fmt(request, f)
            }
            ApiRequest::CheckAccess { endpoint, .. } => f
                .debug_struct("CheckAccess")
                .field("endpoint", endpoint)
                .finish_non_exhaustive(),
        }
    }
}

fn positive_id(id: i64) -> std::result::Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    errors.ensure(id > 0, "id", "id must be positive");
    errors.into_result()
}

impl Validate for ApiRequest {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        match self {
            ApiRequest::CreateUser(request) => request.validate(),
            ApiRequest::GetUser { id } | ApiRequest::DeleteUser { id } => {
                positive_id(*id)
            }
            ApiRequest::UpdateUser(request) => {
                let mut errors = ValidationErrors::new();
                errors.ensure(request.id > 0, "id", "id must be positive");
                if let Err(more) = request.validate() {
                    for violation in more.violations() {
                        errors.push(violation.field, violation.message.clone());
                    }
                }
                errors.into_result()
            }
            ApiRequest::Login(request) => request.validate(),
            ApiRequest::GetAccessToken(request)
            | ApiRequest::GetRefreshToken(request) => request.validate(),
            ApiRequest::CheckAccess { endpoint, .. } => {
                let mut errors = ValidationErrors::new();
                errors.ensure(
                    !endpoint.trim().is_empty(),
                    "endpoint",
                    "endpoint must not be empty",
                );
                errors.into_result()
            }
        }
    }
}

#[derive(Debug)]
pub enum ApiResponse {
    Created { id: i64 },
    User(User),
    RefreshToken(String),
    AccessToken(String),
    Empty,
}

/// Terminal stage of the request pipeline.
#[derive(Clone)]
pub struct Dispatcher {
    users: Arc<UserService>,
    auth: Arc<AuthService>,
    access: Arc<AccessChecker>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        users: Arc<UserService>,
        auth: Arc<AuthService>,
        access: Arc<AccessChecker>,
    ) -> Self {
        Self {
            users,
            auth,
            access,
        }
    }
}

#[async_trait]
impl Handler<ApiRequest, ApiResponse> for Dispatcher {
    async fn call(&self, call: Call<ApiRequest>) -> Result<ApiResponse> {
        match call.request {
            ApiRequest::CreateUser(request) => {
                let id = self.users.create(request).await?;
                Ok(ApiResponse::Created { id })
            }
            ApiRequest::GetUser { id } => {
                Ok(ApiResponse::User(self.users.get(id).await?))
            }
            ApiRequest::UpdateUser(request) => {
                self.users.update(request).await?;
                Ok(ApiResponse::Empty)
            }
            ApiRequest::DeleteUser { id } => {
                self.users.delete(id).await?;
                Ok(ApiResponse::Empty)
            }
            ApiRequest::Login(request) => {
                let token = self
                    .auth
                    .login(&request.username, &request.password)
                    .await?;
                Ok(ApiResponse::RefreshToken(token))
            }
            ApiRequest::GetAccessToken(request) => {
                let token =
                    self.auth.get_access_token(&request.refresh_token).await?;
                Ok(ApiResponse::AccessToken(token))
            }
            ApiRequest::GetRefreshToken(request) => {
                let token =
                    self.auth.get_refresh_token(&request.refresh_token).await?;
                Ok(ApiResponse::RefreshToken(token))
            }
            ApiRequest::CheckAccess {
                authorization,
                endpoint,
            } => {
                self.access
                    .check(authorization.as_deref(), &endpoint)
                    .await?;
                Ok(ApiResponse::Empty)
            }
        }
    }
}
