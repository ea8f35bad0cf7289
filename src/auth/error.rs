//! Domain error taxonomy for the session lifecycle core.
//!
//! Every failure a flow can produce is a typed variant carrying a stable
//! `error_code` and a human-readable message. The HTTP boundary renders them
//! as `{error_code, message}` JSON; infrastructure failures stay in
//! `Internal` and surface as 500 without leaking details.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Unknown user UUID")]
    UserNotFound,
    #[error("This username is already taken")]
    LoginExists,
    #[error("This email address is already used")]
    EmailExists,
    #[error("The password is incorrect")]
    WrongPassword,
    #[error("This refresh token is invalid")]
    InvalidRefreshToken,
    #[error("Access token has expired")]
    AccessTokenExpired,
    #[error("Insufficient permissions for this operation")]
    InsufficientPermissions,
    #[error("Request rate limit exceeded")]
    RateLimitExceeded,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Invalid role name")]
    InvalidRole,
    #[error("Role not found")]
    RoleNotFound,
    #[error("Role already exists")]
    RoleExists,
    #[error("User already has this role")]
    RoleAlreadyAssigned,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Wire shape for every error response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error_code: String,
    pub message: String,
}

impl AuthError {
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::LoginExists => "LOGIN_EXISTS",
            Self::EmailExists => "EMAIL_EXISTS",
            Self::WrongPassword => "WRONG_PASSWORD",
            Self::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            Self::AccessTokenExpired => "ACCESS_TOKEN_EXPIRED",
            Self::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::InvalidRole => "INVALID_ROLE",
            Self::RoleNotFound => "ROLE_NOT_FOUND",
            Self::RoleExists => "ROLE_EXISTS",
            Self::RoleAlreadyAssigned => "ROLE_ALREADY_ASSIGNED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UserNotFound | Self::RoleNotFound => StatusCode::NOT_FOUND,
            Self::LoginExists
            | Self::EmailExists
            | Self::RoleExists
            | Self::RoleAlreadyAssigned => StatusCode::CONFLICT,
            Self::WrongPassword
            | Self::InvalidRefreshToken
            | Self::AccessTokenExpired
            | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::InsufficientPermissions => StatusCode::FORBIDDEN,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::InvalidRole => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Internal(err) => {
                error!("Internal error: {err:?}");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error_code: self.error_code().to_string(),
            message,
        };

        (self.status(), Json(body)).into_response()
    }
}
