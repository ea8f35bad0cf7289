//! Session endpoints: signup, login, refresh, logout, modify, audit history,
//! and role listings.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{
    client_info, extract_bearer_token, normalize_email, normalize_username, valid_email,
    valid_username,
};
use crate::auth::error::ErrorBody;
use crate::auth::models::{AuthHistoryPage, Role};
use crate::auth::{AuthError, FixedWindowLimiter, SessionEngine, TokenKind, TokenPair};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ModifyRequest {
    pub username: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<TokenPair> for TokenPairResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(IntoParams, Deserialize, Debug)]
pub struct HistoryQuery {
    /// Pagination page, 1-based.
    pub page: Option<u32>,
    /// Events per page.
    pub per_page: Option<u32>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RoleView {
    pub role_id: Uuid,
    pub role_name: String,
}

impl From<Role> for RoleView {
    fn from(role: Role) -> Self {
        Self {
            role_id: role.id,
            role_name: role.name.to_string(),
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/user/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Access/refresh token pair issued", body = TokenPairResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 409, description = "Username or email already taken", body = ErrorBody)
    ),
    tag = "user"
)]
pub async fn signup(
    headers: HeaderMap,
    engine: Extension<Arc<SessionEngine>>,
    payload: Option<Json<SignupRequest>>,
) -> Response {
    let request: SignupRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let username = normalize_username(&request.username);
    if !valid_username(&username) {
        return (StatusCode::BAD_REQUEST, "Invalid username".to_string()).into_response();
    }

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    if request.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing password".to_string()).into_response();
    }

    let client = client_info(&headers);
    match engine
        .register_user(&username, &request.password, &email, &client)
        .await
    {
        Ok(pair) => (StatusCode::OK, Json(TokenPairResponse::from(pair))).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/user/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access/refresh token pair issued", body = TokenPairResponse),
        (status = 401, description = "Wrong password", body = ErrorBody),
        (status = 404, description = "Unknown username", body = ErrorBody)
    ),
    tag = "user"
)]
pub async fn login(
    headers: HeaderMap,
    engine: Extension<Arc<SessionEngine>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let username = normalize_username(&request.username);
    if username.is_empty() || request.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "Missing username or password".to_string(),
        )
            .into_response();
    }

    let client = client_info(&headers);
    match engine.login(&username, &request.password, &client).await {
        Ok(pair) => (StatusCode::OK, Json(TokenPairResponse::from(pair))).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/v1/user/refresh",
    responses(
        (status = 200, description = "New token pair; the presented refresh token is consumed", body = TokenPairResponse),
        (status = 401, description = "Invalid or already consumed refresh token", body = ErrorBody)
    ),
    security(("bearerAuth" = [])),
    tag = "user"
)]
pub async fn refresh(headers: HeaderMap, engine: Extension<Arc<SessionEngine>>) -> Response {
    let Some(token) = extract_bearer_token(&headers) else {
        return AuthError::InvalidToken.into_response();
    };

    // The bearer token IS the refresh token here.
    let claims = match engine.codec().decode(&token) {
        Ok(claims) => claims,
        Err(err) => return err.into_response(),
    };
    if claims.kind != TokenKind::Refresh {
        return AuthError::InvalidToken.into_response();
    }

    let client = client_info(&headers);
    match engine.refresh(claims.sub, &token, &client).await {
        Ok(pair) => (StatusCode::OK, Json(TokenPairResponse::from(pair))).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/user/logout",
    request_body = LogoutRequest,
    responses(
        (status = 202, description = "Session terminated"),
        (status = 401, description = "Access token expired or refresh token invalid", body = ErrorBody),
        (status = 429, description = "Rate limited", body = ErrorBody)
    ),
    security(("bearerAuth" = [])),
    tag = "user"
)]
pub async fn logout(
    headers: HeaderMap,
    engine: Extension<Arc<SessionEngine>>,
    limiter: Extension<Arc<FixedWindowLimiter>>,
    payload: Option<Json<LogoutRequest>>,
) -> Response {
    let Some(access_token) = extract_bearer_token(&headers) else {
        return AuthError::InvalidToken.into_response();
    };

    let claims = match engine.authenticate_access(&access_token).await {
        Ok(claims) => claims,
        Err(err) => return err.into_response(),
    };

    if let Err(err) = limiter.check(claims.sub).await {
        return err.into_response();
    }

    let request: LogoutRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match engine
        .logout(claims.sub, &access_token, &request.refresh_token)
        .await
    {
        Ok(()) => (StatusCode::ACCEPTED, Json(serde_json::json!({}))).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    patch,
    path = "/v1/user/modify",
    request_body = ModifyRequest,
    responses(
        (status = 202, description = "Credentials updated", body = MessageResponse),
        (status = 409, description = "Username already taken", body = ErrorBody),
        (status = 429, description = "Rate limited", body = ErrorBody)
    ),
    security(("bearerAuth" = [])),
    tag = "user"
)]
pub async fn modify(
    headers: HeaderMap,
    engine: Extension<Arc<SessionEngine>>,
    limiter: Extension<Arc<FixedWindowLimiter>>,
    payload: Option<Json<ModifyRequest>>,
) -> Response {
    let Some(access_token) = extract_bearer_token(&headers) else {
        return AuthError::InvalidToken.into_response();
    };

    let claims = match engine.authenticate_access(&access_token).await {
        Ok(claims) => claims,
        Err(err) => return err.into_response(),
    };

    if let Err(err) = limiter.check(claims.sub).await {
        return err.into_response();
    }

    let request: ModifyRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let username = normalize_username(&request.username);
    if !valid_username(&username) {
        return (StatusCode::BAD_REQUEST, "Invalid username".to_string()).into_response();
    }
    if request.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing password".to_string()).into_response();
    }

    match engine.modify(claims.sub, &username, &request.password).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(MessageResponse {
                message: "Credentials have been updated".to_string(),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/user/auth_history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "One page of auth events, newest first", body = AuthHistoryPage),
        (status = 401, description = "Access token expired", body = ErrorBody),
        (status = 429, description = "Rate limited", body = ErrorBody)
    ),
    security(("bearerAuth" = [])),
    tag = "user"
)]
pub async fn auth_history(
    headers: HeaderMap,
    engine: Extension<Arc<SessionEngine>>,
    limiter: Extension<Arc<FixedWindowLimiter>>,
    query: Query<HistoryQuery>,
) -> Response {
    let Some(access_token) = extract_bearer_token(&headers) else {
        return AuthError::InvalidToken.into_response();
    };

    let claims = match engine.authenticate_access(&access_token).await {
        Ok(claims) => claims,
        Err(err) => return err.into_response(),
    };

    if let Err(err) = limiter.check(claims.sub).await {
        return err.into_response();
    }

    match engine
        .get_auth_history(claims.sub, query.page, query.per_page)
        .await
    {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/user/roles",
    responses(
        (status = 200, description = "Roles of the authenticated user", body = [RoleView]),
        (status = 401, description = "Access token expired", body = ErrorBody)
    ),
    security(("bearerAuth" = [])),
    tag = "user"
)]
pub async fn my_roles(headers: HeaderMap, engine: Extension<Arc<SessionEngine>>) -> Response {
    let Some(access_token) = extract_bearer_token(&headers) else {
        return AuthError::InvalidToken.into_response();
    };

    let claims = match engine.authenticate_access(&access_token).await {
        Ok(claims) => claims,
        Err(err) => return err.into_response(),
    };

    match engine.get_user_roles_list(claims.sub).await {
        Ok(roles) => {
            let views: Vec<RoleView> = roles.into_iter().map(RoleView::from).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/user/{user_id}/roles",
    params(("user_id" = Uuid, Path, description = "User to list roles for")),
    responses(
        (status = 200, description = "Roles of the given user", body = [RoleView]),
        (status = 404, description = "Unknown user", body = ErrorBody)
    ),
    security(("bearerAuth" = [])),
    tag = "user"
)]
pub async fn user_roles(
    headers: HeaderMap,
    engine: Extension<Arc<SessionEngine>>,
    Path(user_id): Path<Uuid>,
) -> Response {
    let Some(access_token) = extract_bearer_token(&headers) else {
        return AuthError::InvalidToken.into_response();
    };

    if let Err(err) = engine.authenticate_access(&access_token).await {
        return err.into_response();
    }

    match engine.get_user_roles_list(user_id).await {
        Ok(roles) => {
            let views: Vec<RoleView> = roles.into_iter().map(RoleView::from).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => err.into_response(),
    }
}
