//! Role administration endpoints, superuser-gated.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::extract_bearer_token;
use super::user::MessageResponse;
use crate::auth::error::ErrorBody;
use crate::auth::models::Role;
use crate::auth::{guard, AuthError, Claims, SessionEngine};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RolePayload {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AssignRoleRequest {
    pub role_id: Uuid,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RoleDetails {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Role> for RoleDetails {
    fn from(role: Role) -> Self {
        Self {
            id: role.id,
            name: role.name.to_string(),
            description: role.description,
            created_at: role.created_at,
            updated_at: role.updated_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RolesResponse {
    pub roles: Vec<RoleDetails>,
}

/// Gate for every handler in this module: live access token + superuser.
async fn require_superuser(
    headers: &HeaderMap,
    engine: &SessionEngine,
) -> Result<Claims, Response> {
    let Some(token) = extract_bearer_token(headers) else {
        return Err(AuthError::InvalidToken.into_response());
    };
    let claims = engine
        .authenticate_access(&token)
        .await
        .map_err(IntoResponse::into_response)?;
    guard::authorize(&claims, &[]).map_err(IntoResponse::into_response)?;
    Ok(claims)
}

#[utoipa::path(
    post,
    path = "/v1/role",
    request_body = RolePayload,
    responses(
        (status = 201, description = "Role created", body = MessageResponse),
        (status = 400, description = "Missing name or description", body = String),
        (status = 403, description = "Not a superuser", body = ErrorBody),
        (status = 409, description = "Role already exists", body = ErrorBody)
    ),
    security(("bearerAuth" = [])),
    tag = "role"
)]
pub async fn create_role(
    headers: HeaderMap,
    engine: Extension<Arc<SessionEngine>>,
    payload: Option<Json<RolePayload>>,
) -> Response {
    if let Err(response) = require_superuser(&headers, &engine).await {
        return response;
    }

    let request: RolePayload = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let (Some(name), Some(description)) = (request.name, request.description) else {
        return (
            StatusCode::BAD_REQUEST,
            "Missing name or description".to_string(),
        )
            .into_response();
    };

    match engine.create_role(&name, &description).await {
        Ok(_) => (
            StatusCode::CREATED,
            Json(MessageResponse {
                message: "Role created successfully".to_string(),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/role",
    responses(
        (status = 200, description = "All existing roles", body = RolesResponse),
        (status = 403, description = "Not a superuser", body = ErrorBody)
    ),
    security(("bearerAuth" = [])),
    tag = "role"
)]
pub async fn view_roles(headers: HeaderMap, engine: Extension<Arc<SessionEngine>>) -> Response {
    if let Err(response) = require_superuser(&headers, &engine).await {
        return response;
    }

    match engine.list_roles().await {
        Ok(roles) => {
            let roles = roles.into_iter().map(RoleDetails::from).collect();
            (StatusCode::OK, Json(RolesResponse { roles })).into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/v1/role/{role_id}",
    params(("role_id" = Uuid, Path, description = "Role to update")),
    request_body = RolePayload,
    responses(
        (status = 200, description = "Role updated", body = MessageResponse),
        (status = 403, description = "Not a superuser", body = ErrorBody),
        (status = 404, description = "Role not found", body = ErrorBody)
    ),
    security(("bearerAuth" = [])),
    tag = "role"
)]
pub async fn update_role(
    headers: HeaderMap,
    engine: Extension<Arc<SessionEngine>>,
    Path(role_id): Path<Uuid>,
    payload: Option<Json<RolePayload>>,
) -> Response {
    if let Err(response) = require_superuser(&headers, &engine).await {
        return response;
    }

    let request: RolePayload = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match engine
        .update_role(role_id, request.name.as_deref(), request.description.as_deref())
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Role updated successfully".to_string(),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/role/{role_id}",
    params(("role_id" = Uuid, Path, description = "Role to delete")),
    responses(
        (status = 200, description = "Role deleted", body = MessageResponse),
        (status = 403, description = "Not a superuser", body = ErrorBody),
        (status = 404, description = "Role not found", body = ErrorBody)
    ),
    security(("bearerAuth" = [])),
    tag = "role"
)]
pub async fn delete_role(
    headers: HeaderMap,
    engine: Extension<Arc<SessionEngine>>,
    Path(role_id): Path<Uuid>,
) -> Response {
    if let Err(response) = require_superuser(&headers, &engine).await {
        return response;
    }

    match engine.delete_role(role_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Role deleted successfully".to_string(),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/role/assign/{user_id}",
    params(("user_id" = Uuid, Path, description = "User receiving the role")),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = MessageResponse),
        (status = 403, description = "Not a superuser", body = ErrorBody),
        (status = 404, description = "Role or user not found", body = ErrorBody),
        (status = 409, description = "User already has this role", body = ErrorBody)
    ),
    security(("bearerAuth" = [])),
    tag = "role"
)]
pub async fn assign_role(
    headers: HeaderMap,
    engine: Extension<Arc<SessionEngine>>,
    Path(user_id): Path<Uuid>,
    payload: Option<Json<AssignRoleRequest>>,
) -> Response {
    if let Err(response) = require_superuser(&headers, &engine).await {
        return response;
    }

    let request: AssignRoleRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                "Missing role_id in request payload".to_string(),
            )
                .into_response()
        }
    };

    match engine.assign_role(user_id, request.role_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Role assigned to user successfully".to_string(),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/role/revoke/{user_id}",
    params(("user_id" = Uuid, Path, description = "User losing the role")),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role revoked", body = MessageResponse),
        (status = 403, description = "Not a superuser", body = ErrorBody),
        (status = 404, description = "Role or user not found", body = ErrorBody)
    ),
    security(("bearerAuth" = [])),
    tag = "role"
)]
pub async fn revoke_role(
    headers: HeaderMap,
    engine: Extension<Arc<SessionEngine>>,
    Path(user_id): Path<Uuid>,
    payload: Option<Json<AssignRoleRequest>>,
) -> Response {
    if let Err(response) = require_superuser(&headers, &engine).await {
        return response;
    }

    let request: AssignRoleRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                "Missing role_id in request payload".to_string(),
            )
                .into_response()
        }
    };

    match engine.revoke_role(user_id, request.role_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Role revoked from user successfully".to_string(),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
