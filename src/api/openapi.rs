use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use super::handlers::{health, roles, user};
use crate::auth::error::ErrorBody;
use crate::auth::models::{AuthEventView, AuthHistoryPage};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        user::signup,
        user::login,
        user::refresh,
        user::logout,
        user::modify,
        user::auth_history,
        user::my_roles,
        user::user_roles,
        roles::create_role,
        roles::view_roles,
        roles::update_role,
        roles::delete_role,
        roles::assign_role,
        roles::revoke_role,
    ),
    components(schemas(
        ErrorBody,
        AuthHistoryPage,
        AuthEventView,
        health::Health,
        user::SignupRequest,
        user::LoginRequest,
        user::ModifyRequest,
        user::LogoutRequest,
        user::TokenPairResponse,
        user::MessageResponse,
        user::RoleView,
        roles::RolePayload,
        roles::AssignRoleRequest,
        roles::RoleDetails,
        roles::RolesResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Service health"),
        (name = "user", description = "Signup, login and session lifecycle"),
        (name = "role", description = "Role administration (superuser)")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearerAuth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_lists_session_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();

        assert!(paths.iter().any(|path| *path == "/v1/user/signup"));
        assert!(paths.iter().any(|path| *path == "/v1/user/refresh"));
        assert!(paths.iter().any(|path| *path == "/v1/role/{role_id}"));
    }
}
