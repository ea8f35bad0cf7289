//! Role-authorization decision procedure.
//!
//! Decisions are made from decoded claims alone; the registry-presence check
//! (`SessionEngine::authenticate_access`) has already run by the time a role
//! set is evaluated.

use super::error::AuthError;
use super::models::RoleName;
use super::tokens::Claims;

/// Allow when the subject holds `superuser` or any of the required roles.
/// An empty requirement set admits superusers only.
///
/// # Errors
/// Returns [`AuthError::InsufficientPermissions`] when neither applies.
pub fn authorize(claims: &Claims, required: &[RoleName]) -> Result<(), AuthError> {
    let is_superuser = claims
        .user_role
        .iter()
        .any(|role| role == RoleName::Superuser.as_str());
    if is_superuser {
        return Ok(());
    }

    let intersects = claims
        .user_role
        .iter()
        .any(|role| required.iter().any(|name| name.as_str() == role));
    if intersects {
        Ok(())
    } else {
        Err(AuthError::InsufficientPermissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tokens::TokenKind;
    use chrono::Utc;
    use uuid::Uuid;

    fn claims(roles: &[&str]) -> Claims {
        Claims {
            sub: Uuid::new_v4(),
            user_role: roles.iter().map(|role| (*role).to_string()).collect(),
            kind: TokenKind::Access,
            jti: Uuid::new_v4(),
            iat: Utc::now().timestamp(),
            exp: Utc::now().timestamp() + 900,
        }
    }

    #[test]
    fn superuser_bypasses_all_checks() {
        let claims = claims(&["superuser"]);
        assert!(authorize(&claims, &[]).is_ok());
        assert!(authorize(&claims, &[RoleName::Custom("auditor".to_string())]).is_ok());
    }

    #[test]
    fn intersection_allows() {
        let claims = claims(&["user", "subscriber"]);
        assert!(authorize(
            &claims,
            &[RoleName::Custom("subscriber".to_string())]
        )
        .is_ok());
    }

    #[test]
    fn disjoint_roles_denied() {
        let claims = claims(&["user"]);
        let err = authorize(&claims, &[RoleName::Custom("auditor".to_string())]).unwrap_err();
        assert!(matches!(err, AuthError::InsufficientPermissions));
    }

    #[test]
    fn empty_requirement_admits_superuser_only() {
        let err = authorize(&claims(&["user"]), &[]).unwrap_err();
        assert!(matches!(err, AuthError::InsufficientPermissions));
        assert!(authorize(&claims(&["superuser"]), &[]).is_ok());
    }

    #[test]
    fn no_roles_denied() {
        let err = authorize(&claims(&[]), &[RoleName::User]).unwrap_err();
        assert!(matches!(err, AuthError::InsufficientPermissions));
    }
}
