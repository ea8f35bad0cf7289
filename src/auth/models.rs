//! Domain records for users, roles, refresh tokens, and the audit trail.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::AuthError;

const ROLE_NAME_MAX_LENGTH: usize = 50;

/// Role names: the closed built-in set plus validated custom names created at
/// runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RoleName {
    User,
    Superuser,
    Custom(String),
}

impl RoleName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Superuser => "superuser",
            Self::Custom(name) => name,
        }
    }

    /// Parse an externally supplied role name, validating custom names.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidRole`] when the name is empty, too long,
    /// or not lowercase alphanumeric with `_`/`-`.
    pub fn parse(value: &str) -> Result<Self, AuthError> {
        match value {
            "user" => Ok(Self::User),
            "superuser" => Ok(Self::Superuser),
            custom => {
                if custom.len() > ROLE_NAME_MAX_LENGTH {
                    return Err(AuthError::InvalidRole);
                }
                let valid = Regex::new(r"^[a-z0-9][a-z0-9_-]*$")
                    .is_ok_and(|regex| regex.is_match(custom));
                if valid {
                    Ok(Self::Custom(custom.to_string()))
                } else {
                    Err(AuthError::InvalidRole)
                }
            }
        }
    }

    /// Build from a stored value without re-validating; the store only holds
    /// names that passed [`RoleName::parse`].
    fn from_db(value: &str) -> Self {
        match value {
            "user" => Self::User,
            "superuser" => Self::Superuser,
            custom => Self::Custom(custom.to_string()),
        }
    }
}

impl std::fmt::Display for RoleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RoleName> for String {
    fn from(name: RoleName) -> Self {
        name.as_str().to_string()
    }
}

impl TryFrom<String> for RoleName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).map_err(|err| err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_totp_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            is_totp_enabled: row.try_get("is_totp_enabled")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Fields the engine supplies when creating a user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct Role {
    pub id: Uuid,
    pub name: RoleName,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for Role {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let name: String = row.try_get("name")?;
        Ok(Self {
            id: row.try_get("id")?,
            name: RoleName::from_db(&name),
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct UserRoleAssignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_value: String,
    pub used: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for RefreshTokenRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            token_value: row.try_get("token_value")?,
            used: row.try_get("used")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_value: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventType {
    Signup,
    Login,
    Refresh,
}

impl AuthEventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Signup => "signup",
            Self::Login => "login",
            Self::Refresh => "refresh",
        }
    }

    fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "signup" => Ok(Self::Signup),
            "login" => Ok(Self::Login),
            "refresh" => Ok(Self::Refresh),
            _ => Err(sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid auth_history.auth_event_type value: {value}"),
            )))),
        }
    }
}

/// Append-only audit trail row; never mutated or deleted by the core.
#[derive(Debug, Clone)]
pub struct AuthHistoryEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_type: AuthEventType,
    pub fingerprint: String,
    pub device: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub event_time: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for AuthHistoryEvent {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let event_type: String = row.try_get("auth_event_type")?;
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            event_type: AuthEventType::from_db(&event_type)?,
            fingerprint: row.try_get("auth_event_fingerprint")?,
            device: row.try_get("device")?,
            ip_address: row.try_get("ip_address")?,
            user_agent: row.try_get("user_agent")?,
            event_time: row.try_get("auth_event_time")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewAuthEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_type: AuthEventType,
    pub fingerprint: String,
    pub device: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Link between a local user and a federated identity.
#[derive(Debug, Clone)]
pub struct SocialAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub external_id: String,
}

/// Request metadata captured for the audit trail.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device: Option<String>,
}

impl ClientInfo {
    /// Opaque fingerprint string; callers must not assume a parseable format.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        serde_json::json!({
            "ip": self.ip_address,
            "user-agent": self.user_agent,
            "device": self.device,
        })
        .to_string()
    }
}

/// One page of the auth history, newest events first.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthHistoryPage {
    pub total: u64,
    pub pages: u32,
    pub per_page: u32,
    pub prev_page: Option<u32>,
    pub next_page: Option<u32>,
    pub events: Vec<AuthEventView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthEventView {
    pub uuid: Uuid,
    pub time: DateTime<Utc>,
    pub fingerprint: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_name_parses_builtins() {
        assert_eq!(RoleName::parse("user").unwrap(), RoleName::User);
        assert_eq!(RoleName::parse("superuser").unwrap(), RoleName::Superuser);
    }

    #[test]
    fn role_name_accepts_valid_custom() {
        assert_eq!(
            RoleName::parse("subscriber").unwrap(),
            RoleName::Custom("subscriber".to_string())
        );
        assert_eq!(
            RoleName::parse("tier-2_reader").unwrap(),
            RoleName::Custom("tier-2_reader".to_string())
        );
    }

    #[test]
    fn role_name_rejects_invalid_custom() {
        assert!(RoleName::parse("").is_err());
        assert!(RoleName::parse("Has Spaces").is_err());
        assert!(RoleName::parse("UPPER").is_err());
        assert!(RoleName::parse(&"x".repeat(51)).is_err());
        assert!(RoleName::parse("-leading-dash").is_err());
    }

    #[test]
    fn auth_event_type_round_trips() {
        for event in [
            AuthEventType::Signup,
            AuthEventType::Login,
            AuthEventType::Refresh,
        ] {
            assert_eq!(AuthEventType::from_db(event.as_str()).unwrap(), event);
        }
        assert!(AuthEventType::from_db("logout").is_err());
    }

    #[test]
    fn fingerprint_is_opaque_but_stable() {
        let info = ClientInfo {
            ip_address: Some("10.0.0.1".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
            device: Some("desktop".to_string()),
        };
        assert_eq!(info.fingerprint(), info.fingerprint());
        assert!(info.fingerprint().contains("Mozilla/5.0"));
    }
}
