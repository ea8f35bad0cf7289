//! In-memory credential store.
//!
//! A single mutex guards all tables, which gives the same atomicity the
//! Postgres transactions provide; refresh rotation cannot interleave. Used by
//! the test suites and as a standalone backend for local runs.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::models::{
    AuthHistoryEvent, NewAuthEvent, NewRefreshToken, NewUser, RefreshTokenRecord, Role, RoleName,
    SocialAccount, User, UserRoleAssignment,
};
use super::store::{
    AssignRoleOutcome, CredentialStore, InsertRoleOutcome, InsertUserOutcome, UpdateUserOutcome,
};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    roles: HashMap<Uuid, Role>,
    assignments: Vec<UserRoleAssignment>,
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
    history: Vec<AuthHistoryEvent>,
    socials: Vec<SocialAccount>,
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Inner>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn push_event(inner: &mut Inner, event: NewAuthEvent) {
    inner.history.push(AuthHistoryEvent {
        id: event.id,
        user_id: event.user_id,
        event_type: event.event_type,
        fingerprint: event.fingerprint,
        device: event.device,
        ip_address: event.ip_address,
        user_agent: event.user_agent,
        event_time: Utc::now(),
    });
}

fn push_refresh_token(inner: &mut Inner, token: NewRefreshToken) {
    inner.refresh_tokens.insert(
        token.token_value.clone(),
        RefreshTokenRecord {
            id: token.id,
            user_id: token.user_id,
            token_value: token.token_value,
            used: false,
            created_at: Utc::now(),
            expires_at: token.expires_at,
        },
    );
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_user_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .values()
            .find(|user| user.username == username || user.email == email)
            .cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let inner = self.inner.lock().await;
        Ok(inner.users.get(&user_id).cloned())
    }

    async fn insert_user(&self, user: NewUser) -> Result<InsertUserOutcome> {
        let mut inner = self.inner.lock().await;
        if inner.users.values().any(|u| u.username == user.username) {
            return Ok(InsertUserOutcome::DuplicateUsername);
        }
        if inner.users.values().any(|u| u.email == user.email) {
            return Ok(InsertUserOutcome::DuplicateEmail);
        }

        let now = Utc::now();
        let created = User {
            id: user.id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            is_totp_enabled: false,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(created.id, created.clone());
        Ok(InsertUserOutcome::Created(created))
    }

    async fn update_user(
        &self,
        user_id: Uuid,
        username: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<UpdateUserOutcome> {
        let mut inner = self.inner.lock().await;
        if let Some(username) = username {
            let taken = inner
                .users
                .values()
                .any(|u| u.id != user_id && u.username == username);
            if taken {
                return Ok(UpdateUserOutcome::DuplicateUsername);
            }
        }

        if let Some(user) = inner.users.get_mut(&user_id) {
            if let Some(username) = username {
                user.username = username.to_string();
            }
            if let Some(password_hash) = password_hash {
                user.password_hash = password_hash.to_string();
            }
            if username.is_some() || password_hash.is_some() {
                user.updated_at = Utc::now();
            }
        }
        Ok(UpdateUserOutcome::Updated)
    }

    async fn find_role_by_id(&self, role_id: Uuid) -> Result<Option<Role>> {
        let inner = self.inner.lock().await;
        Ok(inner.roles.get(&role_id).cloned())
    }

    async fn insert_role(
        &self,
        id: Uuid,
        name: &RoleName,
        description: &str,
    ) -> Result<InsertRoleOutcome> {
        let mut inner = self.inner.lock().await;
        if inner.roles.values().any(|role| role.name == *name) {
            return Ok(InsertRoleOutcome::Conflict);
        }

        let now = Utc::now();
        let role = Role {
            id,
            name: name.clone(),
            description: description.to_string(),
            created_at: now,
            updated_at: now,
        };
        inner.roles.insert(id, role.clone());
        Ok(InsertRoleOutcome::Created(role))
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let inner = self.inner.lock().await;
        let mut roles: Vec<Role> = inner.roles.values().cloned().collect();
        roles.sort_by_key(|role| role.created_at);
        Ok(roles)
    }

    async fn update_role(
        &self,
        role_id: Uuid,
        name: Option<&RoleName>,
        description: Option<&str>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(role) = inner.roles.get_mut(&role_id) else {
            return Ok(false);
        };
        if let Some(name) = name {
            role.name = name.clone();
        }
        if let Some(description) = description {
            role.description = description.to_string();
        }
        role.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete_role(&self, role_id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let removed = inner.roles.remove(&role_id).is_some();
        if removed {
            inner
                .assignments
                .retain(|assignment| assignment.role_id != role_id);
        }
        Ok(removed)
    }

    async fn user_roles(&self, user_id: Uuid) -> Result<Vec<Role>> {
        let inner = self.inner.lock().await;
        let roles = inner
            .assignments
            .iter()
            .filter(|assignment| assignment.user_id == user_id)
            .filter_map(|assignment| inner.roles.get(&assignment.role_id))
            .cloned()
            .collect();
        Ok(roles)
    }

    async fn assign_role(
        &self,
        id: Uuid,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<AssignRoleOutcome> {
        let mut inner = self.inner.lock().await;
        let exists = inner
            .assignments
            .iter()
            .any(|assignment| assignment.user_id == user_id && assignment.role_id == role_id);
        if exists {
            return Ok(AssignRoleOutcome::AlreadyAssigned);
        }
        inner.assignments.push(UserRoleAssignment {
            id,
            user_id,
            role_id,
        });
        Ok(AssignRoleOutcome::Assigned)
    }

    async fn revoke_role(&self, user_id: Uuid, role_id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.assignments.len();
        inner
            .assignments
            .retain(|assignment| !(assignment.user_id == user_id && assignment.role_id == role_id));
        Ok(inner.assignments.len() < before)
    }

    async fn record_authentication(
        &self,
        token: NewRefreshToken,
        event: NewAuthEvent,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        push_refresh_token(&mut inner, token);
        push_event(&mut inner, event);
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        old_token_value: &str,
        replacement: NewRefreshToken,
        event: NewAuthEvent,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        // Consume-then-replace happens under one lock; losers of a race see
        // the token already gone.
        match inner.refresh_tokens.remove(old_token_value) {
            Some(record) if record.expires_at > Utc::now() => {}
            _ => return Ok(false),
        }
        push_refresh_token(&mut inner, replacement);
        push_event(&mut inner, event);
        Ok(true)
    }

    async fn consume_refresh_token(&self, token_value: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.refresh_tokens.remove(token_value) {
            Some(record) if record.expires_at > Utc::now() => Ok(true),
            _ => Ok(false),
        }
    }

    async fn auth_history(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u32,
    ) -> Result<(u64, Vec<AuthHistoryEvent>)> {
        let inner = self.inner.lock().await;
        // History is appended chronologically; newest-first is a reversal.
        let mut events: Vec<AuthHistoryEvent> = inner
            .history
            .iter()
            .filter(|event| event.user_id == user_id)
            .cloned()
            .collect();
        events.reverse();

        let total = events.len() as u64;
        let page = events
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit as usize)
            .collect();
        Ok((total, page))
    }

    async fn find_user_by_social(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<User>> {
        let inner = self.inner.lock().await;
        let user = inner
            .socials
            .iter()
            .find(|account| account.provider == provider && account.external_id == external_id)
            .and_then(|account| inner.users.get(&account.user_id))
            .cloned();
        Ok(user)
    }

    async fn insert_social_account(&self, account: SocialAccount) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.socials.push(account);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::AuthEventType;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
        }
    }

    fn refresh_token(user_id: Uuid, value: &str) -> NewRefreshToken {
        NewRefreshToken {
            id: Uuid::new_v4(),
            user_id,
            token_value: value.to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        }
    }

    fn event(user_id: Uuid, event_type: AuthEventType) -> NewAuthEvent {
        NewAuthEvent {
            id: Uuid::new_v4(),
            user_id,
            event_type,
            fingerprint: "{}".to_string(),
            device: None,
            ip_address: None,
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn duplicate_username_reported() {
        let store = MemoryCredentialStore::new();
        store
            .insert_user(new_user("alice", "a@example.com"))
            .await
            .unwrap();

        let outcome = store
            .insert_user(new_user("alice", "other@example.com"))
            .await
            .unwrap();
        assert!(matches!(outcome, InsertUserOutcome::DuplicateUsername));

        let outcome = store
            .insert_user(new_user("bob", "a@example.com"))
            .await
            .unwrap();
        assert!(matches!(outcome, InsertUserOutcome::DuplicateEmail));
    }

    #[tokio::test]
    async fn rotation_consumes_old_token() {
        let store = MemoryCredentialStore::new();
        let user_id = Uuid::new_v4();
        store
            .record_authentication(
                refresh_token(user_id, "t1"),
                event(user_id, AuthEventType::Login),
            )
            .await
            .unwrap();

        let rotated = store
            .rotate_refresh_token(
                "t1",
                refresh_token(user_id, "t2"),
                event(user_id, AuthEventType::Refresh),
            )
            .await
            .unwrap();
        assert!(rotated);

        // The old link of the chain is gone.
        let replayed = store
            .rotate_refresh_token(
                "t1",
                refresh_token(user_id, "t3"),
                event(user_id, AuthEventType::Refresh),
            )
            .await
            .unwrap();
        assert!(!replayed);
    }

    #[tokio::test]
    async fn expired_refresh_token_not_consumable() {
        let store = MemoryCredentialStore::new();
        let user_id = Uuid::new_v4();
        let mut token = refresh_token(user_id, "stale");
        token.expires_at = Utc::now() - chrono::Duration::seconds(1);
        store
            .record_authentication(token, event(user_id, AuthEventType::Login))
            .await
            .unwrap();

        assert!(!store.consume_refresh_token("stale").await.unwrap());
    }

    #[tokio::test]
    async fn history_pages_newest_first() {
        let store = MemoryCredentialStore::new();
        let user_id = Uuid::new_v4();
        for event_type in [
            AuthEventType::Signup,
            AuthEventType::Login,
            AuthEventType::Refresh,
        ] {
            store
                .record_authentication(
                    refresh_token(user_id, event_type.as_str()),
                    event(user_id, event_type),
                )
                .await
                .unwrap();
        }

        let (total, page) = store.auth_history(user_id, 0, 2).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].event_type, AuthEventType::Refresh);
        assert_eq!(page[1].event_type, AuthEventType::Login);

        let (_, rest) = store.auth_history(user_id, 2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].event_type, AuthEventType::Signup);
    }
}
