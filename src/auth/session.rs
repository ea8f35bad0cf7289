//! Session lifecycle engine.
//!
//! Orchestrates signup, login, refresh, logout, and credential changes,
//! keeping the credential store and the ephemeral registry consistent:
//!
//! - durable writes (refresh-token row + audit event) commit before the
//!   access token is activated in the registry; a token missing from the
//!   registry is "not yet activated", never "trusted anyway";
//! - refresh-token consumption is atomic with replacement issuance, so each
//!   chain advances by exactly one link and replays always fail.

use anyhow::{anyhow, Context};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use std::sync::Arc;
use tokio::task;
use tracing::debug;
use uuid::Uuid;

use super::error::AuthError;
use super::models::{
    AuthEventType, AuthEventView, AuthHistoryPage, ClientInfo, NewAuthEvent, NewRefreshToken,
    NewUser, Role, RoleName, SocialAccount, User,
};
use super::registry::TokenRegistry;
use super::store::{
    AssignRoleOutcome, CredentialStore, InsertRoleOutcome, InsertUserOutcome, UpdateUserOutcome,
};
use super::tokens::{Claims, TokenCodec, TokenKind, TokenPair};
use crate::socials::ExternalIdentity;

const DEFAULT_HISTORY_PER_PAGE: u32 = 3;
const GENERATED_PASSWORD_LENGTH: usize = 32;

pub struct SessionEngine {
    store: Arc<dyn CredentialStore>,
    registry: Arc<dyn TokenRegistry>,
    codec: TokenCodec,
}

impl SessionEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        registry: Arc<dyn TokenRegistry>,
        codec: TokenCodec,
    ) -> Self {
        Self {
            store,
            registry,
            codec,
        }
    }

    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<dyn TokenRegistry> {
        &self.registry
    }

    /// Create a user and issue its first token pair.
    ///
    /// # Errors
    /// `LoginExists` / `EmailExists` on uniqueness conflicts (username takes
    /// priority when both collide).
    pub async fn register_user(
        &self,
        username: &str,
        password: &str,
        email: &str,
        client: &ClientInfo,
    ) -> Result<TokenPair, AuthError> {
        // Single lookup covers both uniqueness checks; the insert below still
        // catches concurrent duplicates.
        if let Some(existing) = self
            .store
            .find_user_by_username_or_email(username, email)
            .await?
        {
            if existing.username == username {
                return Err(AuthError::LoginExists);
            }
            return Err(AuthError::EmailExists);
        }

        let password_hash = hash_password(password).await?;
        let user = match self
            .store
            .insert_user(NewUser {
                id: Uuid::new_v4(),
                username: username.to_string(),
                email: email.to_string(),
                password_hash,
            })
            .await?
        {
            InsertUserOutcome::Created(user) => user,
            InsertUserOutcome::DuplicateUsername => return Err(AuthError::LoginExists),
            InsertUserOutcome::DuplicateEmail => return Err(AuthError::EmailExists),
        };

        debug!(user_id = %user.id, "user registered");

        let pair = self.mint_pair_for(&user).await?;
        self.commit_authentication(&user, AuthEventType::Signup, &pair, client)
            .await?;
        Ok(pair)
    }

    /// Verify credentials and issue a fresh pair.
    ///
    /// # Errors
    /// `UserNotFound` for unknown usernames, `WrongPassword` on hash
    /// mismatch. No audit event is written on failure.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<TokenPair, AuthError> {
        let user = self
            .store
            .find_user_by_username(username)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !verify_password(password, &user.password_hash).await? {
            return Err(AuthError::WrongPassword);
        }

        let pair = self.mint_pair_for(&user).await?;
        self.commit_authentication(&user, AuthEventType::Login, &pair, client)
            .await?;
        Ok(pair)
    }

    /// Log in via a federated identity, creating the local user on first use.
    ///
    /// # Errors
    /// `LoginExists` / `EmailExists` when a first-time identity collides with
    /// an existing local account.
    pub async fn social_login(
        &self,
        identity: &ExternalIdentity,
        client: &ClientInfo,
    ) -> Result<TokenPair, AuthError> {
        let user = match self
            .store
            .find_user_by_social(&identity.provider, &identity.external_id)
            .await?
        {
            Some(user) => user,
            None => {
                // First login through this provider: provision a local user
                // with a random password and link the identity.
                let password = generate_password();
                let password_hash = hash_password(&password).await?;
                let user = match self
                    .store
                    .insert_user(NewUser {
                        id: Uuid::new_v4(),
                        username: identity.username.clone(),
                        email: identity.email.clone(),
                        password_hash,
                    })
                    .await?
                {
                    InsertUserOutcome::Created(user) => user,
                    InsertUserOutcome::DuplicateUsername => return Err(AuthError::LoginExists),
                    InsertUserOutcome::DuplicateEmail => return Err(AuthError::EmailExists),
                };
                self.store
                    .insert_social_account(SocialAccount {
                        id: Uuid::new_v4(),
                        user_id: user.id,
                        provider: identity.provider.clone(),
                        external_id: identity.external_id.clone(),
                    })
                    .await?;
                user
            }
        };

        let pair = self.mint_pair_for(&user).await?;
        self.commit_authentication(&user, AuthEventType::Login, &pair, client)
            .await?;
        Ok(pair)
    }

    /// Exchange a live refresh token for a new pair, consuming the old token.
    ///
    /// # Errors
    /// `UserNotFound` for unknown ids; `InvalidRefreshToken` when the token
    /// is absent, expired, or already consumed — concurrent refreshes with
    /// the same token have exactly one winner.
    pub async fn refresh(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        client: &ClientInfo,
    ) -> Result<TokenPair, AuthError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let pair = self.mint_pair_for(&user).await?;
        let replacement = self.refresh_record(&user, &pair);
        let event = self.auth_event(&user, AuthEventType::Refresh, client);

        let rotated = self
            .store
            .rotate_refresh_token(refresh_token, replacement, event)
            .await?;
        if !rotated {
            return Err(AuthError::InvalidRefreshToken);
        }

        self.activate_access(&pair.access_token).await?;
        Ok(pair)
    }

    /// Terminate a session: consume the refresh token and revoke the access
    /// token immediately instead of waiting for its TTL.
    ///
    /// # Errors
    /// `AccessTokenExpired` when the access token is no longer live,
    /// `UserNotFound` / `InvalidRefreshToken` as in refresh.
    pub async fn logout(
        &self,
        user_id: Uuid,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<(), AuthError> {
        if !self.registry.contains(access_token).await? {
            return Err(AuthError::AccessTokenExpired);
        }

        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !self.store.consume_refresh_token(refresh_token).await? {
            return Err(AuthError::InvalidRefreshToken);
        }

        self.registry.remove(access_token).await?;
        Ok(())
    }

    /// Change username and/or password; persists only when something
    /// actually changed.
    ///
    /// # Errors
    /// `UserNotFound` for unknown ids, `LoginExists` when the new username is
    /// taken by another user.
    pub async fn modify(
        &self,
        user_id: Uuid,
        new_username: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let username_changed = new_username != user.username;
        if username_changed
            && self
                .store
                .find_user_by_username(new_username)
                .await?
                .is_some()
        {
            return Err(AuthError::LoginExists);
        }

        // The conflict check is plaintext-vs-stored-hash; a matching password
        // skips the rehash entirely.
        let password_changed = !verify_password(new_password, &user.password_hash).await?;

        if !username_changed && !password_changed {
            return Ok(());
        }

        let password_hash = if password_changed {
            Some(hash_password(new_password).await?)
        } else {
            None
        };

        let outcome = self
            .store
            .update_user(
                user_id,
                username_changed.then_some(new_username),
                password_hash.as_deref(),
            )
            .await?;
        match outcome {
            UpdateUserOutcome::Updated => Ok(()),
            UpdateUserOutcome::DuplicateUsername => Err(AuthError::LoginExists),
        }
    }

    /// One page of the audit trail, newest events first.
    pub async fn get_auth_history(
        &self,
        user_id: Uuid,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<AuthHistoryPage, AuthError> {
        let page = page.unwrap_or(1).max(1);
        let per_page = per_page.unwrap_or(DEFAULT_HISTORY_PER_PAGE).max(1);
        let offset = u64::from(page - 1) * u64::from(per_page);

        let (total, events) = self.store.auth_history(user_id, offset, per_page).await?;

        let pages = u32::try_from(total.div_ceil(u64::from(per_page))).unwrap_or(u32::MAX);
        Ok(AuthHistoryPage {
            total,
            pages,
            per_page,
            prev_page: (page > 1).then(|| page - 1),
            next_page: (page < pages).then(|| page + 1),
            events: events
                .into_iter()
                .map(|event| AuthEventView {
                    uuid: event.id,
                    time: event.event_time,
                    fingerprint: event.fingerprint,
                })
                .collect(),
        })
    }

    /// The roles currently assigned to a user.
    ///
    /// # Errors
    /// `UserNotFound` for unknown ids.
    pub async fn get_user_roles_list(&self, user_id: Uuid) -> Result<Vec<Role>, AuthError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        Ok(self.store.user_roles(user_id).await?)
    }

    /// Validate an access token for a gated request: decode, enforce the
    /// access kind, and require registry presence before any role check.
    ///
    /// # Errors
    /// `InvalidToken` on decode/kind failure, `AccessTokenExpired` when the
    /// token is absent from the registry (expired or revoked).
    pub async fn authenticate_access(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.codec.decode(token)?;
        if claims.kind != TokenKind::Access {
            return Err(AuthError::InvalidToken);
        }
        if !self.registry.contains(token).await? {
            return Err(AuthError::AccessTokenExpired);
        }
        Ok(claims)
    }

    /// # Errors
    /// `InvalidRole` for malformed names, `RoleExists` on conflict.
    pub async fn create_role(&self, name: &str, description: &str) -> Result<Role, AuthError> {
        let name = RoleName::parse(name)?;
        match self
            .store
            .insert_role(Uuid::new_v4(), &name, description)
            .await?
        {
            InsertRoleOutcome::Created(role) => Ok(role),
            InsertRoleOutcome::Conflict => Err(AuthError::RoleExists),
        }
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, AuthError> {
        Ok(self.store.list_roles().await?)
    }

    /// # Errors
    /// `RoleNotFound` for unknown ids, `InvalidRole` for malformed names.
    pub async fn update_role(
        &self,
        role_id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), AuthError> {
        let name = name.map(RoleName::parse).transpose()?;
        let found = self
            .store
            .update_role(role_id, name.as_ref(), description)
            .await?;
        if found {
            Ok(())
        } else {
            Err(AuthError::RoleNotFound)
        }
    }

    /// # Errors
    /// `RoleNotFound` for unknown ids.
    pub async fn delete_role(&self, role_id: Uuid) -> Result<(), AuthError> {
        if self.store.delete_role(role_id).await? {
            Ok(())
        } else {
            Err(AuthError::RoleNotFound)
        }
    }

    /// # Errors
    /// `UserNotFound` / `RoleNotFound` for unknown ids,
    /// `RoleAlreadyAssigned` when the pair already exists.
    pub async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> Result<(), AuthError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        self.store
            .find_role_by_id(role_id)
            .await?
            .ok_or(AuthError::RoleNotFound)?;

        match self
            .store
            .assign_role(Uuid::new_v4(), user_id, role_id)
            .await?
        {
            AssignRoleOutcome::Assigned => Ok(()),
            AssignRoleOutcome::AlreadyAssigned => Err(AuthError::RoleAlreadyAssigned),
        }
    }

    /// Revoking an absent assignment is a no-op.
    ///
    /// # Errors
    /// `UserNotFound` / `RoleNotFound` for unknown ids.
    pub async fn revoke_role(&self, user_id: Uuid, role_id: Uuid) -> Result<(), AuthError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        self.store
            .find_role_by_id(role_id)
            .await?
            .ok_or(AuthError::RoleNotFound)?;

        self.store.revoke_role(user_id, role_id).await?;
        Ok(())
    }

    /// Mint a pair from the user's current role set.
    async fn mint_pair_for(&self, user: &User) -> Result<TokenPair, AuthError> {
        let roles = self.store.user_roles(user.id).await?;
        let role_names: Vec<String> = roles.iter().map(|role| role.name.to_string()).collect();
        self.codec.mint_pair(user.id, &role_names)
    }

    /// Durable commit (refresh row + audit event), then registry activation.
    async fn commit_authentication(
        &self,
        user: &User,
        event_type: AuthEventType,
        pair: &TokenPair,
        client: &ClientInfo,
    ) -> Result<(), AuthError> {
        let token = self.refresh_record(user, pair);
        let event = self.auth_event(user, event_type, client);
        self.store.record_authentication(token, event).await?;
        self.activate_access(&pair.access_token).await
    }

    fn refresh_record(&self, user: &User, pair: &TokenPair) -> NewRefreshToken {
        NewRefreshToken {
            id: Uuid::new_v4(),
            user_id: user.id,
            token_value: pair.refresh_token.clone(),
            expires_at: Utc::now() + self.codec.refresh_lifetime(),
        }
    }

    fn auth_event(
        &self,
        user: &User,
        event_type: AuthEventType,
        client: &ClientInfo,
    ) -> NewAuthEvent {
        NewAuthEvent {
            id: Uuid::new_v4(),
            user_id: user.id,
            event_type,
            fingerprint: client.fingerprint(),
            device: client.device.clone(),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
        }
    }

    async fn activate_access(&self, access_token: &str) -> Result<(), AuthError> {
        let ttl = self
            .codec
            .access_lifetime()
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        self.registry.put(access_token, ttl).await?;
        Ok(())
    }
}

/// Argon2 hashing is CPU-bound; run it off the async runtime.
async fn hash_password(password: &str) -> Result<String, AuthError> {
    let password = password.to_string();
    let hash = task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| anyhow!("failed to hash password: {err}"))
    })
    .await
    .context("password hashing task panicked")??;
    Ok(hash)
}

async fn verify_password(password: &str, password_hash: &str) -> Result<bool, AuthError> {
    let password = password.to_string();
    let password_hash = password_hash.to_string();
    let valid = task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&password_hash)
            .map_err(|err| anyhow!("invalid password hash format: {err}"))?;
        Ok::<bool, anyhow::Error>(
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
        )
    })
    .await
    .context("password verification task panicked")??;
    Ok(valid)
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::memory::MemoryCredentialStore;
    use crate::auth::registry::MemoryTokenRegistry;
    use secrecy::SecretString;

    fn engine() -> Arc<SessionEngine> {
        let store = Arc::new(MemoryCredentialStore::new());
        let registry = Arc::new(MemoryTokenRegistry::new());
        let codec = TokenCodec::new(&SecretString::from("engine-test-key".to_string()), 15, 60);
        Arc::new(SessionEngine::new(store, registry, codec))
    }

    fn client() -> ClientInfo {
        ClientInfo {
            ip_address: Some("127.0.0.1".to_string()),
            user_agent: Some("tests/1.0".to_string()),
            device: Some("desktop".to_string()),
        }
    }

    async fn signup(engine: &SessionEngine, username: &str) -> (Uuid, TokenPair) {
        let pair = engine
            .register_user(
                username,
                "pw1",
                &format!("{username}@example.com"),
                &client(),
            )
            .await
            .unwrap();
        let claims = engine.codec().decode(&pair.access_token).unwrap();
        (claims.sub, pair)
    }

    #[tokio::test]
    async fn signup_issues_pair_and_writes_one_event() {
        let engine = engine();
        let (user_id, pair) = signup(&engine, "alice").await;

        let claims = engine.codec().decode(&pair.access_token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert!(claims.user_role.is_empty());

        let history = engine.get_auth_history(user_id, None, None).await.unwrap();
        assert_eq!(history.total, 1);
        assert_eq!(history.events.len(), 1);
    }

    #[tokio::test]
    async fn signup_duplicate_username_takes_priority() {
        let engine = engine();
        signup(&engine, "alice").await;

        // Same username AND same email: username conflict wins.
        let err = engine
            .register_user("alice", "pw", "alice@example.com", &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::LoginExists));

        let err = engine
            .register_user("bob", "pw", "alice@example.com", &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailExists));
    }

    #[tokio::test]
    async fn login_verifies_credentials() {
        let engine = engine();
        let (user_id, _) = signup(&engine, "alice").await;

        let pair = engine.login("alice", "pw1", &client()).await.unwrap();
        assert_eq!(engine.codec().decode(&pair.access_token).unwrap().sub, user_id);

        let err = engine.login("nobody", "pw1", &client()).await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn wrong_password_writes_no_event() {
        let engine = engine();
        let (user_id, _) = signup(&engine, "alice").await;

        let err = engine.login("alice", "wrong", &client()).await.unwrap_err();
        assert!(matches!(err, AuthError::WrongPassword));

        let history = engine.get_auth_history(user_id, None, None).await.unwrap();
        assert_eq!(history.total, 1); // only the signup event
    }

    #[tokio::test]
    async fn refresh_rotates_the_chain() {
        let engine = engine();
        let (user_id, first) = signup(&engine, "alice").await;

        let second = engine
            .refresh(user_id, &first.refresh_token, &client())
            .await
            .unwrap();

        // The consumed link never works again.
        let err = engine
            .refresh(user_id, &first.refresh_token, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidRefreshToken));

        // The new link does.
        engine
            .refresh(user_id, &second.refresh_token, &client())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn concurrent_refresh_has_one_winner() {
        let engine = engine();
        let (user_id, pair) = signup(&engine, "alice").await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = Arc::clone(&engine);
            let token = pair.refresh_token.clone();
            handles.push(tokio::spawn(async move {
                engine.refresh(user_id, &token, &ClientInfo::default()).await
            }));
        }

        let mut successes = 0;
        let mut invalid = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(AuthError::InvalidRefreshToken) => invalid += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(invalid, 7);
    }

    #[tokio::test]
    async fn logout_consumes_both_tokens() {
        let engine = engine();
        let (user_id, pair) = signup(&engine, "alice").await;

        engine
            .logout(user_id, &pair.access_token, &pair.refresh_token)
            .await
            .unwrap();

        // Access token is revoked immediately.
        let err = engine
            .authenticate_access(&pair.access_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccessTokenExpired));

        // Refresh token was consumed by the logout.
        let err = engine
            .refresh(user_id, &pair.refresh_token, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidRefreshToken));

        // A second logout fails on the revoked access token.
        let err = engine
            .logout(user_id, &pair.access_token, &pair.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccessTokenExpired));
    }

    #[tokio::test]
    async fn modify_changes_username_and_password() {
        let engine = engine();
        let (user_id, _) = signup(&engine, "alice").await;

        engine.modify(user_id, "alicia", "pw2").await.unwrap();

        engine.login("alicia", "pw2", &client()).await.unwrap();
        let err = engine.login("alice", "pw1", &client()).await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn modify_rejects_taken_username() {
        let engine = engine();
        let (alice_id, _) = signup(&engine, "alice").await;
        signup(&engine, "bob").await;

        let err = engine.modify(alice_id, "bob", "pw1").await.unwrap_err();
        assert!(matches!(err, AuthError::LoginExists));
    }

    #[tokio::test]
    async fn modify_unknown_user_fails() {
        let engine = engine();
        let err = engine
            .modify(Uuid::new_v4(), "ghost", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn history_paginates_newest_first() {
        let engine = engine();
        let (user_id, pair) = signup(&engine, "alice").await;
        engine.login("alice", "pw1", &client()).await.unwrap();
        engine
            .refresh(user_id, &pair.refresh_token, &client())
            .await
            .unwrap();

        let page = engine
            .get_auth_history(user_id, Some(1), Some(2))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.pages, 2);
        assert_eq!(page.events.len(), 2);
        assert_eq!(page.prev_page, None);
        assert_eq!(page.next_page, Some(2));

        let last = engine
            .get_auth_history(user_id, Some(2), Some(2))
            .await
            .unwrap();
        assert_eq!(last.events.len(), 1);
        assert_eq!(last.prev_page, Some(1));
        assert_eq!(last.next_page, None);
    }

    #[tokio::test]
    async fn roles_flow_assign_list_revoke() {
        let engine = engine();
        let (user_id, _) = signup(&engine, "alice").await;

        let role = engine.create_role("user", "Default role").await.unwrap();
        engine.assign_role(user_id, role.id).await.unwrap();

        let err = engine.assign_role(user_id, role.id).await.unwrap_err();
        assert!(matches!(err, AuthError::RoleAlreadyAssigned));

        let roles = engine.get_user_roles_list(user_id).await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].name, RoleName::User);

        engine.revoke_role(user_id, role.id).await.unwrap();
        assert!(engine.get_user_roles_list(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_role_name_conflicts() {
        let engine = engine();
        engine.create_role("user", "Default role").await.unwrap();
        let err = engine.create_role("user", "Again").await.unwrap_err();
        assert!(matches!(err, AuthError::RoleExists));
    }

    #[tokio::test]
    async fn role_claims_snapshot_at_mint_time() {
        let engine = engine();
        let (user_id, _) = signup(&engine, "alice").await;

        let role = engine.create_role("superuser", "Admin").await.unwrap();
        engine.assign_role(user_id, role.id).await.unwrap();

        // Pair minted while the role is held.
        let pair = engine.login("alice", "pw1", &client()).await.unwrap();
        engine.revoke_role(user_id, role.id).await.unwrap();

        // Still-live token keeps the minted claims.
        let claims = engine.authenticate_access(&pair.access_token).await.unwrap();
        assert_eq!(claims.user_role, vec!["superuser".to_string()]);

        // Logout then re-login reflects the new role set.
        engine
            .logout(user_id, &pair.access_token, &pair.refresh_token)
            .await
            .unwrap();
        let pair = engine.login("alice", "pw1", &client()).await.unwrap();
        let claims = engine.authenticate_access(&pair.access_token).await.unwrap();
        assert!(claims.user_role.is_empty());
    }

    #[tokio::test]
    async fn refresh_token_rejected_as_access_token() {
        let engine = engine();
        let (_, pair) = signup(&engine, "alice").await;

        let err = engine
            .authenticate_access(&pair.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn social_login_provisions_once() {
        let engine = engine();
        let identity = ExternalIdentity {
            provider: "google".to_string(),
            external_id: "sub-123".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
        };

        let first = engine.social_login(&identity, &client()).await.unwrap();
        let first_id = engine.codec().decode(&first.access_token).unwrap().sub;

        let second = engine.social_login(&identity, &client()).await.unwrap();
        let second_id = engine.codec().decode(&second.access_token).unwrap().sub;

        // Same local user on every subsequent login.
        assert_eq!(first_id, second_id);

        // The password login path still exists but the password is random.
        let err = engine.login("alice", "guess", &client()).await.unwrap_err();
        assert!(matches!(err, AuthError::WrongPassword));
    }
}
