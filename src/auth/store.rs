//! Repository interface over the durable credential store.
//!
//! The engine consumes users, roles, assignments, refresh tokens, and the
//! audit trail only through these operations; the storage engine itself is an
//! external collaborator. Conflict-prone writes report typed outcomes instead
//! of errors so races (duplicate signup, double refresh) resolve cleanly.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::models::{
    AuthHistoryEvent, NewAuthEvent, NewRefreshToken, NewUser, Role, RoleName, SocialAccount, User,
};

#[derive(Debug)]
pub enum InsertUserOutcome {
    Created(User),
    DuplicateUsername,
    DuplicateEmail,
}

#[derive(Debug)]
pub enum UpdateUserOutcome {
    Updated,
    DuplicateUsername,
}

#[derive(Debug)]
pub enum InsertRoleOutcome {
    Created(Role),
    Conflict,
}

#[derive(Debug)]
pub enum AssignRoleOutcome {
    Assigned,
    AlreadyAssigned,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Single lookup backing the signup uniqueness check; matches on either
    /// column so the caller can report username conflicts with priority.
    async fn find_user_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Insert a user row; uniqueness races surface as duplicate outcomes.
    async fn insert_user(&self, user: NewUser) -> Result<InsertUserOutcome>;

    /// Apply username and/or password changes. Only supplied fields change.
    async fn update_user(
        &self,
        user_id: Uuid,
        username: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<UpdateUserOutcome>;

    async fn find_role_by_id(&self, role_id: Uuid) -> Result<Option<Role>>;

    async fn insert_role(
        &self,
        id: Uuid,
        name: &RoleName,
        description: &str,
    ) -> Result<InsertRoleOutcome>;

    async fn list_roles(&self) -> Result<Vec<Role>>;

    /// Returns false when the role does not exist.
    async fn update_role(
        &self,
        role_id: Uuid,
        name: Option<&RoleName>,
        description: Option<&str>,
    ) -> Result<bool>;

    /// Returns false when the role does not exist.
    async fn delete_role(&self, role_id: Uuid) -> Result<bool>;

    /// Explicit join: the roles currently assigned to a user.
    async fn user_roles(&self, user_id: Uuid) -> Result<Vec<Role>>;

    async fn assign_role(
        &self,
        id: Uuid,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<AssignRoleOutcome>;

    /// Returns false when the assignment did not exist.
    async fn revoke_role(&self, user_id: Uuid, role_id: Uuid) -> Result<bool>;

    /// Commit a successful signup/login: refresh-token row and audit event in
    /// one transaction.
    async fn record_authentication(
        &self,
        token: NewRefreshToken,
        event: NewAuthEvent,
    ) -> Result<()>;

    /// Consume `old_token_value` and persist its replacement atomically.
    /// Returns false (and writes nothing) when the old token is absent or
    /// expired, so concurrent rotations have exactly one winner.
    async fn rotate_refresh_token(
        &self,
        old_token_value: &str,
        replacement: NewRefreshToken,
        event: NewAuthEvent,
    ) -> Result<bool>;

    /// Consume a refresh token without replacement (logout). Returns false
    /// when the token is absent or expired.
    async fn consume_refresh_token(&self, token_value: &str) -> Result<bool>;

    /// One page of the audit trail, newest first, plus the total row count.
    async fn auth_history(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u32,
    ) -> Result<(u64, Vec<AuthHistoryEvent>)>;

    async fn find_user_by_social(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<User>>;

    async fn insert_social_account(&self, account: SocialAccount) -> Result<()>;
}
