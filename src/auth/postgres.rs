//! Postgres-backed credential store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::models::{
    AuthHistoryEvent, NewAuthEvent, NewRefreshToken, NewUser, Role, RoleName, SocialAccount, User,
};
use super::store::{
    AssignRoleOutcome, CredentialStore, InsertRoleOutcome, InsertUserOutcome, UpdateUserOutcome,
};

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Which unique constraint tripped, going by its name.
fn violated_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint().map(str::to_string),
        _ => None,
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_user_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>> {
        let query = "SELECT * FROM users WHERE username = $1 OR email = $2 LIMIT 1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, User>(query)
            .bind(username)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by username or email")
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let query = "SELECT * FROM users WHERE username = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, User>(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by username")
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let query = "SELECT * FROM users WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, User>(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by id")
    }

    async fn insert_user(&self, user: NewUser) -> Result<InsertUserOutcome> {
        let query = r"
            INSERT INTO users (id, username, email, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING *
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query_as::<_, User>(query)
            .bind(user.id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(created) => Ok(InsertUserOutcome::Created(created)),
            Err(err) if is_unique_violation(&err) => {
                // The constraint name tells us which column collided.
                if violated_constraint(&err).is_some_and(|name| name.contains("email")) {
                    Ok(InsertUserOutcome::DuplicateEmail)
                } else {
                    Ok(InsertUserOutcome::DuplicateUsername)
                }
            }
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn update_user(
        &self,
        user_id: Uuid,
        username: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<UpdateUserOutcome> {
        let result = match (username, password_hash) {
            (Some(username), Some(password_hash)) => {
                let query = r"
                    UPDATE users
                    SET username = $2, password_hash = $3, updated_at = NOW()
                    WHERE id = $1
                ";
                let span = tracing::info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "UPDATE",
                    db.statement = query
                );
                sqlx::query(query)
                    .bind(user_id)
                    .bind(username)
                    .bind(password_hash)
                    .execute(&self.pool)
                    .instrument(span)
                    .await
            }
            (Some(username), None) => {
                let query = r"
                    UPDATE users
                    SET username = $2, updated_at = NOW()
                    WHERE id = $1
                ";
                let span = tracing::info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "UPDATE",
                    db.statement = query
                );
                sqlx::query(query)
                    .bind(user_id)
                    .bind(username)
                    .execute(&self.pool)
                    .instrument(span)
                    .await
            }
            (None, Some(password_hash)) => {
                let query = r"
                    UPDATE users
                    SET password_hash = $2, updated_at = NOW()
                    WHERE id = $1
                ";
                let span = tracing::info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "UPDATE",
                    db.statement = query
                );
                sqlx::query(query)
                    .bind(user_id)
                    .bind(password_hash)
                    .execute(&self.pool)
                    .instrument(span)
                    .await
            }
            (None, None) => return Ok(UpdateUserOutcome::Updated),
        };

        match result {
            Ok(_) => Ok(UpdateUserOutcome::Updated),
            Err(err) if is_unique_violation(&err) => Ok(UpdateUserOutcome::DuplicateUsername),
            Err(err) => Err(err).context("failed to update user"),
        }
    }

    async fn find_role_by_id(&self, role_id: Uuid) -> Result<Option<Role>> {
        let query = "SELECT * FROM roles WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, Role>(query)
            .bind(role_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup role")
    }

    async fn insert_role(
        &self,
        id: Uuid,
        name: &RoleName,
        description: &str,
    ) -> Result<InsertRoleOutcome> {
        let query = r"
            INSERT INTO roles (id, name, description)
            VALUES ($1, $2, $3)
            RETURNING *
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query_as::<_, Role>(query)
            .bind(id)
            .bind(name.as_str())
            .bind(description)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(role) => Ok(InsertRoleOutcome::Created(role)),
            Err(err) if is_unique_violation(&err) => Ok(InsertRoleOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert role"),
        }
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let query = "SELECT * FROM roles ORDER BY created_at";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, Role>(query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list roles")
    }

    async fn update_role(
        &self,
        role_id: Uuid,
        name: Option<&RoleName>,
        description: Option<&str>,
    ) -> Result<bool> {
        let result = match (name, description) {
            (Some(name), Some(description)) => {
                let query = r"
                    UPDATE roles
                    SET name = $2, description = $3, updated_at = NOW()
                    WHERE id = $1
                ";
                let span = tracing::info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "UPDATE",
                    db.statement = query
                );
                sqlx::query(query)
                    .bind(role_id)
                    .bind(name.as_str())
                    .bind(description)
                    .execute(&self.pool)
                    .instrument(span)
                    .await
            }
            (Some(name), None) => {
                let query = r"
                    UPDATE roles
                    SET name = $2, updated_at = NOW()
                    WHERE id = $1
                ";
                let span = tracing::info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "UPDATE",
                    db.statement = query
                );
                sqlx::query(query)
                    .bind(role_id)
                    .bind(name.as_str())
                    .execute(&self.pool)
                    .instrument(span)
                    .await
            }
            (None, Some(description)) => {
                let query = r"
                    UPDATE roles
                    SET description = $2, updated_at = NOW()
                    WHERE id = $1
                ";
                let span = tracing::info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "UPDATE",
                    db.statement = query
                );
                sqlx::query(query)
                    .bind(role_id)
                    .bind(description)
                    .execute(&self.pool)
                    .instrument(span)
                    .await
            }
            (None, None) => return Ok(true),
        };

        let result = result.context("failed to update role")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_role(&self, role_id: Uuid) -> Result<bool> {
        let query = "DELETE FROM roles WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(role_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete role")?;
        Ok(result.rows_affected() > 0)
    }

    async fn user_roles(&self, user_id: Uuid) -> Result<Vec<Role>> {
        // Explicit join; assignments are never traversed implicitly.
        let query = r"
            SELECT roles.*
            FROM roles
            JOIN user_roles ON user_roles.role_id = roles.id
            WHERE user_roles.user_id = $1
            ORDER BY roles.created_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, Role>(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list user roles")
    }

    async fn assign_role(
        &self,
        id: Uuid,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<AssignRoleOutcome> {
        let query = r"
            INSERT INTO user_roles (id, user_id, role_id)
            VALUES ($1, $2, $3)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(user_id)
            .bind(role_id)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(AssignRoleOutcome::Assigned),
            Err(err) if is_unique_violation(&err) => Ok(AssignRoleOutcome::AlreadyAssigned),
            Err(err) => Err(err).context("failed to assign role"),
        }
    }

    async fn revoke_role(&self, user_id: Uuid, role_id: Uuid) -> Result<bool> {
        let query = "DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(role_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke role")?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_authentication(
        &self,
        token: NewRefreshToken,
        event: NewAuthEvent,
    ) -> Result<()> {
        // Refresh token and audit event commit together or not at all.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin authentication transaction")?;

        insert_refresh_token(&mut tx, &token).await?;
        insert_auth_event(&mut tx, &event).await?;

        tx.commit()
            .await
            .context("commit authentication transaction")?;
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        old_token_value: &str,
        replacement: NewRefreshToken,
        event: NewAuthEvent,
    ) -> Result<bool> {
        // Consumption and replacement are one transaction so concurrent
        // rotations of the same token cannot both succeed.
        let mut tx = self.pool.begin().await.context("begin rotate transaction")?;

        let query = r"
            DELETE FROM refresh_tokens
            WHERE token_value = $1
              AND expires_at > NOW()
            RETURNING id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let consumed = sqlx::query(query)
            .bind(old_token_value)
            .fetch_optional(&mut *tx)
            .instrument(span)
            .await
            .context("failed to consume refresh token")?;

        if consumed.is_none() {
            let _ = tx.rollback().await;
            return Ok(false);
        }

        insert_refresh_token(&mut tx, &replacement).await?;
        insert_auth_event(&mut tx, &event).await?;

        tx.commit().await.context("commit rotate transaction")?;
        Ok(true)
    }

    async fn consume_refresh_token(&self, token_value: &str) -> Result<bool> {
        let query = r"
            DELETE FROM refresh_tokens
            WHERE token_value = $1
              AND expires_at > NOW()
            RETURNING id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_value)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to consume refresh token")?;
        Ok(row.is_some())
    }

    async fn auth_history(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u32,
    ) -> Result<(u64, Vec<AuthHistoryEvent>)> {
        let query = "SELECT COUNT(*) AS total FROM auth_history WHERE user_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count auth history")?;
        let total: i64 = row.get("total");

        let query = r"
            SELECT *
            FROM auth_history
            WHERE user_id = $1
            ORDER BY auth_event_time DESC
            LIMIT $2 OFFSET $3
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let events = sqlx::query_as::<_, AuthHistoryEvent>(query)
            .bind(user_id)
            .bind(i64::from(limit))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch auth history page")?;

        Ok((total.max(0) as u64, events))
    }

    async fn find_user_by_social(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<User>> {
        let query = r"
            SELECT users.*
            FROM users
            JOIN social_accounts ON social_accounts.user_id = users.id
            WHERE social_accounts.social_provider_name = $1
              AND social_accounts.social_id = $2
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, User>(query)
            .bind(provider)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup social account")
    }

    async fn insert_social_account(&self, account: SocialAccount) -> Result<()> {
        let query = r"
            INSERT INTO social_accounts (id, user_id, social_provider_name, social_id)
            VALUES ($1, $2, $3, $4)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(account.id)
            .bind(account.user_id)
            .bind(&account.provider)
            .bind(&account.external_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert social account")?;
        Ok(())
    }
}

async fn insert_refresh_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    token: &NewRefreshToken,
) -> Result<()> {
    let query = r"
        INSERT INTO refresh_tokens (id, user_id, token_value, expires_at)
        VALUES ($1, $2, $3, $4)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.token_value)
        .bind(token.expires_at)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert refresh token")?;
    Ok(())
}

async fn insert_auth_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    event: &NewAuthEvent,
) -> Result<()> {
    let query = r"
        INSERT INTO auth_history
            (id, user_id, auth_event_type, auth_event_fingerprint, device, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(event.id)
        .bind(event.user_id)
        .bind(event.event_type.as_str())
        .bind(&event.fingerprint)
        .bind(&event.device)
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert auth history event")?;
    Ok(())
}
