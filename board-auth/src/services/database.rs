//! PostgreSQL implementation of the persistence seams.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{postgres::PgPool, types::Json};
use uuid::Uuid;

use crate::models::{
    AccessToken, Invitation, InvitationStatus, Membership, Organization, OrganizationMember,
    PasswordResetRecord, Role, User,
};
use crate::services::store::{
    AccessTokenStore, InvitationStore, OrganizationStore, PasswordResetStore, Store, UserStore,
};
use crate::services::ServiceError;

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl Store for Database {
    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Database health check failed");
                ServiceError::Database(e)
            })?;
        Ok(())
    }
}

// ==================== Users ====================

#[async_trait]
impl UserStore for Database {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
                .bind(email.trim())
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn insert_user(&self, user: &User) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, name, email, password_hash, email_verified_utc,
                               current_organization_id, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.email_verified_utc)
        .bind(user.current_organization_id)
        .bind(user.created_utc)
        .bind(user.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::EmailAlreadyRegistered
            } else {
                ServiceError::Database(e)
            }
        })?;
        Ok(())
    }

    async fn update_user_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        sqlx::query("UPDATE users SET password_hash = $1, updated_utc = NOW() WHERE user_id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_email_verified(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE users SET email_verified_utc = $1, updated_utc = $1
            WHERE user_id = $2 AND email_verified_utc IS NULL
            "#,
        )
        .bind(at)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_current_organization(
        &self,
        user_id: Uuid,
        organization_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            "UPDATE users SET current_organization_id = $1, updated_utc = NOW() WHERE user_id = $2",
        )
        .bind(organization_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ==================== Organizations & memberships ====================

#[async_trait]
impl OrganizationStore for Database {
    async fn find_organization_by_id(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<Organization>, ServiceError> {
        Ok(sqlx::query_as::<_, Organization>(
            "SELECT * FROM organizations WHERE organization_id = $1",
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_organization_by_subdomain(
        &self,
        subdomain: &str,
    ) -> Result<Option<Organization>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE subdomain = $1")
                .bind(subdomain)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn create_organization_with_owner(
        &self,
        organization: &Organization,
        owner: &Membership,
    ) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO organizations (organization_id, name, subdomain, settings, owner_user_id,
                                       created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(organization.organization_id)
        .bind(&organization.name)
        .bind(&organization.subdomain)
        .bind(&organization.settings)
        .bind(organization.owner_user_id)
        .bind(organization.created_utc)
        .bind(organization.updated_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::validation("subdomain", "The subdomain has already been taken.")
            } else {
                ServiceError::Database(e)
            }
        })?;

        sqlx::query(
            r#"
            INSERT INTO organization_members (user_id, organization_id, role, joined_utc)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(owner.user_id)
        .bind(owner.organization_id)
        .bind(owner.role)
        .bind(owner.joined_utc)
        .execute(&mut *tx)
        .await?;

        let updated = sqlx::query(
            "UPDATE users SET current_organization_id = $1, updated_utc = NOW() WHERE user_id = $2",
        )
        .bind(organization.organization_id)
        .bind(owner.user_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            // Dropping `tx` rolls back the inserts above.
            return Err(ServiceError::UserNotFound);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_organization_settings(
        &self,
        organization_id: Uuid,
        settings: &Map<String, Value>,
    ) -> Result<(), ServiceError> {
        let result = sqlx::query(
            "UPDATE organizations SET settings = $1, updated_utc = NOW() WHERE organization_id = $2",
        )
        .bind(Json(settings))
        .bind(organization_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::OrganizationNotFound);
        }
        Ok(())
    }

    async fn find_membership(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Option<Membership>, ServiceError> {
        Ok(sqlx::query_as::<_, Membership>(
            "SELECT * FROM organization_members WHERE user_id = $1 AND organization_id = $2",
        )
        .bind(user_id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn upsert_membership(&self, membership: &Membership) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO organization_members (user_id, organization_id, role, joined_utc)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, organization_id) DO UPDATE SET role = EXCLUDED.role
            "#,
        )
        .bind(membership.user_id)
        .bind(membership.organization_id)
        .bind(membership.role)
        .bind(membership.joined_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_user_memberships(&self, user_id: Uuid) -> Result<Vec<Membership>, ServiceError> {
        Ok(sqlx::query_as::<_, Membership>(
            "SELECT * FROM organization_members WHERE user_id = $1 ORDER BY joined_utc",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_organization_members(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<OrganizationMember>, ServiceError> {
        Ok(sqlx::query_as::<_, OrganizationMember>(
            r#"
            SELECT m.user_id, u.name, u.email, m.role, m.joined_utc
            FROM organization_members m
            JOIN users u ON u.user_id = m.user_id
            WHERE m.organization_id = $1
            ORDER BY m.joined_utc
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?)
    }
}

// ==================== Access tokens ====================

#[async_trait]
impl AccessTokenStore for Database {
    async fn insert_access_token(&self, token: &AccessToken) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO access_tokens (token_hash, user_id, role, organization_id, created_utc,
                                       role_checked_utc, last_used_utc, expiry_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&token.token_hash)
        .bind(token.user_id)
        .bind(token.role)
        .bind(token.organization_id)
        .bind(token.created_utc)
        .bind(token.role_checked_utc)
        .bind(token.last_used_utc)
        .bind(token.expiry_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| ServiceError::TokenCreation(anyhow::Error::new(e)))?;
        Ok(())
    }

    async fn find_access_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<AccessToken>, ServiceError> {
        Ok(
            sqlx::query_as::<_, AccessToken>("SELECT * FROM access_tokens WHERE token_hash = $1")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn touch_access_token(
        &self,
        token_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        sqlx::query("UPDATE access_tokens SET last_used_utc = $1 WHERE token_hash = $2")
            .bind(at)
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn refresh_access_token_role(
        &self,
        token_hash: &str,
        role: Option<Role>,
        organization_id: Option<Uuid>,
        checked_at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            UPDATE access_tokens
            SET role = $1, organization_id = $2, role_checked_utc = $3
            WHERE token_hash = $4
            "#,
        )
        .bind(role)
        .bind(organization_id)
        .bind(checked_at)
        .bind(token_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_access_token(&self, token_hash: &str) -> Result<bool, ServiceError> {
        let result = sqlx::query("DELETE FROM access_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user_access_tokens(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM access_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ==================== Invitations ====================

#[async_trait]
impl InvitationStore for Database {
    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO organization_invitations (invitation_id, organization_id, email, token, role,
                                                  status, invited_by_user_id, expiry_utc,
                                                  accepted_utc, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(invitation.invitation_id)
        .bind(invitation.organization_id)
        .bind(&invitation.email)
        .bind(&invitation.token)
        .bind(invitation.role)
        .bind(invitation.status)
        .bind(invitation.invited_by_user_id)
        .bind(invitation.expiry_utc)
        .bind(invitation.accepted_utc)
        .bind(invitation.created_utc)
        .bind(invitation.updated_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_invitation_by_id(
        &self,
        invitation_id: Uuid,
    ) -> Result<Option<Invitation>, ServiceError> {
        Ok(sqlx::query_as::<_, Invitation>(
            "SELECT * FROM organization_invitations WHERE invitation_id = $1",
        )
        .bind(invitation_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_invitation_by_token(
        &self,
        token: &str,
    ) -> Result<Option<Invitation>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Invitation>(
                "SELECT * FROM organization_invitations WHERE token = $1",
            )
            .bind(token)
            .fetch_optional(&self.pool)
            .await?,
        )
    }

    async fn accept_invitation(
        &self,
        invitation_id: Uuid,
        membership: &Membership,
        at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let flipped = sqlx::query(
            r#"
            UPDATE organization_invitations
            SET status = 'accepted', accepted_utc = $1, updated_utc = $1
            WHERE invitation_id = $2 AND status = 'pending'
            "#,
        )
        .bind(at)
        .bind(invitation_id)
        .execute(&mut *tx)
        .await?;

        if flipped.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO organization_members (user_id, organization_id, role, joined_utc)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, organization_id) DO UPDATE SET role = EXCLUDED.role
            "#,
        )
        .bind(membership.user_id)
        .bind(membership.organization_id)
        .bind(membership.role)
        .bind(membership.joined_utc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn update_invitation_status(
        &self,
        invitation_id: Uuid,
        from: InvitationStatus,
        to: InvitationStatus,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE organization_invitations SET status = $1, updated_utc = NOW()
            WHERE invitation_id = $2 AND status = $3
            "#,
        )
        .bind(to)
        .bind(invitation_id)
        .bind(from)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn expire_pending_invitations(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE organization_invitations SET status = 'expired', updated_utc = $1
            WHERE status = 'pending' AND expiry_utc <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

// ==================== Password resets ====================

#[async_trait]
impl PasswordResetStore for Database {
    async fn upsert_password_reset(
        &self,
        record: &PasswordResetRecord,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (email, token_hash, created_utc)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE
            SET token_hash = EXCLUDED.token_hash, created_utc = EXCLUDED.created_utc
            "#,
        )
        .bind(&record.email)
        .bind(&record.token_hash)
        .bind(record.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_password_reset(
        &self,
        email: &str,
    ) -> Result<Option<PasswordResetRecord>, ServiceError> {
        Ok(sqlx::query_as::<_, PasswordResetRecord>(
            "SELECT * FROM password_reset_tokens WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_password_reset(&self, email: &str) -> Result<bool, ServiceError> {
        let result =
            sqlx::query("DELETE FROM password_reset_tokens WHERE LOWER(email) = LOWER($1)")
                .bind(email.trim())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_password_resets_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE created_utc < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
