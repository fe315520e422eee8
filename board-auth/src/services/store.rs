//! Persistence seams.
//!
//! [`Database`](super::Database) implements them over PostgreSQL and
//! [`MemoryStore`](super::MemoryStore) in process. Every multi-row write that
//! must be atomic is a single method here so each backend can run it as one
//! transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::{
    AccessToken, Invitation, InvitationStatus, Membership, Organization, OrganizationMember,
    PasswordResetRecord, Role, User,
};
use crate::services::ServiceError;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError>;

    /// Case-insensitive lookup.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError>;

    /// Fails with [`ServiceError::EmailAlreadyRegistered`] on a duplicate email.
    async fn insert_user(&self, user: &User) -> Result<(), ServiceError>;

    async fn update_user_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError>;

    /// Returns `false` when the user was already verified.
    async fn mark_email_verified(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, ServiceError>;

    async fn set_current_organization(
        &self,
        user_id: Uuid,
        organization_id: Option<Uuid>,
    ) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait OrganizationStore: Send + Sync {
    async fn find_organization_by_id(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<Organization>, ServiceError>;

    async fn find_organization_by_subdomain(
        &self,
        subdomain: &str,
    ) -> Result<Option<Organization>, ServiceError>;

    /// One transaction: insert the organization, attach the owner membership
    /// and make it the owner's current organization.
    async fn create_organization_with_owner(
        &self,
        organization: &Organization,
        owner: &Membership,
    ) -> Result<(), ServiceError>;

    async fn update_organization_settings(
        &self,
        organization_id: Uuid,
        settings: &Map<String, Value>,
    ) -> Result<(), ServiceError>;

    async fn find_membership(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Option<Membership>, ServiceError>;

    /// Insert or replace the role for (user, organization).
    async fn upsert_membership(&self, membership: &Membership) -> Result<(), ServiceError>;

    async fn list_user_memberships(&self, user_id: Uuid) -> Result<Vec<Membership>, ServiceError>;

    async fn list_organization_members(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<OrganizationMember>, ServiceError>;
}

#[async_trait]
pub trait AccessTokenStore: Send + Sync {
    /// Fails with [`ServiceError::TokenCreation`] when the hash already exists.
    async fn insert_access_token(&self, token: &AccessToken) -> Result<(), ServiceError>;

    async fn find_access_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<AccessToken>, ServiceError>;

    async fn touch_access_token(
        &self,
        token_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ServiceError>;

    /// Replace the role snapshot after re-reading the membership.
    async fn refresh_access_token_role(
        &self,
        token_hash: &str,
        role: Option<Role>,
        organization_id: Option<Uuid>,
        checked_at: DateTime<Utc>,
    ) -> Result<(), ServiceError>;

    /// Whether a row was deleted.
    async fn delete_access_token(&self, token_hash: &str) -> Result<bool, ServiceError>;

    /// Number of rows deleted.
    async fn delete_user_access_tokens(&self, user_id: Uuid) -> Result<u64, ServiceError>;
}

#[async_trait]
pub trait InvitationStore: Send + Sync {
    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), ServiceError>;

    async fn find_invitation_by_id(
        &self,
        invitation_id: Uuid,
    ) -> Result<Option<Invitation>, ServiceError>;

    async fn find_invitation_by_token(
        &self,
        token: &str,
    ) -> Result<Option<Invitation>, ServiceError>;

    /// One transaction: flip the invitation `pending -> accepted` if it is
    /// still pending, and upsert the membership. Returns `false` (and writes
    /// nothing) when the invitation was no longer pending.
    async fn accept_invitation(
        &self,
        invitation_id: Uuid,
        membership: &Membership,
        at: DateTime<Utc>,
    ) -> Result<bool, ServiceError>;

    /// Compare-and-swap on status. Returns whether the row moved.
    async fn update_invitation_status(
        &self,
        invitation_id: Uuid,
        from: InvitationStatus,
        to: InvitationStatus,
    ) -> Result<bool, ServiceError>;

    /// Moves every pending invitation whose expiry is at or before `now` to
    /// `expired`. Returns how many moved.
    async fn expire_pending_invitations(&self, now: DateTime<Utc>) -> Result<u64, ServiceError>;
}

#[async_trait]
pub trait PasswordResetStore: Send + Sync {
    /// Create or replace the record for its email.
    async fn upsert_password_reset(&self, record: &PasswordResetRecord)
        -> Result<(), ServiceError>;

    async fn find_password_reset(
        &self,
        email: &str,
    ) -> Result<Option<PasswordResetRecord>, ServiceError>;

    async fn delete_password_reset(&self, email: &str) -> Result<bool, ServiceError>;

    async fn delete_password_resets_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, ServiceError>;
}

/// Everything the service persists.
#[async_trait]
pub trait Store:
    UserStore + OrganizationStore + AccessTokenStore + InvitationStore + PasswordResetStore
{
    async fn health_check(&self) -> Result<(), ServiceError>;
}
