//! In-process store used by tests and local runs without PostgreSQL.
//!
//! All tables sit behind one mutex so the multi-row methods are atomic the
//! same way their SQL counterparts are.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::{
    AccessToken, Invitation, InvitationStatus, Membership, Organization, OrganizationMember,
    PasswordResetRecord, Role, User,
};
use crate::services::store::{
    AccessTokenStore, InvitationStore, OrganizationStore, PasswordResetStore, Store, UserStore,
};
use crate::services::ServiceError;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    organizations: HashMap<Uuid, Organization>,
    memberships: HashMap<(Uuid, Uuid), Membership>,
    access_tokens: HashMap<String, AccessToken>,
    invitations: HashMap<Uuid, Invitation>,
    password_resets: HashMap<String, PasswordResetRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, ServiceError> {
        self.tables
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Memory store mutex poisoned: {}", e)))
    }

    /// Number of live access tokens for a user.
    pub fn access_token_count(&self, user_id: Uuid) -> usize {
        self.tables()
            .map(|t| t.access_tokens.values().filter(|a| a.user_id == user_id).count())
            .unwrap_or(0)
    }

    /// Rewrite an invitation in place, e.g. to backdate its expiry.
    pub fn modify_invitation(&self, invitation_id: Uuid, f: impl FnOnce(&mut Invitation)) {
        if let Ok(mut t) = self.tables() {
            if let Some(invitation) = t.invitations.get_mut(&invitation_id) {
                f(invitation);
            }
        }
    }

    /// Rewrite a password-reset record in place.
    pub fn modify_password_reset(&self, email: &str, f: impl FnOnce(&mut PasswordResetRecord)) {
        if let Ok(mut t) = self.tables() {
            if let Some(record) = t.password_resets.get_mut(&email_key(email)) {
                f(record);
            }
        }
    }

    /// Rewrite an access token in place.
    pub fn modify_access_token(&self, token_hash: &str, f: impl FnOnce(&mut AccessToken)) {
        if let Ok(mut t) = self.tables() {
            if let Some(token) = t.access_tokens.get_mut(token_hash) {
                f(token);
            }
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<(), ServiceError> {
        self.tables().map(|_| ())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        Ok(self.tables()?.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let key = email_key(email);
        Ok(self
            .tables()?
            .users
            .values()
            .find(|u| email_key(&u.email) == key)
            .cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), ServiceError> {
        let mut t = self.tables()?;
        let key = email_key(&user.email);
        if t.users.values().any(|u| email_key(&u.email) == key) {
            return Err(ServiceError::EmailAlreadyRegistered);
        }
        t.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn update_user_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        if let Some(user) = self.tables()?.users.get_mut(&user_id) {
            user.password_hash = password_hash.to_string();
            user.updated_utc = Utc::now();
        }
        Ok(())
    }

    async fn mark_email_verified(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut t = self.tables()?;
        match t.users.get_mut(&user_id) {
            Some(user) if user.email_verified_utc.is_none() => {
                user.email_verified_utc = Some(at);
                user.updated_utc = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_current_organization(
        &self,
        user_id: Uuid,
        organization_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        if let Some(user) = self.tables()?.users.get_mut(&user_id) {
            user.current_organization_id = organization_id;
            user.updated_utc = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl OrganizationStore for MemoryStore {
    async fn find_organization_by_id(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<Organization>, ServiceError> {
        Ok(self.tables()?.organizations.get(&organization_id).cloned())
    }

    async fn find_organization_by_subdomain(
        &self,
        subdomain: &str,
    ) -> Result<Option<Organization>, ServiceError> {
        Ok(self
            .tables()?
            .organizations
            .values()
            .find(|o| o.subdomain.as_deref() == Some(subdomain))
            .cloned())
    }

    async fn create_organization_with_owner(
        &self,
        organization: &Organization,
        owner: &Membership,
    ) -> Result<(), ServiceError> {
        let mut t = self.tables()?;

        if let Some(subdomain) = organization.subdomain.as_deref() {
            if t
                .organizations
                .values()
                .any(|o| o.subdomain.as_deref() == Some(subdomain))
            {
                return Err(ServiceError::validation(
                    "subdomain",
                    "The subdomain has already been taken.",
                ));
            }
        }

        let user = t
            .users
            .get_mut(&owner.user_id)
            .ok_or(ServiceError::UserNotFound)?;
        user.current_organization_id = Some(organization.organization_id);
        user.updated_utc = Utc::now();

        t.organizations
            .insert(organization.organization_id, organization.clone());
        t.memberships
            .insert((owner.user_id, owner.organization_id), owner.clone());
        Ok(())
    }

    async fn update_organization_settings(
        &self,
        organization_id: Uuid,
        settings: &Map<String, Value>,
    ) -> Result<(), ServiceError> {
        let mut t = self.tables()?;
        let organization = t
            .organizations
            .get_mut(&organization_id)
            .ok_or(ServiceError::OrganizationNotFound)?;
        organization.settings = Json(settings.clone());
        organization.updated_utc = Utc::now();
        Ok(())
    }

    async fn find_membership(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Option<Membership>, ServiceError> {
        Ok(self
            .tables()?
            .memberships
            .get(&(user_id, organization_id))
            .cloned())
    }

    async fn upsert_membership(&self, membership: &Membership) -> Result<(), ServiceError> {
        let mut t = self.tables()?;
        t.memberships
            .entry((membership.user_id, membership.organization_id))
            .and_modify(|m| m.role = membership.role)
            .or_insert_with(|| membership.clone());
        Ok(())
    }

    async fn list_user_memberships(&self, user_id: Uuid) -> Result<Vec<Membership>, ServiceError> {
        let mut memberships: Vec<Membership> = self
            .tables()?
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        memberships.sort_by_key(|m| m.joined_utc);
        Ok(memberships)
    }

    async fn list_organization_members(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<OrganizationMember>, ServiceError> {
        let t = self.tables()?;
        let mut members: Vec<OrganizationMember> = t
            .memberships
            .values()
            .filter(|m| m.organization_id == organization_id)
            .filter_map(|m| {
                t.users.get(&m.user_id).map(|u| OrganizationMember {
                    user_id: u.user_id,
                    name: u.name.clone(),
                    email: u.email.clone(),
                    role: m.role,
                    joined_utc: m.joined_utc,
                })
            })
            .collect();
        members.sort_by_key(|m| m.joined_utc);
        Ok(members)
    }
}

#[async_trait]
impl AccessTokenStore for MemoryStore {
    async fn insert_access_token(&self, token: &AccessToken) -> Result<(), ServiceError> {
        let mut t = self.tables()?;
        if t.access_tokens.contains_key(&token.token_hash) {
            return Err(ServiceError::TokenCreation(anyhow::anyhow!(
                "duplicate token hash"
            )));
        }
        t.access_tokens
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn find_access_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<AccessToken>, ServiceError> {
        Ok(self.tables()?.access_tokens.get(token_hash).cloned())
    }

    async fn touch_access_token(
        &self,
        token_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        if let Some(token) = self.tables()?.access_tokens.get_mut(token_hash) {
            token.last_used_utc = Some(at);
        }
        Ok(())
    }

    async fn refresh_access_token_role(
        &self,
        token_hash: &str,
        role: Option<Role>,
        organization_id: Option<Uuid>,
        checked_at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        if let Some(token) = self.tables()?.access_tokens.get_mut(token_hash) {
            token.role = role;
            token.organization_id = organization_id;
            token.role_checked_utc = checked_at;
        }
        Ok(())
    }

    async fn delete_access_token(&self, token_hash: &str) -> Result<bool, ServiceError> {
        Ok(self.tables()?.access_tokens.remove(token_hash).is_some())
    }

    async fn delete_user_access_tokens(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let mut t = self.tables()?;
        let before = t.access_tokens.len();
        t.access_tokens.retain(|_, token| token.user_id != user_id);
        Ok((before - t.access_tokens.len()) as u64)
    }
}

#[async_trait]
impl InvitationStore for MemoryStore {
    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), ServiceError> {
        self.tables()?
            .invitations
            .insert(invitation.invitation_id, invitation.clone());
        Ok(())
    }

    async fn find_invitation_by_id(
        &self,
        invitation_id: Uuid,
    ) -> Result<Option<Invitation>, ServiceError> {
        Ok(self.tables()?.invitations.get(&invitation_id).cloned())
    }

    async fn find_invitation_by_token(
        &self,
        token: &str,
    ) -> Result<Option<Invitation>, ServiceError> {
        Ok(self
            .tables()?
            .invitations
            .values()
            .find(|i| i.token == token)
            .cloned())
    }

    async fn accept_invitation(
        &self,
        invitation_id: Uuid,
        membership: &Membership,
        at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut t = self.tables()?;
        match t.invitations.get_mut(&invitation_id) {
            Some(invitation) if invitation.status == InvitationStatus::Pending => {
                invitation.status = InvitationStatus::Accepted;
                invitation.accepted_utc = Some(at);
                invitation.updated_utc = at;
            }
            _ => return Ok(false),
        }
        t.memberships
            .entry((membership.user_id, membership.organization_id))
            .and_modify(|m| m.role = membership.role)
            .or_insert_with(|| membership.clone());
        Ok(true)
    }

    async fn update_invitation_status(
        &self,
        invitation_id: Uuid,
        from: InvitationStatus,
        to: InvitationStatus,
    ) -> Result<bool, ServiceError> {
        let mut t = self.tables()?;
        match t.invitations.get_mut(&invitation_id) {
            Some(invitation) if invitation.status == from => {
                invitation.status = to;
                invitation.updated_utc = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_pending_invitations(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let mut t = self.tables()?;
        let mut moved = 0;
        for invitation in t.invitations.values_mut() {
            if invitation.status == InvitationStatus::Pending && invitation.is_expired(now) {
                invitation.status = InvitationStatus::Expired;
                invitation.updated_utc = now;
                moved += 1;
            }
        }
        Ok(moved)
    }
}

#[async_trait]
impl PasswordResetStore for MemoryStore {
    async fn upsert_password_reset(
        &self,
        record: &PasswordResetRecord,
    ) -> Result<(), ServiceError> {
        self.tables()?
            .password_resets
            .insert(email_key(&record.email), record.clone());
        Ok(())
    }

    async fn find_password_reset(
        &self,
        email: &str,
    ) -> Result<Option<PasswordResetRecord>, ServiceError> {
        Ok(self.tables()?.password_resets.get(&email_key(email)).cloned())
    }

    async fn delete_password_reset(&self, email: &str) -> Result<bool, ServiceError> {
        Ok(self
            .tables()?
            .password_resets
            .remove(&email_key(email))
            .is_some())
    }

    async fn delete_password_resets_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        let mut t = self.tables()?;
        let before = t.password_resets.len();
        t.password_resets.retain(|_, r| r.created_utc >= cutoff);
        Ok((before - t.password_resets.len()) as u64)
    }
}
