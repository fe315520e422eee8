//! Membership-backed role lookups.

use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Membership, Role, UserRole};
use crate::services::{ServiceError, Store};

#[derive(Clone)]
pub struct RoleResolver {
    store: Arc<dyn Store>,
}

impl RoleResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Role in the user's current organization, if they have one and are
    /// still a member of it.
    pub async fn role_in_current_org(&self, user_id: Uuid) -> Result<Option<UserRole>, ServiceError> {
        let Some(user) = self.store.find_user_by_id(user_id).await? else {
            return Ok(None);
        };
        match user.current_organization_id {
            Some(organization_id) => self.role_in(user_id, organization_id).await,
            None => Ok(None),
        }
    }

    pub async fn role_in(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Option<UserRole>, ServiceError> {
        Ok(self
            .store
            .find_membership(user_id, organization_id)
            .await?
            .map(|m| m.user_role()))
    }

    pub async fn can_access_organization(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<bool, ServiceError> {
        Ok(self.role_in(user_id, organization_id).await?.is_some())
    }

    pub async fn has_role_in_organization(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        role: Role,
    ) -> Result<bool, ServiceError> {
        Ok(self
            .role_in(user_id, organization_id)
            .await?
            .is_some_and(|r| r.role == role))
    }

    pub async fn user_organizations(&self, user_id: Uuid) -> Result<Vec<Membership>, ServiceError> {
        self.store.list_user_memberships(user_id).await
    }
}
