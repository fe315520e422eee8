use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    Membership, Organization, OrganizationContext, OrganizationDetails, OrganizationMember,
    OwnerSummary, Permission, Role,
};
use crate::services::{ServiceError, Store};

pub const RESERVED_SUBDOMAINS: &[&str] = &[
    "www", "api", "admin", "app", "mail", "ftp", "blog", "shop", "store", "support", "help",
    "docs", "status", "dev", "test", "staging", "prod",
];

/// Format rules only: 3 to 63 lowercase alphanumerics or hyphens, starting and
/// ending alphanumeric, no `--`, not reserved.
pub fn check_subdomain_format(subdomain: &str) -> Result<(), &'static str> {
    let len = subdomain.len();
    if !(3..=63).contains(&len) {
        return Err("The subdomain must be between 3 and 63 characters.");
    }

    let bytes = subdomain.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !alnum(bytes[0]) || !alnum(bytes[len - 1]) || !bytes.iter().all(|&b| alnum(b) || b == b'-') {
        return Err(
            "The subdomain may only contain lowercase letters, numbers and hyphens, and must start and end with a letter or number.",
        );
    }
    if subdomain.contains("--") {
        return Err("The subdomain cannot contain consecutive hyphens.");
    }
    if RESERVED_SUBDOMAINS.contains(&subdomain) {
        return Err("This subdomain is reserved.");
    }
    Ok(())
}

#[derive(Clone)]
pub struct OrganizationService {
    store: Arc<dyn Store>,
}

impl OrganizationService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Format rules plus availability.
    pub async fn validate_subdomain(&self, subdomain: &str) -> Result<(), ServiceError> {
        check_subdomain_format(subdomain)
            .map_err(|message| ServiceError::validation("subdomain", message))?;
        if self
            .store
            .find_organization_by_subdomain(subdomain)
            .await?
            .is_some()
        {
            return Err(ServiceError::validation(
                "subdomain",
                "The subdomain has already been taken.",
            ));
        }
        Ok(())
    }

    /// Create an organization owned by `owner_id` and switch the owner into it.
    pub async fn create(
        &self,
        owner_id: Uuid,
        name: &str,
        subdomain: Option<&str>,
    ) -> Result<Organization, ServiceError> {
        let name = name.trim();
        let name_len = name.chars().count();
        if !(3..=255).contains(&name_len) {
            return Err(ServiceError::validation(
                "name",
                "The organization name must be between 3 and 255 characters",
            ));
        }

        let subdomain = subdomain
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        if let Some(subdomain) = subdomain.as_deref() {
            self.validate_subdomain(subdomain).await?;
        }

        let organization = Organization::new(name.to_string(), subdomain, owner_id);
        let owner = Membership::new(owner_id, organization.organization_id, Role::Owner);
        self.store
            .create_organization_with_owner(&organization, &owner)
            .await?;

        tracing::info!(
            organization_id = %organization.organization_id,
            user_id = %owner_id,
            "Organization created"
        );
        Ok(organization)
    }

    pub async fn details_by_subdomain(
        &self,
        subdomain: &str,
    ) -> Result<OrganizationDetails, ServiceError> {
        let organization = self
            .store
            .find_organization_by_subdomain(subdomain)
            .await?
            .ok_or(ServiceError::OrganizationNotFound)?;
        let owner = self
            .store
            .find_user_by_id(organization.owner_user_id)
            .await?
            .map(|u| OwnerSummary {
                id: u.user_id,
                name: u.name,
                email: u.email,
            });

        Ok(OrganizationDetails {
            id: organization.organization_id,
            name: organization.name,
            subdomain: organization.subdomain,
            owner,
        })
    }

    /// Merge `settings` into the organization's settings map.
    pub async fn update_settings(
        &self,
        ctx: &OrganizationContext,
        settings: Map<String, Value>,
    ) -> Result<Organization, ServiceError> {
        if !ctx.has_permission(Permission::Update) {
            return Err(ServiceError::Forbidden("Insufficient permissions".to_string()));
        }

        let mut organization = ctx.organization.clone();
        organization.settings.0.extend(settings);
        self.store
            .update_organization_settings(ctx.organization_id, &organization.settings.0)
            .await?;

        tracing::info!(organization_id = %ctx.organization_id, "Organization settings updated");
        Ok(organization)
    }

    pub async fn switch_current_organization(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<(Organization, Role), ServiceError> {
        let organization = self
            .store
            .find_organization_by_id(organization_id)
            .await?
            .ok_or(ServiceError::OrganizationNotFound)?;
        let membership = self
            .store
            .find_membership(user_id, organization_id)
            .await?
            .ok_or(ServiceError::NotOrganizationMember)?;

        self.store
            .set_current_organization(user_id, Some(organization_id))
            .await?;
        tracing::info!(user_id = %user_id, organization_id = %organization_id, "Switched current organization");
        Ok((organization, membership.role))
    }

    pub async fn members(
        &self,
        ctx: &OrganizationContext,
    ) -> Result<Vec<OrganizationMember>, ServiceError> {
        self.store.list_organization_members(ctx.organization_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use crate::services::{MemoryStore, OrganizationStore, UserStore};
    use serde_json::json;

    #[test]
    fn subdomain_format_rules() {
        let longest = "a".repeat(63);
        let too_long = "a".repeat(64);
        for ok in ["acme", "a1b", "my-team", "x2-y3-z4", longest.as_str()] {
            assert_eq!(check_subdomain_format(ok), Ok(()), "{ok}");
        }
        for bad in [
            "ab",
            too_long.as_str(),
            "-acme",
            "acme-",
            "Acme",
            "ac_me",
            "my--team",
            "www",
            "staging",
        ] {
            assert!(check_subdomain_format(bad).is_err(), "{bad}");
        }
    }

    async fn owner(store: &MemoryStore) -> User {
        let user = User::new("Ann".into(), "ann@x.com".into(), "hash".into());
        store.insert_user(&user).await.unwrap();
        user
    }

    #[tokio::test]
    async fn create_attaches_owner_and_switches_context() {
        let store = Arc::new(MemoryStore::new());
        let service = OrganizationService::new(store.clone());
        let ann = owner(&store).await;

        let org = service.create(ann.user_id, "Acme", Some("Acme")).await.unwrap();
        assert_eq!(org.subdomain.as_deref(), Some("acme"));

        let membership = store
            .find_membership(ann.user_id, org.organization_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(membership.role, Role::Owner);
        let ann = store.find_user_by_id(ann.user_id).await.unwrap().unwrap();
        assert_eq!(ann.current_organization_id, Some(org.organization_id));

        let err = service.create(ann.user_id, "Acme 2", Some("acme")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation { field: "subdomain", .. }));
    }

    #[tokio::test]
    async fn create_validates_name() {
        let store = Arc::new(MemoryStore::new());
        let service = OrganizationService::new(store.clone());
        let ann = owner(&store).await;

        let err = service.create(ann.user_id, "AB", None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation { field: "name", .. }));
    }

    #[tokio::test]
    async fn settings_merge_requires_update_permission() {
        let store = Arc::new(MemoryStore::new());
        let service = OrganizationService::new(store.clone());
        let ann = owner(&store).await;
        let org = service.create(ann.user_id, "Acme", None).await.unwrap();

        let ctx = OrganizationContext::new(org.clone(), Role::Member);
        let mut first = Map::new();
        first.insert("theme".into(), json!("dark"));
        let updated = service.update_settings(&ctx, first).await.unwrap();

        let ctx = OrganizationContext::new(updated, Role::Admin);
        let mut second = Map::new();
        second.insert("locale".into(), json!("en"));
        let updated = service.update_settings(&ctx, second).await.unwrap();
        assert_eq!(updated.settings.0.get("theme"), Some(&json!("dark")));
        assert_eq!(updated.settings.0.get("locale"), Some(&json!("en")));

        let stored = store.find_organization_by_id(org.organization_id).await.unwrap().unwrap();
        assert_eq!(stored.settings.0.len(), 2);

        let viewer = OrganizationContext::new(stored, Role::Viewer);
        assert!(matches!(
            service.update_settings(&viewer, Map::new()).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn switching_requires_membership() {
        let store = Arc::new(MemoryStore::new());
        let service = OrganizationService::new(store.clone());
        let ann = owner(&store).await;
        let org = service.create(ann.user_id, "Acme", None).await.unwrap();

        let bob = User::new("Bob".into(), "bob@x.com".into(), "hash".into());
        store.insert_user(&bob).await.unwrap();
        assert!(matches!(
            service.switch_current_organization(bob.user_id, org.organization_id).await,
            Err(ServiceError::NotOrganizationMember)
        ));

        let (switched, role) = service
            .switch_current_organization(ann.user_id, org.organization_id)
            .await
            .unwrap();
        assert_eq!(switched.organization_id, org.organization_id);
        assert_eq!(role, Role::Owner);
    }

    #[tokio::test]
    async fn details_by_subdomain_includes_owner() {
        let store = Arc::new(MemoryStore::new());
        let service = OrganizationService::new(store.clone());
        let ann = owner(&store).await;
        service.create(ann.user_id, "Acme", Some("acme")).await.unwrap();

        let details = service.details_by_subdomain("acme").await.unwrap();
        assert_eq!(details.name, "Acme");
        assert_eq!(details.owner.unwrap().id, ann.user_id);
        assert!(matches!(
            service.details_by_subdomain("nope").await,
            Err(ServiceError::OrganizationNotFound)
        ));
    }
}
