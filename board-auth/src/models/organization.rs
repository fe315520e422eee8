//! Organizations (tenants).

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{types::Json, FromRow};
use utoipa::ToSchema;
use uuid::Uuid;

use super::role::{Permission, Role};

/// Organization entity.
#[derive(Debug, Clone, FromRow)]
pub struct Organization {
    pub organization_id: Uuid,
    pub name: String,
    pub subdomain: Option<String>,
    pub settings: Json<Map<String, Value>>,
    pub owner_user_id: Uuid,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: String, subdomain: Option<String>, owner_user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            organization_id: Uuid::new_v4(),
            name,
            subdomain,
            settings: Json(Map::new()),
            owner_user_id,
            created_utc: now,
            updated_utc: now,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrganizationResponse {
    pub id: Uuid,
    #[schema(example = "Acme")]
    pub name: String,
    #[schema(example = "acme")]
    pub subdomain: Option<String>,
    #[schema(value_type = Object)]
    pub settings: Map<String, Value>,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<Organization> for OrganizationResponse {
    fn from(o: Organization) -> Self {
        Self {
            id: o.organization_id,
            name: o.name,
            subdomain: o.subdomain,
            settings: o.settings.0,
            owner_id: o.owner_user_id,
            created_at: o.created_utc,
        }
    }
}

/// Public owner projection; never includes credentials or settings.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OwnerSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Minimal organization projection shown to unauthenticated or
/// not-yet-member callers.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrganizationDetails {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    pub owner: Option<OwnerSummary>,
}

/// The organization a request is scoped to, with the caller's role in it.
///
/// Produced by the organization guard from the caller's current organization
/// and membership; the only source of tenant ids for scoped operations.
#[derive(Debug, Clone)]
pub struct OrganizationContext {
    pub organization_id: Uuid,
    pub organization: Organization,
    pub role: Role,
}

impl OrganizationContext {
    pub fn new(organization: Organization, role: Role) -> Self {
        Self {
            organization_id: organization.organization_id,
            organization,
            role,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }
}
