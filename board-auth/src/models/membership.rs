use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::role::{Role, UserRole};

/// A user's role in one organization. Unique per (user, organization).
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Membership {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: Role,
    pub joined_utc: DateTime<Utc>,
}

impl Membership {
    pub fn new(user_id: Uuid, organization_id: Uuid, role: Role) -> Self {
        Self {
            user_id,
            organization_id,
            role,
            joined_utc: Utc::now(),
        }
    }

    pub fn user_role(&self) -> UserRole {
        UserRole::new(self.role, self.organization_id)
    }
}

/// Member listing row (membership joined with the user).
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct OrganizationMember {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub joined_utc: DateTime<Utc>,
}
