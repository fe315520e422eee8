//! User accounts and the per-request authenticated user.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::role::{Role, UserRole};

/// User entity.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub email_verified_utc: Option<DateTime<Utc>>,
    pub current_organization_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl User {
    /// Create a new, unverified user without an organization.
    pub fn new(name: String, email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            name,
            email,
            password_hash,
            email_verified_utc: None,
            current_organization_id: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn is_email_verified(&self) -> bool {
        self.email_verified_utc.is_some()
    }
}

/// Identity attached to a request once its bearer token resolved.
///
/// `role` and `organization_id` come from the token's snapshot (or a fresh
/// membership lookup when revalidation is on); `current_organization_id` is
/// always read from the user row.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub token: String,
    pub role: Option<Role>,
    pub organization_id: Option<Uuid>,
    pub subdomain: Option<String>,
    pub current_organization_id: Option<Uuid>,
    pub email_verified: bool,
}

impl AuthenticatedUser {
    pub fn from_user(
        user: &User,
        token: String,
        role: Option<Role>,
        organization_id: Option<Uuid>,
    ) -> Self {
        Self {
            user_id: user.user_id,
            name: user.name.clone(),
            email: user.email.clone(),
            token,
            role,
            organization_id,
            subdomain: None,
            current_organization_id: user.current_organization_id,
            email_verified: user.is_email_verified(),
        }
    }

    pub fn user_role(&self) -> Option<UserRole> {
        match (self.role, self.organization_id) {
            (Some(role), Some(organization_id)) => Some(UserRole::new(role, organization_id)),
            _ => None,
        }
    }
}

/// User as returned by login, registration and `/auth/me`.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    #[schema(example = "Bob Smith")]
    pub name: String,
    #[schema(example = "bob@example.com")]
    pub email: String,
    pub role: Option<Role>,
    pub organization_id: Option<Uuid>,
    #[schema(example = "acme")]
    pub subdomain: Option<String>,
    pub email_verified: bool,
}

impl From<&AuthenticatedUser> for UserResponse {
    fn from(u: &AuthenticatedUser) -> Self {
        Self {
            id: u.user_id,
            name: u.name.clone(),
            email: u.email.clone(),
            role: u.role,
            organization_id: u.organization_id,
            subdomain: u.subdomain.clone(),
            email_verified: u.email_verified,
        }
    }
}
