//! Organization roles and the fixed permission matrix.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Role a user holds inside one organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Member,
    Viewer,
}

/// Action class checked against a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Create,
    Read,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported role: {0}")]
pub struct InvalidRole(pub String);

impl Role {
    pub const ALL: [Role; 4] = [Role::Owner, Role::Admin, Role::Member, Role::Viewer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Member => "member",
            Role::Viewer => "viewer",
        }
    }

    /// Owner and admin hold every permission, member everything but delete,
    /// viewer only read.
    pub fn has_permission(&self, permission: Permission) -> bool {
        match self {
            Role::Owner | Role::Admin => true,
            Role::Member => permission != Permission::Delete,
            Role::Viewer => permission == Permission::Read,
        }
    }

    /// Whether the role may invite members and revoke invitations.
    pub fn can_manage_members(&self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = InvalidRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            "viewer" => Ok(Role::Viewer),
            other => Err(InvalidRole(other.to_string())),
        }
    }
}

impl TryFrom<&str> for Role {
    type Error = InvalidRole;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

text_column!(Role);

impl Permission {
    pub const ALL: [Permission; 4] = [
        Permission::Create,
        Permission::Read,
        Permission::Update,
        Permission::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Create => "create",
            Permission::Read => "read",
            Permission::Update => "update",
            Permission::Delete => "delete",
        }
    }
}

/// A role bound to the organization it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserRole {
    pub role: Role,
    pub organization_id: Uuid,
}

impl UserRole {
    pub fn new(role: Role, organization_id: Uuid) -> Self {
        Self {
            role,
            organization_id,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }
}
