use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::models::{OrganizationDetails, OrganizationMember, OrganizationResponse, Role};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateOrganizationRequest {
    #[validate(length(min = 3, max = 255, message = "The organization name must be between 3 and 255 characters"))]
    #[schema(example = "Acme")]
    pub name: String,

    #[schema(example = "acme")]
    pub subdomain: Option<String>,
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
pub struct SubdomainQuery {
    #[validate(length(min = 1, message = "The subdomain field is required"))]
    #[param(example = "acme")]
    pub subdomain: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubdomainAvailability {
    #[schema(example = "acme")]
    pub subdomain: String,
    pub available: bool,
    #[schema(example = "Subdomain is available")]
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSettingsRequest {
    #[schema(value_type = Object)]
    pub settings: Map<String, Value>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SwitchOrganizationRequest {
    pub organization_id: Uuid,
}

/// Organization as seen by one of its members.
#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentOrganizationResponse {
    pub organization: OrganizationResponse,
    pub role: Role,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MembersResponse {
    pub organization_id: Uuid,
    pub members: Vec<OrganizationMember>,
}

/// Public projection of an organization: id, name, subdomain and owner.
#[derive(Debug, Serialize, ToSchema)]
pub struct OrganizationDetailsResponse {
    pub organization: OrganizationDetails,
}
