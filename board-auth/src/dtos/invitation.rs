use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{InvitationResponse, Role};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct InviteRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "bob@example.com")]
    pub email: String,

    /// Defaults to `member`.
    pub role: Option<Role>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InviteResponse {
    #[schema(example = "Invitation sent successfully")]
    pub message: String,
    pub invitation: InvitationResponse,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AcceptInvitationRequest {
    #[validate(length(min = 1, message = "The token field is required"))]
    pub token: String,
}

/// Outcome discriminator of an acceptance attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AcceptStatus {
    InvitationAccepted,
    UserNotRegistered,
    Error,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AcceptInvitationResponse {
    pub status: AcceptStatus,
    #[schema(example = "Invitation accepted successfully!")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl AcceptInvitationResponse {
    pub fn accepted(message: &str, organization_id: Uuid) -> Self {
        Self {
            status: AcceptStatus::InvitationAccepted,
            message: message.to_string(),
            organization_id: Some(organization_id),
            email: None,
            token: None,
        }
    }

    pub fn not_registered(email: String, token: String) -> Self {
        Self {
            status: AcceptStatus::UserNotRegistered,
            message: "User is not registered. Please register to accept the invitation."
                .to_string(),
            organization_id: None,
            email: Some(email),
            token: Some(token),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            status: AcceptStatus::Error,
            message,
            organization_id: None,
            email: None,
            token: None,
        }
    }
}
