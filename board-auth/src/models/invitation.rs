//! Invitation model - organization invitations and their lifecycle.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::role::Role;

/// Invitation status.
///
/// `pending` is the only state with outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Expired,
    Revoked,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown invitation status: {0}")]
pub struct InvalidInvitationStatus(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invitation cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub from: InvitationStatus,
    pub to: InvitationStatus,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Expired => "expired",
            InvitationStatus::Revoked => "revoked",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvitationStatus::Pending)
    }

    pub fn can_transition_to(&self, next: InvitationStatus) -> bool {
        matches!(
            (self, next),
            (
                InvitationStatus::Pending,
                InvitationStatus::Accepted | InvitationStatus::Expired | InvitationStatus::Revoked
            )
        )
    }

    pub fn transition(self, next: InvitationStatus) -> Result<InvitationStatus, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvitationStatus {
    type Err = InvalidInvitationStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InvitationStatus::Pending),
            "accepted" => Ok(InvitationStatus::Accepted),
            "expired" => Ok(InvitationStatus::Expired),
            "revoked" => Ok(InvitationStatus::Revoked),
            other => Err(InvalidInvitationStatus(other.to_string())),
        }
    }
}

text_column!(InvitationStatus);

/// Invitation entity.
#[derive(Debug, Clone, FromRow)]
pub struct Invitation {
    pub invitation_id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub token: String,
    pub role: Role,
    pub status: InvitationStatus,
    pub invited_by_user_id: Option<Uuid>,
    pub expiry_utc: DateTime<Utc>,
    pub accepted_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Invitation {
    /// Create a pending invitation with a fresh UUID token.
    pub fn new(
        organization_id: Uuid,
        email: String,
        role: Role,
        invited_by_user_id: Option<Uuid>,
        expires_in: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            invitation_id: Uuid::new_v4(),
            organization_id,
            email,
            token: Uuid::new_v4().to_string(),
            role,
            status: InvitationStatus::Pending,
            invited_by_user_id,
            expiry_utc: now + expires_in,
            accepted_utc: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_utc
    }

    /// Check if invitation is pending and not expired.
    pub fn is_acceptable(&self, now: DateTime<Utc>) -> bool {
        self.status == InvitationStatus::Pending && !self.is_expired(now)
    }

    /// Case-insensitive match against the invited address.
    pub fn is_addressed_to(&self, email: &str) -> bool {
        self.email.trim().eq_ignore_ascii_case(email.trim())
    }
}

/// Invitation response for API.
#[derive(Debug, Serialize, ToSchema)]
pub struct InvitationResponse {
    pub id: Uuid,
    pub organization_id: Uuid,
    #[schema(example = "bob@example.com")]
    pub email: String,
    pub role: Role,
    pub status: InvitationStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<Invitation> for InvitationResponse {
    fn from(i: Invitation) -> Self {
        Self {
            id: i.invitation_id,
            organization_id: i.organization_id,
            email: i.email,
            role: i.role,
            status: i.status,
            expires_at: i.expiry_utc,
            created_at: i.created_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_has_outgoing_transitions() {
        use InvitationStatus::*;

        for next in [Accepted, Expired, Revoked] {
            assert_eq!(Pending.transition(next), Ok(next));
        }
        assert!(Pending.transition(Pending).is_err());

        for terminal in [Accepted, Expired, Revoked] {
            assert!(terminal.is_terminal());
            for next in [Pending, Accepted, Expired, Revoked] {
                assert_eq!(
                    terminal.transition(next),
                    Err(InvalidTransition {
                        from: terminal,
                        to: next
                    })
                );
            }
        }
    }

    #[test]
    fn email_match_ignores_case_and_whitespace() {
        let invitation = Invitation::new(
            Uuid::new_v4(),
            "Bob@X.com".to_string(),
            Role::Member,
            None,
            Duration::hours(168),
        );
        assert!(invitation.is_addressed_to("bob@x.com"));
        assert!(invitation.is_addressed_to(" BOB@x.COM "));
        assert!(!invitation.is_addressed_to("carol@x.com"));
    }

    #[test]
    fn new_invitation_is_pending_with_uuid_token() {
        let invitation = Invitation::new(
            Uuid::new_v4(),
            "bob@x.com".to_string(),
            Role::Member,
            None,
            Duration::hours(1),
        );
        assert_eq!(invitation.status, InvitationStatus::Pending);
        assert!(Uuid::parse_str(&invitation.token).is_ok());
        assert!(invitation.is_acceptable(Utc::now()));
        assert!(!invitation.is_acceptable(Utc::now() + Duration::hours(2)));
    }
}
