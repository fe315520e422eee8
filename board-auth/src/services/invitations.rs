//! Invitation lifecycle: create, accept, revoke, expire.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    AuthenticatedUser, Invitation, InvitationStatus, Membership, NotificationEvent, Organization,
    OrganizationContext, OrganizationDetails, OwnerSummary, QueuedNotification, Role,
};
use crate::services::{NotificationQueue, ServiceError, Store};
use crate::utils::is_valid_email;

/// Builds the acceptance link mailed to invitees.
#[derive(Debug, Clone)]
pub struct InvitationLinks {
    pub protocol: String,
    pub domain: String,
    /// Appended only when set (local development).
    pub port: Option<u16>,
    pub frontend_url: String,
}

impl InvitationLinks {
    pub fn accept_url(&self, invitation: &Invitation, organization: &Organization) -> String {
        match organization.subdomain.as_deref() {
            Some(subdomain) => {
                let port = self.port.map(|p| format!(":{}", p)).unwrap_or_default();
                format!(
                    "{}://{}.{}{}/invitations/accept/{}",
                    self.protocol, subdomain, self.domain, port, invitation.token
                )
            }
            None => format!(
                "{}/invitations/accept/{}",
                self.frontend_url.trim_end_matches('/'),
                invitation.token
            ),
        }
    }
}

/// Result of a successful acceptance call.
#[derive(Debug, Clone)]
pub enum AcceptOutcome {
    /// This call flipped the invitation and created the membership.
    Accepted(Invitation),
    /// The invitation had already been accepted; nothing changed.
    AlreadyAccepted(Invitation),
}

impl AcceptOutcome {
    pub fn invitation(&self) -> &Invitation {
        match self {
            AcceptOutcome::Accepted(i) | AcceptOutcome::AlreadyAccepted(i) => i,
        }
    }
}

#[derive(Clone)]
pub struct InvitationService {
    store: Arc<dyn Store>,
    queue: Arc<dyn NotificationQueue>,
    expires_in: Duration,
}

impl InvitationService {
    pub fn new(store: Arc<dyn Store>, queue: Arc<dyn NotificationQueue>, expiry_hours: i64) -> Self {
        Self {
            store,
            queue,
            expires_in: Duration::hours(expiry_hours),
        }
    }

    /// Persist a pending invitation into the context's organization and queue
    /// its email.
    ///
    /// The row is not rolled back when queueing fails; the error carries the
    /// organization and address for the caller.
    pub async fn create_invitation(
        &self,
        ctx: &OrganizationContext,
        invited_by: Uuid,
        email: &str,
        role: Option<Role>,
    ) -> Result<Invitation, ServiceError> {
        let email = email.trim();
        self.persist_and_enqueue(ctx, invited_by, email, role.unwrap_or(Role::Member))
            .await
            .map_err(|source| {
                if source.is_infrastructure() {
                    tracing::error!(
                        organization_id = %ctx.organization_id,
                        email = %email,
                        error = %source,
                        "Failed to send invitation"
                    );
                } else {
                    tracing::warn!(
                        organization_id = %ctx.organization_id,
                        email = %email,
                        error = %source,
                        "Invitation rejected"
                    );
                }
                ServiceError::InvitationDispatch {
                    organization_id: ctx.organization_id,
                    email: email.to_string(),
                    source: Box::new(source),
                }
            })
    }

    async fn persist_and_enqueue(
        &self,
        ctx: &OrganizationContext,
        invited_by: Uuid,
        email: &str,
        role: Role,
    ) -> Result<Invitation, ServiceError> {
        if !ctx.role.can_manage_members() {
            return Err(ServiceError::Forbidden(
                "Only owners and admins can invite members".to_string(),
            ));
        }
        if role == Role::Owner {
            return Err(ServiceError::validation(
                "role",
                "The owner role cannot be assigned by invitation.",
            ));
        }
        if !is_valid_email(email) {
            return Err(ServiceError::validation("email", "Invalid email format"));
        }

        let invitation = Invitation::new(
            ctx.organization_id,
            email.to_string(),
            role,
            Some(invited_by),
            self.expires_in,
        );
        self.store.insert_invitation(&invitation).await?;

        let event = NotificationEvent::InvitationSent {
            invitation_id: invitation.invitation_id,
        };
        self.queue
            .enqueue(&QueuedNotification::new(event))
            .await
            .map_err(ServiceError::Queue)?;

        metrics::counter!("invitations_created_total").increment(1);
        tracing::info!(
            invitation_id = %invitation.invitation_id,
            organization_id = %invitation.organization_id,
            role = %invitation.role,
            "Invitation created"
        );
        Ok(invitation)
    }

    /// Accept by token on behalf of `acting_user`.
    ///
    /// Checks run in a fixed order: unknown token, missing user, address
    /// mismatch, then the status machine. Only the mismatch and unknown-token
    /// failures leave the row untouched; a pending invitation found past its
    /// expiry is moved to `expired` before failing.
    pub async fn accept_invitation(
        &self,
        token: &str,
        acting_user: Option<&AuthenticatedUser>,
    ) -> Result<AcceptOutcome, ServiceError> {
        let invitation = self
            .store
            .find_invitation_by_token(token)
            .await?
            .ok_or(ServiceError::InvalidInvitationToken)?;

        let Some(user) = acting_user else {
            return Err(ServiceError::UserNotRegistered {
                email: invitation.email,
                token: invitation.token,
            });
        };

        if !invitation.is_addressed_to(&user.email) {
            tracing::warn!(
                invitation_id = %invitation.invitation_id,
                user_id = %user.user_id,
                "Invitation email mismatch"
            );
            return Err(ServiceError::InvitationEmailMismatch);
        }

        if invitation.status == InvitationStatus::Accepted {
            return Ok(AcceptOutcome::AlreadyAccepted(invitation));
        }

        let now = Utc::now();
        if invitation.is_expired(now) {
            invitation
                .status
                .transition(InvitationStatus::Expired)
                .map_err(|e| ServiceError::InvitationNotPending(e.from))?;
            self.store
                .update_invitation_status(
                    invitation.invitation_id,
                    InvitationStatus::Pending,
                    InvitationStatus::Expired,
                )
                .await?;
            return Err(ServiceError::InvitationExpired);
        }

        invitation
            .status
            .transition(InvitationStatus::Accepted)
            .map_err(|e| ServiceError::InvitationNotPending(e.from))?;

        let membership = Membership::new(user.user_id, invitation.organization_id, invitation.role);
        let flipped = self
            .store
            .accept_invitation(invitation.invitation_id, &membership, now)
            .await?;

        if !flipped {
            // Lost the race to another acceptance or a revoke.
            let current = self
                .store
                .find_invitation_by_id(invitation.invitation_id)
                .await?
                .ok_or(ServiceError::InvalidInvitationToken)?;
            return match current.status {
                InvitationStatus::Accepted => Ok(AcceptOutcome::AlreadyAccepted(current)),
                status => Err(ServiceError::InvitationNotPending(status)),
            };
        }

        if user.current_organization_id.is_none() {
            self.store
                .set_current_organization(user.user_id, Some(invitation.organization_id))
                .await?;
        }

        metrics::counter!("invitations_accepted_total").increment(1);
        tracing::info!(
            invitation_id = %invitation.invitation_id,
            organization_id = %invitation.organization_id,
            user_id = %user.user_id,
            "Invitation accepted"
        );

        Ok(AcceptOutcome::Accepted(Invitation {
            status: InvitationStatus::Accepted,
            accepted_utc: Some(now),
            updated_utc: now,
            ..invitation
        }))
    }

    /// Public projection of the inviting organization.
    pub async fn organization_details(&self, token: &str) -> Result<OrganizationDetails, ServiceError> {
        let invitation = self
            .store
            .find_invitation_by_token(token)
            .await?
            .ok_or(ServiceError::InvalidInvitationToken)?;
        let organization = self
            .store
            .find_organization_by_id(invitation.organization_id)
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
            subdomain: None,
            owner,
        })
    }

    /// Pending -> revoked, within the context's organization only.
    pub async fn revoke_invitation(
        &self,
        ctx: &OrganizationContext,
        invitation_id: Uuid,
    ) -> Result<Invitation, ServiceError> {
        if !ctx.role.can_manage_members() {
            return Err(ServiceError::Forbidden(
                "Only owners and admins can revoke invitations".to_string(),
            ));
        }

        let invitation = self
            .store
            .find_invitation_by_id(invitation_id)
            .await?
            .filter(|i| i.organization_id == ctx.organization_id)
            .ok_or(ServiceError::InvitationNotFound)?;

        invitation
            .status
            .transition(InvitationStatus::Revoked)
            .map_err(|e| ServiceError::InvitationNotPending(e.from))?;

        let moved = self
            .store
            .update_invitation_status(
                invitation_id,
                InvitationStatus::Pending,
                InvitationStatus::Revoked,
            )
            .await?;
        if !moved {
            let status = self
                .store
                .find_invitation_by_id(invitation_id)
                .await?
                .map(|i| i.status)
                .unwrap_or(invitation.status);
            return Err(ServiceError::InvitationNotPending(status));
        }

        tracing::info!(
            invitation_id = %invitation_id,
            organization_id = %ctx.organization_id,
            "Invitation revoked"
        );
        Ok(Invitation {
            status: InvitationStatus::Revoked,
            ..invitation
        })
    }

    /// Sweep: every pending invitation past its expiry becomes `expired`.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let expired = self.store.expire_pending_invitations(now).await?;
        if expired > 0 {
            tracing::info!(expired, "Expired stale invitations");
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use crate::services::{
        InvitationStore, MemoryQueue, MemoryStore, OrganizationStore, UserStore,
    };

    fn links(port: Option<u16>) -> InvitationLinks {
        InvitationLinks {
            protocol: "http".to_string(),
            domain: "board.localhost".to_string(),
            port,
            frontend_url: "http://localhost:3000/".to_string(),
        }
    }

    #[test]
    fn accept_url_uses_subdomain_when_present() {
        let owner = Uuid::new_v4();
        let invitation = Invitation::new(Uuid::new_v4(), "bob@x.com".into(), Role::Member, None, Duration::hours(1));

        let with_sub = Organization::new("Acme".into(), Some("acme".into()), owner);
        assert_eq!(
            links(Some(8000)).accept_url(&invitation, &with_sub),
            format!("http://acme.board.localhost:8000/invitations/accept/{}", invitation.token)
        );
        assert_eq!(
            links(None).accept_url(&invitation, &with_sub),
            format!("http://acme.board.localhost/invitations/accept/{}", invitation.token)
        );

        let without_sub = Organization::new("Acme".into(), None, owner);
        assert_eq!(
            links(Some(8000)).accept_url(&invitation, &without_sub),
            format!("http://localhost:3000/invitations/accept/{}", invitation.token)
        );
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        queue: Arc<MemoryQueue>,
        service: InvitationService,
        ctx: OrganizationContext,
        owner: User,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let owner = User::new("Ann".into(), "ann@x.com".into(), "hash".into());
        store.insert_user(&owner).await.unwrap();
        let org = Organization::new("Acme".into(), Some("acme".into()), owner.user_id);
        store
            .create_organization_with_owner(&org, &Membership::new(owner.user_id, org.organization_id, Role::Owner))
            .await
            .unwrap();

        Fixture {
            service: InvitationService::new(store.clone(), queue.clone(), 168),
            ctx: OrganizationContext::new(org, Role::Owner),
            store,
            queue,
            owner,
        }
    }

    fn acting(user: &User) -> AuthenticatedUser {
        AuthenticatedUser::from_user(user, "token".into(), None, None)
    }

    #[tokio::test]
    async fn create_persists_pending_and_enqueues() {
        let f = fixture().await;
        let invitation = f
            .service
            .create_invitation(&f.ctx, f.owner.user_id, "bob@x.com", None)
            .await
            .unwrap();

        assert_eq!(invitation.role, Role::Member);
        assert_eq!(invitation.status, InvitationStatus::Pending);
        assert_eq!(
            f.queue.pending().iter().map(|m| m.event).collect::<Vec<_>>(),
            vec![NotificationEvent::InvitationSent {
                invitation_id: invitation.invitation_id
            }]
        );
    }

    #[tokio::test]
    async fn owner_role_and_viewers_are_rejected() {
        let f = fixture().await;
        let err = f
            .service
            .create_invitation(&f.ctx, f.owner.user_id, "bob@x.com", Some(Role::Owner))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvitationDispatch { ref source, .. }
                if matches!(**source, ServiceError::Validation { field: "role", .. })
        ));

        let viewer_ctx = OrganizationContext::new(f.ctx.organization.clone(), Role::Viewer);
        let err = f
            .service
            .create_invitation(&viewer_ctx, f.owner.user_id, "bob@x.com", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvitationDispatch { ref source, .. }
                if matches!(**source, ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn enqueue_failure_keeps_the_row() {
        let f = fixture().await;
        f.queue.set_fail_enqueue(true);

        let err = f
            .service
            .create_invitation(&f.ctx, f.owner.user_id, "bob@x.com", None)
            .await
            .unwrap_err();
        let ServiceError::InvitationDispatch {
            organization_id,
            email,
            source,
        } = err
        else {
            panic!("expected dispatch error");
        };
        assert_eq!(organization_id, f.ctx.organization_id);
        assert_eq!(email, "bob@x.com");
        assert!(matches!(*source, ServiceError::Queue(_)));
        assert!(f.queue.pending().is_empty());
    }

    #[tokio::test]
    async fn accept_then_reaccept_is_a_no_op() {
        let f = fixture().await;
        let invitation = f
            .service
            .create_invitation(&f.ctx, f.owner.user_id, "Bob@X.com", Some(Role::Admin))
            .await
            .unwrap();
        let bob = User::new("Bob".into(), "bob@x.com".into(), "hash".into());
        f.store.insert_user(&bob).await.unwrap();

        let first = f
            .service
            .accept_invitation(&invitation.token, Some(&acting(&bob)))
            .await
            .unwrap();
        assert!(matches!(first, AcceptOutcome::Accepted(_)));

        let membership = f
            .store
            .find_membership(bob.user_id, f.ctx.organization_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(membership.role, Role::Admin);

        let bob_row = f.store.find_user_by_id(bob.user_id).await.unwrap().unwrap();
        assert_eq!(bob_row.current_organization_id, Some(f.ctx.organization_id));

        let second = f
            .service
            .accept_invitation(&invitation.token, Some(&acting(&bob)))
            .await
            .unwrap();
        assert!(matches!(second, AcceptOutcome::AlreadyAccepted(_)));
        assert_eq!(second.invitation().status, InvitationStatus::Accepted);
    }

    #[tokio::test]
    async fn unregistered_and_mismatched_accepts_leave_state_alone() {
        let f = fixture().await;
        let invitation = f
            .service
            .create_invitation(&f.ctx, f.owner.user_id, "bob@x.com", None)
            .await
            .unwrap();

        let err = f
            .service
            .accept_invitation(&invitation.token, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::UserNotRegistered { ref email, ref token }
                if email == "bob@x.com" && *token == invitation.token
        ));

        let carol = User::new("Carol".into(), "carol@x.com".into(), "hash".into());
        let err = f
            .service
            .accept_invitation(&invitation.token, Some(&acting(&carol)))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvitationEmailMismatch));

        let stored = f
            .store
            .find_invitation_by_id(invitation.invitation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, InvitationStatus::Pending);
        assert!(f
            .store
            .find_membership(carol.user_id, f.ctx.organization_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let f = fixture().await;
        let err = f
            .service
            .accept_invitation("nope", Some(&acting(&f.owner)))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInvitationToken));
    }

    #[tokio::test]
    async fn past_expiry_moves_to_expired() {
        let f = fixture().await;
        let invitation = f
            .service
            .create_invitation(&f.ctx, f.owner.user_id, "bob@x.com", None)
            .await
            .unwrap();
        f.store.modify_invitation(invitation.invitation_id, |i| {
            i.expiry_utc = Utc::now() - Duration::minutes(1);
        });
        let bob = User::new("Bob".into(), "bob@x.com".into(), "hash".into());

        let err = f
            .service
            .accept_invitation(&invitation.token, Some(&acting(&bob)))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvitationExpired));

        let err = f
            .service
            .accept_invitation(&invitation.token, Some(&acting(&bob)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvitationNotPending(InvitationStatus::Expired)
        ));
    }

    #[tokio::test]
    async fn revoked_invitations_cannot_be_accepted() {
        let f = fixture().await;
        let invitation = f
            .service
            .create_invitation(&f.ctx, f.owner.user_id, "bob@x.com", None)
            .await
            .unwrap();

        let revoked = f
            .service
            .revoke_invitation(&f.ctx, invitation.invitation_id)
            .await
            .unwrap();
        assert_eq!(revoked.status, InvitationStatus::Revoked);

        let again = f
            .service
            .revoke_invitation(&f.ctx, invitation.invitation_id)
            .await
            .unwrap_err();
        assert!(matches!(
            again,
            ServiceError::InvitationNotPending(InvitationStatus::Revoked)
        ));

        let bob = User::new("Bob".into(), "bob@x.com".into(), "hash".into());
        let err = f
            .service
            .accept_invitation(&invitation.token, Some(&acting(&bob)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvitationNotPending(InvitationStatus::Revoked)
        ));
    }

    #[tokio::test]
    async fn revoke_is_scoped_to_the_context_organization() {
        let f = fixture().await;
        let invitation = f
            .service
            .create_invitation(&f.ctx, f.owner.user_id, "bob@x.com", None)
            .await
            .unwrap();

        let other = Organization::new("Other".into(), None, f.owner.user_id);
        let other_ctx = OrganizationContext::new(other, Role::Owner);
        let err = f
            .service
            .revoke_invitation(&other_ctx, invitation.invitation_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvitationNotFound));
    }

    #[tokio::test]
    async fn details_expose_owner_summary_only() {
        let f = fixture().await;
        let invitation = f
            .service
            .create_invitation(&f.ctx, f.owner.user_id, "bob@x.com", None)
            .await
            .unwrap();

        let details = f.service.organization_details(&invitation.token).await.unwrap();
        assert_eq!(details.id, f.ctx.organization_id);
        assert_eq!(details.name, "Acme");
        let owner = details.owner.unwrap();
        assert_eq!(owner.id, f.owner.user_id);
        assert_eq!(owner.email, "ann@x.com");
    }

    #[tokio::test]
    async fn sweep_expires_overdue_pending() {
        let f = fixture().await;
        let invitation = f
            .service
            .create_invitation(&f.ctx, f.owner.user_id, "bob@x.com", None)
            .await
            .unwrap();

        assert_eq!(f.service.expire_stale(Utc::now()).await.unwrap(), 0);
        assert_eq!(
            f.service
                .expire_stale(Utc::now() + Duration::hours(169))
                .await
                .unwrap(),
            1
        );
        let stored = f
            .store
            .find_invitation_by_id(invitation.invitation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, InvitationStatus::Expired);
    }
}
