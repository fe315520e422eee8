//! Delivers queued notification events as email.

use std::sync::Arc;

use crate::models::{InvitationStatus, NotificationEvent};
use crate::services::{
    CacheStore, EmailVerifier, InvitationLinks, Mailer, ServiceError, Store,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    /// The dedup marker was already set.
    Duplicate,
    /// Nothing to send (entity gone, invitation no longer pending, user
    /// already verified).
    Skipped,
}

/// Handles one event: marker check, entity load, send, marker set.
///
/// The sequence is not atomic. Two workers holding copies of the same event
/// can both pass the marker check and both send.
pub struct NotificationDispatcher {
    store: Arc<dyn Store>,
    cache: Arc<dyn CacheStore>,
    mailer: Arc<dyn Mailer>,
    links: InvitationLinks,
    verifier: EmailVerifier,
    dedup_ttl_seconds: u64,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn CacheStore>,
        mailer: Arc<dyn Mailer>,
        links: InvitationLinks,
        verifier: EmailVerifier,
        dedup_ttl_seconds: u64,
    ) -> Self {
        Self {
            store,
            cache,
            mailer,
            links,
            verifier,
            dedup_ttl_seconds,
        }
    }

    pub async fn handle(&self, event: NotificationEvent) -> Result<DispatchOutcome, ServiceError> {
        let key = event.dedup_key();

        if self
            .cache
            .get_cache(&key)
            .await
            .map_err(ServiceError::Cache)?
            .is_some()
        {
            tracing::debug!(
                entity_type = event.entity_type(),
                entity_id = %event.entity_id(),
                "Notification already sent, skipping"
            );
            return Ok(DispatchOutcome::Duplicate);
        }

        let outcome = match event {
            NotificationEvent::InvitationSent { invitation_id } => {
                self.send_invitation(invitation_id).await
            }
            NotificationEvent::VerificationSent { user_id } => {
                self.send_verification(user_id).await
            }
        };

        match outcome {
            Ok(DispatchOutcome::Sent) => {
                self.cache
                    .set_cache(&key, "1", self.dedup_ttl_seconds)
                    .await
                    .map_err(ServiceError::Cache)?;
                metrics::counter!("notifications_sent_total", "type" => event.entity_type())
                    .increment(1);
                Ok(DispatchOutcome::Sent)
            }
            Ok(other) => Ok(other),
            Err(e) => {
                metrics::counter!("notifications_failed_total", "type" => event.entity_type())
                    .increment(1);
                tracing::error!(
                    entity_type = event.entity_type(),
                    entity_id = %event.entity_id(),
                    error = %e,
                    "Notification delivery failed"
                );
                Err(e)
            }
        }
    }

    async fn send_invitation(&self, invitation_id: uuid::Uuid) -> Result<DispatchOutcome, ServiceError> {
        let Some(invitation) = self.store.find_invitation_by_id(invitation_id).await? else {
            tracing::warn!(invitation_id = %invitation_id, "Invitation not found, skipping notification");
            return Ok(DispatchOutcome::Skipped);
        };
        if invitation.status != InvitationStatus::Pending {
            tracing::info!(
                invitation_id = %invitation_id,
                status = %invitation.status,
                "Invitation no longer pending, skipping notification"
            );
            return Ok(DispatchOutcome::Skipped);
        }
        let Some(organization) = self
            .store
            .find_organization_by_id(invitation.organization_id)
            .await?
        else {
            tracing::warn!(
                invitation_id = %invitation_id,
                organization_id = %invitation.organization_id,
                "Organization not found, skipping notification"
            );
            return Ok(DispatchOutcome::Skipped);
        };

        let url = self.links.accept_url(&invitation, &organization);
        self.mailer
            .send_invitation(&invitation.email, &organization.name, &url)
            .await?;

        tracing::info!(
            invitation_id = %invitation_id,
            organization_id = %organization.organization_id,
            "Invitation email sent"
        );
        Ok(DispatchOutcome::Sent)
    }

    async fn send_verification(&self, user_id: uuid::Uuid) -> Result<DispatchOutcome, ServiceError> {
        let Some(user) = self.store.find_user_by_id(user_id).await? else {
            tracing::warn!(user_id = %user_id, "User not found, skipping verification email");
            return Ok(DispatchOutcome::Skipped);
        };
        if user.is_email_verified() {
            tracing::info!(user_id = %user_id, "Email already verified, skipping verification email");
            return Ok(DispatchOutcome::Skipped);
        }

        let url = self.verifier.verification_url(user.user_id, &user.email);
        self.mailer
            .send_verification(&user.email, &user.name, &url)
            .await?;

        tracing::info!(user_id = %user_id, "Verification email sent");
        Ok(DispatchOutcome::Sent)
    }
}
