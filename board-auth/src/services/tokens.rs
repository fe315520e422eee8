//! Opaque bearer tokens.
//!
//! Clients hold a 64-char hex string; the store only ever sees its SHA-256
//! digest together with the role snapshot taken at issue time.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{AccessToken, AuthenticatedUser, Role};
use crate::services::{ServiceError, Store};
use crate::utils::{generate_token, hash_token};

/// How the role carried by a token is refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoleFreshness {
    /// Always return the role recorded when the token was issued.
    #[default]
    Snapshot,
    /// Re-read the membership once the snapshot is older than the window,
    /// however often the token is used, and store the fresh snapshot.
    RevalidateAfter(Duration),
}

impl RoleFreshness {
    /// `0` disables revalidation.
    pub fn from_seconds(seconds: u64) -> Self {
        if seconds == 0 {
            RoleFreshness::Snapshot
        } else {
            RoleFreshness::RevalidateAfter(Duration::seconds(seconds as i64))
        }
    }
}

/// A freshly minted token. `token` is the only copy of the plaintext.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expiry_utc: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn Store>,
    freshness: RoleFreshness,
}

impl TokenService {
    pub fn new(store: Arc<dyn Store>, freshness: RoleFreshness) -> Self {
        Self { store, freshness }
    }

    /// Mint a token that lives until revoked.
    pub async fn issue(
        &self,
        user_id: Uuid,
        role: Option<Role>,
        organization_id: Option<Uuid>,
    ) -> Result<IssuedToken, ServiceError> {
        self.mint(user_id, role, organization_id, None).await
    }

    /// Mint a token that stops resolving after `ttl`.
    pub async fn issue_with_ttl(
        &self,
        user_id: Uuid,
        role: Option<Role>,
        organization_id: Option<Uuid>,
        ttl: Duration,
    ) -> Result<IssuedToken, ServiceError> {
        self.mint(user_id, role, organization_id, Some(ttl)).await
    }

    async fn mint(
        &self,
        user_id: Uuid,
        role: Option<Role>,
        organization_id: Option<Uuid>,
        ttl: Option<Duration>,
    ) -> Result<IssuedToken, ServiceError> {
        let token = generate_token();
        let record = AccessToken::new(hash_token(&token), user_id, role, organization_id, ttl);

        self.store.insert_access_token(&record).await?;
        metrics::counter!("tokens_issued_total").increment(1);
        tracing::debug!(user_id = %user_id, "Access token issued");

        Ok(IssuedToken {
            token,
            expiry_utc: record.expiry_utc,
        })
    }

    /// Returns `false` when the token did not exist.
    pub async fn revoke(&self, token: &str) -> Result<bool, ServiceError> {
        self.store.delete_access_token(&hash_token(token)).await
    }

    /// Returns whether the user had any tokens.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<bool, ServiceError> {
        let deleted = self.store.delete_user_access_tokens(user_id).await?;
        tracing::info!(user_id = %user_id, revoked = deleted, "Revoked all access tokens");
        Ok(deleted > 0)
    }

    /// Resolve a presented token to its user.
    ///
    /// `None` for unknown or expired tokens and for tokens whose user no
    /// longer exists.
    pub async fn resolve(&self, token: &str) -> Result<Option<AuthenticatedUser>, ServiceError> {
        let token_hash = hash_token(token);
        let Some(record) = self.store.find_access_token(&token_hash).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        if record.is_expired(now) {
            self.store.delete_access_token(&token_hash).await?;
            return Ok(None);
        }

        let Some(user) = self.store.find_user_by_id(record.user_id).await? else {
            return Ok(None);
        };

        let (role, organization_id) = match self.freshness {
            RoleFreshness::RevalidateAfter(window) if record.role_is_stale(now, window) => {
                let organization_id = record.organization_id.or(user.current_organization_id);
                let role = match organization_id {
                    Some(organization_id) => self
                        .store
                        .find_membership(user.user_id, organization_id)
                        .await?
                        .map(|m| m.role),
                    None => None,
                };
                self.store
                    .refresh_access_token_role(&token_hash, role, organization_id, now)
                    .await?;
                tracing::debug!(user_id = %user.user_id, role = ?role, "Token role revalidated");
                (role, organization_id)
            }
            _ => (record.role, record.organization_id),
        };

        let mut authenticated =
            AuthenticatedUser::from_user(&user, token.to_string(), role, organization_id);
        authenticated.subdomain = self.subdomain_of(organization_id).await?;

        self.store.touch_access_token(&token_hash, now).await?;
        Ok(Some(authenticated))
    }

    async fn subdomain_of(
        &self,
        organization_id: Option<Uuid>,
    ) -> Result<Option<String>, ServiceError> {
        let Some(organization_id) = organization_id else {
            return Ok(None);
        };
        Ok(self
            .store
            .find_organization_by_id(organization_id)
            .await?
            .and_then(|o| o.subdomain))
    }
}
