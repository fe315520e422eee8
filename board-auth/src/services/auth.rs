use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    dtos::auth::RegisterRequest,
    models::{AuthenticatedUser, NotificationEvent, QueuedNotification, User, UserRole},
    services::{
        CacheStore, EmailVerifier, NotificationQueue, RoleResolver, ServiceError, Store,
        TokenService,
    },
    utils::{
        check_password_strength, hash_password, is_valid_email, verify_password, Password,
        PasswordHashString,
    },
};

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn Store>,
    tokens: TokenService,
    roles: RoleResolver,
    queue: Arc<dyn NotificationQueue>,
    cache: Arc<dyn CacheStore>,
    verifier: EmailVerifier,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn Store>,
        tokens: TokenService,
        roles: RoleResolver,
        queue: Arc<dyn NotificationQueue>,
        cache: Arc<dyn CacheStore>,
        verifier: EmailVerifier,
    ) -> Self {
        Self {
            store,
            tokens,
            roles,
            queue,
            cache,
            verifier,
        }
    }

    /// Check credentials and mint a token without expiry.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthenticatedUser, ServiceError> {
        self.sign_in(email, password, None).await
    }

    /// Same as [`authenticate`](Self::authenticate) but the token expires
    /// with the session cookie.
    pub async fn login_session(
        &self,
        email: &str,
        password: &str,
        ttl_days: i64,
    ) -> Result<AuthenticatedUser, ServiceError> {
        self.sign_in(email, password, Some(Duration::days(ttl_days)))
            .await
    }

    async fn sign_in(
        &self,
        email: &str,
        password: &str,
        ttl: Option<Duration>,
    ) -> Result<AuthenticatedUser, ServiceError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(ServiceError::InvalidCredentials);
        }

        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        let hash = PasswordHashString::new(user.password_hash.clone());
        if !verify_password(&Password::new(password), &hash) {
            tracing::warn!(user_id = %user.user_id, "Failed login attempt");
            return Err(ServiceError::InvalidCredentials);
        }

        let role = self.roles.role_in_current_org(user.user_id).await?;
        let authenticated = self.issue_for(&user, role, ttl).await?;

        tracing::info!(user_id = %user.user_id, "User logged in");
        Ok(authenticated)
    }

    async fn issue_for(
        &self,
        user: &User,
        role: Option<UserRole>,
        ttl: Option<Duration>,
    ) -> Result<AuthenticatedUser, ServiceError> {
        let role_name = role.map(|r| r.role);
        let organization_id = role.map(|r| r.organization_id);
        let issued = match ttl {
            Some(ttl) => {
                self.tokens
                    .issue_with_ttl(user.user_id, role_name, organization_id, ttl)
                    .await?
            }
            None => self.tokens.issue(user.user_id, role_name, organization_id).await?,
        };

        let mut authenticated = AuthenticatedUser::from_user(user, issued.token, role_name, organization_id);
        if let Some(organization_id) = organization_id {
            authenticated.subdomain = self
                .store
                .find_organization_by_id(organization_id)
                .await?
                .and_then(|o| o.subdomain);
        }
        Ok(authenticated)
    }

    /// Create an account and sign it in.
    ///
    /// The verification email is queued after the user row commits; failing
    /// to queue it is logged and does not fail the registration.
    pub async fn register(
        &self,
        req: RegisterRequest,
        session_ttl_days: Option<i64>,
    ) -> Result<AuthenticatedUser, ServiceError> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(ServiceError::validation("name", "The name field is required."));
        }
        if name.chars().count() > 255 {
            return Err(ServiceError::validation(
                "name",
                "The name may not be greater than 255 characters.",
            ));
        }
        let email = req.email.trim();
        if !is_valid_email(email) {
            return Err(ServiceError::validation("email", "Invalid email format"));
        }
        check_password_strength(&req.password)
            .map_err(|message| ServiceError::validation("password", message))?;

        if self.store.find_user_by_email(email).await?.is_some() {
            return Err(ServiceError::EmailAlreadyRegistered);
        }

        let password_hash = hash_password(&Password::new(req.password)).map_err(|e| {
            ServiceError::Internal(anyhow::anyhow!("Password hashing error: {}", e))
        })?;

        let user = User::new(name.to_string(), email.to_string(), password_hash.into_string());
        self.store.insert_user(&user).await?;
        tracing::info!(user_id = %user.user_id, "User registered");

        let role = self.roles.role_in_current_org(user.user_id).await?;
        let authenticated = self
            .issue_for(&user, role, session_ttl_days.map(Duration::days))
            .await?;

        self.enqueue_verification(user.user_id).await;
        Ok(authenticated)
    }

    async fn enqueue_verification(&self, user_id: Uuid) {
        let message = QueuedNotification::new(NotificationEvent::VerificationSent { user_id });
        if let Err(e) = self.queue.enqueue(&message).await {
            tracing::error!(user_id = %user_id, error = %e, "Failed to queue verification email");
        }
    }

    pub async fn logout(&self, token: &str) -> Result<bool, ServiceError> {
        self.tokens.revoke(token).await
    }

    pub async fn logout_all(&self, user_id: Uuid) -> Result<bool, ServiceError> {
        self.tokens.revoke_all(user_id).await
    }

    pub async fn current_user(&self, token: &str) -> Result<AuthenticatedUser, ServiceError> {
        self.tokens
            .resolve(token)
            .await?
            .ok_or(ServiceError::Unauthenticated)
    }

    pub fn verification_signature(&self, user: &User) -> String {
        self.verifier.signature(user.user_id, &user.email)
    }

    /// Mark the address verified. Verifying twice is not an error.
    pub async fn verify_email(&self, user_id: Uuid, signature: &str) -> Result<(), ServiceError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::InvalidVerificationSignature)?;

        if !self.verifier.verify(user.user_id, &user.email, signature) {
            tracing::warn!(user_id = %user_id, "Invalid email verification signature");
            return Err(ServiceError::InvalidVerificationSignature);
        }

        if self.store.mark_email_verified(user_id, Utc::now()).await? {
            tracing::info!(user_id = %user_id, "Email verified");
        }
        Ok(())
    }

    /// Queue another verification email. The dedup marker of the previous
    /// one is cleared first so the dispatcher does not swallow it.
    pub async fn resend_verification(&self, user: &AuthenticatedUser) -> Result<(), ServiceError> {
        if user.email_verified {
            return Err(ServiceError::EmailAlreadyVerified);
        }

        let event = NotificationEvent::VerificationSent {
            user_id: user.user_id,
        };
        self.cache
            .delete_cache(&event.dedup_key())
            .await
            .map_err(ServiceError::Cache)?;
        self.queue
            .enqueue(&QueuedNotification::new(event))
            .await
            .map_err(ServiceError::Queue)?;

        tracing::info!(user_id = %user.user_id, "Verification email re-queued");
        Ok(())
    }
}
