use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::models::PasswordResetRecord;
use crate::services::error::ResetTokenProblem;
use crate::services::{Mailer, ServiceError, Store, TokenService};
use crate::utils::{
    check_password_strength, generate_token, hash_password, hash_token, token_matches_hash,
    Password,
};

/// Emailed, single-use, time-limited password reset tokens.
#[derive(Clone)]
pub struct PasswordResetService {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    tokens: TokenService,
    frontend_url: String,
    ttl: Duration,
}

impl PasswordResetService {
    pub fn new(
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        tokens: TokenService,
        frontend_url: &str,
        ttl_minutes: i64,
    ) -> Self {
        Self {
            store,
            mailer,
            tokens,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    fn reset_url(&self, token: &str, email: &str) -> String {
        format!(
            "{}/reset-password?token={}&email={}",
            self.frontend_url,
            token,
            urlencoding::encode(email)
        )
    }

    /// Replace any outstanding token for the address and mail a new link.
    pub async fn request(&self, email: &str) -> Result<(), ServiceError> {
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        let token = generate_token();
        let record = PasswordResetRecord::new(user.email.clone(), hash_token(&token));
        self.store.upsert_password_reset(&record).await?;

        self.mailer
            .send_password_reset(&user.email, &self.reset_url(&token, &user.email))
            .await?;

        tracing::info!(user_id = %user.user_id, "Password reset link sent");
        Ok(())
    }

    /// Consume a token and set the new password.
    ///
    /// Expired tokens are deleted on sight. A successful reset deletes the
    /// record and revokes every access token of the user.
    pub async fn reset(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        let record = self
            .store
            .find_password_reset(email)
            .await?
            .ok_or(ServiceError::InvalidPasswordResetToken(ResetTokenProblem::NotFound))?;

        if !token_matches_hash(token, &record.token_hash) {
            return Err(ServiceError::InvalidPasswordResetToken(ResetTokenProblem::Invalid));
        }

        if record.is_expired(Utc::now(), self.ttl) {
            self.store.delete_password_reset(&record.email).await?;
            return Err(ServiceError::PasswordResetTokenExpired);
        }

        check_password_strength(new_password)
            .map_err(|message| ServiceError::validation("password", message))?;

        let user = self
            .store
            .find_user_by_email(&record.email)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        let password_hash = hash_password(&Password::new(new_password)).map_err(|e| {
            ServiceError::Internal(anyhow::anyhow!("Password hashing error: {}", e))
        })?;
        self.store
            .update_user_password(user.user_id, password_hash.as_str())
            .await?;
        self.store.delete_password_reset(&record.email).await?;
        self.tokens.revoke_all(user.user_id).await?;

        tracing::info!(user_id = %user.user_id, "Password reset completed");
        Ok(())
    }

    /// Delete records older than the TTL.
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let deleted = self.store.delete_password_resets_before(now - self.ttl).await?;
        if deleted > 0 {
            tracing::info!(deleted, "Removed expired password reset tokens");
        }
        Ok(deleted)
    }
}
