//! Persisted bearer token record.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::role::Role;

/// Stored form of an opaque bearer token.
///
/// The plaintext is handed to the client once; only its SHA-256 digest is
/// kept. `role`/`organization_id` are the snapshot taken at issue time and
/// `role_checked_utc` is when that snapshot was last read from a membership.
#[derive(Debug, Clone, FromRow)]
pub struct AccessToken {
    pub token_hash: String,
    pub user_id: Uuid,
    pub role: Option<Role>,
    pub organization_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub role_checked_utc: DateTime<Utc>,
    pub last_used_utc: Option<DateTime<Utc>>,
    pub expiry_utc: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(
        token_hash: String,
        user_id: Uuid,
        role: Option<Role>,
        organization_id: Option<Uuid>,
        ttl: Option<Duration>,
    ) -> Self {
        let now = Utc::now();
        Self {
            token_hash,
            user_id,
            role,
            organization_id,
            created_utc: now,
            role_checked_utc: now,
            last_used_utc: None,
            expiry_utc: ttl.map(|ttl| now + ttl),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_utc.is_some_and(|expiry| now >= expiry)
    }

    /// Whether the role snapshot is older than `window`.
    pub fn role_is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.role_checked_utc > window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_ignores_recent_use() {
        let mut token = AccessToken::new("h".into(), Uuid::new_v4(), None, None, None);
        let now = Utc::now();
        assert!(!token.role_is_stale(now, Duration::minutes(5)));

        token.role_checked_utc = now - Duration::hours(1);
        token.last_used_utc = Some(now - Duration::seconds(30));
        assert!(token.role_is_stale(now, Duration::minutes(5)));
    }

    #[test]
    fn tokens_without_ttl_never_expire() {
        let token = AccessToken::new("h".into(), Uuid::new_v4(), None, None, None);
        assert!(!token.is_expired(Utc::now() + Duration::days(3650)));

        let token =
            AccessToken::new("h".into(), Uuid::new_v4(), None, None, Some(Duration::days(7)));
        assert!(!token.is_expired(Utc::now()));
        assert!(token.is_expired(Utc::now() + Duration::days(8)));
    }
}
