use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;

/// At most one outstanding reset per email; holds the token digest only.
#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetRecord {
    pub email: String,
    pub token_hash: String,
    pub created_utc: DateTime<Utc>,
}

impl PasswordResetRecord {
    pub fn new(email: String, token_hash: String) -> Self {
        Self {
            email,
            token_hash,
            created_utc: Utc::now(),
        }
    }

    /// Strictly older than `ttl`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_utc > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_only_after_ttl() {
        let mut record = PasswordResetRecord::new("a@b.c".into(), "hash".into());
        let now = Utc::now();

        record.created_utc = now - Duration::minutes(59);
        assert!(!record.is_expired(now, Duration::minutes(60)));

        record.created_utc = now - Duration::minutes(61);
        assert!(record.is_expired(now, Duration::minutes(60)));
    }
}
