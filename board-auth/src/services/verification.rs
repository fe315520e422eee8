//! Signed email-verification links.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Signs and checks `/email/verify/{user_id}/{signature}` links.
///
/// The signature covers the user id and the lowercased email, so changing
/// the address invalidates links already sent.
#[derive(Clone)]
pub struct EmailVerifier {
    keyed: HmacSha256,
    app_url: String,
}

impl EmailVerifier {
    pub fn new(secret: &str, app_url: &str) -> Result<Self, anyhow::Error> {
        let keyed = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid verification secret: {}", e))?;
        Ok(Self {
            keyed,
            app_url: app_url.trim_end_matches('/').to_string(),
        })
    }

    fn mac(&self, user_id: Uuid, email: &str) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(user_id.as_bytes());
        mac.update(b":");
        mac.update(email.trim().to_lowercase().as_bytes());
        mac
    }

    pub fn signature(&self, user_id: Uuid, email: &str) -> String {
        hex::encode(self.mac(user_id, email).finalize().into_bytes())
    }

    pub fn verification_url(&self, user_id: Uuid, email: &str) -> String {
        format!(
            "{}/email/verify/{}/{}",
            self.app_url,
            user_id,
            self.signature(user_id, email)
        )
    }

    /// Constant-time check of a presented signature.
    pub fn verify(&self, user_id: Uuid, email: &str, signature: &str) -> bool {
        let Ok(bytes) = hex::decode(signature) else {
            return false;
        };
        self.mac(user_id, email).verify_slice(&bytes).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trips_and_binds_email() {
        let verifier = EmailVerifier::new("secret", "http://localhost:8080/").unwrap();
        let user_id = Uuid::new_v4();
        let sig = verifier.signature(user_id, "Bob@X.com");

        assert!(verifier.verify(user_id, "bob@x.com", &sig));
        assert!(!verifier.verify(user_id, "carol@x.com", &sig));
        assert!(!verifier.verify(Uuid::new_v4(), "bob@x.com", &sig));
        assert!(!verifier.verify(user_id, "bob@x.com", "not-hex"));
    }

    #[test]
    fn url_embeds_user_and_signature() {
        let verifier = EmailVerifier::new("secret", "http://localhost:8080/").unwrap();
        let user_id = Uuid::new_v4();
        let url = verifier.verification_url(user_id, "bob@x.com");
        assert_eq!(
            url,
            format!(
                "http://localhost:8080/email/verify/{}/{}",
                user_id,
                verifier.signature(user_id, "bob@x.com")
            )
        );
    }

    #[test]
    fn different_secrets_disagree() {
        let user_id = Uuid::new_v4();
        let a = EmailVerifier::new("one", "http://a").unwrap();
        let b = EmailVerifier::new("two", "http://a").unwrap();
        assert!(!b.verify(user_id, "bob@x.com", &a.signature(user_id, "bob@x.com")));
    }
}
