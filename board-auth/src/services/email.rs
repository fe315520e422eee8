use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

use crate::services::ServiceError;

/// Outbound mail for the three notification kinds.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_invitation(
        &self,
        to_email: &str,
        organization_name: &str,
        accept_url: &str,
    ) -> Result<(), ServiceError>;

    async fn send_verification(
        &self,
        to_email: &str,
        name: &str,
        verification_url: &str,
    ) -> Result<(), ServiceError>;

    async fn send_password_reset(&self, to_email: &str, reset_url: &str)
        -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct SmtpMailer {
    transport: SmtpTransport,
    from_email: String,
    app_name: String,
}

impl SmtpMailer {
    pub fn new(config: &crate::config::SmtpConfig, app_name: &str) -> Result<Self, ServiceError> {
        let builder = if config.starttls {
            SmtpTransport::starttls_relay(&config.host)
                .map_err(|e| ServiceError::Email(e.to_string()))?
        } else {
            SmtpTransport::builder_dangerous(&config.host)
        };

        let builder = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
            _ => builder,
        };

        let transport = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_seconds)))
            .build();

        tracing::info!(host = %config.host, port = config.port, "SMTP mailer initialized");

        Ok(Self {
            transport,
            from_email: config.from_email.clone(),
            app_name: app_name.to_string(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: String,
        html_body: String,
    ) -> Result<(), ServiceError> {
        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| ServiceError::Email(e.to_string()))?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| ServiceError::Email(e.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )
            .map_err(|e| ServiceError::Email(e.to_string()))?;

        // SmtpTransport is blocking.
        let transport = self.transport.clone();
        let result = tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| ServiceError::Internal(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent successfully");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, to = %to_email, "Failed to send email");
                Err(ServiceError::Email(e.to_string()))
            }
        }
    }

    fn button(url: &str, label: &str) -> String {
        format!(
            r#"<p><a href="{url}" style="background-color: #2563eb; color: white; padding: 12px 20px; text-decoration: none; border-radius: 4px;">{label}</a></p>"#
        )
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_invitation(
        &self,
        to_email: &str,
        organization_name: &str,
        accept_url: &str,
    ) -> Result<(), ServiceError> {
        let subject = format!("You have been invited to join {}", organization_name);
        let plain = format!(
            "You have been invited to join {org} on {app}.\n\nAccept the invitation:\n{url}\n",
            org = organization_name,
            app = self.app_name,
            url = accept_url
        );
        let html = format!(
            r#"<html><body style="font-family: Arial, sans-serif;"><h2>Join {org}</h2><p>You have been invited to join <strong>{org}</strong> on {app}.</p>{button}</body></html>"#,
            org = organization_name,
            app = self.app_name,
            button = Self::button(accept_url, "Accept Invitation")
        );
        self.send_email(to_email, &subject, plain, html).await
    }

    async fn send_verification(
        &self,
        to_email: &str,
        name: &str,
        verification_url: &str,
    ) -> Result<(), ServiceError> {
        let plain = format!(
            "Hello {name},\n\nPlease verify your email address:\n{url}\n",
            url = verification_url
        );
        let html = format!(
            r#"<html><body style="font-family: Arial, sans-serif;"><h2>Hello {name}</h2><p>Please verify your email address.</p>{button}</body></html>"#,
            button = Self::button(verification_url, "Verify Email")
        );
        self.send_email(to_email, "Verify Your Email Address", plain, html)
            .await
    }

    async fn send_password_reset(
        &self,
        to_email: &str,
        reset_url: &str,
    ) -> Result<(), ServiceError> {
        let plain = format!(
            "We received a request to reset your password.\n\n{url}\n\nThis link expires in 60 minutes. If you didn't request this, ignore this email.\n",
            url = reset_url
        );
        let html = format!(
            r#"<html><body style="font-family: Arial, sans-serif;"><h2>Password Reset Request</h2><p>We received a request to reset your password.</p>{button}<p style="color: #666; font-size: 12px;">This link expires in 60 minutes. If you didn't request this, ignore this email.</p></body></html>"#,
            button = Self::button(reset_url, "Reset Password")
        );
        self.send_email(to_email, "Reset Your Password", plain, html)
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    Invitation,
    Verification,
    PasswordReset,
}

/// A message captured by [`MockMailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub kind: EmailKind,
    pub to: String,
    pub url: String,
}

/// Records every message instead of sending it.
#[derive(Default)]
pub struct MockMailer {
    sent: Mutex<Vec<SentEmail>>,
    fail: std::sync::atomic::AtomicBool,
    gate: Mutex<Option<Arc<Barrier>>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following send fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Hold each send at `barrier` before recording it.
    pub fn set_gate(&self, barrier: Arc<Barrier>) {
        if let Ok(mut gate) = self.gate.lock() {
            *gate = Some(barrier);
        }
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, to: &str) -> Vec<SentEmail> {
        self.sent().into_iter().filter(|m| m.to == to).collect()
    }

    async fn record(&self, kind: EmailKind, to: &str, url: &str) -> Result<(), ServiceError> {
        let gate = self.gate.lock().ok().and_then(|g| g.clone());
        if let Some(barrier) = gate {
            barrier.wait().await;
        }

        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ServiceError::Email("Mock mailer configured to fail".to_string()));
        }

        self.sent
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Mock mailer mutex poisoned: {}", e)))?
            .push(SentEmail {
                kind,
                to: to.to_string(),
                url: url.to_string(),
            });
        Ok(())
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_invitation(
        &self,
        to_email: &str,
        _organization_name: &str,
        accept_url: &str,
    ) -> Result<(), ServiceError> {
        self.record(EmailKind::Invitation, to_email, accept_url).await
    }

    async fn send_verification(
        &self,
        to_email: &str,
        _name: &str,
        verification_url: &str,
    ) -> Result<(), ServiceError> {
        self.record(EmailKind::Verification, to_email, verification_url)
            .await
    }

    async fn send_password_reset(
        &self,
        to_email: &str,
        reset_url: &str,
    ) -> Result<(), ServiceError> {
        self.record(EmailKind::PasswordReset, to_email, reset_url)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp_config() -> crate::config::SmtpConfig {
        crate::config::SmtpConfig {
            host: "localhost".to_string(),
            port: 1025,
            username: None,
            password: None,
            from_email: "noreply@board.test".to_string(),
            starttls: false,
            timeout_seconds: 10,
        }
    }

    #[test]
    fn smtp_mailer_builds_without_credentials() {
        assert!(SmtpMailer::new(&smtp_config(), "Board").is_ok());
    }

    #[tokio::test]
    async fn mock_records_and_fails_on_demand() {
        let mailer = MockMailer::new();
        mailer
            .send_password_reset("bob@x.com", "http://f/reset")
            .await
            .unwrap();
        assert_eq!(
            mailer.sent_to("bob@x.com"),
            vec![SentEmail {
                kind: EmailKind::PasswordReset,
                to: "bob@x.com".to_string(),
                url: "http://f/reset".to_string(),
            }]
        );

        mailer.set_fail(true);
        assert!(matches!(
            mailer.send_verification("bob@x.com", "Bob", "http://v").await,
            Err(ServiceError::Email(_))
        ));
        assert_eq!(mailer.sent().len(), 1);
    }
}
