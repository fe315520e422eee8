use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{role::InvalidRole, InvitationStatus};

/// Why a presented password-reset token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetTokenProblem {
    NotFound,
    Invalid,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(anyhow::Error),

    #[error("Queue error: {0}")]
    Queue(anyhow::Error),

    #[error("Email error: {0}")]
    Email(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthenticated.")]
    Unauthenticated,

    #[error("Failed to create access token: {0}")]
    TokenCreation(anyhow::Error),

    #[error("The {field} field is invalid: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error(transparent)]
    InvalidRole(#[from] InvalidRole),

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("Email already verified")]
    EmailAlreadyVerified,

    #[error("Invalid verification link")]
    InvalidVerificationSignature,

    #[error("User not found")]
    UserNotFound,

    #[error("Organization not found")]
    OrganizationNotFound,

    #[error("User is not a member of this organization")]
    NotOrganizationMember,

    #[error("{0}")]
    Forbidden(String),

    #[error("Invalid invitation token")]
    InvalidInvitationToken,

    #[error("Invitation not found")]
    InvitationNotFound,

    #[error("This invitation was sent to a different email address")]
    InvitationEmailMismatch,

    #[error("Invitation is no longer pending (status: {0})")]
    InvitationNotPending(InvitationStatus),

    #[error("Invitation has expired")]
    InvitationExpired,

    #[error("User is not registered")]
    UserNotRegistered { email: String, token: String },

    #[error("Failed to send invitation: {source}")]
    InvitationDispatch {
        organization_id: Uuid,
        email: String,
        #[source]
        source: Box<ServiceError>,
    },

    #[error("Invalid password reset token")]
    InvalidPasswordResetToken(ResetTokenProblem),

    #[error("Password reset token has expired")]
    PasswordResetTokenExpired,
}

impl ServiceError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Failures of the persistence/cache/queue/mail plumbing rather than of
    /// the caller's request.
    pub fn is_infrastructure(&self) -> bool {
        match self {
            ServiceError::Database(_)
            | ServiceError::Cache(_)
            | ServiceError::Queue(_)
            | ServiceError::Email(_)
            | ServiceError::Internal(_)
            | ServiceError::TokenCreation(_) => true,
            ServiceError::InvitationDispatch { source, .. } => source.is_infrastructure(),
            _ => false,
        }
    }
}

fn validation_errors(field: &'static str, message: String) -> validator::ValidationErrors {
    let mut errors = validator::ValidationErrors::new();
    errors.add(
        field,
        validator::ValidationError::new("invalid").with_message(message.into()),
    );
    errors
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Cache(e) | ServiceError::Queue(e) | ServiceError::Internal(e) => {
                AppError::InternalError(e)
            }
            ServiceError::Email(e) => AppError::EmailError(e),
            ServiceError::TokenCreation(e) => {
                AppError::InternalError(e.context("Failed to create access token"))
            }
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::Unauthenticated => AppError::Unauthorized(anyhow::anyhow!("Unauthenticated.")),
            ServiceError::Validation { field, message } => {
                AppError::ValidationError(validation_errors(field, message))
            }
            ServiceError::InvalidRole(e) => AppError::ValidationError(validation_errors("role", e.to_string())),
            ServiceError::EmailAlreadyRegistered => AppError::ValidationError(validation_errors(
                "email",
                "The email has already been taken.".to_string(),
            )),
            ServiceError::EmailAlreadyVerified => {
                AppError::BadRequest(anyhow::anyhow!("Email already verified"))
            }
            ServiceError::InvalidVerificationSignature => {
                AppError::BadRequest(anyhow::anyhow!("Invalid verification link"))
            }
            ServiceError::UserNotFound => AppError::NotFound(anyhow::anyhow!("User not found")),
            ServiceError::OrganizationNotFound => {
                AppError::NotFound(anyhow::anyhow!("Organization not found"))
            }
            ServiceError::NotOrganizationMember => AppError::AccessDenied {
                code: "NOT_ORGANIZATION_MEMBER",
                message: "User is not a member of this organization".to_string(),
            },
            ServiceError::Forbidden(message) => AppError::Forbidden(anyhow::anyhow!(message)),
            ServiceError::InvalidInvitationToken => {
                AppError::BadRequest(anyhow::anyhow!("Invalid invitation token"))
            }
            ServiceError::InvitationNotFound => {
                AppError::NotFound(anyhow::anyhow!("Invitation not found"))
            }
            ServiceError::InvitationEmailMismatch => AppError::Forbidden(anyhow::anyhow!(
                "This invitation was sent to a different email address"
            )),
            ServiceError::InvitationNotPending(status) => AppError::Conflict(anyhow::anyhow!(
                "Invitation is no longer pending (status: {})",
                status
            )),
            ServiceError::InvitationExpired => {
                AppError::BadRequest(anyhow::anyhow!("Invitation has expired"))
            }
            ServiceError::UserNotRegistered { .. } => {
                AppError::BadRequest(anyhow::anyhow!("User is not registered"))
            }
            ServiceError::InvitationDispatch { source, .. } => {
                if source.is_infrastructure() {
                    AppError::InternalError(anyhow::anyhow!("Failed to send invitation: {}", source))
                } else {
                    AppError::from(*source)
                }
            }
            ServiceError::InvalidPasswordResetToken(_) => {
                AppError::BadRequest(anyhow::anyhow!("Invalid password reset token"))
            }
            ServiceError::PasswordResetTokenExpired => {
                AppError::BadRequest(anyhow::anyhow!("Password reset token has expired"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_core::axum::http::StatusCode;

    #[test]
    fn domain_errors_map_to_client_statuses() {
        let cases = [
            (ServiceError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (ServiceError::InvalidInvitationToken, StatusCode::BAD_REQUEST),
            (ServiceError::InvitationEmailMismatch, StatusCode::FORBIDDEN),
            (ServiceError::NotOrganizationMember, StatusCode::FORBIDDEN),
            (
                ServiceError::validation("password", "too short"),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ServiceError::InvalidPasswordResetToken(ResetTokenProblem::NotFound),
                StatusCode::BAD_REQUEST,
            ),
            (ServiceError::PasswordResetTokenExpired, StatusCode::BAD_REQUEST),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }

    #[test]
    fn infrastructure_errors_become_server_errors() {
        let err = ServiceError::InvitationDispatch {
            organization_id: Uuid::new_v4(),
            email: "bob@x.com".to_string(),
            source: Box::new(ServiceError::Queue(anyhow::anyhow!("connection refused"))),
        };
        assert!(err.is_infrastructure());
        assert_eq!(
            AppError::from(err).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
