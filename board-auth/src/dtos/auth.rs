use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::UserResponse;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 255, message = "The name field is required"))]
    #[schema(example = "Bob Smith")]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "bob@example.com")]
    pub email: String,

    #[validate(custom(function = "crate::utils::validation::password_strength"))]
    #[schema(example = "Secure#Pass1", min_length = 8)]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    #[schema(example = "bob@example.com")]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "Secure#Pass1")]
    pub password: String,
}

/// Login and registration response.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    #[schema(example = "Login successful")]
    pub message: String,
    pub user: UserResponse,
    #[schema(example = "3f5c0e...")]
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentUserResponse {
    pub user: UserResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogoutAllResponse {
    #[schema(example = "Logged out from all devices")]
    pub message: String,
    pub revoked: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "bob@example.com")]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "bob@example.com")]
    pub email: String,

    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    #[validate(custom(function = "crate::utils::validation::password_strength"))]
    #[schema(example = "Secure#Pass2", min_length = 8)]
    pub password: String,

    #[validate(must_match(other = "password", message = "The password confirmation does not match"))]
    pub password_confirmation: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerificationResponse {
    pub success: bool,
    #[schema(example = "Email verified successfully")]
    pub message: String,
}
