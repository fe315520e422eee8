pub mod auth;
pub mod organization;

pub use auth::{
    auth_middleware, extract_token, optional_auth_middleware, require_verified_email, AuthUser,
    BearerToken, MaybeAuthUser,
};
pub use organization::{ensure_same_organization, organization_guard, require_permission};
