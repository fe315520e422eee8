//! Organization scope guard.
//!
//! Runs after [`auth_middleware`](super::auth_middleware) and resolves the
//! user's current organization into an [`OrganizationContext`]. Handlers take
//! the tenant id from that context only.

use service_core::{
    axum::{
        async_trait,
        extract::{FromRequestParts, Request, State},
        http::request::Parts,
        middleware::Next,
        response::Response,
    },
    error::AppError,
};
use uuid::Uuid;

use crate::{
    models::{AuthenticatedUser, OrganizationContext, Permission},
    AppState,
};

fn denied(code: &'static str, message: &str) -> AppError {
    AppError::AccessDenied {
        code,
        message: message.to_string(),
    }
}

pub async fn organization_guard(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = req
        .extensions()
        .get::<AuthenticatedUser>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Unauthenticated.")))?;

    let Some(organization_id) = user.current_organization_id else {
        return Err(denied(
            "NO_ORGANIZATION",
            "No organization selected. Please create or join an organization.",
        ));
    };

    let Some(organization) = state.store.find_organization_by_id(organization_id).await? else {
        tracing::warn!(
            user_id = %user.user_id,
            organization_id = %organization_id,
            "Current organization no longer exists"
        );
        return Err(denied("ORGANIZATION_NOT_FOUND", "Organization not found."));
    };

    let Some(role) = state.roles.role_in(user.user_id, organization_id).await? else {
        tracing::warn!(
            user_id = %user.user_id,
            organization_id = %organization_id,
            "User is not a member of the current organization"
        );
        return Err(denied(
            "NOT_ORGANIZATION_MEMBER",
            "You are not a member of this organization.",
        ));
    };

    req.extensions_mut()
        .insert(OrganizationContext::new(organization, role.role));
    Ok(next.run(req).await)
}

/// 403 unless the context's role grants `permission`.
pub fn require_permission(ctx: &OrganizationContext, permission: Permission) -> Result<(), AppError> {
    if ctx.has_permission(permission) {
        Ok(())
    } else {
        Err(AppError::Forbidden(anyhow::anyhow!("Insufficient permissions")))
    }
}

/// Routes carrying an organization id may only address the guarded one.
pub fn ensure_same_organization(ctx: &OrganizationContext, organization_id: Uuid) -> Result<(), AppError> {
    if ctx.organization_id == organization_id {
        Ok(())
    } else {
        Err(denied(
            "ORGANIZATION_MISMATCH",
            "The requested organization is not your current organization.",
        ))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for OrganizationContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OrganizationContext>()
            .cloned()
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "Organization context missing from request extensions"
                ))
            })
    }
}
