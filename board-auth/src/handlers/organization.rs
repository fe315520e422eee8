use service_core::{
    axum::{
        extract::{Path, Query, State},
        http::StatusCode,
        response::IntoResponse,
        Json,
    },
    error::AppError,
};
use uuid::Uuid;

use crate::{
    dtos::organization::{
        CreateOrganizationRequest, CurrentOrganizationResponse, MembersResponse,
        OrganizationDetailsResponse, SubdomainAvailability, SubdomainQuery,
        SwitchOrganizationRequest, UpdateSettingsRequest,
    },
    middleware::{ensure_same_organization, require_permission, AuthUser},
    models::{OrganizationContext, OrganizationResponse, Permission, Role},
    services::ServiceError,
    utils::ValidatedJson,
    AppState,
};

/// Check whether a subdomain can be claimed
#[utoipa::path(
    get,
    path = "/organizations/subdomain/validate",
    params(SubdomainQuery),
    responses(
        (status = 200, description = "Availability verdict", body = SubdomainAvailability),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    ),
    tag = "Organizations",
    security(("bearer_auth" = []))
)]
pub async fn validate_subdomain(
    State(state): State<AppState>,
    Query(query): Query<SubdomainQuery>,
) -> Result<impl IntoResponse, AppError> {
    let subdomain = query.subdomain.trim().to_lowercase();

    let (available, message) = match state.organizations.validate_subdomain(&subdomain).await {
        Ok(()) => (true, "Subdomain is available".to_string()),
        Err(ServiceError::Validation { message, .. }) => (false, message),
        Err(e) => return Err(e.into()),
    };

    Ok(Json(SubdomainAvailability {
        subdomain,
        available,
        message,
    }))
}

/// Public details of the organization owning a subdomain
#[utoipa::path(
    get,
    path = "/organizations/subdomain/details/{subdomain}",
    params(("subdomain" = String, Path, description = "Organization subdomain")),
    responses(
        (status = 200, description = "Organization details", body = OrganizationDetailsResponse),
        (status = 404, description = "Organization not found", body = ErrorResponse)
    ),
    tag = "Organizations",
    security(("bearer_auth" = []))
)]
pub async fn subdomain_details(
    State(state): State<AppState>,
    Path(subdomain): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let organization = state
        .organizations
        .details_by_subdomain(&subdomain.to_lowercase())
        .await?;
    Ok(Json(OrganizationDetailsResponse { organization }))
}

/// Create an organization owned by the current user
#[utoipa::path(
    post,
    path = "/organizations",
    request_body = CreateOrganizationRequest,
    responses(
        (status = 201, description = "Organization created", body = CurrentOrganizationResponse),
        (status = 403, description = "Email not verified", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Organizations",
    security(("bearer_auth" = []))
)]
pub async fn create_organization(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateOrganizationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let organization = state
        .organizations
        .create(user.user_id, &req.name, req.subdomain.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CurrentOrganizationResponse {
            organization: organization.into(),
            role: Role::Owner,
        }),
    ))
}

/// Change the organization subsequent requests are scoped to
#[utoipa::path(
    put,
    path = "/users/me/current-organization",
    request_body = SwitchOrganizationRequest,
    responses(
        (status = 200, description = "Current organization changed", body = CurrentOrganizationResponse),
        (status = 403, description = "Not a member", body = ErrorResponse),
        (status = 404, description = "Organization not found", body = ErrorResponse)
    ),
    tag = "Organizations",
    security(("bearer_auth" = []))
)]
pub async fn switch_organization(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<SwitchOrganizationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (organization, role) = state
        .organizations
        .switch_current_organization(user.user_id, req.organization_id)
        .await?;

    Ok(Json(CurrentOrganizationResponse {
        organization: organization.into(),
        role,
    }))
}

/// The organization the request is scoped to
#[utoipa::path(
    get,
    path = "/organizations/current",
    responses(
        (status = 200, description = "Current organization", body = CurrentOrganizationResponse),
        (status = 403, description = "No organization, organization missing or not a member", body = ErrorResponse)
    ),
    tag = "Organizations",
    security(("bearer_auth" = []))
)]
pub async fn current_organization(ctx: OrganizationContext) -> Json<CurrentOrganizationResponse> {
    Json(CurrentOrganizationResponse {
        role: ctx.role,
        organization: ctx.organization.into(),
    })
}

#[utoipa::path(
    get,
    path = "/organizations/current/members",
    responses(
        (status = 200, description = "Members of the current organization", body = MembersResponse),
        (status = 403, description = "No organization, organization missing or not a member", body = ErrorResponse)
    ),
    tag = "Organizations",
    security(("bearer_auth" = []))
)]
pub async fn list_members(
    State(state): State<AppState>,
    ctx: OrganizationContext,
) -> Result<impl IntoResponse, AppError> {
    require_permission(&ctx, Permission::Read)?;
    let members = state.organizations.members(&ctx).await?;
    Ok(Json(MembersResponse {
        organization_id: ctx.organization_id,
        members,
    }))
}

/// Merge keys into the organization's settings
#[utoipa::path(
    put,
    path = "/organizations/{id}/settings",
    params(("id" = Uuid, Path, description = "Organization id")),
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Settings updated", body = OrganizationResponse),
        (status = 403, description = "Insufficient permissions", body = ErrorResponse)
    ),
    tag = "Organizations",
    security(("bearer_auth" = []))
)]
pub async fn update_settings(
    State(state): State<AppState>,
    ctx: OrganizationContext,
    Path(organization_id): Path<Uuid>,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<impl IntoResponse, AppError> {
    ensure_same_organization(&ctx, organization_id)?;
    let organization = state.organizations.update_settings(&ctx, req.settings).await?;
    Ok(Json(OrganizationResponse::from(organization)))
}
