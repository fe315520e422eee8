use service_core::{
    axum::{
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
        Json,
    },
    error::AppError,
};
use uuid::Uuid;

use crate::{
    dtos::{
        invitation::{
            AcceptInvitationRequest, AcceptInvitationResponse, InviteRequest, InviteResponse,
        },
        organization::OrganizationDetailsResponse,
        ErrorResponse,
    },
    middleware::{ensure_same_organization, AuthUser, MaybeAuthUser},
    models::{InvitationResponse, OrganizationContext},
    services::{AcceptOutcome, ServiceError},
    utils::ValidatedJson,
    AppState,
};

/// Invite an email address into the current organization
#[utoipa::path(
    post,
    path = "/organizations/{id}/invite",
    params(("id" = Uuid, Path, description = "Organization id")),
    request_body = InviteRequest,
    responses(
        (status = 201, description = "Invitation created and queued", body = InviteResponse),
        (status = 403, description = "Not allowed to invite", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Invitation could not be queued", body = ErrorResponse)
    ),
    tag = "Invitations",
    security(("bearer_auth" = []))
)]
pub async fn invite(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ctx: OrganizationContext,
    Path(organization_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<InviteRequest>,
) -> Result<impl IntoResponse, AppError> {
    ensure_same_organization(&ctx, organization_id)?;

    let invitation = state
        .invitations
        .create_invitation(&ctx, user.user_id, &req.email, req.role)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(InviteResponse {
            message: "Invitation sent successfully".to_string(),
            invitation: invitation.into(),
        }),
    ))
}

/// Withdraw a pending invitation
#[utoipa::path(
    delete,
    path = "/organizations/{id}/invitations/{invitation_id}",
    params(
        ("id" = Uuid, Path, description = "Organization id"),
        ("invitation_id" = Uuid, Path, description = "Invitation id")
    ),
    responses(
        (status = 200, description = "Invitation revoked", body = InvitationResponse),
        (status = 404, description = "Invitation not found", body = ErrorResponse),
        (status = 409, description = "Invitation is no longer pending", body = ErrorResponse)
    ),
    tag = "Invitations",
    security(("bearer_auth" = []))
)]
pub async fn revoke_invitation(
    State(state): State<AppState>,
    ctx: OrganizationContext,
    Path((organization_id, invitation_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    ensure_same_organization(&ctx, organization_id)?;
    let invitation = state.invitations.revoke_invitation(&ctx, invitation_id).await?;
    Ok(Json(InvitationResponse::from(invitation)))
}

/// Accept an invitation
///
/// Anonymous callers get `user_not_registered` with the invitation's email and
/// token so the client can continue with registration.
#[utoipa::path(
    post,
    path = "/organizations/invitations/accept",
    request_body = AcceptInvitationRequest,
    responses(
        (status = 200, description = "Invitation accepted", body = AcceptInvitationResponse),
        (status = 400, description = "User not registered or invitation unusable", body = AcceptInvitationResponse)
    ),
    tag = "Invitations"
)]
pub async fn accept_invitation(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    ValidatedJson(req): ValidatedJson<AcceptInvitationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = match state
        .invitations
        .accept_invitation(&req.token, user.as_ref())
        .await
    {
        Ok(AcceptOutcome::Accepted(invitation)) => (
            StatusCode::OK,
            AcceptInvitationResponse::accepted(
                "Invitation accepted successfully!",
                invitation.organization_id,
            ),
        ),
        Ok(AcceptOutcome::AlreadyAccepted(invitation)) => (
            StatusCode::OK,
            AcceptInvitationResponse::accepted(
                "Invitation was already accepted.",
                invitation.organization_id,
            ),
        ),
        Err(ServiceError::UserNotRegistered { email, token }) => (
            StatusCode::BAD_REQUEST,
            AcceptInvitationResponse::not_registered(email, token),
        ),
        Err(e) if e.is_infrastructure() => return Err(e.into()),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            AcceptInvitationResponse::error(e.to_string()),
        ),
    };

    Ok((response.0, Json(response.1)))
}

/// Public view of the organization behind an invitation token
#[utoipa::path(
    get,
    path = "/organizations/invitations/details/{token}",
    params(("token" = String, Path, description = "Invitation token")),
    responses(
        (status = 200, description = "Inviting organization", body = OrganizationDetailsResponse),
        (status = 400, description = "Invalid invitation token", body = ErrorResponse)
    ),
    tag = "Invitations"
)]
pub async fn invitation_details(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let organization = state.invitations.organization_details(&token).await?;
    Ok(Json(OrganizationDetailsResponse { organization }))
}
