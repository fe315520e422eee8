use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
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
    config::SameSitePolicy,
    dtos::{
        auth::{
            AuthResponse, CurrentUserResponse, ForgotPasswordRequest, LoginRequest,
            LogoutAllResponse, RegisterRequest, ResetPasswordRequest, VerificationResponse,
        },
        ErrorResponse, MessageResponse,
    },
    middleware::{AuthUser, BearerToken},
    models::{AuthenticatedUser, UserResponse},
    services::ServiceError,
    utils::ValidatedJson,
    AppState,
};

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    let session = &state.config.session;
    let mut cookie = Cookie::build((state.cookie_name.clone(), token))
        .path("/")
        .max_age(time::Duration::days(session.ttl_days))
        .secure(session.cookie_secure)
        .http_only(session.cookie_http_only)
        .same_site(match session.cookie_same_site {
            SameSitePolicy::Strict => SameSite::Strict,
            SameSitePolicy::Lax => SameSite::Lax,
            SameSitePolicy::None => SameSite::None,
        });
    if let Some(domain) = &session.cookie_domain {
        cookie = cookie.domain(domain.clone());
    }
    cookie.build()
}

fn with_session(state: &AppState, jar: CookieJar, user: &AuthenticatedUser) -> CookieJar {
    if state.config.session.cookie_enabled {
        jar.add(session_cookie(state, user.token.clone()))
    } else {
        jar
    }
}

fn auth_response(message: &str, user: AuthenticatedUser) -> AuthResponse {
    AuthResponse {
        message: message.to_string(),
        user: UserResponse::from(&user),
        token: user.token,
    }
}

/// Create an account and sign it in
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 422, description = "Validation error or email taken", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .auth_service
        .register(req, Some(state.config.session.ttl_days))
        .await?;
    let jar = with_session(&state, jar, &user);

    Ok((
        StatusCode::CREATED,
        jar,
        Json(auth_response(
            "Registration successful. Please verify your email address.",
            user,
        )),
    ))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .auth_service
        .login_session(&req.email, &req.password, state.config.session.ttl_days)
        .await?;
    let jar = with_session(&state, jar, &user);

    Ok((jar, Json(auth_response("Login successful", user))))
}

/// Revoke the token used for this request
#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    BearerToken(token): BearerToken,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.logout(&token).await?;
    let jar = jar.remove(Cookie::build(state.cookie_name.clone()).path("/"));
    Ok((jar, Json(MessageResponse::new("Logged out successfully"))))
}

/// Revoke every token of the current user
#[utoipa::path(
    post,
    path = "/logout/all",
    responses(
        (status = 200, description = "All sessions revoked", body = LogoutAllResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn logout_all(
    State(state): State<AppState>,
    jar: CookieJar,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let revoked = state.auth_service.logout_all(user.user_id).await?;
    let jar = jar.remove(Cookie::build(state.cookie_name.clone()).path("/"));
    Ok((
        jar,
        Json(LogoutAllResponse {
            message: "Logged out from all devices".to_string(),
            revoked,
        }),
    ))
}

/// The authenticated user
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = CurrentUserResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn me(AuthUser(user): AuthUser) -> Json<CurrentUserResponse> {
    Json(CurrentUserResponse {
        user: UserResponse::from(&user),
    })
}

/// Email a password reset link
#[utoipa::path(
    post,
    path = "/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset link sent", body = MessageResponse),
        (status = 422, description = "Unknown email or validation error", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse)
    ),
    tag = "Password Reset"
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .password_reset
        .request(&req.email)
        .await
        .map_err(|e| match e {
            ServiceError::UserNotFound => ServiceError::validation(
                "email",
                "We can't find a user with that email address.",
            ),
            other => other,
        })?;

    Ok(Json(MessageResponse::new(
        "We have emailed your password reset link.",
    )))
}

/// Set a new password with an emailed token
#[utoipa::path(
    post,
    path = "/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Invalid or expired token", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Password Reset"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .password_reset
        .reset(&req.email, &req.token, &req.password)
        .await?;

    Ok(Json(MessageResponse::new("Your password has been reset.")))
}

/// Confirm an email address from a signed link
#[utoipa::path(
    get,
    path = "/email/verify/{id}/{signature}",
    params(
        ("id" = Uuid, Path, description = "User id"),
        ("signature" = String, Path, description = "Link signature")
    ),
    responses(
        (status = 200, description = "Email verified", body = VerificationResponse),
        (status = 400, description = "Invalid link", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn verify_email(
    State(state): State<AppState>,
    Path((user_id, signature)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.verify_email(user_id, &signature).await?;
    Ok(Json(VerificationResponse {
        success: true,
        message: "Email verified successfully".to_string(),
    }))
}

/// Queue another verification email
#[utoipa::path(
    post,
    path = "/email/resend",
    responses(
        (status = 200, description = "Verification email queued", body = MessageResponse),
        (status = 400, description = "Already verified", body = ErrorResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn resend_verification(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.resend_verification(&user).await?;
    Ok(Json(MessageResponse::new("A new verification link has been sent.")))
}
