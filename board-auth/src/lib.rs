pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{openapi::security::SecurityScheme, Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{BoardConfig, SwaggerMode};
use crate::middleware::{
    auth_middleware, optional_auth_middleware, organization_guard, require_verified_email,
};
use crate::services::{
    AuthService, CacheStore, EmailVerifier, InvitationService, Mailer, NotificationQueue,
    OrganizationService, PasswordResetService, RoleResolver, Store, TokenService,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::logout_all,
        handlers::auth::me,
        handlers::auth::forgot_password,
        handlers::auth::reset_password,
        handlers::auth::verify_email,
        handlers::auth::resend_verification,
        handlers::organization::validate_subdomain,
        handlers::organization::subdomain_details,
        handlers::organization::create_organization,
        handlers::organization::switch_organization,
        handlers::organization::current_organization,
        handlers::organization::list_members,
        handlers::organization::update_settings,
        handlers::invitation::invite,
        handlers::invitation::revoke_invitation,
        handlers::invitation::accept_invitation,
        handlers::invitation::invitation_details,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::auth::RegisterRequest,
            dtos::auth::LoginRequest,
            dtos::auth::AuthResponse,
            dtos::auth::CurrentUserResponse,
            dtos::auth::LogoutAllResponse,
            dtos::auth::ForgotPasswordRequest,
            dtos::auth::ResetPasswordRequest,
            dtos::auth::VerificationResponse,
            dtos::organization::CreateOrganizationRequest,
            dtos::organization::SubdomainAvailability,
            dtos::organization::UpdateSettingsRequest,
            dtos::organization::SwitchOrganizationRequest,
            dtos::organization::CurrentOrganizationResponse,
            dtos::organization::MembersResponse,
            dtos::organization::OrganizationDetailsResponse,
            dtos::invitation::InviteRequest,
            dtos::invitation::InviteResponse,
            dtos::invitation::AcceptInvitationRequest,
            dtos::invitation::AcceptInvitationResponse,
            dtos::invitation::AcceptStatus,
            models::UserResponse,
            models::OrganizationResponse,
            models::OrganizationDetails,
            models::OwnerSummary,
            models::OrganizationMember,
            models::InvitationResponse,
            models::InvitationStatus,
            models::Role,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Registration, sessions and email verification"),
        (name = "Password Reset", description = "Emailed password reset tokens"),
        (name = "Organizations", description = "Tenancy and organization settings"),
        (name = "Invitations", description = "Organization invitations"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BoardConfig>,
    pub cookie_name: String,
    pub store: Arc<dyn Store>,
    pub cache: Arc<dyn CacheStore>,
    pub queue: Arc<dyn NotificationQueue>,
    pub tokens: TokenService,
    pub roles: RoleResolver,
    pub auth_service: AuthService,
    pub organizations: OrganizationService,
    pub invitations: InvitationService,
    pub password_reset: PasswordResetService,
    pub login_rate_limiter: IpRateLimiter,
    pub register_rate_limiter: IpRateLimiter,
    pub password_reset_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire every service over the given backends.
    pub fn new(
        config: BoardConfig,
        store: Arc<dyn Store>,
        cache: Arc<dyn CacheStore>,
        queue: Arc<dyn NotificationQueue>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, AppError> {
        let verifier = EmailVerifier::new(&config.verification.secret, &config.app.url)
            .map_err(AppError::ConfigError)?;

        let tokens = TokenService::new(store.clone(), config.role_freshness());
        let roles = RoleResolver::new(store.clone());
        let auth_service = AuthService::new(
            store.clone(),
            tokens.clone(),
            roles.clone(),
            queue.clone(),
            cache.clone(),
            verifier,
        );
        let organizations = OrganizationService::new(store.clone());
        let invitations =
            InvitationService::new(store.clone(), queue.clone(), config.invitations.expiry_hours);
        let password_reset = PasswordResetService::new(
            store.clone(),
            mailer,
            tokens.clone(),
            &config.app.frontend_url,
            config.password_reset.ttl_minutes,
        );

        let limits = &config.rate_limit;
        let login_rate_limiter =
            create_ip_rate_limiter(limits.login_attempts, limits.login_window_seconds);
        let register_rate_limiter =
            create_ip_rate_limiter(limits.register_attempts, limits.register_window_seconds);
        let password_reset_rate_limiter = create_ip_rate_limiter(
            limits.password_reset_attempts,
            limits.password_reset_window_seconds,
        );
        let ip_rate_limiter =
            create_ip_rate_limiter(limits.global_ip_limit, limits.global_ip_window_seconds);

        Ok(Self {
            cookie_name: config.app.cookie_name(),
            config: Arc::new(config),
            store,
            cache,
            queue,
            tokens,
            roles,
            auth_service,
            organizations,
            invitations,
            password_reset,
            login_rate_limiter,
            register_rate_limiter,
            password_reset_rate_limiter,
            ip_rate_limiter,
        })
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
}

pub fn build_router(state: AppState) -> Router {
    let login_route = Router::new()
        .route("/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let register_route = Router::new()
        .route("/register", post(handlers::auth::register))
        .layer(from_fn_with_state(
            state.register_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let forgot_password_route = Router::new()
        .route("/forgot-password", post(handlers::auth::forgot_password))
        .layer(from_fn_with_state(
            state.password_reset_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let accept_route = Router::new()
        .route(
            "/organizations/invitations/accept",
            post(handlers::invitation::accept_invitation),
        )
        .layer(from_fn_with_state(state.clone(), optional_auth_middleware));

    let authenticated_routes = Router::new()
        .route("/auth/me", get(handlers::auth::me))
        .route("/logout", post(handlers::auth::logout))
        .route("/logout/all", post(handlers::auth::logout_all))
        .route("/email/resend", post(handlers::auth::resend_verification))
        .route(
            "/organizations/subdomain/validate",
            get(handlers::organization::validate_subdomain),
        )
        .route(
            "/organizations/subdomain/details/:subdomain",
            get(handlers::organization::subdomain_details),
        )
        .route(
            "/users/me/current-organization",
            put(handlers::organization::switch_organization),
        )
        .merge(
            Router::new()
                .route(
                    "/organizations",
                    post(handlers::organization::create_organization),
                )
                .layer(from_fn(require_verified_email)),
        )
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let organization_routes = Router::new()
        .route(
            "/organizations/current",
            get(handlers::organization::current_organization),
        )
        .route(
            "/organizations/current/members",
            get(handlers::organization::list_members),
        )
        .route(
            "/organizations/:id/invitations/:invitation_id",
            delete(handlers::invitation::revoke_invitation),
        )
        .merge(
            Router::new()
                .route("/organizations/:id/invite", post(handlers::invitation::invite))
                .route(
                    "/organizations/:id/settings",
                    put(handlers::organization::update_settings),
                )
                .layer(from_fn(require_verified_email)),
        )
        .layer(from_fn_with_state(state.clone(), organization_guard))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route(
            "/email/verify/:id/:signature",
            get(handlers::auth::verify_email),
        )
        .route("/reset-password", post(handlers::auth::reset_password))
        .route(
            "/organizations/invitations/details/:token",
            get(handlers::invitation::invitation_details),
        )
        .merge(login_route)
        .merge(register_route)
        .merge(forgot_password_route)
        .merge(accept_route)
        .merge(authenticated_routes)
        .merge(organization_routes);

    match state.config.swagger.enabled {
        SwaggerMode::Public => {
            app = app.merge(
                SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()),
            );
        }
        SwaggerMode::Authenticated => {
            let docs: Router<AppState> = Router::new()
                .merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()))
                .layer(from_fn_with_state(state.clone(), auth_middleware));
            app = app.merge(docs);
        }
        SwaggerMode::Disabled => {}
    }

    app.with_state(state.clone())
        .layer(from_fn_with_state(
            state.ip_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config.security.allowed_origins))
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "A dependency is unavailable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        AppError::ServiceUnavailable
    })?;

    state.cache.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Redis health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "database": "up",
            "cache": "up"
        }
    })))
}
