//! Bearer-token authentication.
//!
//! The token is read from `Authorization: Bearer <token>`, falling back to
//! the `<app>_auth_token` cookie. A resolved token attaches the
//! [`AuthenticatedUser`] and the raw [`BearerToken`] to request extensions.

use axum_extra::extract::cookie::CookieJar;
use service_core::{
    axum::{
        async_trait,
        extract::{FromRequestParts, Request, State},
        http::{header, request::Parts, HeaderMap},
        middleware::Next,
        response::Response,
    },
    error::AppError,
};

use crate::{models::AuthenticatedUser, AppState};

/// The plaintext token the current request authenticated with.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

fn unauthenticated() -> AppError {
    AppError::Unauthorized(anyhow::anyhow!("Unauthenticated."))
}

/// Bearer header first, then the auth cookie.
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    CookieJar::from_headers(headers)
        .get(cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

async fn resolve(
    state: &AppState,
    token: Option<String>,
) -> Result<Option<(AuthenticatedUser, String)>, AppError> {
    let Some(token) = token else {
        return Ok(None);
    };
    let user = state.tokens.resolve(&token).await?;
    Ok(user.map(|user| (user, token)))
}

/// Rejects the request with 401 unless a valid token is presented.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(req.headers(), &state.cookie_name);
    let (user, token) = resolve(&state, token).await?.ok_or_else(unauthenticated)?;

    req.extensions_mut().insert(user);
    req.extensions_mut().insert(BearerToken(token));
    Ok(next.run(req).await)
}

/// Attaches the user when a valid token is presented; anonymous requests
/// pass through unchanged.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(req.headers(), &state.cookie_name);
    if let Some((user, token)) = resolve(&state, token).await? {
        req.extensions_mut().insert(user);
        req.extensions_mut().insert(BearerToken(token));
    }
    Ok(next.run(req).await)
}

/// 403 `EMAIL_NOT_VERIFIED` for users who have not confirmed their address.
/// Must run after [`auth_middleware`].
pub async fn require_verified_email(req: Request, next: Next) -> Result<Response, AppError> {
    let user = req
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(unauthenticated)?;

    if !user.email_verified {
        tracing::debug!(user_id = %user.user_id, "Rejected request from unverified user");
        return Err(AppError::AccessDenied {
            code: "EMAIL_NOT_VERIFIED",
            message: "Your email address is not verified.".to_string(),
        });
    }

    Ok(next.run(req).await)
}

/// Required authenticated user.
pub struct AuthUser(pub AuthenticatedUser);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(unauthenticated)
    }
}

/// Authenticated user if the request carried a valid token.
pub struct MaybeAuthUser(pub Option<AuthenticatedUser>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(parts.extensions.get::<AuthenticatedUser>().cloned()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<BearerToken>()
            .cloned()
            .ok_or_else(unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_core::axum::http::HeaderValue;

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        headers.insert(header::COOKIE, HeaderValue::from_static("board_auth_token=from-cookie"));

        assert_eq!(
            extract_token(&headers, "board_auth_token").as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn cookie_is_used_without_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; board_auth_token=from-cookie"),
        );

        assert_eq!(
            extract_token(&headers, "board_auth_token").as_deref(),
            Some("from-cookie")
        );
        assert_eq!(extract_token(&headers, "other_auth_token"), None);
    }

    #[test]
    fn malformed_authorization_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(extract_token(&headers, "board_auth_token"), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_token(&headers, "board_auth_token"), None);
    }
}
