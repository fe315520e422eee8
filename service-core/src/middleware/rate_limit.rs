use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
};
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

/// Rate limiter keyed by client IP address
pub type IpRateLimiter = Arc<RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>>;

/// Allows `attempts` requests per `window_seconds` for each IP, with the whole
/// allowance available as a burst.
pub fn create_ip_rate_limiter(attempts: u32, window_seconds: u64) -> IpRateLimiter {
    let attempts = NonZeroU32::new(attempts).unwrap_or(NonZeroU32::MIN);
    let period = Duration::from_millis((window_seconds.max(1) * 1000) / u64::from(attempts.get()));
    let quota = Quota::with_period(period.max(Duration::from_millis(1)))
        .unwrap_or_else(|| Quota::per_second(attempts))
        .allow_burst(attempts);

    Arc::new(RateLimiter::dashmap(quota))
}

/// First `x-forwarded-for` hop, else the peer address from `ConnectInfo`.
pub fn client_ip(request: &Request) -> Option<IpAddr> {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
}

pub async fn ip_rate_limit_middleware(
    State(limiter): State<IpRateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(ip) = client_ip(&request) else {
        tracing::warn!("Could not determine IP for rate limiting");
        return Ok(next.run(request).await);
    };

    match limiter.check_key(&ip) {
        Ok(_) => Ok(next.run(request).await),
        Err(negative) => {
            let wait_time = negative.wait_time_from(DefaultClock::default().now());
            tracing::warn!(client_ip = %ip, "Rate limit exceeded");
            Err(AppError::TooManyRequests(
                "Too many requests from this IP. Please try again later.".to_string(),
                Some(wait_time.as_secs().max(1)),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router, body::Body, http::StatusCode, middleware::from_fn_with_state, routing::post,
    };
    use tower::ServiceExt;

    fn login_request(ip: &str) -> Request {
        Request::builder()
            .method("POST")
            .uri("/login")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn blocks_after_quota_per_ip() {
        let limiter = create_ip_rate_limiter(2, 60);
        let app = Router::new()
            .route("/login", post(|| async { "ok" }))
            .layer(from_fn_with_state(limiter, ip_rate_limit_middleware));

        for _ in 0..2 {
            let response = app.clone().oneshot(login_request("10.0.0.1")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(login_request("10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = app.oneshot(login_request("10.0.0.2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request), Some("203.0.113.7".parse().unwrap()));
    }
}
