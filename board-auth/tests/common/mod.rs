//! Shared harness for the board-auth integration tests.
//!
//! Builds the real router over the in-memory store, cache, queue and mailer,
//! and drives it with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use board_auth::{
    build_router,
    config::BoardConfig,
    models::NotificationEvent,
    services::{
        EmailKind, EmailVerifier, MemoryCache, MemoryQueue, MemoryStore, MockMailer,
        NotificationDispatcher, NotificationWorker, UserStore, WorkerSettings,
    },
    AppState,
};
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "Secure#Pass1";

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
    pub queue: Arc<MemoryQueue>,
    pub mailer: Arc<MockMailer>,
}

/// A registered account and the token it signed in with.
pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub token: String,
}

pub fn test_config(overrides: &[(&str, &str)]) -> BoardConfig {
    let mut vars: HashMap<String, String> = [
        ("ENVIRONMENT", "dev"),
        ("APP_NAME", "board"),
        ("APP_URL", "http://localhost:8080"),
        ("FRONTEND_URL", "http://localhost:3000"),
        ("INVITATION_DOMAIN", "board.localhost"),
        ("INVITATION_LOCAL_PORT", "8000"),
        ("EMAIL_VERIFICATION_SECRET", "integration-test-secret"),
        ("ENABLE_SWAGGER", "disabled"),
        ("RATE_LIMIT_LOGIN_ATTEMPTS", "1000"),
        ("RATE_LIMIT_REGISTER_ATTEMPTS", "1000"),
        ("RATE_LIMIT_PASSWORD_RESET_ATTEMPTS", "1000"),
        ("RATE_LIMIT_GLOBAL_IP_LIMIT", "10000"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }

    BoardConfig::from_source(service_core::config::Config::default(), |key| {
        vars.get(key).cloned()
    })
    .expect("test config")
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::with_config(test_config(&[]))
    }

    pub fn with_config(config: BoardConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let queue = Arc::new(MemoryQueue::new());
        let mailer = Arc::new(MockMailer::new());

        let state = AppState::new(
            config,
            store.clone(),
            cache.clone(),
            queue.clone(),
            mailer.clone(),
        )
        .expect("app state");

        Self {
            router: build_router(state.clone()),
            state,
            store,
            cache,
            queue,
            mailer,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", "203.0.113.10");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn register(&self, name: &str, email: &str) -> TestUser {
        let response = self
            .post(
                "/register",
                None,
                json!({ "name": name, "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);

        TestUser {
            id: response.body["user"]["id"].as_str().unwrap().parse().unwrap(),
            email: email.to_string(),
            token: response.body["token"].as_str().unwrap().to_string(),
        }
    }

    pub async fn register_verified(&self, name: &str, email: &str) -> TestUser {
        let user = self.register(name, email).await;
        self.store
            .mark_email_verified(user.id, chrono::Utc::now())
            .await
            .unwrap();
        user
    }

    pub async fn login(&self, email: &str) -> String {
        let response = self
            .post("/login", None, json!({ "email": email, "password": PASSWORD }))
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        response.body["token"].as_str().unwrap().to_string()
    }

    /// Create an organization as `owner` and return its id.
    pub async fn create_organization(&self, owner: &TestUser, name: &str, subdomain: &str) -> Uuid {
        let response = self
            .post(
                "/organizations",
                Some(&owner.token),
                json!({ "name": name, "subdomain": subdomain }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["organization"]["id"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap()
    }

    pub fn dispatcher(&self) -> NotificationDispatcher {
        let config = &self.state.config;
        NotificationDispatcher::new(
            self.store.clone(),
            self.cache.clone(),
            self.mailer.clone(),
            config.invitation_links(),
            EmailVerifier::new(&config.verification.secret, &config.app.url).unwrap(),
            config.notifications.dedup_ttl_seconds,
        )
    }

    pub fn worker(&self, max_attempts: u32) -> NotificationWorker {
        NotificationWorker::new(
            self.queue.clone(),
            Arc::new(self.dispatcher()),
            WorkerSettings {
                max_attempts,
                retry_backoff: Duration::from_millis(5),
                poll_timeout: Duration::from_millis(50),
            },
        )
    }

    /// Deliver every queued notification.
    pub async fn drain_notifications(&self) {
        let worker = self.worker(3);
        while worker.process_next().await.unwrap().is_some() {}
    }

    pub fn queued_events(&self) -> Vec<NotificationEvent> {
        self.queue.pending().into_iter().map(|n| n.event).collect()
    }

    /// Last mailed link of `kind` to `to`.
    pub fn last_link(&self, kind: EmailKind, to: &str) -> String {
        self.mailer
            .sent_to(to)
            .into_iter()
            .rev()
            .find(|m| m.kind == kind)
            .map(|m| m.url)
            .expect("no matching email")
    }
}

/// Path part of an absolute URL.
pub fn path_of(url: &str) -> String {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    match without_scheme.find('/') {
        Some(index) => without_scheme[index..].to_string(),
        None => "/".to_string(),
    }
}
