use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidateEmail, ValidationError};

use crate::dtos::ErrorResponse;

/// JSON body extractor that also runs `validator` rules.
///
/// Malformed JSON is rejected with 400, failed validation with 422.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
            let err_resp = ErrorResponse {
                error: format!("Json parse error: {}", e),
            };
            (StatusCode::BAD_REQUEST, Json(err_resp)).into_response()
        })?;

        value.validate().map_err(|e| {
            let err_resp = ErrorResponse {
                error: format!("Validation error: {}", e),
            };
            (StatusCode::UNPROCESSABLE_ENTITY, Json(err_resp)).into_response()
        })?;

        Ok(ValidatedJson(value))
    }
}

pub fn is_valid_email(email: &str) -> bool {
    email.validate_email()
}

/// `validator` hook for password fields.
pub fn password_strength(password: &str) -> Result<(), ValidationError> {
    super::password::check_password_strength(password).map_err(|message| {
        ValidationError::new("password_strength").with_message(message.into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::post, Router};
    use serde::Deserialize;
    use tower::ServiceExt;

    #[derive(Deserialize, Validate)]
    struct Signup {
        #[validate(email)]
        email: String,
    }

    fn app() -> Router {
        Router::new().route(
            "/",
            post(|ValidatedJson(signup): ValidatedJson<Signup>| async move { signup.email }),
        )
    }

    fn post_json(body: &'static str) -> Request {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("Content-Type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn rejects_malformed_json_with_400() {
        let response = app().oneshot(post_json("{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_invalid_fields_with_422() {
        let response = app()
            .oneshot(post_json(r#"{"email": "nope"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn passes_valid_payload() {
        let response = app()
            .oneshot(post_json(r#"{"email": "bob@x.com"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn email_format() {
        assert!(is_valid_email("bob@x.com"));
        assert!(!is_valid_email("bob"));
        assert!(!is_valid_email(""));
    }
}
