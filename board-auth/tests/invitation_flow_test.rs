mod common;

use axum::http::{Method, StatusCode};
use board_auth::{
    models::InvitationStatus,
    services::{EmailKind, InvitationStore},
};
use common::{TestApp, TestUser};
use serde_json::json;
use uuid::Uuid;

struct Acme {
    app: TestApp,
    alice: TestUser,
    org_id: Uuid,
}

async fn acme() -> Acme {
    let app = TestApp::spawn();
    let alice = app.register_verified("Alice", "alice@acme.com").await;
    let org_id = app.create_organization(&alice, "Acme Corp", "acme").await;
    Acme { app, alice, org_id }
}

impl Acme {
    /// Invite `email` and deliver the email. Returns (invitation id, token).
    async fn invite(&self, email: &str) -> (Uuid, String) {
        let response = self
            .app
            .post(
                &format!("/organizations/{}/invite", self.org_id),
                Some(&self.alice.token),
                json!({ "email": email }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        assert_eq!(response.body["invitation"]["status"], "pending");
        assert_eq!(response.body["invitation"]["role"], "member");

        self.app.drain_notifications().await;
        let link = self.app.last_link(EmailKind::Invitation, email);
        let token = link.rsplit('/').next().unwrap().to_string();
        let id = response.body["invitation"]["id"].as_str().unwrap().parse().unwrap();
        (id, token)
    }

    async fn accept(&self, token: &str, as_user: Option<&str>) -> common::TestResponse {
        self.app
            .post(
                "/organizations/invitations/accept",
                as_user,
                json!({ "token": token }),
            )
            .await
    }

    async fn status_of(&self, token: &str) -> InvitationStatus {
        self.app
            .store
            .find_invitation_by_token(token)
            .await
            .unwrap()
            .unwrap()
            .status
    }
}

#[tokio::test]
async fn invited_user_joins_after_registering() {
    let acme = acme().await;
    let (_, token) = acme.invite("bob@acme.com").await;

    let link = acme.app.last_link(EmailKind::Invitation, "bob@acme.com");
    assert_eq!(
        link,
        format!("http://acme.board.localhost:8000/invitations/accept/{}", token)
    );

    let anonymous = acme.accept(&token, None).await;
    assert_eq!(anonymous.status, StatusCode::BAD_REQUEST);
    assert_eq!(anonymous.body["status"], "user_not_registered");
    assert_eq!(anonymous.body["email"], "bob@acme.com");
    assert_eq!(anonymous.body["token"], token);
    assert_eq!(acme.status_of(&token).await, InvitationStatus::Pending);

    let bob = acme.app.register("Bob", "bob@acme.com").await;
    let accepted = acme.accept(&token, Some(&bob.token)).await;
    assert_eq!(accepted.status, StatusCode::OK, "{}", accepted.body);
    assert_eq!(accepted.body["status"], "invitation_accepted");
    assert_eq!(accepted.body["organization_id"], acme.org_id.to_string());
    assert_eq!(acme.status_of(&token).await, InvitationStatus::Accepted);

    let current = acme.app.get("/organizations/current", Some(&bob.token)).await;
    assert_eq!(current.status, StatusCode::OK);
    assert_eq!(current.body["organization"]["id"], acme.org_id.to_string());
    assert_eq!(current.body["role"], "member");

    let members = acme
        .app
        .get("/organizations/current/members", Some(&acme.alice.token))
        .await;
    assert_eq!(members.body["members"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn accepting_twice_is_a_no_op() {
    let acme = acme().await;
    let (_, token) = acme.invite("bob@acme.com").await;
    let bob = acme.app.register("Bob", "bob@acme.com").await;

    assert_eq!(acme.accept(&token, Some(&bob.token)).await.status, StatusCode::OK);
    let again = acme.accept(&token, Some(&bob.token)).await;

    assert_eq!(again.status, StatusCode::OK);
    assert_eq!(again.body["status"], "invitation_accepted");
    assert_eq!(acme.status_of(&token).await, InvitationStatus::Accepted);
}

#[tokio::test]
async fn wrong_account_cannot_accept() {
    let acme = acme().await;
    let (_, token) = acme.invite("bob@acme.com").await;
    let carol = acme.app.register("Carol", "carol@acme.com").await;

    let response = acme.accept(&token, Some(&carol.token)).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["status"], "error");
    assert_eq!(acme.status_of(&token).await, InvitationStatus::Pending);

    let scoped = acme.app.get("/organizations/current", Some(&carol.token)).await;
    assert_eq!(scoped.body["code"], "NO_ORGANIZATION");
}

#[tokio::test]
async fn address_match_ignores_case() {
    let acme = acme().await;
    let (_, token) = acme.invite("Bob@Acme.com").await;
    let bob = acme.app.register("Bob", "bob@acme.com").await;

    let response = acme.accept(&token, Some(&bob.token)).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_token_is_rejected() {
    let acme = acme().await;
    let bob = acme.app.register("Bob", "bob@acme.com").await;

    let response = acme.accept("not-a-token", Some(&bob.token)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["status"], "error");
    assert_eq!(response.body["message"], "Invalid invitation token");

    let details = acme
        .app
        .get("/organizations/invitations/details/not-a-token", None)
        .await;
    assert_eq!(details.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn expired_invitation_is_marked_expired_on_accept() {
    let acme = acme().await;
    let (id, token) = acme.invite("bob@acme.com").await;
    acme.app.store.modify_invitation(id, |invitation| {
        invitation.expiry_utc = chrono::Utc::now() - chrono::Duration::minutes(1);
    });
    let bob = acme.app.register("Bob", "bob@acme.com").await;

    let response = acme.accept(&token, Some(&bob.token)).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["message"], "Invitation has expired");
    assert_eq!(acme.status_of(&token).await, InvitationStatus::Expired);
}

#[tokio::test]
async fn revoked_invitation_cannot_be_accepted() {
    let acme = acme().await;
    let (id, token) = acme.invite("bob@acme.com").await;

    let revoked = acme
        .app
        .request(
            Method::DELETE,
            &format!("/organizations/{}/invitations/{}", acme.org_id, id),
            Some(&acme.alice.token),
            None,
        )
        .await;
    assert_eq!(revoked.status, StatusCode::OK);
    assert_eq!(revoked.body["status"], "revoked");

    let bob = acme.app.register("Bob", "bob@acme.com").await;
    let response = acme.accept(&token, Some(&bob.token)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(acme.status_of(&token).await, InvitationStatus::Revoked);

    let again = acme
        .app
        .request(
            Method::DELETE,
            &format!("/organizations/{}/invitations/{}", acme.org_id, id),
            Some(&acme.alice.token),
            None,
        )
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn invitation_details_are_public() {
    let acme = acme().await;
    let (_, token) = acme.invite("bob@acme.com").await;

    let response = acme
        .app
        .get(&format!("/organizations/invitations/details/{}", token), None)
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["organization"]["id"], acme.org_id.to_string());
    assert_eq!(response.body["organization"]["name"], "Acme Corp");
    assert_eq!(response.body["organization"]["owner"]["name"], "Alice");
    assert!(response.body["organization"]["subdomain"].is_null());
}

#[tokio::test]
async fn members_cannot_invite() {
    let acme = acme().await;
    let (_, token) = acme.invite("bob@acme.com").await;
    let bob = acme.app.register_verified("Bob", "bob@acme.com").await;
    acme.accept(&token, Some(&bob.token)).await;

    let response = acme
        .app
        .post(
            &format!("/organizations/{}/invite", acme.org_id),
            Some(&bob.token),
            json!({ "email": "carol@acme.com" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn owner_role_cannot_be_invited() {
    let acme = acme().await;

    let response = acme
        .app
        .post(
            &format!("/organizations/{}/invite", acme.org_id),
            Some(&acme.alice.token),
            json!({ "email": "bob@acme.com", "role": "owner" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn queue_failure_surfaces_as_server_error() {
    let acme = acme().await;
    acme.app.queue.set_fail_enqueue(true);

    let response = acme
        .app
        .post(
            &format!("/organizations/{}/invite", acme.org_id),
            Some(&acme.alice.token),
            json!({ "email": "bob@acme.com" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(acme.app.mailer.sent_to("bob@acme.com").is_empty());
}

#[tokio::test]
async fn expiry_sweep_expires_stale_invitations() {
    let acme = acme().await;
    let (id, token) = acme.invite("bob@acme.com").await;
    acme.app.store.modify_invitation(id, |invitation| {
        invitation.expiry_utc = chrono::Utc::now() - chrono::Duration::hours(1);
    });

    let expired = acme
        .app
        .state
        .invitations
        .expire_stale(chrono::Utc::now())
        .await
        .unwrap();

    assert_eq!(expired, 1);
    assert_eq!(acme.status_of(&token).await, InvitationStatus::Expired);
}
