mod common;

use axum::http::{Method, StatusCode};
use board_auth::services::UserStore;
use common::TestApp;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn scoped_route_without_token_is_unauthenticated() {
    let app = TestApp::spawn();

    let response = app.get("/organizations/current", None).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "Unauthenticated.");
}

#[tokio::test]
async fn user_without_organization_is_denied() {
    let app = TestApp::spawn();
    let user = app.register_verified("Alice", "alice@acme.com").await;

    let response = app.get("/organizations/current", Some(&user.token)).await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["code"], "NO_ORGANIZATION");
}

#[tokio::test]
async fn vanished_current_organization_is_denied() {
    let app = TestApp::spawn();
    let user = app.register_verified("Alice", "alice@acme.com").await;
    app.store
        .set_current_organization(user.id, Some(Uuid::new_v4()))
        .await
        .unwrap();

    let response = app.get("/organizations/current", Some(&user.token)).await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["code"], "ORGANIZATION_NOT_FOUND");
}

#[tokio::test]
async fn current_organization_without_membership_is_denied() {
    let app = TestApp::spawn();
    let owner = app.register_verified("Alice", "alice@acme.com").await;
    let org_id = app.create_organization(&owner, "Acme Corp", "acme").await;

    let outsider = app.register_verified("Mallory", "mallory@evil.com").await;
    app.store
        .set_current_organization(outsider.id, Some(org_id))
        .await
        .unwrap();

    let response = app.get("/organizations/current", Some(&outsider.token)).await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["code"], "NOT_ORGANIZATION_MEMBER");
}

#[tokio::test]
async fn member_sees_current_organization_and_members() {
    let app = TestApp::spawn();
    let owner = app.register_verified("Alice", "alice@acme.com").await;
    let org_id = app.create_organization(&owner, "Acme Corp", "acme").await;

    let current = app.get("/organizations/current", Some(&owner.token)).await;
    assert_eq!(current.status, StatusCode::OK);
    assert_eq!(current.body["organization"]["id"], org_id.to_string());
    assert_eq!(current.body["organization"]["subdomain"], "acme");
    assert_eq!(current.body["role"], "owner");

    let members = app
        .get("/organizations/current/members", Some(&owner.token))
        .await;
    assert_eq!(members.status, StatusCode::OK);
    assert_eq!(members.body["members"].as_array().unwrap().len(), 1);
    assert_eq!(members.body["members"][0]["email"], "alice@acme.com");
}

#[tokio::test]
async fn creating_an_organization_requires_verified_email() {
    let app = TestApp::spawn();
    let user = app.register("Alice", "alice@acme.com").await;

    let response = app
        .post(
            "/organizations",
            Some(&user.token),
            json!({ "name": "Acme Corp", "subdomain": "acme" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["code"], "EMAIL_NOT_VERIFIED");
}

#[tokio::test]
async fn routes_naming_another_organization_are_denied() {
    let app = TestApp::spawn();
    let alice = app.register_verified("Alice", "alice@acme.com").await;
    app.create_organization(&alice, "Acme Corp", "acme").await;
    let eve = app.register_verified("Eve", "eve@globex.com").await;
    let globex = app.create_organization(&eve, "Globex", "globex").await;

    let invite = app
        .post(
            &format!("/organizations/{}/invite", globex),
            Some(&alice.token),
            json!({ "email": "bob@acme.com" }),
        )
        .await;
    assert_eq!(invite.status, StatusCode::FORBIDDEN);
    assert_eq!(invite.body["code"], "ORGANIZATION_MISMATCH");

    let settings = app
        .put(
            &format!("/organizations/{}/settings", globex),
            Some(&alice.token),
            json!({ "settings": { "theme": "dark" } }),
        )
        .await;
    assert_eq!(settings.status, StatusCode::FORBIDDEN);
    assert_eq!(settings.body["code"], "ORGANIZATION_MISMATCH");

    assert!(app.queued_events().iter().all(|e| e.entity_type() != "invitation"));
}

#[tokio::test]
async fn only_managers_update_settings() {
    let app = TestApp::spawn();
    let owner = app.register_verified("Alice", "alice@acme.com").await;
    let org_id = app.create_organization(&owner, "Acme Corp", "acme").await;

    let response = app
        .put(
            &format!("/organizations/{}/settings", org_id),
            Some(&owner.token),
            json!({ "settings": { "theme": "dark" } }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(response.body["settings"]["theme"], "dark");
}

#[tokio::test]
async fn subdomain_validation_reports_availability() {
    let app = TestApp::spawn();
    let owner = app.register_verified("Alice", "alice@acme.com").await;
    app.create_organization(&owner, "Acme Corp", "acme").await;

    let taken = app
        .get("/organizations/subdomain/validate?subdomain=acme", Some(&owner.token))
        .await;
    assert_eq!(taken.status, StatusCode::OK);
    assert_eq!(taken.body["available"], false);

    let reserved = app
        .get("/organizations/subdomain/validate?subdomain=www", Some(&owner.token))
        .await;
    assert_eq!(reserved.body["available"], false);

    let free = app
        .get("/organizations/subdomain/validate?subdomain=Globex", Some(&owner.token))
        .await;
    assert_eq!(free.body["subdomain"], "globex");
    assert_eq!(free.body["available"], true);
}

#[tokio::test]
async fn subdomain_details_expose_owner_summary() {
    let app = TestApp::spawn();
    let owner = app.register_verified("Alice", "alice@acme.com").await;
    app.create_organization(&owner, "Acme Corp", "acme").await;

    let response = app
        .get("/organizations/subdomain/details/acme", Some(&owner.token))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["organization"]["name"], "Acme Corp");
    assert_eq!(response.body["organization"]["owner"]["email"], "alice@acme.com");

    let missing = app
        .get("/organizations/subdomain/details/nope", Some(&owner.token))
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn switching_requires_membership() {
    let app = TestApp::spawn();
    let alice = app.register_verified("Alice", "alice@acme.com").await;
    let acme = app.create_organization(&alice, "Acme Corp", "acme").await;
    let second = app.create_organization(&alice, "Acme Labs", "acme-labs").await;
    let eve = app.register_verified("Eve", "eve@globex.com").await;

    let switched = app
        .request(
            Method::PUT,
            "/users/me/current-organization",
            Some(&alice.token),
            Some(json!({ "organization_id": acme })),
        )
        .await;
    assert_eq!(switched.status, StatusCode::OK);
    assert_eq!(switched.body["organization"]["id"], acme.to_string());

    let current = app.get("/organizations/current", Some(&alice.token)).await;
    assert_eq!(current.body["organization"]["id"], acme.to_string());

    let denied = app
        .put(
            "/users/me/current-organization",
            Some(&eve.token),
            json!({ "organization_id": second }),
        )
        .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert_eq!(denied.body["code"], "NOT_ORGANIZATION_MEMBER");

    let unknown = app
        .put(
            "/users/me/current-organization",
            Some(&eve.token),
            json!({ "organization_id": Uuid::new_v4() }),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}
