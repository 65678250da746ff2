//! HTTP handler tests
//!
//! Drive the router with `oneshot`, in-memory repositories and real JWTs.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum_helpers::{JwtAuth, JwtConfig};
use domain_lost_found::handlers::{self, ItemListResponse, MeResponse};
use domain_lost_found::{
    AdminService, InMemoryAdminRepository, InMemoryItemRepository, Item, ItemStats, ItemStatus,
    LifecycleEngine, LostFoundState, Notification, Outcome, Severity,
};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use test_utils::TestDataBuilder;
use tower::ServiceExt;

const SECRET: &str = "handler-test-secret-that-is-at-least-32-chars";

struct TestApp {
    app: Router,
    admin_email: String,
    admin_token: String,
    user_token: String,
}

async fn setup(test_name: &str) -> TestApp {
    let data = TestDataBuilder::from_test_name(test_name);
    let admin_email = data.email("admin");

    let admins = AdminService::new(InMemoryAdminRepository::new());
    admins.bootstrap(&[admin_email.clone()]).await.unwrap();
    let engine = LifecycleEngine::new(InMemoryItemRepository::new());

    let auth = JwtAuth::new(&JwtConfig::new(SECRET));
    let admin_token = auth
        .create_token(&data.uid("admin"), &admin_email, "Head Teacher")
        .unwrap();
    let user_token = auth
        .create_token(&data.uid("pupil"), &data.email("pupil"), "Pupil")
        .unwrap();

    TestApp {
        app: handlers::router(LostFoundState::new(engine, admins), auth),
        admin_email,
        admin_token,
        user_token,
    }
}

async fn json_body<T: DeserializeOwned>(body: Body) -> T {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

impl TestApp {
    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn report(&self, name: &str, status: &str) -> Item {
        let response = self
            .send(
                "POST",
                "/items",
                Some(&self.user_token),
                Some(json!({
                    "name": name,
                    "category": "Sports Equipment",
                    "status": status,
                    "location": "Sports hall",
                    "date": chrono::Utc::now().date_naive(),
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response.into_body()).await
    }

    async fn approve(&self, id: uuid::Uuid) -> Outcome {
        let response = self
            .send(
                "POST",
                &format!("/admin/items/{}/approve", id),
                Some(&self.admin_token),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response.into_body()).await
    }
}

#[tokio::test]
async fn test_public_listing_needs_no_token() {
    let app = setup("test_public_listing_needs_no_token").await;

    let response = app.send("GET", "/items", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: ItemListResponse = json_body(response.into_body()).await;
    assert!(body.items.is_empty());
    assert_eq!(body.stats, ItemStats::default());
}

#[tokio::test]
async fn test_reporting_requires_token() {
    let app = setup("test_reporting_requires_token").await;

    let response = app
        .send("POST", "/items", None, Some(json!({ "name": "Ball" })))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_reported_item_is_pending_until_approved() {
    let app = setup("test_reported_item_is_pending_until_approved").await;
    let item = app.report("Football", "lost").await;

    assert!(!item.is_approved);
    assert_eq!(item.contact, item.user_email);

    let public: ItemListResponse =
        json_body(app.send("GET", "/items", None, None).await.into_body()).await;
    assert!(public.items.is_empty());

    let outcome = app.approve(item.id).await;
    assert_eq!(outcome.stats.approved_items, 1);

    let public: ItemListResponse = json_body(
        app.send("GET", "/items?search=foot", None, None)
            .await
            .into_body(),
    )
    .await;
    assert_eq!(public.items.len(), 1);
    assert_eq!(public.items[0].id, item.id);
}

#[tokio::test]
async fn test_invalid_report_is_bad_request() {
    let app = setup("test_invalid_report_is_bad_request").await;

    let response = app
        .send(
            "POST",
            "/items",
            Some(&app.user_token),
            Some(json!({
                "name": "",
                "category": "Books",
                "status": "lost",
                "location": "Library",
                "date": "2025-02-01",
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_routes_reject_non_admins() {
    let app = setup("test_admin_routes_reject_non_admins").await;

    let anonymous = app.send("GET", "/admin/items", None, None).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let pupil = app
        .send("GET", "/admin/items", Some(&app.user_token), None)
        .await;
    assert_eq!(pupil.status(), StatusCode::FORBIDDEN);

    let admin = app
        .send("GET", "/admin/items", Some(&app.admin_token), None)
        .await;
    assert_eq!(admin.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_link_and_unlink_over_http() {
    let app = setup("test_link_and_unlink_over_http").await;
    let lost = app.report("Tennis racket", "lost").await;
    let found = app.report("Tennis racket", "found").await;
    app.approve(lost.id).await;
    app.approve(found.id).await;

    let response = app
        .send(
            "POST",
            &format!("/admin/items/{}/link", lost.id),
            Some(&app.admin_token),
            Some(json!({ "found_id": found.id })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome: Outcome = json_body(response.into_body()).await;
    assert_eq!(outcome.stats.returned_items, 1);
    assert_eq!(outcome.stats.linked_items, 2);

    let response = app
        .send(
            "POST",
            &format!("/admin/items/{}/unlink", found.id),
            Some(&app.admin_token),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome: Outcome = json_body(response.into_body()).await;
    let lost = outcome.snapshot.items.iter().find(|i| i.id == lost.id).unwrap();
    assert_eq!(lost.status, ItemStatus::Lost);
    assert_eq!(outcome.stats.returned_items, 0);
}

#[tokio::test]
async fn test_link_without_candidates_is_unprocessable() {
    let app = setup("test_link_without_candidates_is_unprocessable").await;
    let lost = app.report("Hockey stick", "lost").await;
    let found = app.report("Hockey stick", "found").await;
    app.approve(lost.id).await;

    let response = app
        .send(
            "POST",
            &format!("/admin/items/{}/link", lost.id),
            Some(&app.admin_token),
            Some(json!({ "found_id": found.id })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_status_change_rules_over_http() {
    let app = setup("test_status_change_rules_over_http").await;
    let found = app.report("Goggles", "found").await;
    let lost = app.report("Goggles", "lost").await;
    app.approve(found.id).await;

    let rejected = app
        .send(
            "PUT",
            &format!("/admin/items/{}/status", found.id),
            Some(&app.admin_token),
            Some(json!({ "status": "returned" })),
        )
        .await;
    assert_eq!(rejected.status(), StatusCode::CONFLICT);

    let candidates = app
        .send(
            "PUT",
            &format!("/admin/items/{}/status", lost.id),
            Some(&app.admin_token),
            Some(json!({ "status": "returned" })),
        )
        .await;
    assert_eq!(candidates.status(), StatusCode::OK);
    let body: Value = json_body(candidates.into_body()).await;
    assert_eq!(body["result"], "counterpart_required");
    assert_eq!(body["candidates"].as_array().unwrap().len(), 1);

    let menu: Value = json_body(
        app.send(
            "GET",
            &format!("/admin/items/{}/transitions", lost.id),
            Some(&app.admin_token),
            None,
        )
        .await
        .into_body(),
    )
    .await;
    assert_eq!(menu["allowed"], json!(["returned"]));
}

#[tokio::test]
async fn test_admin_management_over_http() {
    let app = setup("test_admin_management_over_http").await;

    let own = app
        .send(
            "DELETE",
            &format!("/admin/admins/{}", app.admin_email),
            Some(&app.admin_token),
            None,
        )
        .await;
    assert_eq!(own.status(), StatusCode::CONFLICT);
    let body: Value = json_body(own.into_body()).await;
    assert_eq!(body["error"], "CONFLICT");

    let granted = app
        .send(
            "POST",
            "/admin/admins",
            Some(&app.admin_token),
            Some(json!({ "email": "deputy@school.test" })),
        )
        .await;
    assert_eq!(granted.status(), StatusCode::CREATED);

    let duplicate = app
        .send(
            "POST",
            "/admin/admins",
            Some(&app.admin_token),
            Some(json!({ "email": "Deputy@School.test" })),
        )
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let revoked = app
        .send(
            "DELETE",
            "/admin/admins/deputy@school.test",
            Some(&app.admin_token),
            None,
        )
        .await;
    assert_eq!(revoked.status(), StatusCode::NO_CONTENT);

    let missing = app
        .send(
            "DELETE",
            "/admin/admins/deputy@school.test",
            Some(&app.admin_token),
            None,
        )
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_me_reports_admin_flag() {
    let app = setup("test_me_reports_admin_flag").await;

    let admin: MeResponse =
        json_body(app.send("GET", "/me", Some(&app.admin_token), None).await.into_body()).await;
    assert!(admin.is_admin);
    assert_eq!(admin.principal.email, app.admin_email);

    let pupil: MeResponse =
        json_body(app.send("GET", "/me", Some(&app.user_token), None).await.into_body()).await;
    assert!(!pupil.is_admin);
}

#[tokio::test]
async fn test_admin_operations_publish_notifications() {
    let app = setup("test_admin_operations_publish_notifications").await;
    let item = app.report("Skipping rope", "found").await;
    app.approve(item.id).await;

    // Approving a missing item fails and leaves a sticky error
    let missing = app
        .send(
            "POST",
            &format!("/admin/items/{}/approve", uuid::Uuid::now_v7()),
            Some(&app.admin_token),
            None,
        )
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let notes: Vec<Notification> = json_body(
        app.send("GET", "/notifications", Some(&app.admin_token), None)
            .await
            .into_body(),
    )
    .await;
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0].severity, Severity::Success);
    assert_eq!(notes[1].severity, Severity::Error);

    let dismissed = app
        .send(
            "DELETE",
            &format!("/notifications/{}", notes[1].id),
            Some(&app.admin_token),
            None,
        )
        .await;
    assert_eq!(dismissed.status(), StatusCode::NO_CONTENT);

    let again = app
        .send(
            "DELETE",
            &format!("/notifications/{}", notes[1].id),
            Some(&app.admin_token),
            None,
        )
        .await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);

    let pupil: Vec<Notification> = json_body(
        app.send("GET", "/notifications", Some(&app.user_token), None)
            .await
            .into_body(),
    )
    .await;
    assert!(pupil.is_empty());
}
