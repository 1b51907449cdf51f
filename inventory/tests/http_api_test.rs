//! HTTP API tests against the full router, without a network listener.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use boxoffice_inventory::{
    ConflictPolicy, InventoryConfig, Role, StaticTokenResolver,
    api::{IdempotencyCache, idempotency::REPLAYED_HEADER},
    config::ApiTokenConfig,
    server::{AppState, build_router},
};
use common::{Harness, harness_with};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const ADMIN: &str = "admin-token";
const BUYER: &str = "buyer-token";

fn app(h: &Harness) -> Router {
    let resolver = StaticTokenResolver::new(&[
        ApiTokenConfig {
            token: ADMIN.to_string(),
            email: "ops@example.com".to_string(),
            roles: vec![Role::Admin],
        },
        ApiTokenConfig {
            token: BUYER.to_string(),
            email: "pat@example.com".to_string(),
            roles: vec![Role::Customer],
        },
    ]);
    build_router(AppState::new(
        h.service.clone(),
        Arc::new(resolver),
        IdempotencyCache::new(Duration::from_secs(60)),
    ))
}

fn setup() -> (Harness, Router) {
    let h = harness_with(InventoryConfig {
        conflict_policy: ConflictPolicy::DenyRequest,
        ..InventoryConfig::default()
    });
    let router = app(&h);
    (h, router)
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-Session-ID", "session-pat");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Value, bool) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let replayed = response.headers().contains_key(REPLAYED_HEADER);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body, replayed)
}

async fn register(router: &Router, event_id: &str, total: u32) -> String {
    let (status, body, _) = call(
        router,
        request(
            "POST",
            &format!("/api/events/{event_id}/ticket-types"),
            Some(ADMIN),
            Some(json!({"name": "Balcony", "total": total})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["updated_inventory"]["ticket_type_id"]
        .as_str()
        .unwrap()
        .to_string()
}

fn event_id() -> String {
    boxoffice_inventory::EventId::new().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let (_h, router) = setup();
    let response = router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, body, _) = call(&router, request("GET", "/ready", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn api_requires_a_known_token() {
    let (_h, router) = setup();
    let event = event_id();

    let (status, body, _) = call(
        &router,
        request("GET", &format!("/api/events/{event}/inventory"), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _, _) = call(
        &router,
        request("GET", &format!("/api/events/{event}/inventory"), Some("stolen"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn hold_lifecycle_over_http() {
    let (_h, router) = setup();
    let event = event_id();
    let ticket_type = register(&router, &event, 5).await;

    let (status, body, _) = call(
        &router,
        request(
            "POST",
            "/api/holds",
            Some(BUYER),
            Some(json!({"event_id": event, "ticket_type_id": ticket_type, "quantity": 2})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["hold"]["session_id"], "session-pat");
    assert_eq!(body["updated_inventory"]["available"], 3);
    let hold_id = body["hold"]["id"].as_str().unwrap().to_string();

    let (status, timer, _) = call(
        &router,
        request("GET", &format!("/api/holds/{hold_id}/timer"), Some(BUYER), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(timer["urgency"], "normal");
    assert_eq!(timer["formatted"], "15:00");

    let (status, session, _) = call(
        &router,
        request("GET", "/api/sessions/session-pat/holds", Some(BUYER), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["holds"].as_array().unwrap().len(), 1);

    // Asking for more than is left is a conflict under the deny policy.
    let (status, body, _) = call(
        &router,
        request(
            "POST",
            "/api/holds",
            Some(BUYER),
            Some(json!({"event_id": event, "ticket_type_id": ticket_type, "quantity": 4})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["conflict"]["resolution_type"], "deny-request");

    for _ in 0..2 {
        let (status, body, _) = call(
            &router,
            request("POST", &format!("/api/holds/{hold_id}/release"), Some(BUYER), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["success"], true);
    }

    let (status, body, _) = call(
        &router,
        request("GET", &format!("/api/events/{event}/inventory"), Some(BUYER), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], 5);
    assert_eq!(body["held"], 0);
}

#[tokio::test]
async fn idempotency_key_replays_the_first_response() {
    let (h, router) = setup();
    let event = event_id();
    let ticket_type = register(&router, &event, 10).await;

    let make = || {
        let mut req = request(
            "POST",
            "/api/holds",
            Some(BUYER),
            Some(json!({"event_id": event, "ticket_type_id": ticket_type, "quantity": 3})),
        );
        req.headers_mut().insert(
            "Idempotency-Key",
            "checkout-7f3a9c21-retry".parse().unwrap(),
        );
        req
    };

    let (first_status, first, first_replayed) = call(&router, make()).await;
    let (second_status, second, second_replayed) = call(&router, make()).await;

    assert_eq!(first_status, StatusCode::CREATED);
    assert_eq!(second_status, StatusCode::CREATED);
    assert!(!first_replayed);
    assert!(second_replayed);
    assert_eq!(first["hold"]["id"], second["hold"]["id"]);

    let held = h
        .service
        .store()
        .state(|state| state.holds.values().map(|hold| hold.quantity).sum::<u32>())
        .await;
    assert_eq!(held, 3);
}

#[tokio::test]
async fn idempotency_key_is_scoped_to_the_endpoint() {
    let (_h, router) = setup();
    let event = event_id();
    let ticket_type = register(&router, &event, 10).await;

    let with_key = |uri: &str, body: Value| {
        let mut req = request("POST", uri, Some(BUYER), Some(body));
        req.headers_mut()
            .insert("Idempotency-Key", "order-2291-attempt-01".parse().unwrap());
        req
    };

    let (status, hold, replayed) = call(
        &router,
        with_key(
            "/api/holds",
            json!({"event_id": event, "ticket_type_id": ticket_type, "quantity": 2}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{hold}");
    assert!(!replayed);

    let (status, sale, replayed) = call(
        &router,
        with_key(
            "/api/purchases",
            json!({"event_id": event, "ticket_type_id": ticket_type, "quantity": 2}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{sale}");
    assert!(!replayed, "a key reused on another endpoint must not replay");
    assert_eq!(sale["transaction"]["transaction_type"], "purchase");

    let (status, body, _) = call(
        &router,
        request("GET", &format!("/api/events/{event}/inventory"), Some(BUYER), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sold"], 2);
    assert_eq!(body["held"], 0);
}

#[tokio::test]
async fn capabilities_are_enforced() {
    let (_h, router) = setup();
    let event = event_id();
    let ticket_type = register(&router, &event, 10).await;

    let (status, body, _) = call(
        &router,
        request(
            "POST",
            "/api/adjustments",
            Some(BUYER),
            Some(json!({
                "event_id": event,
                "ticket_type_id": ticket_type,
                "delta": 5,
                "reason": "More seats"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");

    let (status, _, _) = call(&router, request("GET", "/api/transactions", Some(BUYER), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body, _) = call(&router, request("GET", "/api/transactions", Some(ADMIN), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn holds_cannot_be_placed_on_another_session() {
    let (_h, router) = setup();
    let event = event_id();
    let ticket_type = register(&router, &event, 5).await;

    let (status, body, _) = call(
        &router,
        request(
            "POST",
            "/api/holds",
            Some(BUYER),
            Some(json!({
                "event_id": event,
                "ticket_type_id": ticket_type,
                "quantity": 2,
                "session_id": "session-sam"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    assert_eq!(body["code"], "FORBIDDEN");

    // Naming the caller's own session is fine.
    let (status, body, _) = call(
        &router,
        request(
            "POST",
            "/api/holds",
            Some(BUYER),
            Some(json!({
                "event_id": event,
                "ticket_type_id": ticket_type,
                "quantity": 2,
                "session_id": "session-pat"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    // Staff may place a hold for a customer's session.
    let (status, body, _) = call(
        &router,
        request(
            "POST",
            "/api/holds",
            Some(ADMIN),
            Some(json!({
                "event_id": event,
                "ticket_type_id": ticket_type,
                "quantity": 1,
                "session_id": "session-sam"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["hold"]["session_id"], "session-sam");
    assert_eq!(body["updated_inventory"]["available"], 2);
}

#[tokio::test]
async fn impersonation_requires_the_capability() {
    let (_h, router) = setup();
    let event = event_id();
    register(&router, &event, 10).await;

    let mut denied = request("GET", &format!("/api/events/{event}/inventory"), Some(BUYER), None);
    denied
        .headers_mut()
        .insert("X-Act-As", "ops@example.com".parse().unwrap());
    let (status, _, _) = call(&router, denied).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let mut allowed = request("GET", &format!("/api/events/{event}/inventory"), Some(ADMIN), None);
    allowed
        .headers_mut()
        .insert("X-Act-As", "pat@example.com".parse().unwrap());
    let (status, _, _) = call(&router, allowed).await;
    assert_eq!(status, StatusCode::OK);

    let mut unknown = request("GET", &format!("/api/events/{event}/inventory"), Some(ADMIN), None);
    unknown
        .headers_mut()
        .insert("X-Act-As", "nobody@example.com".parse().unwrap());
    let (status, _, _) = call(&router, unknown).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bulk_batch_reports_each_item() {
    let (_h, router) = setup();
    let event = event_id();
    let ticket_type = register(&router, &event, 4).await;

    let (status, body, _) = call(
        &router,
        request(
            "POST",
            "/api/bulk",
            Some(ADMIN),
            Some(json!({
                "operation_type": "mixed",
                "event_id": event,
                "items": [
                    {"action": "adjust", "event_id": event, "ticket_type_id": ticket_type, "delta": 2, "reason": "Added row"},
                    {"action": "release-hold", "hold_id": boxoffice_inventory::HoldId::new().to_string()},
                    {"action": "refund", "event_id": event, "ticket_type_id": ticket_type, "quantity": 1}
                ]
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["status"], "completed");
    assert_eq!(body["succeeded"], 2);
    assert_eq!(body["failed"], 1);

    let operation_id = body["id"].as_str().unwrap();
    let (status, fetched, _) = call(
        &router,
        request("GET", &format!("/api/bulk/{operation_id}"), Some(ADMIN), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["results"].as_array().unwrap().len(), 3);
}
