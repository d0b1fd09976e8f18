//! # Integration Tests for parcel-api
//!
//! Drives the assembled router end to end: the cancel and delivery
//! lifecycles, ownership and role enforcement, anonymous tracking,
//! authentication, and the stale-read race on concurrent transitions.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use parcel_api::error::AppError;
use parcel_api::lifecycle;
use parcel_api::state::AppState;
use parcel_core::{Actor, ParcelId, UserId};
use parcel_state::{Annotation, ParcelStatus};

/// Helper: build the test app with bearer secrets unchecked.
fn test_app() -> (axum::Router, AppState) {
    let state = AppState::new();
    (parcel_api::app(state.clone()), state)
}

fn bearer(role: &str, id: Uuid) -> String {
    format!("Bearer {role}:{id}")
}

/// Helper: send a request and decode the JSON body (Null when empty).
async fn call(
    app: &axum::Router,
    method: &str,
    uri: &str,
    auth: Option<String>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header("Authorization", auth);
    }
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn create(app: &axum::Router, sender: Uuid, receiver: Uuid) -> Value {
    let (status, body) = call(
        app,
        "POST",
        "/api/v1/parcels",
        Some(bearer("sender", sender)),
        Some(json!({
            "receiver": receiver,
            "parcel_type": "documents",
            "weight": 2.5,
            "fee": 10,
            "from_address": "12 Mill Road",
            "to_address": "7 Harbour Street",
            "receiver_contact": {"name": "Dana", "phone": "555-0101"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

fn statuses(parcel: &Value) -> Vec<String> {
    parcel["status_logs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["status"].as_str().unwrap().to_string())
        .collect()
}

// -- Lifecycles ---------------------------------------------------------------

#[tokio::test]
async fn cancel_then_admin_update_is_rejected() {
    let (app, _) = test_app();
    let (sender, admin) = (Uuid::new_v4(), Uuid::new_v4());
    let parcel = create(&app, sender, Uuid::new_v4()).await;
    assert_eq!(parcel["weight"], 2.5);
    assert_eq!(parcel["fee"], 10.0);
    let id = parcel["id"].as_str().unwrap();

    let (status, canceled) = call(
        &app,
        "PATCH",
        &format!("/api/v1/parcels/cancel/{id}"),
        Some(bearer("sender", sender)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(statuses(&canceled), ["requested", "canceled"]);

    let (status, err) = call(
        &app,
        "PATCH",
        &format!("/api/v1/parcels/status/{id}"),
        Some(bearer("admin", admin)),
        Some(json!({"status": "approved"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error"]["code"], "INVALID_TRANSITION");
    assert_eq!(err["error"]["details"], json!({"from": "canceled", "to": "approved"}));

    let (_, after) = call(
        &app,
        "GET",
        &format!("/api/v1/parcels/{id}"),
        Some(bearer("admin", admin)),
        None,
    )
    .await;
    assert_eq!(after["current_status"], "canceled");
    assert_eq!(after["status_logs"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn full_delivery_path() {
    let (app, _) = test_app();
    let (sender, receiver, admin) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let parcel = create(&app, sender, receiver).await;
    let id = parcel["id"].as_str().unwrap();

    for (target, location) in [
        ("approved", "Depot"),
        ("dispatched", "Depot"),
        ("in_transit", "Hub B"),
    ] {
        let (status, body) = call(
            &app,
            "PATCH",
            &format!("/api/v1/parcels/status/{id}"),
            Some(bearer("admin", admin)),
            Some(json!({"status": target, "location": location})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{target}: {body}");
    }

    // Cancel is closed once dispatched.
    let (status, _) = call(
        &app,
        "PATCH",
        &format!("/api/v1/parcels/cancel/{id}"),
        Some(bearer("sender", sender)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, delivered) = call(
        &app,
        "PATCH",
        &format!("/api/v1/parcels/confirm/{id}"),
        Some(bearer("receiver", receiver)),
        Some(json!({"note": "left with neighbour"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        statuses(&delivered),
        ["requested", "approved", "dispatched", "in_transit", "delivered"]
    );
    assert_eq!(delivered["current_status"], "delivered");
    assert_eq!(delivered["version"], 5);
    assert_eq!(delivered["status_logs"][4]["note"], "left with neighbour");
    assert_eq!(delivered["status_logs"][4]["updated_by"], receiver.to_string());

    let logs = delivered["status_logs"].as_array().unwrap();
    let stamps: Vec<&str> = logs.iter().map(|e| e["timestamp"].as_str().unwrap()).collect();
    let parsed: Vec<chrono::DateTime<chrono::Utc>> =
        stamps.iter().map(|s| s.parse().unwrap()).collect();
    assert!(parsed.windows(2).all(|w| w[0] <= w[1]));

    // Delivery confirmation happens once.
    let (status, err) = call(
        &app,
        "PATCH",
        &format!("/api/v1/parcels/confirm/{id}"),
        Some(bearer("receiver", receiver)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error"]["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn receiver_cannot_confirm_before_transit() {
    let (app, _) = test_app();
    let receiver = Uuid::new_v4();
    let parcel = create(&app, Uuid::new_v4(), receiver).await;
    let id = parcel["id"].as_str().unwrap();
    let (status, _) = call(
        &app,
        "PATCH",
        &format!("/api/v1/parcels/confirm/{id}"),
        Some(bearer("receiver", receiver)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

// -- Ownership ----------------------------------------------------------------

#[tokio::test]
async fn non_owner_is_forbidden_and_log_unchanged() {
    let (app, state) = test_app();
    let parcel = create(&app, Uuid::new_v4(), Uuid::new_v4()).await;
    let id = parcel["id"].as_str().unwrap();

    let (status, err) = call(
        &app,
        "PATCH",
        &format!("/api/v1/parcels/cancel/{id}"),
        Some(bearer("sender", Uuid::new_v4())),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(err["error"]["code"], "FORBIDDEN");

    let (status, _) = call(
        &app,
        "PATCH",
        &format!("/api/v1/parcels/confirm/{id}"),
        Some(bearer("receiver", Uuid::new_v4())),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let stored = state
        .parcels
        .get(&ParcelId::from_uuid(id.parse().unwrap()))
        .unwrap();
    assert_eq!(stored.status_logs().len(), 1);
    assert_eq!(stored.version(), 1);
}

#[tokio::test]
async fn listings_are_scoped_to_caller() {
    let (app, _) = test_app();
    let (alice, bob, carol) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let first = create(&app, alice, carol).await;
    let second = create(&app, alice, carol).await;
    create(&app, bob, carol).await;

    let (_, mine) = call(&app, "GET", "/api/v1/parcels/my-parcels", Some(bearer("sender", alice)), None).await;
    let ids: Vec<&str> = mine.as_array().unwrap().iter().map(|p| p["id"].as_str().unwrap()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&first["id"].as_str().unwrap()));
    assert!(ids.contains(&second["id"].as_str().unwrap()));

    let (_, incoming) =
        call(&app, "GET", "/api/v1/parcels/incoming", Some(bearer("receiver", carol)), None).await;
    assert_eq!(incoming.as_array().unwrap().len(), 3);

    // Wrong role on a listing route.
    let (status, _) =
        call(&app, "GET", "/api/v1/parcels/incoming", Some(bearer("sender", carol)), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// -- Tracking ------------------------------------------------------------------

#[tokio::test]
async fn tracking_lookup_is_anonymous_and_redacted() {
    let (app, _) = test_app();
    let parcel = create(&app, Uuid::new_v4(), Uuid::new_v4()).await;
    let code = parcel["tracking_id"].as_str().unwrap();
    assert!(code.starts_with("TRK-"));
    assert_eq!(code.len(), "TRK-20240131-482913".len());

    let (status, tracked) = call(&app, "GET", &format!("/api/v1/parcels/track/{code}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tracked["tracking_id"], code);
    assert_eq!(tracked["current_status"], "requested");
    assert!(tracked.get("sender").is_none());
    assert!(tracked.get("receiver").is_none());
    assert!(tracked.get("receiver_contact").is_none());
}

#[tokio::test]
async fn unknown_or_malformed_tracking_code_is_404() {
    let (app, _) = test_app();
    for code in ["TRK-20240131-482913", "not-a-code", "TRK-20241399-123456"] {
        let (status, err) =
            call(&app, "GET", &format!("/api/v1/parcels/track/{code}"), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{code}");
        assert_eq!(err["error"]["code"], "NOT_FOUND");
    }
}

// -- Authentication ------------------------------------------------------------

#[tokio::test]
async fn missing_or_garbled_token_is_401() {
    let (app, _) = test_app();
    let (status, err) = call(&app, "GET", "/api/v1/parcels/my-parcels", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(err["error"]["code"], "UNAUTHORIZED");

    for header in ["Bearer courier:abc", "Bearer sender:not-a-uuid", "Basic xyz"] {
        let (status, _) = call(
            &app,
            "GET",
            "/api/v1/parcels/my-parcels",
            Some(header.to_string()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{header}");
    }
}

#[tokio::test]
async fn openapi_document_served_to_authenticated_callers() {
    let (app, _) = test_app();
    let (status, doc) = call(&app, "GET", "/openapi.json", Some(bearer("admin", Uuid::new_v4())), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"].get("/api/v1/parcels/track/{tracking_id}").is_some());
}

// -- Concurrency -----------------------------------------------------------------

#[tokio::test]
async fn stale_snapshot_loses_race() {
    let (app, state) = test_app();
    let sender = Uuid::new_v4();
    let created = create(&app, sender, Uuid::new_v4()).await;
    let id = ParcelId::from_uuid(created["id"].as_str().unwrap().parse().unwrap());

    let snapshot = state.parcels.get(&id).unwrap();
    let admin = Actor::admin(UserId::new());
    let owner = Actor::sender(UserId::from_uuid(sender));

    let first = lifecycle::transition_from_snapshot(
        &state,
        snapshot.clone(),
        &admin,
        ParcelStatus::Approved,
        Annotation::default(),
    )
    .await;
    let second = lifecycle::transition_from_snapshot(
        &state,
        snapshot,
        &owner,
        ParcelStatus::Canceled,
        Annotation::default(),
    )
    .await;

    assert!(first.is_ok());
    assert!(matches!(second, Err(AppError::Conflict(_))));

    let stored = state.parcels.get(&id).unwrap();
    assert_eq!(stored.current_status(), ParcelStatus::Approved);
    assert_eq!(stored.status_logs().len(), 2);
    assert_eq!(stored.version(), 2);
}

#[tokio::test]
async fn concurrent_requests_serialize_per_parcel() {
    let (app, state) = test_app();
    let sender = Uuid::new_v4();
    let created = create(&app, sender, Uuid::new_v4()).await;
    let id = created["id"].as_str().unwrap().to_string();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let app = app.clone();
        let uri = format!("/api/v1/parcels/cancel/{id}");
        let auth = bearer("sender", sender);
        handles.push(tokio::spawn(async move {
            call(&app, "PATCH", &uri, Some(auth), None).await.0
        }));
    }
    let mut ok = 0;
    for handle in handles {
        let status = handle.await.unwrap();
        assert!(status == StatusCode::OK || status == StatusCode::CONFLICT, "{status}");
        if status == StatusCode::OK {
            ok += 1;
        }
    }
    assert_eq!(ok, 1);

    let stored = state
        .parcels
        .get(&ParcelId::from_uuid(id.parse().unwrap()))
        .unwrap();
    assert_eq!(stored.status_logs().len(), 2);
}
