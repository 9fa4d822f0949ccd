use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use freight_board::api::rest::router;
use freight_board::config::Config;
use freight_board::models::order::{Location, TransportOrder, TransportOrderStatus};
use freight_board::state::AppState;
use freight_board::storage::memory::MemoryStore;
use freight_board::storage::OrderStore;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

fn setup() -> (axum::Router, Arc<AppState>) {
    let store = Arc::new(MemoryStore::new());
    let state = Arc::new(AppState::new(store, &Config::default()));
    (router(state.clone()), state)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn put_request(uri: &str, body: Value) -> Request<Body> {
    json_request("PUT", uri, body)
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location_json() -> Value {
    json!({
        "state": "Kerala",
        "district": "Ernakulam",
        "place": "Kochi",
        "taluk": "Kanayannur"
    })
}

async fn create_supplier(app: &axum::Router, name: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request("POST", "/suppliers", json!({ "name": name })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["id"].as_str().unwrap().to_string()
}

async fn create_buyer(app: &axum::Router, name: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request("POST", "/buyers", json!({ "name": name })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["id"].as_str().unwrap().to_string()
}

async fn submit_order(app: &axum::Router, supplier_id: &str, driver_id: Option<&str>) -> Value {
    let mut payload = json!({
        "supplier_id": supplier_id,
        "location": location_json(),
        "vehicle_number": "KL-07-AB-1234",
        "body_type": "container"
    });
    if let Some(driver_id) = driver_id {
        payload["driver_id"] = json!(driver_id);
    }

    let response = app
        .clone()
        .oneshot(json_request("POST", "/orders", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["orders"], 0);
    assert_eq!(body["requests"], 0);
    assert_eq!(body["shipments"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("storage_retries_total"));
}

#[tokio::test]
async fn submit_order_lands_pending() {
    let (app, _state) = setup();
    let supplier_id = create_supplier(&app, "Malabar Logistics").await;

    let body = submit_order(&app, &supplier_id, None).await;
    assert_eq!(body["order"]["status"], "pending");
    assert_eq!(body["order"]["supplier_id"], supplier_id.as_str());
    assert!(body["order"]["admin_action_at"].is_null());
    assert_eq!(body["notified"], true);
}

#[tokio::test]
async fn submit_order_unknown_supplier_returns_404() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/orders",
            json!({
                "supplier_id": Uuid::new_v4(),
                "location": location_json(),
                "vehicle_number": "KL-07-AB-1234",
                "body_type": "open"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn submit_order_incomplete_location_returns_400() {
    let (app, _state) = setup();
    let supplier_id = create_supplier(&app, "Malabar Logistics").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/orders",
            json!({
                "supplier_id": supplier_id,
                "location": { "state": "Kerala", "district": "", "place": "Kochi" },
                "vehicle_number": "KL-07-AB-1234",
                "body_type": "open"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn confirm_flow_creates_one_shipment_and_notifies_supplier() {
    let (app, _state) = setup();
    let supplier_id = create_supplier(&app, "Malabar Logistics").await;
    let order = submit_order(&app, &supplier_id, None).await;
    let order_id = order["order"]["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(put_request(
            &format!("/orders/{order_id}/confirm"),
            json!({ "notes": "ok" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["order"]["status"], "confirmed");
    assert_eq!(body["order"]["admin_notes"], "ok");
    assert_eq!(body["confirmed_order"]["status"], "assigned");
    assert_eq!(body["notified"], true);

    let response = app.clone().oneshot(get_request("/shipments")).await.unwrap();
    let shipments = body_json(response).await;
    assert_eq!(shipments.as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(get_request(&format!(
            "/notifications?scope=supplier:{supplier_id}"
        )))
        .await
        .unwrap();
    let feed = body_json(response).await;
    let entries = feed.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["priority"], "high");
    assert_eq!(entries[0]["kind"], "success");

    // admin got the submission entry
    let response = app
        .oneshot(get_request("/notifications?scope=admin"))
        .await
        .unwrap();
    let admin_feed = body_json(response).await;
    assert_eq!(admin_feed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn reject_flow_creates_no_shipment_and_flags_error() {
    let (app, _state) = setup();
    let supplier_id = create_supplier(&app, "Malabar Logistics").await;
    let order = submit_order(&app, &supplier_id, None).await;
    let order_id = order["order"]["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(put_request(
            &format!("/orders/{order_id}/reject"),
            json!({ "notes": "docs incomplete" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["order"]["status"], "rejected");

    let response = app.clone().oneshot(get_request("/shipments")).await.unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 0);

    let response = app
        .oneshot(get_request(&format!(
            "/notifications?scope=supplier:{supplier_id}"
        )))
        .await
        .unwrap();
    let feed = body_json(response).await;
    assert_eq!(feed[0]["kind"], "error");
}

#[tokio::test]
async fn confirming_twice_returns_409() {
    let (app, _state) = setup();
    let supplier_id = create_supplier(&app, "Malabar Logistics").await;
    let order = submit_order(&app, &supplier_id, None).await;
    let order_id = order["order"]["id"].as_str().unwrap();

    let first = app
        .clone()
        .oneshot(put_request(
            &format!("/orders/{order_id}/confirm"),
            json!({ "notes": "ok" }),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(put_request(
            &format!("/orders/{order_id}/confirm"),
            json!({ "notes": "ok" }),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn confirm_missing_order_returns_404() {
    let (app, _state) = setup();
    let response = app
        .oneshot(put_request(
            &format!("/orders/{}/confirm", Uuid::new_v4()),
            json!({ "notes": "ok" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn withdraw_only_applies_to_pending_orders() {
    let (app, _state) = setup();
    let supplier_id = create_supplier(&app, "Malabar Logistics").await;

    let order = submit_order(&app, &supplier_id, None).await;
    let order_id = order["order"]["id"].as_str().unwrap().to_string();
    let response = app
        .clone()
        .oneshot(empty_request("DELETE", &format!("/orders/{order_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/orders/{order_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let order = submit_order(&app, &supplier_id, None).await;
    let order_id = order["order"]["id"].as_str().unwrap().to_string();
    app.clone()
        .oneshot(put_request(
            &format!("/orders/{order_id}/confirm"),
            json!({ "notes": "ok" }),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(empty_request("DELETE", &format!("/orders/{order_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn deleting_a_referenced_driver_lists_the_blocking_shipment() {
    let (app, _state) = setup();
    let supplier_id = create_supplier(&app, "Malabar Logistics").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({
                "supplier_id": supplier_id,
                "name": "Ravi",
                "licence_number": "KL-2020-0001234"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let driver_id = body_json(response).await["id"].as_str().unwrap().to_string();

    let order = submit_order(&app, &supplier_id, Some(&driver_id)).await;
    let order_id = order["order"]["id"].as_str().unwrap();
    let response = app
        .clone()
        .oneshot(put_request(
            &format!("/orders/{order_id}/confirm"),
            json!({ "notes": "ok" }),
        ))
        .await
        .unwrap();
    let shipment_id = body_json(response).await["confirmed_order"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", &format!("/drivers/{driver_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = body_json(response).await;
    let blocking = body["blocking"].as_array().unwrap();
    assert_eq!(blocking.len(), 1);
    assert_eq!(blocking[0]["id"], shipment_id.as_str());

    // driver row remains
    let response = app.clone().oneshot(get_request("/drivers")).await.unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

    // cancel the shipment, then the delete goes through
    app.clone()
        .oneshot(put_request(
            &format!("/shipments/{shipment_id}/cancel"),
            json!({}),
        ))
        .await
        .unwrap();
    let response = app
        .oneshot(empty_request("DELETE", &format!("/drivers/{driver_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn deleting_an_assigned_vehicle_lists_the_blocking_shipment() {
    let (app, _state) = setup();
    let supplier_id = create_supplier(&app, "Malabar Logistics").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/vehicles",
            json!({
                "supplier_id": supplier_id,
                "registration_number": "KL-07-CD-5678",
                "body_type": "container"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let vehicle_id = body_json(response).await["id"].as_str().unwrap().to_string();

    let order = submit_order(&app, &supplier_id, None).await;
    let order_id = order["order"]["id"].as_str().unwrap();
    let response = app
        .clone()
        .oneshot(put_request(
            &format!("/orders/{order_id}/confirm"),
            json!({ "notes": "ok" }),
        ))
        .await
        .unwrap();
    let shipment_id = body_json(response).await["confirmed_order"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(put_request(
            &format!("/shipments/{shipment_id}/assign"),
            json!({ "vehicle_id": vehicle_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["vehicle_id"], vehicle_id.as_str());

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", &format!("/vehicles/{vehicle_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["blocking"].as_array().unwrap().len(), 1);

    app.clone()
        .oneshot(put_request(
            &format!("/shipments/{shipment_id}/cancel"),
            json!({}),
        ))
        .await
        .unwrap();
    let response = app
        .oneshot(empty_request("DELETE", &format!("/vehicles/{vehicle_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn buyer_request_walks_the_full_lifecycle() {
    let (app, _state) = setup();
    let buyer_id = create_buyer(&app, "Cochin Mills").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/requests",
            json!({
                "buyer_id": buyer_id,
                "load_description": "20t of rubber",
                "origin": location_json(),
                "destination": {
                    "state": "Tamil Nadu",
                    "district": "Coimbatore",
                    "place": "Peelamedu"
                },
                "quantity_tonnes": 20.0,
                "required_by": "2026-09-01"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let request = body_json(response).await;
    assert_eq!(request["status"], "draft");
    let request_id = request["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(put_request(&format!("/requests/{request_id}/submit"), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["request"]["status"], "pending");

    let response = app
        .clone()
        .oneshot(put_request(
            &format!("/requests/{request_id}/confirm"),
            json!({ "notes": "ok" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["request"]["status"], "confirmed");
    let shipment_id = body["confirmed_order"]["id"].as_str().unwrap().to_string();

    for expected in ["picked_up", "in_transit", "delivered"] {
        let response = app
            .clone()
            .oneshot(put_request(
                &format!("/shipments/{shipment_id}/advance"),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["shipment"]["status"], expected);
    }

    // the request mirrors the shipment's terminal status
    let response = app
        .clone()
        .oneshot(get_request(&format!("/requests/{request_id}")))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["status"], "delivered");

    // buyer was notified of confirmation and every step
    let response = app
        .oneshot(get_request(&format!("/notifications?scope=buyer:{buyer_id}")))
        .await
        .unwrap();
    let feed = body_json(response).await;
    assert_eq!(feed.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn notification_read_state_is_explicit() {
    let (app, _state) = setup();
    let supplier_id = create_supplier(&app, "Malabar Logistics").await;
    let order = submit_order(&app, &supplier_id, None).await;
    let order_id = order["order"]["id"].as_str().unwrap();

    app.clone()
        .oneshot(put_request(
            &format!("/orders/{order_id}/confirm"),
            json!({ "notes": "ok" }),
        ))
        .await
        .unwrap();

    let scope = format!("supplier:{supplier_id}");

    let response = app
        .clone()
        .oneshot(get_request(&format!("/notifications/unread?scope={scope}")))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["unread"], 1);

    // listing the feed does not mark anything read
    app.clone()
        .oneshot(get_request(&format!("/notifications?scope={scope}")))
        .await
        .unwrap();
    let response = app
        .clone()
        .oneshot(get_request(&format!("/notifications/unread?scope={scope}")))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["unread"], 1);

    let response = app
        .clone()
        .oneshot(empty_request(
            "PUT",
            &format!("/notifications/read-all?scope={scope}"),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["updated"], 1);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/notifications/unread?scope={scope}")))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["unread"], 0);

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", &format!("/notifications?scope={scope}")))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["cleared"], 1);

    let response = app
        .oneshot(get_request(&format!("/notifications?scope={scope}")))
        .await
        .unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn bad_notification_scope_returns_400() {
    let (app, _state) = setup();
    let response = app
        .oneshot(get_request("/notifications?scope=driver:abc"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dashboard_reports_rolling_trend() {
    let (app, state) = setup();
    let now = Utc::now();

    let location = Location {
        state: "Kerala".to_string(),
        district: "Ernakulam".to_string(),
        place: "Kochi".to_string(),
        taluk: None,
    };

    let order_at = |submitted_at, status| TransportOrder {
        id: Uuid::new_v4(),
        supplier_id: Uuid::new_v4(),
        location: location.clone(),
        vehicle_number: "KL-01-XX-0001".to_string(),
        body_type: "open".to_string(),
        driver_id: None,
        status,
        admin_notes: None,
        created_at: submitted_at,
        submitted_at,
        admin_action_at: None,
    };

    // current window: 10 orders, 8 confirmed; previous window: 5 orders, 2 confirmed
    for i in 0..10 {
        let status = if i < 8 {
            TransportOrderStatus::Confirmed
        } else {
            TransportOrderStatus::Pending
        };
        state
            .store
            .insert_transport_order(&order_at(now - Duration::days(5), status))
            .await
            .unwrap();
    }
    for i in 0..5 {
        let status = if i < 2 {
            TransportOrderStatus::Confirmed
        } else {
            TransportOrderStatus::Rejected
        };
        state
            .store
            .insert_transport_order(&order_at(now - Duration::days(40), status))
            .await
            .unwrap();
    }

    let response = app.oneshot(get_request("/dashboard/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"]["current_rate"], 80.0);
    assert_eq!(body["success"]["previous_rate"], 40.0);
    assert_eq!(body["success"]["trend"], "up");
    assert_eq!(body["success"]["percent_change"], 100.0);
    assert!(!body["alerts"].as_array().unwrap().is_empty());
    assert_eq!(body["totals"]["orders_total"], 15);
}

#[tokio::test]
async fn dashboard_on_empty_store_is_neutral() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/dashboard/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"]["current_rate"], 0.0);
    assert_eq!(body["success"]["trend"], "neutral");
    assert_eq!(body["alerts"][0]["code"], "operational");
}
