use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use carvia_api::state::{AppState, AuthConfig};
use carvia_api::app;
use carvia_domain::memory::{MemoryStore, RecordingNotifier};
use carvia_domain::BookingLedger;

const TEST_SECRET: &str = "test-secret";

#[derive(Serialize)]
struct Claims {
    sub: String,
    email: String,
    exp: usize,
}

fn token_for(user_id: Uuid) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        email: "rider@example.com".to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap()
}

fn test_app() -> (Router, Arc<MemoryStore>, Uuid) {
    let store = Arc::new(MemoryStore::new());
    let car_id = store.add_car("Tesla Model 3", 7500);
    let ledger = BookingLedger::new(
        store.clone(),
        store.clone(),
        Arc::new(RecordingNotifier::default()),
    );
    let state = AppState {
        ledger: Arc::new(ledger),
        auth: AuthConfig {
            secret: TEST_SECRET.to_string(),
        },
    };
    (app(state), store, car_id)
}

// Offsets are taken from one base instant per test so back-to-back windows
// really share their boundary timestamp.
fn at(base: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    base + Duration::hours(hours)
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn create_body(base: DateTime<Utc>, car_id: Uuid, pickup_h: i64, dropoff_h: i64) -> Value {
    json!({
        "carId": car_id,
        "pickupTime": at(base, pickup_h).to_rfc3339(),
        "dropoffTime": at(base, dropoff_h).to_rfc3339(),
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_create_booking_returns_201_with_price() {
    let (app, _, car_id) = test_app();
    let base = Utc::now();
    let token = token_for(Uuid::new_v4());

    let res = app
        .oneshot(request(
            "POST",
            "/bookings",
            Some(&token),
            Some(create_body(base, car_id, 24, 48)),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    let body = body_json(res).await;
    assert_eq!(body["success"], json!(true));
    let data = &body["data"];
    assert_eq!(data["carId"], json!(car_id));
    assert_eq!(data["totalPriceCents"], json!(7500));
    assert_eq!(data["status"], json!("confirmed"));
    assert_eq!(data["car"]["name"], json!("Tesla Model 3"));
}

#[tokio::test]
async fn test_create_requires_token() {
    let (app, _, car_id) = test_app();
    let base = Utc::now();

    let res = app
        .oneshot(request(
            "POST",
            "/bookings",
            None,
            Some(create_body(base, car_id, 24, 48)),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(res).await;
    assert_eq!(body["error"]["code"], json!("UNAUTHORIZED"));
}

#[tokio::test]
async fn test_create_past_pickup_is_400() {
    let (app, _, car_id) = test_app();
    let base = Utc::now();
    let token = token_for(Uuid::new_v4());
    let body = json!({
        "carId": car_id,
        "pickupTime": (base - Duration::hours(2)).to_rfc3339(),
        "dropoffTime": at(base, 24).to_rfc3339(),
    });

    let res = app
        .oneshot(request("POST", "/bookings", Some(&token), Some(body)))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = body_json(res).await;
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
}

#[tokio::test]
async fn test_create_missing_field_is_400_envelope() {
    let (app, _, _) = test_app();
    let base = Utc::now();
    let token = token_for(Uuid::new_v4());
    // carId omitted entirely
    let body = json!({
        "pickupTime": at(base, 24).to_rfc3339(),
        "dropoffTime": at(base, 48).to_rfc3339(),
    });

    let res = app
        .oneshot(request("POST", "/bookings", Some(&token), Some(body)))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = body_json(res).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
    // Deserializer internals stay out of the response
    let message = body["error"]["message"].as_str().unwrap();
    assert!(!message.contains("deserialize"));
}

#[tokio::test]
async fn test_create_malformed_json_is_400_envelope() {
    let (app, _, _) = test_app();
    let token = token_for(Uuid::new_v4());

    let req = Request::builder()
        .method("POST")
        .uri("/bookings")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let res = app.oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = body_json(res).await;
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
}

#[tokio::test]
async fn test_create_unknown_car_is_404() {
    let (app, _, _) = test_app();
    let base = Utc::now();
    let token = token_for(Uuid::new_v4());

    let res = app
        .oneshot(request(
            "POST",
            "/bookings",
            Some(&token),
            Some(create_body(base, Uuid::new_v4(), 24, 48)),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body = body_json(res).await;
    assert_eq!(body["error"]["code"], json!("NOT_FOUND"));
}

#[tokio::test]
async fn test_overlapping_create_is_409() {
    let (app, _, car_id) = test_app();
    let base = Utc::now();
    let token = token_for(Uuid::new_v4());

    let res = app
        .clone()
        .oneshot(request(
            "POST",
            "/bookings",
            Some(&token),
            Some(create_body(base, car_id, 24, 72)),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = app
        .oneshot(request(
            "POST",
            "/bookings",
            Some(&token),
            Some(create_body(base, car_id, 48, 96)),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body = body_json(res).await;
    assert_eq!(body["error"]["code"], json!("CONFLICT"));
}

#[tokio::test]
async fn test_back_to_back_windows_both_succeed() {
    let (app, _, car_id) = test_app();
    let base = Utc::now();
    let token = token_for(Uuid::new_v4());

    // Second window starts at the exact timestamp the first ends
    for (pickup, dropoff) in [(24, 48), (48, 72)] {
        let res = app
            .clone()
            .oneshot(request(
                "POST",
                "/bookings",
                Some(&token),
                Some(create_body(base, car_id, pickup, dropoff)),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }
}

#[tokio::test]
async fn test_list_and_get_round_trip() {
    let (app, _, car_id) = test_app();
    let base = Utc::now();
    let user = Uuid::new_v4();
    let token = token_for(user);

    let res = app
        .clone()
        .oneshot(request(
            "POST",
            "/bookings",
            Some(&token),
            Some(create_body(base, car_id, 24, 48)),
        ))
        .await
        .unwrap();
    let created = body_json(res).await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(request("GET", "/bookings", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let listed = body_json(res).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);

    let res = app
        .clone()
        .oneshot(request("GET", &format!("/bookings/{id}"), Some(&token), None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Another user cannot see the booking
    let other = token_for(Uuid::new_v4());
    let res = app
        .oneshot(request("GET", &format!("/bookings/{id}"), Some(&other), None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_then_cancel_again_is_404() {
    let (app, _, car_id) = test_app();
    let base = Utc::now();
    let token = token_for(Uuid::new_v4());

    let res = app
        .clone()
        .oneshot(request(
            "POST",
            "/bookings",
            Some(&token),
            Some(create_body(base, car_id, 24, 48)),
        ))
        .await
        .unwrap();
    let created = body_json(res).await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(request("DELETE", &format!("/bookings/{id}"), Some(&token), None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cancelled = body_json(res).await;
    assert_eq!(cancelled["data"]["status"], json!("cancelled"));

    let res = app
        .oneshot(request("DELETE", &format!("/bookings/{id}"), Some(&token), None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_availability_round_trip() {
    let (app, _, car_id) = test_app();
    let base = Utc::now();
    let token = token_for(Uuid::new_v4());

    let res = app
        .clone()
        .oneshot(request(
            "POST",
            "/bookings",
            Some(&token),
            Some(create_body(base, car_id, 240, 360)),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    // Window inside the booking: unavailable. No auth on this endpoint.
    let res = app
        .clone()
        .oneshot(request(
            "POST",
            "/bookings/availability",
            None,
            Some(json!({
                "carIds": [car_id],
                "pickupTime": at(base, 280).to_rfc3339(),
                "dropoffTime": at(base, 300).to_rfc3339(),
            })),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["data"][car_id.to_string()], json!(false));

    // Disjoint window: available
    let res = app
        .oneshot(request(
            "POST",
            "/bookings/availability",
            None,
            Some(json!({
                "carIds": [car_id],
                "pickupTime": at(base, 400).to_rfc3339(),
                "dropoffTime": at(base, 420).to_rfc3339(),
            })),
        ))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["data"][car_id.to_string()], json!(true));
}

#[tokio::test]
async fn test_availability_empty_input_is_empty_map() {
    let (app, store, _) = test_app();
    let base = Utc::now();

    let res = app
        .oneshot(request(
            "POST",
            "/bookings/availability",
            None,
            Some(json!({
                "carIds": [],
                "pickupTime": at(base, 24).to_rfc3339(),
                "dropoffTime": at(base, 48).to_rfc3339(),
            })),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["data"], json!({}));
    assert_eq!(store.availability_queries(), 0);
}

#[tokio::test]
async fn test_availability_inverted_window_is_400() {
    let (app, _, car_id) = test_app();
    let base = Utc::now();

    let res = app
        .oneshot(request(
            "POST",
            "/bookings/availability",
            None,
            Some(json!({
                "carIds": [car_id],
                "pickupTime": at(base, 48).to_rfc3339(),
                "dropoffTime": at(base, 24).to_rfc3339(),
            })),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_concurrent_creates_exactly_one_wins() {
    let (app, _, car_id) = test_app();
    let base = Utc::now();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let app = app.clone();
        let body = create_body(base, car_id, 24, 72);
        handles.push(tokio::spawn(async move {
            let token = token_for(Uuid::new_v4());
            let res = app
                .oneshot(request("POST", "/bookings", Some(&token), Some(body)))
                .await
                .unwrap();
            res.status()
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => conflicts += 1,
            other => panic!("unexpected status: {other}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 7);
}
