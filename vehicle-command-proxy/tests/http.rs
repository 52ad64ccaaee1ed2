//! Router-level integration tests, driven through `tower::ServiceExt::oneshot`
//! so no real listener is needed.

use std::sync::atomic::{AtomicU32, Ordering};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use vehicle_command_proxy::config::ProxyConfig;
use vehicle_command_proxy::http::router;
use vehicle_command_proxy::AppState;

static TEST_INDEX: AtomicU32 = AtomicU32::new(0);

fn test_state() -> AppState {
    let mut config = ProxyConfig::default();
    // Nothing is listening here; any forwarded request fails fast as a
    // connection error rather than hanging.
    config.http.upstream_base_url = "http://127.0.0.1:1".to_string();
    // Each call opens its own `VehiclePool` session cache, so give it a
    // private directory rather than racing other tests over the same one.
    let index = TEST_INDEX.fetch_add(1, Ordering::Relaxed);
    config.vehicle.cache_dir = format!("/tmp/vehicle-command-proxy-http-test-{}-{index}", std::process::id());
    AppState::new(config).unwrap()
}

#[tokio::test]
async fn signed_command_without_bearer_token_is_unauthorized() {
    let app = router(test_state());

    let request = Request::builder()
        .method("POST")
        .uri("/api/1/vehicles/5YJ30123456789ABC/signed_command")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signed_command_with_bearer_token_forwards_and_reports_upstream_failure() {
    let app = router(test_state());

    let request = Request::builder()
        .method("POST")
        .uri("/api/1/vehicles/5YJ30123456789ABC/signed_command")
        .header("authorization", "Bearer test-token")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    // Nothing listens on the configured upstream, so the proxy's own
    // connection attempt fails and surfaces as a gateway error rather than
    // hanging or panicking.
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn fleet_telemetry_config_without_bearer_token_is_unauthorized() {
    let app = router(test_state());

    let request = Request::builder()
        .method("POST")
        .uri("/api/1/vehicles/fleet_telemetry_config")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn fleet_telemetry_config_with_missing_signing_key_is_unauthorized() {
    let app = router(test_state());

    let request = Request::builder()
        .method("POST")
        .uri("/api/1/vehicles/fleet_telemetry_config")
        .header("authorization", "Bearer test-token")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    // The default signing key path does not exist in the test environment,
    // so token signing fails before any upstream call is made.
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn command_without_bearer_token_is_unauthorized() {
    let app = router(test_state());

    let request = Request::builder()
        .method("POST")
        .uri("/api/1/vehicles/5YJ30123456789ABC/command/door_unlock")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn command_with_malformed_json_body_is_bad_request() {
    let app = router(test_state());

    let request = Request::builder()
        .method("POST")
        .uri("/api/1/vehicles/5YJ30123456789ABC/command/door_unlock")
        .header("authorization", "Bearer test-token")
        .body(Body::from("not json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unmatched_route_falls_through_to_pass_through_forwarding() {
    let app = router(test_state());

    let request = Request::builder()
        .method("GET")
        .uri("/api/1/vehicles/5YJ30123456789ABC/vehicle_data")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
