//! HTTP routes mirroring the Fleet API's command surface (spec §4.I, §6.3).

use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, post};
use axum::{Json, Router};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use vehicle_command_core::vehicle::CommandKind;
use vehicle_command_core::Error as CoreError;

use crate::auth::{bearer_token, sign_telemetry_token};
use crate::error::ProxyError;
use crate::forward::forward;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let max_body = state.config.http.max_body_bytes;

    Router::new()
        .route("/api/1/vehicles/:vin/signed_command", post(signed_command))
        .route("/api/1/vehicles/:vin/command/:name", post(command))
        .route("/api/1/vehicles/fleet_telemetry_config", post(fleet_telemetry_config))
        .fallback(any(pass_through))
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// VCSEC-domain command names (§4.H's `CommandKind::Keychain`). The full
/// command catalog is out of scope; this covers the subset that needs a
/// different domain than the default.
const KEYCHAIN_COMMANDS: &[&str] =
    &["door_lock", "door_unlock", "trunk_open", "trunk_close", "frunk_open", "honk_horn", "flash_lights"];

fn classify_command(name: &str) -> CommandKind {
    if KEYCHAIN_COMMANDS.contains(&name) {
        CommandKind::Keychain
    } else {
        CommandKind::Vehicle
    }
}

/// Translates a Fleet-API-shaped command request into a signed vehicle
/// command and back (§4.I, §6.3): parse the JSON params, hand them to the
/// embedded [`vehicle_command_core::Vehicle`], and render its outcome as
/// `{"response": {"result": ...}}`. Falls back to a transparent forward if
/// the relay has told us this VIN doesn't support the protocol, or just
/// told us so for the first time (§7 `ProtocolNotSupported`).
async fn command(
    State(state): State<AppState>,
    Path((vin, name)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    bearer_token(&headers)?;

    let guard = state.vin_locks.acquire(&vin).await;
    let _permit = guard.lock().await;

    if state.vehicles.is_unsupported(&vin) {
        return Ok(to_axum_response(forward_command(&state, &vin, &name, &headers, body).await?));
    }

    let params: serde_json::Value = if body.is_empty() {
        serde_json::Value::Object(Default::default())
    } else {
        serde_json::from_slice(&body).map_err(|e| ProxyError::BadRequest(e.to_string()))?
    };
    let payload = serde_json::to_vec(&params).map_err(|e| ProxyError::BadRequest(e.to_string()))?;

    let vehicle = state.vehicles.get_or_connect(&vin).await?;
    let kind = classify_command(&name);

    match vehicle.execute(kind, &payload).await {
        Ok(_) => Ok(Json(serde_json::json!({"response": {"result": true}})).into_response()),
        Err(CoreError::Nominal(reason)) => {
            Ok(Json(serde_json::json!({"response": {"result": false, "reason": reason}})).into_response())
        }
        Err(CoreError::ProtocolNotSupported) => {
            state.vehicles.mark_unsupported(&vin);
            tracing::info!(%vin, "vehicle does not support the command protocol, falling back to pass-through");
            Ok(to_axum_response(forward_command(&state, &vin, &name, &headers, body).await?))
        }
        Err(e) => Err(ProxyError::Vehicle(e)),
    }
}

async fn forward_command(
    state: &AppState,
    vin: &str,
    name: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<crate::forward::ForwardedResponse, ProxyError> {
    let path = format!("/api/1/vehicles/{vin}/command/{name}");
    Ok(forward(&state.http_client, &state.config.http.upstream_base_url, Method::POST, &path, headers, body).await?)
}

/// Serializes concurrent commands for the same VIN before forwarding
/// upstream unchanged (§4.I, §9).
async fn signed_command(
    State(state): State<AppState>,
    Path(vin): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    bearer_token(&headers)?;

    let guard = state.vin_locks.acquire(&vin).await;
    let _permit = guard.lock().await;

    let path = format!("/api/1/vehicles/{vin}/signed_command");
    let response =
        forward(&state.http_client, &state.config.http.upstream_base_url, Method::POST, &path, &headers, body).await?;

    Ok(to_axum_response(response))
}

/// Signs a short-lived JWT for the vehicle to authenticate its telemetry
/// stream, then forwards the request upstream with the token attached
/// (§4.I).
async fn fleet_telemetry_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    bearer_token(&headers)?;

    let signing_key = tokio::fs::read(&state.config.telemetry.signing_key_path)
        .await
        .map_err(|_| ProxyError::Unauthorized)?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
    let token = sign_telemetry_token(&signing_key, "vehicle-command-proxy", state.config.telemetry.token_ttl_secs, now)?;

    let mut forwarded_headers = headers.clone();
    forwarded_headers.insert("fleet-telemetry-token", token.parse().map_err(|_| ProxyError::Unauthorized)?);

    let response = forward(
        &state.http_client,
        &state.config.http.upstream_base_url,
        Method::POST,
        "/api/1/vehicles/fleet_telemetry_config",
        &forwarded_headers,
        body,
    )
    .await?;

    Ok(to_axum_response(response))
}

/// Every other Fleet API endpoint: forwarded unchanged.
async fn pass_through(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    uri: axum::http::Uri,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or(uri.path());
    let response = forward(&state.http_client, &state.config.http.upstream_base_url, method, path_and_query, &headers, body).await?;
    Ok(to_axum_response(response))
}

fn to_axum_response(response: crate::forward::ForwardedResponse) -> Response {
    let mut builder = Response::builder().status(response.status);
    if let Some(map) = builder.headers_mut() {
        for (name, value) in response.headers.iter() {
            map.append(name.clone(), value.clone());
        }
    }
    builder.body(axum::body::Body::from(response.body)).unwrap_or_else(|_| {
        (StatusCode::INTERNAL_SERVER_ERROR, "failed to build response").into_response()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn door_lock_classifies_as_keychain() {
        assert_eq!(classify_command("door_unlock"), CommandKind::Keychain);
    }

    #[test]
    fn unknown_command_classifies_as_vehicle() {
        assert_eq!(classify_command("set_climate_temp"), CommandKind::Vehicle);
    }
}
