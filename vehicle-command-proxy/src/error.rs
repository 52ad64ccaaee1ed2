//! Proxy-specific errors (spec §4.I, §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use vehicle_command_core::Error as CoreError;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("missing or malformed Authorization header")]
    Unauthorized,

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("failed to sign telemetry config token: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("request body exceeds the configured size cap")]
    BodyTooLarge,

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("malformed command request body: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Vehicle(#[from] CoreError),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, self.to_string()).into_response()
    }
}

impl ProxyError {
    /// §7's error-kind-to-HTTP-status mapping, extended to this proxy's own
    /// request-handling errors.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Unauthorized => StatusCode::UNAUTHORIZED,
            ProxyError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(_) | ProxyError::Jwt(_) | ProxyError::Config(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Vehicle(e) => vehicle_error_status(e),
        }
    }
}

/// §7: map a vehicle-command error kind to the HTTP status the command
/// endpoint reports it as.
pub fn vehicle_error_status(error: &CoreError) -> StatusCode {
    match error {
        CoreError::Busy => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        CoreError::ProtocolNotSupported => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::NotConnected | CoreError::SessionNotEstablished => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::KeyNotPaired => StatusCode::BAD_REQUEST,
        CoreError::InvalidSignature | CoreError::InvalidTokenOrCounter => StatusCode::FORBIDDEN,
        CoreError::BadResponse | CoreError::VehicleInternal | CoreError::Proto(_) | CoreError::Crypto(_) => {
            StatusCode::BAD_GATEWAY
        }
        CoreError::Nominal(_) => StatusCode::OK,
        CoreError::Keychain(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_GATEWAY,
    }
}
