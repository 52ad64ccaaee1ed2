//! OAuth bearer token parsing and fleet-telemetry-config JWT signing (spec §4.I).

use axum::http::HeaderMap;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;

use crate::error::ProxyError;

/// Extracts the bearer token from an `Authorization` header, unmodified —
/// the proxy never inspects or validates the token itself, only forwards
/// it upstream (§4.I treats OAuth validation as the Fleet API's job).
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ProxyError> {
    let value = headers.get(axum::http::header::AUTHORIZATION).ok_or(ProxyError::Unauthorized)?;
    let value = value.to_str().map_err(|_| ProxyError::Unauthorized)?;
    value.strip_prefix("Bearer ").ok_or(ProxyError::Unauthorized)
}

#[derive(Serialize)]
struct TelemetryClaims {
    iss: String,
    iat: i64,
    exp: i64,
}

/// Sign a short-lived JWT asserting this proxy's identity, for the
/// fleet-telemetry-config endpoint (§4.I). `unix_now` is passed in rather
/// than read from the system clock so callers control the claim window.
pub fn sign_telemetry_token(signing_key_pem: &[u8], issuer: &str, ttl_secs: u64, unix_now: i64) -> Result<String, ProxyError> {
    let claims = TelemetryClaims { iss: issuer.to_string(), iat: unix_now, exp: unix_now + ttl_secs as i64 };
    let key = EncodingKey::from_ec_pem(signing_key_pem)?;
    Ok(encode(&Header::new(jsonwebtoken::Algorithm::ES256), &claims, &key)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_strips_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc123");
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());
    }

    #[test]
    fn non_bearer_scheme_is_unauthorized() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert!(bearer_token(&headers).is_err());
    }
}
