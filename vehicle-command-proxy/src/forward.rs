//! Transparent pass-through forwarding to the Fleet API (spec §4.I).
//!
//! Requests this proxy does not specifically handle (anything other than
//! the signed-command and telemetry-config endpoints) are forwarded
//! upstream unchanged, with per-hop headers stripped, retrying once
//! against a `Location` header on a 421 Misdirected Request exactly like
//! the core crate's own relay client.

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, Method, StatusCode};

use crate::error::ProxyError;

/// Headers that are meaningful only for a single hop and must not be
/// blindly forwarded (RFC 7230 §6.1, plus the ones axum/hyper manage
/// themselves).
const HOP_BY_HOP_HEADERS: &[&str] =
    &["connection", "keep-alive", "proxy-authenticate", "proxy-authorization", "te", "trailer", "transfer-encoding", "upgrade", "host"];

const MISDIRECTED_REQUEST: u16 = 421;

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if !HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

pub struct ForwardedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Forward `method path` with `headers`/`body` to `base_url`, following a
/// single 421 redirect if the upstream returns one.
pub async fn forward(
    client: &reqwest::Client,
    base_url: &str,
    method: Method,
    path_and_query: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<ForwardedResponse, ProxyError> {
    let forwarded_headers = strip_hop_by_hop(headers);

    let send = |base: &str| {
        let url = format!("{base}{path_and_query}");
        client
            .request(method.clone(), url)
            .headers(forwarded_headers.clone())
            .body(body.clone())
            .send()
    };

    let mut response = send(base_url).await?;
    if response.status().as_u16() == MISDIRECTED_REQUEST {
        if let Some(location) = response.headers().get(reqwest::header::LOCATION) {
            if let Ok(redirected) = location.to_str() {
                tracing::warn!(%redirected, "upstream returned 421, retrying against redirected host");
                response = send(redirected).await?;
            }
        }
    }

    let status = response.status();
    let headers = strip_hop_by_hop(response.headers());
    let body = response.bytes().await?;

    Ok(ForwardedResponse { status: StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY), headers, body })
}
