//! HTTPS relay transport through the cloud Fleet API (spec §6.1, §6.2).
//!
//! Envelopes are base64-encoded and POSTed to the relay; the relay's
//! response body, also base64, is decoded and published on the inbound
//! broadcast channel as if it had arrived asynchronously, so the dispatcher
//! does not need to special-case this transport.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use vehicle_command_proto::{Domain, SignatureType};

use super::{Transport, INBOUND_CHANNEL_CAPACITY};
use crate::error::Error;

/// Back-off interval this transport recommends between unanswered-request
/// retries (§6.2, §7): generous enough for a cloud round trip plus relay
/// hand-off, short enough that S1/S2-style single drops recover quickly.
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Fleet API returns this when the relay's region does not own the
/// vehicle's active connection; the caller is expected to retry against
/// the host in the response's `Location` header.
const MISDIRECTED_REQUEST: u16 = 421;

/// Fleet API returns this when the vehicle does not support the relay's
/// command protocol at all, e.g. a pre-2021 Model S/X on the legacy
/// protocol (§7 "ProtocolNotSupported"). Callers mark the VIN as unsupported
/// rather than retrying.
const PROTOCOL_NOT_SUPPORTED: u16 = 422;

#[derive(Serialize)]
struct RelayRequestBody<'a> {
    routable_message: &'a str,
}

#[derive(Deserialize)]
struct RelayResponseBody {
    routable_message: String,
}

pub struct HttpsTransport {
    client: reqwest::Client,
    base_url: String,
    vin: String,
    inbound_tx: broadcast::Sender<Vec<u8>>,
    allowed_latency: Duration,
    retry_interval: Duration,
}

impl HttpsTransport {
    pub fn new(client: reqwest::Client, base_url: String, vin: String, allowed_latency: Duration) -> Self {
        let (inbound_tx, _rx) = broadcast::channel(INBOUND_CHANNEL_CAPACITY);
        Self {
            client,
            base_url,
            vin,
            inbound_tx,
            allowed_latency,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    /// Override the default retry back-off, e.g. from config.
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    fn endpoint(&self, base_url: &str) -> String {
        format!("{}/api/1/vehicles/{}/signed_command", base_url, self.vin)
    }

    async fn post(&self, base_url: &str, body: &str) -> Result<reqwest::Response, Error> {
        Ok(self
            .client
            .post(self.endpoint(base_url))
            .json(&RelayRequestBody { routable_message: body })
            .send()
            .await?)
    }
}

#[async_trait]
impl Transport for HttpsTransport {
    async fn send(&self, _domain: Domain, bytes: Vec<u8>) -> Result<(), Error> {
        let body = STANDARD.encode(bytes);

        let mut response = self.post(&self.base_url, &body).await?;
        if response.status().as_u16() == MISDIRECTED_REQUEST {
            if let Some(location) = response.headers().get(reqwest::header::LOCATION) {
                let redirected = location.to_str().unwrap_or(&self.base_url).to_string();
                tracing::warn!(%redirected, "relay returned 421, retrying against redirected host");
                response = self.post(&redirected, &body).await?;
            }
        }

        if response.status().as_u16() == PROTOCOL_NOT_SUPPORTED {
            return Err(Error::ProtocolNotSupported);
        }
        let response = response.error_for_status()?;
        let parsed: RelayResponseBody = response.json().await?;
        let raw = STANDARD
            .decode(parsed.routable_message)
            .map_err(|_| Error::TransportClosed)?;

        // Ignore send errors: no subscribers means nobody is waiting.
        let _ = self.inbound_tx.send(raw);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.inbound_tx.subscribe()
    }

    fn allowed_latency(&self) -> Duration {
        self.allowed_latency
    }

    fn preferred_auth_method(&self) -> SignatureType {
        SignatureType::HmacPersonalized
    }

    fn retry_interval(&self) -> Duration {
        self.retry_interval
    }
}
