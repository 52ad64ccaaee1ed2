//! Lazily-connected, per-VIN [`Vehicle`] handles backing the command
//! translation endpoint (spec §4.I).
//!
//! Mirrors `vehicle-command-core`'s own CLI (`build_vehicle` in its
//! `bin/main.rs`): an [`HttpsTransport`] pointed at the upstream Fleet API
//! plus a shared [`SessionCache`], wired together the first time a VIN is
//! seen and then reused. A VIN the relay reports as unsupported (§7
//! "ProtocolNotSupported") is marked so later requests skip straight to the
//! pass-through path instead of repeating the failed translation.

use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use vehicle_command_core::transport::https::HttpsTransport;
use vehicle_command_core::transport::Transport;
use vehicle_command_core::{Error, SessionCache, Vehicle};

use crate::config::ProxyConfig;

/// Builds and caches one [`Vehicle`] per VIN this proxy has translated a
/// command for.
pub struct VehiclePool {
    http_client: reqwest::Client,
    upstream_base_url: String,
    config: Arc<ProxyConfig>,
    cache: Arc<SessionCache>,
    vehicles: DashMap<String, Arc<Vehicle>>,
    unsupported: DashSet<String>,
}

impl VehiclePool {
    pub fn new(http_client: reqwest::Client, config: Arc<ProxyConfig>) -> Result<Self, Error> {
        let cache = SessionCache::open(&config.vehicle.cache_dir, config.vehicle.cache_max_entries)?;
        Ok(Self {
            http_client,
            upstream_base_url: config.http.upstream_base_url.clone(),
            config,
            cache: Arc::new(cache),
            vehicles: DashMap::new(),
            unsupported: DashSet::new(),
        })
    }

    /// Has this VIN already told us, via a 422 from the relay, that it does
    /// not speak this protocol?
    pub fn is_unsupported(&self, vin: &str) -> bool {
        self.unsupported.contains(vin)
    }

    /// Remember that `vin` does not support the command protocol, so future
    /// requests fall back to the pass-through path without retrying.
    pub fn mark_unsupported(&self, vin: &str) {
        self.unsupported.insert(vin.to_string());
    }

    /// Fetch the pooled [`Vehicle`] for `vin`, connecting and loading its
    /// session cache on first use.
    pub async fn get_or_connect(&self, vin: &str) -> Result<Arc<Vehicle>, Error> {
        if let Some(existing) = self.vehicles.get(vin) {
            return Ok(existing.clone());
        }

        let transport: Arc<dyn Transport> = Arc::new(
            HttpsTransport::new(
                self.http_client.clone(),
                self.upstream_base_url.clone(),
                vin.to_string(),
                Duration::from_millis(self.config.vehicle.allowed_latency_ms),
            )
            .with_retry_interval(Duration::from_millis(self.config.vehicle.retry_interval_ms)),
        );

        let vehicle = Arc::new(Vehicle::new(vin.to_string(), transport).with_cache(self.cache.clone()));
        vehicle.start().await;
        vehicle.load_cache().await?;

        // Another request for the same VIN may have raced us here; whichever
        // one wins the insert is the one every future lookup returns.
        let vehicle = self.vehicles.entry(vin.to_string()).or_insert(vehicle).clone();
        Ok(vehicle)
    }
}
