//! Shared application state handed to every axum route.

use std::sync::Arc;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::vehicle_pool::VehiclePool;
use crate::vin_lock::VinLocks;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub http_client: reqwest::Client,
    pub vin_locks: Arc<VinLocks>,
    pub vehicles: Arc<VehiclePool>,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.http.request_timeout_ms))
            .build()?;

        let config = Arc::new(config);
        let vehicles = Arc::new(VehiclePool::new(http_client.clone(), config.clone())?);

        Ok(Self { config, http_client, vin_locks: Arc::new(VinLocks::new()), vehicles })
    }
}
