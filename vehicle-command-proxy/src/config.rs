//! Proxy configuration, mirroring `vehicle-command-core::config` in shape
//! (see that crate's docs for why: this follows the teacher's
//! `w3b2-gateway::config::GatewayConfig` wrapping `ConnectorConfig`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProxyConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub vehicle: VehicleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Where unmatched requests are forwarded, per §4.I's pass-through path.
    pub upstream_base_url: String,
    pub request_timeout_ms: u64,
    pub max_body_bytes: usize,
}

/// Settings for signing the fleet-telemetry-config JWT (§4.I).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TelemetryConfig {
    pub signing_key_path: String,
    pub token_ttl_secs: u64,
}

/// Settings for the embedded `vehicle-command-core` client each per-VIN
/// command translation connects through (§4.I, mirroring
/// `vehicle-command-core::config::{Transport, Cache}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VehicleConfig {
    pub cache_dir: String,
    pub cache_max_entries: usize,
    pub retry_interval_ms: u64,
    pub allowed_latency_ms: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self { http: HttpConfig::default(), telemetry: TelemetryConfig::default(), vehicle: VehicleConfig::default() }
    }
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            cache_dir: "./vehicle_command_proxy_data".to_string(),
            cache_max_entries: 256,
            retry_interval_ms: 500,
            allowed_latency_ms: 3_000,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4443,
            upstream_base_url: "https://fleet-api.example.com".to_string(),
            request_timeout_ms: 10_000,
            max_body_bytes: 1 << 20,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { signing_key_path: "./telemetry_signing_key.pem".to_string(), token_ttl_secs: 3600 }
    }
}

pub fn load_config(path: &str) -> Result<ProxyConfig, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::Config::try_from(&ProxyConfig::default())?)
        .add_source(config::File::with_name(path).required(false))
        .add_source(config::Environment::with_prefix("VEHICLE_COMMAND_PROXY").separator("__"))
        .build()?;

    settings.try_deserialize()
}
