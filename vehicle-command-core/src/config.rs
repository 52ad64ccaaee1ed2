//! Configuration for the `vehicle-command` client (spec §6, ambient stack).

use serde::{Deserialize, Serialize};

/// Root configuration, loaded from a TOML file with an environment-variable
/// override layer (see [`load_config`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub transport: Transport,
    #[serde(default)]
    pub cache: Cache,
    #[serde(default)]
    pub logging: Logging,
}

/// Transport selection and retry tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Transport {
    /// `"ble"` or `"https"`.
    pub kind: String,
    pub retry_interval_ms: u64,
    /// Upper bound on the time a command's round trip is allowed to take
    /// before the caller gives up and reports `Error::Timeout`.
    pub allowed_latency_ms: u64,
    /// Base URL of the Fleet API relay, used when `kind == "https"`.
    pub relay_base_url: Option<String>,
}

/// Session cache persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Cache {
    pub data_dir: String,
    pub max_entries: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Logging {
    pub log_format: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            cache: Cache::default(),
            logging: Logging::default(),
        }
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            kind: "https".to_string(),
            retry_interval_ms: 500,
            allowed_latency_ms: 3_000,
            relay_base_url: None,
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            data_dir: "./vehicle_command_data".to_string(),
            max_entries: 64,
        }
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            log_format: "plain".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Load configuration from `path`, overridden by `VEHICLE_COMMAND__*`
/// environment variables (double underscore separates nested keys).
pub fn load_config(path: &str) -> Result<Config, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(config::File::with_name(path).required(false))
        .add_source(config::Environment::with_prefix("VEHICLE_COMMAND").separator("__"))
        .build()?;

    settings.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let cfg = Config::default();
        assert_eq!(cfg.transport.kind, "https");
        assert!(cfg.transport.allowed_latency_ms > 0);
    }
}
