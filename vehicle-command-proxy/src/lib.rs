//! HTTP proxy mirroring the Fleet API's vehicle command surface.

pub mod auth;
pub mod config;
pub mod error;
pub mod forward;
pub mod http;
pub mod state;
pub mod vehicle_pool;
pub mod vin_lock;

pub use config::{load_config, ProxyConfig};
pub use error::ProxyError;
pub use state::AppState;
