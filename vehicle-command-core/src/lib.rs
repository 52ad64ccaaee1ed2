//! Session management, message dispatch, and transports for the vehicle
//! command protocol.

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod session;
pub mod transport;
pub mod vehicle;

pub use cache::SessionCache;
pub use config::Config;
pub use dispatcher::Dispatcher;
pub use error::Error;
pub use registry::{ReceiverKey, ReceiverRegistry};
pub use session::SessionContext;
pub use vehicle::Vehicle;
