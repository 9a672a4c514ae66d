//! Registry Store (C3) and Health Monitor (C4): the authoritative,
//! durably-snapshotted map of registered MCPs and their liveness.

pub mod error;
pub mod health;
pub mod store;

pub use error::RegistryError;
pub use health::{HealthMonitor, HeartbeatMetrics};
pub use store::{RegistryFilter, RegistryStore};
