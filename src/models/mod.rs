//! # Data Models
//!
//! SeaORM entities for the customer → site → probe → measurement hierarchy
//! and the per-probe latest-reading projection.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod customer;
pub mod measurement;
pub mod probe;
pub mod probe_latest_reading;
pub mod site;

pub use customer::Entity as Customer;
pub use measurement::Entity as Measurement;
pub use probe::Entity as Probe;
pub use probe_latest_reading::Entity as ProbeLatestReading;
pub use site::Entity as Site;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "probe-ingest".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
