// Macros (must be first for visibility)
#[macro_use]
pub mod macros;

pub mod api;
pub mod common;
pub mod config;
pub mod counters;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod prom;
pub mod transport;

pub use config::{ConfigRecord, ConfigStore, ServiceConfig};
pub use error::{CupsError, Result};
pub use orchestrator::{Service, ServiceHandle, ServiceStatus};
pub use prom::CupsMetricExporter;
pub use transport::{Adapter, DevPeci};
