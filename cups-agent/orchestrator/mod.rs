pub mod discovery;
pub mod readings;
pub mod service;

pub use discovery::Discovery;
pub use readings::Readings;
pub use service::{Command, Service, ServiceHandle, ServiceStatus};
