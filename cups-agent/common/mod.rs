pub mod host;

pub use host::{HostState, HostStateMonitor};
