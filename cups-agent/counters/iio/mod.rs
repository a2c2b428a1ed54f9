pub mod monitor;

pub use monitor::{ActiveLink, IioMetric};
