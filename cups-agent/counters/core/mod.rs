pub mod monitor;

pub use monitor::CoreMetric;
