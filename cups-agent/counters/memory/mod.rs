pub mod monitor;

pub use monitor::MemoryMetric;
