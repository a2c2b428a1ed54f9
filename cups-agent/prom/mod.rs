pub mod cups;

pub use cups::CupsMetricExporter;
