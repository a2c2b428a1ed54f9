pub mod average;
pub mod load_factors;
pub mod sensor;
pub mod types;

pub use average::AverageCounter;
pub use load_factors::{LoadFactorCfg, LoadFactors};
pub use sensor::{FailureHandler, Reading, Sensor, Sensors};
pub use types::{Domain, SensorKind};
