// Weights of the three domains in the CUPS index

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::counters::convert_to_percent;
use crate::error::{CupsError, Result};

/// Each factor lies in this range, in percent
pub const LOAD_FACTOR_RANGE: (f64, f64) = (0.0, 100.0);

const SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadFactors {
    pub core: f64,
    pub iio: f64,
    pub memory: f64,
}

impl Default for LoadFactors {
    fn default() -> Self {
        Self {
            core: 33.3,
            iio: 33.3,
            memory: 33.4,
        }
    }
}

impl LoadFactors {
    pub fn new(core: f64, iio: f64, memory: f64) -> Self {
        Self { core, iio, memory }
    }

    pub fn sum(&self) -> f64 {
        self.core + self.iio + self.memory
    }

    /// Every factor in range and the three adding up to 100
    pub fn validate(&self) -> Result<()> {
        let (min, max) = LOAD_FACTOR_RANGE;
        for (name, value) in [("core", self.core), ("iio", self.iio), ("memory", self.memory)] {
            if !(min..=max).contains(&value) {
                return Err(CupsError::InvalidConfiguration(format!(
                    "{name} load factor {value} outside [{min}, {max}]"
                )));
            }
        }

        let sum = self.sum();
        if (sum - 100.0).abs() > SUM_TOLERANCE {
            return Err(CupsError::InvalidConfiguration(format!(
                "load factors sum to {sum}, expected 100"
            )));
        }
        Ok(())
    }

    /// Factors proportional to the rolling averages of each domain
    ///
    /// A missing average leaves no factors at all.
    pub fn dynamic(core: Option<f64>, iio: Option<f64>, memory: Option<f64>) -> Option<Self> {
        let (core, iio, memory) = (core?, iio?, memory?);
        let sum = core + iio + memory;
        Some(Self {
            core: convert_to_percent(core, sum),
            iio: convert_to_percent(iio, sum),
            memory: convert_to_percent(memory, sum),
        })
    }

    /// Weighted sum of the domain utilizations, in percent
    pub fn weigh(&self, core: f64, iio: f64, memory: f64) -> f64 {
        (core * self.core + iio * self.iio + memory * self.memory) / 100.0
    }
}

impl FromStr for LoadFactors {
    type Err = CupsError;

    /// `core,iio,memory`
    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| CupsError::InvalidConfiguration(format!("load factors '{s}': {e}")))?;

        match values.as_slice() {
            [core, iio, memory] => Ok(Self::new(*core, *iio, *memory)),
            _ => Err(CupsError::InvalidConfiguration(format!(
                "load factors '{s}': expected core,iio,memory"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadFactorCfg {
    #[default]
    Dynamic,
    Static,
}

impl LoadFactorCfg {
    pub fn name(&self) -> &'static str {
        match self {
            LoadFactorCfg::Dynamic => "Dynamic",
            LoadFactorCfg::Static => "Static",
        }
    }
}

impl fmt::Display for LoadFactorCfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LoadFactorCfg {
    type Err = CupsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Dynamic" => Ok(LoadFactorCfg::Dynamic),
            "Static" => Ok(LoadFactorCfg::Static),
            other => Err(CupsError::InvalidConfiguration(format!(
                "unknown load factor configuration '{other}'"
            ))),
        }
    }
}
