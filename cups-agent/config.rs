// Service configuration: ranges, validation, JSON persistence

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CupsError, Result};
use crate::metrics::{LoadFactorCfg, LoadFactors};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub min: u64,
    pub max: u64,
}

impl Range {
    pub const fn contains(&self, value: u64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Tick interval, in milliseconds
pub const INTERVAL_RANGE: Range = Range { min: 100, max: 1000 };

/// Window of the rolling averages, in milliseconds
pub const AVERAGING_PERIOD_RANGE: Range = Range {
    min: 1000,
    max: 10000,
};

pub fn validate_interval(ms: u64) -> Result<()> {
    if !INTERVAL_RANGE.contains(ms) {
        return Err(CupsError::InvalidConfiguration(format!(
            "interval {} ms outside [{}, {}]",
            ms, INTERVAL_RANGE.min, INTERVAL_RANGE.max
        )));
    }
    Ok(())
}

pub fn validate_averaging_period(ms: u64) -> Result<()> {
    if !AVERAGING_PERIOD_RANGE.contains(ms) {
        return Err(CupsError::InvalidConfiguration(format!(
            "averaging period {} ms outside [{}, {}]",
            ms, AVERAGING_PERIOD_RANGE.min, AVERAGING_PERIOD_RANGE.max
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceConfig {
    pub interval_ms: u64,
    pub averaging_period_ms: u64,
    pub load_factor_cfg: LoadFactorCfg,
    pub static_load_factors: LoadFactors,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            interval_ms: INTERVAL_RANGE.max,
            averaging_period_ms: AVERAGING_PERIOD_RANGE.min,
            load_factor_cfg: LoadFactorCfg::Dynamic,
            static_load_factors: LoadFactors::default(),
        }
    }
}

/// On-disk and over-the-wire form; every field optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub averaging_period: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_factor_configuration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_load_factor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iio_load_factor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_load_factor: Option<f64>,
}

impl From<&ServiceConfig> for ConfigRecord {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            interval: Some(config.interval_ms),
            averaging_period: Some(config.averaging_period_ms),
            load_factor_configuration: Some(config.load_factor_cfg.to_string()),
            core_load_factor: Some(config.static_load_factors.core),
            iio_load_factor: Some(config.static_load_factors.iio),
            memory_load_factor: Some(config.static_load_factors.memory),
        }
    }
}

impl ConfigRecord {
    /// Parse a command-line load factor setting
    ///
    /// Either a mode name, or a `core,iio,memory` triple which selects
    /// static factors.
    pub fn from_load_factors_arg(value: &str) -> Result<Self> {
        if let Ok(cfg) = value.parse::<LoadFactorCfg>() {
            return Ok(Self {
                load_factor_configuration: Some(cfg.to_string()),
                ..Default::default()
            });
        }

        let factors: LoadFactors = value.parse()?;
        Ok(Self {
            load_factor_configuration: Some(LoadFactorCfg::Static.to_string()),
            core_load_factor: Some(factors.core),
            iio_load_factor: Some(factors.iio),
            memory_load_factor: Some(factors.memory),
            ..Default::default()
        })
    }
}

impl ServiceConfig {
    /// Build from a stored record, replacing bad values instead of failing
    pub fn normalized(record: &ConfigRecord) -> Self {
        let defaults = Self::default();

        let interval_ms = match record.interval {
            Some(ms) if INTERVAL_RANGE.contains(ms) => ms,
            Some(ms) => {
                tracing::error!(
                    "Configured interval {} ms out of range, using {} ms",
                    ms,
                    INTERVAL_RANGE.max
                );
                INTERVAL_RANGE.max
            }
            None => defaults.interval_ms,
        };

        let averaging_period_ms = match record.averaging_period {
            Some(ms) if AVERAGING_PERIOD_RANGE.contains(ms) => ms,
            Some(ms) => {
                tracing::error!(
                    "Configured averaging period {} ms out of range, using {} ms",
                    ms,
                    AVERAGING_PERIOD_RANGE.max
                );
                AVERAGING_PERIOD_RANGE.max
            }
            None => defaults.averaging_period_ms,
        };

        let load_factor_cfg = match record.load_factor_configuration.as_deref() {
            Some(name) => name.parse().unwrap_or_else(|e| {
                tracing::error!("{}, using {}", e, LoadFactorCfg::Dynamic);
                LoadFactorCfg::Dynamic
            }),
            None => defaults.load_factor_cfg,
        };

        let static_load_factors = match (
            record.core_load_factor,
            record.iio_load_factor,
            record.memory_load_factor,
        ) {
            (None, None, None) => defaults.static_load_factors,
            (core, iio, memory) => {
                let factors = LoadFactors::new(
                    core.unwrap_or(f64::NAN),
                    iio.unwrap_or(f64::NAN),
                    memory.unwrap_or(f64::NAN),
                );
                match factors.validate() {
                    Ok(()) => factors,
                    Err(e) => {
                        tracing::error!("{}, using default load factors", e);
                        LoadFactors::default()
                    }
                }
            }
        };

        Self {
            interval_ms,
            averaging_period_ms,
            load_factor_cfg,
            static_load_factors,
        }
    }

    /// Apply a partial update; the result is fully validated
    pub fn merged(&self, update: &ConfigRecord) -> Result<Self> {
        let interval_ms = update.interval.unwrap_or(self.interval_ms);
        validate_interval(interval_ms)?;

        let averaging_period_ms = update.averaging_period.unwrap_or(self.averaging_period_ms);
        validate_averaging_period(averaging_period_ms)?;

        let load_factor_cfg = match update.load_factor_configuration.as_deref() {
            Some(name) => name.parse()?,
            None => self.load_factor_cfg,
        };

        let current = self.static_load_factors;
        let static_load_factors = LoadFactors::new(
            update.core_load_factor.unwrap_or(current.core),
            update.iio_load_factor.unwrap_or(current.iio),
            update.memory_load_factor.unwrap_or(current.memory),
        );
        static_load_factors.validate()?;

        Ok(Self {
            interval_ms,
            averaging_period_ms,
            load_factor_cfg,
            static_load_factors,
        })
    }

    pub fn validate(&self) -> Result<()> {
        validate_interval(self.interval_ms)?;
        validate_averaging_period(self.averaging_period_ms)?;
        self.static_load_factors.validate()
    }
}

/// Where the configuration is persisted, if anywhere
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    path: Option<PathBuf>,
}

impl ConfigStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// A missing file yields the defaults; an unreadable one is an error
    pub fn load(&self) -> Result<ServiceConfig> {
        let Some(path) = &self.path else {
            return Ok(ServiceConfig::default());
        };
        if !path.exists() {
            tracing::warn!(
                "Config file {} not found, using defaults",
                path.display()
            );
            return Ok(ServiceConfig::default());
        }

        let contents = fs::read_to_string(path)?;
        let record: ConfigRecord = serde_json::from_str(&contents)?;
        let config = ServiceConfig::normalized(&record);
        tracing::info!("Loaded configuration from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn save(&self, config: &ServiceConfig) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let contents = serde_json::to_string_pretty(&ConfigRecord::from(config))?;
        fs::write(path, contents)?;
        tracing::debug!("Saved configuration to {}", path.display());
        Ok(())
    }
}
