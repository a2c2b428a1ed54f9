// Published sensors
//
// A sensor holds the last published value of one quantity. Failed updates
// are tolerated up to `ERROR_LIMIT - 1` times in a row; from then on each
// failure publishes NaN and asks for re-discovery through the failure
// handler. Average sensors observe their instantaneous sensor and publish a
// rolling mean of what it publishes.

use std::collections::HashMap;
use std::sync::Arc;

use crate::metrics::average::AverageCounter;
use crate::metrics::types::SensorKind;

pub const ERROR_LIMIT: u32 = 5;

/// Invoked when a sensor's failure streak reaches [`ERROR_LIMIT`]
pub type FailureHandler = Arc<dyn Fn(SensorKind) + Send + Sync>;

/// What a sensor published to its observers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub ok: bool,
    pub value: f64,
}

pub struct Sensor {
    kind: SensorKind,
    value: Option<f64>,
    error_count: u32,
    on_failure: FailureHandler,
    average: Option<AverageCounter>,
}

impl std::fmt::Debug for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sensor")
            .field("kind", &self.kind)
            .field("value", &self.value)
            .field("error_count", &self.error_count)
            .finish_non_exhaustive()
    }
}

impl Sensor {
    pub fn new(kind: SensorKind, on_failure: FailureHandler) -> Self {
        Self {
            kind,
            value: None,
            error_count: 0,
            on_failure,
            average: None,
        }
    }

    /// A sensor publishing the mean of the last `samples` values it receives
    pub fn averaging(kind: SensorKind, on_failure: FailureHandler, samples: usize) -> Self {
        Self {
            average: Some(AverageCounter::new(samples)),
            ..Self::new(kind, on_failure)
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    /// Returns the reading observers must see, if any
    pub fn update(&mut self, ok: bool, value: f64) -> Option<Reading> {
        let value = match &mut self.average {
            Some(average) if !value.is_nan() => {
                average.add(value);
                average.average()
            }
            _ => value,
        };

        if !ok {
            self.error_count = self.error_count.saturating_add(1);
            if self.error_count < ERROR_LIMIT {
                return None;
            }

            tracing::error!(
                "{}: reading failed {} times in a row, rescheduling discovery",
                self.kind.name(),
                ERROR_LIMIT
            );
            self.value = Some(f64::NAN);
            (self.on_failure)(self.kind);
            return Some(Reading {
                ok: false,
                value: f64::NAN,
            });
        }

        self.value = Some(value);
        self.error_count = 0;
        Some(Reading { ok: true, value })
    }

    /// Resize and clear the rolling mean
    pub fn config_changed(&mut self, samples: usize) {
        if let Some(average) = &mut self.average {
            average.reset(samples);
        }
    }
}

/// Number of samples covering `averaging_period_ms` at one sample per `interval_ms`
pub fn average_samples(averaging_period_ms: u64, interval_ms: u64) -> usize {
    if interval_ms == 0 {
        return 1;
    }
    ((averaging_period_ms as f64 / interval_ms as f64).round() as usize).max(1)
}

/// All published sensors, each average wired to its instantaneous sensor
#[derive(Debug)]
pub struct Sensors {
    sensors: HashMap<SensorKind, Sensor>,
}

impl Sensors {
    pub fn new(on_failure: FailureHandler, samples: usize) -> Self {
        let sensors = SensorKind::all()
            .into_iter()
            .map(|kind| {
                let sensor = if kind.is_average() {
                    Sensor::averaging(kind, on_failure.clone(), samples)
                } else {
                    Sensor::new(kind, on_failure.clone())
                };
                (kind, sensor)
            })
            .collect();

        Self { sensors }
    }

    /// Update an instantaneous sensor and forward what it publishes
    pub fn update(&mut self, kind: SensorKind, ok: bool, value: f64) {
        let Some(reading) = self.sensors.get_mut(&kind).and_then(|s| s.update(ok, value)) else {
            return;
        };

        if let Some(average) = kind.average().and_then(|k| self.sensors.get_mut(&k)) {
            average.update(reading.ok, reading.value);
        }
    }

    pub fn value(&self, kind: SensorKind) -> Option<f64> {
        self.sensors.get(&kind).and_then(Sensor::value)
    }

    pub fn get(&self, kind: SensorKind) -> Option<&Sensor> {
        self.sensors.get(&kind)
    }

    pub fn config_changed(&mut self, samples: usize) {
        tracing::debug!("Resetting averages to {} samples", samples);
        for sensor in self.sensors.values_mut() {
            sensor.config_changed(samples);
        }
    }

    /// Current values in [`SensorKind::all`] order, NaN for never-published sensors
    pub fn values(&self) -> Vec<(SensorKind, f64)> {
        SensorKind::all()
            .into_iter()
            .map(|kind| (kind, self.value(kind).unwrap_or(f64::NAN)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler() -> (FailureHandler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let handler_count = count.clone();
        let handler: FailureHandler = Arc::new(move |_| {
            handler_count.fetch_add(1, Ordering::SeqCst);
        });
        (handler, count)
    }

    #[test]
    fn test_failure_escalation() {
        let (handler, count) = counting_handler();
        let mut sensor = Sensor::new(SensorKind::HostCpuUtilization, handler);
        sensor.update(true, 42.0);

        for _ in 0..4 {
            assert_eq!(sensor.update(false, f64::NAN), None);
            assert_eq!(sensor.value(), Some(42.0));
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let reading = sensor.update(false, f64::NAN).unwrap();
        assert!(!reading.ok);
        assert!(reading.value.is_nan());
        assert!(sensor.value().unwrap().is_nan());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_success_resets_streak() {
        let (handler, count) = counting_handler();
        let mut sensor = Sensor::new(SensorKind::CupsIndex, handler);

        for _ in 0..4 {
            sensor.update(false, f64::NAN);
        }
        assert_eq!(sensor.update(true, 10.0), Some(Reading { ok: true, value: 10.0 }));
        assert_eq!(sensor.error_count(), 0);

        for _ in 0..4 {
            sensor.update(false, f64::NAN);
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_every_failure_past_limit_escalates() {
        let (handler, count) = counting_handler();
        let mut sensor = Sensor::new(SensorKind::CupsIndex, handler);

        for _ in 0..7 {
            sensor.update(false, f64::NAN);
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_nan_success_is_published() {
        let (handler, _) = counting_handler();
        let mut sensor = Sensor::new(SensorKind::HostCpuUtilization, handler);

        let reading = sensor.update(true, f64::NAN).unwrap();
        assert!(reading.ok && reading.value.is_nan());
        assert_eq!(sensor.error_count(), 0);
    }

    #[test]
    fn test_averaging_sensor() {
        let (handler, _) = counting_handler();
        let mut sensor = Sensor::averaging(SensorKind::AverageCupsIndex, handler, 2);

        sensor.update(true, 10.0);
        sensor.update(true, 20.0);
        assert_eq!(sensor.value(), Some(15.0));
        sensor.update(true, 40.0);
        assert_eq!(sensor.value(), Some(30.0));

        // NaN bypasses the mean
        sensor.update(true, f64::NAN);
        assert!(sensor.value().unwrap().is_nan());
        sensor.update(true, 50.0);
        assert_eq!(sensor.value(), Some(45.0));

        sensor.config_changed(3);
        sensor.update(true, 6.0);
        assert_eq!(sensor.value(), Some(6.0));
    }

    #[test]
    fn test_average_samples() {
        assert_eq!(average_samples(1000, 1000), 1);
        assert_eq!(average_samples(10000, 100), 100);
        assert_eq!(average_samples(1000, 300), 3);
        assert_eq!(average_samples(1000, 400), 3);
        assert_eq!(average_samples(1000, 600), 2);
        assert_eq!(average_samples(0, 100), 1);
    }

    #[test]
    fn test_sensors_forward_to_averages() {
        let (handler, _) = counting_handler();
        let mut sensors = Sensors::new(handler, 2);
        assert_eq!(sensors.value(SensorKind::AverageHostCpuUtilization), None);

        sensors.update(SensorKind::HostCpuUtilization, true, 20.0);
        sensors.update(SensorKind::HostCpuUtilization, true, 40.0);
        assert_eq!(sensors.value(SensorKind::HostCpuUtilization), Some(40.0));
        assert_eq!(sensors.value(SensorKind::AverageHostCpuUtilization), Some(30.0));
        assert_eq!(sensors.value(SensorKind::AverageCupsIndex), None);

        let values = sensors.values();
        assert_eq!(values.len(), 8);
        assert!(values
            .iter()
            .any(|(k, v)| *k == SensorKind::CupsIndex && v.is_nan()));
    }

    #[test]
    fn test_silent_failures_do_not_reach_average() {
        let (handler, _) = counting_handler();
        let mut sensors = Sensors::new(handler, 4);
        sensors.update(SensorKind::HostCpuUtilization, true, 20.0);

        for _ in 0..4 {
            sensors.update(SensorKind::HostCpuUtilization, false, f64::NAN);
        }
        assert_eq!(sensors.value(SensorKind::AverageHostCpuUtilization), Some(20.0));

        // The escalated failure reaches the average as its first failure
        sensors.update(SensorKind::HostCpuUtilization, false, f64::NAN);
        assert!(sensors.value(SensorKind::HostCpuUtilization).unwrap().is_nan());
        let average = sensors.get(SensorKind::AverageHostCpuUtilization).unwrap();
        assert_eq!(average.value(), Some(20.0));
        assert_eq!(average.error_count(), 1);
    }
}
