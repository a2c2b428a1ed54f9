use prometheus::{Gauge, GaugeVec, IntGauge, Opts, Registry};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::metrics::{Domain, LoadFactors, SensorKind};
use crate::orchestrator::{ServiceHandle, ServiceStatus};

const NAMESPACE: &str = "cups";

pub struct CupsMetricExporter {
    registry: Arc<Registry>,
    handle: ServiceHandle,
    sensor_gauges: HashMap<SensorKind, Gauge>,
    load_factors: GaugeVec,
    interval: IntGauge,
    cpu_count: IntGauge,
}

impl CupsMetricExporter {
    pub fn new(handle: ServiceHandle) -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let mut sensor_gauges = HashMap::new();
        for kind in SensorKind::all() {
            let opts = Opts::new(kind.name(), format!("CUPS {} sensor", kind.name()))
                .namespace(NAMESPACE);
            let gauge = Gauge::with_opts(opts)?;
            registry.register(Box::new(gauge.clone()))?;
            sensor_gauges.insert(kind, gauge);
        }

        let load_factors = GaugeVec::new(
            Opts::new("load_factor", "Weight of a domain in the CUPS index, in percent")
                .namespace(NAMESPACE),
            &["mode", "domain"],
        )?;
        registry.register(Box::new(load_factors.clone()))?;

        let interval = IntGauge::with_opts(
            Opts::new("interval_ms", "Sampling interval in milliseconds").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(interval.clone()))?;

        let cpu_count = IntGauge::with_opts(
            Opts::new("cpu_count", "Number of CPUs found by the last discovery")
                .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(cpu_count.clone()))?;

        Ok(Self {
            registry,
            handle,
            sensor_gauges,
            load_factors,
            interval,
            cpu_count,
        })
    }

    /// Copy the service status into the gauges
    pub fn collect(&self) {
        self.update(&self.handle.status());
    }

    pub fn update(&self, status: &ServiceStatus) {
        for (kind, value) in &status.sensors {
            if let Some(gauge) = self.sensor_gauges.get(kind) {
                gauge.set(*value);
            }
        }

        self.set_load_factors("static", Some(status.config.static_load_factors));
        self.set_load_factors("dynamic", status.dynamic_load_factors);

        self.interval.set(status.config.interval_ms as i64);
        self.cpu_count.set(status.cpu_count as i64);
    }

    fn set_load_factors(&self, mode: &str, factors: Option<LoadFactors>) {
        for domain in Domain::all() {
            let value = match (factors, domain) {
                (Some(f), Domain::Core) => f.core,
                (Some(f), Domain::Iio) => f.iio,
                (Some(f), Domain::Memory) => f.memory,
                (None, _) => f64::NAN,
            };
            self.load_factors
                .with_label_values(&[mode, domain.name()])
                .set(value);
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }
}
