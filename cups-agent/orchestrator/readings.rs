// Utilization aggregation, once per tick
//
// Per domain the deltas of all present CPUs are summed and compared with
// their summed capacity. The CUPS index weighs the three domains with the
// active load factors.

use std::collections::BTreeMap;

use crate::counters::{convert_to_percent, Cpu, DomainMetric, Utilization};
use crate::metrics::{Domain, LoadFactorCfg, LoadFactors, SensorKind, Sensors};

/// Outcome of summing one domain over all CPUs
#[derive(Debug, Clone, Copy, PartialEq)]
enum DomainSum {
    /// A counter read failed on some CPU
    Failed,
    /// Some CPU has no rate yet
    Pending,
    Ready { delta: f64, max: u64 },
}

#[derive(Debug, Default)]
pub struct Readings {
    utilization: BTreeMap<u8, Utilization>,
    dynamic_factors: Option<LoadFactors>,
}

impl Readings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dynamic_factors(&self) -> Option<LoadFactors> {
        self.dynamic_factors
    }

    pub fn tracked_addresses(&self) -> Vec<u8> {
        self.utilization.keys().copied().collect()
    }

    pub fn tick(
        &mut self,
        cpus: &[Cpu],
        host_off: bool,
        sensors: &mut Sensors,
        load_factor_cfg: LoadFactorCfg,
        static_factors: LoadFactors,
    ) {
        self.update_cpu_state(cpus);

        if host_off && !cpus.is_empty() {
            for domain in Domain::all() {
                sensors.update(SensorKind::utilization(domain), true, f64::NAN);
            }
        } else {
            for domain in Domain::all() {
                let kind = SensorKind::utilization(domain);
                match self.sum(domain) {
                    DomainSum::Failed => sensors.update(kind, false, f64::NAN),
                    DomainSum::Pending => {}
                    DomainSum::Ready { delta, max } => {
                        sensors.update(kind, true, convert_to_percent(delta, max as f64))
                    }
                }
            }
        }

        self.update_cups_index(sensors, load_factor_cfg, static_factors);
    }

    /// Track new addresses from scratch and forget vanished ones
    fn update_cpu_state(&mut self, cpus: &[Cpu]) {
        self.utilization
            .retain(|address, _| cpus.iter().any(|cpu| cpu.address() == *address));

        for cpu in cpus {
            self.utilization
                .entry(cpu.address())
                .or_insert_with(|| Utilization::new(cpu));
        }
    }

    fn sum(&mut self, domain: Domain) -> DomainSum {
        let mut failed = false;
        let mut pending = false;
        let mut delta = 0.0;
        let mut max = 0u64;

        for utilization in self.utilization.values_mut() {
            let metric: &mut dyn DomainMetric = match domain {
                Domain::Core => &mut utilization.core,
                Domain::Iio => &mut utilization.iio,
                Domain::Memory => &mut utilization.memory,
            };

            match metric.delta() {
                Ok(Some(rate)) => delta += rate,
                Ok(None) => pending = true,
                Err(_) => failed = true,
            }
            max += metric.max_utilization();
        }

        if failed {
            DomainSum::Failed
        } else if pending {
            DomainSum::Pending
        } else {
            DomainSum::Ready { delta, max }
        }
    }

    fn update_cups_index(
        &mut self,
        sensors: &mut Sensors,
        load_factor_cfg: LoadFactorCfg,
        static_factors: LoadFactors,
    ) {
        self.dynamic_factors = LoadFactors::dynamic(
            sensors.value(SensorKind::AverageHostCpuUtilization),
            sensors.value(SensorKind::AverageHostPciBandwidthUtilization),
            sensors.value(SensorKind::AverageHostMemoryBandwidthUtilization),
        );

        let factors = match load_factor_cfg {
            LoadFactorCfg::Static => Some(static_factors),
            LoadFactorCfg::Dynamic => self.dynamic_factors,
        };

        let index = match (
            factors,
            sensors.value(SensorKind::HostCpuUtilization),
            sensors.value(SensorKind::HostPciBandwidthUtilization),
            sensors.value(SensorKind::HostMemoryBandwidthUtilization),
        ) {
            (Some(factors), Some(core), Some(iio), Some(memory)) => {
                factors.weigh(core, iio, memory)
            }
            _ => f64::NAN,
        };

        sensors.update(SensorKind::CupsIndex, true, index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::testing::{self, CORE_CAPACITY};
    use crate::metrics::FailureHandler;
    use crate::transport::fake::FakePeci;
    use crate::transport::Adapter;
    use cups_raw::peci::GetCpuC0Counter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        fake: FakePeci,
        cpus: Vec<Cpu>,
        sensors: Sensors,
        readings: Readings,
        failures: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn new(addresses: &[u8]) -> Self {
            let fake = FakePeci::new();
            for address in addresses {
                testing::script_cpu(&fake, *address);
            }
            let adapter = Adapter::new(Arc::new(fake.clone()));
            let cpus = addresses
                .iter()
                .filter_map(|a| Cpu::detect(&adapter, *a))
                .collect();

            let failures = Arc::new(AtomicUsize::new(0));
            let counter = failures.clone();
            let handler: FailureHandler = Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

            Self {
                fake,
                cpus,
                sensors: Sensors::new(handler, 1),
                readings: Readings::new(),
                failures,
            }
        }

        fn tick(&mut self, host_off: bool, cfg: LoadFactorCfg, factors: LoadFactors) {
            self.readings
                .tick(&self.cpus, host_off, &mut self.sensors, cfg, factors);
        }

        fn tick_dynamic(&mut self) {
            self.tick(false, LoadFactorCfg::Dynamic, LoadFactors::default());
        }

        fn value(&self, kind: SensorKind) -> Option<f64> {
            self.sensors.value(kind)
        }
    }

    #[test]
    fn test_first_tick_publishes_nothing_but_index() {
        let mut f = Fixture::new(&[0x30]);
        f.tick_dynamic();

        assert_eq!(f.value(SensorKind::HostCpuUtilization), None);
        assert_eq!(f.value(SensorKind::HostMemoryBandwidthUtilization), None);
        assert!(f.value(SensorKind::CupsIndex).unwrap().is_nan());
        assert_eq!(f.readings.tracked_addresses(), vec![0x30]);
    }

    #[test]
    fn test_domain_percentages() {
        let mut f = Fixture::new(&[0x30]);
        f.tick_dynamic();

        std::thread::sleep(Duration::from_millis(20));
        f.fake.respond_c0(0x30, CORE_CAPACITY / 100);
        testing::set_memory_counters(&f.fake, 0x30, 1000, 1000);
        f.tick_dynamic();

        let core = f.value(SensorKind::HostCpuUtilization).unwrap();
        assert!(core > 0.0 && core.is_finite());
        let memory = f.value(SensorKind::HostMemoryBandwidthUtilization).unwrap();
        assert!(memory > 0.0 && memory < 100.0);
        let iio = f.value(SensorKind::HostPciBandwidthUtilization).unwrap();
        assert_eq!(iio, 0.0);

        // Averages exist for all three domains, so dynamic factors do too
        let factors = f.readings.dynamic_factors().unwrap();
        assert!((factors.sum() - 100.0).abs() < 1e-6);
        assert!(f.value(SensorKind::CupsIndex).unwrap().is_finite());
    }

    #[test]
    fn test_no_cpus_is_nan() {
        let mut f = Fixture::new(&[]);
        f.tick_dynamic();

        for domain in Domain::all() {
            assert!(f.value(SensorKind::utilization(domain)).unwrap().is_nan());
        }
        assert!(f.value(SensorKind::CupsIndex).unwrap().is_nan());
    }

    #[test]
    fn test_host_off_forces_nan() {
        let mut f = Fixture::new(&[0x30]);
        f.tick_dynamic();
        f.fake.respond_c0(0x30, 1_000_000);
        f.tick(true, LoadFactorCfg::Static, LoadFactors::default());

        for domain in Domain::all() {
            let sensor = f.sensors.get(SensorKind::utilization(domain)).unwrap();
            assert!(sensor.value().unwrap().is_nan());
            assert_eq!(sensor.error_count(), 0);
        }
        assert!(f.value(SensorKind::CupsIndex).unwrap().is_nan());
    }

    #[test]
    fn test_failed_read_escalates_after_five_ticks() {
        let mut f = Fixture::new(&[0x30]);
        f.tick_dynamic();
        f.tick_dynamic();
        assert!(f.value(SensorKind::HostCpuUtilization).is_some());

        f.fake.forget(0x30, &GetCpuC0Counter);
        for _ in 0..4 {
            f.tick_dynamic();
        }
        assert_eq!(f.failures.load(Ordering::SeqCst), 0);
        assert!(!f.value(SensorKind::HostCpuUtilization).unwrap().is_nan());

        f.tick_dynamic();
        assert_eq!(f.failures.load(Ordering::SeqCst), 1);
        assert!(f.value(SensorKind::HostCpuUtilization).unwrap().is_nan());
    }

    #[test]
    fn test_vanished_cpu_state_is_dropped() {
        let mut f = Fixture::new(&[0x30, 0x31]);
        f.tick_dynamic();
        assert_eq!(f.readings.tracked_addresses(), vec![0x30, 0x31]);

        let remaining: Vec<Cpu> = f.cpus.iter().filter(|c| c.address() == 0x30).cloned().collect();
        f.cpus = remaining;
        f.tick_dynamic();
        assert_eq!(f.readings.tracked_addresses(), vec![0x30]);
    }

    #[test]
    fn test_reappearing_cpu_starts_fresh() {
        let mut f = Fixture::new(&[0x30, 0x31]);
        let all = f.cpus.clone();
        f.tick_dynamic();
        f.tick_dynamic();
        assert_eq!(f.value(SensorKind::HostCpuUtilization), Some(0.0));

        f.cpus = all.iter().filter(|c| c.address() == 0x30).cloned().collect();
        f.tick_dynamic();
        assert_eq!(f.value(SensorKind::HostCpuUtilization), Some(0.0));

        // 0x31 comes back with fresh trackers, so the domain waits a tick
        f.cpus = all;
        f.fake.respond_c0(0x30, 5_000_000);
        f.tick_dynamic();
        assert_eq!(f.value(SensorKind::HostCpuUtilization), Some(0.0));

        f.tick_dynamic();
        assert_eq!(f.value(SensorKind::HostCpuUtilization), Some(0.0));
    }

    #[test]
    fn test_index_requires_every_domain() {
        let mut f = Fixture::new(&[]);
        f.sensors.update(SensorKind::HostCpuUtilization, true, 50.0);
        f.sensors.update(SensorKind::HostPciBandwidthUtilization, true, f64::NAN);
        f.sensors.update(SensorKind::HostMemoryBandwidthUtilization, true, 30.0);

        let factors = LoadFactors::new(40.0, 30.0, 30.0);
        f.readings
            .update_cups_index(&mut f.sensors, LoadFactorCfg::Static, factors);
        assert!(f.value(SensorKind::CupsIndex).unwrap().is_nan());

        f.sensors.update(SensorKind::HostPciBandwidthUtilization, true, 10.0);
        f.readings
            .update_cups_index(&mut f.sensors, LoadFactorCfg::Static, factors);
        let index = f.value(SensorKind::CupsIndex).unwrap();
        assert!((index - 32.0).abs() < 1e-9);
    }

    #[test]
    fn test_dynamic_factors_follow_averages() {
        let mut f = Fixture::new(&[]);
        f.sensors.update(SensorKind::HostCpuUtilization, true, 10.0);
        f.sensors.update(SensorKind::HostPciBandwidthUtilization, true, 20.0);
        f.readings
            .update_cups_index(&mut f.sensors, LoadFactorCfg::Dynamic, LoadFactors::default());
        assert_eq!(f.readings.dynamic_factors(), None);
        assert!(f.value(SensorKind::CupsIndex).unwrap().is_nan());

        f.sensors.update(SensorKind::HostMemoryBandwidthUtilization, true, 70.0);
        f.readings
            .update_cups_index(&mut f.sensors, LoadFactorCfg::Dynamic, LoadFactors::default());
        let factors = f.readings.dynamic_factors().unwrap();
        assert!((factors.core - 10.0).abs() < 1e-9);
        assert!((factors.iio - 20.0).abs() < 1e-9);
        assert!((factors.memory - 70.0).abs() < 1e-9);

        // 10*10 + 20*20 + 70*70, over 100
        let index = f.value(SensorKind::CupsIndex).unwrap();
        assert!((index - 54.0).abs() < 1e-9);
    }
}
