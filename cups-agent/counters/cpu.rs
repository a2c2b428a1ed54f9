// A discovered CPU and the per-address sampling state built from it

use crate::counters::{CoreMetric, DomainMetric, IioMetric, MemoryMetric};
use crate::transport::Adapter;

/// Discovery data of one present CPU
#[derive(Debug, Clone)]
pub struct Cpu {
    pub core: CoreMetric,
    pub iio: IioMetric,
    pub memory: MemoryMetric,
}

impl Cpu {
    /// Core first, then IIO, then memory on the core's bus; any gap means no CPU
    pub fn detect(adapter: &Adapter, address: u8) -> Option<Self> {
        let core = CoreMetric::detect(adapter, address)?;
        let iio = IioMetric::detect(adapter, address)?;
        let memory = MemoryMetric::detect(adapter, address, core.bus_number())?;

        Some(Self { core, iio, memory })
    }

    pub fn address(&self) -> u8 {
        self.core.address()
    }

    pub fn describe(&self) -> String {
        format!(
            "{}\n{}\n{}",
            self.core.describe(),
            self.iio.describe(),
            self.memory.describe()
        )
    }
}

/// Sampling state of one address
///
/// Built from a [`Cpu`] snapshot with fresh trackers, so samples from a CPU
/// that went away never leak into the next one seen at the same address.
#[derive(Debug, Clone)]
pub struct Utilization {
    pub core: CoreMetric,
    pub iio: IioMetric,
    pub memory: MemoryMetric,
}

impl Utilization {
    pub fn new(cpu: &Cpu) -> Self {
        let mut utilization = Self {
            core: cpu.core.clone(),
            iio: cpu.iio.clone(),
            memory: cpu.memory.clone(),
        };
        utilization.reset();
        utilization
    }

    pub fn reset(&mut self) {
        self.core.reset();
        self.iio.reset();
        self.memory.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::testing::{self, CORE_CAPACITY, IIO_CAPACITY, MEMORY_CAPACITY};
    use crate::transport::fake::FakePeci;
    use cups_raw::peci::GetCpuId;
    use std::sync::Arc;

    #[test]
    fn test_detect_complete_cpu() {
        let fake = FakePeci::new();
        testing::script_cpu(&fake, 0x31);
        let adapter = Adapter::new(Arc::new(fake));

        let cpu = Cpu::detect(&adapter, 0x31).unwrap();
        assert_eq!(cpu.address(), 0x31);
        assert_eq!(cpu.core.max_utilization(), CORE_CAPACITY);
        assert_eq!(cpu.iio.max_utilization(), IIO_CAPACITY);
        assert_eq!(cpu.memory.max_utilization(), MEMORY_CAPACITY);

        let summary = cpu.describe();
        assert!(summary.starts_with("Core 0x31"));
        assert!(summary.contains("IIO 0x31"));
        assert!(summary.contains("Memory 0x31"));
    }

    #[test]
    fn test_detect_absent() {
        let fake = FakePeci::new();
        testing::script_cpu(&fake, 0x31);
        fake.forget(0x31, &GetCpuId);
        let adapter = Adapter::new(Arc::new(fake));

        assert!(Cpu::detect(&adapter, 0x31).is_none());
        assert!(Cpu::detect(&adapter, 0x32).is_none());
    }

    #[test]
    fn test_memory_failure_drops_cpu() {
        let fake = FakePeci::new();
        testing::script_cpu(&fake, 0x31);
        fake.respond_dword(
            0x31,
            cups_raw::CpuModel::SapphireRapids.tables().memory_frequency,
            5 << 8,
        );
        let adapter = Adapter::new(Arc::new(fake));

        assert!(Cpu::detect(&adapter, 0x31).is_none());
    }

    #[test]
    fn test_utilization_starts_fresh() {
        let fake = FakePeci::new();
        testing::script_cpu(&fake, 0x31);
        let adapter = Adapter::new(Arc::new(fake));
        let cpu = Cpu::detect(&adapter, 0x31).unwrap();

        let mut first = Utilization::new(&cpu);
        assert!(matches!(first.core.delta(), Ok(None)));
        assert!(matches!(first.core.delta(), Ok(Some(_))));

        let mut second = Utilization::new(&cpu);
        assert!(matches!(second.core.delta(), Ok(None)));
    }
}
