// Core utilization: C0 residency against the turbo-aware clock capacity

use cups_raw::arch::core::RATIO_UNIT_MHZ;
use cups_raw::CpuModel;

use crate::counters::tracker::{mhz_to_hz, CounterTracker};
use crate::counters::{identify, DomainMetric};
use crate::error::{CupsError, Result};
use crate::transport::Adapter;

#[derive(Debug, Clone)]
pub struct CoreMetric {
    adapter: Adapter,
    address: u8,
    cpu_id: u32,
    model: CpuModel,
    bus_number: u8,
    core_mask: u64,
    core_count: u32,
    max_non_turbo_mhz: u32,
    max_turbo_mhz: u32,
    turbo_enabled: bool,
    c0: CounterTracker<64>,
}

impl CoreMetric {
    pub fn detect(adapter: &Adapter, address: u8) -> Option<Self> {
        let (cpu_id, model) = identify(adapter, address)?;

        match Self::discover(adapter, address, cpu_id, model) {
            Ok(metric) => Some(metric),
            Err(e) => {
                tracing::error!("Core discovery failed: {}", e);
                None
            }
        }
    }

    fn discover(adapter: &Adapter, address: u8, cpu_id: u32, model: CpuModel) -> Result<Self> {
        let low = discover!(address, adapter.get_core_mask_low(address, model), "get_core_mask_low");
        let high = discover!(address, adapter.get_core_mask_high(address, model), "get_core_mask_high");
        let core_mask = ((high as u64) << 32) | low as u64;
        let core_count = core_mask.count_ones();
        if core_count == 0 {
            return Err(CupsError::discovery(address, "core mask reports no cores"));
        }

        let non_turbo_ratio = discover!(
            address,
            adapter.get_max_non_turbo_ratio(address, model),
            "get_max_non_turbo_ratio"
        );
        let turbo_ratio = discover!(
            address,
            adapter.get_max_turbo_ratio(address, core_count),
            "get_max_turbo_ratio"
        );
        let turbo_enabled = discover!(address, adapter.is_turbo_enabled(address, model), "is_turbo_enabled");
        let bus_number = discover!(address, adapter.get_cpu_bus_number(address, model), "get_cpu_bus_number");

        Ok(Self {
            adapter: adapter.clone(),
            address,
            cpu_id,
            model,
            bus_number,
            core_mask,
            core_count,
            max_non_turbo_mhz: non_turbo_ratio as u32 * RATIO_UNIT_MHZ,
            max_turbo_mhz: turbo_ratio as u32 * RATIO_UNIT_MHZ,
            turbo_enabled,
            c0: CounterTracker::new(),
        })
    }

    pub fn cpu_id(&self) -> u32 {
        self.cpu_id
    }

    pub fn model(&self) -> CpuModel {
        self.model
    }

    pub fn bus_number(&self) -> u8 {
        self.bus_number
    }

    pub fn core_count(&self) -> u32 {
        self.core_count
    }

    /// Clock the cores may run at, honouring the turbo setting
    pub fn max_frequency_mhz(&self) -> u32 {
        if self.turbo_enabled {
            self.max_turbo_mhz
        } else {
            self.max_non_turbo_mhz
        }
    }
}

impl DomainMetric for CoreMetric {
    fn address(&self) -> u8 {
        self.address
    }

    fn max_utilization(&self) -> u64 {
        self.core_count as u64 * mhz_to_hz(self.max_frequency_mhz())
    }

    fn delta(&mut self) -> Result<Option<f64>> {
        let value = self.adapter.get_cpu_c0_counter(self.address)?;
        let tag = format!("0x{:02x} C0", self.address);
        Ok(self.c0.sample(&tag, value))
    }

    fn reset(&mut self) {
        self.c0.reset();
    }

    fn describe(&self) -> String {
        format!(
            "Core 0x{:02x}: CPUID 0x{:08x} ({}), bus {}, mask 0x{:016x}, {} cores, \
             non-turbo {} MHz, turbo {} MHz, turbo {}",
            self.address,
            self.cpu_id,
            self.model,
            self.bus_number,
            self.core_mask,
            self.core_count,
            self.max_non_turbo_mhz,
            self.max_turbo_mhz,
            if self.turbo_enabled { "enabled" } else { "disabled" }
        )
    }
}
