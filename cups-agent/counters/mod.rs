// Per-domain utilization counters and CPU discovery

pub mod core;
pub mod cpu;
pub mod iio;
pub mod memory;
pub mod tracker;

#[cfg(test)]
pub mod testing;

pub use self::core::CoreMetric;
pub use self::cpu::{Cpu, Utilization};
pub use self::iio::IioMetric;
pub use self::memory::MemoryMetric;
pub use self::tracker::{convert_to_percent, mhz_to_hz, CounterTracker};

use cups_raw::CpuModel;

use crate::error::Result;
use crate::transport::Adapter;

/// One utilization domain of one CPU
pub trait DomainMetric: Send {
    fn address(&self) -> u8;

    /// Capacity in the same unit as [`DomainMetric::delta`], per second
    fn max_utilization(&self) -> u64;

    /// Rate of the domain's counters since the previous call
    ///
    /// `Err` when a counter read failed; `Ok(None)` while trackers warm up.
    /// All counters are read before any tracker is updated.
    fn delta(&mut self) -> Result<Option<f64>>;

    /// Forget previous samples
    fn reset(&mut self);

    /// Discovery summary for logs
    fn describe(&self) -> String;
}

/// Probe a socket and decode its model
///
/// An empty socket is expected and only logged at debug level. A CPU that
/// answers with an unknown signature is unsupported and logged as an error.
pub fn identify(adapter: &Adapter, address: u8) -> Option<(u32, CpuModel)> {
    let cpu_id = match adapter.get_cpu_id(address) {
        Ok(cpu_id) => cpu_id,
        Err(e) => {
            tracing::debug!("No CPU at 0x{:02x}: {}", address, e);
            return None;
        }
    };

    match CpuModel::from_cpu_id(cpu_id) {
        Ok(model) => Some((cpu_id, model)),
        Err(e) => {
            tracing::error!(
                "CRITICAL: unsupported CPU at 0x{:02x} (CPUID 0x{:08x}): {}",
                address,
                cpu_id,
                e
            );
            None
        }
    }
}
