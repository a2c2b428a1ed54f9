//! Model-specific register tables
//!
//! Sapphire Rapids and Granite Rapids expose the same quantities at
//! different PCI-local coordinates. The shared field layouts live in the
//! per-domain modules (`core`, `iio`, `memory`) and each model module
//! provides one static [`ModelTables`] value.
//!
//! ## Supported Architectures
//!
//! - **Sapphire Rapids** (`sapphire_rapids`) - XPP monitor for IIO bandwidth
//! - **Granite Rapids** (`granite_rapids`) - free-running IIO counters

pub mod core;
pub mod granite_rapids;
pub mod iio;
pub mod memory;
pub mod sapphire_rapids;

use crate::cpu::CpuSignature;
use crate::peci::PciAddress;

pub use self::core::CoreRegisters;
pub use self::iio::{IioCounterScheme, LinkDescriptor};
pub use self::memory::{DimmSlot, TelemetrySampleIndex};

/// Everything discovery and sampling need to know about one CPU model
#[derive(Debug)]
pub struct ModelTables {
    pub signature: CpuSignature,
    pub core: CoreRegisters,
    pub memory_frequency: PciAddress,
    pub iio_links: &'static [LinkDescriptor],
    pub iio_counters: IioCounterScheme,
    pub dimm_slots: &'static [DimmSlot],
    pub memory_samples: &'static [TelemetrySampleIndex],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuModel;

    #[test]
    fn test_shared_bus_number_register() {
        for model in CpuModel::all() {
            assert_eq!(
                model.tables().core.bus_number,
                PciAddress::new(0xD0, 2, 0, 30)
            );
        }
    }

    #[test]
    fn test_table_sizes() {
        let spr = CpuModel::SapphireRapids.tables();
        let gnr = CpuModel::GraniteRapids.tables();

        assert_eq!(spr.iio_links.len(), 48);
        assert_eq!(gnr.iio_links.len(), 48);
        assert_eq!(spr.dimm_slots.len(), 16);
        assert_eq!(gnr.dimm_slots.len(), 24);
        assert_eq!(spr.memory_samples.len(), 4);
        assert_eq!(gnr.memory_samples.len(), 4);
    }

    #[test]
    fn test_counter_schemes() {
        assert_eq!(
            CpuModel::SapphireRapids.tables().iio_counters,
            IioCounterScheme::XppMonitor
        );
        assert_eq!(
            CpuModel::GraniteRapids.tables().iio_counters,
            IioCounterScheme::FreeRunning
        );
    }
}
