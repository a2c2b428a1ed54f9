//! Sapphire Rapids (4th Gen Xeon Scalable) register tables

use super::core::CoreRegisters;
use super::iio::{
    link_map, Controller, ControllerGen, IioCounterScheme, LinkDescriptor, LINK_COUNT,
    LINK_STATUS_REG,
};
use super::memory::{DimmSlot, SAMPLE_INDICES};
use super::ModelTables;
use crate::cpu::CpuSignature;

pub const SIGNATURE: CpuSignature = CpuSignature {
    model: 0xF,
    family: 0x6,
    ext_model: 0x8,
    ext_family: 0x0,
};

/// PCI-local register coordinates (reg, func, dev, bus)
pub mod reg {
    use crate::peci::PciAddress;

    pub const BUS_NUMBER: PciAddress = PciAddress::new(0xD0, 2, 0, 30);
    pub const CORE_MASK_LOW: PciAddress = PciAddress::new(0x80, 6, 30, 31);
    pub const CORE_MASK_HIGH: PciAddress = PciAddress::new(0x84, 6, 30, 31);
    pub const MAX_NON_TURBO_RATIO: PciAddress = PciAddress::new(0xA8, 0, 30, 31);
    pub const CAPABILITY: PciAddress = PciAddress::new(0x94, 3, 30, 31);
    pub const MEMORY_FREQUENCY: PciAddress = PciAddress::new(0x98, 1, 30, 31);
}

const GEN4: [Controller; 4] = [
    Controller::new(8, ControllerGen::Gen4),
    Controller::new(6, ControllerGen::Gen4),
    Controller::new(4, ControllerGen::Gen4),
    Controller::new(2, ControllerGen::Gen4),
];

const GEN5: [Controller; 4] = [
    Controller::new(1, ControllerGen::Gen5),
    Controller::new(3, ControllerGen::Gen5),
    Controller::new(5, ControllerGen::Gen5),
    Controller::new(7, ControllerGen::Gen5),
];

const POSSIBLE_DMI: Controller = Controller {
    device: 8,
    gen: ControllerGen::Gen4,
    can_be_dmi: true,
};

pub static IIO_LINKS: [LinkDescriptor; LINK_COUNT] =
    link_map(GEN4, GEN5, POSSIBLE_DMI, LINK_STATUS_REG);

/// Memory controllers mc0..mc3 are devices 26..29
pub mod mc {
    pub const DEVICES: [u8; 4] = [26, 27, 28, 29];

    pub const CH0_DIMM0: u64 = 0x2080C;
    pub const CH0_DIMM1: u64 = 0x20810;
    pub const CH1_DIMM0: u64 = 0x2880C;
    pub const CH1_DIMM1: u64 = 0x28810;
}

pub static DIMM_SLOTS: [DimmSlot; 16] = [
    DimmSlot::new(26, 0, mc::CH0_DIMM0, 0),
    DimmSlot::new(26, 0, mc::CH0_DIMM1, 0),
    DimmSlot::new(26, 0, mc::CH1_DIMM0, 1),
    DimmSlot::new(26, 0, mc::CH1_DIMM1, 1),
    DimmSlot::new(27, 0, mc::CH0_DIMM0, 2),
    DimmSlot::new(27, 0, mc::CH0_DIMM1, 2),
    DimmSlot::new(27, 0, mc::CH1_DIMM0, 3),
    DimmSlot::new(27, 0, mc::CH1_DIMM1, 3),
    DimmSlot::new(28, 0, mc::CH0_DIMM0, 4),
    DimmSlot::new(28, 0, mc::CH0_DIMM1, 4),
    DimmSlot::new(28, 0, mc::CH1_DIMM0, 5),
    DimmSlot::new(28, 0, mc::CH1_DIMM1, 5),
    DimmSlot::new(29, 0, mc::CH0_DIMM0, 6),
    DimmSlot::new(29, 0, mc::CH0_DIMM1, 6),
    DimmSlot::new(29, 0, mc::CH1_DIMM0, 7),
    DimmSlot::new(29, 0, mc::CH1_DIMM1, 7),
];

pub static TABLES: ModelTables = ModelTables {
    signature: SIGNATURE,
    core: CoreRegisters {
        bus_number: reg::BUS_NUMBER,
        core_mask_low: reg::CORE_MASK_LOW,
        core_mask_high: reg::CORE_MASK_HIGH,
        max_non_turbo_ratio: reg::MAX_NON_TURBO_RATIO,
        capability: reg::CAPABILITY,
    },
    memory_frequency: reg::MEMORY_FREQUENCY,
    iio_links: &IIO_LINKS,
    iio_counters: IioCounterScheme::XppMonitor,
    dimm_slots: &DIMM_SLOTS,
    memory_samples: &SAMPLE_INDICES,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peci::PciAddress;

    #[test]
    fn test_dimm_slot_channels() {
        for (k, device) in mc::DEVICES.iter().enumerate() {
            let slots = &DIMM_SLOTS[k * 4..k * 4 + 4];
            assert!(slots.iter().all(|s| s.device == *device && s.function == 0));
            let channels: Vec<u8> = slots.iter().map(|s| s.channel).collect();
            let k = k as u8;
            assert_eq!(channels, vec![2 * k, 2 * k, 2 * k + 1, 2 * k + 1]);
        }
    }

    #[test]
    fn test_core_registers() {
        assert_eq!(TABLES.core.core_mask_low, PciAddress::new(0x80, 6, 30, 31));
        assert_eq!(TABLES.memory_frequency, PciAddress::new(0x98, 1, 30, 31));
    }
}
