//! Granite Rapids (6th Gen Xeon) register tables

use super::core::CoreRegisters;
use super::iio::{
    link_map, Controller, ControllerGen, IioCounterScheme, LinkDescriptor, LINK_COUNT,
    LINK_STATUS_REG,
};
use super::memory::{DimmSlot, SAMPLE_INDICES};
use super::ModelTables;
use crate::cpu::CpuSignature;

pub const SIGNATURE: CpuSignature = CpuSignature {
    model: 0xD,
    family: 0x6,
    ext_model: 0xA,
    ext_family: 0x0,
};

/// PCI-local register coordinates (reg, func, dev, bus)
pub mod reg {
    use crate::peci::PciAddress;

    pub const BUS_NUMBER: PciAddress = PciAddress::new(0xD0, 2, 0, 30);
    pub const CORE_MASK_LOW: PciAddress = PciAddress::new(0x488, 0, 5, 30);
    pub const CORE_MASK_HIGH: PciAddress = PciAddress::new(0x48C, 0, 5, 30);
    pub const MAX_NON_TURBO_RATIO: PciAddress = PciAddress::new(0x138, 0, 5, 31);
    pub const CAPABILITY: PciAddress = PciAddress::new(0x294, 0, 5, 31);
    pub const MEMORY_FREQUENCY: PciAddress = PciAddress::new(0x1A0, 0, 5, 30);
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

const CH0_DIMM0: u64 = 0x40C;
const CH0_DIMM1: u64 = 0x410;

/// Twelve channels spread over devices 5..8, one DIMMMTR per function
pub static DIMM_SLOTS: [DimmSlot; 24] = [
    DimmSlot::new(5, 1, CH0_DIMM0, 0),
    DimmSlot::new(5, 2, CH0_DIMM1, 0),
    DimmSlot::new(5, 3, CH0_DIMM0, 1),
    DimmSlot::new(5, 4, CH0_DIMM1, 1),
    DimmSlot::new(5, 5, CH0_DIMM0, 2),
    DimmSlot::new(5, 6, CH0_DIMM1, 2),
    DimmSlot::new(5, 7, CH0_DIMM0, 3),
    DimmSlot::new(6, 1, CH0_DIMM1, 3),
    DimmSlot::new(6, 2, CH0_DIMM0, 4),
    DimmSlot::new(6, 3, CH0_DIMM1, 4),
    DimmSlot::new(6, 4, CH0_DIMM0, 5),
    DimmSlot::new(6, 5, CH0_DIMM1, 5),
    DimmSlot::new(6, 6, CH0_DIMM0, 6),
    DimmSlot::new(6, 7, CH0_DIMM1, 6),
    DimmSlot::new(7, 1, CH0_DIMM0, 7),
    DimmSlot::new(7, 2, CH0_DIMM1, 7),
    DimmSlot::new(7, 3, CH0_DIMM0, 8),
    DimmSlot::new(7, 4, CH0_DIMM1, 8),
    DimmSlot::new(7, 5, CH0_DIMM0, 9),
    DimmSlot::new(7, 6, CH0_DIMM1, 9),
    DimmSlot::new(7, 7, CH0_DIMM0, 10),
    DimmSlot::new(8, 1, CH0_DIMM1, 10),
    DimmSlot::new(8, 2, CH0_DIMM0, 11),
    DimmSlot::new(8, 3, CH0_DIMM1, 11),
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
    iio_counters: IioCounterScheme::FreeRunning,
    dimm_slots: &DIMM_SLOTS,
    memory_samples: &SAMPLE_INDICES,
};
