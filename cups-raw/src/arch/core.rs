//! Core domain registers and turbo ratio addressing

use crate::peci::PciAddress;
use crate::register::{bit, bits, RegisterLayout};

/// Ratios are expressed in 100 MHz units
pub const RATIO_UNIT_MHZ: u32 = 100;

/// Turbo ratios are reported four core counts at a time
pub const TURBO_RATIO_GROUP_SIZE: u32 = 4;

/// PCI-local coordinates of the core-domain registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreRegisters {
    pub bus_number: PciAddress,
    pub core_mask_low: PciAddress,
    pub core_mask_high: PciAddress,
    pub max_non_turbo_ratio: PciAddress,
    pub capability: PciAddress,
}

/// CPU bus number register; only the first byte is consumed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuBusNumber {
    pub bus0: u8,
    pub bus1: u8,
    pub bus2: u8,
    pub bus3: u8,
}

impl RegisterLayout for CpuBusNumber {
    fn to_raw(&self) -> u32 {
        u32::from_le_bytes([self.bus0, self.bus1, self.bus2, self.bus3])
    }

    fn from_raw(value: u32) -> Self {
        let [bus0, bus1, bus2, bus3] = value.to_le_bytes();
        Self {
            bus0,
            bus1,
            bus2,
            bus3,
        }
    }
}

/// Platform info register carrying the max non-turbo ratio in byte 1
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlatformInfo {
    pub max_non_turbo_ratio: u8,
}

impl RegisterLayout for PlatformInfo {
    fn to_raw(&self) -> u32 {
        (self.max_non_turbo_ratio as u32) << 8
    }

    fn from_raw(value: u32) -> Self {
        Self {
            max_non_turbo_ratio: bits(value, 8, 8) as u8,
        }
    }
}

/// Capability register; bit 26 reports turbo enabled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capability {
    pub turbo_enabled: bool,
}

impl RegisterLayout for Capability {
    fn to_raw(&self) -> u32 {
        (self.turbo_enabled as u32) << 26
    }

    fn from_raw(value: u32) -> Self {
        Self {
            turbo_enabled: bit(value, 26),
        }
    }
}

/// Locate the max turbo ratio for `core_count` active cores
///
/// Returns `(group, index)`: the group requested from RdPkgConfig(49) and
/// the byte within its four-ratio response. A core count that is a multiple
/// of four belongs to the lower group. Zero cores has no slot.
pub fn turbo_ratio_slot(core_count: u32) -> Option<(u8, usize)> {
    if core_count == 0 {
        return None;
    }

    let mut n = core_count;
    if n % TURBO_RATIO_GROUP_SIZE == 0 {
        n -= 1;
    }
    let group = n / TURBO_RATIO_GROUP_SIZE;
    let index = (core_count - 1) - TURBO_RATIO_GROUP_SIZE * group;

    Some((group as u8, index as usize))
}
