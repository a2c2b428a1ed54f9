//! Memory controller layouts: DIMM population, DDR frequency, telemetry

use crate::register::{bit, bits, RegisterLayout};
use crate::wire::{self, WireError};

/// Bytes transferred per channel per clock
pub const CHANNEL_WIDTH: u64 = 8;

/// Memory telemetry counts cache lines
pub const CACHE_LINE_SIZE: u64 = 64;

/// Width of the read/write telemetry counters
pub const TELEMETRY_COUNTER_WIDTH_BITS: u32 = 32;

const FREQ_RATIO_133_MHZ: u32 = 13333;
const FREQ_RATIO_100_MHZ: u32 = 10000;
const FREQ_RATIO_DIV: u32 = 100;

/// One DIMM slot: MMIO location of its DIMMMTR register and its channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimmSlot {
    pub device: u8,
    pub function: u8,
    pub offset: u64,
    pub channel: u8,
}

impl DimmSlot {
    pub const fn new(device: u8, function: u8, offset: u64, channel: u8) -> Self {
        Self {
            device,
            function,
            offset,
            channel,
        }
    }
}

/// Telemetry sample index for one memory controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetrySampleIndex {
    pub aggregator: u16,
    pub sample: u16,
}

/// DIMM memory technology register; bit 15 reports a populated slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DimmMtr {
    pub dimm_populated: bool,
}

impl RegisterLayout for DimmMtr {
    fn to_raw(&self) -> u32 {
        (self.dimm_populated as u32) << 15
    }

    fn from_raw(value: u32) -> Self {
        Self {
            dimm_populated: bit(value, 15),
        }
    }
}

/// Memory frequency register
///
/// | Bits  | Field     |
/// |-------|-----------|
/// | 0-5   | frequency |
/// | 8-11  | kind      |
///
/// `kind` 0 counts in 133.33 MHz steps, 1 in 100 MHz steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryFrequency {
    pub frequency: u8,
    pub kind: u8,
}

impl MemoryFrequency {
    /// Frequency in MHz, integer arithmetic
    pub fn to_mhz(&self) -> wire::Result<u32> {
        let ratio = match self.kind {
            0 => FREQ_RATIO_133_MHZ,
            1 => FREQ_RATIO_100_MHZ,
            other => return Err(WireError::MemoryFrequencyType(other)),
        };
        Ok(self.frequency as u32 * ratio / FREQ_RATIO_DIV)
    }
}

impl RegisterLayout for MemoryFrequency {
    fn to_raw(&self) -> u32 {
        (self.frequency as u32 & 0x3F) | ((self.kind as u32 & 0xF) << 8)
    }

    fn from_raw(value: u32) -> Self {
        Self {
            frequency: bits(value, 0, 6) as u8,
            kind: bits(value, 8, 4) as u8,
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.frequency > 0x3F {
            return Err("Memory frequency exceeds 6 bits");
        }
        if self.kind > 0xF {
            return Err("Memory frequency type exceeds 4 bits");
        }
        Ok(())
    }
}

/// Four telemetry sample indices, `(0, 0xE0..=0xE3)`, used by both models
pub const SAMPLE_INDICES: [TelemetrySampleIndex; 4] = [
    TelemetrySampleIndex {
        aggregator: 0x00,
        sample: 0xE0,
    },
    TelemetrySampleIndex {
        aggregator: 0x00,
        sample: 0xE1,
    },
    TelemetrySampleIndex {
        aggregator: 0x00,
        sample: 0xE2,
    },
    TelemetrySampleIndex {
        aggregator: 0x00,
        sample: 0xE3,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_kinds() {
        let freq = MemoryFrequency::from_raw(36);
        assert_eq!(freq.kind, 0);
        assert_eq!(freq.to_mhz(), Ok(36 * 13333 / 100));

        let freq = MemoryFrequency::from_raw((1 << 8) | 48);
        assert_eq!(freq.to_mhz(), Ok(4800));

        let freq = MemoryFrequency::from_raw(2 << 8);
        assert_eq!(freq.to_mhz(), Err(WireError::MemoryFrequencyType(2)));
    }

    #[test]
    fn test_frequency_masks_reserved_bits() {
        let freq = MemoryFrequency::from_raw(0xFFFF_F0C0 | 0x10);
        assert_eq!(freq.frequency, 0x10);
        assert_eq!(freq.kind, 0);
    }

    #[test]
    fn test_dimm_populated() {
        assert!(DimmMtr::from_raw(0x8000).dimm_populated);
        assert!(!DimmMtr::from_raw(0x7FFF).dimm_populated);
    }
}
