//! IIO (Integrated I/O) link and bandwidth counter definitions
//!
//! Each socket exposes six IIO ports (PCI buses 0-5 relative to the socket).
//! Every port carries four Gen4 and four Gen5 root-port controllers. Link
//! capacity is read from the PCIe link status register of each controller;
//! traffic is counted once per (port, controller generation) pair, since the
//! bandwidth counters are shared by all controllers of one generation on a
//! port.
//!
//! Sapphire Rapids counts traffic with the XPP performance monitor, which
//! must be programmed before use. Granite Rapids exposes free-running
//! counters instead.

use crate::peci::PciAddress;
use crate::register::{bit, bits, RegisterLayout};

/// Bandwidth counters count dwords; 250M dwords make one gigabyte
pub const DWORDS_IN_GIGABYTE: u64 = 250_000_000;

/// Links transmit in both directions at once
pub const FULL_DUPLEX: u64 = 2;

/// Number of ports per socket
pub const PORT_COUNT: usize = 6;

/// Controllers per generation on each port
pub const CONTROLLERS_PER_GEN: usize = 4;

/// Number of entries in the link table
pub const LINK_COUNT: usize = PORT_COUNT * CONTROLLERS_PER_GEN * 2;

/// PCIe link status register offset
pub const LINK_STATUS_REG: u16 = 0x52;

/// Width of the combined XPP monitor counter
pub const XPP_COUNTER_WIDTH_BITS: u32 = 36;

/// Width of the free-running counters
pub const FREE_RUNNING_COUNTER_WIDTH_BITS: u32 = 48;

/// XPP performance monitor registers (Sapphire Rapids)
pub mod xpp {
    /// Monitor control
    pub const MR: u16 = 0x594;
    /// Monitor event select
    pub const MER: u16 = 0x5AC;
    /// Event-response configuration
    pub const ER_CONF: u16 = 0x5C4;
    /// Monitor data, low dword
    pub const MDL: u16 = 0x580;
    /// Monitor data, high nibbles
    pub const MDH: u16 = 0x590;

    /// Values the monitor is programmed with before sampling
    pub const MR_VALUE: u32 = 0x100800;
    pub const MER_VALUE: u32 = 0x1E011F;
    pub const ER_CONF_VALUE: u32 = 0x2;

    /// Data link utilization counter; fixed device
    pub const DLU: u16 = 0x4C0;
    pub const DLU_DEVICE: u8 = 3;
}

/// Free-running counter registers (Granite Rapids)
pub mod free_running {
    pub const CLOCK: u16 = 0x670;
    pub const COUNTER_BASE: u16 = 0x678;
    /// Offsets of the four counters relative to `COUNTER_BASE`
    pub const COUNTER_OFFSETS: [u16; 4] = [0, 8, 16, 24];
}

/// How a model counts IIO traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IioCounterScheme {
    /// Programmable XPP monitor, sampled through XPPMDL/XPPMDH
    XppMonitor,
    /// Four 48-bit free-running counters per controller
    FreeRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortType {
    Dmi,
    Pci,
}

/// One IIO port, identified by its bus number within the socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port {
    pub bus: u8,
    pub kind: PortType,
    /// The port carries DMI instead of PCIe on the primary socket
    pub dual_use: bool,
}

impl Port {
    pub const fn pci(bus: u8) -> Self {
        Self {
            bus,
            kind: PortType::Pci,
            dual_use: false,
        }
    }
}

impl std::fmt::Display for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            PortType::Dmi => "DMI",
            PortType::Pci => "PCI",
        };
        write!(f, "Bus: {} ({})", self.bus, kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ControllerGen {
    Gen4,
    Gen5,
}

/// One root-port controller, identified by its device number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controller {
    pub device: u8,
    pub gen: ControllerGen,
    /// The controller that remains active when the port carries DMI
    pub can_be_dmi: bool,
}

impl Controller {
    pub const fn new(device: u8, gen: ControllerGen) -> Self {
        Self {
            device,
            gen,
            can_be_dmi: false,
        }
    }
}

impl std::fmt::Display for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Controller: {} ({:?})", self.device, self.gen)
    }
}

/// A link table entry: where to find one controller's link status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkDescriptor {
    pub port: Port,
    pub controller: Controller,
    pub status_reg: u16,
}

/// Build the 48-entry link table shared by both models
///
/// Port 0 is dual-use: its Gen4 block starts with the controller that can
/// carry DMI. Every port lists its Gen4 block before its Gen5 block.
pub const fn link_map(
    gen4: [Controller; CONTROLLERS_PER_GEN],
    gen5: [Controller; CONTROLLERS_PER_GEN],
    possible_dmi: Controller,
    status_reg: u16,
) -> [LinkDescriptor; LINK_COUNT] {
    let placeholder = LinkDescriptor {
        port: Port::pci(0),
        controller: possible_dmi,
        status_reg,
    };
    let mut links = [placeholder; LINK_COUNT];

    let dual_use = Port {
        bus: 0,
        kind: PortType::Pci,
        dual_use: true,
    };

    let mut entry = 0;
    let mut bus = 0;
    while bus < PORT_COUNT {
        let mut i = 0;
        while i < CONTROLLERS_PER_GEN {
            let (port, controller) = if bus == 0 && i == 0 {
                (dual_use, possible_dmi)
            } else if bus == 0 {
                (dual_use, gen4[i])
            } else {
                (Port::pci(bus as u8), gen4[i])
            };
            links[entry] = LinkDescriptor {
                port,
                controller,
                status_reg,
            };
            entry += 1;
            i += 1;
        }

        let mut i = 0;
        while i < CONTROLLERS_PER_GEN {
            links[entry] = LinkDescriptor {
                port: Port::pci(bus as u8),
                controller: gen5[i],
                status_reg,
            };
            entry += 1;
            i += 1;
        }
        bus += 1;
    }

    links
}

/// PCIe link status register
///
/// | Bits  | Field  |
/// |-------|--------|
/// | 0-3   | speed  |
/// | 4-9   | width  |
/// | 13    | active |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStatus {
    pub speed: u8,
    pub width: u8,
    pub active: bool,
}

impl RegisterLayout for LinkStatus {
    fn to_raw(&self) -> u32 {
        (self.speed as u32 & 0xF) | ((self.width as u32 & 0x3F) << 4) | ((self.active as u32) << 13)
    }

    fn from_raw(value: u32) -> Self {
        Self {
            speed: bits(value, 0, 4) as u8,
            width: bits(value, 4, 6) as u8,
            active: bit(value, 13),
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.speed > 0xF {
            return Err("Link speed exceeds 4 bits");
        }
        if self.width > 0x3F {
            return Err("Link width exceeds 6 bits");
        }
        Ok(())
    }
}

/// Per-lane signalling rate for a link speed id, in Gbit/s
pub fn link_speed_gbps(speed_id: u8) -> Option<f64> {
    match speed_id {
        1 => Some(2.5),
        2 => Some(5.0),
        3 => Some(8.0),
        4 => Some(16.0),
        _ => None,
    }
}

/// XPP monitor data, high part
///
/// | Bits  | Field            |
/// |-------|------------------|
/// | 0-3   | counter_dwords0  |
/// | 8-11  | counter_dwords1  |
///
/// `counter_dwords0` supplies bits 32-35 of the 36-bit counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XppMonitorDataHigh {
    pub counter_dwords0: u8,
    pub counter_dwords1: u8,
}

impl RegisterLayout for XppMonitorDataHigh {
    fn to_raw(&self) -> u32 {
        (self.counter_dwords0 as u32 & 0xF) | ((self.counter_dwords1 as u32 & 0xF) << 8)
    }

    fn from_raw(value: u32) -> Self {
        Self {
            counter_dwords0: bits(value, 0, 4) as u8,
            counter_dwords1: bits(value, 8, 4) as u8,
        }
    }
}

/// Combine XPPMDL and XPPMDH into the 36-bit monitor count
pub fn xpp_counter(low: u32, high: XppMonitorDataHigh) -> u64 {
    low as u64 | ((high.counter_dwords0 as u64 & 0xF) << 32)
}

/// Data link utilization register, one gigabyte counter per byte
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataLinkUtilization {
    pub counter_gigabytes: [u8; 4],
}

impl RegisterLayout for DataLinkUtilization {
    fn to_raw(&self) -> u32 {
        u32::from_le_bytes(self.counter_gigabytes)
    }

    fn from_raw(value: u32) -> Self {
        Self {
            counter_gigabytes: value.to_le_bytes(),
        }
    }
}

/// Register on a controller, addressed relative to the socket's IIO buses
///
/// Function is always 0; bus is masked to 4 bits, device to 5.
pub const fn controller_register(reg: u16, bus: u8, device: u8) -> PciAddress {
    PciAddress::new(reg & 0xFFF, 0, device & 0x1F, bus & 0xF)
}

/// Mask a free-running counter read to its counting width
pub const fn free_running_count(raw: u64) -> u64 {
    raw & ((1u64 << FREE_RUNNING_COUNTER_WIDTH_BITS) - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::sapphire_rapids;

    #[test]
    fn test_link_map_layout() {
        let links = &sapphire_rapids::IIO_LINKS;
        assert_eq!(links.len(), 48);

        // Port 0: dual-use Gen4 block led by the DMI-capable controller
        assert!(links[0].port.dual_use);
        assert!(links[0].controller.can_be_dmi);
        assert_eq!(links[0].controller.device, 8);
        assert_eq!(
            links[1..4]
                .iter()
                .map(|l| (l.port.dual_use, l.controller.device))
                .collect::<Vec<_>>(),
            vec![(true, 6), (true, 4), (true, 2)]
        );

        // Port 0 Gen5 block is plain PCI
        assert!(links[4..8].iter().all(|l| !l.port.dual_use && l.port.bus == 0));
        assert_eq!(
            links[4..8].iter().map(|l| l.controller.device).collect::<Vec<_>>(),
            vec![1, 3, 5, 7]
        );

        // Remaining ports: Gen4 [8, 6, 4, 2] then Gen5 [1, 3, 5, 7]
        for bus in 1..6u8 {
            let block = &links[bus as usize * 8..bus as usize * 8 + 8];
            assert!(block.iter().all(|l| l.port.bus == bus && !l.port.dual_use));
            assert_eq!(
                block.iter().map(|l| l.controller.device).collect::<Vec<_>>(),
                vec![8, 6, 4, 2, 1, 3, 5, 7]
            );
            assert!(block.iter().all(|l| !l.controller.can_be_dmi));
        }

        assert!(links.iter().all(|l| l.status_reg == LINK_STATUS_REG));
        assert_eq!(links.iter().filter(|l| l.controller.can_be_dmi).count(), 1);
    }

    #[test]
    fn test_link_status_fields() {
        let status = LinkStatus::from_raw(0x2000 | (16 << 4) | 4);
        assert_eq!(
            status,
            LinkStatus {
                speed: 4,
                width: 16,
                active: true
            }
        );
        assert_eq!(status.to_raw(), 0x2104);
        assert!(!LinkStatus::from_raw(0x0104).active);
    }

    #[test]
    fn test_link_speeds() {
        assert_eq!(link_speed_gbps(1), Some(2.5));
        assert_eq!(link_speed_gbps(2), Some(5.0));
        assert_eq!(link_speed_gbps(3), Some(8.0));
        assert_eq!(link_speed_gbps(4), Some(16.0));
        assert_eq!(link_speed_gbps(0), None);
        assert_eq!(link_speed_gbps(5), None);
    }

    #[test]
    fn test_xpp_counter_combination() {
        let high = XppMonitorDataHigh::from_raw(0x0000_0A03);
        assert_eq!(high.counter_dwords0, 3);
        assert_eq!(high.counter_dwords1, 0xA);
        assert_eq!(xpp_counter(0xFFFF_FFFF, high), 0x3_FFFF_FFFF);
    }

    #[test]
    fn test_controller_register() {
        let address = controller_register(xpp::MR, 0x13, 8);
        assert_eq!(address, PciAddress::new(0x594, 0, 8, 0x3));
    }

    #[test]
    fn test_free_running_mask() {
        assert_eq!(free_running_count(u64::MAX), (1u64 << 48) - 1);
        assert_eq!(free_running_count(42), 42);
    }

    #[test]
    fn test_dlu_bytes() {
        let dlu = DataLinkUtilization::from_raw(0x0403_0201);
        assert_eq!(dlu.counter_gigabytes, [1, 2, 3, 4]);
    }
}
