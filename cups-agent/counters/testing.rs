// Scripted CPUs for discovery and readings tests

use cups_raw::arch::iio::{controller_register, xpp, LINK_STATUS_REG};
use cups_raw::arch::sapphire_rapids;
use cups_raw::CpuModel;

use crate::transport::fake::FakePeci;

pub const SPR_CPU_ID: u32 = 0x806F8;
pub const GNR_CPU_ID: u32 = 0xA06D1;

pub const BUS: u8 = 0x7E;

/// Link table index of the scripted active link: bus 1, Gen4 device 8
pub const ACTIVE_LINK: usize = 8;

/// 4 cores at 3700 MHz turbo
pub const CORE_CAPACITY: u64 = 4 * 3_700_000_000;

/// One x16 link at 16 Gb/s, in DWORDs per second
pub const IIO_CAPACITY: u64 = 16 * 16 * 2 * 250_000_000 / 8;

/// Two channels at 4800 MHz, in cache lines per second
pub const MEMORY_CAPACITY: u64 = 2 * 4_800_000_000 * 8 / 64;

pub fn script_core(fake: &FakePeci, address: u8, cpu_id: u32) {
    let model = CpuModel::from_cpu_id(cpu_id).unwrap_or(CpuModel::SapphireRapids);
    let core = &model.tables().core;

    fake.respond_cpu_id(address, cpu_id);
    fake.respond_dword(address, core.core_mask_low, 0xF);
    fake.respond_dword(address, core.core_mask_high, 0);
    fake.respond_dword(address, core.max_non_turbo_ratio, 20 << 8);
    fake.respond_turbo_ratios(address, 0, [40, 39, 38, 37]);
    fake.respond_dword(address, core.capability, 1 << 26);
    fake.respond_dword(address, core.bus_number, BUS as u32);
    fake.respond_c0(address, 0);
}

/// One active x16 Gen4 link on bus 1 with XPP already configured
pub fn script_iio(fake: &FakePeci, address: u8) {
    let link = sapphire_rapids::IIO_LINKS[ACTIVE_LINK];
    let (bus, dev) = (link.port.bus, link.controller.device);

    fake.respond_dword(
        address,
        controller_register(LINK_STATUS_REG, bus, dev),
        (1 << 13) | (16 << 4) | 4,
    );
    fake.respond_dword(address, controller_register(xpp::MR, bus, dev), xpp::MR_VALUE);
    fake.respond_dword(address, controller_register(xpp::MER, bus, dev), xpp::MER_VALUE);
    fake.respond_dword(
        address,
        controller_register(xpp::ER_CONF, bus, dev),
        xpp::ER_CONF_VALUE,
    );
    fake.respond_dword(
        address,
        controller_register(xpp::DLU, bus, xpp::DLU_DEVICE),
        0,
    );
    set_xpp_counter(fake, address, 0);
}

pub fn set_xpp_counter(fake: &FakePeci, address: u8, value: u64) {
    let link = sapphire_rapids::IIO_LINKS[ACTIVE_LINK];
    let (bus, dev) = (link.port.bus, link.controller.device);

    fake.respond_dword(address, controller_register(xpp::MDL, bus, dev), value as u32);
    fake.respond_dword(
        address,
        controller_register(xpp::MDH, bus, dev),
        ((value >> 32) & 0xF) as u32,
    );
}

/// DIMMs in slots 0 and 2 (channels 0 and 1) at 4800 MHz
pub fn script_memory(fake: &FakePeci, address: u8) {
    let tables = CpuModel::SapphireRapids.tables();

    for (i, slot) in tables.dimm_slots.iter().enumerate() {
        let populated = if i == 0 || i == 2 { 1 << 15 } else { 0 };
        fake.respond_mmio(address, BUS, slot, populated);
    }
    fake.respond_dword(address, tables.memory_frequency, (1 << 8) | 48);
    set_memory_counters(fake, address, 0, 0);
}

/// Every telemetry sample reports the same read and write counts
pub fn set_memory_counters(fake: &FakePeci, address: u8, reads: u32, writes: u32) {
    for index in CpuModel::SapphireRapids.tables().memory_samples {
        fake.respond_telemetry(address, *index, reads, writes);
    }
}

/// A complete SapphireRapids CPU
pub fn script_cpu(fake: &FakePeci, address: u8) {
    script_core(fake, address, SPR_CPU_ID);
    script_iio(fake, address);
    script_memory(fake, address);
}
