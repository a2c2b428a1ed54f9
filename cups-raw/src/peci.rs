//! PECI command encoding and response decoding
//!
//! Only the command subset needed for utilization telemetry is modelled:
//!
//! | Command            | Code | Used for                                   |
//! |--------------------|------|--------------------------------------------|
//! | RdPkgConfig        | 0xA1 | CPUID, C0 residency, max turbo ratios      |
//! | RdEndpointConfig   | 0xC1 | PCI-local registers, MMIO DIMM registers   |
//! | WrEndpointConfig   | 0xC5 | XPP monitor configuration                  |
//! | GetTelemetry       | 0x81 | memory read/write counters                 |
//!
//! Every request begins with `[command, host_id]` and every response begins
//! with a completion code (`0x40` on success). Requests are built byte by
//! byte, little-endian, with no padding.

use crate::register::{bits, RegisterLayout};
use crate::wire::{self, aw_fcs, check_response, le_u32, le_u64, WireError};

/// PECI command codes
pub mod command {
    pub const RD_PKG_CONFIG: u8 = 0xA1;
    pub const RD_ENDPOINT_CONFIG: u8 = 0xC1;
    pub const WR_ENDPOINT_CONFIG: u8 = 0xC5;
    pub const GET_TELEMETRY: u8 = 0x81;
}

/// Host ID carried in every request header
pub const HOST_ID: u8 = 0;

/// Package config indices and parameters
pub mod pkg_config {
    pub const CPU_ID_INDEX: u8 = 0;
    pub const CPU_ID_PARAM: u16 = 0;

    pub const C0_COUNTER_INDEX: u8 = 31;
    pub const C0_COUNTER_PARAM: u16 = 0xFE;

    pub const MAX_TURBO_RATIO_INDEX: u8 = 49;
}

/// Telemetry sample opcode
pub const TELEMETRY_SAMPLE_OPCODE: u8 = 0x02;
pub const TELEMETRY_VERSION: u8 = 0;

/// Endpoint message kinds and their 6-byte headers
///
/// | Kind     | msgType | eid | fid | bar | addrType | seg |
/// |----------|---------|-----|-----|-----|----------|-----|
/// | PciLocal | 3       | 0   | 0   | 0   | 4        | 0   |
/// | Pci      | 4       | 0   | 0   | 0   | 4        | 0   |
/// | Mmio32   | 5       | 0   | 0   | 0   | 5        | 0   |
/// | Mmio64   | 5       | 0   | 0   | 0   | 6        | 0   |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    PciLocal,
    Pci,
    Mmio32,
    Mmio64,
}

impl EndpointKind {
    pub const fn header(self) -> [u8; 6] {
        match self {
            EndpointKind::PciLocal => [3, 0, 0, 0, 4, 0],
            EndpointKind::Pci => [4, 0, 0, 0, 4, 0],
            EndpointKind::Mmio32 => [5, 0, 0, 0, 5, 0],
            EndpointKind::Mmio64 => [5, 0, 0, 0, 6, 0],
        }
    }
}

/// PCI endpoint address dword
///
/// | Bits  | Field    |
/// |-------|----------|
/// | 0-11  | reg      |
/// | 12-14 | func     |
/// | 15-19 | dev      |
/// | 20-27 | bus      |
/// | 28-31 | reserved |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PciAddress {
    pub reg: u16,
    pub func: u8,
    pub dev: u8,
    pub bus: u8,
}

impl PciAddress {
    pub const fn new(reg: u16, func: u8, dev: u8, bus: u8) -> Self {
        Self {
            reg,
            func,
            dev,
            bus,
        }
    }

    /// Build an address and reject fields wider than their slots
    pub fn checked(reg: u16, func: u8, dev: u8, bus: u8) -> wire::Result<Self> {
        let address = Self::new(reg, func, dev, bus);
        address.validate().map_err(WireError::FieldOverflow)?;
        Ok(address)
    }
}

impl RegisterLayout for PciAddress {
    fn to_raw(&self) -> u32 {
        (self.reg as u32 & 0xFFF)
            | ((self.func as u32 & 0x7) << 12)
            | ((self.dev as u32 & 0x1F) << 15)
            | ((self.bus as u32) << 20)
    }

    fn from_raw(value: u32) -> Self {
        Self {
            reg: bits(value, 0, 12) as u16,
            func: bits(value, 12, 3) as u8,
            dev: bits(value, 15, 5) as u8,
            bus: bits(value, 20, 8) as u8,
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.reg > 0xFFF {
            return Err("PCI register offset exceeds 12 bits");
        }
        if self.func > 0x7 {
            return Err("PCI function exceeds 3 bits");
        }
        if self.dev > 0x1F {
            return Err("PCI device exceeds 5 bits");
        }
        Ok(())
    }
}

/// A typed PECI request
pub trait PeciRequest {
    type Response: PeciResponse;

    /// Name used in logs and errors
    const NAME: &'static str;

    /// Serialize the request for the CPU at `target`
    ///
    /// The target only matters for requests that carry an AW FCS.
    fn encode(&self, target: u8) -> Vec<u8>;

    /// Expected response length, completion code included
    fn response_len(&self) -> usize {
        Self::Response::LEN
    }
}

/// A typed PECI response payload
pub trait PeciResponse: Sized {
    /// Total length including the completion code
    const LEN: usize;

    /// Decode the bytes after the completion code (exactly `LEN - 1` bytes)
    fn decode(payload: &[u8]) -> Self;
}

/// Check completion code and length, then decode the response of `R`
pub fn decode_response<R: PeciRequest>(bytes: &[u8]) -> wire::Result<R::Response> {
    let payload = check_response(R::NAME, bytes, R::Response::LEN)?;
    Ok(R::Response::decode(payload))
}

/// 32-bit response payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dword(pub u32);

impl PeciResponse for Dword {
    const LEN: usize = 5;

    fn decode(payload: &[u8]) -> Self {
        Dword(le_u32(payload, 0))
    }
}

/// 64-bit response payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Qword(pub u64);

impl PeciResponse for Qword {
    const LEN: usize = 9;

    fn decode(payload: &[u8]) -> Self {
        Qword(le_u64(payload, 0))
    }
}

/// Four per-group turbo ratios, one byte each
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurboRatios(pub [u8; 4]);

impl PeciResponse for TurboRatios {
    const LEN: usize = 5;

    fn decode(payload: &[u8]) -> Self {
        TurboRatios([payload[0], payload[1], payload[2], payload[3]])
    }
}

/// Completion code only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion;

impl PeciResponse for Completion {
    const LEN: usize = 1;

    fn decode(_payload: &[u8]) -> Self {
        Completion
    }
}

/// Memory telemetry sample: read and write counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryCounters {
    pub reads: u32,
    pub writes: u32,
}

impl PeciResponse for TelemetryCounters {
    const LEN: usize = 9;

    fn decode(payload: &[u8]) -> Self {
        TelemetryCounters {
            reads: le_u32(payload, 0),
            writes: le_u32(payload, 4),
        }
    }
}

fn pkg_config_request(index: u8, param: u16) -> Vec<u8> {
    let param = param.to_le_bytes();
    vec![command::RD_PKG_CONFIG, HOST_ID, index, param[0], param[1]]
}

fn endpoint_request(command: u8, kind: EndpointKind) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(24);
    bytes.push(command);
    bytes.push(HOST_ID);
    bytes.extend_from_slice(&kind.header());
    bytes
}

/// RdPkgConfig(0): raw CPUID
#[derive(Debug, Clone, Copy, Default)]
pub struct GetCpuId;

impl PeciRequest for GetCpuId {
    type Response = Dword;
    const NAME: &'static str = "GetCpuId";

    fn encode(&self, _target: u8) -> Vec<u8> {
        pkg_config_request(pkg_config::CPU_ID_INDEX, pkg_config::CPU_ID_PARAM)
    }
}

/// RdPkgConfig(31, 0xFE): package C0 residency counter
#[derive(Debug, Clone, Copy, Default)]
pub struct GetCpuC0Counter;

impl PeciRequest for GetCpuC0Counter {
    type Response = Qword;
    const NAME: &'static str = "GetCpuC0Counter";

    fn encode(&self, _target: u8) -> Vec<u8> {
        pkg_config_request(pkg_config::C0_COUNTER_INDEX, pkg_config::C0_COUNTER_PARAM)
    }
}

/// RdPkgConfig(49): max turbo ratios for one group of four core counts
///
/// ## Parameter Format
///
/// | Bits  | Field        |
/// |-------|--------------|
/// | 0     | limit_source |
/// | 1-4   | avx_level    |
/// | 5-11  | core_group   |
/// | 12-15 | reserved     |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetMaxTurboRatio {
    pub limit_source: bool,
    pub avx_level: u8,
    pub core_group: u8,
}

impl GetMaxTurboRatio {
    pub fn for_group(core_group: u8) -> Self {
        Self {
            core_group,
            ..Default::default()
        }
    }

    pub fn param(&self) -> u16 {
        (self.limit_source as u16)
            | ((self.avx_level as u16 & 0xF) << 1)
            | ((self.core_group as u16 & 0x7F) << 5)
    }
}

impl PeciRequest for GetMaxTurboRatio {
    type Response = TurboRatios;
    const NAME: &'static str = "GetMaxTurboRatio";

    fn encode(&self, _target: u8) -> Vec<u8> {
        pkg_config_request(pkg_config::MAX_TURBO_RATIO_INDEX, self.param())
    }
}

/// RdEndpointConfig on a PCI-local register, 32-bit result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPciLocal {
    pub address: PciAddress,
}

impl ReadPciLocal {
    pub const fn new(address: PciAddress) -> Self {
        Self { address }
    }
}

impl PeciRequest for ReadPciLocal {
    type Response = Dword;
    const NAME: &'static str = "RdEndpointConfig(PciLocal)";

    fn encode(&self, _target: u8) -> Vec<u8> {
        let mut bytes = endpoint_request(command::RD_ENDPOINT_CONFIG, EndpointKind::PciLocal);
        bytes.extend_from_slice(&self.address.to_raw().to_le_bytes());
        bytes
    }
}

/// RdEndpointConfig on a PCI-local register, 64-bit result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPciLocalQword {
    pub address: PciAddress,
}

impl ReadPciLocalQword {
    pub const fn new(address: PciAddress) -> Self {
        Self { address }
    }
}

impl PeciRequest for ReadPciLocalQword {
    type Response = Qword;
    const NAME: &'static str = "RdEndpointConfig(PciLocal, 64-bit)";

    fn encode(&self, _target: u8) -> Vec<u8> {
        let mut bytes = endpoint_request(command::RD_ENDPOINT_CONFIG, EndpointKind::PciLocal);
        bytes.extend_from_slice(&self.address.to_raw().to_le_bytes());
        bytes
    }
}

/// RdEndpointConfig on a 64-bit MMIO offset, 32-bit result
///
/// Address bytes: `{func:3, dev:5}`, `bus`, then the u64 register offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadMmio64 {
    pub bus: u8,
    pub dev: u8,
    pub func: u8,
    pub reg: u64,
}

impl PeciRequest for ReadMmio64 {
    type Response = Dword;
    const NAME: &'static str = "RdEndpointConfig(Mmio64)";

    fn encode(&self, _target: u8) -> Vec<u8> {
        let mut bytes = endpoint_request(command::RD_ENDPOINT_CONFIG, EndpointKind::Mmio64);
        bytes.push((self.func & 0x7) | ((self.dev & 0x1F) << 3));
        bytes.push(self.bus);
        bytes.extend_from_slice(&self.reg.to_le_bytes());
        bytes
    }
}

/// WrEndpointConfig on a PCI-local register
///
/// The last byte is the AW FCS computed over the target and lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePciLocal {
    pub address: PciAddress,
    pub value: u32,
}

impl PeciRequest for WritePciLocal {
    type Response = Completion;
    const NAME: &'static str = "WrEndpointConfig(PciLocal)";

    fn encode(&self, target: u8) -> Vec<u8> {
        let mut bytes = endpoint_request(command::WR_ENDPOINT_CONFIG, EndpointKind::PciLocal);
        bytes.extend_from_slice(&self.address.to_raw().to_le_bytes());
        bytes.extend_from_slice(&self.value.to_le_bytes());
        bytes.push(0);

        let checksum = aw_fcs(target, &bytes, Completion::LEN as u8);
        if let Some(last) = bytes.last_mut() {
            *last = checksum;
        }
        bytes
    }
}

/// GetTelemetry sample: memory read/write counters for one sample index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetTelemetrySample {
    pub aggregator: u16,
    pub sample: u16,
}

impl PeciRequest for GetTelemetrySample {
    type Response = TelemetryCounters;
    const NAME: &'static str = "GetTelemetrySample";

    fn encode(&self, _target: u8) -> Vec<u8> {
        let mut bytes = vec![
            command::GET_TELEMETRY,
            HOST_ID,
            TELEMETRY_VERSION,
            TELEMETRY_SAMPLE_OPCODE,
        ];
        bytes.extend_from_slice(&self.aggregator.to_le_bytes());
        bytes.extend_from_slice(&self.sample.to_le_bytes());
        bytes
    }
}
