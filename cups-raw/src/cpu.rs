//! CPU socket addressing and model identification

use crate::arch::{granite_rapids, sapphire_rapids, ModelTables};
use crate::register::{bits, RegisterLayout};
use crate::wire::{self, WireError};

/// PECI address of the first socket
pub const MIN_ADDRESS: u8 = 0x30;

/// Maximum number of sockets probed
pub const MAX_CPUS: usize = 8;

/// All candidate socket addresses, `0x30..0x38`
pub fn addresses() -> impl Iterator<Item = u8> {
    (0..MAX_CPUS as u8).map(|i| MIN_ADDRESS + i)
}

/// Whether `address` names a socket in range
pub fn is_valid_address(address: u8) -> bool {
    (MIN_ADDRESS..MIN_ADDRESS + MAX_CPUS as u8).contains(&address)
}

/// The primary socket hosts the DMI link
pub fn is_primary(address: u8) -> bool {
    address == MIN_ADDRESS
}

/// Raw CPUID signature layout
///
/// | Bits  | Field      |
/// |-------|------------|
/// | 0-3   | stepping   |
/// | 4-7   | model      |
/// | 8-11  | family     |
/// | 12    | cpu_type   |
/// | 13-15 | reserved   |
/// | 16-19 | ext_model  |
/// | 20-27 | ext_family |
/// | 28-31 | reserved   |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuIdLayout {
    pub stepping: u8,
    pub model: u8,
    pub family: u8,
    pub cpu_type: u8,
    pub ext_model: u8,
    pub ext_family: u8,
}

impl RegisterLayout for CpuIdLayout {
    fn to_raw(&self) -> u32 {
        (self.stepping as u32 & 0xF)
            | ((self.model as u32 & 0xF) << 4)
            | ((self.family as u32 & 0xF) << 8)
            | ((self.cpu_type as u32 & 0x1) << 12)
            | ((self.ext_model as u32 & 0xF) << 16)
            | ((self.ext_family as u32) << 20)
    }

    fn from_raw(value: u32) -> Self {
        Self {
            stepping: bits(value, 0, 4) as u8,
            model: bits(value, 4, 4) as u8,
            family: bits(value, 8, 4) as u8,
            cpu_type: bits(value, 12, 1) as u8,
            ext_model: bits(value, 16, 4) as u8,
            ext_family: bits(value, 20, 8) as u8,
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.stepping > 0xF || self.model > 0xF || self.family > 0xF || self.ext_model > 0xF {
            return Err("CPUID nibble field exceeds 4 bits");
        }
        if self.cpu_type > 1 {
            return Err("CPUID type exceeds 1 bit");
        }
        Ok(())
    }
}

/// The identifying part of a CPUID; stepping and type are ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuSignature {
    pub model: u8,
    pub family: u8,
    pub ext_model: u8,
    pub ext_family: u8,
}

impl CpuSignature {
    pub fn matches(&self, id: &CpuIdLayout) -> bool {
        self.model == id.model
            && self.family == id.family
            && self.ext_model == id.ext_model
            && self.ext_family == id.ext_family
    }
}

/// Supported CPU models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuModel {
    SapphireRapids,
    GraniteRapids,
}

impl CpuModel {
    pub const fn all() -> &'static [CpuModel] {
        &[CpuModel::SapphireRapids, CpuModel::GraniteRapids]
    }

    /// Decode a raw CPUID into a supported model
    pub fn from_cpu_id(raw: u32) -> wire::Result<Self> {
        let id = CpuIdLayout::from_raw(raw);
        Self::all()
            .iter()
            .copied()
            .find(|model| model.tables().signature.matches(&id))
            .ok_or(WireError::UnknownCpuId(raw))
    }

    pub const fn name(&self) -> &'static str {
        match self {
            CpuModel::SapphireRapids => "SapphireRapids",
            CpuModel::GraniteRapids => "GraniteRapids",
        }
    }

    /// Register tables for this model
    pub fn tables(&self) -> &'static ModelTables {
        match self {
            CpuModel::SapphireRapids => &sapphire_rapids::TABLES,
            CpuModel::GraniteRapids => &granite_rapids::TABLES,
        }
    }
}

impl std::fmt::Display for CpuModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
