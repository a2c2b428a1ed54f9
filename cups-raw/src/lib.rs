//! # cups-raw
//!
//! PECI command layouts and per-model register tables used to compute the
//! CPU Utilization Per Second (CUPS) index from a BMC.
//!
//! This crate is pure data and byte-level encoding: it never touches a bus.
//! Every request is serialized field by field (little-endian, packed) and
//! every response is decoded the same way, so the wire layout does not
//! depend on any native struct layout.
//!
//! ## Supported CPU models
//!
//! - **Sapphire Rapids** (`CpuModel::SapphireRapids`)
//! - **Granite Rapids** (`CpuModel::GraniteRapids`)
//!
//! ## Usage
//!
//! ```ignore
//! use cups_raw::cpu::CpuModel;
//! use cups_raw::peci::{decode_response, PeciRequest, ReadPciLocal};
//!
//! let model = CpuModel::from_cpu_id(0x806F3)?;
//! let request = ReadPciLocal::new(model.tables().core.core_mask_low);
//!
//! let bytes = request.encode(0x30);
//! // ... hand `bytes` to the PECI driver, get `raw` back ...
//! let mask = decode_response::<ReadPciLocal>(&raw)?.0;
//! ```

pub mod arch;
pub mod cpu;
pub mod peci;
pub mod register;
pub mod wire;

// Re-export for convenience
pub use cpu::CpuModel;
pub use register::RegisterLayout;
pub use wire::{Result, WireError};
