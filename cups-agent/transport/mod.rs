// PECI transport: raw command executor and the typed adapter on top of it

pub mod adapter;
pub mod dev;
#[cfg(test)]
pub mod fake;

pub use adapter::Adapter;
pub use dev::DevPeci;

use crate::error::Result;

/// Executes one raw PECI command against the CPU at `target`
///
/// Implementations return exactly the bytes the CPU answered with; length
/// and completion code checks happen in [`Adapter`].
#[cfg_attr(test, mockall::automock)]
pub trait RawPeci: Send + Sync {
    fn transfer(&self, target: u8, request: &[u8], response_len: usize) -> Result<Vec<u8>>;
}
