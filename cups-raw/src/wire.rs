//! Byte-level helpers shared by every PECI command
//!
//! - completion code checking
//! - little-endian field readers
//! - the Assured Write FCS (AW FCS) checksum required by endpoint writes

pub type Result<T> = std::result::Result<T, WireError>;

/// Completion code returned by the CPU for a successful command
pub const COMPLETION_SUCCESS: u8 = 0x40;

/// CRC-8 polynomial x^8 + x^2 + x^1 + x^0
const AW_FCS_POLYNOMIAL: u8 = 0x07;

/// Errors raised while encoding or decoding PECI frames
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("Response to {request} too short: expected {expected} bytes, got {actual}")]
    ShortResponse {
        request: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid completion code for {request}: 0x{code:02X}")]
    CompletionCode { request: &'static str, code: u8 },

    #[error("Field out of range: {0}")]
    FieldOverflow(&'static str),

    #[error("Unknown CPUID == 0x{0:08X}")]
    UnknownCpuId(u32),

    #[error("Unexpected memory frequency type: {0}")]
    MemoryFrequencyType(u8),
}

/// Validate length and completion code, returning the bytes after the code
///
/// `expected` counts the completion code byte.
pub fn check_response<'a>(
    request: &'static str,
    bytes: &'a [u8],
    expected: usize,
) -> Result<&'a [u8]> {
    if bytes.len() < expected || expected == 0 {
        return Err(WireError::ShortResponse {
            request,
            expected,
            actual: bytes.len(),
        });
    }

    if bytes[0] != COMPLETION_SUCCESS {
        return Err(WireError::CompletionCode {
            request,
            code: bytes[0],
        });
    }

    Ok(&bytes[1..expected])
}

/// Read a little-endian u16 at `offset`; caller guarantees the length
#[inline]
pub fn le_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

/// Read a little-endian u32 at `offset`; caller guarantees the length
#[inline]
pub fn le_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Read a little-endian u64 at `offset`; caller guarantees the length
#[inline]
pub fn le_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

fn crc8_update(mut crc: u8, byte: u8) -> u8 {
    crc ^= byte;
    for _ in 0..8 {
        crc = if crc & 0x80 != 0 {
            (crc << 1) ^ AW_FCS_POLYNOMIAL
        } else {
            crc << 1
        };
    }
    crc
}

/// Plain CRC-8 (poly 0x07, init 0, no reflection, no final xor)
pub fn crc8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |crc, &b| crc8_update(crc, b))
}

/// Assured Write FCS for a write request
///
/// `request` is the complete request buffer, including the trailing
/// checksum slot, which is excluded from the sum. The covered stream is
/// `target, request.len(), response_len, request[..len - 1]` and the MSb of
/// the result is flipped.
pub fn aw_fcs(target: u8, request: &[u8], response_len: u8) -> u8 {
    let body = request.len().saturating_sub(1);
    let crc = [target, request.len() as u8, response_len]
        .iter()
        .chain(request[..body].iter())
        .fold(0, |crc, &b| crc8_update(crc, b));

    crc ^ 0x80
}
