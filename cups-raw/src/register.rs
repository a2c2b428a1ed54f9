//! Generic register abstractions for PECI response and address dwords

/// Trait for 32-bit register layouts that can be converted to/from raw values
///
/// PECI responses and endpoint addresses pack several bit-fields into one
/// little-endian dword. Implementors spell out every shift and mask instead
/// of relying on compiler bit-field ordering.
///
/// # Example
///
/// ```ignore
/// use cups_raw::register::RegisterLayout;
///
/// #[derive(Debug, Default)]
/// struct MyStatus {
///     active: bool,
///     width: u8,
/// }
///
/// impl RegisterLayout for MyStatus {
///     fn to_raw(&self) -> u32 {
///         (if self.active { 1 } else { 0 }) | ((self.width as u32 & 0x3F) << 4)
///     }
///
///     fn from_raw(value: u32) -> Self {
///         Self {
///             active: (value & 1) != 0,
///             width: ((value >> 4) & 0x3F) as u8,
///         }
///     }
/// }
/// ```
pub trait RegisterLayout: Sized {
    /// Convert this layout to a raw dword
    fn to_raw(&self) -> u32;

    /// Parse a raw dword into this layout
    fn from_raw(value: u32) -> Self;

    /// Validate that every field fits its bit width
    ///
    /// Returns `Ok(())` if valid, or an error message if invalid.
    fn validate(&self) -> Result<(), &'static str> {
        Ok(())
    }
}

/// Extract `width` bits starting at `shift`
#[inline]
pub const fn bits(value: u32, shift: u32, width: u32) -> u32 {
    (value >> shift) & ((1u32 << width) - 1)
}

/// Test a single bit
#[inline]
pub const fn bit(value: u32, shift: u32) -> bool {
    (value >> shift) & 1 != 0
}
