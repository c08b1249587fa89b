//! # State Blocks
//!
//! A `StateBlock` says where a control's value lives inside raw state memory
//! and how it is encoded. Reads and writes dispatch on the block's format;
//! a format an operation has no encoding for is an error, never a zero.
//!
//! ## Offsets
//!
//! Before a device is installed, offsets are relative to the device's own
//! state. Once installed, they are relative to the start of a complete state
//! image (one `size_per_buffer` snapshot of every device), so the bytes handed
//! to the read/write methods are that whole image.
//!
//! ## Normalized formats
//!
//! | Format | Read | Write |
//! |--------|------|-------|
//! | `Short` | `v / 32768` | `round(v * 32768)` clamped to `i16` |
//! | `UShort` | `v / 65535` | `round(v * 65535)` clamped to `u16` |
//! | `Byte` | `v / 255` | `round(v * 255)` clamped to `u8` |
//! | `SByte` | `v / 128` | `round(v * 128)` clamped to `i8` |
//!
//! Signed formats reach -1.0 exactly but top out just below +1.0.

use crate::bits;
use crate::error::{StateError, StateOperation, StateResult};
use crate::format::{FourCC, StateFormat};

/// Information about a memory region storing a control's state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StateBlock {
    /// Encoding of the value.
    pub format: StateFormat,
    /// Byte offset of the value. `INVALID_OFFSET` until assigned.
    pub byte_offset: u32,
    /// Bit offset from `byte_offset`, zero-based.
    pub bit_offset: u32,
    /// Size of the state in bits. Not a multiple of 8 means a bitfield.
    pub size_in_bits: u32,
}

impl StateBlock {
    /// Marks a block whose offset has not been assigned yet.
    pub const INVALID_OFFSET: u32 = u32::MAX;

    /// Creates a block at a byte offset with the format's natural size.
    ///
    /// Composite formats get a size of zero.
    #[inline]
    #[must_use]
    pub fn new(format: StateFormat, byte_offset: u32) -> Self {
        Self {
            format,
            byte_offset,
            bit_offset: 0,
            size_in_bits: format.size_in_bits().unwrap_or(0),
        }
    }

    /// Creates a bitfield block of `size_in_bits` bits at the given position.
    #[inline]
    #[must_use]
    pub const fn bits(byte_offset: u32, bit_offset: u32, size_in_bits: u32) -> Self {
        Self {
            format: StateFormat::Bit,
            byte_offset,
            bit_offset,
            size_in_bits,
        }
    }

    /// Creates an unplaced block for a composite (device-level) layout.
    #[inline]
    #[must_use]
    pub const fn unplaced(format: StateFormat, size_in_bits: u32) -> Self {
        Self {
            format,
            byte_offset: Self::INVALID_OFFSET,
            bit_offset: 0,
            size_in_bits,
        }
    }

    /// True if the block has not been assigned an offset.
    #[inline]
    #[must_use]
    pub const fn has_invalid_offset(&self) -> bool {
        self.byte_offset == Self::INVALID_OFFSET
    }

    /// True if the size is not a whole number of bytes.
    #[inline]
    #[must_use]
    pub const fn is_bitfield(&self) -> bool {
        self.size_in_bits % 8 != 0
    }

    /// Size in bytes, rounded up.
    #[inline]
    #[must_use]
    pub const fn aligned_size_in_bytes(&self) -> u32 {
        self.size_in_bits / 8 + if self.size_in_bits % 8 > 0 { 1 } else { 0 }
    }

    /// Adds `delta` to the byte offset with wrap-around.
    ///
    /// A wrapping add lets callers pass a negated offset to move a block back
    /// to device-local addressing.
    #[inline]
    pub fn bake_offset(&mut self, delta: u32) {
        self.byte_offset = self.byte_offset.wrapping_add(delta);
    }

    #[inline]
    fn single_bit(&self) -> bool {
        self.size_in_bits <= 1
    }

    #[inline]
    fn fourcc(&self) -> FourCC {
        self.format.fourcc()
    }

    fn value_bytes<'a>(&self, bytes: &'a [u8], len: usize) -> StateResult<&'a [u8]> {
        let offset = self.byte_offset as usize;
        let end = offset.checked_add(len).unwrap_or(usize::MAX);
        bytes.get(offset..end).ok_or(StateError::OutOfBounds {
            offset,
            len,
            size: bytes.len(),
        })
    }

    fn value_bytes_mut<'a>(&self, bytes: &'a mut [u8], len: usize) -> StateResult<&'a mut [u8]> {
        let offset = self.byte_offset as usize;
        let size = bytes.len();
        let end = offset.checked_add(len).unwrap_or(usize::MAX);
        bytes
            .get_mut(offset..end)
            .ok_or(StateError::OutOfBounds { offset, len, size })
    }

    fn read_array<const N: usize>(&self, bytes: &[u8]) -> StateResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.value_bytes(bytes, N)?);
        Ok(out)
    }

    fn write_array<const N: usize>(&self, bytes: &mut [u8], value: [u8; N]) -> StateResult<()> {
        self.value_bytes_mut(bytes, N)?.copy_from_slice(&value);
        Ok(())
    }

    fn bit_region<'a>(&self, bytes: &'a [u8]) -> StateResult<&'a [u8]> {
        let offset = self.byte_offset as usize;
        bytes.get(offset..).ok_or(StateError::OutOfBounds {
            offset,
            len: 1,
            size: bytes.len(),
        })
    }

    fn bit_region_mut<'a>(&self, bytes: &'a mut [u8]) -> StateResult<&'a mut [u8]> {
        let offset = self.byte_offset as usize;
        let size = bytes.len();
        bytes
            .get_mut(offset..)
            .ok_or(StateError::OutOfBounds { offset, len: 1, size })
    }

    fn unsupported(&self, operation: StateOperation) -> StateError {
        StateError::UnsupportedFormat {
            operation,
            format: self.fourcc(),
        }
    }

    /// Reads the value as an integer.
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` for formats without an integer encoding,
    /// `OutOfBounds` if the value lies outside `bytes`.
    pub fn read_int(&self, bytes: &[u8]) -> StateResult<i32> {
        let value = match self.format {
            StateFormat::Int => i32::from_le_bytes(self.read_array(bytes)?),
            StateFormat::UInt => u32::from_le_bytes(self.read_array(bytes)?) as i32,
            StateFormat::Bit => {
                let region = self.bit_region(bytes)?;
                if self.single_bit() {
                    i32::from(bits::read_single_bit(region, self.bit_offset)?)
                } else {
                    bits::read_multiple_bits(region, self.bit_offset, self.size_in_bits)? as i32
                }
            }
            StateFormat::Byte => i32::from(self.read_array::<1>(bytes)?[0]),
            StateFormat::SByte => i32::from(i8::from_le_bytes(self.read_array(bytes)?)),
            StateFormat::Short => i32::from(i16::from_le_bytes(self.read_array(bytes)?)),
            StateFormat::UShort => i32::from(u16::from_le_bytes(self.read_array(bytes)?)),
            _ => return Err(self.unsupported(StateOperation::ReadInt)),
        };
        Ok(value)
    }

    /// Writes an integer value.
    ///
    /// Narrow formats keep the low bits of `value`; bitfields keep the low
    /// `size_in_bits` bits; a single bit is set for any non-zero value.
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` for formats without an integer encoding,
    /// `OutOfBounds` if the value lies outside `bytes`.
    pub fn write_int(&self, bytes: &mut [u8], value: i32) -> StateResult<()> {
        match self.format {
            StateFormat::Int => self.write_array(bytes, value.to_le_bytes()),
            StateFormat::UInt => self.write_array(bytes, (value as u32).to_le_bytes()),
            StateFormat::Bit => {
                let bit_offset = self.bit_offset;
                let region = self.bit_region_mut(bytes)?;
                if self.single_bit() {
                    bits::write_single_bit(region, bit_offset, value != 0)
                } else {
                    bits::write_multiple_bits(region, bit_offset, self.size_in_bits, value as u32)
                }
            }
            StateFormat::Byte => self.write_array(bytes, [value as u8]),
            StateFormat::SByte => self.write_array(bytes, (value as i8).to_le_bytes()),
            StateFormat::Short => self.write_array(bytes, (value as i16).to_le_bytes()),
            StateFormat::UShort => self.write_array(bytes, (value as u16).to_le_bytes()),
            _ => Err(self.unsupported(StateOperation::WriteInt)),
        }
    }

    /// Reads the value as a float.
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` for formats without a float encoding,
    /// `NotImplemented` for multi-bit bitfields, `OutOfBounds` if the value
    /// lies outside `bytes`.
    pub fn read_float(&self, bytes: &[u8]) -> StateResult<f32> {
        let value = match self.format {
            StateFormat::Float => f32::from_le_bytes(self.read_array(bytes)?),
            StateFormat::Bit => {
                if !self.single_bit() {
                    return Err(StateError::NotImplemented {
                        operation: StateOperation::ReadFloat,
                        format: self.fourcc(),
                        reason: "multi-bit fields cannot be converted to floats",
                    });
                }
                let region = self.bit_region(bytes)?;
                if bits::read_single_bit(region, self.bit_offset)? {
                    1.0
                } else {
                    0.0
                }
            }
            // Clean -1.0 at the bottom, +1.0 is unreachable at the top.
            StateFormat::Short => f32::from(i16::from_le_bytes(self.read_array(bytes)?)) / 32768.0,
            StateFormat::UShort => f32::from(u16::from_le_bytes(self.read_array(bytes)?)) / 65535.0,
            StateFormat::Byte => f32::from(self.read_array::<1>(bytes)?[0]) / 255.0,
            // Same asymmetry as Short.
            StateFormat::SByte => f32::from(i8::from_le_bytes(self.read_array(bytes)?)) / 128.0,
            _ => return Err(self.unsupported(StateOperation::ReadFloat)),
        };
        Ok(value)
    }

    /// Writes a float value, quantizing for normalized integer formats.
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` for formats without a float encoding,
    /// `NotImplemented` for multi-bit bitfields, `OutOfBounds` if the value
    /// lies outside `bytes`.
    pub fn write_float(&self, bytes: &mut [u8], value: f32) -> StateResult<()> {
        match self.format {
            StateFormat::Float => self.write_array(bytes, value.to_le_bytes()),
            StateFormat::Bit => {
                if !self.single_bit() {
                    return Err(StateError::NotImplemented {
                        operation: StateOperation::WriteFloat,
                        format: self.fourcc(),
                        reason: "multi-bit fields cannot be converted from floats",
                    });
                }
                let bit_offset = self.bit_offset;
                let region = self.bit_region_mut(bytes)?;
                bits::write_single_bit(region, bit_offset, value >= 0.5)
            }
            StateFormat::Short => {
                let raw = quantize(value, 32768.0, f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
                self.write_array(bytes, raw.to_le_bytes())
            }
            StateFormat::UShort => {
                let raw = quantize(value, 65535.0, 0.0, f32::from(u16::MAX)) as u16;
                self.write_array(bytes, raw.to_le_bytes())
            }
            StateFormat::Byte => {
                let raw = quantize(value, 255.0, 0.0, f32::from(u8::MAX)) as u8;
                self.write_array(bytes, [raw])
            }
            StateFormat::SByte => {
                let raw = quantize(value, 128.0, f32::from(i8::MIN), f32::from(i8::MAX)) as i8;
                self.write_array(bytes, raw.to_le_bytes())
            }
            _ => Err(self.unsupported(StateOperation::WriteFloat)),
        }
    }
}

#[inline]
fn quantize(value: f32, scale: f32, min: f32, max: f32) -> f32 {
    (value * scale).round().clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_sizes() {
        let block = StateBlock::bits(0, 3, 5);
        assert!(block.is_bitfield());
        assert_eq!(block.aligned_size_in_bytes(), 1);

        let block = StateBlock::new(StateFormat::Vector3, 0);
        assert!(!block.is_bitfield());
        assert_eq!(block.aligned_size_in_bytes(), 12);

        assert_eq!(StateBlock::bits(0, 0, 17).aligned_size_in_bytes(), 3);
    }

    #[test]
    fn test_float_is_raw_passthrough() {
        let mut bytes = [0u8; 8];
        let block = StateBlock::new(StateFormat::Float, 4);
        block.write_float(&mut bytes, 0.5).unwrap();
        assert_eq!(&bytes[4..], &0.5f32.to_le_bytes());
        assert_eq!(block.read_float(&bytes).unwrap(), 0.5);
    }

    #[test]
    fn test_integer_widening() {
        let bytes = [0xFF, 0xFF, 0x80, 0x00];
        assert_eq!(StateBlock::new(StateFormat::Byte, 0).read_int(&bytes).unwrap(), 255);
        assert_eq!(StateBlock::new(StateFormat::SByte, 0).read_int(&bytes).unwrap(), -1);
        assert_eq!(StateBlock::new(StateFormat::Short, 0).read_int(&bytes).unwrap(), -1);
        assert_eq!(StateBlock::new(StateFormat::UShort, 0).read_int(&bytes).unwrap(), 65535);
        assert_eq!(StateBlock::new(StateFormat::UShort, 2).read_int(&bytes).unwrap(), 0x80);
    }

    #[test]
    fn test_int_round_trip() {
        let mut bytes = [0u8; 4];
        for (format, value) in [
            (StateFormat::Int, -123_456),
            (StateFormat::UInt, 987_654),
            (StateFormat::Short, -300),
            (StateFormat::UShort, 60_000),
            (StateFormat::Byte, 200),
            (StateFormat::SByte, -100),
        ] {
            let block = StateBlock::new(format, 0);
            block.write_int(&mut bytes, value).unwrap();
            assert_eq!(block.read_int(&bytes).unwrap(), value, "{format:?}");
        }
    }

    #[test]
    fn test_bitfields() {
        let mut bytes = [0u8; 2];
        let wide = StateBlock::bits(0, 3, 6);
        wide.write_int(&mut bytes, 0b10_1101).unwrap();
        assert_eq!(wide.read_int(&bytes).unwrap(), 0b10_1101);

        let button = StateBlock::bits(1, 7, 1);
        button.write_int(&mut bytes, 5).unwrap();
        assert_eq!(button.read_int(&bytes).unwrap(), 1);
        assert_eq!(button.read_float(&bytes).unwrap(), 1.0);

        // Zero size is read as a single bit.
        let zero_sized = StateBlock::bits(1, 7, 0);
        assert_eq!(zero_sized.read_int(&bytes).unwrap(), 1);

        button.write_float(&mut bytes, 0.25).unwrap();
        assert_eq!(button.read_float(&bytes).unwrap(), 0.0);
        assert_eq!(wide.read_int(&bytes).unwrap(), 0b10_1101);
    }

    #[test]
    fn test_multi_bit_float_not_implemented() {
        let bytes = [0u8; 1];
        let block = StateBlock::bits(0, 0, 4);
        assert!(matches!(
            block.read_float(&bytes),
            Err(StateError::NotImplemented { operation: StateOperation::ReadFloat, .. })
        ));
    }

    #[test]
    fn test_normalized_reads() {
        assert_eq!(StateBlock::new(StateFormat::Short, 0).read_float(&i16::MIN.to_le_bytes()).unwrap(), -1.0);
        assert!(StateBlock::new(StateFormat::Short, 0).read_float(&i16::MAX.to_le_bytes()).unwrap() < 1.0);
        assert_eq!(StateBlock::new(StateFormat::UShort, 0).read_float(&u16::MAX.to_le_bytes()).unwrap(), 1.0);
        assert_eq!(StateBlock::new(StateFormat::Byte, 0).read_float(&[255]).unwrap(), 1.0);
        assert_eq!(StateBlock::new(StateFormat::SByte, 0).read_float(&[0x80]).unwrap(), -1.0);
    }

    #[test]
    fn test_float_round_trip_within_quantization() {
        let mut bytes = [0u8; 4];
        for (format, step) in [
            (StateFormat::Short, 1.0 / 32768.0),
            (StateFormat::UShort, 1.0 / 65535.0),
            (StateFormat::Byte, 1.0 / 255.0),
            (StateFormat::SByte, 1.0 / 128.0),
        ] {
            let block = StateBlock::new(format, 0);
            let samples: &[f32] = if matches!(format, StateFormat::Short | StateFormat::SByte) {
                &[-1.0, -0.5, 0.0, 0.3, 0.75]
            } else {
                &[0.0, 0.3, 0.5, 1.0]
            };
            for &value in samples {
                block.write_float(&mut bytes, value).unwrap();
                let read = block.read_float(&bytes).unwrap();
                assert!((read - value).abs() <= step, "{format:?}: wrote {value}, read {read}");
            }
        }
    }

    #[test]
    fn test_write_float_clamps() {
        let mut bytes = [0u8; 2];
        let block = StateBlock::new(StateFormat::Short, 0);
        block.write_float(&mut bytes, 1.0).unwrap();
        assert_eq!(block.read_int(&bytes).unwrap(), i32::from(i16::MAX));

        let block = StateBlock::new(StateFormat::Byte, 0);
        block.write_float(&mut bytes, -3.0).unwrap();
        assert_eq!(block.read_int(&bytes).unwrap(), 0);
    }

    #[test]
    fn test_unsupported_formats_fail_loudly() {
        let mut bytes = [0u8; 16];
        let double = StateBlock::new(StateFormat::Double, 0);
        assert_eq!(
            double.read_int(&bytes),
            Err(StateError::UnsupportedFormat {
                operation: StateOperation::ReadInt,
                format: StateFormat::Double.fourcc(),
            })
        );
        assert!(matches!(double.write_int(&mut bytes, 1), Err(StateError::UnsupportedFormat { .. })));

        let vector = StateBlock::new(StateFormat::Vector2, 0);
        assert!(matches!(vector.read_float(&bytes), Err(StateError::UnsupportedFormat { .. })));
        assert!(matches!(vector.write_float(&mut bytes, 1.0), Err(StateError::UnsupportedFormat { .. })));

        let int = StateBlock::new(StateFormat::Int, 0);
        assert!(matches!(int.read_float(&bytes), Err(StateError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_out_of_bounds_access() {
        let bytes = [0u8; 4];
        let block = StateBlock::new(StateFormat::Float, 2);
        assert_eq!(
            block.read_float(&bytes),
            Err(StateError::OutOfBounds { offset: 2, len: 4, size: 4 })
        );
        let bit = StateBlock::bits(4, 0, 1);
        assert!(matches!(bit.read_int(&bytes), Err(StateError::OutOfBounds { .. })));
    }

    #[test]
    fn test_bake_offset_wraps() {
        let mut block = StateBlock::new(StateFormat::Byte, 12);
        block.bake_offset(100);
        assert_eq!(block.byte_offset, 112);
        block.bake_offset(100u32.wrapping_neg());
        assert_eq!(block.byte_offset, 12);
    }
}
