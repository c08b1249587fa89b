//! # Bit Access
//!
//! Reads and writes of bitfields inside byte buffers. Bit offsets count from
//! the least significant bit of the first byte and may run past the first byte.

use crate::error::{StateError, StateResult};

/// Maximum number of bits a single multi-bit access can move.
pub const MAX_BITS_PER_ACCESS: u32 = 32;

/// First byte and byte count covered by `count` bits at `bit_offset`, or
/// `None` if the last bit lies past `u32::MAX`.
#[inline]
fn byte_span(bit_offset: u32, count: u32) -> Option<(usize, usize)> {
    let last_bit = bit_offset.checked_add(count.max(1) - 1)?;
    let first = (bit_offset / 8) as usize;
    let last = (last_bit / 8) as usize;
    Some((first, last - first + 1))
}

#[inline]
fn check_span(bytes: &[u8], bit_offset: u32, count: u32) -> StateResult<(usize, usize)> {
    if count > MAX_BITS_PER_ACCESS {
        return Err(StateError::TooManyBits(count));
    }
    let out_of_bounds = |offset: usize, len: usize| StateError::OutOfBounds {
        offset,
        len,
        size: bytes.len(),
    };
    let (first, len) = byte_span(bit_offset, count)
        .ok_or_else(|| out_of_bounds((bit_offset / 8) as usize, count.div_ceil(8) as usize))?;
    if first + len > bytes.len() {
        return Err(out_of_bounds(first, len));
    }
    Ok((first, len))
}

/// Reads the bit at `bit_offset`.
///
/// # Errors
///
/// `OutOfBounds` if the bit lies past the end of `bytes`.
#[inline]
pub fn read_single_bit(bytes: &[u8], bit_offset: u32) -> StateResult<bool> {
    check_span(bytes, bit_offset, 1)?;
    let byte = bytes[(bit_offset / 8) as usize];
    Ok(byte & (1 << (bit_offset % 8)) != 0)
}

/// Sets or clears the bit at `bit_offset`.
///
/// # Errors
///
/// `OutOfBounds` if the bit lies past the end of `bytes`.
#[inline]
pub fn write_single_bit(bytes: &mut [u8], bit_offset: u32, value: bool) -> StateResult<()> {
    check_span(bytes, bit_offset, 1)?;
    let byte = &mut bytes[(bit_offset / 8) as usize];
    let mask = 1u8 << (bit_offset % 8);
    if value {
        *byte |= mask;
    } else {
        *byte &= !mask;
    }
    Ok(())
}

/// Reads `count` bits starting at `bit_offset` as an unsigned integer.
///
/// # Errors
///
/// `TooManyBits` for more than 32 bits, `OutOfBounds` if the field runs past
/// the end of `bytes`.
pub fn read_multiple_bits(bytes: &[u8], bit_offset: u32, count: u32) -> StateResult<u32> {
    let (first, len) = check_span(bytes, bit_offset, count)?;
    if count == 0 {
        return Ok(0);
    }

    // Gather the covering bytes into a u64; 32 bits plus a 7-bit shift fit in 5 bytes.
    let mut word = 0u64;
    for (i, byte) in bytes[first..first + len].iter().enumerate() {
        word |= u64::from(*byte) << (i * 8);
    }

    let shifted = word >> (bit_offset % 8);
    let mask = (1u64 << count) - 1;
    // Masked to at most 32 bits.
    #[allow(clippy::cast_possible_truncation)]
    Ok((shifted & mask) as u32)
}

/// Writes the low `count` bits of `value` starting at `bit_offset`.
///
/// Bits outside the field are preserved.
///
/// # Errors
///
/// `TooManyBits` for more than 32 bits, `OutOfBounds` if the field runs past
/// the end of `bytes`.
pub fn write_multiple_bits(bytes: &mut [u8], bit_offset: u32, count: u32, value: u32) -> StateResult<()> {
    let (first, len) = check_span(bytes, bit_offset, count)?;
    if count == 0 {
        return Ok(());
    }

    let covering = &mut bytes[first..first + len];

    let mut word = 0u64;
    for (i, byte) in covering.iter().enumerate() {
        word |= u64::from(*byte) << (i * 8);
    }

    let shift = bit_offset % 8;
    let mask = ((1u64 << count) - 1) << shift;
    word = (word & !mask) | ((u64::from(value) << shift) & mask);

    #[allow(clippy::cast_possible_truncation)]
    for (i, byte) in covering.iter_mut().enumerate() {
        *byte = (word >> (i * 8)) as u8;
    }
    Ok(())
}
