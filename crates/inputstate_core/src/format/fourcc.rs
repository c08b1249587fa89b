//! # Four-Character Codes
//!
//! Memory layouts are tagged with a four-character code. Primitive formats use
//! fixed tags; device-level (composite) formats pick their own.

use std::fmt;

use bytemuck::{Pod, Zeroable};

/// A four-character type tag.
///
/// Three-character tags are padded with a trailing space, so `"BIT"` is stored
/// as `b"BIT "`. The all-zero code is the "no format" tag.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
#[repr(C)]
pub struct FourCC {
    code: [u8; 4],
}

impl FourCC {
    /// The empty tag.
    pub const NONE: Self = Self { code: [0; 4] };

    /// Creates a tag from four bytes.
    #[inline]
    #[must_use]
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self { code: [a, b, c, d] }
    }

    /// Creates a tag from three bytes, padding the fourth with a space.
    #[inline]
    #[must_use]
    pub const fn new3(a: u8, b: u8, c: u8) -> Self {
        Self::new(a, b, c, b' ')
    }

    /// Creates a tag from a string of up to four ASCII characters.
    ///
    /// Shorter strings are space padded; characters past the fourth are ignored.
    #[must_use]
    pub fn from_str_padded(text: &str) -> Self {
        let mut code = [b' '; 4];
        for (slot, byte) in code.iter_mut().zip(text.bytes()) {
            *slot = byte;
        }
        Self { code }
    }

    /// Returns the raw bytes of the tag.
    #[inline]
    #[must_use]
    pub const fn bytes(self) -> [u8; 4] {
        self.code
    }

    /// Returns true for the empty tag.
    #[inline]
    #[must_use]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text: String = self
            .code
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
            .collect();
        f.write_str(text.trim_end())
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({self})")
    }
}
