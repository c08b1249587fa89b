//! # Primitive State Formats
//!
//! The closed set of encodings a single control can use, and the mapping from
//! Rust value types onto them.

use std::any::TypeId;

use super::fourcc::FourCC;

/// Encoding of a control's value in state memory.
///
/// Primitive formats carry their bit width. `Custom` tags composite layouts
/// (usually a whole device) that have no width of their own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateFormat {
    /// One or more bits inside a byte.
    Bit,
    /// Signed 32-bit integer.
    Int,
    /// Unsigned 32-bit integer.
    UInt,
    /// Signed 16-bit integer.
    Short,
    /// Unsigned 16-bit integer.
    UShort,
    /// Unsigned 8-bit integer.
    Byte,
    /// Signed 8-bit integer.
    SByte,
    /// 32-bit IEEE float.
    Float,
    /// 64-bit IEEE float.
    Double,
    /// Two floats.
    Vector2,
    /// Three floats.
    Vector3,
    /// Four floats.
    Quaternion,
    /// Two signed shorts.
    Vector2Short,
    /// Three signed shorts.
    Vector3Short,
    /// Two bytes.
    Vector2Byte,
    /// Three bytes.
    Vector3Byte,
    /// A composite layout identified only by its tag.
    Custom(FourCC),
}

/// Every primitive format, in tag-table order.
pub const PRIMITIVE_FORMATS: [StateFormat; 16] = [
    StateFormat::Bit,
    StateFormat::Int,
    StateFormat::UInt,
    StateFormat::Short,
    StateFormat::UShort,
    StateFormat::Byte,
    StateFormat::SByte,
    StateFormat::Float,
    StateFormat::Double,
    StateFormat::Vector2,
    StateFormat::Vector3,
    StateFormat::Quaternion,
    StateFormat::Vector2Short,
    StateFormat::Vector3Short,
    StateFormat::Vector2Byte,
    StateFormat::Vector3Byte,
];

impl StateFormat {
    /// Returns the four-character tag of this format.
    #[must_use]
    pub const fn fourcc(self) -> FourCC {
        match self {
            Self::Bit => FourCC::new3(b'B', b'I', b'T'),
            Self::Int => FourCC::new3(b'I', b'N', b'T'),
            Self::UInt => FourCC::new(b'U', b'I', b'N', b'T'),
            Self::Short => FourCC::new(b'S', b'H', b'R', b'T'),
            Self::UShort => FourCC::new(b'U', b'S', b'H', b'T'),
            Self::Byte => FourCC::new(b'B', b'Y', b'T', b'E'),
            Self::SByte => FourCC::new(b'S', b'B', b'Y', b'T'),
            Self::Float => FourCC::new3(b'F', b'L', b'T'),
            Self::Double => FourCC::new3(b'D', b'B', b'L'),
            Self::Vector2 => FourCC::new(b'V', b'E', b'C', b'2'),
            Self::Vector3 => FourCC::new(b'V', b'E', b'C', b'3'),
            Self::Quaternion => FourCC::new(b'Q', b'U', b'A', b'T'),
            Self::Vector2Short => FourCC::new(b'V', b'C', b'2', b'S'),
            Self::Vector3Short => FourCC::new(b'V', b'C', b'3', b'S'),
            Self::Vector2Byte => FourCC::new(b'V', b'C', b'2', b'B'),
            Self::Vector3Byte => FourCC::new(b'V', b'C', b'3', b'B'),
            Self::Custom(code) => code,
        }
    }

    /// Maps a tag back onto a format. Unknown tags become `Custom`.
    #[must_use]
    pub fn from_fourcc(code: FourCC) -> Self {
        PRIMITIVE_FORMATS
            .iter()
            .copied()
            .find(|format| format.fourcc() == code)
            .unwrap_or(Self::Custom(code))
    }

    /// Natural width of the format in bits, `None` for composite formats.
    #[must_use]
    pub const fn size_in_bits(self) -> Option<u32> {
        let bits = match self {
            Self::Bit => 1,
            Self::Int | Self::UInt | Self::Float | Self::Vector2Short => 32,
            Self::Short | Self::UShort | Self::Vector2Byte => 16,
            Self::Byte | Self::SByte => 8,
            Self::Double | Self::Vector2 => 64,
            Self::Vector3 => 96,
            Self::Quaternion => 128,
            Self::Vector3Short => 48,
            Self::Vector3Byte => 24,
            Self::Custom(_) => return None,
        };
        Some(bits)
    }

    /// Returns true for every format except `Custom`.
    #[inline]
    #[must_use]
    pub const fn is_primitive(self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl TryFrom<String> for StateFormat {
    type Error = String;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        if text.is_empty() || text.len() > 4 || !text.is_ascii() {
            return Err(format!("'{text}' is not a four-character format tag"));
        }
        Ok(Self::from_fourcc(FourCC::from_str_padded(&text)))
    }
}

/// Natural bit width of the format with the given tag.
///
/// Returns `None` for composite or unrecognized tags; callers must check.
#[must_use]
pub fn get_size_of_primitive_format_in_bits(code: FourCC) -> Option<u32> {
    StateFormat::from_fourcc(code).size_in_bits()
}

/// Rust value types that have a primitive state format.
pub trait PrimitiveValue: Copy + 'static {
    /// The format a value of this type is stored in.
    const FORMAT: StateFormat;
}

macro_rules! primitive_value {
    ($($ty:ty => $format:ident),* $(,)?) => {
        $(
            impl PrimitiveValue for $ty {
                const FORMAT: StateFormat = StateFormat::$format;
            }
        )*

        /// Maps a value type onto its primitive format.
        ///
        /// Returns `None` for types without one; callers must check.
        #[must_use]
        pub fn get_primitive_format_from_type(type_id: TypeId) -> Option<StateFormat> {
            $(
                if type_id == TypeId::of::<$ty>() {
                    return Some(StateFormat::$format);
                }
            )*
            None
        }
    };
}

primitive_value! {
    i32 => Int,
    u32 => UInt,
    i16 => Short,
    u16 => UShort,
    u8 => Byte,
    i8 => SByte,
    f32 => Float,
    f64 => Double,
    [f32; 2] => Vector2,
    [f32; 3] => Vector3,
    [f32; 4] => Quaternion,
}
