//! # State Formats
//!
//! Tags describing how a control's value is encoded in state memory.

mod fourcc;
mod primitive;

pub use fourcc::FourCC;
pub use primitive::{
    get_primitive_format_from_type, get_size_of_primitive_format_in_bits, PrimitiveValue,
    StateFormat, PRIMITIVE_FORMATS,
};
