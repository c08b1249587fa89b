//! # State Error Types
//!
//! All errors that can occur while decoding state or managing state buffers.

use std::fmt;

use thiserror::Error;

use crate::format::FourCC;
use crate::update::UpdateMode;

/// The state operation that was attempted when an error was raised.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateOperation {
    /// `StateBlock::read_int`.
    ReadInt,
    /// `StateBlock::write_int`.
    WriteInt,
    /// `StateBlock::read_float`.
    ReadFloat,
    /// `StateBlock::write_float`.
    WriteFloat,
}

impl fmt::Display for StateOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReadInt => "integer read",
            Self::WriteInt => "integer write",
            Self::ReadFloat => "floating-point read",
            Self::WriteFloat => "floating-point write",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in the state subsystem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The state block's format has no encoding for the requested operation.
    #[error("state format '{format}' is not supported for {operation}")]
    UnsupportedFormat {
        /// The operation that was attempted.
        operation: StateOperation,
        /// The offending format tag.
        format: FourCC,
    },

    /// The format is known to the operation but the particular shape is not.
    #[error("{operation} of state format '{format}' is not implemented: {reason}")]
    NotImplemented {
        /// The operation that was attempted.
        operation: StateOperation,
        /// The offending format tag.
        format: FourCC,
        /// What exactly is missing.
        reason: &'static str,
    },

    /// A device reported a zero-sized state block at allocation time.
    #[error("device '{name}' (index {index}) has a zero-size state buffer")]
    ZeroSizeDevice {
        /// Device name.
        name: String,
        /// Position of the device in the device list.
        index: usize,
    },

    /// An access fell outside the memory it was aimed at.
    #[error("state access out of bounds: {len} bytes at offset {offset} in a buffer of {size} bytes")]
    OutOfBounds {
        /// Byte offset of the access.
        offset: usize,
        /// Length of the access in bytes.
        len: usize,
        /// Size of the accessed memory.
        size: usize,
    },

    /// A device index does not exist in the current buffers.
    #[error("device index {index} out of range ({count} devices)")]
    DeviceIndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of devices known to the buffers.
        count: usize,
    },

    /// The requested update mode has no buffers in this build.
    #[error("update mode {0:?} has no state buffers in this build")]
    UnsupportedUpdateMode(UpdateMode),

    /// The buffers have not been allocated (or have been freed).
    #[error("state buffers are not allocated")]
    NotAllocated,

    /// A buffer handle from a different arena was used.
    #[error("buffer handle belongs to a different state arena")]
    ForeignBuffer,

    /// The per-device offset table does not match the device list.
    #[error("offset table has {actual} entries but {expected} devices were given")]
    OffsetTableMismatch {
        /// Number of devices.
        expected: usize,
        /// Number of offsets.
        actual: usize,
    },

    /// A control's offsets run past the addressable bit range of a device.
    #[error("layout of control '{control}' overflows the device's bit range")]
    LayoutOverflow {
        /// Name of the offending control.
        control: String,
    },

    /// A bit access asked for more bits than fit an integer.
    #[error("cannot access {0} bits at once (maximum is 32)")]
    TooManyBits(u32),
}

/// Result type for state operations.
pub type StateResult<T> = Result<T, StateError>;
