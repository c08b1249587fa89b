//! # Manager Error Types
//!
//! All errors that can occur while managing devices and their state.

use thiserror::Error;

use inputstate_core::StateError;

/// Errors that can occur in the device manager.
#[derive(Error, Debug)]
pub enum ManagerError {
    /// A state buffer operation failed.
    #[error(transparent)]
    State(#[from] StateError),

    /// No device is registered at this index.
    #[error("no device at index {index} ({count} devices)")]
    DeviceNotFound {
        /// The requested index.
        index: usize,
        /// Number of registered devices.
        count: usize,
    },

    /// A control path did not resolve on the device.
    #[error("device '{device}' has no control '{path}'")]
    ControlNotFound {
        /// Device name.
        device: String,
        /// The path that was looked up.
        path: String,
    },

    /// A state event does not fit the device's state.
    #[error("state event of {len} bytes at offset {offset} exceeds device '{device}' state of {size} bytes")]
    EventOutOfRange {
        /// Device name.
        device: String,
        /// Offset of the event data in the device state.
        offset: u32,
        /// Length of the event data.
        len: usize,
        /// Size of the device state.
        size: u32,
    },

    /// The configuration file could not be read.
    #[error("failed to read configuration '{path}': {source}")]
    ConfigRead {
        /// Path of the file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid TOML or has unknown values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] toml::de::Error),
}

/// Result type for manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;
