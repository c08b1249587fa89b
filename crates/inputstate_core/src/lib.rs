//! # INPUTSTATE Core
//!
//! Raw memory for input device state, designed for:
//! - Thousands of control reads per frame without allocation
//! - O(1) per-device "current vs previous" flips
//! - Device hot-plug without losing the state of other devices
//!
//! ## Architecture Rules
//!
//! 1. **One allocation per device-list change** - every buffer is carved from
//!    a single arena
//! 2. **Swaps move pointers, not bytes** - double buffers flip mapping-table
//!    entries per device
//! 3. **Packed state** - controls address bits and bytes of one contiguous
//!    state image through a [`StateBlock`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use inputstate_core::{DeviceBuilder, InputControl, StateBuffers, StateFormat, UpdateMask, UpdateMode};
//!
//! let mut devices = vec![DeviceBuilder::new("pad", "GPAD")
//!     .control(InputControl::new("trigger", StateFormat::Byte))
//!     .build()?];
//! let mut buffers = StateBuffers::new();
//! let offsets = buffers.allocate_all(UpdateMask::DYNAMIC, &devices)?;
//! buffers.migrate_all(&mut devices, &offsets, &StateBuffers::new(), None)?;
//!
//! let front = buffers.front_buffer(UpdateMode::Dynamic, 0)?;
//! let trigger = devices[0].find_control("trigger").unwrap().state_block;
//! let value = trigger.read_float(buffers.state_image(front, 0)?)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod bits;
pub mod block;
pub mod buffers;
pub mod device;
pub mod error;
pub mod format;
pub mod memory;
pub mod update;

pub use block::StateBlock;
pub use buffers::{BufferPtr, DeviceSlot, DoubleBuffers, MigrationReport, StateBuffers, StateContext};
pub use device::{DeviceBuilder, InputControl, InputDevice};
pub use error::{StateError, StateOperation, StateResult};
pub use format::{FourCC, StateFormat};
pub use memory::{ArenaId, StateArena};
pub use update::{UpdateMask, UpdateMode};
