//! # State Buffers
//!
//! Double-buffered device state for every enabled update mode.
//!
//! - [`StateBuffers`]: the arena plus allocation, migration and release
//! - [`DoubleBuffers`]: per-device front/back mapping for one update mode
//! - [`StateContext`]: the buffers reads currently resolve against

mod context;
mod double_buffers;
mod state_buffers;

pub use context::StateContext;
pub use double_buffers::{BufferPtr, DoubleBuffers};
pub use state_buffers::{DeviceSlot, MigrationReport, StateBuffers};
