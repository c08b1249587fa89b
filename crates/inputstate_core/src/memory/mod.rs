//! # Memory Management
//!
//! All device state lives in one arena allocated per device-list change.
//!
//! ## Design Philosophy
//!
//! Allocation happens when devices or update modes change. Between those
//! points:
//! - No heap allocations
//! - No copying on buffer swaps
//! - Every access is bounds-checked against the arena

mod arena;

pub use arena::{align_to_multiple, ArenaId, StateArena, ARENA_ALIGNMENT, POINTER_SIZE};
