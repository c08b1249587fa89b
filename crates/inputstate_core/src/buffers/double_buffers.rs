//! # Double Buffers
//!
//! Per-device front/back selection for one update mode.
//!
//! The mapping table lives inside the arena: slot `2 * i` holds device `i`'s
//! front buffer, slot `2 * i + 1` its back buffer. Swapping exchanges the two
//! entries of one device; no state bytes move. Devices that received no new
//! state keep their buffers, so "current" for one device can sit in the
//! physical region that is "previous" for another.
//!
//! ```text
//! mapping table            front region          back region
//! ┌──────────────┐        ┌──────┬──────┐       ┌──────┬──────┐
//! │ dev0 front ──┼───────>│ dev0 │      │   ┌──>│      │ dev1 │
//! │ dev0 back  ──┼────────┼──────┼──────┼───┼──>│ dev0 │      │
//! │ dev1 front ──┼────────┼──────┼──────┼───┘   └──────┴──────┘
//! │ dev1 back  ──┼───────>│      │ dev1 │   (dev1 has been swapped)
//! └──────────────┘        └──────┴──────┘
//! ```

use crate::error::{StateError, StateResult};
use crate::memory::{ArenaId, StateArena, POINTER_SIZE};

/// Location of a device's state (or of a whole single buffer) in an arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferPtr {
    /// Arena the offset is valid in.
    pub arena: ArenaId,
    /// Byte offset from the start of the arena.
    pub offset: usize,
}

impl BufferPtr {
    /// Returns the pointer moved forward by `bytes`.
    #[inline]
    #[must_use]
    pub const fn add(self, bytes: usize) -> Self {
        Self {
            arena: self.arena,
            offset: self.offset + bytes,
        }
    }
}

/// Front/back mapping for every device in one update mode.
///
/// A copyable handle: copies refer to the same mapping table, so a swap made
/// through one copy is seen by all of them. An invalid handle (mode disabled
/// or buffers freed) ignores swaps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DoubleBuffers {
    arena: ArenaId,
    /// Arena offset of the mapping table; `None` when the mode is disabled.
    mapping: Option<usize>,
    device_count: usize,
}

impl DoubleBuffers {
    /// The handle of a disabled update mode.
    pub const INVALID: Self = Self {
        arena: ArenaId::NONE,
        mapping: None,
        device_count: 0,
    };

    pub(crate) const fn new(arena: ArenaId, mapping_offset: usize, device_count: usize) -> Self {
        Self {
            arena,
            mapping: Some(mapping_offset),
            device_count,
        }
    }

    /// True if the handle has a mapping table.
    #[inline]
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.mapping.is_some()
    }

    /// Arena the mapping table lives in.
    #[inline]
    #[must_use]
    pub const fn arena_id(&self) -> ArenaId {
        self.arena
    }

    /// Number of devices in the mapping table.
    #[inline]
    #[must_use]
    pub const fn device_count(&self) -> usize {
        self.device_count
    }

    fn slot(&self, arena: &StateArena, device_index: usize, back: bool) -> StateResult<usize> {
        let mapping = self.mapping.ok_or(StateError::NotAllocated)?;
        if arena.id() != self.arena {
            return Err(StateError::ForeignBuffer);
        }
        if device_index >= self.device_count {
            return Err(StateError::DeviceIndexOutOfRange {
                index: device_index,
                count: self.device_count,
            });
        }
        Ok(mapping + (device_index * 2 + usize::from(back)) * POINTER_SIZE)
    }

    fn get(&self, arena: &StateArena, device_index: usize, back: bool) -> StateResult<BufferPtr> {
        let slot = self.slot(arena, device_index, back)?;
        Ok(BufferPtr {
            arena: self.arena,
            offset: arena.read_word(slot)?,
        })
    }

    fn set(&self, arena: &mut StateArena, device_index: usize, back: bool, ptr: BufferPtr) -> StateResult<()> {
        if ptr.arena != self.arena {
            return Err(StateError::ForeignBuffer);
        }
        let slot = self.slot(arena, device_index, back)?;
        arena.write_word(slot, ptr.offset)
    }

    /// Current (front) buffer of a device.
    ///
    /// # Errors
    ///
    /// `NotAllocated` for an invalid handle, `ForeignBuffer` if `arena` is not
    /// the handle's arena, `DeviceIndexOutOfRange` for unknown devices.
    pub fn front_buffer(&self, arena: &StateArena, device_index: usize) -> StateResult<BufferPtr> {
        self.get(arena, device_index, false)
    }

    /// Previous (back) buffer of a device.
    ///
    /// # Errors
    ///
    /// Same as [`DoubleBuffers::front_buffer`].
    pub fn back_buffer(&self, arena: &StateArena, device_index: usize) -> StateResult<BufferPtr> {
        self.get(arena, device_index, true)
    }

    /// Points a device's front buffer at `ptr`.
    ///
    /// # Errors
    ///
    /// Same as [`DoubleBuffers::front_buffer`]; `ForeignBuffer` also if `ptr`
    /// belongs to another arena.
    pub fn set_front_buffer(&self, arena: &mut StateArena, device_index: usize, ptr: BufferPtr) -> StateResult<()> {
        self.set(arena, device_index, false, ptr)
    }

    /// Points a device's back buffer at `ptr`.
    ///
    /// # Errors
    ///
    /// Same as [`DoubleBuffers::set_front_buffer`].
    pub fn set_back_buffer(&self, arena: &mut StateArena, device_index: usize, ptr: BufferPtr) -> StateResult<()> {
        self.set(arena, device_index, true, ptr)
    }

    /// Exchanges the front and back buffer of one device.
    ///
    /// Does nothing on an invalid handle (the update mode is disabled).
    ///
    /// # Errors
    ///
    /// `ForeignBuffer` or `DeviceIndexOutOfRange` on a valid handle.
    pub fn swap_buffers(&self, arena: &mut StateArena, device_index: usize) -> StateResult<()> {
        if !self.is_valid() {
            return Ok(());
        }
        let front = self.front_buffer(arena, device_index)?;
        let back = self.back_buffer(arena, device_index)?;
        self.set_front_buffer(arena, device_index, back)?;
        self.set_back_buffer(arena, device_index, front)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(device_count: usize) -> (StateArena, DoubleBuffers) {
        let id = ArenaId::next();
        let mut arena = StateArena::new(id, 64 + device_count * 2 * POINTER_SIZE);
        let front = arena.carve(32).unwrap();
        let back = arena.carve(32).unwrap();
        let mapping = arena.carve(device_count * 2 * POINTER_SIZE).unwrap();
        let buffers = DoubleBuffers::new(id, mapping.start, device_count);
        for i in 0..device_count {
            let ptr = |start: usize| BufferPtr { arena: id, offset: start + i * 8 };
            buffers.set_front_buffer(&mut arena, i, ptr(front.start)).unwrap();
            buffers.set_back_buffer(&mut arena, i, ptr(back.start)).unwrap();
        }
        (arena, buffers)
    }

    #[test]
    fn test_swap_only_touches_one_device() {
        let (mut arena, buffers) = table(3);
        let before: Vec<_> = (0..3)
            .map(|i| (buffers.front_buffer(&arena, i).unwrap(), buffers.back_buffer(&arena, i).unwrap()))
            .collect();

        buffers.swap_buffers(&mut arena, 1).unwrap();

        assert_eq!(buffers.front_buffer(&arena, 1).unwrap(), before[1].1);
        assert_eq!(buffers.back_buffer(&arena, 1).unwrap(), before[1].0);
        for i in [0, 2] {
            assert_eq!(buffers.front_buffer(&arena, i).unwrap(), before[i].0);
            assert_eq!(buffers.back_buffer(&arena, i).unwrap(), before[i].1);
        }
    }

    #[test]
    fn test_copies_share_the_table() {
        let (mut arena, buffers) = table(1);
        let copy = buffers;
        let front = copy.front_buffer(&arena, 0).unwrap();
        buffers.swap_buffers(&mut arena, 0).unwrap();
        assert_eq!(copy.back_buffer(&arena, 0).unwrap(), front);
    }

    #[test]
    fn test_invalid_handle() {
        let (mut arena, _) = table(1);
        let invalid = DoubleBuffers::INVALID;
        assert!(!invalid.is_valid());
        assert!(invalid.swap_buffers(&mut arena, 0).is_ok());
        assert_eq!(invalid.front_buffer(&arena, 0), Err(StateError::NotAllocated));
    }

    #[test]
    fn test_bounds_and_foreign_arena() {
        let (arena, buffers) = table(2);
        assert_eq!(
            buffers.front_buffer(&arena, 2),
            Err(StateError::DeviceIndexOutOfRange { index: 2, count: 2 })
        );
        let (other, _) = table(2);
        assert_eq!(buffers.front_buffer(&other, 0), Err(StateError::ForeignBuffer));
    }
}
