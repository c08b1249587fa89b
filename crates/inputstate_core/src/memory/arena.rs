//! # State Arena
//!
//! The single allocation behind every state buffer. Regions are carved off the
//! front with a bump offset and handed out as byte ranges; the arena itself
//! never frees a region individually.

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{StateError, StateResult};

/// Alignment of the arena and of every carved region.
pub const ARENA_ALIGNMENT: usize = 4;

/// Size of one mapping-table word.
pub const POINTER_SIZE: usize = std::mem::size_of::<usize>();

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an arena.
///
/// Handles into an arena carry its id so that a handle can never be resolved
/// against a different (e.g. reallocated) arena.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ArenaId(u64);

impl ArenaId {
    /// The id no arena ever has.
    pub const NONE: Self = Self(0);

    /// Reserves a fresh id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns true for `ArenaId::NONE`.
    #[inline]
    #[must_use]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// Rounds `value` up to a multiple of `alignment` (a power of two).
#[inline]
#[must_use]
pub const fn align_to_multiple(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// A zeroed, 4-byte aligned bump-carved byte arena.
///
/// # Thread Safety
///
/// Not synchronized. Reads, writes, swaps and reallocation all happen on the
/// thread that owns the arena.
///
/// # Example
///
/// ```rust,ignore
/// let mut arena = StateArena::new(ArenaId::next(), 64);
/// let front = arena.carve(16)?;
/// arena.bytes_mut()[front].fill(0xAB);
/// ```
pub struct StateArena {
    /// Backing words; their alignment is what makes the arena 4-byte aligned.
    storage: Box<[u32]>,
    /// Bump offset in bytes.
    offset: usize,
    /// Capacity in bytes.
    capacity: usize,
    /// Identity of this allocation.
    id: ArenaId,
}

impl StateArena {
    /// Allocates a zeroed arena of at least `capacity` bytes.
    ///
    /// The capacity is rounded up to the arena alignment.
    #[must_use]
    pub fn new(id: ArenaId, capacity: usize) -> Self {
        let capacity = align_to_multiple(capacity, ARENA_ALIGNMENT);
        let storage = vec![0u32; capacity / ARENA_ALIGNMENT].into_boxed_slice();
        Self {
            storage,
            offset: 0,
            capacity,
            id,
        }
    }

    /// Returns the arena's identity.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ArenaId {
        self.id
    }

    /// Returns the total capacity in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the bytes carved so far.
    #[inline]
    #[must_use]
    pub const fn used(&self) -> usize {
        self.offset
    }

    /// Returns the bytes still available for carving.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.capacity - self.offset
    }

    /// Carves the next `len` bytes off the arena.
    ///
    /// The region starts 4-byte aligned.
    ///
    /// # Errors
    ///
    /// `OutOfBounds` if the arena does not have `len` bytes left.
    pub fn carve(&mut self, len: usize) -> StateResult<Range<usize>> {
        let start = align_to_multiple(self.offset, ARENA_ALIGNMENT);
        let end = start + len;
        if end > self.capacity {
            return Err(StateError::OutOfBounds {
                offset: start,
                len,
                size: self.capacity,
            });
        }
        self.offset = end;
        Ok(start..end)
    }

    /// Forgets every carved region and zeroes the memory.
    pub fn reset(&mut self) {
        self.storage.fill(0);
        self.offset = 0;
    }

    /// The whole arena as bytes.
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.storage)
    }

    /// The whole arena as mutable bytes.
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.storage)
    }

    /// Bounds-checked view of `len` bytes at `offset`.
    ///
    /// # Errors
    ///
    /// `OutOfBounds` if the range leaves the arena.
    #[inline]
    pub fn slice(&self, offset: usize, len: usize) -> StateResult<&[u8]> {
        let size = self.capacity;
        self.bytes()
            .get(offset..offset + len)
            .ok_or(StateError::OutOfBounds { offset, len, size })
    }

    /// Bounds-checked mutable view of `len` bytes at `offset`.
    ///
    /// # Errors
    ///
    /// `OutOfBounds` if the range leaves the arena.
    #[inline]
    pub fn slice_mut(&mut self, offset: usize, len: usize) -> StateResult<&mut [u8]> {
        let size = self.capacity;
        self.bytes_mut()
            .get_mut(offset..offset + len)
            .ok_or(StateError::OutOfBounds { offset, len, size })
    }

    /// Reads a pointer-sized word (a mapping-table entry) at `offset`.
    ///
    /// # Errors
    ///
    /// `OutOfBounds` if the word leaves the arena.
    #[inline]
    pub fn read_word(&self, offset: usize) -> StateResult<usize> {
        let mut word = [0u8; POINTER_SIZE];
        word.copy_from_slice(self.slice(offset, POINTER_SIZE)?);
        Ok(usize::from_ne_bytes(word))
    }

    /// Writes a pointer-sized word (a mapping-table entry) at `offset`.
    ///
    /// # Errors
    ///
    /// `OutOfBounds` if the word leaves the arena.
    #[inline]
    pub fn write_word(&mut self, offset: usize, value: usize) -> StateResult<()> {
        self.slice_mut(offset, POINTER_SIZE)?
            .copy_from_slice(&value.to_ne_bytes());
        Ok(())
    }

    /// Copies `len` bytes within the arena. The ranges may overlap.
    ///
    /// # Errors
    ///
    /// `OutOfBounds` if either range leaves the arena.
    pub fn copy_within(&mut self, src: usize, dst: usize, len: usize) -> StateResult<()> {
        self.slice(src, len)?;
        self.slice(dst, len)?;
        self.bytes_mut().copy_within(src..src + len, dst);
        Ok(())
    }
}

impl std::fmt::Debug for StateArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateArena")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("used", &self.offset)
            .finish()
    }
}
