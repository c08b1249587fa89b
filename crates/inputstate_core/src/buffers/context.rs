//! # State Context
//!
//! The "currently installed" buffers that control reads resolve against.
//! Owned by whoever drives updates and passed explicitly; there is no
//! process-wide instance.

use super::{BufferPtr, DoubleBuffers, StateBuffers};
use crate::error::StateResult;
use crate::memory::ArenaId;
use crate::update::UpdateMode;

/// Handles to the active double buffer set and the shared single buffers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StateContext {
    current: DoubleBuffers,
    current_mode: Option<UpdateMode>,
    default_state_buffer: Option<BufferPtr>,
    noise_mask_buffer: Option<BufferPtr>,
}

impl StateContext {
    /// A context with nothing installed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `mode`'s double buffers of `buffers` current.
    ///
    /// # Errors
    ///
    /// `UnsupportedUpdateMode` for modes without buffers in this build.
    pub fn switch_to(&mut self, buffers: &StateBuffers, mode: UpdateMode) -> StateResult<()> {
        self.current = buffers.get_double_buffers_for(mode)?;
        self.current_mode = Some(mode);
        Ok(())
    }

    /// Installs freshly allocated buffers: switches to `mode` and takes the
    /// default-state and noise-mask images.
    ///
    /// # Errors
    ///
    /// Same as [`StateContext::switch_to`].
    pub fn install(&mut self, buffers: &StateBuffers, mode: UpdateMode) -> StateResult<()> {
        self.switch_to(buffers, mode)?;
        self.default_state_buffer = buffers.default_state_buffer();
        self.noise_mask_buffer = buffers.noise_mask_buffer();
        Ok(())
    }

    /// The active double buffer set.
    #[inline]
    #[must_use]
    pub const fn current(&self) -> DoubleBuffers {
        self.current
    }

    /// The mode last switched to.
    #[inline]
    #[must_use]
    pub const fn current_mode(&self) -> Option<UpdateMode> {
        self.current_mode
    }

    /// Start of the installed default-state image.
    #[inline]
    #[must_use]
    pub const fn default_state_buffer(&self) -> Option<BufferPtr> {
        self.default_state_buffer
    }

    /// Start of the installed noise-mask image.
    #[inline]
    #[must_use]
    pub const fn noise_mask_buffer(&self) -> Option<BufferPtr> {
        self.noise_mask_buffer
    }

    /// Current state of a device under the active mode.
    ///
    /// # Errors
    ///
    /// `NotAllocated` if nothing is installed, `ForeignBuffer` if `buffers`
    /// is not the installed instance, `DeviceIndexOutOfRange` otherwise.
    pub fn front_buffer_for_device(&self, buffers: &StateBuffers, device_index: usize) -> StateResult<BufferPtr> {
        self.current.front_buffer(buffers.arena()?, device_index)
    }

    /// Previous state of a device under the active mode.
    ///
    /// # Errors
    ///
    /// Same as [`StateContext::front_buffer_for_device`].
    pub fn back_buffer_for_device(&self, buffers: &StateBuffers, device_index: usize) -> StateResult<BufferPtr> {
        self.current.back_buffer(buffers.arena()?, device_index)
    }

    /// Drops every handle into `arena`. Handles into other arenas stay.
    pub fn release(&mut self, arena: ArenaId) {
        if arena.is_none() {
            return;
        }
        if self.current.arena_id() == arena {
            self.current = DoubleBuffers::INVALID;
            self.current_mode = None;
        }
        if self.default_state_buffer.is_some_and(|ptr| ptr.arena == arena) {
            self.default_state_buffer = None;
        }
        if self.noise_mask_buffer.is_some_and(|ptr| ptr.arena == arena) {
            self.noise_mask_buffer = None;
        }
    }
}
