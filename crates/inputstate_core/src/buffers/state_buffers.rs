//! # State Buffers
//!
//! One arena holding the state of every device for every enabled update mode.
//!
//! ## Layout
//!
//! ```text
//! [ dynamic front | dynamic back | dynamic mapping ]
//! [ fixed front   | fixed back   | fixed mapping   ]
//! [ manual front  | manual back  | manual mapping  ]
//! [ editor front  | editor back  | editor mapping  ]   (`editor` builds)
//! [ default state ]
//! [ noise mask    ]
//! ```
//!
//! Disabled modes take no space. Every front/back/single region is
//! `size_per_buffer` bytes and holds all devices back to back, each device
//! 4-byte aligned. Once offsets are installed a device's controls address a
//! full state image, so any region can be handed to a `StateBlock` as is.
//!
//! ## Lifecycle
//!
//! 1. `allocate_all` on a fresh instance computes the per-device offsets.
//! 2. `migrate_all` carries state over from the previous instance and bakes
//!    the new offsets into the devices.
//! 3. `free_all` on the previous instance releases it and clears any
//!    context handles that still point into it.

use tracing::{debug, info, warn};

use super::{BufferPtr, DoubleBuffers, StateContext};
use crate::device::InputDevice;
use crate::error::{StateError, StateResult};
use crate::memory::{align_to_multiple, ArenaId, StateArena, ARENA_ALIGNMENT, POINTER_SIZE};
use crate::update::{UpdateMask, UpdateMode};

/// Update modes owning a double buffer set, in arena order.
#[cfg(not(feature = "editor"))]
const BUFFERED_MODES: &[UpdateMode] = &[UpdateMode::Dynamic, UpdateMode::Fixed, UpdateMode::Manual];

/// Update modes owning a double buffer set, in arena order.
#[cfg(feature = "editor")]
const BUFFERED_MODES: &[UpdateMode] = &[
    UpdateMode::Dynamic,
    UpdateMode::Fixed,
    UpdateMode::Manual,
    UpdateMode::Editor,
];

/// Where one device lives inside a state image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceSlot {
    /// Offset of the device region from the start of the image.
    pub offset: u32,
    /// Region size in bytes, 4-byte aligned.
    pub size: u32,
    /// Layout fingerprint of the device when the slot was allocated.
    pub fingerprint: u64,
}

/// What `migrate_all` did per device.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// New indices of devices whose state was carried over.
    pub migrated: Vec<usize>,
    /// New indices of devices skipped because their layout changed.
    pub incompatible: Vec<usize>,
}

impl MigrationReport {
    /// True if the device at `index` kept its state.
    #[must_use]
    pub fn was_migrated(&self, index: usize) -> bool {
        self.migrated.contains(&index)
    }
}

/// All state memory for one device list.
pub struct StateBuffers {
    size_per_buffer: u32,
    total_size: u32,
    arena: Option<StateArena>,
    dynamic: DoubleBuffers,
    fixed: DoubleBuffers,
    manual: DoubleBuffers,
    #[cfg(feature = "editor")]
    editor: DoubleBuffers,
    default_state_buffer: Option<BufferPtr>,
    noise_mask_buffer: Option<BufferPtr>,
    slots: Vec<DeviceSlot>,
    validate_layouts: bool,
}

fn to_u32(value: usize) -> StateResult<u32> {
    u32::try_from(value).map_err(|_| StateError::OutOfBounds {
        offset: 0,
        len: value,
        size: u32::MAX as usize,
    })
}

fn copy_between(src: &StateArena, src_offset: usize, dst: &mut StateArena, dst_offset: usize, len: usize) -> StateResult<()> {
    dst.slice_mut(dst_offset, len)?
        .copy_from_slice(src.slice(src_offset, len)?);
    Ok(())
}

impl StateBuffers {
    /// Creates an empty, unallocated instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            size_per_buffer: 0,
            total_size: 0,
            arena: None,
            dynamic: DoubleBuffers::INVALID,
            fixed: DoubleBuffers::INVALID,
            manual: DoubleBuffers::INVALID,
            #[cfg(feature = "editor")]
            editor: DoubleBuffers::INVALID,
            default_state_buffer: None,
            noise_mask_buffer: None,
            slots: Vec::new(),
            validate_layouts: true,
        }
    }

    /// Enables or disables layout checks during migration.
    ///
    /// With checks on, a device whose layout fingerprint differs from the one
    /// recorded in the old buffers starts from zeroed state instead of
    /// inheriting bytes laid out for another shape.
    pub fn set_layout_validation(&mut self, enabled: bool) {
        self.validate_layouts = enabled;
    }

    /// Whether migration checks layouts.
    #[inline]
    #[must_use]
    pub const fn layout_validation(&self) -> bool {
        self.validate_layouts
    }

    /// Sum of all device sizes, 4-byte aligned.
    #[inline]
    #[must_use]
    pub const fn size_per_buffer(&self) -> u32 {
        self.size_per_buffer
    }

    /// Bytes of the whole arena including mapping tables.
    #[inline]
    #[must_use]
    pub const fn total_size(&self) -> u32 {
        self.total_size
    }

    /// True while an arena is held.
    #[inline]
    #[must_use]
    pub const fn is_allocated(&self) -> bool {
        self.arena.is_some()
    }

    /// Identity of the arena, `ArenaId::NONE` when unallocated.
    #[must_use]
    pub fn arena_id(&self) -> ArenaId {
        self.arena.as_ref().map_or(ArenaId::NONE, StateArena::id)
    }

    /// The arena.
    ///
    /// # Errors
    ///
    /// `NotAllocated` when nothing is allocated.
    pub fn arena(&self) -> StateResult<&StateArena> {
        self.arena.as_ref().ok_or(StateError::NotAllocated)
    }

    fn arena_mut(&mut self) -> StateResult<&mut StateArena> {
        self.arena.as_mut().ok_or(StateError::NotAllocated)
    }

    /// Number of devices the buffers were allocated for.
    #[inline]
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.slots.len()
    }

    /// Per-device placement, indexed by device index.
    #[inline]
    #[must_use]
    pub fn device_slots(&self) -> &[DeviceSlot] {
        &self.slots
    }

    /// Placement of one device.
    ///
    /// # Errors
    ///
    /// `DeviceIndexOutOfRange` for unknown devices.
    pub fn device_slot(&self, device_index: usize) -> StateResult<DeviceSlot> {
        self.slots
            .get(device_index)
            .copied()
            .ok_or(StateError::DeviceIndexOutOfRange {
                index: device_index,
                count: self.slots.len(),
            })
    }

    /// Start of the default-state image.
    #[inline]
    #[must_use]
    pub const fn default_state_buffer(&self) -> Option<BufferPtr> {
        self.default_state_buffer
    }

    /// Start of the noise-mask image.
    #[inline]
    #[must_use]
    pub const fn noise_mask_buffer(&self) -> Option<BufferPtr> {
        self.noise_mask_buffer
    }

    fn own_buffers(&self, mode: UpdateMode) -> Option<DoubleBuffers> {
        match mode {
            UpdateMode::Dynamic => Some(self.dynamic),
            UpdateMode::Fixed => Some(self.fixed),
            UpdateMode::Manual => Some(self.manual),
            #[cfg(feature = "editor")]
            UpdateMode::Editor => Some(self.editor),
            _ => None,
        }
    }

    fn own_buffers_mut(&mut self, mode: UpdateMode) -> Option<&mut DoubleBuffers> {
        match mode {
            UpdateMode::Dynamic => Some(&mut self.dynamic),
            UpdateMode::Fixed => Some(&mut self.fixed),
            UpdateMode::Manual => Some(&mut self.manual),
            #[cfg(feature = "editor")]
            UpdateMode::Editor => Some(&mut self.editor),
            _ => None,
        }
    }

    fn clear(&mut self) {
        self.size_per_buffer = 0;
        self.total_size = 0;
        self.arena = None;
        self.dynamic = DoubleBuffers::INVALID;
        self.fixed = DoubleBuffers::INVALID;
        self.manual = DoubleBuffers::INVALID;
        #[cfg(feature = "editor")]
        {
            self.editor = DoubleBuffers::INVALID;
        }
        self.default_state_buffer = None;
        self.noise_mask_buffer = None;
        self.slots.clear();
    }

    /// Allocates state memory for `devices` and the modes in `update_mask`.
    ///
    /// Returns each device's offset within a state image. Devices are packed
    /// in list order, each rounded up to 4 bytes. With no devices nothing is
    /// allocated and the result is empty. Any earlier allocation held by
    /// this instance is dropped.
    ///
    /// # Errors
    ///
    /// `ZeroSizeDevice` if a device has no state.
    pub fn allocate_all(&mut self, update_mask: UpdateMask, devices: &[InputDevice]) -> StateResult<Vec<u32>> {
        self.clear();

        let mut offsets = Vec::with_capacity(devices.len());
        let mut size_per_buffer = 0usize;
        for (index, device) in devices.iter().enumerate() {
            let size = align_to_multiple(device.state_size_in_bytes() as usize, ARENA_ALIGNMENT);
            if size == 0 {
                self.clear();
                return Err(StateError::ZeroSizeDevice {
                    name: device.name.clone(),
                    index,
                });
            }
            let offset = to_u32(size_per_buffer)?;
            offsets.push(offset);
            self.slots.push(DeviceSlot {
                offset,
                size: to_u32(size)?,
                fingerprint: device.layout_fingerprint(),
            });
            size_per_buffer += size;
        }

        if size_per_buffer == 0 {
            debug!("no devices, state buffers left unallocated");
            return Ok(offsets);
        }

        if update_mask.contains(UpdateMode::Editor) && !BUFFERED_MODES.contains(&UpdateMode::Editor) {
            debug!("editor updates requested without editor support, skipping editor buffers");
        }

        let modes: Vec<UpdateMode> = BUFFERED_MODES
            .iter()
            .copied()
            .filter(|mode| update_mask.contains(*mode))
            .collect();
        let mapping_table_size = devices.len() * 2 * POINTER_SIZE;
        let total = modes.len() * (size_per_buffer * 2 + mapping_table_size) + size_per_buffer * 2;

        let mut arena = StateArena::new(ArenaId::next(), total);
        let id = arena.id();
        for &mode in &modes {
            let front = arena.carve(size_per_buffer)?;
            let back = arena.carve(size_per_buffer)?;
            let mapping = arena.carve(mapping_table_size)?;
            let buffers = DoubleBuffers::new(id, mapping.start, devices.len());
            for (index, slot) in self.slots.iter().enumerate() {
                let offset = slot.offset as usize;
                buffers.set_front_buffer(&mut arena, index, BufferPtr { arena: id, offset: front.start + offset })?;
                buffers.set_back_buffer(&mut arena, index, BufferPtr { arena: id, offset: back.start + offset })?;
            }
            if let Some(target) = self.own_buffers_mut(mode) {
                *target = buffers;
            }
        }

        let default_state = arena.carve(size_per_buffer)?;
        let noise_mask = arena.carve(size_per_buffer)?;
        self.default_state_buffer = Some(BufferPtr { arena: id, offset: default_state.start });
        self.noise_mask_buffer = Some(BufferPtr { arena: id, offset: noise_mask.start });

        self.size_per_buffer = to_u32(size_per_buffer)?;
        self.total_size = to_u32(total)?;
        self.arena = Some(arena);

        info!(
            devices = devices.len(),
            modes = ?modes,
            size_per_buffer,
            total,
            "allocated state buffers"
        );
        Ok(offsets)
    }

    /// Carries state from `old` into these buffers and installs `new_offsets`
    /// into `devices`.
    ///
    /// `old_device_indices[i]` is the index device `i` had in `old`; `None`
    /// means indices did not change. Devices without an installed offset
    /// are new and receive no bytes. Every device ends up with
    /// `device_index` equal to its position and its state block rebased to
    /// its new offset.
    ///
    /// # Errors
    ///
    /// `OffsetTableMismatch` if `new_offsets` does not match `devices`,
    /// `DeviceIndexOutOfRange` if an old index is unknown to `old`.
    pub fn migrate_all(
        &mut self,
        devices: &mut [InputDevice],
        new_offsets: &[u32],
        old: &StateBuffers,
        old_device_indices: Option<&[usize]>,
    ) -> StateResult<MigrationReport> {
        if new_offsets.len() != devices.len() {
            return Err(StateError::OffsetTableMismatch {
                expected: devices.len(),
                actual: new_offsets.len(),
            });
        }

        let mut report = MigrationReport::default();
        let pairs: Vec<(DoubleBuffers, DoubleBuffers)> = BUFFERED_MODES
            .iter()
            .filter_map(|&mode| Some((self.own_buffers(mode)?, old.own_buffers(mode)?)))
            .filter(|(new, old)| new.is_valid() && old.is_valid())
            .collect();
        let singles: Vec<(BufferPtr, BufferPtr)> = [
            (self.default_state_buffer, old.default_state_buffer),
            (self.noise_mask_buffer, old.noise_mask_buffer),
        ]
        .into_iter()
        .filter_map(|(new, old)| Some((new?, old?)))
        .collect();
        let validate = self.validate_layouts;

        if let (Some(arena), Some(old_arena)) = (self.arena.as_mut(), old.arena.as_ref()) {
            let count = old_device_indices.map_or(devices.len(), |indices| indices.len().min(devices.len()));
            for new_index in 0..count {
                let device = &devices[new_index];
                if device.state_block.has_invalid_offset() {
                    continue;
                }

                let old_index = old_device_indices.map_or(new_index, |indices| indices[new_index]);
                let old_slot = old.device_slot(old_index)?;
                if validate && old_slot.fingerprint != device.layout_fingerprint() {
                    warn!(
                        device = %device.name,
                        old_index,
                        new_index,
                        "device layout changed, state not migrated"
                    );
                    report.incompatible.push(new_index);
                    continue;
                }

                let len = device.state_size_in_bytes() as usize;
                for (new_buffers, old_buffers) in &pairs {
                    let src = old_buffers.front_buffer(old_arena, old_index)?;
                    let dst = new_buffers.front_buffer(arena, new_index)?;
                    copy_between(old_arena, src.offset, arena, dst.offset, len)?;

                    let src = old_buffers.back_buffer(old_arena, old_index)?;
                    let dst = new_buffers.back_buffer(arena, new_index)?;
                    copy_between(old_arena, src.offset, arena, dst.offset, len)?;
                }

                let old_offset = device.state_block.byte_offset as usize;
                let new_offset = new_offsets[new_index] as usize;
                for (new_base, old_base) in &singles {
                    copy_between(old_arena, old_base.offset + old_offset, arena, new_base.offset + new_offset, len)?;
                }

                report.migrated.push(new_index);
            }
        }

        for (index, (device, &new_offset)) in devices.iter_mut().zip(new_offsets).enumerate() {
            device.device_index = index;
            if device.state_block.has_invalid_offset() {
                device.state_block.byte_offset = 0;
                if new_offset != 0 {
                    device.bake_offset_into_state_block_recursive(new_offset);
                }
            } else {
                let delta = new_offset.wrapping_sub(device.state_block.byte_offset);
                if delta != 0 {
                    device.bake_offset_into_state_block_recursive(delta);
                }
            }
        }

        debug!(
            devices = devices.len(),
            migrated = report.migrated.len(),
            incompatible = report.incompatible.len(),
            "migrated device state"
        );
        Ok(report)
    }

    /// Releases the arena and clears handles in `context` that point into it.
    ///
    /// Calling it on freed or never-allocated buffers does nothing.
    pub fn free_all(&mut self, context: &mut StateContext) {
        if let Some(arena) = self.arena.take() {
            context.release(arena.id());
            debug!(arena = ?arena.id(), bytes = self.total_size, "freed state buffers");
        }
        self.clear();
    }

    /// The double buffer set serving `mode`.
    ///
    /// Disabled modes yield an invalid handle. Before-render shares the
    /// dynamic set, or the fixed set when dynamic updates are disabled.
    ///
    /// # Errors
    ///
    /// `UnsupportedUpdateMode` for modes without buffers in this build.
    pub fn get_double_buffers_for(&self, mode: UpdateMode) -> StateResult<DoubleBuffers> {
        if mode == UpdateMode::BeforeRender {
            return Ok(if self.dynamic.is_valid() { self.dynamic } else { self.fixed });
        }
        self.own_buffers(mode).ok_or(StateError::UnsupportedUpdateMode(mode))
    }

    /// Current state of a device in `mode`.
    ///
    /// # Errors
    ///
    /// Mode, allocation, or device index errors.
    pub fn front_buffer(&self, mode: UpdateMode, device_index: usize) -> StateResult<BufferPtr> {
        self.get_double_buffers_for(mode)?
            .front_buffer(self.arena()?, device_index)
    }

    /// Previous state of a device in `mode`.
    ///
    /// # Errors
    ///
    /// Mode, allocation, or device index errors.
    pub fn back_buffer(&self, mode: UpdateMode, device_index: usize) -> StateResult<BufferPtr> {
        self.get_double_buffers_for(mode)?
            .back_buffer(self.arena()?, device_index)
    }

    /// Flips front and back of one device in `mode`. A disabled mode is left
    /// alone.
    ///
    /// # Errors
    ///
    /// Mode or device index errors.
    pub fn swap_buffers(&mut self, mode: UpdateMode, device_index: usize) -> StateResult<()> {
        let buffers = self.get_double_buffers_for(mode)?;
        if !buffers.is_valid() {
            return Ok(());
        }
        buffers.swap_buffers(self.arena_mut()?, device_index)
    }

    /// Pointer to a device's region inside a single buffer such as the
    /// default state.
    ///
    /// # Errors
    ///
    /// `DeviceIndexOutOfRange` for unknown devices.
    pub fn device_ptr(&self, image: BufferPtr, device_index: usize) -> StateResult<BufferPtr> {
        Ok(image.add(self.device_slot(device_index)?.offset as usize))
    }

    fn checked(&self, ptr: BufferPtr) -> StateResult<&StateArena> {
        let arena = self.arena()?;
        if ptr.arena != arena.id() {
            return Err(StateError::ForeignBuffer);
        }
        Ok(arena)
    }

    fn checked_mut(&mut self, ptr: BufferPtr) -> StateResult<&mut StateArena> {
        let arena = self.arena_mut()?;
        if ptr.arena != arena.id() {
            return Err(StateError::ForeignBuffer);
        }
        Ok(arena)
    }

    fn image_start(&self, ptr: BufferPtr, device_index: usize) -> StateResult<usize> {
        let slot = self.device_slot(device_index)?;
        ptr.offset
            .checked_sub(slot.offset as usize)
            .ok_or(StateError::OutOfBounds {
                offset: ptr.offset,
                len: self.size_per_buffer as usize,
                size: self.total_size as usize,
            })
    }

    /// The bytes of a device at `ptr`.
    ///
    /// # Errors
    ///
    /// `ForeignBuffer` for pointers into another arena, or index and bounds
    /// errors.
    pub fn device_state(&self, ptr: BufferPtr, device_index: usize) -> StateResult<&[u8]> {
        let len = self.device_slot(device_index)?.size as usize;
        self.checked(ptr)?.slice(ptr.offset, len)
    }

    /// The mutable bytes of a device at `ptr`.
    ///
    /// # Errors
    ///
    /// Same as [`StateBuffers::device_state`].
    pub fn device_state_mut(&mut self, ptr: BufferPtr, device_index: usize) -> StateResult<&mut [u8]> {
        let len = self.device_slot(device_index)?.size as usize;
        self.checked_mut(ptr)?.slice_mut(ptr.offset, len)
    }

    /// The whole state image containing a device's region at `ptr`.
    ///
    /// Installed control blocks address this image directly.
    ///
    /// # Errors
    ///
    /// Same as [`StateBuffers::device_state`].
    pub fn state_image(&self, ptr: BufferPtr, device_index: usize) -> StateResult<&[u8]> {
        let start = self.image_start(ptr, device_index)?;
        self.checked(ptr)?.slice(start, self.size_per_buffer as usize)
    }

    /// Mutable form of [`StateBuffers::state_image`].
    ///
    /// # Errors
    ///
    /// Same as [`StateBuffers::device_state`].
    pub fn state_image_mut(&mut self, ptr: BufferPtr, device_index: usize) -> StateResult<&mut [u8]> {
        let start = self.image_start(ptr, device_index)?;
        let len = self.size_per_buffer as usize;
        self.checked_mut(ptr)?.slice_mut(start, len)
    }

    /// A whole single buffer (default state or noise mask).
    ///
    /// # Errors
    ///
    /// `ForeignBuffer` or bounds errors.
    pub fn single_buffer(&self, image: BufferPtr) -> StateResult<&[u8]> {
        self.checked(image)?.slice(image.offset, self.size_per_buffer as usize)
    }

    /// Mutable form of [`StateBuffers::single_buffer`].
    ///
    /// # Errors
    ///
    /// `ForeignBuffer` or bounds errors.
    pub fn single_buffer_mut(&mut self, image: BufferPtr) -> StateResult<&mut [u8]> {
        let len = self.size_per_buffer as usize;
        self.checked_mut(image)?.slice_mut(image.offset, len)
    }

    /// Copies one device's region from `src` to `dst`.
    ///
    /// # Errors
    ///
    /// `ForeignBuffer`, index or bounds errors.
    pub fn copy_device_state(&mut self, device_index: usize, src: BufferPtr, dst: BufferPtr) -> StateResult<()> {
        let len = self.device_slot(device_index)?.size as usize;
        self.checked(src)?;
        self.checked_mut(dst)?.copy_within(src.offset, dst.offset, len)
    }
}

impl Default for StateBuffers {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StateBuffers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateBuffers")
            .field("arena", &self.arena)
            .field("size_per_buffer", &self.size_per_buffer)
            .field("total_size", &self.total_size)
            .field("devices", &self.slots.len())
            .finish_non_exhaustive()
    }
}
