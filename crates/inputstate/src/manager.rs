//! # State Manager
//!
//! Owns the device list and the state buffers behind it.
//!
//! ## Update cycle
//!
//! ```text
//! begin_update(mode) ──> apply_state_event(..)* ──> read_control_*(..)
//!        │                      │
//!        │                      └─ flips the device's buffers at most once per
//!        │                         update, then writes the event into the
//!        │                         front buffer of every play-mode set
//!        └─ advances the update counter and switches the context
//! ```
//!
//! Any change to the device list or the update mask reallocates the buffers
//! and migrates every surviving device's state.

use tracing::{debug, info, trace};

use inputstate_core::bits::write_single_bit;
use inputstate_core::{
    BufferPtr, InputDevice, MigrationReport, StateBlock, StateBuffers, StateContext, StateError,
    StateResult, UpdateMask, UpdateMode,
};

use crate::config::StateConfig;
use crate::error::{ManagerError, ManagerResult};

/// Update counts a device has flipped its buffers for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct DeviceUpdateCounts {
    dynamic: u32,
    fixed: u32,
    manual: u32,
}

impl DeviceUpdateCounts {
    fn get(&self, mode: UpdateMode) -> Option<u32> {
        match mode {
            UpdateMode::Dynamic => Some(self.dynamic),
            UpdateMode::Fixed => Some(self.fixed),
            UpdateMode::Manual => Some(self.manual),
            _ => None,
        }
    }

    fn get_mut(&mut self, mode: UpdateMode) -> Option<&mut u32> {
        match mode {
            UpdateMode::Dynamic => Some(&mut self.dynamic),
            UpdateMode::Fixed => Some(&mut self.fixed),
            UpdateMode::Manual => Some(&mut self.manual),
            _ => None,
        }
    }
}

/// Modes whose buffers are flipped per update count, in flip order.
const COUNTED_MODES: [UpdateMode; 3] = [UpdateMode::Fixed, UpdateMode::Dynamic, UpdateMode::Manual];

/// Moves a device back to device-local offsets.
fn uninstall(device: &mut InputDevice) {
    if device.is_installed() {
        let base = device.state_block.byte_offset;
        device.bake_offset_into_state_block_recursive(base.wrapping_neg());
        device.state_block.byte_offset = StateBlock::INVALID_OFFSET;
    }
    device.device_index = usize::MAX;
}

fn has_valid_buffers(buffers: &StateBuffers, mode: UpdateMode) -> bool {
    mode.has_own_buffers()
        && buffers
            .get_double_buffers_for(mode)
            .is_ok_and(|buffers| buffers.is_valid())
}

/// Writes every control default into `image`.
fn write_control_defaults(device: &InputDevice, image: &mut [u8]) -> StateResult<()> {
    for control in device.controls() {
        if let Some(value) = control.default_value {
            control.state_block.write_float(image, value)?;
        }
    }
    Ok(())
}

/// Sets the mask bits covered by noisy controls.
fn write_noise_bits(device: &InputDevice, mask: &mut [u8]) -> StateResult<()> {
    for control in device.controls().filter(|control| control.noisy) {
        let block = &control.state_block;
        let overflow = || StateError::LayoutOverflow {
            control: control.name.clone(),
        };
        let first = block
            .byte_offset
            .checked_mul(8)
            .and_then(|bit| bit.checked_add(block.bit_offset))
            .ok_or_else(overflow)?;
        let end = first.checked_add(block.size_in_bits.max(1)).ok_or_else(overflow)?;
        for bit in first..end {
            write_single_bit(mask, bit, true)?;
        }
    }
    Ok(())
}

/// Dry-runs a device's defaults and noise bits against a scratch image of
/// its own size, so a device that cannot be initialised is rejected before
/// any buffers change.
fn check_initial_state(device: &InputDevice) -> StateResult<()> {
    let mut scratch = vec![0u8; device.state_size_in_bytes() as usize];
    write_control_defaults(device, &mut scratch)?;
    write_noise_bits(device, &mut scratch)
}

/// Writes a device's control defaults and noise bits into the single
/// buffers.
fn write_defaults_and_noise(buffers: &mut StateBuffers, device: &InputDevice) -> StateResult<()> {
    let (Some(default_state), Some(noise_mask)) = (buffers.default_state_buffer(), buffers.noise_mask_buffer())
    else {
        return Ok(());
    };
    write_control_defaults(device, buffers.single_buffer_mut(default_state)?)?;
    write_noise_bits(device, buffers.single_buffer_mut(noise_mask)?)
}

/// Copies a device's default state into the front (and back) buffer of
/// every update mode.
fn copy_default_state(buffers: &mut StateBuffers, index: usize, include_back: bool) -> StateResult<()> {
    let Some(default_state) = buffers.default_state_buffer() else {
        return Ok(());
    };
    let src = buffers.device_ptr(default_state, index)?;
    for mode in UpdateMode::ALL {
        if !has_valid_buffers(buffers, mode) {
            continue;
        }
        let front = buffers.front_buffer(mode, index)?;
        buffers.copy_device_state(index, src, front)?;
        if include_back {
            let back = buffers.back_buffer(mode, index)?;
            buffers.copy_device_state(index, src, back)?;
        }
    }
    Ok(())
}

/// Fills the buffers of modes that `new` has and `old` lacked with each
/// migrated device's current state, in both front and back.
fn seed_enabled_modes(
    new: &mut StateBuffers,
    old: &StateBuffers,
    report: &MigrationReport,
    old_device_indices: Option<&[usize]>,
) -> StateResult<()> {
    let enabled: Vec<UpdateMode> = UpdateMode::ALL
        .into_iter()
        .filter(|&mode| has_valid_buffers(new, mode) && !has_valid_buffers(old, mode))
        .collect();
    let Some(source) = UpdateMode::ALL.into_iter().find(|&mode| has_valid_buffers(old, mode)) else {
        return Ok(());
    };
    if enabled.is_empty() {
        return Ok(());
    }

    for &index in &report.migrated {
        let old_index = old_device_indices.map_or(index, |indices| indices[index]);
        let state = old.device_state(old.front_buffer(source, old_index)?, old_index)?;
        for &mode in &enabled {
            for dst in [new.front_buffer(mode, index)?, new.back_buffer(mode, index)?] {
                let dst = new.device_state_mut(dst, index)?;
                let len = state.len().min(dst.len());
                dst[..len].copy_from_slice(&state[..len]);
            }
        }
    }
    debug!(modes = ?enabled, ?source, devices = report.migrated.len(), "seeded newly enabled modes");
    Ok(())
}

/// Device registry plus the double-buffered state of every device.
///
/// # Example
///
/// ```rust,ignore
/// let mut manager = StateManager::new(StateConfig::default());
/// let pad = manager.add_device(gamepad())?;
///
/// manager.begin_update(UpdateMode::Dynamic)?;
/// manager.apply_state_event(pad, 2, &[255])?;
/// let trigger = manager.read_control_float(pad, "trigger")?;
/// ```
#[derive(Debug)]
pub struct StateManager {
    config: StateConfig,
    devices: Vec<InputDevice>,
    counts: Vec<DeviceUpdateCounts>,
    buffers: StateBuffers,
    context: StateContext,
    update_mask: UpdateMask,
    last_update: Option<UpdateMode>,
    update_counts: DeviceUpdateCounts,
    playing: bool,
}

impl StateManager {
    /// Creates a manager with no devices.
    #[must_use]
    pub fn new(config: StateConfig) -> Self {
        let mut buffers = StateBuffers::new();
        buffers.set_layout_validation(config.validate_migration_layouts);
        Self {
            devices: Vec::with_capacity(config.initial_device_capacity),
            counts: Vec::with_capacity(config.initial_device_capacity),
            update_mask: config.update_modes,
            config,
            buffers,
            context: StateContext::new(),
            last_update: None,
            update_counts: DeviceUpdateCounts::default(),
            playing: true,
        }
    }

    /// The configuration the manager was created with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    /// Registered devices, indexed by device index.
    #[inline]
    #[must_use]
    pub fn devices(&self) -> &[InputDevice] {
        &self.devices
    }

    /// The device at `index`.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` for unknown indices.
    pub fn device(&self, index: usize) -> ManagerResult<&InputDevice> {
        self.devices.get(index).ok_or(ManagerError::DeviceNotFound {
            index,
            count: self.devices.len(),
        })
    }

    /// Finds a device by name.
    #[must_use]
    pub fn find_device(&self, name: &str) -> Option<usize> {
        self.devices.iter().position(|device| device.name == name)
    }

    /// The current state buffers.
    #[inline]
    #[must_use]
    pub fn buffers(&self) -> &StateBuffers {
        &self.buffers
    }

    /// The buffers reads currently resolve against.
    #[inline]
    #[must_use]
    pub fn context(&self) -> &StateContext {
        &self.context
    }

    /// Update modes that own buffers.
    #[inline]
    #[must_use]
    pub fn update_mask(&self) -> UpdateMask {
        self.update_mask
    }

    /// The mode of the update in progress.
    #[inline]
    #[must_use]
    pub fn current_update(&self) -> Option<UpdateMode> {
        self.last_update
    }

    /// Number of updates of `mode` begun so far. Only counted modes have one.
    #[must_use]
    pub fn update_count(&self, mode: UpdateMode) -> Option<u32> {
        self.update_counts.get(mode)
    }

    /// Whether the game is playing with focus. While not playing, editor
    /// updates own the events.
    #[inline]
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Sets whether the game is playing with focus.
    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    fn check_index(&self, index: usize) -> ManagerResult<()> {
        self.device(index).map(|_| ())
    }

    /// Registers a device and gives it state in every buffer.
    ///
    /// The device starts from its default state. Returns its device index.
    ///
    /// # Errors
    ///
    /// Errors from writing the device's defaults or noise bits, or allocation
    /// errors such as `ZeroSizeDevice`. The device is not added then and the
    /// existing buffers stay as they were.
    pub fn add_device(&mut self, mut device: InputDevice) -> ManagerResult<usize> {
        uninstall(&mut device);
        check_initial_state(&device)?;
        let name = device.name.clone();
        self.devices.push(device);
        self.counts.push(DeviceUpdateCounts::default());

        if let Err(err) = self.reallocate(None) {
            self.devices.pop();
            self.counts.pop();
            return Err(err);
        }

        let index = self.devices.len() - 1;
        info!(device = %name, index, total_size = self.buffers.total_size(), "added device");
        Ok(index)
    }

    /// Unregisters a device and returns it with device-local offsets.
    ///
    /// Devices after it move down one index and keep their state.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` for unknown indices, or reallocation errors.
    pub fn remove_device(&mut self, index: usize) -> ManagerResult<InputDevice> {
        self.check_index(index)?;
        let mut device = self.devices.remove(index);
        self.counts.remove(index);

        if self.devices.is_empty() {
            self.buffers.free_all(&mut self.context);
        } else {
            let old_device_indices: Vec<usize> = self.devices.iter().map(|d| d.device_index).collect();
            self.reallocate(Some(&old_device_indices))?;
        }

        uninstall(&mut device);
        info!(device = %device.name, index, remaining = self.devices.len(), "removed device");
        Ok(device)
    }

    /// Changes the update modes that own buffers and reallocates.
    ///
    /// # Errors
    ///
    /// Reallocation errors.
    pub fn set_update_mask(&mut self, mask: UpdateMask) -> ManagerResult<()> {
        if mask == self.update_mask {
            return Ok(());
        }
        self.update_mask = mask;
        if !self.devices.is_empty() {
            self.reallocate(None)?;
        }
        Ok(())
    }

    /// Allocates new buffers, migrates and initialises device state in them,
    /// then installs them in place of the current ones.
    fn reallocate(&mut self, old_device_indices: Option<&[usize]>) -> ManagerResult<()> {
        let mut buffers = StateBuffers::new();
        buffers.set_layout_validation(self.config.validate_migration_layouts);
        let offsets = buffers.allocate_all(self.update_mask, &self.devices)?;
        let report = buffers.migrate_all(&mut self.devices, &offsets, &self.buffers, old_device_indices)?;
        seed_enabled_modes(&mut buffers, &self.buffers, &report, old_device_indices)?;

        for (index, device) in self.devices.iter().enumerate() {
            if report.was_migrated(index) {
                continue;
            }
            write_defaults_and_noise(&mut buffers, device)?;
            copy_default_state(&mut buffers, index, true)?;
        }

        let mut old = std::mem::replace(&mut self.buffers, buffers);
        old.free_all(&mut self.context);

        let mode = self
            .last_update
            .filter(|&mode| self.buffers.get_double_buffers_for(mode).is_ok())
            .unwrap_or(UpdateMode::Dynamic);
        self.context.install(&self.buffers, mode)?;

        debug!(
            devices = self.devices.len(),
            size_per_buffer = self.buffers.size_per_buffer(),
            "reallocated state buffers"
        );
        Ok(())
    }

    /// True when events go exclusively to the editor buffers.
    fn editor_owns_events(&self, update: UpdateMode) -> bool {
        cfg!(feature = "editor") && update == UpdateMode::Editor && !self.playing
    }

    /// Starts an update: advances its counter and makes its buffers current.
    ///
    /// # Errors
    ///
    /// `UnsupportedUpdateMode` for modes without buffers in this build.
    pub fn begin_update(&mut self, mode: UpdateMode) -> ManagerResult<()> {
        self.buffers.get_double_buffers_for(mode)?;
        if let Some(count) = self.update_counts.get_mut(mode) {
            *count = count.wrapping_add(1);
        }
        self.last_update = Some(mode);
        if self.buffers.is_allocated() {
            self.context.switch_to(&self.buffers, mode)?;
        }
        trace!(?mode, "begin update");
        Ok(())
    }

    /// Flips a device's buffers for an event arriving during `update`.
    ///
    /// - Before-render never flips; events land in the current front buffer.
    /// - Editor updates while not playing flip the editor buffers on every
    ///   event.
    /// - Otherwise each counted mode flips at most once per update: the mode
    ///   being updated flips for the current count, every other mode flips
    ///   once for its upcoming update.
    ///
    /// Returns the modes whose buffers were flipped.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` or buffer errors.
    pub fn flip_buffers_for_device_if_necessary(
        &mut self,
        index: usize,
        update: UpdateMode,
    ) -> ManagerResult<UpdateMask> {
        self.check_index(index)?;
        if update == UpdateMode::BeforeRender {
            return Ok(UpdateMask::NONE);
        }
        if self.editor_owns_events(update) {
            self.buffers.swap_buffers(UpdateMode::Editor, index)?;
            trace!(index, "flipped editor buffers");
            return Ok(UpdateMask::EDITOR);
        }

        let mut flipped = UpdateMask::NONE;
        for mode in COUNTED_MODES {
            if !has_valid_buffers(&self.buffers, mode) {
                continue;
            }
            let Some(current) = self.update_counts.get(mode) else {
                continue;
            };
            let target = if mode == update { current } else { current.wrapping_add(1) };
            let Some(device_count) = self.counts[index].get_mut(mode) else {
                continue;
            };
            if *device_count != target {
                *device_count = target;
                self.buffers.swap_buffers(mode, index)?;
                trace!(index, ?mode, count = target, "flipped buffers");
                flipped = flipped.with(mode);
            }
        }
        Ok(flipped)
    }

    /// Writes a state event into a device's state.
    ///
    /// `bytes` land at `offset` within the device's state. An event covering
    /// less than the whole state is a delta: in every mode whose buffers this
    /// event flipped, the rest of the device's state is first carried forward
    /// from the previous buffer. Play-mode events go to the front buffer of
    /// every enabled play mode so that each mode sees the latest state.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound`, `EventOutOfRange` or buffer errors.
    pub fn apply_state_event(&mut self, index: usize, offset: u32, bytes: &[u8]) -> ManagerResult<()> {
        let device = self.device(index)?;
        let size = device.state_size_in_bytes();
        let start = offset as usize;
        if start + bytes.len() > size as usize {
            return Err(ManagerError::EventOutOfRange {
                device: device.name.clone(),
                offset,
                len: bytes.len(),
                size,
            });
        }
        let is_delta = offset != 0 || bytes.len() != size as usize;

        let update = self.last_update.unwrap_or(UpdateMode::Dynamic);
        let flipped = self.flip_buffers_for_device_if_necessary(index, update)?;
        let editor_only = self.editor_owns_events(update);

        for mode in UpdateMode::ALL {
            if (mode == UpdateMode::Editor) != editor_only || !has_valid_buffers(&self.buffers, mode) {
                continue;
            }
            let front = self.buffers.front_buffer(mode, index)?;
            if is_delta && flipped.contains(mode) {
                let back = self.buffers.back_buffer(mode, index)?;
                self.buffers.copy_device_state(index, back, front)?;
            }
            self.buffers.device_state_mut(front, index)?[start..start + bytes.len()].copy_from_slice(bytes);
        }
        Ok(())
    }

    fn control_block(&self, index: usize, path: &str) -> ManagerResult<StateBlock> {
        let device = self.device(index)?;
        device
            .find_control(path)
            .map(|control| control.state_block)
            .ok_or_else(|| ManagerError::ControlNotFound {
                device: device.name.clone(),
                path: path.to_string(),
            })
    }

    fn current_image(&self, index: usize, previous: bool) -> ManagerResult<&[u8]> {
        let ptr: BufferPtr = if previous {
            self.context.back_buffer_for_device(&self.buffers, index)?
        } else {
            self.context.front_buffer_for_device(&self.buffers, index)?
        };
        Ok(self.buffers.state_image(ptr, index)?)
    }

    /// Reads a control's current value as a float.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound`, `ControlNotFound`, or state errors for formats
    /// without a float encoding.
    pub fn read_control_float(&self, index: usize, path: &str) -> ManagerResult<f32> {
        let block = self.control_block(index, path)?;
        Ok(block.read_float(self.current_image(index, false)?)?)
    }

    /// Reads a control's current value as an integer.
    ///
    /// # Errors
    ///
    /// Same as [`StateManager::read_control_float`].
    pub fn read_control_int(&self, index: usize, path: &str) -> ManagerResult<i32> {
        let block = self.control_block(index, path)?;
        Ok(block.read_int(self.current_image(index, false)?)?)
    }

    /// Reads a control's value from the previous update.
    ///
    /// # Errors
    ///
    /// Same as [`StateManager::read_control_float`].
    pub fn read_previous_control_float(&self, index: usize, path: &str) -> ManagerResult<f32> {
        let block = self.control_block(index, path)?;
        Ok(block.read_float(self.current_image(index, true)?)?)
    }

    /// True if a device's state differs from the previous update in any bit
    /// not flagged as noise.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` or buffer errors.
    pub fn has_significant_change(&self, index: usize) -> ManagerResult<bool> {
        self.check_index(index)?;
        let front = self.context.front_buffer_for_device(&self.buffers, index)?;
        let back = self.context.back_buffer_for_device(&self.buffers, index)?;
        let noise_mask = self
            .buffers
            .noise_mask_buffer()
            .ok_or(StateError::NotAllocated)?;
        let noise = self.buffers.device_ptr(noise_mask, index)?;

        let front = self.buffers.device_state(front, index)?;
        let back = self.buffers.device_state(back, index)?;
        let noise = self.buffers.device_state(noise, index)?;
        Ok(front
            .iter()
            .zip(back)
            .zip(noise)
            .any(|((f, b), n)| (f ^ b) & !n != 0))
    }

    /// Puts a device's current state back to its defaults in every update
    /// mode.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` or buffer errors.
    pub fn reset_device(&mut self, index: usize) -> ManagerResult<()> {
        self.check_index(index)?;
        Ok(copy_default_state(&mut self.buffers, index, false)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inputstate_core::{DeviceBuilder, InputControl, StateFormat};

    fn gamepad() -> InputDevice {
        DeviceBuilder::new("gamepad", "GPAD")
            .control(
                InputControl::bitfield("buttons", 0, 0, 16)
                    .with_child(InputControl::bit("south", 0, 0))
                    .with_child(InputControl::bit("east", 0, 1)),
            )
            .control(InputControl::new("trigger", StateFormat::Byte).at(2))
            .control(InputControl::new("gyro", StateFormat::Byte).at(3).noisy())
            .control(
                InputControl::group("stick", "VEC2")
                    .at(4)
                    .with_child(InputControl::new("x", StateFormat::Short).with_default(0.25))
                    .with_child(InputControl::new("y", StateFormat::Short)),
            )
            .build()
            .unwrap()
    }

    fn both() -> StateConfig {
        StateConfig {
            update_modes: UpdateMask::DYNAMIC | UpdateMask::FIXED,
            ..StateConfig::default()
        }
    }

    #[test]
    fn test_add_device_installs_defaults() {
        let mut manager = StateManager::new(both());
        let pad = manager.add_device(gamepad()).unwrap();
        assert_eq!(pad, 0);
        assert_eq!(manager.devices()[0].device_index, 0);
        assert_eq!(manager.read_control_float(pad, "stick/x").unwrap(), 0.25);
        assert_eq!(manager.read_previous_control_float(pad, "stick/x").unwrap(), 0.25);
        assert_eq!(manager.read_control_float(pad, "trigger").unwrap(), 0.0);
    }

    #[test]
    fn test_unknown_device_and_control() {
        let mut manager = StateManager::new(both());
        manager.add_device(gamepad()).unwrap();
        assert!(matches!(
            manager.read_control_float(3, "trigger"),
            Err(ManagerError::DeviceNotFound { index: 3, count: 1 })
        ));
        assert!(matches!(
            manager.read_control_float(0, "stick/z"),
            Err(ManagerError::ControlNotFound { .. })
        ));
    }

    #[test]
    fn test_event_then_previous_value() {
        let mut manager = StateManager::new(both());
        let pad = manager.add_device(gamepad()).unwrap();

        manager.begin_update(UpdateMode::Dynamic).unwrap();
        manager.apply_state_event(pad, 2, &[255]).unwrap();
        assert_eq!(manager.read_control_float(pad, "trigger").unwrap(), 1.0);
        assert_eq!(manager.read_previous_control_float(pad, "trigger").unwrap(), 0.0);

        // Delta carried the rest forward.
        assert_eq!(manager.read_control_float(pad, "stick/x").unwrap(), 0.25);

        // Second event in the same update does not flip again.
        manager.apply_state_event(pad, 2, &[0]).unwrap();
        assert_eq!(manager.read_previous_control_float(pad, "trigger").unwrap(), 0.0);

        manager.begin_update(UpdateMode::Dynamic).unwrap();
        manager.apply_state_event(pad, 2, &[128]).unwrap();
        assert_eq!(manager.read_previous_control_float(pad, "trigger").unwrap(), 0.0);
        assert!((manager.read_control_float(pad, "trigger").unwrap() - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_event_reaches_fixed_update() {
        let mut manager = StateManager::new(both());
        let pad = manager.add_device(gamepad()).unwrap();

        manager.begin_update(UpdateMode::Dynamic).unwrap();
        manager.apply_state_event(pad, 0, &[0b01, 0]).unwrap();

        manager.begin_update(UpdateMode::Fixed).unwrap();
        assert_eq!(manager.read_control_int(pad, "buttons/south").unwrap(), 1);
        assert_eq!(manager.read_control_int(pad, "buttons/east").unwrap(), 0);
    }

    #[test]
    fn test_flip_rules() {
        let mut manager = StateManager::new(both());
        let pad = manager.add_device(gamepad()).unwrap();

        assert!(manager
            .flip_buffers_for_device_if_necessary(pad, UpdateMode::BeforeRender)
            .unwrap()
            .is_empty());

        manager.begin_update(UpdateMode::Dynamic).unwrap();
        assert_eq!(
            manager.flip_buffers_for_device_if_necessary(pad, UpdateMode::Dynamic).unwrap(),
            UpdateMask::DYNAMIC | UpdateMask::FIXED
        );
        assert!(manager
            .flip_buffers_for_device_if_necessary(pad, UpdateMode::Dynamic)
            .unwrap()
            .is_empty());

        // Fixed was pre-flipped for this update; only dynamic flips ahead.
        manager.begin_update(UpdateMode::Fixed).unwrap();
        let fixed_front = manager.buffers().front_buffer(UpdateMode::Fixed, pad).unwrap();
        let dynamic_front = manager.buffers().front_buffer(UpdateMode::Dynamic, pad).unwrap();
        assert_eq!(
            manager.flip_buffers_for_device_if_necessary(pad, UpdateMode::Fixed).unwrap(),
            UpdateMask::DYNAMIC
        );
        assert_eq!(manager.buffers().front_buffer(UpdateMode::Fixed, pad).unwrap(), fixed_front);
        assert_ne!(manager.buffers().front_buffer(UpdateMode::Dynamic, pad).unwrap(), dynamic_front);
        assert!(manager
            .flip_buffers_for_device_if_necessary(pad, UpdateMode::Fixed)
            .unwrap()
            .is_empty());
        assert_eq!(manager.update_count(UpdateMode::Fixed), Some(1));
        assert_eq!(manager.update_count(UpdateMode::BeforeRender), None);
    }

    #[test]
    fn test_delta_in_fixed_update_keeps_earlier_events() {
        let mut manager = StateManager::new(both());
        let pair = DeviceBuilder::new("pair", "PAIR")
            .control(InputControl::new("a", StateFormat::Byte).at(0))
            .control(InputControl::new("b", StateFormat::Byte).at(1))
            .build()
            .unwrap();
        let pair = manager.add_device(pair).unwrap();

        manager.begin_update(UpdateMode::Dynamic).unwrap();
        manager.apply_state_event(pair, 0, &[255]).unwrap();

        // Fixed was flipped by the first event; only dynamic flips here.
        manager.begin_update(UpdateMode::Fixed).unwrap();
        assert_eq!(manager.read_control_float(pair, "a").unwrap(), 1.0);
        manager.apply_state_event(pair, 1, &[255]).unwrap();
        assert_eq!(manager.read_control_float(pair, "a").unwrap(), 1.0);
        assert_eq!(manager.read_control_float(pair, "b").unwrap(), 1.0);

        manager.begin_update(UpdateMode::Dynamic).unwrap();
        assert_eq!(manager.read_control_float(pair, "a").unwrap(), 1.0);
        assert_eq!(manager.read_control_float(pair, "b").unwrap(), 1.0);
    }

    #[test]
    fn test_event_out_of_range() {
        let mut manager = StateManager::new(both());
        let pad = manager.add_device(gamepad()).unwrap();
        let err = manager.apply_state_event(pad, 7, &[1, 2]).unwrap_err();
        assert!(matches!(err, ManagerError::EventOutOfRange { offset: 7, len: 2, size: 8, .. }));
    }

    #[test]
    fn test_noise_is_not_significant() {
        let mut manager = StateManager::new(both());
        let pad = manager.add_device(gamepad()).unwrap();

        manager.begin_update(UpdateMode::Dynamic).unwrap();
        manager.apply_state_event(pad, 3, &[200]).unwrap();
        assert!(!manager.has_significant_change(pad).unwrap());

        manager.begin_update(UpdateMode::Dynamic).unwrap();
        manager.apply_state_event(pad, 2, &[10]).unwrap();
        assert!(manager.has_significant_change(pad).unwrap());
    }

    #[test]
    fn test_reset_device() {
        let mut manager = StateManager::new(both());
        let pad = manager.add_device(gamepad()).unwrap();
        manager.begin_update(UpdateMode::Dynamic).unwrap();
        manager.apply_state_event(pad, 4, &[0xFF, 0x7F]).unwrap();
        assert!(manager.read_control_float(pad, "stick/x").unwrap() > 0.99);

        manager.reset_device(pad).unwrap();
        assert_eq!(manager.read_control_float(pad, "stick/x").unwrap(), 0.25);
    }

    #[test]
    fn test_zero_size_device_not_added() {
        let mut manager = StateManager::new(both());
        manager.add_device(gamepad()).unwrap();
        let empty = DeviceBuilder::new("empty", "NONE").build().unwrap();
        assert!(matches!(
            manager.add_device(empty),
            Err(ManagerError::State(StateError::ZeroSizeDevice { .. }))
        ));
        assert_eq!(manager.devices().len(), 1);
        assert_eq!(manager.read_control_float(0, "stick/x").unwrap(), 0.25);
    }

    #[test]
    fn test_failed_initialisation_leaves_buffers_untouched() {
        let mut manager = StateManager::new(both());
        let pad = manager.add_device(gamepad()).unwrap();
        manager.begin_update(UpdateMode::Dynamic).unwrap();
        manager.apply_state_event(pad, 2, &[255]).unwrap();
        let arena = manager.buffers().arena_id();

        let bad = DeviceBuilder::new("bad", "BAD")
            .control(InputControl::new("precise", StateFormat::Double).with_default(1.0))
            .build()
            .unwrap();
        assert!(matches!(
            manager.add_device(bad),
            Err(ManagerError::State(StateError::UnsupportedFormat { .. }))
        ));

        assert_eq!(manager.devices().len(), 1);
        assert_eq!(manager.buffers().device_count(), 1);
        assert_eq!(manager.buffers().arena_id(), arena);
        assert_eq!(manager.read_control_float(pad, "trigger").unwrap(), 1.0);

        let next = manager.add_device(gamepad()).unwrap();
        assert_eq!(next, 1);
        assert_eq!(manager.buffers().device_count(), 2);
    }

    #[test]
    fn test_remove_last_device_frees_buffers() {
        let mut manager = StateManager::new(both());
        let pad = manager.add_device(gamepad()).unwrap();
        let removed = manager.remove_device(pad).unwrap();

        assert!(!manager.buffers().is_allocated());
        assert!(!manager.context().current().is_valid());
        assert!(!removed.is_installed());
        assert_eq!(removed.find_control("stick/x").unwrap().state_block.byte_offset, 4);
    }

    #[test]
    fn test_set_update_mask_keeps_state() {
        let mut manager = StateManager::new(StateConfig::default());
        let pad = manager.add_device(gamepad()).unwrap();
        manager.begin_update(UpdateMode::Dynamic).unwrap();
        manager.apply_state_event(pad, 2, &[51]).unwrap();

        manager.set_update_mask(UpdateMask::DYNAMIC | UpdateMask::MANUAL).unwrap();
        assert!(manager.buffers().get_double_buffers_for(UpdateMode::Manual).unwrap().is_valid());
        assert!((manager.read_control_float(pad, "trigger").unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_enabled_mode_starts_from_current_state() {
        let mut manager = StateManager::new(StateConfig::default());
        let pad = manager.add_device(gamepad()).unwrap();
        manager.begin_update(UpdateMode::Dynamic).unwrap();
        manager.apply_state_event(pad, 2, &[51]).unwrap();

        manager.set_update_mask(UpdateMask::DYNAMIC | UpdateMask::MANUAL).unwrap();
        manager.begin_update(UpdateMode::Manual).unwrap();
        assert_eq!(manager.read_control_float(pad, "stick/x").unwrap(), 0.25);
        assert!((manager.read_control_float(pad, "trigger").unwrap() - 0.2).abs() < 1e-6);
        assert!((manager.read_previous_control_float(pad, "trigger").unwrap() - 0.2).abs() < 1e-6);
        assert!(!manager.has_significant_change(pad).unwrap());

        manager.apply_state_event(pad, 2, &[0]).unwrap();
        assert_eq!(manager.read_control_float(pad, "trigger").unwrap(), 0.0);
        assert_eq!(manager.read_control_float(pad, "stick/x").unwrap(), 0.25);
    }
}
