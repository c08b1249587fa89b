//! # Devices and Controls
//!
//! A device owns a contiguous state region and a tree of controls, each
//! described by a `StateBlock`. Until the device is installed into state
//! buffers, every offset is relative to the device's own region; once
//! installed, offsets are relative to a full state image.
//!
//! ```text
//! device "pad" (GPAD, 8 bytes)
//! ├── buttons       bits  0..16   @ byte 0
//! │   ├── south     bit   0       @ byte 0
//! │   └── east      bit   1       @ byte 0
//! ├── trigger       BYTE          @ byte 2
//! └── stick         composite     @ byte 4
//!     ├── x         SHRT          @ byte 4
//!     └── y         SHRT          @ byte 6
//! ```

use crate::block::StateBlock;
use crate::error::{StateError, StateResult};
use crate::format::{FourCC, StateFormat};

/// A single named value within a device.
#[derive(Clone, Debug, PartialEq)]
pub struct InputControl {
    /// Name, unique among siblings.
    pub name: String,
    /// Where the value lives.
    pub state_block: StateBlock,
    /// Noisy controls change without user interaction (sensors, jitter).
    pub noisy: bool,
    /// Value written into the default-state buffer, if any.
    pub default_value: Option<f32>,
    /// Child controls; their offsets are laid out inside this control.
    pub children: Vec<InputControl>,
}

impl InputControl {
    /// Creates an automatically placed control with the format's natural size.
    #[must_use]
    pub fn new(name: impl Into<String>, format: StateFormat) -> Self {
        Self {
            name: name.into(),
            state_block: StateBlock::new(format, StateBlock::INVALID_OFFSET),
            noisy: false,
            default_value: None,
            children: Vec::new(),
        }
    }

    /// Creates a single-bit control (a button).
    #[must_use]
    pub fn bit(name: impl Into<String>, byte_offset: u32, bit_offset: u32) -> Self {
        Self::bitfield(name, byte_offset, bit_offset, 1)
    }

    /// Creates a multi-bit control.
    #[must_use]
    pub fn bitfield(name: impl Into<String>, byte_offset: u32, bit_offset: u32, size_in_bits: u32) -> Self {
        Self {
            name: name.into(),
            state_block: StateBlock::bits(byte_offset, bit_offset, size_in_bits),
            noisy: false,
            default_value: None,
            children: Vec::new(),
        }
    }

    /// Creates a composite control whose size comes from its children.
    #[must_use]
    pub fn group(name: impl Into<String>, tag: &str) -> Self {
        let mut control = Self::new(name, StateFormat::Custom(FourCC::from_str_padded(tag)));
        control.state_block.size_in_bits = 0;
        control
    }

    /// Pins the control at a byte offset relative to its parent.
    #[must_use]
    pub fn at(mut self, byte_offset: u32) -> Self {
        self.state_block.byte_offset = byte_offset;
        self
    }

    /// Marks the control as noisy.
    #[must_use]
    pub fn noisy(mut self) -> Self {
        self.noisy = true;
        self
    }

    /// Sets the value written into the default-state buffer.
    #[must_use]
    pub fn with_default(mut self, value: f32) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Adds a child control.
    #[must_use]
    pub fn with_child(mut self, child: InputControl) -> Self {
        self.children.push(child);
        self
    }

    fn bake_offset_recursive(&mut self, delta: u32) {
        self.state_block.bake_offset(delta);
        for child in &mut self.children {
            child.bake_offset_recursive(delta);
        }
    }

    /// Places this control and its children. Returns the first bit past the
    /// control, device-relative.
    fn lay_out(&mut self, parent_offset: u32, cursor: &mut u32) -> StateResult<u32> {
        let offset = if self.state_block.has_invalid_offset() {
            Some(*cursor)
        } else {
            parent_offset.checked_add(self.state_block.byte_offset)
        };
        let offset = offset.filter(|&offset| offset != StateBlock::INVALID_OFFSET);
        let start_bit = offset.and_then(|offset| offset.checked_mul(8));
        let (Some(offset), Some(start_bit)) = (offset, start_bit) else {
            return Err(self.overflow());
        };
        self.state_block.byte_offset = offset;

        let mut child_cursor = offset;
        let mut children_end = start_bit;
        for child in &mut self.children {
            children_end = children_end.max(child.lay_out(offset, &mut child_cursor)?);
        }

        if self.state_block.size_in_bits == 0 && !self.children.is_empty() {
            self.state_block.size_in_bits = children_end - start_bit;
        }

        let end = start_bit
            .checked_add(self.state_block.bit_offset)
            .and_then(|bit| bit.checked_add(self.state_block.size_in_bits))
            .ok_or_else(|| self.overflow())?;
        *cursor = (*cursor).max(end.div_ceil(8));
        Ok(end)
    }

    fn overflow(&self) -> StateError {
        StateError::LayoutOverflow {
            control: self.name.clone(),
        }
    }
}

/// Depth-first iterator over a control tree.
pub struct Controls<'a> {
    stack: Vec<std::slice::Iter<'a, InputControl>>,
}

impl<'a> Iterator for Controls<'a> {
    type Item = &'a InputControl;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                Some(control) => {
                    self.stack.push(control.children.iter());
                    return Some(control);
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

/// An input source with a contiguous state region.
#[derive(Clone, Debug, PartialEq)]
pub struct InputDevice {
    /// Human-readable name.
    pub name: String,
    /// Position in the device list of the state buffers.
    pub device_index: usize,
    /// Root block: format tag, offset of the device region, total size.
    pub state_block: StateBlock,
    /// Top-level controls.
    pub controls: Vec<InputControl>,
}

impl InputDevice {
    /// Size of the device's state in bytes.
    #[inline]
    #[must_use]
    pub const fn state_size_in_bytes(&self) -> u32 {
        self.state_block.aligned_size_in_bytes()
    }

    /// True once the device has been installed into state buffers.
    #[inline]
    #[must_use]
    pub const fn is_installed(&self) -> bool {
        !self.state_block.has_invalid_offset()
    }

    /// Adds `delta` (wrapping) to the root block and every control.
    ///
    /// Passing the negated root offset moves the device back to device-local
    /// addressing.
    pub fn bake_offset_into_state_block_recursive(&mut self, delta: u32) {
        self.state_block.bake_offset(delta);
        for control in &mut self.controls {
            control.bake_offset_recursive(delta);
        }
    }

    /// Iterates every control, depth first.
    #[must_use]
    pub fn controls(&self) -> Controls<'_> {
        Controls {
            stack: vec![self.controls.iter()],
        }
    }

    /// Finds a control by `/`-separated path, e.g. `"stick/x"`.
    #[must_use]
    pub fn find_control(&self, path: &str) -> Option<&InputControl> {
        let mut level = &self.controls;
        let mut found = None;
        for part in path.split('/') {
            let control = level.iter().find(|c| c.name == part)?;
            level = &control.children;
            found = Some(control);
        }
        found
    }

    /// Offset of the device's region, or zero when not yet installed.
    #[inline]
    #[must_use]
    pub const fn base_offset(&self) -> u32 {
        if self.is_installed() {
            self.state_block.byte_offset
        } else {
            0
        }
    }

    /// FNV-1a hash of the device's layout, independent of where it is installed.
    ///
    /// Two devices with equal fingerprints can exchange state bytes.
    #[must_use]
    pub fn layout_fingerprint(&self) -> u64 {
        let base = self.base_offset();
        let mut hash = Fnv1a::new();
        hash.write(&self.state_block.format.fourcc().bytes());
        hash.write(&self.state_block.size_in_bits.to_le_bytes());
        for control in self.controls() {
            let block = &control.state_block;
            hash.write(&block.format.fourcc().bytes());
            hash.write(&block.byte_offset.wrapping_sub(base).to_le_bytes());
            hash.write(&block.bit_offset.to_le_bytes());
            hash.write(&block.size_in_bits.to_le_bytes());
        }
        hash.finish()
    }
}

struct Fnv1a(u64);

impl Fnv1a {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    fn new() -> Self {
        Self(Self::OFFSET_BASIS)
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.0 ^= u64::from(byte);
            self.0 = self.0.wrapping_mul(Self::PRIME);
        }
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

/// Builds a device and lays out its controls.
///
/// Controls pinned with `InputControl::at` keep their offset (relative to the
/// parent); the rest are appended byte-aligned after the furthest byte used
/// so far.
///
/// # Example
///
/// ```rust,ignore
/// let pad = DeviceBuilder::new("pad", "GPAD")
///     .control(InputControl::bit("south", 0, 0))
///     .control(InputControl::new("trigger", StateFormat::Byte))
///     .build()?;
/// ```
pub struct DeviceBuilder {
    name: String,
    format: StateFormat,
    controls: Vec<InputControl>,
    min_size_in_bytes: u32,
}

impl DeviceBuilder {
    /// Starts a device with a composite format tag.
    #[must_use]
    pub fn new(name: impl Into<String>, tag: &str) -> Self {
        Self {
            name: name.into(),
            format: StateFormat::Custom(FourCC::from_str_padded(tag)),
            controls: Vec::new(),
            min_size_in_bytes: 0,
        }
    }

    /// Adds a top-level control.
    #[must_use]
    pub fn control(mut self, control: InputControl) -> Self {
        self.controls.push(control);
        self
    }

    /// Reserves at least `bytes` bytes of state even if controls need less.
    #[must_use]
    pub fn min_size(mut self, bytes: u32) -> Self {
        self.min_size_in_bytes = bytes;
        self
    }

    /// Lays out the controls and returns the uninstalled device.
    ///
    /// # Errors
    ///
    /// `LayoutOverflow` if a control, or the device as a whole, does not fit
    /// in a `u32` bit range.
    pub fn build(mut self) -> StateResult<InputDevice> {
        let mut cursor = 0;
        let mut end_bits = 0;
        for control in &mut self.controls {
            end_bits = end_bits.max(control.lay_out(0, &mut cursor)?);
        }
        let size_in_bytes = end_bits.div_ceil(8).max(self.min_size_in_bytes);
        let size_in_bits = size_in_bytes.checked_mul(8).ok_or_else(|| StateError::LayoutOverflow {
            control: self.name.clone(),
        })?;

        Ok(InputDevice {
            name: self.name,
            device_index: usize::MAX,
            state_block: StateBlock::unplaced(self.format, size_in_bits),
            controls: self.controls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gamepad() -> InputDevice {
        DeviceBuilder::new("pad", "GPAD")
            .control(
                InputControl::bitfield("buttons", 0, 0, 16)
                    .with_child(InputControl::bit("south", 0, 0))
                    .with_child(InputControl::bit("east", 0, 1)),
            )
            .control(InputControl::new("trigger", StateFormat::Byte))
            .control(
                InputControl::group("stick", "STCK")
                    .at(4)
                    .with_child(InputControl::new("x", StateFormat::Short).noisy())
                    .with_child(InputControl::new("y", StateFormat::Short)),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_layout() {
        let pad = gamepad();
        assert_eq!(pad.state_size_in_bytes(), 8);
        assert!(!pad.is_installed());

        assert_eq!(pad.find_control("trigger").unwrap().state_block.byte_offset, 2);
        let stick = pad.find_control("stick").unwrap();
        assert_eq!(stick.state_block.byte_offset, 4);
        assert_eq!(stick.state_block.size_in_bits, 32);
        assert_eq!(pad.find_control("stick/x").unwrap().state_block.byte_offset, 4);
        assert_eq!(pad.find_control("stick/y").unwrap().state_block.byte_offset, 6);
        assert_eq!(pad.find_control("buttons/east").unwrap().state_block.bit_offset, 1);
        assert!(pad.find_control("stick/z").is_none());
    }

    #[test]
    fn test_depth_first_iteration() {
        let names: Vec<_> = gamepad().controls().map(|c| c.name.clone()).collect();
        assert_eq!(names, ["buttons", "south", "east", "trigger", "stick", "x", "y"]);
    }

    #[test]
    fn test_bake_and_unbake() {
        let mut pad = gamepad();
        pad.state_block.byte_offset = 0;
        pad.bake_offset_into_state_block_recursive(64);
        assert_eq!(pad.state_block.byte_offset, 64);
        assert_eq!(pad.find_control("stick/y").unwrap().state_block.byte_offset, 70);

        pad.bake_offset_into_state_block_recursive(64u32.wrapping_neg());
        assert_eq!(pad.find_control("stick/y").unwrap().state_block.byte_offset, 6);
    }

    #[test]
    fn test_fingerprint_ignores_install_offset() {
        let local = gamepad();
        let mut installed = gamepad();
        installed.state_block.byte_offset = 0;
        installed.bake_offset_into_state_block_recursive(128);
        assert_eq!(local.layout_fingerprint(), installed.layout_fingerprint());

        let other = DeviceBuilder::new("pad", "GPAD")
            .control(InputControl::new("trigger", StateFormat::UShort))
            .min_size(8)
            .build()
            .unwrap();
        assert_ne!(local.layout_fingerprint(), other.layout_fingerprint());
    }

    #[test]
    fn test_min_size() {
        let device = DeviceBuilder::new("tiny", "TINY")
            .control(InputControl::bit("b", 0, 0))
            .min_size(4)
            .build()
            .unwrap();
        assert_eq!(device.state_size_in_bytes(), 4);

        let device = DeviceBuilder::new("tiny", "TINY")
            .control(InputControl::bit("b", 0, 0))
            .build()
            .unwrap();
        assert_eq!(device.state_size_in_bytes(), 1);
    }

    #[test]
    fn test_layout_overflow_is_an_error() {
        let err = DeviceBuilder::new("far", "FAR")
            .control(
                InputControl::group("outer", "GRP")
                    .at(u32::MAX - 2)
                    .with_child(InputControl::new("inner", StateFormat::Int).at(8)),
            )
            .build()
            .unwrap_err();
        assert_eq!(err, StateError::LayoutOverflow { control: "outer".to_owned() });

        let err = DeviceBuilder::new("huge", "HUGE").min_size(u32::MAX / 4).build().unwrap_err();
        assert_eq!(err, StateError::LayoutOverflow { control: "huge".to_owned() });
    }
}
