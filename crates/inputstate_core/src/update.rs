//! # Update Modes
//!
//! Scheduling phases that read input. Each enabled phase (other than
//! before-render) gets its own "current vs previous" double buffer.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::Deserialize;

/// A scheduling phase that consumes input state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Once per rendered frame.
    Dynamic,
    /// Once per fixed simulation step.
    Fixed,
    /// Right before rendering; shares the dynamic (or fixed) buffers.
    BeforeRender,
    /// Editor ticks while the game is not playing.
    Editor,
    /// Updates triggered explicitly by the application.
    Manual,
}

impl UpdateMode {
    /// All modes, in mask bit order.
    pub const ALL: [Self; 5] = [
        Self::Dynamic,
        Self::Fixed,
        Self::BeforeRender,
        Self::Editor,
        Self::Manual,
    ];

    /// The mask bit of this mode.
    #[inline]
    #[must_use]
    pub const fn bit(self) -> u32 {
        match self {
            Self::Dynamic => 1 << 0,
            Self::Fixed => 1 << 1,
            Self::BeforeRender => 1 << 2,
            Self::Editor => 1 << 3,
            Self::Manual => 1 << 4,
        }
    }

    /// True for modes that own a double buffer set.
    #[inline]
    #[must_use]
    pub const fn has_own_buffers(self) -> bool {
        !matches!(self, Self::BeforeRender)
    }
}

/// A set of update modes.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "Vec<UpdateMode>")]
pub struct UpdateMask(u32);

impl UpdateMask {
    /// No modes.
    pub const NONE: Self = Self(0);
    /// Just dynamic updates.
    pub const DYNAMIC: Self = Self(UpdateMode::Dynamic.bit());
    /// Just fixed updates.
    pub const FIXED: Self = Self(UpdateMode::Fixed.bit());
    /// Just before-render updates.
    pub const BEFORE_RENDER: Self = Self(UpdateMode::BeforeRender.bit());
    /// Just editor updates.
    pub const EDITOR: Self = Self(UpdateMode::Editor.bit());
    /// Just manual updates.
    pub const MANUAL: Self = Self(UpdateMode::Manual.bit());

    /// Builds a mask from raw bits, dropping unknown ones.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & 0b1_1111)
    }

    /// Raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if `mode` is in the set.
    #[inline]
    #[must_use]
    pub const fn contains(self, mode: UpdateMode) -> bool {
        self.0 & mode.bit() != 0
    }

    /// Returns the set with `mode` added.
    #[inline]
    #[must_use]
    pub const fn with(self, mode: UpdateMode) -> Self {
        Self(self.0 | mode.bit())
    }

    /// Returns the set with `mode` removed.
    #[inline]
    #[must_use]
    pub const fn without(self, mode: UpdateMode) -> Self {
        Self(self.0 & !mode.bit())
    }

    /// True if no mode is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates the modes in the set.
    pub fn modes(self) -> impl Iterator<Item = UpdateMode> {
        UpdateMode::ALL.into_iter().filter(move |mode| self.contains(*mode))
    }
}

impl From<UpdateMode> for UpdateMask {
    fn from(mode: UpdateMode) -> Self {
        Self(mode.bit())
    }
}

impl From<Vec<UpdateMode>> for UpdateMask {
    fn from(modes: Vec<UpdateMode>) -> Self {
        modes.into_iter().fold(Self::NONE, Self::with)
    }
}

impl BitOr for UpdateMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOr<UpdateMode> for UpdateMask {
    type Output = Self;

    fn bitor(self, rhs: UpdateMode) -> Self {
        self.with(rhs)
    }
}

impl BitOrAssign for UpdateMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for UpdateMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.modes()).finish()
    }
}
