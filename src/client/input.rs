//! Directional Input
//!
//! Held movement keys packed into one byte. Opposing keys cancel; diagonals
//! are normalized so they cover the same distance per tick as a single axis.

use serde::{Serialize, Deserialize};
use crate::core::vec2::Vec2;

/// Movement keys held during a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct InputIntent {
    /// Packed key bits:
    /// - Bit 0: up (north, -Y)
    /// - Bit 1: down (south, +Y)
    /// - Bit 2: left (-X)
    /// - Bit 3: right (+X)
    /// - Bit 4-7: Reserved
    pub flags: u8,
}

impl InputIntent {
    /// Up flag bit
    pub const UP: u8 = 0x01;
    /// Down flag bit
    pub const DOWN: u8 = 0x02;
    /// Left flag bit
    pub const LEFT: u8 = 0x04;
    /// Right flag bit
    pub const RIGHT: u8 = 0x08;

    const MASK: u8 = Self::UP | Self::DOWN | Self::LEFT | Self::RIGHT;

    /// No keys held.
    pub const fn none() -> Self {
        Self { flags: 0 }
    }

    /// From raw bits. Reserved bits are dropped.
    pub const fn from_bits(flags: u8) -> Self {
        Self { flags: flags & Self::MASK }
    }

    /// From individual keys.
    pub const fn from_keys(up: bool, down: bool, left: bool, right: bool) -> Self {
        let mut flags = 0;
        if up {
            flags |= Self::UP;
        }
        if down {
            flags |= Self::DOWN;
        }
        if left {
            flags |= Self::LEFT;
        }
        if right {
            flags |= Self::RIGHT;
        }
        Self { flags }
    }

    /// Press a key.
    pub fn press(&mut self, key: u8) {
        self.flags |= key & Self::MASK;
    }

    /// Release a key.
    pub fn release(&mut self, key: u8) {
        self.flags &= !key;
    }

    /// Check if a key is held.
    #[inline]
    pub fn held(&self, key: u8) -> bool {
        self.flags & key != 0
    }

    /// Raw axis direction, each component in {-1, 0, 1}.
    pub fn axes(&self) -> Vec2 {
        let axis = |neg: u8, pos: u8| match (self.held(neg), self.held(pos)) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        };
        Vec2::new(axis(Self::LEFT, Self::RIGHT), axis(Self::UP, Self::DOWN))
    }

    /// Unit-length direction, or zero when no net direction is held.
    pub fn direction(&self) -> Vec2 {
        self.axes().normalize()
    }

    /// Whether the keys produce any movement.
    pub fn is_moving(&self) -> bool {
        self.axes() != Vec2::ZERO
    }
}
