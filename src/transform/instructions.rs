//! Derived pixel-space instructions.
//!
//! These structs describe *what* a backend should do, not *how*. They are
//! produced by [`Transformation`](super::Transformation) from the request
//! syntax plus the source dimensions, and consumed by an
//! [`ImageBackend`](crate::imaging::ImageBackend).
//!
//! - [`RegionInstruction`]: crop rectangle, always inside the source.
//! - [`SizeInstruction`]: output dimensions plus `force` / `enlarge` mode.
//! - [`RotationInstruction`]: mirror flag and angle in degrees.
//! - [`FormatInstruction`]: canonical format name from the level's table.

use serde::Serialize;
use std::fmt;

/// Crop rectangle in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegionInstruction {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for RegionInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[region] from {}, {} by {}, {} pixels to {}, {}",
            self.x,
            self.y,
            self.width,
            self.height,
            self.x + self.width,
            self.y + self.height
        )
    }
}

/// Output size.
///
/// - `force`: scale to exactly `width` x `height`, distorting if needed.
/// - `enlarge`: best fit inside `width` x `height`, allowed to upscale.
///
/// At most one of the two is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeInstruction {
    pub width: u32,
    pub height: u32,
    pub force: bool,
    pub enlarge: bool,
}

impl fmt::Display for SizeInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match (self.force, self.enlarge) {
            (true, _) => "forced",
            (_, true) => "best fit",
            _ => "scaled",
        };
        write!(f, "[size] {} x {} ({mode})", self.width, self.height)
    }
}

/// Rotation in degrees, clockwise, applied after an optional mirror.
///
/// The angle is passed through as parsed; no normalization to `[0, 360)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RotationInstruction {
    pub flip: bool,
    pub angle: f64,
}

impl RotationInstruction {
    /// True for `0` without a mirror.
    pub fn is_noop(&self) -> bool {
        !self.flip && self.angle == 0.0
    }
}

impl fmt::Display for RotationInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[rotation] by {:.3}, flip: {}", self.angle, self.flip)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatInstruction {
    pub format: String,
}

impl fmt::Display for FormatInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[format] {}", self.format)
    }
}
