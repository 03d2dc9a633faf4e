//! Parameter types for image operations.
//!
//! These describe *how* output should look once the transformation core has
//! decided *what* to crop and scale. They are backend-agnostic.
//!
//! ## Types
//!
//! - [`EncodeQuality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`ColorMode`]: Pixel treatment for an IIIF quality name (`color`, `gray`, `bitonal`).
//! - [`OutputLimits`]: Largest derivative a backend will allocate.

use crate::types::Dimensions;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeQuality(u32);

impl EncodeQuality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for EncodeQuality {
    fn default() -> Self {
        Self(90)
    }
}

/// Pixel treatment selected by the request's quality parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    /// Keep pixels as decoded (`color`, `default`).
    Unchanged,
    /// Luma only (`gray`, `grey`).
    Gray,
    /// Black and white at a fixed luma threshold (`bitonal`).
    Bitonal,
}

impl ColorMode {
    /// Luma at or above which a bitonal pixel turns white.
    pub const BITONAL_THRESHOLD: u8 = 128;

    pub fn from_quality(quality: &str) -> Option<Self> {
        match quality {
            "default" | "color" | "colour" => Some(Self::Unchanged),
            "gray" | "grey" => Some(Self::Gray),
            "bitonal" => Some(Self::Bitonal),
            _ => None,
        }
    }
}

/// Upper bounds on the pixel size of a derivative.
///
/// Checked against the planned output before any pixels are decoded, so an
/// oversized request fails with an error instead of an allocation abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLimits {
    pub max_width: u32,
    pub max_height: u32,
    pub max_area: u64,
}

impl OutputLimits {
    pub const DEFAULT_MAX_SIDE: u32 = 16384;
    /// 100 megapixels, 400 MB as RGBA.
    pub const DEFAULT_MAX_AREA: u64 = 100_000_000;

    /// Whether `size` has pixels and fits every bound.
    pub fn admits(&self, size: Dimensions) -> bool {
        !size.is_empty()
            && size.width <= self.max_width
            && size.height <= self.max_height
            && u64::from(size.width) * u64::from(size.height) <= self.max_area
    }
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self {
            max_width: Self::DEFAULT_MAX_SIDE,
            max_height: Self::DEFAULT_MAX_SIDE,
            max_area: Self::DEFAULT_MAX_AREA,
        }
    }
}

/// MIME type for a canonical format name.
pub fn content_type(format: &str) -> Option<&'static str> {
    Some(match format {
        "jpg" => "image/jpeg",
        "png" => "image/png",
        "tif" => "image/tiff",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "jp2" => "image/jp2",
        "pdf" => "application/pdf",
        _ => return None,
    })
}
