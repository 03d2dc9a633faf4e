//! Validated IIIF image transformations.
//!
//! A [`Transformation`] is built once per request from the five path
//! parameters and a compliance [`Level`](crate::level::Level). Construction
//! validates every parameter; after that the value is read-only and can be
//! shared freely between threads.
//!
//! Instructions are derived on demand, in the order a backend must apply
//! them:
//!
//! ```text
//! region → size → rotation → quality → format
//! ```
//!
//! The module is split into:
//! - **Calculations**: pure functions from syntax + dimensions to instructions
//! - **Instructions**: the derived records handed to a backend

mod calculations;
mod instructions;

pub use calculations::square_region;
pub use instructions::{FormatInstruction, RegionInstruction, RotationInstruction, SizeInstruction};

use crate::level::{Compliance, LevelError};
use crate::types::Dimensions;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::fmt;
use thiserror::Error;

/// Characters escaped in a canonical URI segment: everything outside the
/// RFC 3986 `pchar` production.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b':')
    .remove(b'@');

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error(transparent)]
    Compliance(#[from] LevelError),
    #[error("Invalid region: {0:?}")]
    InvalidRegion(String),
    #[error("Unrecognized region: {0:?}")]
    UnrecognizedRegion(String),
    #[error("Region {0:?} starts outside the image")]
    RegionOutOfBounds(String),
    #[error("Region {0:?} has no area")]
    EmptyRegion(String),
    #[error("IIIF 2.1 `size` argument is not recognized: {0:?}")]
    InvalidSize(String),
    #[error("IIIF 2.1 `rotation` argument is not recognized: {0:?}")]
    InvalidRotation(String),
    #[error("failed to determine format: {0:?}")]
    UnresolvableFormat(String),
    #[error("Source image has no pixels ({0})")]
    EmptyImage(Dimensions),
    #[error("Cannot use {segment:?} as a URI segment: {reason}")]
    InvalidUriSegment {
        segment: String,
        reason: &'static str,
    },
}

/// A validated request for one derivative of a source image.
#[derive(Clone)]
pub struct Transformation<'l> {
    level: &'l dyn Compliance,
    region: String,
    size: String,
    rotation: String,
    quality: String,
    format: String,
    /// Whether the request asked for `default` before it was resolved.
    default_quality: bool,
}

impl<'l> Transformation<'l> {
    /// Validate the five parameters against `level`.
    ///
    /// Validators run in the order region, size, rotation, quality, format;
    /// the first failure is returned as-is. A requested `default` quality is
    /// replaced with the level's concrete default.
    pub fn new(
        level: &'l dyn Compliance,
        region: &str,
        size: &str,
        rotation: &str,
        quality: &str,
        format: &str,
    ) -> Result<Self, TransformError> {
        level.is_valid_image_region(region)?;
        level.is_valid_image_size(size)?;
        level.is_valid_image_rotation(rotation)?;
        level.is_valid_image_quality(quality)?;
        level.is_valid_image_format(format)?;

        let default_quality = quality == "default";
        let quality = if default_quality {
            level.default_quality()?
        } else {
            quality.to_string()
        };

        Ok(Self {
            level,
            region: region.to_string(),
            size: size.to_string(),
            rotation: rotation.to_string(),
            quality,
            format: format.to_string(),
            default_quality,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn size(&self) -> &str {
        &self.size
    }

    pub fn rotation(&self) -> &str {
        &self.rotation
    }

    /// The resolved quality (never `default` unless the level says so).
    pub fn quality(&self) -> &str {
        &self.quality
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn level(&self) -> &'l dyn Compliance {
        self.level
    }

    /// Canonical request path: `{id}/{region}/{size}/{rotation}/{quality}.{format}`.
    ///
    /// Each of the first five segments is escaped on its own, so a `/` inside
    /// the identifier becomes `%2F` instead of a path separator.
    pub fn to_uri(&self, id: &str) -> Result<String, TransformError> {
        let segments = [
            id,
            self.region.as_str(),
            self.size.as_str(),
            self.rotation.as_str(),
            self.quality.as_str(),
        ];

        let encoded = segments
            .iter()
            .map(|segment| encode_segment(segment))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(format!("{}.{}", encoded.join("/"), self.format))
    }

    /// False only for `full/full/0/default`; the format is not considered.
    ///
    /// Callers use this to hand the source bytes straight through.
    pub fn has_transformation(&self) -> bool {
        self.region != "full"
            || self.size != "full"
            || self.rotation != "0"
            || !self.default_quality
    }

    pub fn region_instructions(&self, dims: Dimensions) -> Result<RegionInstruction, TransformError> {
        calculations::region_instruction(&self.region, dims)
    }

    pub fn size_instructions(&self, dims: Dimensions) -> Result<SizeInstruction, TransformError> {
        calculations::size_instruction(&self.size, dims)
    }

    pub fn rotation_instructions(&self) -> Result<RotationInstruction, TransformError> {
        calculations::rotation_instruction(&self.rotation)
    }

    /// Resolve the requested format token against the level's format table.
    pub fn format_instructions(&self) -> Result<FormatInstruction, TransformError> {
        calculations::format_instruction(&self.level.spec().image.format, &self.format)
    }
}

impl fmt::Debug for Transformation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformation")
            .field("region", &self.region)
            .field("size", &self.size)
            .field("rotation", &self.rotation)
            .field("quality", &self.quality)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

fn encode_segment(segment: &str) -> Result<String, TransformError> {
    let reject = |reason| TransformError::InvalidUriSegment {
        segment: segment.to_string(),
        reason,
    };
    if segment.is_empty() {
        return Err(reject("segment is empty"));
    }
    if segment.chars().any(|c| c.is_ascii_control()) {
        return Err(reject("contains a control character"));
    }
    Ok(utf8_percent_encode(segment, SEGMENT).to_string())
}
