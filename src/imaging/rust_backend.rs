//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Step | Crate / function |
//! |---|---|
//! | Identify | `image::ImageReader::into_dimensions` (header only) |
//! | Decode (JPEG, PNG, TIFF, GIF, WebP) | `image::load_from_memory` |
//! | Region | `DynamicImage::crop_imm` |
//! | Size | `DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Mirror / rotate | `fliph`, `rotate90`, `rotate180`, `rotate270` |
//! | Quality | `to_luma8` (+ threshold for bitonal) |
//! | Encode | `JpegEncoder` with configured quality, `write_to` otherwise |
//!
//! Only right-angle rotations are supported; anything else is reported as
//! [`BackendError::Unsupported`].
//!
//! The planned output size is checked against [`OutputLimits`] before the
//! source is decoded. Requests the level accepts can still ask for billions
//! of pixels.

use super::backend::{BackendError, ImageBackend};
use super::calculations::{calculate_fit_dimensions, quarter_turns};
use super::operations::RenderPlan;
use super::params::{ColorMode, EncodeQuality, OutputLimits};
use crate::transform::{RotationInstruction, SizeInstruction};
use crate::types::Dimensions;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;

const NAME: &str = "rust";

/// Canonical format names and the `image` formats that encode/decode them.
const FORMATS: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("gif", ImageFormat::Gif),
    ("webp", ImageFormat::WebP),
];

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustBackend {
    quality: EncodeQuality,
    limits: OutputLimits,
}

impl RustBackend {
    pub fn new(quality: EncodeQuality, limits: OutputLimits) -> Self {
        Self { quality, limits }
    }
}

fn check_output(size: Dimensions, limits: OutputLimits) -> Result<(), BackendError> {
    if size.is_empty() {
        return Err(BackendError::EmptyOutput(size));
    }
    if !limits.admits(size) {
        return Err(BackendError::OutputTooLarge { size, limits });
    }
    Ok(())
}

fn unsupported(what: String) -> BackendError {
    BackendError::Unsupported {
        backend: NAME,
        what,
    }
}

fn image_format(name: &str) -> Option<ImageFormat> {
    FORMATS.iter().find(|(n, _)| *n == name).map(|(_, f)| *f)
}

fn decode(body: &[u8]) -> Result<DynamicImage, BackendError> {
    image::load_from_memory(body)
        .map_err(|e| BackendError::ProcessingFailed(format!("Failed to decode source: {e}")))
}

fn resize(img: DynamicImage, size: &SizeInstruction) -> Result<DynamicImage, BackendError> {
    let (width, height) = if size.enlarge {
        calculate_fit_dimensions((img.width(), img.height()), (size.width, size.height))
    } else {
        (size.width, size.height)
    };

    if width == 0 || height == 0 {
        return Err(BackendError::ProcessingFailed(format!(
            "Cannot resize to {width}x{height}"
        )));
    }
    if (width, height) == (img.width(), img.height()) {
        return Ok(img);
    }
    Ok(img.resize_exact(width, height, FilterType::Lanczos3))
}

/// Mirror first, then rotate clockwise.
fn rotate(img: DynamicImage, rotation: &RotationInstruction) -> Result<DynamicImage, BackendError> {
    let img = if rotation.flip { img.fliph() } else { img };
    let turns = quarter_turns(rotation.angle)
        .ok_or_else(|| unsupported(format!("rotation by {}°", rotation.angle)))?;

    Ok(match turns {
        1 => img.rotate90(),
        2 => img.rotate180(),
        3 => img.rotate270(),
        _ => img,
    })
}

fn apply_color(img: DynamicImage, quality: &str) -> Result<DynamicImage, BackendError> {
    let mode =
        ColorMode::from_quality(quality).ok_or_else(|| unsupported(format!("quality {quality:?}")))?;

    Ok(match mode {
        ColorMode::Unchanged => img,
        ColorMode::Gray => DynamicImage::ImageLuma8(img.to_luma8()),
        ColorMode::Bitonal => {
            let mut luma = img.to_luma8();
            for pixel in luma.pixels_mut() {
                pixel.0[0] = if pixel.0[0] >= ColorMode::BITONAL_THRESHOLD {
                    255
                } else {
                    0
                };
            }
            DynamicImage::ImageLuma8(luma)
        }
    })
}

fn encode(img: &DynamicImage, format: &str, quality: EncodeQuality) -> Result<Vec<u8>, BackendError> {
    let target = image_format(format).ok_or_else(|| unsupported(format!("format {format:?}")))?;
    let mut out = Cursor::new(Vec::new());
    let failed = |e: image::ImageError| {
        BackendError::ProcessingFailed(format!("Failed to encode {format}: {e}"))
    };

    match target {
        ImageFormat::Jpeg => {
            // JPEG has no alpha and no 16-bit mode.
            let img = match img.color() {
                ColorType::L8 | ColorType::Rgb8 => img.clone(),
                ColorType::La8 | ColorType::L16 | ColorType::La16 => {
                    DynamicImage::ImageLuma8(img.to_luma8())
                }
                _ => DynamicImage::ImageRgb8(img.to_rgb8()),
            };
            let quality = quality.value().min(100) as u8;
            img.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))
                .map_err(failed)?;
        }
        ImageFormat::Gif => {
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_to(&mut out, target)
                .map_err(failed)?;
        }
        ImageFormat::WebP => {
            let img = match img.color() {
                ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => img.clone(),
                _ => DynamicImage::ImageRgba8(img.to_rgba8()),
            };
            img.write_to(&mut out, target).map_err(failed)?;
        }
        _ => img.write_to(&mut out, target).map_err(failed)?,
    }

    Ok(out.into_inner())
}

impl ImageBackend for RustBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn identify(&self, body: &[u8]) -> Result<Dimensions, BackendError> {
        let (width, height) = ImageReader::new(Cursor::new(body))
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|e| BackendError::ProcessingFailed(format!("Failed to identify source: {e}")))?;
        Ok(Dimensions { width, height })
    }

    fn detect_format(&self, body: &[u8]) -> Option<&'static str> {
        let guessed = image::guess_format(body).ok()?;
        FORMATS.iter().find(|(_, f)| *f == guessed).map(|(n, _)| *n)
    }

    fn execute(&self, body: &[u8], plan: &RenderPlan) -> Result<Vec<u8>, BackendError> {
        check_output(plan.output_dimensions(), self.limits)?;
        let mut img = decode(body)?;

        if let Some(region) = &plan.region {
            img = img.crop_imm(region.x, region.y, region.width, region.height);
        }
        if let Some(size) = &plan.size {
            img = resize(img, size)?;
        }
        if let Some(rotation) = &plan.rotation {
            img = rotate(img, rotation)?;
        }
        img = apply_color(img, &plan.quality)?;

        encode(&img, &plan.format.format, self.quality)
    }
}
