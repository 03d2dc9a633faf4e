//! Pure derivation functions: request syntax + source dimensions → instructions.
//!
//! All functions here are pure and testable without any I/O or images.
//! Rounding follows the IIIF reference behaviour exactly: percentages round
//! up (`ceil`), aspect-preserving sizes truncate.

use super::TransformError;
use super::instructions::{
    FormatInstruction, RegionInstruction, RotationInstruction, SizeInstruction,
};
use crate::level::FeatureTable;
use crate::types::Dimensions;

/// Derive the crop rectangle for a region parameter.
///
/// Accepts `square`, `x,y,w,h` and `pct:x,y,w,h`. `full` is not handled here;
/// callers skip the crop step for it.
///
/// A rectangle that runs past the right or bottom edge is clamped to the
/// image. One whose origin is negative or lies outside the image, or that has
/// no area, is rejected.
pub fn region_instruction(
    region: &str,
    dims: Dimensions,
) -> Result<RegionInstruction, TransformError> {
    if dims.is_empty() {
        return Err(TransformError::EmptyImage(dims));
    }

    if region == "square" {
        return Ok(square_region(dims));
    }

    match region.split_once(':') {
        None => {
            let [x, y, w, h] = split_four(region, region, |s| s.parse::<i64>().ok())?;
            bounded_region(region, (x, y, w, h), dims)
        }
        Some(("pct", rest)) => {
            let [px, py, pw, ph] = split_four(region, rest, parse_finite)?;
            let width = dims.width as f64;
            let height = dims.height as f64;
            let rect = (
                ((width * px) / 100.0).ceil() as i64,
                ((height * py) / 100.0).ceil() as i64,
                ((width * pw) / 100.0).ceil() as i64,
                ((height * ph) / 100.0).ceil() as i64,
            );
            bounded_region(region, rect, dims)
        }
        Some(_) => Err(TransformError::UnrecognizedRegion(region.to_string())),
    }
}

/// Largest centered square; the crop is centered along the long axis.
pub fn square_region(dims: Dimensions) -> RegionInstruction {
    let side = dims.width.min(dims.height);
    let (x, y) = if dims.width > dims.height {
        ((dims.width - dims.height) / 2, 0)
    } else {
        (0, (dims.height - dims.width) / 2)
    };

    RegionInstruction {
        x,
        y,
        width: side,
        height: side,
    }
}

fn split_four<T>(
    region: &str,
    values: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<[T; 4], TransformError> {
    let invalid = || TransformError::InvalidRegion(region.to_string());
    let parsed = values
        .split(',')
        .map(|part| parse(part).ok_or_else(invalid))
        .collect::<Result<Vec<T>, _>>()?;
    <[T; 4]>::try_from(parsed).map_err(|_| invalid())
}

fn parse_finite(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Validate the origin, then clamp the far edges to the image.
fn bounded_region(
    region: &str,
    (x, y, w, h): (i64, i64, i64, i64),
    dims: Dimensions,
) -> Result<RegionInstruction, TransformError> {
    let width = i64::from(dims.width);
    let height = i64::from(dims.height);

    if x < 0 || y < 0 || x >= width || y >= height {
        return Err(TransformError::RegionOutOfBounds(region.to_string()));
    }
    if w <= 0 || h <= 0 {
        return Err(TransformError::EmptyRegion(region.to_string()));
    }

    // Origin is inside the image, so every value below fits in u32.
    Ok(RegionInstruction {
        x: x as u32,
        y: y as u32,
        width: w.min(width - x) as u32,
        height: h.min(height - y) as u32,
    })
}

/// Derive output dimensions for a size parameter.
///
/// | Syntax | Result |
/// |---|---|
/// | `w,h` | exactly `w` x `h`, `force` |
/// | `!w,h` | fit inside `w` x `h`, `enlarge` |
/// | `w,` | width `w`, height scaled to keep the aspect ratio |
/// | `,h` | height `h`, width scaled to keep the aspect ratio |
/// | `pct:n` | both sides scaled by `n` percent, rounded up |
///
/// `full` and `max` are not handled here; callers skip the resize step.
pub fn size_instruction(size: &str, dims: Dimensions) -> Result<SizeInstruction, TransformError> {
    let invalid = || TransformError::InvalidSize(size.to_string());

    match size.split_once(':') {
        None => {
            let (best_fit, rest) = match size.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, size),
            };

            let Some((w, h)) = rest.split_once(',').filter(|(_, h)| !h.contains(',')) else {
                return Err(invalid());
            };

            let (width, height, force, enlarge) =
                match (w.parse::<u32>().ok(), h.parse::<u32>().ok()) {
                    (Some(w), Some(h)) => (w, h, !best_fit, best_fit),
                    (Some(w), None) => (w, scale_side(dims.height, w, dims.width, dims)?, false, false),
                    (None, Some(h)) => (scale_side(dims.width, h, dims.height, dims)?, h, false, false),
                    (None, None) => return Err(invalid()),
                };

            Ok(SizeInstruction {
                width,
                height,
                force,
                enlarge,
            })
        }
        Some(("pct", pct)) => {
            let pct = parse_finite(pct).ok_or_else(invalid)?;
            Ok(SizeInstruction {
                width: (pct / 100.0 * dims.width as f64).ceil() as u32,
                height: (pct / 100.0 * dims.height as f64).ceil() as u32,
                force: false,
                enlarge: false,
            })
        }
        Some(_) => Err(invalid()),
    }
}

/// `other * target / side`, truncating, in 64-bit to avoid overflow.
fn scale_side(other: u32, target: u32, side: u32, dims: Dimensions) -> Result<u32, TransformError> {
    if side == 0 {
        return Err(TransformError::EmptyImage(dims));
    }
    let scaled = u64::from(other) * u64::from(target) / u64::from(side);
    Ok(u32::try_from(scaled).unwrap_or(u32::MAX))
}

/// Parse `n` or `!n` (mirror, then rotate by `n` degrees).
pub fn rotation_instruction(rotation: &str) -> Result<RotationInstruction, TransformError> {
    let (flip, angle) = match rotation.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, rotation),
    };

    let angle =
        parse_finite(angle).ok_or_else(|| TransformError::InvalidRotation(rotation.to_string()))?;

    Ok(RotationInstruction { flip, angle })
}

/// First format in table order whose pattern matches the requested token.
pub fn format_instruction(
    table: &FeatureTable,
    format: &str,
) -> Result<FormatInstruction, TransformError> {
    table
        .iter()
        .find(|(_, feature)| feature.matches(format))
        .map(|(name, _)| FormatInstruction {
            format: name.to_string(),
        })
        .ok_or_else(|| TransformError::UnresolvableFormat(format.to_string()))
}
