//! High-level image operations.
//!
//! These functions combine instruction derivation with backend execution.
//! A [`RenderPlan`] fixes the protocol's order of implementation:
//!
//! ```text
//! region → size → rotation → quality → format
//! ```
//!
//! Steps that would not change the image are left out of the plan: the crop
//! for `full`, the resize for `full`/`max`, and an unmirrored `0` rotation.

use super::backend::{BackendError, ImageBackend};
use super::calculations::{calculate_fit_dimensions, quarter_turns};
use super::params::content_type;
use crate::transform::{
    FormatInstruction, RegionInstruction, RotationInstruction, SizeInstruction, TransformError,
    Transformation,
};
use crate::types::Dimensions;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("Image processing failed: {0}")]
    Backend(#[from] BackendError),
}

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, RenderError>;

/// Ordered, backend-agnostic description of one derivative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderPlan {
    pub source: Dimensions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<RegionInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<SizeInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<RotationInstruction>,
    pub quality: String,
    pub format: FormatInstruction,
}

impl RenderPlan {
    /// Derive every instruction the transformation needs for `source`.
    ///
    /// Size is derived against the source, not the cropped region.
    pub fn new(transformation: &Transformation<'_>, source: Dimensions) -> std::result::Result<Self, TransformError> {
        let region = match transformation.region() {
            "full" => None,
            _ => Some(transformation.region_instructions(source)?),
        };

        let size = match transformation.size() {
            "full" | "max" => None,
            _ => Some(transformation.size_instructions(source)?),
        };

        let rotation = Some(transformation.rotation_instructions()?).filter(|r| !r.is_noop());

        Ok(Self {
            source,
            region,
            size,
            rotation,
            quality: transformation.quality().to_string(),
            format: transformation.format_instructions()?,
        })
    }

    /// Pixel size of the encoded output, known before anything is decoded.
    pub fn output_dimensions(&self) -> Dimensions {
        let cropped = self
            .region
            .map_or(self.source, |r| Dimensions::new(r.width, r.height));

        let (width, height) = match &self.size {
            Some(size) if size.enlarge => calculate_fit_dimensions(
                (cropped.width, cropped.height),
                (size.width, size.height),
            ),
            Some(size) => (size.width, size.height),
            None => (cropped.width, cropped.height),
        };

        let sideways = self
            .rotation
            .and_then(|r| quarter_turns(r.angle))
            .is_some_and(|turns| turns % 2 == 1);
        if sideways {
            Dimensions::new(height, width)
        } else {
            Dimensions::new(width, height)
        }
    }

    /// One human-readable line per step, in execution order.
    pub fn steps(&self) -> Vec<String> {
        let mut steps = Vec::new();
        if let Some(region) = &self.region {
            steps.push(region.to_string());
        }
        if let Some(size) = &self.size {
            steps.push(size.to_string());
        }
        if let Some(rotation) = &self.rotation {
            steps.push(rotation.to_string());
        }
        steps.push(format!("[quality] {}", self.quality));
        steps.push(self.format.to_string());
        steps
    }
}

/// Encoded output of a render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub body: Vec<u8>,
    /// Canonical format name, e.g. `jpg`.
    pub format: String,
    pub content_type: &'static str,
}

impl Rendered {
    pub fn new(body: Vec<u8>, format: &str) -> Self {
        Self {
            body,
            format: format.to_string(),
            content_type: content_type(format).unwrap_or("application/octet-stream"),
        }
    }
}

/// Identify the source, plan, and execute on `backend`.
pub fn render(
    backend: &dyn ImageBackend,
    body: &[u8],
    transformation: &Transformation<'_>,
) -> Result<Rendered> {
    let source = backend.identify(body)?;
    let plan = RenderPlan::new(transformation, source)?;
    for step in plan.steps() {
        tracing::debug!(backend = backend.name(), "{step}");
    }
    let output = backend.execute(body, &plan)?;
    Ok(Rendered::new(output, &plan.format.format))
}
