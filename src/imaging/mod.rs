//! Image processing in pure Rust, statically linked.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions` |
//! | **Detect format** | `image::guess_format` |
//! | **Execute plan** | crop, Lanczos3 resize, mirror/rotate, luma, encode |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Encode quality, color modes, output limits, content types
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: [`RenderPlan`] and [`render`], joining transformation and backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend};
pub use calculations::{calculate_fit_dimensions, quarter_turns};
pub use operations::{RenderError, RenderPlan, Rendered, render};
pub use params::{ColorMode, EncodeQuality, OutputLimits, content_type};
pub use rust_backend::RustBackend;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of backends selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// [`RustBackend`], built on the `image` crate.
    #[default]
    Rust,
}

impl BackendKind {
    pub fn build(self, quality: EncodeQuality, limits: OutputLimits) -> Box<dyn ImageBackend> {
        match self {
            BackendKind::Rust => Box::new(RustBackend::new(quality, limits)),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Rust => f.write_str("rust"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_builds_named_backend() {
        let backend = BackendKind::Rust.build(EncodeQuality::default(), OutputLimits::default());
        assert_eq!(backend.name(), "rust");
        assert_eq!(BackendKind::Rust.to_string(), "rust");
    }

    #[test]
    fn backend_kind_from_toml_name() {
        #[derive(Deserialize)]
        struct Wrapper {
            backend: BackendKind,
        }
        let w: Wrapper = toml::from_str(r#"backend = "rust""#).unwrap();
        assert_eq!(w.backend, BackendKind::Rust);
        assert!(toml::from_str::<Wrapper>(r#"backend = "magick""#).is_err());
    }
}
