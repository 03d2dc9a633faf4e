//! Compliance levels: which request syntaxes and values a server accepts.
//!
//! The transformation core never hard-codes the IIIF grammar tables. It asks
//! a [`Compliance`] implementation whether each parameter is acceptable and
//! which concrete quality `default` stands for. [`Level`] is the data-driven
//! implementation backed by a [`ComplianceSpec`].
//!
//! | Level | Region | Size | Rotation | Quality | Format |
//! |---|---|---|---|---|---|
//! | `level0` | full | full, max | 0 | default | jpg |
//! | `level1` | + x,y,w,h | + w, ,h pct:n | 0 | default | jpg |
//! | `level2` | + square, pct: | + w,h !w,h | + 90s, mirroring | + color gray bitonal | + png tif gif webp |
//!
//! Levels are ordinary values. Pass the one you want to each
//! [`Transformation`](crate::transform::Transformation); several may coexist
//! in one process.

mod spec;

pub use spec::{ComplianceSpec, Feature, FeatureTable, ImageSpec};

use std::fmt;
use std::path::Path;
use thiserror::Error;

const LEVEL0_SPEC: &str = include_str!("specs/level0.json");
const LEVEL1_SPEC: &str = include_str!("specs/level1.json");
const LEVEL2_SPEC: &str = include_str!("specs/level2.json");

/// Names accepted by [`Level::builtin`].
pub const BUILTIN_LEVELS: &[&str] = &["level0", "level1", "level2"];

/// The five request parameters a level rules on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    Region,
    Size,
    Rotation,
    Quality,
    Format,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Parameter::Region => "region",
            Parameter::Size => "size",
            Parameter::Rotation => "rotation",
            Parameter::Quality => "quality",
            Parameter::Format => "format",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LevelError {
    #[error("Invalid IIIF 2.1 {parameter}: {value:?}")]
    Invalid { parameter: Parameter, value: String },
    #[error("Unsupported IIIF 2.1 {parameter} at {level}: {value:?} ({feature})")]
    Unsupported {
        parameter: Parameter,
        value: String,
        feature: String,
        level: String,
    },
    #[error("Unable to determine default quality for {0}")]
    NoDefaultQuality(String),
    #[error("Unknown compliance level: {0}")]
    UnknownLevel(String),
    #[error("Invalid compliance spec for {name}: {message}")]
    Spec { name: String, message: String },
}

/// Capability oracle consulted while building a transformation.
///
/// Every validator returns `Ok(())` when the value is acceptable, otherwise
/// the error that should reach the caller unchanged.
pub trait Compliance: Send + Sync {
    fn is_valid_image_region(&self, region: &str) -> Result<(), LevelError>;
    fn is_valid_image_size(&self, size: &str) -> Result<(), LevelError>;
    fn is_valid_image_rotation(&self, rotation: &str) -> Result<(), LevelError>;
    fn is_valid_image_quality(&self, quality: &str) -> Result<(), LevelError>;
    fn is_valid_image_format(&self, format: &str) -> Result<(), LevelError>;

    /// The concrete quality name that a requested `default` stands for.
    fn default_quality(&self) -> Result<String, LevelError>;

    /// Raw capability tables, used for format resolution.
    fn spec(&self) -> &ComplianceSpec;
}

/// A named compliance level backed by a capability table.
#[derive(Debug, Clone)]
pub struct Level {
    name: String,
    spec: ComplianceSpec,
}

impl Level {
    pub fn new(name: impl Into<String>, spec: ComplianceSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }

    /// One of the embedded IIIF 2.1 levels. Accepts `level2` or just `2`.
    pub fn builtin(name: &str) -> Result<Self, LevelError> {
        let (canonical, json) = match name {
            "level0" | "0" => ("level0", LEVEL0_SPEC),
            "level1" | "1" => ("level1", LEVEL1_SPEC),
            "level2" | "2" => ("level2", LEVEL2_SPEC),
            other => return Err(LevelError::UnknownLevel(other.to_string())),
        };
        Self::from_json(canonical, json)
    }

    pub fn from_json(name: &str, json: &str) -> Result<Self, LevelError> {
        let spec: ComplianceSpec = serde_json::from_str(json).map_err(|e| LevelError::Spec {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::new(name, spec))
    }

    /// Load a custom capability table. The level is named after the file stem.
    pub fn from_file(path: &Path) -> Result<Self, LevelError> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("custom")
            .to_string();
        let json = std::fs::read_to_string(path).map_err(|e| LevelError::Spec {
            name: name.clone(),
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_json(&name, &json)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// IIIF profile URI advertised for this level.
    pub fn profile_uri(&self) -> String {
        format!("http://iiif.io/api/image/2/{}.json", self.name)
    }

    fn table(&self, parameter: Parameter) -> &FeatureTable {
        let image = &self.spec.image;
        match parameter {
            Parameter::Region => &image.region,
            Parameter::Size => &image.size,
            Parameter::Rotation => &image.rotation,
            Parameter::Quality => &image.quality,
            Parameter::Format => &image.format,
        }
    }

    /// First supported feature matching `value` wins. A value that only
    /// matches unsupported features is reported as unsupported, one that
    /// matches nothing as invalid.
    fn check(&self, parameter: Parameter, value: &str) -> Result<(), LevelError> {
        let mut unsupported = None;
        for (name, feature) in self.table(parameter).iter() {
            if !feature.matches(value) {
                continue;
            }
            if feature.supported {
                return Ok(());
            }
            unsupported.get_or_insert(name);
        }

        Err(match unsupported {
            Some(feature) => LevelError::Unsupported {
                parameter,
                value: value.to_string(),
                feature: feature.to_string(),
                level: self.name.clone(),
            },
            None => LevelError::Invalid {
                parameter,
                value: value.to_string(),
            },
        })
    }
}

impl Compliance for Level {
    fn is_valid_image_region(&self, region: &str) -> Result<(), LevelError> {
        self.check(Parameter::Region, region)
    }

    fn is_valid_image_size(&self, size: &str) -> Result<(), LevelError> {
        self.check(Parameter::Size, size)
    }

    fn is_valid_image_rotation(&self, rotation: &str) -> Result<(), LevelError> {
        self.check(Parameter::Rotation, rotation)
    }

    fn is_valid_image_quality(&self, quality: &str) -> Result<(), LevelError> {
        self.check(Parameter::Quality, quality)
    }

    fn is_valid_image_format(&self, format: &str) -> Result<(), LevelError> {
        self.check(Parameter::Format, format)
    }

    fn default_quality(&self) -> Result<String, LevelError> {
        self.spec
            .image
            .quality
            .iter()
            .find(|(_, f)| f.default && f.supported)
            .map(|(name, _)| name.to_string())
            .ok_or_else(|| LevelError::NoDefaultQuality(self.name.clone()))
    }

    fn spec(&self) -> &ComplianceSpec {
        &self.spec
    }
}
