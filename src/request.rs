//! Incoming IIIF image request paths.
//!
//! ```text
//! {identifier}/{region}/{size}/{rotation}/{quality}.{format}
//! ```
//!
//! The last four `/`-separated segments are fixed; everything before them is
//! the identifier, so an identifier may carry either escaped (`%2F`) or raw
//! slashes. Every segment is percent-decoded. Parsing checks shape only;
//! grammar and capability checks happen when a
//! [`Transformation`] is built from the request.

use crate::level::Compliance;
use crate::transform::{TransformError, Transformation};
use percent_encoding::percent_decode_str;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error(
        "Request must look like {{identifier}}/{{region}}/{{size}}/{{rotation}}/{{quality}}.{{format}}: {0:?}"
    )]
    Malformed(String),
    #[error("Request has no format suffix: {0:?}")]
    MissingFormat(String),
    #[error("Request segment is not valid percent-encoded UTF-8: {0:?}")]
    InvalidEncoding(String),
}

/// The six raw values of an image request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub identifier: String,
    pub region: String,
    pub size: String,
    pub rotation: String,
    pub quality: String,
    pub format: String,
}

impl ImageRequest {
    pub fn parse(path: &str) -> Result<Self, RequestError> {
        let trimmed = path.trim_start_matches('/');
        let malformed = || RequestError::Malformed(path.to_string());

        let mut segments = trimmed.rsplitn(5, '/');
        let (Some(last), Some(rotation), Some(size), Some(region), Some(identifier)) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(malformed());
        };

        let (quality, format) = last
            .rsplit_once('.')
            .ok_or_else(|| RequestError::MissingFormat(path.to_string()))?;
        if format.is_empty() {
            return Err(RequestError::MissingFormat(path.to_string()));
        }

        let request = Self {
            identifier: decode(identifier)?,
            region: decode(region)?,
            size: decode(size)?,
            rotation: decode(rotation)?,
            quality: decode(quality)?,
            format: decode(format)?,
        };

        let fields = [
            &request.identifier,
            &request.region,
            &request.size,
            &request.rotation,
            &request.quality,
        ];
        if fields.iter().any(|f| f.is_empty()) {
            return Err(malformed());
        }

        Ok(request)
    }

    /// Validate against `level` and build the transformation.
    pub fn transformation<'l>(
        &self,
        level: &'l dyn Compliance,
    ) -> Result<Transformation<'l>, TransformError> {
        Transformation::new(
            level,
            &self.region,
            &self.size,
            &self.rotation,
            &self.quality,
            &self.format,
        )
    }
}

fn decode(segment: &str) -> Result<String, RequestError> {
    percent_decode_str(segment)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| RequestError::InvalidEncoding(segment.to_string()))
}
