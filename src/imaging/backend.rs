//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations every backend must
//! support: identify, detect_format, and execute. Backends receive fully
//! derived [`RenderPlan`]s and never see IIIF syntax.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). Backends form a closed
//! set named by [`BackendKind`](super::BackendKind) and are chosen once from
//! configuration.

use super::operations::RenderPlan;
use super::params::OutputLimits;
use crate::types::Dimensions;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("{backend} backend does not support {what}")]
    Unsupported {
        backend: &'static str,
        what: String,
    },
    #[error("Output of {0} has no pixels")]
    EmptyOutput(Dimensions),
    #[error(
        "Output of {size} exceeds the limit of {}x{} and {} pixels",
        .limits.max_width, .limits.max_height, .limits.max_area
    )]
    OutputTooLarge {
        size: Dimensions,
        limits: OutputLimits,
    },
}

/// Trait for image processing backends.
///
/// Every backend must implement all operations so the rest of the codebase
/// is backend-agnostic.
pub trait ImageBackend: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Get image dimensions without a full decode where possible.
    fn identify(&self, body: &[u8]) -> Result<Dimensions, BackendError>;

    /// Canonical format name (`jpg`, `png`, ...) of encoded bytes, if known.
    fn detect_format(&self, body: &[u8]) -> Option<&'static str>;

    /// Apply a plan to encoded source bytes and return encoded output.
    fn execute(&self, body: &[u8], plan: &RenderPlan) -> Result<Vec<u8>, BackendError>;
}

impl<B: ImageBackend + ?Sized> ImageBackend for std::sync::Arc<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn identify(&self, body: &[u8]) -> Result<Dimensions, BackendError> {
        (**self).identify(body)
    }

    fn detect_format(&self, body: &[u8]) -> Option<&'static str> {
        (**self).detect_format(body)
    }

    fn execute(&self, body: &[u8], plan: &RenderPlan) -> Result<Vec<u8>, BackendError> {
        (**self).execute(body, plan)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mock backend that records operations without executing them.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    #[derive(Default)]
    pub struct MockBackend {
        pub dimensions: Option<Dimensions>,
        pub format: Option<&'static str>,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Identify(usize),
        Execute { bytes: usize, plan: RenderPlan },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_dimensions(width: u32, height: u32) -> Self {
            Self {
                dimensions: Some(Dimensions::new(width, height)),
                format: Some("jpg"),
                operations: Mutex::new(Vec::new()),
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn executed_plans(&self) -> Vec<RenderPlan> {
            self.get_operations()
                .into_iter()
                .filter_map(|op| match op {
                    RecordedOp::Execute { plan, .. } => Some(plan),
                    RecordedOp::Identify(_) => None,
                })
                .collect()
        }
    }

    impl ImageBackend for MockBackend {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn identify(&self, body: &[u8]) -> Result<Dimensions, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Identify(body.len()));

            self.dimensions
                .ok_or_else(|| BackendError::ProcessingFailed("No mock dimensions".to_string()))
        }

        fn detect_format(&self, _body: &[u8]) -> Option<&'static str> {
            self.format
        }

        fn execute(&self, body: &[u8], plan: &RenderPlan) -> Result<Vec<u8>, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Execute {
                bytes: body.len(),
                plan: plan.clone(),
            });
            Ok(plan.format.format.as_bytes().to_vec())
        }
    }

    #[test]
    fn mock_records_identify() {
        let backend = MockBackend::with_dimensions(800, 600);

        let result = backend.identify(b"abc").unwrap();
        assert_eq!(result, Dimensions::new(800, 600));

        let ops = backend.get_operations();
        assert_eq!(ops, vec![RecordedOp::Identify(3)]);
    }

    #[test]
    fn mock_without_dimensions_errors() {
        let backend = MockBackend::new();
        assert!(backend.identify(b"").is_err());
    }

    #[test]
    fn unsupported_error_names_backend() {
        let err = BackendError::Unsupported {
            backend: "rust",
            what: "rotation by 45°".into(),
        };
        assert_eq!(err.to_string(), "rust backend does not support rotation by 45°");
    }
}
