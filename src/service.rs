//! The image service: turns `(identifier, transformation)` into bytes.
//!
//! ```text
//! derivative cache ─hit─→ bytes
//!        │ miss
//!        ▼
//! source cache ─miss─→ source ─→ (queue source for caching)
//!        │
//!        ├─ no transformation, same format ─→ source bytes as-is
//!        ▼
//! identify → plan → execute ─→ (queue derivative for caching) ─→ bytes
//! ```
//!
//! Derivatives are keyed by the canonical URI of the request. `default` is
//! resolved before the URI is built, so it shares an entry with the level's
//! concrete default quality. Cache population goes through a
//! [`CacheWriter`] and never fails a request. A cache that stores nothing
//! gets no writer, so nothing is copied or queued for it.

use crate::cache::{Cache, CacheWriter, build_cache};
use crate::config::Config;
use crate::imaging::{self, BackendError, EncodeQuality, ImageBackend, RenderError, RenderPlan, Rendered};
use crate::level::{Level, LevelError};
use crate::request::{ImageRequest, RequestError};
use crate::source::{DiskSource, Source, SourceError};
use crate::transform::{TransformError, Transformation};
use crate::types::Dimensions;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Level(#[from] LevelError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("Image processing failed: {0}")]
    Backend(#[from] BackendError),
    #[error("Failed to start cache writer: {0}")]
    CacheWriter(#[source] std::io::Error),
}

/// Collaborators wired into an [`ImageService`].
pub struct ServiceParts {
    pub level: Level,
    pub backend: Box<dyn ImageBackend>,
    pub source: Box<dyn Source>,
    pub source_cache: Arc<dyn Cache>,
    pub derivative_cache: Arc<dyn Cache>,
    pub queue_capacity: usize,
}

pub struct ImageService {
    level: Level,
    backend: Box<dyn ImageBackend>,
    source: Box<dyn Source>,
    source_cache: Arc<dyn Cache>,
    derivative_cache: Arc<dyn Cache>,
    source_writer: Option<CacheWriter>,
    derivative_writer: Option<CacheWriter>,
}

/// A writer for `cache`, or none when it would discard every write.
fn spawn_writer(
    name: &'static str,
    cache: &Arc<dyn Cache>,
    capacity: usize,
) -> Result<Option<CacheWriter>, ServiceError> {
    if !cache.stores() {
        return Ok(None);
    }
    CacheWriter::spawn(name, cache.clone(), capacity)
        .map(Some)
        .map_err(ServiceError::CacheWriter)
}

impl ImageService {
    pub fn new(parts: ServiceParts) -> Result<Self, ServiceError> {
        let source_writer = spawn_writer("source", &parts.source_cache, parts.queue_capacity)?;
        let derivative_writer =
            spawn_writer("derivatives", &parts.derivative_cache, parts.queue_capacity)?;

        Ok(Self {
            level: parts.level,
            backend: parts.backend,
            source: parts.source,
            source_cache: parts.source_cache,
            derivative_cache: parts.derivative_cache,
            source_writer,
            derivative_writer,
        })
    }

    /// Build every collaborator from a validated configuration.
    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        let level = config.level.resolve()?;
        let backend = config
            .graphics
            .backend
            .build(
                EncodeQuality::new(config.graphics.jpeg_quality),
                config.graphics.output_limits(),
            );
        let caches = &config.cache;

        tracing::info!(
            level = level.name(),
            backend = backend.name(),
            source = %config.source.root.display(),
            "image service ready"
        );

        Self::new(ServiceParts {
            level,
            backend,
            source: Box::new(DiskSource::new(&config.source.root)),
            source_cache: build_cache(
                caches.source.kind,
                &caches.source.root,
                caches.source.max_entries,
            ),
            derivative_cache: build_cache(
                caches.derivatives.kind,
                &caches.derivatives.root,
                caches.derivatives.max_entries,
            ),
            queue_capacity: caches.queue_capacity,
        })
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn backend(&self) -> &dyn ImageBackend {
        self.backend.as_ref()
    }

    /// Validate raw parameters against this service's level.
    pub fn transformation(
        &self,
        region: &str,
        size: &str,
        rotation: &str,
        quality: &str,
        format: &str,
    ) -> Result<Transformation<'_>, TransformError> {
        Transformation::new(&self.level, region, size, rotation, quality, format)
    }

    /// Source bytes for `id`, preferring the source cache.
    pub fn load_source(&self, id: &str) -> Result<Vec<u8>, ServiceError> {
        if let Some(body) = self.source_cache.get(id) {
            tracing::debug!(id, "source cache hit");
            return Ok(body);
        }
        tracing::debug!(id, "source cache miss");
        let body = self.source.read(id)?;
        if let Some(writer) = &self.source_writer {
            writer.enqueue(id, body.clone());
        }
        Ok(body)
    }

    /// Render a derivative of `id`.
    pub fn render(
        &self,
        id: &str,
        transformation: &Transformation<'_>,
    ) -> Result<Rendered, ServiceError> {
        let key = transformation.to_uri(id)?;
        let format = transformation.format_instructions()?.format;

        if let Some(body) = self.derivative_cache.get(&key) {
            tracing::debug!(key = %key, "derivative cache hit");
            return Ok(Rendered::new(body, &format));
        }

        let body = self.load_source(id)?;
        if !transformation.has_transformation()
            && self.backend.detect_format(&body) == Some(format.as_str())
        {
            tracing::debug!(key = %key, "passing source through");
            return Ok(Rendered::new(body, &format));
        }

        let rendered = imaging::render(self.backend.as_ref(), &body, transformation)?;
        tracing::debug!(key = %key, bytes = rendered.body.len(), "rendered");
        if let Some(writer) = &self.derivative_writer {
            writer.enqueue(&key, rendered.body.clone());
        }
        Ok(rendered)
    }

    /// Render from bytes already in hand, bypassing source and caches.
    pub fn render_from(
        &self,
        body: &[u8],
        transformation: &Transformation<'_>,
    ) -> Result<Rendered, ServiceError> {
        Ok(imaging::render(self.backend.as_ref(), body, transformation)?)
    }

    /// Parse a request path and render it.
    pub fn render_request(&self, path: &str) -> Result<Rendered, ServiceError> {
        let request = ImageRequest::parse(path)?;
        let transformation = request.transformation(&self.level)?;
        self.render(&request.identifier, &transformation)
    }

    /// The plan a request would execute, without executing it.
    pub fn plan(
        &self,
        id: &str,
        transformation: &Transformation<'_>,
    ) -> Result<RenderPlan, ServiceError> {
        let dims = self.dimensions(id)?;
        Ok(RenderPlan::new(transformation, dims)?)
    }

    /// Pixel size of the source image.
    pub fn dimensions(&self, id: &str) -> Result<Dimensions, ServiceError> {
        let body = self.load_source(id)?;
        Ok(self.backend.identify(&body)?)
    }

    /// Flush queued cache writes and stop the writer threads.
    pub fn shutdown(&self) {
        for writer in [&self.source_writer, &self.derivative_writer]
            .into_iter()
            .flatten()
        {
            writer.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, NullCache};
    use crate::imaging::backend::tests::MockBackend;
    use crate::source::MemorySource;

    struct Harness {
        service: ImageService,
        backend: Arc<MockBackend>,
        derivatives: Arc<MemoryCache>,
        sources: Arc<MemoryCache>,
    }

    impl Harness {
        fn executed(&self) -> usize {
            self.backend.executed_plans().len()
        }
    }

    fn harness(backend: MockBackend) -> Harness {
        let backend = Arc::new(backend);
        let derivatives = Arc::new(MemoryCache::new(16));
        let sources = Arc::new(MemoryCache::new(16));
        let service = ImageService::new(ServiceParts {
            level: Level::builtin("level2").unwrap(),
            backend: Box::new(backend.clone()),
            source: Box::new(MemorySource::new(b"original".to_vec())),
            source_cache: sources.clone(),
            derivative_cache: derivatives.clone(),
            queue_capacity: 8,
        })
        .unwrap();
        Harness {
            service,
            backend,
            derivatives,
            sources,
        }
    }

    #[test]
    fn identity_request_passes_source_through() {
        let h = harness(MockBackend::with_dimensions(100, 100));
        let t = h
            .service
            .transformation("full", "full", "0", "default", "jpg")
            .unwrap();

        let rendered = h.service.render("a", &t).unwrap();
        assert_eq!(rendered.body, b"original");
        assert_eq!(rendered.content_type, "image/jpeg");
        assert_eq!(h.executed(), 0);
    }

    #[test]
    fn identity_request_with_other_format_renders() {
        let h = harness(MockBackend::with_dimensions(100, 100));
        let t = h
            .service
            .transformation("full", "full", "0", "default", "png")
            .unwrap();

        let rendered = h.service.render("a", &t).unwrap();
        assert_eq!(rendered.body, b"png");
        assert_eq!(h.executed(), 1);
    }

    #[test]
    fn render_populates_both_caches() {
        let h = harness(MockBackend::with_dimensions(100, 100));
        let t = h
            .service
            .transformation("full", "50,", "0", "gray", "png")
            .unwrap();

        h.service.render("a", &t).unwrap();
        h.service.shutdown();

        assert_eq!(h.sources.get("a"), Some(b"original".to_vec()));
        assert_eq!(
            h.derivatives.get("a/full/50,/0/gray.png"),
            Some(b"png".to_vec())
        );
    }

    #[test]
    fn derivative_cache_hit_skips_backend() {
        let h = harness(MockBackend::with_dimensions(100, 100));
        h.derivatives
            .set("a/full/50,/0/color.jpg", b"cached")
            .unwrap();
        let t = h
            .service
            .transformation("full", "50,", "0", "default", "jpg")
            .unwrap();

        let rendered = h.service.render("a", &t).unwrap();
        assert_eq!(rendered.body, b"cached");
        assert_eq!(rendered.format, "jpg");
        assert_eq!(h.executed(), 0);
    }

    #[test]
    fn render_request_parses_and_validates() {
        let h = harness(MockBackend::with_dimensions(100, 100));
        assert!(h.service.render_request("a/full/max/0/default.png").is_ok());
        assert!(matches!(
            h.service.render_request("a/full/max/45/default.png"),
            Err(ServiceError::Transform(TransformError::Compliance(
                LevelError::Unsupported { .. }
            )))
        ));
        assert!(matches!(
            h.service.render_request("nothing-here"),
            Err(ServiceError::Request(_))
        ));
    }

    #[test]
    fn dimensions_and_plan_use_identify() {
        let h = harness(MockBackend::with_dimensions(640, 480));
        assert_eq!(h.service.dimensions("a").unwrap(), Dimensions::new(640, 480));

        let t = h
            .service
            .transformation("square", "full", "0", "default", "jpg")
            .unwrap();
        let plan = h.service.plan("a", &t).unwrap();
        assert_eq!(plan.region.unwrap().width, 480);
    }

    #[test]
    fn render_from_bypasses_caches() {
        let derivatives = Arc::new(MemoryCache::new(4));
        let service = ImageService::new(ServiceParts {
            level: Level::builtin("level1").unwrap(),
            backend: Box::new(MockBackend::with_dimensions(10, 10)),
            source: Box::new(MemorySource::default()),
            source_cache: Arc::new(NullCache),
            derivative_cache: derivatives.clone(),
            queue_capacity: 1,
        })
        .unwrap();
        let t = service
            .transformation("full", "5,", "0", "default", "jpg")
            .unwrap();

        let rendered = service.render_from(b"bytes", &t).unwrap();
        service.shutdown();
        assert_eq!(rendered.body, b"jpg");
        assert!(derivatives.is_empty());
    }

    #[test]
    fn null_caches_get_no_writer() {
        let service = ImageService::new(ServiceParts {
            level: Level::builtin("level2").unwrap(),
            backend: Box::new(MockBackend::with_dimensions(10, 10)),
            source: Box::new(MemorySource::default()),
            source_cache: Arc::new(NullCache),
            derivative_cache: Arc::new(NullCache),
            queue_capacity: 1,
        })
        .unwrap();
        assert!(service.source_writer.is_none());
        assert!(service.derivative_writer.is_none());

        // Repeated renders with a one-slot queue never touch a writer.
        let t = service
            .transformation("full", "5,", "0", "default", "png")
            .unwrap();
        for _ in 0..4 {
            assert!(service.render("a", &t).is_ok());
        }
        service.shutdown();
    }

    #[test]
    fn storing_caches_get_writers() {
        let h = harness(MockBackend::with_dimensions(10, 10));
        assert!(h.service.source_writer.is_some());
        assert!(h.service.derivative_writer.is_some());
    }
}
