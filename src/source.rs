//! Where source image bytes come from.
//!
//! A [`Source`] maps an image identifier to the encoded bytes of the
//! original. [`DiskSource`] resolves identifiers as relative paths under a
//! root directory; [`MemorySource`] serves a fixed buffer and exists for
//! tests and one-shot CLI renders.

use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("image {id:?} not found")]
    NotFound { id: String },
    #[error("identifier {id:?} escapes the source root")]
    InvalidIdentifier { id: String },
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fetches the encoded bytes of an original image.
pub trait Source: Send + Sync {
    fn read(&self, id: &str) -> Result<Vec<u8>, SourceError>;
}

/// Images stored as files below a root directory.
#[derive(Debug, Clone)]
pub struct DiskSource {
    root: PathBuf,
}

impl DiskSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an identifier to a path under the root.
    ///
    /// Only plain relative components are allowed.
    pub fn resolve(&self, id: &str) -> Result<PathBuf, SourceError> {
        let relative = Path::new(id);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if id.is_empty() || !plain {
            return Err(SourceError::InvalidIdentifier { id: id.to_string() });
        }
        Ok(self.root.join(relative))
    }
}

impl Source for DiskSource {
    fn read(&self, id: &str) -> Result<Vec<u8>, SourceError> {
        let path = self.resolve(id)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SourceError::NotFound { id: id.to_string() })
            }
            Err(source) => Err(SourceError::Io { path, source }),
        }
    }
}

/// Serves the same buffer for every identifier.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    body: Vec<u8>,
}

impl MemorySource {
    pub fn new(body: Vec<u8>) -> Self {
        Self { body }
    }
}

impl Source for MemorySource {
    fn read(&self, _id: &str) -> Result<Vec<u8>, SourceError> {
        Ok(self.body.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn disk_source_reads_nested_identifier() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("maps")).unwrap();
        fs::write(tmp.path().join("maps/north.jpg"), b"pixels").unwrap();

        let source = DiskSource::new(tmp.path());
        assert_eq!(source.read("maps/north.jpg").unwrap(), b"pixels");
    }

    #[test]
    fn disk_source_missing_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let source = DiskSource::new(tmp.path());
        assert!(matches!(
            source.read("absent.jpg"),
            Err(SourceError::NotFound { .. })
        ));
    }

    #[test]
    fn disk_source_rejects_escaping_identifiers() {
        let source = DiskSource::new("/srv/images");
        for id in ["../etc/passwd", "a/../../b", "/etc/passwd", ""] {
            assert!(
                matches!(source.resolve(id), Err(SourceError::InvalidIdentifier { .. })),
                "{id:?} should be rejected"
            );
        }
    }

    #[test]
    fn disk_source_resolves_under_root() {
        let source = DiskSource::new("/srv/images");
        assert_eq!(
            source.resolve("a/b.png").unwrap(),
            PathBuf::from("/srv/images/a/b.png")
        );
    }

    #[test]
    fn memory_source_ignores_identifier() {
        let source = MemorySource::new(b"abc".to_vec());
        assert_eq!(source.read("one").unwrap(), b"abc");
        assert_eq!(source.read("two").unwrap(), b"abc");
    }
}
