//! Service configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! the base layer; a user `config.toml` in the chosen directory overrides
//! just the keys it sets.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [level]
//! compliance = "level2"      # level0, level1, level2 (or 0, 1, 2)
//! # spec = "my-level.json"   # Custom capability table instead of a built-in
//!
//! [graphics]
//! backend = "rust"           # Image backend
//! jpeg_quality = 90          # JPEG encode quality (1-100)
//! max_width = 16384          # Widest derivative rendered
//! max_height = 16384         # Tallest derivative rendered
//! max_area = 100000000       # Most pixels in one derivative
//!
//! [source]
//! root = "images"            # Directory identifiers are resolved under
//!
//! [cache]
//! queue_capacity = 64        # Pending cache writes before new ones are dropped
//!
//! [cache.source]
//! kind = "none"              # none, memory, disk
//! root = "cache/source"      # Used by kind = "disk"
//! max_entries = 64           # Used by kind = "memory"
//!
//! [cache.derivatives]
//! kind = "none"
//! root = "cache/derivatives"
//! max_entries = 256
//!
//! [processing]
//! max_processes = 4          # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Relative paths are resolved against the working directory.
//!
//! ## Partial Configuration
//!
//! Config files are sparse. Override just the values you want:
//!
//! ```toml
//! [cache.derivatives]
//! kind = "disk"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::cache::CacheKind;
use crate::imaging::{BackendKind, OutputLimits};
use crate::level::{Level, LevelError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Service configuration loaded from `config.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Which compliance level requests are validated against.
    pub level: LevelConfig,
    /// Backend selection and encoding.
    pub graphics: GraphicsConfig,
    /// Where source images live.
    pub source: SourceConfig,
    /// Source and derivative caches.
    pub cache: CacheConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.level.spec.is_none() && Level::builtin(&self.level.compliance).is_err() {
            return Err(ConfigError::Validation(format!(
                "level.compliance must be level0, level1 or level2, got {:?}",
                self.level.compliance
            )));
        }
        if !(1..=100).contains(&self.graphics.jpeg_quality) {
            return Err(ConfigError::Validation(
                "graphics.jpeg_quality must be 1-100".into(),
            ));
        }
        let graphics = &self.graphics;
        if graphics.max_width == 0 || graphics.max_height == 0 || graphics.max_area == 0 {
            return Err(ConfigError::Validation(
                "graphics.max_width, max_height and max_area must be non-zero".into(),
            ));
        }
        if self.cache.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "cache.queue_capacity must be non-zero".into(),
            ));
        }
        for (name, cache) in [
            ("source", &self.cache.source),
            ("derivatives", &self.cache.derivatives),
        ] {
            if cache.kind == CacheKind::Memory && cache.max_entries == 0 {
                return Err(ConfigError::Validation(format!(
                    "cache.{name}.max_entries must be non-zero for a memory cache"
                )));
            }
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Compliance level selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LevelConfig {
    /// Built-in level name.
    pub compliance: String,
    /// Custom capability table (JSON). Takes precedence over `compliance`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<PathBuf>,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            compliance: "level2".to_string(),
            spec: None,
        }
    }
}

impl LevelConfig {
    /// Load the configured level.
    pub fn resolve(&self) -> Result<Level, LevelError> {
        match &self.spec {
            Some(path) => Level::from_file(path),
            None => Level::builtin(&self.compliance),
        }
    }
}

/// Image backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraphicsConfig {
    pub backend: BackendKind,
    /// JPEG encoding quality (1 = worst, 100 = best).
    pub jpeg_quality: u32,
    /// Largest output width in pixels.
    pub max_width: u32,
    /// Largest output height in pixels.
    pub max_height: u32,
    /// Largest output area (width × height) in pixels.
    pub max_area: u64,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        let limits = OutputLimits::default();
        Self {
            backend: BackendKind::Rust,
            jpeg_quality: 90,
            max_width: limits.max_width,
            max_height: limits.max_height,
            max_area: limits.max_area,
        }
    }
}

impl GraphicsConfig {
    pub fn output_limits(&self) -> OutputLimits {
        OutputLimits {
            max_width: self.max_width,
            max_height: self.max_height,
            max_area: self.max_area,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub root: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("images"),
        }
    }
}

/// Cache settings shared by the source and derivative caches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Pending writes per cache before new writes are dropped.
    pub queue_capacity: usize,
    pub source: CacheSettings,
    pub derivatives: CacheSettings,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            source: CacheSettings::new("cache/source", 64),
            derivatives: CacheSettings::new("cache/derivatives", 256),
        }
    }
}

/// One cache store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    pub kind: CacheKind,
    /// Directory for `disk` caches.
    pub root: PathBuf,
    /// Entry limit for `memory` caches.
    pub max_entries: usize,
}

impl CacheSettings {
    fn new(root: &str, max_entries: usize) -> Self {
        Self {
            kind: CacheKind::None,
            root: PathBuf::from(root),
            max_entries,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::new("cache", 64)
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(Config::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no `config.toml` exists in the directory.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<Config, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(dir: &Path) -> Result<Config, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(dir)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# IIIF Image Service Configuration
# ================================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Only the keys you want to override are needed.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Compliance level
# ---------------------------------------------------------------------------
[level]
# Built-in IIIF Image API 2.1 level: level0, level1 or level2.
compliance = "level2"

# Path to a custom capability table (JSON). When set, `compliance` is ignored
# and the level is named after the file stem.
# spec = "levels/custom.json"

# ---------------------------------------------------------------------------
# Graphics
# ---------------------------------------------------------------------------
[graphics]
# Image backend. Only "rust" (pure Rust, statically linked) is available.
backend = "rust"

# JPEG encoding quality (1 = worst, 100 = best).
jpeg_quality = 90

# Largest derivative the backend will render. Requests for a bigger output
# fail before the source is decoded. `iiif-image info` reports them.
max_width = 16384
max_height = 16384
max_area = 100000000

# ---------------------------------------------------------------------------
# Source images
# ---------------------------------------------------------------------------
[source]
# Identifiers are relative paths under this directory.
root = "images"

# ---------------------------------------------------------------------------
# Caches
# ---------------------------------------------------------------------------
[cache]
# Cache writes waiting to be stored, per cache. When the queue is full new
# writes are dropped (and logged); requests are never slowed down.
queue_capacity = 64

# Original source bytes, keyed by identifier.
[cache.source]
# none, memory or disk
kind = "none"
# Directory for the disk cache.
root = "cache/source"
# Entry limit for the memory cache (oldest evicted first).
max_entries = 64

# Rendered derivatives, keyed by canonical request URI.
[cache.derivatives]
kind = "none"
root = "cache/derivatives"
max_entries = 256

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image-processing workers (tile seeding).
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.level.compliance, "level2");
        assert_eq!(config.level.spec, None);
        assert_eq!(config.graphics.backend, BackendKind::Rust);
        assert_eq!(config.graphics.jpeg_quality, 90);
        assert_eq!(config.source.root, PathBuf::from("images"));
        assert_eq!(config.cache.queue_capacity, 64);
        assert_eq!(config.cache.source.kind, CacheKind::None);
        assert_eq!(config.cache.derivatives.max_entries, 256);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[cache.derivatives]
kind = "disk"
root = "/var/cache/iiif"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        // Overridden values
        assert_eq!(config.cache.derivatives.kind, CacheKind::Disk);
        assert_eq!(config.cache.derivatives.root, PathBuf::from("/var/cache/iiif"));
        // Defaults preserved
        assert_eq!(config.cache.derivatives.max_entries, 64);
        assert_eq!(config.graphics.jpeg_quality, 90);
    }

    #[test]
    fn unknown_keys_rejected() {
        let result: Result<Config, _> = toml::from_str("[graphics]\nqualty = 80\n");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_backend_rejected() {
        let result: Result<Config, _> = toml::from_str("[graphics]\nbackend = \"magick\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_cache_kind_rejected() {
        let result: Result<Config, _> = toml::from_str("[cache.source]\nkind = \"redis\"\n");
        assert!(result.is_err());
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_overrides_nested_keys_only() {
        let base = stock_defaults_value();
        let overlay: toml::Value = toml::from_str("[cache.source]\nkind = \"memory\"\n").unwrap();
        let config: Config = merge_toml(base, overlay).try_into().unwrap();

        assert_eq!(config.cache.source.kind, CacheKind::Memory);
        // Sibling keys survive from the stock layer.
        assert_eq!(config.cache.source.root, PathBuf::from("cache/source"));
        assert_eq!(config.cache.source.max_entries, 64);
    }

    #[test]
    fn merge_replaces_scalars() {
        let base: toml::Value = toml::from_str("a = 1\nb = 2").unwrap();
        let overlay: toml::Value = toml::from_str("b = 3").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"].as_integer(), Some(1));
        assert_eq!(merged["b"].as_integer(), Some(3));
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("config.toml"),
            r#"
[level]
compliance = "1"

[graphics]
jpeg_quality = 75

[source]
root = "/srv/images"
"#,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.level.compliance, "1");
        assert_eq!(config.graphics.jpeg_quality, 75);
        assert_eq!(config.source.root, PathBuf::from("/srv/images"));
        // Unspecified values should be defaults
        assert_eq!(config.cache.queue_capacity, 64);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "this is not valid toml [[[").unwrap();

        let result = load_config(tmp.path());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_unknown_backend_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("config.toml"),
            "[graphics]\nbackend = \"vips\"\n",
        )
        .unwrap();

        assert!(matches!(load_config(tmp.path()), Err(ConfigError::Toml(_))));
    }

    // =========================================================================
    // Validation tests
    // =========================================================================

    fn invalid(mutate: impl FnOnce(&mut Config)) -> String {
        let mut config = Config::default();
        mutate(&mut config);
        match config.validate() {
            Err(ConfigError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_unknown_level() {
        assert!(invalid(|c| c.level.compliance = "level3".into()).contains("level.compliance"));
    }

    #[test]
    fn validate_skips_level_name_with_custom_spec() {
        let mut config = Config::default();
        config.level.compliance = "ignored".into();
        config.level.spec = Some(PathBuf::from("custom.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_jpeg_quality_range() {
        assert!(invalid(|c| c.graphics.jpeg_quality = 0).contains("jpeg_quality"));
        assert!(invalid(|c| c.graphics.jpeg_quality = 101).contains("jpeg_quality"));
    }

    #[test]
    fn validate_output_limits_non_zero() {
        assert!(invalid(|c| c.graphics.max_width = 0).contains("max_width"));
        assert!(invalid(|c| c.graphics.max_area = 0).contains("max_area"));
    }

    #[test]
    fn graphics_limits_from_toml() {
        let config: Config =
            toml::from_str("[graphics]\nmax_width = 800\nmax_area = 480000\n").unwrap();
        assert_eq!(
            config.graphics.output_limits(),
            OutputLimits {
                max_width: 800,
                max_height: OutputLimits::DEFAULT_MAX_SIDE,
                max_area: 480_000,
            }
        );
    }

    #[test]
    fn validate_queue_capacity() {
        assert!(invalid(|c| c.cache.queue_capacity = 0).contains("queue_capacity"));
    }

    #[test]
    fn validate_memory_cache_needs_entries() {
        let msg = invalid(|c| {
            c.cache.derivatives.kind = CacheKind::Memory;
            c.cache.derivatives.max_entries = 0;
        });
        assert!(msg.contains("cache.derivatives.max_entries"));
    }

    #[test]
    fn validate_max_processes_non_zero() {
        assert!(invalid(|c| c.processing.max_processes = Some(0)).contains("max_processes"));
    }

    #[test]
    fn level_config_resolves_builtin() {
        let level = LevelConfig {
            compliance: "0".into(),
            spec: None,
        }
        .resolve()
        .unwrap();
        assert_eq!(level.name(), "level0");
    }

    // =========================================================================
    // Stock config
    // =========================================================================

    #[test]
    fn stock_config_toml_matches_defaults() {
        let config: Config = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, Config::default());
    }

    // =========================================================================
    // Processing config tests
    // =========================================================================

    #[test]
    fn default_processing_config() {
        let config = ProcessingConfig::default();
        assert_eq!(config.max_processes, None);
    }

    #[test]
    fn effective_threads_auto() {
        let config = ProcessingConfig {
            max_processes: None,
        };
        let threads = effective_threads(&config);
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(threads, cores);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let config = ProcessingConfig {
            max_processes: Some(99999),
        };
        let threads = effective_threads(&config);
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(threads, cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }
}
