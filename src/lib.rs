//! # IIIF Image
//!
//! An IIIF Image API 2.1 transformation engine. Given an image identifier and
//! the five request parameters (region, size, rotation, quality, format), it
//! validates them against a compliance level, derives concrete pixel
//! instructions from the source's dimensions, and renders the derivative.
//!
//! # Architecture: Validate → Derive → Execute
//!
//! ```text
//! 1. Validate  parameters + level   →  Transformation       (grammar + capability checks)
//! 2. Derive    Transformation + WxH →  RenderPlan           (region, size, rotation, quality, format)
//! 3. Execute   RenderPlan + bytes   →  encoded derivative   (image backend)
//! ```
//!
//! The first two stages are pure: they never touch pixels or the filesystem,
//! so every edge case of the request grammar is unit tested without images.
//! Only the backend knows about codecs.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`level`] | Compliance levels: the [`Compliance`](level::Compliance) trait and data-driven capability tables for level0/1/2 |
//! | [`transform`] | [`Transformation`](transform::Transformation): validation, canonical URI, instruction derivation |
//! | [`request`] | Parsing `{id}/{region}/{size}/{rotation}/{quality}.{format}` request paths |
//! | [`imaging`] | Render plans and the pure-Rust image backend |
//! | [`source`] | Where source bytes come from |
//! | [`cache`] | Source and derivative caches, asynchronous cache population |
//! | [`service`] | Wires level, source, caches and backend into one request path |
//! | [`tiles`] | Tile pyramid seeding in parallel |
//! | [`config`] | `config.toml` loading, validation, and merging over stock defaults |
//! | [`types`] | Shared [`Dimensions`](types::Dimensions) |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Levels Are Data
//!
//! What a level accepts is a JSON capability table, not code. Each feature
//! carries a regular expression and a `supported` flag, so a value the
//! grammar knows but the level does not offer is reported as unsupported
//! rather than malformed. Custom tables can be loaded from disk. Levels are
//! plain values handed to each transformation; nothing is global.
//!
//! ## Region Bounds
//!
//! A pixel region running past the right or bottom edge is clamped to the
//! image. A region that starts outside the image, or has no area, is an
//! error instead of an empty crop.
//!
//! ## Bounded Output
//!
//! The request grammar allows sizes like `4294967295,4294967295`. Before
//! decoding, the planned output size is checked against configured width,
//! height and area limits. A request over those limits fails like any other
//! bad request.
//!
//! ## Pure-Rust Imaging
//!
//! The [`imaging`] module uses the `image` crate for every codec and
//! operation. The binary is fully self-contained: no ImageMagick, no libvips,
//! no system libraries.
//!
//! ## Caches Never Fail Requests
//!
//! Cache population runs on background writer threads behind bounded queues.
//! A full queue or a failed store is logged and forgotten.

pub mod cache;
pub mod config;
pub mod imaging;
pub mod level;
pub mod output;
pub mod request;
pub mod service;
pub mod source;
pub mod tiles;
pub mod transform;
pub mod types;
