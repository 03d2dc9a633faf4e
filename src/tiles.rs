//! Tile seeding: pre-render the IIIF tile pyramid of an image.
//!
//! For a tile size `t` and scale factor `s`, the source is cut into regions
//! of `t·s` pixels (clamped at the right and bottom edges), each scaled down
//! by `s`:
//!
//! ```text
//! {id}/{x},{y},{w},{h}/{ceil(w/s)},{ceil(h/s)}/0/default.{format}
//! ```
//!
//! Sizes are given as explicit `w,h` because a lone `w,` keeps the aspect
//! ratio of the whole source, not of the region. A region that covers the
//! whole image is written as `full`. Rendering goes
//! through [`ImageService::render`], so with a derivative cache configured
//! each tile ends up cached under its canonical URI.

use crate::service::{ImageService, ServiceError};
use crate::types::Dimensions;
use rayon::prelude::*;
use serde::Serialize;

/// Region and size parameters of one tile request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileSpec {
    pub scale_factor: u32,
    pub region: String,
    pub size: String,
}

/// Every tile at one scale factor, across then down.
///
/// A zero tile size or scale factor, or an empty image, yields no tiles.
pub fn tile_specs(dims: Dimensions, tile_size: u32, scale_factor: u32) -> Vec<TileSpec> {
    let Some(side) = tile_size.checked_mul(scale_factor).filter(|s| *s > 0) else {
        return Vec::new();
    };
    if dims.is_empty() {
        return Vec::new();
    }

    let mut tiles = Vec::new();
    for y in (0..dims.height).step_by(side as usize) {
        for x in (0..dims.width).step_by(side as usize) {
            let w = side.min(dims.width - x);
            let h = side.min(dims.height - y);
            let region = if x == 0 && y == 0 && w == dims.width && h == dims.height {
                "full".to_string()
            } else {
                format!("{x},{y},{w},{h}")
            };
            tiles.push(TileSpec {
                scale_factor,
                region,
                size: format!("{},{}", w.div_ceil(scale_factor), h.div_ceil(scale_factor)),
            });
        }
    }
    tiles
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedOptions {
    pub tile_size: u32,
    pub scale_factors: Vec<u32>,
    pub format: String,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            tile_size: 512,
            scale_factors: vec![1, 2, 4, 8],
            format: "jpg".to_string(),
        }
    }
}

/// A tile that could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedFailure {
    /// Canonical URI when the request was valid, otherwise the raw parameters.
    pub uri: String,
    pub error: String,
}

/// Outcome of seeding one image.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SeedReport {
    pub id: String,
    pub dimensions: Option<Dimensions>,
    pub tiles: usize,
    pub rendered: usize,
    pub failures: Vec<SeedFailure>,
}

impl SeedReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Render every tile of `id` in parallel.
///
/// Failing to read or identify the source is an error. Individual tile
/// failures are collected in the report.
pub fn seed(
    service: &ImageService,
    id: &str,
    options: &SeedOptions,
) -> Result<SeedReport, ServiceError> {
    let dims = service.dimensions(id)?;
    let specs: Vec<TileSpec> = options
        .scale_factors
        .iter()
        .flat_map(|sf| tile_specs(dims, options.tile_size, *sf))
        .collect();

    tracing::info!(id, %dims, tiles = specs.len(), "seeding tiles");

    let failures: Vec<SeedFailure> = specs
        .par_iter()
        .filter_map(|spec| render_tile(service, id, spec, &options.format).err())
        .collect();

    for failure in &failures {
        tracing::warn!(uri = %failure.uri, error = %failure.error, "tile failed");
    }

    Ok(SeedReport {
        id: id.to_string(),
        dimensions: Some(dims),
        tiles: specs.len(),
        rendered: specs.len() - failures.len(),
        failures,
    })
}

fn render_tile(
    service: &ImageService,
    id: &str,
    spec: &TileSpec,
    format: &str,
) -> Result<(), SeedFailure> {
    let transformation = service
        .transformation(&spec.region, &spec.size, "0", "default", format)
        .map_err(|e| SeedFailure {
            uri: format!("{id}/{}/{}/0/default.{format}", spec.region, spec.size),
            error: e.to_string(),
        })?;
    let uri = transformation
        .to_uri(id)
        .unwrap_or_else(|_| format!("{id}/{}/{}", spec.region, spec.size));

    match service.render(id, &transformation) {
        Ok(_) => {
            tracing::debug!(uri = %uri, "tile rendered");
            Ok(())
        }
        Err(e) => Err(SeedFailure {
            uri,
            error: e.to_string(),
        }),
    }
}
