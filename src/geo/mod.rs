//! Tile-grid math for the supported coordinate profiles.
//!
//! Everything in this module tree is pure arithmetic — no I/O, no raster
//! access — so the tile layout of a run can be computed and tested without
//! touching pixels.
//!
//! | Module | Role |
//! |--------|------|
//! | [`mercator`] | Global spherical-mercator grid (EPSG:3857), one tile across at zoom 0 |
//! | [`geodetic`] | Global plate-carrée grid (EPSG:4326), two tiles across at zoom 0 |
//! | [`profile`] | Profile selection and dispatch, including the raster-native pyramid |
//! | [`window`] | Tile extent → raster read/write window mapping with edge clipping |
//!
//! Tile coordinates are TMS throughout: `(0, 0)` is the bottom-left tile and
//! y grows northward. Coordinates are signed (`i64`) because the raw grid
//! math can land outside the world range before clipping.

pub mod geodetic;
pub mod mercator;
pub mod profile;
pub mod window;

pub use profile::{Profile, ProfileKind};

/// Highest zoom level any profile will derive or accept.
pub const MAX_ZOOM: u8 = 31;

/// Axis-aligned bounding box in profile units (meters for mercator, degrees
/// for geodetic, source georeferenced units for raster-native).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Tile covering the given pixel position: `ceil(p / tile_size) - 1`.
///
/// Shared by both global grids. A pixel exactly on a tile seam belongs to
/// the tile below/left of the seam, which is what makes a full-world raster
/// resolve to tile (0, 0) at zoom 0 instead of (1, 1).
pub(crate) fn pixels_to_tile(px: f64, py: f64, tile_size: u32) -> (i64, i64) {
    let ts = f64::from(tile_size);
    let tx = (px / ts).ceil() as i64 - 1;
    let ty = (py / ts).ceil() as i64 - 1;
    (tx, ty)
}
