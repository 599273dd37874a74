//! Coordinate profile selection and dispatch.
//!
//! A profile decides how the tile pyramid is addressed: the two global
//! profiles tile a fixed world extent in projected units, while the
//! raster-native profile tiles the source's own pixel grid, deriving a
//! synthetic "native" zoom from the raster dimensions.

use std::fmt;

use serde::Serialize;

use crate::geo::geodetic::GlobalGeodetic;
use crate::geo::mercator::GlobalMercator;
use crate::geo::BoundingBox;

/// Which tiling scheme a run uses. This is the user-facing selector; the
/// matching grid math lives in [`Profile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    /// Global spherical mercator, EPSG:3857.
    Mercator,
    /// Global plate carrée, EPSG:4326.
    Geodetic,
    /// The source raster's own pixel grid, no reprojection of any kind.
    Raster,
}

impl ProfileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileKind::Mercator => "mercator",
            ProfileKind::Geodetic => "geodetic",
            ProfileKind::Raster => "raster",
        }
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pixel-grid pyramid for the raster-native profile.
///
/// The native zoom is the smallest level at which one tile pixel covers at
/// most one source pixel, `ceil(log2(max_dimension / tile_size))`. Base
/// tiles are cut at that level and coarser levels cover `2^(native - z)`
/// source pixels per tile pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterGrid {
    tile_size: u32,
    size_x: u64,
    size_y: u64,
    native_zoom: u8,
}

impl RasterGrid {
    pub fn new(tile_size: u32, size_x: u64, size_y: u64) -> Self {
        let largest = size_x.max(size_y).max(1) as f64 / f64::from(tile_size);
        // Rasters smaller than one tile still get a single level.
        let native_zoom = largest.log2().ceil().max(0.0) as u8;
        Self {
            tile_size,
            size_x,
            size_y,
            native_zoom,
        }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn native_zoom(&self) -> u8 {
        self.native_zoom
    }

    /// Source pixels covered by one tile edge at the given zoom. Fractional
    /// above the native zoom, where tiles oversample the source.
    pub fn tile_span(&self, zoom: u8) -> f64 {
        f64::from(self.tile_size) * 2f64.powi(i32::from(self.native_zoom) - i32::from(zoom))
    }

    /// Inclusive maximum tile index per axis at the given zoom.
    pub fn matrix_max(&self, zoom: u8) -> (i64, i64) {
        let span = self.tile_span(zoom);
        (
            (self.size_x as f64 / span).ceil() as i64 - 1,
            (self.size_y as f64 / span).ceil() as i64 - 1,
        )
    }
}

/// A selected profile with its grid math attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Profile {
    Mercator(GlobalMercator),
    Geodetic(GlobalGeodetic),
    Raster(RasterGrid),
}

impl Profile {
    /// Builds the grid for `kind`. The raster dimensions only matter for
    /// [`ProfileKind::Raster`], which derives its pyramid from them.
    pub fn new(kind: ProfileKind, tile_size: u32, raster_size: (u64, u64)) -> Self {
        match kind {
            ProfileKind::Mercator => Profile::Mercator(GlobalMercator::new(tile_size)),
            ProfileKind::Geodetic => Profile::Geodetic(GlobalGeodetic::new(tile_size)),
            ProfileKind::Raster => {
                Profile::Raster(RasterGrid::new(tile_size, raster_size.0, raster_size.1))
            }
        }
    }

    pub fn kind(&self) -> ProfileKind {
        match self {
            Profile::Mercator(_) => ProfileKind::Mercator,
            Profile::Geodetic(_) => ProfileKind::Geodetic,
            Profile::Raster(_) => ProfileKind::Raster,
        }
    }

    pub fn tile_size(&self) -> u32 {
        match self {
            Profile::Mercator(g) => g.tile_size(),
            Profile::Geodetic(g) => g.tile_size(),
            Profile::Raster(g) => g.tile_size(),
        }
    }

    /// Spatial reference of the tile grid, if the profile fixes one. The
    /// raster profile inherits whatever reference the source carries.
    pub fn srs(&self) -> Option<&'static str> {
        match self {
            Profile::Mercator(_) => Some("EPSG:3857"),
            Profile::Geodetic(_) => Some("EPSG:4326"),
            Profile::Raster(_) => None,
        }
    }

    /// Inclusive maximum tile index per axis for the whole world (or the
    /// whole raster) at the given zoom.
    pub fn world_tile_max(&self, zoom: u8) -> (i64, i64) {
        match self {
            Profile::Mercator(_) => ((1i64 << zoom) - 1, (1i64 << zoom) - 1),
            Profile::Geodetic(_) => ((1i64 << (zoom + 1)) - 1, (1i64 << zoom) - 1),
            Profile::Raster(g) => g.matrix_max(zoom),
        }
    }

    /// Raw tile range covering `bounds` at the given zoom, before clipping
    /// to the world range. Corner positions that land exactly on the grid
    /// origin resolve to index -1, so callers must clamp.
    pub fn tiles_for_bounds(&self, bounds: &BoundingBox, zoom: u8) -> ((i64, i64), (i64, i64)) {
        match self {
            Profile::Mercator(g) => (
                g.meters_to_tile(bounds.min_x, bounds.min_y, zoom),
                g.meters_to_tile(bounds.max_x, bounds.max_y, zoom),
            ),
            Profile::Geodetic(g) => (
                g.lon_lat_to_tile(bounds.min_x, bounds.min_y, zoom),
                g.lon_lat_to_tile(bounds.max_x, bounds.max_y, zoom),
            ),
            Profile::Raster(g) => ((0, 0), g.matrix_max(zoom)),
        }
    }

    /// Zoom range this raster naturally spans: the minimum fits the whole
    /// raster in one tile, the maximum matches the source pixel size.
    pub fn derive_zoom(&self, pixel_width: f64, raster_size: (u64, u64)) -> (u8, u8) {
        match self {
            Profile::Mercator(g) => {
                let span = pixel_width * raster_size.0.max(raster_size.1) as f64
                    / f64::from(g.tile_size());
                (g.zoom_for_pixel_size(span), g.zoom_for_pixel_size(pixel_width))
            }
            Profile::Geodetic(g) => {
                let span = pixel_width * raster_size.0.max(raster_size.1) as f64
                    / f64::from(g.tile_size());
                (g.zoom_for_pixel_size(span), g.zoom_for_pixel_size(pixel_width))
            }
            Profile::Raster(g) => (0, g.native_zoom()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Raster-native grid
    // ========================================================================

    #[test]
    fn native_zoom_from_power_of_two_dimensions() {
        let g = RasterGrid::new(256, 2048, 1024);
        assert_eq!(g.native_zoom(), 3);
    }

    #[test]
    fn native_zoom_rounds_up_for_odd_dimensions() {
        let g = RasterGrid::new(256, 2049, 1024);
        assert_eq!(g.native_zoom(), 4);
        let g = RasterGrid::new(256, 700, 500);
        assert_eq!(g.native_zoom(), 2);
    }

    #[test]
    fn tiny_raster_clamps_to_zoom_zero() {
        let g = RasterGrid::new(256, 64, 64);
        assert_eq!(g.native_zoom(), 0);
        assert_eq!(g.matrix_max(0), (0, 0));
    }

    #[test]
    fn tile_span_doubles_per_level_out() {
        let g = RasterGrid::new(256, 2048, 1024);
        assert_eq!(g.tile_span(3), 256.0);
        assert_eq!(g.tile_span(2), 512.0);
        assert_eq!(g.tile_span(0), 2048.0);
        // Above the native zoom a tile covers less than a tile of pixels.
        assert_eq!(g.tile_span(4), 128.0);
    }

    #[test]
    fn matrix_shrinks_toward_zoom_zero() {
        let g = RasterGrid::new(256, 2048, 1024);
        assert_eq!(g.matrix_max(3), (7, 3));
        assert_eq!(g.matrix_max(2), (3, 1));
        assert_eq!(g.matrix_max(1), (1, 0));
        assert_eq!(g.matrix_max(0), (0, 0));
    }

    #[test]
    fn matrix_covers_partial_edge_tiles() {
        let g = RasterGrid::new(256, 700, 500);
        assert_eq!(g.native_zoom(), 2);
        // 700/256 = 2.73 -> three columns, 500/256 = 1.95 -> two rows.
        assert_eq!(g.matrix_max(2), (2, 1));
    }

    // ========================================================================
    // Profile dispatch
    // ========================================================================

    #[test]
    fn kinds_round_trip_through_construction() {
        for kind in [ProfileKind::Mercator, ProfileKind::Geodetic, ProfileKind::Raster] {
            let p = Profile::new(kind, 256, (512, 512));
            assert_eq!(p.kind(), kind);
            assert_eq!(p.tile_size(), 256);
        }
    }

    #[test]
    fn fixed_srs_only_for_global_profiles() {
        assert_eq!(
            Profile::new(ProfileKind::Mercator, 256, (1, 1)).srs(),
            Some("EPSG:3857")
        );
        assert_eq!(
            Profile::new(ProfileKind::Geodetic, 256, (1, 1)).srs(),
            Some("EPSG:4326")
        );
        assert_eq!(Profile::new(ProfileKind::Raster, 256, (1, 1)).srs(), None);
    }

    #[test]
    fn world_tile_max_per_profile() {
        let m = Profile::new(ProfileKind::Mercator, 256, (1, 1));
        assert_eq!(m.world_tile_max(0), (0, 0));
        assert_eq!(m.world_tile_max(3), (7, 7));
        let g = Profile::new(ProfileKind::Geodetic, 256, (1, 1));
        assert_eq!(g.world_tile_max(0), (1, 0));
        assert_eq!(g.world_tile_max(2), (7, 3));
    }

    #[test]
    fn mercator_world_bounds_need_clamping() {
        let shift = 20037508.342789244;
        let p = Profile::new(ProfileKind::Mercator, 256, (1, 1));
        let world = BoundingBox::new(-shift, -shift, shift, shift);
        // The south-west corner sits exactly on the grid origin and produces
        // the off-grid index -1.
        assert_eq!(p.tiles_for_bounds(&world, 0), ((-1, -1), (0, 0)));
        assert_eq!(p.tiles_for_bounds(&world, 1), ((-1, -1), (1, 1)));
    }

    #[test]
    fn derived_zoom_tracks_pixel_size() {
        let p = Profile::new(ProfileKind::Mercator, 256, (1, 1));
        let res5 = match &p {
            Profile::Mercator(g) => g.resolution(5),
            _ => unreachable!(),
        };
        // A 256px raster at the zoom 5 resolution spans exactly one tile.
        assert_eq!(p.derive_zoom(res5, (256, 256)), (5, 5));
        // Four times as wide: the overview minimum moves out two levels.
        assert_eq!(p.derive_zoom(res5, (1024, 512)), (3, 5));
    }

    #[test]
    fn raster_profile_spans_zero_to_native() {
        let p = Profile::new(ProfileKind::Raster, 256, (2048, 1024));
        assert_eq!(p.derive_zoom(1.0, (2048, 1024)), (0, 3));
    }
}
