//! Global plate-carrée tile grid (EPSG:4326).
//!
//! Longitude maps linearly to x and latitude to y, so the world is a 2:1
//! rectangle: zoom 0 holds two tiles side by side and each zoom doubles both
//! axes from there. Resolution is degrees per pixel, `180 / tile_size / 2^z`.

use crate::geo::{pixels_to_tile, BoundingBox, MAX_ZOOM};

/// Plate-carrée grid for a fixed tile size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalGeodetic {
    tile_size: u32,
}

impl Default for GlobalGeodetic {
    fn default() -> Self {
        Self::new(256)
    }
}

impl GlobalGeodetic {
    pub fn new(tile_size: u32) -> Self {
        Self { tile_size }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Degrees per pixel at the given zoom level.
    pub fn resolution(&self, zoom: u8) -> f64 {
        180.0 / f64::from(self.tile_size) / (1u64 << zoom) as f64
    }

    /// Converts WGS84 degrees to a pyramid pixel position at the given zoom.
    ///
    /// Pixel (0, 0) is the south-west corner of the world, (-180, -90).
    pub fn lon_lat_to_pixels(&self, lon: f64, lat: f64, zoom: u8) -> (f64, f64) {
        let res = self.resolution(zoom);
        ((180.0 + lon) / res, (90.0 + lat) / res)
    }

    /// TMS tile containing the given WGS84 position.
    pub fn lon_lat_to_tile(&self, lon: f64, lat: f64, zoom: u8) -> (i64, i64) {
        let (px, py) = self.lon_lat_to_pixels(lon, lat, zoom);
        pixels_to_tile(px, py, self.tile_size)
    }

    /// Extent of a TMS tile in WGS84 degrees.
    pub fn tile_bounds(&self, tx: i64, ty: i64, zoom: u8) -> BoundingBox {
        let res = self.resolution(zoom);
        let ts = f64::from(self.tile_size);
        BoundingBox::new(
            tx as f64 * ts * res - 180.0,
            ty as f64 * ts * res - 90.0,
            (tx + 1) as f64 * ts * res - 180.0,
            (ty + 1) as f64 * ts * res - 90.0,
        )
    }

    /// Extent of a TMS tile ordered south, west, north, east.
    pub fn tile_lat_lon_bounds(&self, tx: i64, ty: i64, zoom: u8) -> (f64, f64, f64, f64) {
        let b = self.tile_bounds(tx, ty, zoom);
        (b.min_y, b.min_x, b.max_y, b.max_x)
    }

    /// Finest zoom level whose resolution is at least as coarse as the given
    /// pixel size, clamped to `0..=MAX_ZOOM`.
    pub fn zoom_for_pixel_size(&self, pixel_size: f64) -> u8 {
        for i in 0..=MAX_ZOOM {
            if pixel_size > self.resolution(i) {
                return i.saturating_sub(1);
            }
        }
        MAX_ZOOM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_is_exact_for_256_tiles() {
        let grid = GlobalGeodetic::new(256);
        assert_eq!(grid.resolution(0), 0.703125);
        assert_eq!(grid.resolution(1), 0.3515625);
    }

    #[test]
    fn resolution_halves_per_zoom() {
        let grid = GlobalGeodetic::new(256);
        for z in 0..MAX_ZOOM {
            assert_eq!(grid.resolution(z + 1), grid.resolution(z) / 2.0);
        }
    }

    #[test]
    fn zoom_for_pixel_size_inverts_resolution_exactly() {
        let grid = GlobalGeodetic::new(256);
        for z in 0..=MAX_ZOOM {
            assert_eq!(grid.zoom_for_pixel_size(grid.resolution(z)), z);
        }
        assert_eq!(grid.zoom_for_pixel_size(1e6), 0);
        assert_eq!(grid.zoom_for_pixel_size(1e-15), MAX_ZOOM);
    }

    #[test]
    fn world_is_two_tiles_wide_at_zoom_zero() {
        let grid = GlobalGeodetic::new(256);
        assert_eq!(grid.lon_lat_to_tile(-179.9, -89.9, 0), (0, 0));
        assert_eq!(grid.lon_lat_to_tile(0.1, 0.1, 0), (1, 0));
        assert_eq!(grid.lon_lat_to_tile(180.0, 90.0, 0), (1, 0));
    }

    #[test]
    fn prime_meridian_splits_the_hemisphere_tiles() {
        let grid = GlobalGeodetic::new(256);
        let west = grid.tile_bounds(0, 0, 0);
        assert_eq!(
            (west.min_x, west.min_y, west.max_x, west.max_y),
            (-180.0, -90.0, 0.0, 90.0)
        );
        let east = grid.tile_bounds(1, 0, 0);
        assert_eq!(
            (east.min_x, east.min_y, east.max_x, east.max_y),
            (0.0, -90.0, 180.0, 90.0)
        );
    }

    #[test]
    fn zoom_one_tile_spans_ninety_degrees() {
        let grid = GlobalGeodetic::new(256);
        let b = grid.tile_bounds(0, 0, 1);
        assert_eq!((b.min_x, b.min_y, b.max_x, b.max_y), (-180.0, -90.0, -90.0, 0.0));
        let b = grid.tile_bounds(3, 1, 1);
        assert_eq!((b.min_x, b.min_y, b.max_x, b.max_y), (90.0, 0.0, 180.0, 90.0));
    }

    #[test]
    fn swne_ordering_matches_bounds() {
        let grid = GlobalGeodetic::new(256);
        let (s, w, n, e) = grid.tile_lat_lon_bounds(1, 0, 0);
        assert_eq!((s, w, n, e), (-90.0, 0.0, 90.0, 180.0));
    }

    #[test]
    fn pixel_origin_is_the_south_west_corner() {
        let grid = GlobalGeodetic::new(256);
        assert_eq!(grid.lon_lat_to_pixels(-180.0, -90.0, 0), (0.0, 0.0));
        assert_eq!(grid.lon_lat_to_pixels(180.0, 90.0, 0), (512.0, 256.0));
    }
}
