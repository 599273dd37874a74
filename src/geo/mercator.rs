//! Global spherical-mercator tile grid (EPSG:3857).
//!
//! The grid covers the square from -20037508.34m to +20037508.34m on both
//! axes, so zoom 0 is a single tile and every zoom level doubles the tile
//! count per axis. Latitude coverage tops out at ±85.05112878° where the
//! square runs out.
//!
//! All conversions are driven by two derived constants:
//!
//! * `initial_resolution` — meters per pixel at zoom 0,
//!   `2π · 6378137 / tile_size`
//! * `origin_shift` — half the world circumference, `2π · 6378137 / 2`

use crate::geo::{pixels_to_tile, BoundingBox, MAX_ZOOM};

/// WGS84 spheroid radius in meters.
const EARTH_RADIUS: f64 = 6378137.0;

/// Spherical-mercator grid for a fixed tile size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalMercator {
    tile_size: u32,
    initial_resolution: f64,
    origin_shift: f64,
}

impl Default for GlobalMercator {
    fn default() -> Self {
        Self::new(256)
    }
}

impl GlobalMercator {
    pub fn new(tile_size: u32) -> Self {
        Self {
            tile_size,
            initial_resolution: 2.0 * std::f64::consts::PI * EARTH_RADIUS / f64::from(tile_size),
            origin_shift: std::f64::consts::PI * EARTH_RADIUS,
        }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Half the world circumference; the grid spans ±this on both axes.
    pub fn origin_shift(&self) -> f64 {
        self.origin_shift
    }

    /// Meters per pixel at the given zoom level.
    ///
    /// # Examples
    ///
    /// ```
    /// use tilebake::geo::mercator::GlobalMercator;
    ///
    /// let grid = GlobalMercator::new(256);
    /// assert_eq!(grid.resolution(0), 156543.03392804097);
    /// assert_eq!(grid.resolution(1), grid.resolution(0) / 2.0);
    /// ```
    pub fn resolution(&self, zoom: u8) -> f64 {
        self.initial_resolution / (1u64 << zoom) as f64
    }

    /// Converts WGS84 lat/lon in degrees to mercator meters.
    pub fn lat_lon_to_meters(&self, lat: f64, lon: f64) -> (f64, f64) {
        let mx = lon * self.origin_shift / 180.0;
        let my = ((90.0 + lat) * std::f64::consts::PI / 360.0).tan().ln()
            / (std::f64::consts::PI / 180.0);
        let my = my * self.origin_shift / 180.0;
        (mx, my)
    }

    /// Converts mercator meters to WGS84 lat/lon in degrees.
    pub fn meters_to_lat_lon(&self, mx: f64, my: f64) -> (f64, f64) {
        let lon = mx / self.origin_shift * 180.0;
        let lat = my / self.origin_shift * 180.0;
        let lat = 180.0 / std::f64::consts::PI
            * (2.0 * (lat * std::f64::consts::PI / 180.0).exp().atan()
                - std::f64::consts::PI / 2.0);
        (lat, lon)
    }

    /// Converts a pyramid pixel position at the given zoom to mercator meters.
    ///
    /// Pixel (0, 0) is the bottom-left corner of the grid.
    pub fn pixels_to_meters(&self, px: f64, py: f64, zoom: u8) -> (f64, f64) {
        let res = self.resolution(zoom);
        (px * res - self.origin_shift, py * res - self.origin_shift)
    }

    /// Converts mercator meters to a pyramid pixel position at the given zoom.
    pub fn meters_to_pixels(&self, mx: f64, my: f64, zoom: u8) -> (f64, f64) {
        let res = self.resolution(zoom);
        (
            (mx + self.origin_shift) / res,
            (my + self.origin_shift) / res,
        )
    }

    /// TMS tile containing the given mercator position.
    ///
    /// # Examples
    ///
    /// ```
    /// use tilebake::geo::mercator::GlobalMercator;
    ///
    /// let grid = GlobalMercator::new(256);
    /// // The world origin sits in the south-west quadrant tile at zoom 1.
    /// assert_eq!(grid.meters_to_tile(-1.0, -1.0, 1), (0, 0));
    /// assert_eq!(grid.meters_to_tile(1.0, 1.0, 1), (1, 1));
    /// ```
    pub fn meters_to_tile(&self, mx: f64, my: f64, zoom: u8) -> (i64, i64) {
        let (px, py) = self.meters_to_pixels(mx, my, zoom);
        pixels_to_tile(px, py, self.tile_size)
    }

    /// Extent of a TMS tile in mercator meters.
    pub fn tile_bounds(&self, tx: i64, ty: i64, zoom: u8) -> BoundingBox {
        let ts = f64::from(self.tile_size);
        let (min_x, min_y) = self.pixels_to_meters(tx as f64 * ts, ty as f64 * ts, zoom);
        let (max_x, max_y) =
            self.pixels_to_meters((tx + 1) as f64 * ts, (ty + 1) as f64 * ts, zoom);
        BoundingBox::new(min_x, min_y, max_x, max_y)
    }

    /// Extent of a TMS tile as WGS84 degrees, ordered south, west, north, east.
    pub fn tile_lat_lon_bounds(&self, tx: i64, ty: i64, zoom: u8) -> (f64, f64, f64, f64) {
        let b = self.tile_bounds(tx, ty, zoom);
        let (south, west) = self.meters_to_lat_lon(b.min_x, b.min_y);
        let (north, east) = self.meters_to_lat_lon(b.max_x, b.max_y);
        (south, west, north, east)
    }

    /// Finest zoom level whose resolution is at least as coarse as the given
    /// pixel size.
    ///
    /// A pixel size coarser than zoom 0 maps to zoom 0; a pixel size finer
    /// than every level maps to [`MAX_ZOOM`].
    ///
    /// # Examples
    ///
    /// ```
    /// use tilebake::geo::mercator::GlobalMercator;
    ///
    /// let grid = GlobalMercator::new(256);
    /// assert_eq!(grid.zoom_for_pixel_size(grid.resolution(7)), 7);
    /// assert_eq!(grid.zoom_for_pixel_size(1e9), 0);
    /// ```
    pub fn zoom_for_pixel_size(&self, pixel_size: f64) -> u8 {
        for i in 0..=MAX_ZOOM {
            if pixel_size > self.resolution(i) {
                return i.saturating_sub(1);
            }
        }
        MAX_ZOOM
    }
}
