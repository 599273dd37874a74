//! Tile extent to raster window mapping.
//!
//! A tile that overlaps the raster maps to a pair of windows: the *read*
//! window in source pixels and the *write* window placing the data inside
//! the working canvas. Tiles along the raster edge read a partial window
//! and write into the matching sub-rectangle of the canvas, leaving the
//! rest transparent. Tiles that miss the raster entirely come back empty.

use crate::geo::BoundingBox;
use crate::raster::GeoTransform;

/// A read window in source pixels paired with the write window placing the
/// data on the working canvas. Sizes can end up zero or negative when the
/// requested extent misses the raster; [`QueryWindow::is_empty`] covers that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    pub rx: i64,
    pub ry: i64,
    pub rx_size: i64,
    pub ry_size: i64,
    pub wx: i64,
    pub wy: i64,
    pub wx_size: i64,
    pub wy_size: i64,
}

impl QueryWindow {
    pub fn is_empty(&self) -> bool {
        self.rx_size <= 0 || self.ry_size <= 0 || self.wx_size <= 0 || self.wy_size <= 0
    }
}

/// Maps a georeferenced extent onto the raster pixel grid.
///
/// `query_size` is the canvas edge the write window targets; zero keeps the
/// native size, so the write window equals the read window (modulo edge
/// clipping).
///
/// Two nudge constants keep tile seams stable: the window origin gets
/// +0.001 of a pixel so an extent landing a hair before a pixel boundary
/// snaps onto it, and the window size gets +0.5 so sizes round to nearest
/// instead of truncating. Without these, adjacent tiles can disagree about
/// a shared row of source pixels and leave one-pixel cracks.
pub fn geo_query(
    gt: &GeoTransform,
    raster_size: (u64, u64),
    extent: &BoundingBox,
    query_size: u32,
) -> QueryWindow {
    let (ulx, uly) = (extent.min_x, extent.max_y);
    let (lrx, lry) = (extent.max_x, extent.min_y);

    let mut rx = ((ulx - gt.origin_x) / gt.pixel_width + 0.001) as i64;
    let mut ry = ((uly - gt.origin_y) / gt.pixel_height + 0.001) as i64;
    let mut rx_size = ((lrx - ulx) / gt.pixel_width + 0.5) as i64;
    let mut ry_size = ((lry - uly) / gt.pixel_height + 0.5) as i64;

    let (mut wx_size, mut wy_size) = if query_size == 0 {
        (rx_size, ry_size)
    } else {
        (i64::from(query_size), i64::from(query_size))
    };

    if rx_size <= 0 || ry_size <= 0 {
        return QueryWindow {
            rx,
            ry,
            rx_size: 0,
            ry_size: 0,
            wx: 0,
            wy: 0,
            wx_size: 0,
            wy_size: 0,
        };
    }

    let size_x = raster_size.0 as i64;
    let size_y = raster_size.1 as i64;

    let mut wx = 0;
    if rx < 0 {
        let shift = rx.unsigned_abs() as i64;
        wx = (wx_size as f64 * (shift as f64 / rx_size as f64)) as i64;
        wx_size -= wx;
        rx_size -= (rx_size as f64 * (shift as f64 / rx_size as f64)) as i64;
        rx = 0;
    }
    if rx + rx_size > size_x {
        wx_size = (wx_size as f64 * ((size_x - rx) as f64 / rx_size as f64)) as i64;
        rx_size = size_x - rx;
    }

    let mut wy = 0;
    if ry < 0 {
        let shift = ry.unsigned_abs() as i64;
        wy = (wy_size as f64 * (shift as f64 / ry_size as f64)) as i64;
        wy_size -= wy;
        ry_size -= (ry_size as f64 * (shift as f64 / ry_size as f64)) as i64;
        ry = 0;
    }
    if ry + ry_size > size_y {
        wy_size = (wy_size as f64 * ((size_y - ry) as f64 / ry_size as f64)) as i64;
        ry_size = size_y - ry;
    }

    QueryWindow {
        rx,
        ry,
        rx_size,
        ry_size,
        wx,
        wy,
        wx_size,
        wy_size,
    }
}

/// Read/write windows for a raster-native tile.
///
/// `tile_span` is the whole number of source pixels a tile covers at this
/// zoom. Edge tiles read the remainder of the raster and write it scaled
/// into the matching fraction of the canvas; partial rows anchor to the
/// bottom of the canvas so coverage stays south-west aligned in TMS
/// orientation.
pub fn raster_tile_window(
    raster_size: (u64, u64),
    tile_span: i64,
    tile: (i64, i64),
    tile_max: (i64, i64),
    query_size: u32,
) -> QueryWindow {
    let (size_x, size_y) = (raster_size.0 as i64, raster_size.1 as i64);
    let (tx, ty) = tile;
    let qs = i64::from(query_size);

    let rx = tx * tile_span;
    let mut rx_size = 0;
    if tx == tile_max.0 {
        rx_size = size_x % tile_span;
    }
    if rx_size == 0 {
        rx_size = tile_span;
    }

    let mut ry_size = 0;
    if ty == tile_max.1 {
        ry_size = size_y % tile_span;
    }
    if ry_size == 0 {
        ry_size = tile_span;
    }
    let ry = size_y - ty * tile_span - ry_size;

    let wx_size = (rx_size as f64 / tile_span as f64 * qs as f64) as i64;
    let wy_size = (ry_size as f64 / tile_span as f64 * qs as f64) as i64;
    let wy = if wy_size == qs { 0 } else { qs - wy_size };

    QueryWindow {
        rx,
        ry,
        rx_size,
        ry_size,
        wx: 0,
        wy,
        wx_size,
        wy_size,
    }
}
