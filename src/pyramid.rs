//! Pyramid layout: which zoom levels a run covers and which tiles exist at
//! each of them.
//!
//! The matrix is computed once up front from the raster bounds and consulted
//! everywhere else, so base generation, overview composition, and metadata
//! all agree on the exact tile population. An edge sitting exactly on a tile
//! seam resolves to the tile south-west of it, which keeps a full-world
//! raster at one tile for zoom 0 instead of spilling into a phantom row.

use thiserror::Error;

use crate::geo::{BoundingBox, Profile};

#[derive(Error, Debug)]
pub enum PyramidError {
    #[error("zoom {zoom}: the raster does not intersect the profile's tile grid")]
    OutsideGrid { zoom: u8 },

    #[error("zoom range {min}-{max} is inverted")]
    InvertedRange { min: u8, max: u8 },
}

/// Inclusive zoom span of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomRange {
    pub min: u8,
    pub max: u8,
}

impl ZoomRange {
    /// Derives the natural range from the raster's pixel size, then lets an
    /// explicit request replace it wholesale.
    pub fn resolve(
        profile: &Profile,
        pixel_width: f64,
        raster_size: (u64, u64),
        requested: Option<(u8, u8)>,
    ) -> Result<Self, PyramidError> {
        let (min, max) = match requested {
            Some(range) => range,
            None => profile.derive_zoom(pixel_width, raster_size),
        };
        if min > max {
            return Err(PyramidError::InvertedRange { min, max });
        }
        Ok(Self { min, max })
    }
}

/// Inclusive tile rectangle at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub min_x: i64,
    pub min_y: i64,
    pub max_x: i64,
    pub max_y: i64,
}

impl TileRect {
    pub fn contains(&self, tx: i64, ty: i64) -> bool {
        tx >= self.min_x && tx <= self.max_x && ty >= self.min_y && ty <= self.max_y
    }

    pub fn count(&self) -> u64 {
        ((self.max_x - self.min_x + 1) * (self.max_y - self.min_y + 1)) as u64
    }

    /// Tiles in generation order: northernmost row first, west to east.
    pub fn tiles(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        (self.min_y..=self.max_y)
            .rev()
            .flat_map(move |ty| (self.min_x..=self.max_x).map(move |tx| (tx, ty)))
    }
}

/// Tile extents for every zoom level up to the run's maximum.
///
/// Rectangles exist for all levels from 0 so overview composition can look
/// one level down without special cases; only `range.min..=range.max` are
/// ever generated.
#[derive(Debug, Clone)]
pub struct TileMatrix {
    rects: Vec<TileRect>,
    range: ZoomRange,
}

impl TileMatrix {
    pub fn build(
        profile: &Profile,
        bounds: &BoundingBox,
        range: ZoomRange,
    ) -> Result<Self, PyramidError> {
        let mut rects = Vec::with_capacity(usize::from(range.max) + 1);
        for zoom in 0..=range.max {
            let ((raw_min_x, raw_min_y), (raw_max_x, raw_max_y)) =
                profile.tiles_for_bounds(bounds, zoom);
            let (world_max_x, world_max_y) = profile.world_tile_max(zoom);
            let rect = TileRect {
                min_x: raw_min_x.max(0),
                min_y: raw_min_y.max(0),
                max_x: raw_max_x.min(world_max_x),
                max_y: raw_max_y.min(world_max_y),
            };
            if rect.min_x > rect.max_x || rect.min_y > rect.max_y {
                return Err(PyramidError::OutsideGrid { zoom });
            }
            rects.push(rect);
        }
        Ok(Self { rects, range })
    }

    pub fn range(&self) -> ZoomRange {
        self.range
    }

    pub fn min_zoom(&self) -> u8 {
        self.range.min
    }

    pub fn max_zoom(&self) -> u8 {
        self.range.max
    }

    pub fn rect(&self, zoom: u8) -> TileRect {
        self.rects[usize::from(zoom)]
    }

    /// Tiles at the base (maximum) zoom.
    pub fn base_tile_count(&self) -> u64 {
        self.rect(self.range.max).count()
    }

    /// Tiles across all overview levels.
    pub fn overview_tile_count(&self) -> u64 {
        (self.range.min..self.range.max)
            .map(|zoom| self.rect(zoom).count())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::ProfileKind;

    const SHIFT: f64 = 20037508.342789244;

    fn mercator() -> Profile {
        Profile::new(ProfileKind::Mercator, 256, (0, 0))
    }

    fn world() -> BoundingBox {
        BoundingBox::new(-SHIFT, -SHIFT, SHIFT, SHIFT)
    }

    // ========================================================================
    // Zoom range resolution
    // ========================================================================

    #[test]
    fn derives_range_from_pixel_size() {
        let profile = mercator();
        let res1 = 156543.03392804097 / 2.0;
        // 512px at the zoom 1 resolution: one tile covers it at zoom 0.
        let range = ZoomRange::resolve(&profile, res1, (512, 512), None).unwrap();
        assert_eq!(range, ZoomRange { min: 0, max: 1 });
    }

    #[test]
    fn request_replaces_the_derived_range() {
        let profile = mercator();
        let range = ZoomRange::resolve(&profile, 1.0, (512, 512), Some((3, 3))).unwrap();
        assert_eq!(range, ZoomRange { min: 3, max: 3 });
    }

    #[test]
    fn inverted_request_is_fatal() {
        let err = ZoomRange::resolve(&mercator(), 1.0, (512, 512), Some((5, 2))).unwrap_err();
        assert!(matches!(err, PyramidError::InvertedRange { min: 5, max: 2 }));
    }

    #[test]
    fn geodetic_world_raster_resolves_to_zoom_zero() {
        let profile = Profile::new(ProfileKind::Geodetic, 256, (0, 0));
        let range = ZoomRange::resolve(&profile, 0.703125, (512, 256), None).unwrap();
        assert_eq!(range, ZoomRange { min: 0, max: 0 });
    }

    // ========================================================================
    // Matrix construction
    // ========================================================================

    #[test]
    fn full_world_collapses_to_single_tiles() {
        let matrix =
            TileMatrix::build(&mercator(), &world(), ZoomRange { min: 0, max: 1 }).unwrap();
        assert_eq!(
            matrix.rect(0),
            TileRect { min_x: 0, min_y: 0, max_x: 0, max_y: 0 }
        );
        assert_eq!(
            matrix.rect(1),
            TileRect { min_x: 0, min_y: 0, max_x: 1, max_y: 1 }
        );
        assert_eq!(matrix.base_tile_count(), 4);
        assert_eq!(matrix.overview_tile_count(), 1);
    }

    #[test]
    fn quarter_world_stays_in_its_quadrant() {
        let north_west = BoundingBox::new(-SHIFT, 0.0, 0.0, SHIFT);
        let matrix =
            TileMatrix::build(&mercator(), &north_west, ZoomRange { min: 1, max: 2 }).unwrap();
        // The south edge sits exactly on the equator seam, which pulls in
        // the tile row south of it.
        assert_eq!(
            matrix.rect(1),
            TileRect { min_x: 0, min_y: 0, max_x: 0, max_y: 1 }
        );
        assert_eq!(
            matrix.rect(2),
            TileRect { min_x: 0, min_y: 1, max_x: 1, max_y: 3 }
        );
    }

    #[test]
    fn raster_profile_covers_the_pixel_grid() {
        let profile = Profile::new(ProfileKind::Raster, 256, (700, 500));
        let bounds = BoundingBox::new(0.0, -500.0, 700.0, 0.0);
        let matrix = TileMatrix::build(&profile, &bounds, ZoomRange { min: 0, max: 2 }).unwrap();
        assert_eq!(
            matrix.rect(2),
            TileRect { min_x: 0, min_y: 0, max_x: 2, max_y: 1 }
        );
        assert_eq!(
            matrix.rect(1),
            TileRect { min_x: 0, min_y: 0, max_x: 1, max_y: 0 }
        );
        assert_eq!(
            matrix.rect(0),
            TileRect { min_x: 0, min_y: 0, max_x: 0, max_y: 0 }
        );
        assert_eq!(matrix.base_tile_count(), 6);
        assert_eq!(matrix.overview_tile_count(), 3);
    }

    #[test]
    fn raster_outside_the_world_grid_is_fatal() {
        let far_east = BoundingBox::new(SHIFT + 1000.0, 0.0, SHIFT + 2000.0, 1000.0);
        let err =
            TileMatrix::build(&mercator(), &far_east, ZoomRange { min: 0, max: 1 }).unwrap_err();
        assert!(matches!(err, PyramidError::OutsideGrid { zoom: 0 }));
    }

    // ========================================================================
    // Tile rectangles
    // ========================================================================

    #[test]
    fn generation_order_is_north_first() {
        let rect = TileRect { min_x: 0, min_y: 0, max_x: 1, max_y: 1 };
        let tiles: Vec<_> = rect.tiles().collect();
        assert_eq!(tiles, vec![(0, 1), (1, 1), (0, 0), (1, 0)]);
    }

    #[test]
    fn containment_is_inclusive() {
        let rect = TileRect { min_x: 2, min_y: 3, max_x: 4, max_y: 5 };
        assert!(rect.contains(2, 3));
        assert!(rect.contains(4, 5));
        assert!(!rect.contains(5, 5));
        assert!(!rect.contains(2, 2));
        assert_eq!(rect.count(), 9);
    }
}
