//! Affine georeferencing between pixel space and geographic space.

use crate::geo::BoundingBox;

/// The six-coefficient affine transform tying pixel (column, row) positions
/// to georeferenced coordinates, in the usual GDAL ordering: x origin, pixel
/// width, row rotation, y origin, column rotation, pixel height.
///
/// North-up rasters have zero rotation terms and a negative pixel height
/// (rows advance southward).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub column_rotation: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// A transform with no rotation. `pixel_height` is expected to be
    /// negative for the usual top-left origin.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            column_rotation: 0.0,
            pixel_height,
        }
    }

    pub fn from_coefficients(gt: [f64; 6]) -> Self {
        Self {
            origin_x: gt[0],
            pixel_width: gt[1],
            row_rotation: gt[2],
            origin_y: gt[3],
            column_rotation: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn coefficients(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.column_rotation,
            self.pixel_height,
        ]
    }

    pub fn is_north_up(&self) -> bool {
        self.row_rotation == 0.0 && self.column_rotation == 0.0
    }

    /// Georeferenced position of a pixel-space point.
    pub fn pixel_to_geo(&self, px: f64, py: f64) -> (f64, f64) {
        (
            self.origin_x + px * self.pixel_width + py * self.row_rotation,
            self.origin_y + px * self.column_rotation + py * self.pixel_height,
        )
    }

    /// Georeferenced extent of a raster with the given pixel dimensions.
    /// Only meaningful for north-up transforms.
    pub fn bounds(&self, size_x: u64, size_y: u64) -> BoundingBox {
        let max_x = self.origin_x + size_x as f64 * self.pixel_width;
        let min_y = self.origin_y + size_y as f64 * self.pixel_height;
        BoundingBox::new(self.origin_x, min_y, max_x, self.origin_y)
    }
}
