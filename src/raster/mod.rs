//! Raster access behind a narrow provider trait.
//!
//! Tile generation never touches pixel storage directly; it goes through
//! [`RasterProvider`], which models the handful of operations the pyramid
//! needs: windowed band reads with nearest-neighbour decimation, canvas
//! rescaling, and a transform to geographic coordinates for metadata. The
//! in-memory implementation lives in [`memory`], and [`open`] builds one
//! from a file on disk.
//!
//! | Module | Role |
//! |--------|------|
//! | [`geotransform`] | Affine pixel-to-geo mapping |
//! | [`memory`] | Decoded raster held in planar band buffers |
//! | [`open`] | File decoding, georeference discovery, band normalization |

pub mod geotransform;
pub mod memory;
pub mod open;

use image::{DynamicImage, GrayAlphaImage, LumaA, Rgba, RgbaImage};
use thiserror::Error;

pub use geotransform::GeoTransform;
pub use memory::MemoryRaster;
pub use open::{open_raster, OpenError};

use crate::resampling::Resampling;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("read window ({x}, {y}) size {w}x{h} falls outside the raster")]
    WindowOutOfRange { x: i64, y: i64, w: i64, h: i64 },

    #[error("band {0} does not exist ({1} data bands)")]
    BandOutOfRange(usize, usize),

    #[error("canvas write at ({x}, {y}) size {w}x{h} exceeds a {size}px canvas")]
    CanvasOutOfRange { x: i64, y: i64, w: i64, h: i64, size: u32 },

    #[error("canvas has {0} bands, expected {1}")]
    BandCountMismatch(usize, usize),

    #[error("buffer holds {0} samples, expected {1}")]
    BufferSizeMismatch(usize, usize),

    #[error("cannot scale a {0}px canvas onto {1}px with {2}")]
    ScaleMismatch(u32, u32, Resampling),

    #[error("coordinate transform failed: {0}")]
    Transform(String),
}

/// Square working buffer of planar 8-bit bands. Data bands come first and
/// the alpha band is always last, so a canvas has either two bands
/// (gray + alpha) or four (RGB + alpha). A fresh canvas is fully
/// transparent black.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileCanvas {
    size: u32,
    samples: Vec<Vec<u8>>,
}

impl TileCanvas {
    pub fn new(size: u32, bands: usize) -> Self {
        let pixels = size as usize * size as usize;
        Self {
            size,
            samples: vec![vec![0; pixels]; bands],
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn bands(&self) -> usize {
        self.samples.len()
    }

    /// Index of the alpha band (always the last one).
    pub fn alpha_band(&self) -> usize {
        self.samples.len() - 1
    }

    pub fn band(&self, band: usize) -> &[u8] {
        &self.samples[band]
    }

    pub fn band_mut(&mut self, band: usize) -> &mut [u8] {
        &mut self.samples[band]
    }

    /// Copies a `w`x`h` sample buffer into one band at the given offset.
    pub fn write_window(
        &mut self,
        band: usize,
        x: i64,
        y: i64,
        w: i64,
        h: i64,
        data: &[u8],
    ) -> Result<(), ProviderError> {
        if band >= self.samples.len() {
            return Err(ProviderError::BandOutOfRange(band, self.samples.len()));
        }
        let size = i64::from(self.size);
        if x < 0 || y < 0 || w < 0 || h < 0 || x + w > size || y + h > size {
            return Err(ProviderError::CanvasOutOfRange {
                x,
                y,
                w,
                h,
                size: self.size,
            });
        }
        let expected = (w * h) as usize;
        if data.len() != expected {
            return Err(ProviderError::BufferSizeMismatch(data.len(), expected));
        }
        let stride = self.size as usize;
        let target = &mut self.samples[band];
        for row in 0..h as usize {
            let src_start = row * w as usize;
            let dst_start = (y as usize + row) * stride + x as usize;
            target[dst_start..dst_start + w as usize]
                .copy_from_slice(&data[src_start..src_start + w as usize]);
        }
        Ok(())
    }

    /// Pastes a whole smaller canvas at the given offset, all bands at once.
    pub fn paste(&mut self, src: &TileCanvas, x: u32, y: u32) -> Result<(), ProviderError> {
        if src.bands() != self.bands() {
            return Err(ProviderError::BandCountMismatch(src.bands(), self.bands()));
        }
        let edge = i64::from(src.size);
        for band in 0..src.bands() {
            self.write_window(
                band,
                i64::from(x),
                i64::from(y),
                edge,
                edge,
                src.band(band),
            )?;
        }
        Ok(())
    }

    /// Interleaves into an RGBA image; gray canvases replicate their single
    /// data band across the color channels.
    pub fn to_rgba(&self) -> Result<RgbaImage, ProviderError> {
        match self.bands() {
            4 => Ok(RgbaImage::from_fn(self.size, self.size, |x, y| {
                let i = (y * self.size + x) as usize;
                Rgba([
                    self.samples[0][i],
                    self.samples[1][i],
                    self.samples[2][i],
                    self.samples[3][i],
                ])
            })),
            2 => Ok(RgbaImage::from_fn(self.size, self.size, |x, y| {
                let i = (y * self.size + x) as usize;
                let g = self.samples[0][i];
                Rgba([g, g, g, self.samples[1][i]])
            })),
            n => Err(ProviderError::BandCountMismatch(n, 4)),
        }
    }

    /// Interleaves a two-band canvas into a gray + alpha image.
    pub fn to_gray_alpha(&self) -> Result<GrayAlphaImage, ProviderError> {
        if self.bands() != 2 {
            return Err(ProviderError::BandCountMismatch(self.bands(), 2));
        }
        Ok(GrayAlphaImage::from_fn(self.size, self.size, |x, y| {
            let i = (y * self.size + x) as usize;
            LumaA([self.samples[0][i], self.samples[1][i]])
        }))
    }

    /// Splits a decoded image back into a planar canvas with the given band
    /// count. The image must be square.
    pub fn from_dynamic(img: &DynamicImage, bands: usize) -> Result<Self, ProviderError> {
        if img.width() != img.height() {
            return Err(ProviderError::BufferSizeMismatch(
                (img.width() * img.height()) as usize,
                (img.width() * img.width()) as usize,
            ));
        }
        let size = img.width();
        let mut canvas = TileCanvas::new(size, bands);
        match bands {
            4 => {
                let rgba = img.to_rgba8();
                for (i, px) in rgba.pixels().enumerate() {
                    for b in 0..4 {
                        canvas.samples[b][i] = px.0[b];
                    }
                }
            }
            2 => {
                let la = img.to_luma_alpha8();
                for (i, px) in la.pixels().enumerate() {
                    canvas.samples[0][i] = px.0[0];
                    canvas.samples[1][i] = px.0[1];
                }
            }
            n => return Err(ProviderError::BandCountMismatch(n, 4)),
        }
        Ok(canvas)
    }
}

/// Pixel source for tile generation.
///
/// `Sync` because base and overview tiles of one level are cut in parallel
/// against a shared provider.
pub trait RasterProvider: Sync {
    /// Raster dimensions in pixels, x then y.
    fn size(&self) -> (u64, u64);

    /// Number of data bands, excluding alpha: 1 for gray, 3 for RGB.
    fn data_bands(&self) -> usize;

    fn geo_transform(&self) -> GeoTransform;

    /// Per-band NODATA values, empty when the source declares none.
    fn nodata(&self) -> &[f64];

    /// Reads a `rw`x`rh` pixel window of one data band, decimated to
    /// `out_w`x`out_h` samples by nearest neighbour.
    fn read_window(
        &self,
        band: usize,
        rx: i64,
        ry: i64,
        rw: i64,
        rh: i64,
        out_w: u32,
        out_h: u32,
    ) -> Result<Vec<u8>, ProviderError>;

    /// Same as [`read_window`](RasterProvider::read_window) for the alpha
    /// mask.
    fn read_alpha_window(
        &self,
        rx: i64,
        ry: i64,
        rw: i64,
        rh: i64,
        out_w: u32,
        out_h: u32,
    ) -> Result<Vec<u8>, ProviderError>;

    /// Rescales `src` onto `dst` band by band with a convolution kernel.
    /// Fails for methods without one (average, antialias).
    fn resample(
        &self,
        src: &TileCanvas,
        dst: &mut TileCanvas,
        method: Resampling,
    ) -> Result<(), ProviderError>;

    /// Area-averages `src` onto `dst`. The source edge must be an exact
    /// multiple of the destination edge.
    fn box_downsample(&self, src: &TileCanvas, dst: &mut TileCanvas)
        -> Result<(), ProviderError>;

    /// Transforms a georeferenced position to WGS84 lon/lat degrees.
    fn to_geographic(&self, x: f64, y: f64) -> Result<(f64, f64), ProviderError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;

    /// One recorded provider call, for asserting call sequences in tests.
    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        ReadWindow {
            band: usize,
            rx: i64,
            ry: i64,
            rw: i64,
            rh: i64,
            out_w: u32,
            out_h: u32,
        },
        ReadAlphaWindow {
            rx: i64,
            ry: i64,
            rw: i64,
            rh: i64,
            out_w: u32,
            out_h: u32,
        },
        Resample {
            method: Resampling,
            src_size: u32,
            dst_size: u32,
        },
        BoxDownsample {
            src_size: u32,
            dst_size: u32,
        },
        ToGeographic {
            x: f64,
            y: f64,
        },
    }

    /// Provider that returns flat fill values and records every call.
    pub struct MockProvider {
        size: (u64, u64),
        data_bands: usize,
        geo_transform: GeoTransform,
        nodata: Vec<f64>,
        pub fill: u8,
        pub alpha_fill: u8,
        operations: Mutex<Vec<RecordedOp>>,
    }

    impl MockProvider {
        pub fn new(size_x: u64, size_y: u64, data_bands: usize) -> Self {
            Self {
                size: (size_x, size_y),
                data_bands,
                geo_transform: GeoTransform::north_up(0.0, size_y as f64, 1.0, -1.0),
                nodata: Vec::new(),
                fill: 128,
                alpha_fill: 255,
                operations: Mutex::new(Vec::new()),
            }
        }

        pub fn with_geo_transform(mut self, gt: GeoTransform) -> Self {
            self.geo_transform = gt;
            self
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        fn record(&self, op: RecordedOp) {
            self.operations.lock().unwrap().push(op);
        }
    }

    impl RasterProvider for MockProvider {
        fn size(&self) -> (u64, u64) {
            self.size
        }

        fn data_bands(&self) -> usize {
            self.data_bands
        }

        fn geo_transform(&self) -> GeoTransform {
            self.geo_transform
        }

        fn nodata(&self) -> &[f64] {
            &self.nodata
        }

        fn read_window(
            &self,
            band: usize,
            rx: i64,
            ry: i64,
            rw: i64,
            rh: i64,
            out_w: u32,
            out_h: u32,
        ) -> Result<Vec<u8>, ProviderError> {
            if band >= self.data_bands {
                return Err(ProviderError::BandOutOfRange(band, self.data_bands));
            }
            self.record(RecordedOp::ReadWindow {
                band,
                rx,
                ry,
                rw,
                rh,
                out_w,
                out_h,
            });
            Ok(vec![self.fill; out_w as usize * out_h as usize])
        }

        fn read_alpha_window(
            &self,
            rx: i64,
            ry: i64,
            rw: i64,
            rh: i64,
            out_w: u32,
            out_h: u32,
        ) -> Result<Vec<u8>, ProviderError> {
            self.record(RecordedOp::ReadAlphaWindow {
                rx,
                ry,
                rw,
                rh,
                out_w,
                out_h,
            });
            Ok(vec![self.alpha_fill; out_w as usize * out_h as usize])
        }

        fn resample(
            &self,
            src: &TileCanvas,
            dst: &mut TileCanvas,
            method: Resampling,
        ) -> Result<(), ProviderError> {
            self.record(RecordedOp::Resample {
                method,
                src_size: src.size(),
                dst_size: dst.size(),
            });
            for band in 0..dst.bands() {
                dst.band_mut(band).fill(self.fill);
            }
            Ok(())
        }

        fn box_downsample(
            &self,
            src: &TileCanvas,
            dst: &mut TileCanvas,
        ) -> Result<(), ProviderError> {
            self.record(RecordedOp::BoxDownsample {
                src_size: src.size(),
                dst_size: dst.size(),
            });
            for band in 0..dst.bands() {
                dst.band_mut(band).fill(self.fill);
            }
            Ok(())
        }

        fn to_geographic(&self, x: f64, y: f64) -> Result<(f64, f64), ProviderError> {
            self.record(RecordedOp::ToGeographic { x, y });
            Ok((x, y))
        }
    }

    // ========================================================================
    // Canvas
    // ========================================================================

    #[test]
    fn new_canvas_is_transparent() {
        let canvas = TileCanvas::new(8, 4);
        assert_eq!(canvas.size(), 8);
        assert_eq!(canvas.bands(), 4);
        assert_eq!(canvas.alpha_band(), 3);
        assert!(canvas.band(3).iter().all(|&a| a == 0));
    }

    #[test]
    fn write_window_places_rows() {
        let mut canvas = TileCanvas::new(4, 2);
        canvas.write_window(0, 1, 2, 2, 2, &[9, 8, 7, 6]).unwrap();
        let band = canvas.band(0);
        assert_eq!(&band[9..11], &[9, 8]);
        assert_eq!(&band[13..15], &[7, 6]);
        assert!(band[..9].iter().all(|&v| v == 0));
    }

    #[test]
    fn write_window_rejects_overflow() {
        let mut canvas = TileCanvas::new(4, 2);
        let err = canvas.write_window(0, 3, 0, 2, 1, &[1, 2]).unwrap_err();
        assert!(matches!(err, ProviderError::CanvasOutOfRange { .. }));
        let err = canvas.write_window(5, 0, 0, 1, 1, &[1]).unwrap_err();
        assert!(matches!(err, ProviderError::BandOutOfRange(5, 2)));
        let err = canvas.write_window(0, 0, 0, 2, 2, &[1]).unwrap_err();
        assert!(matches!(err, ProviderError::BufferSizeMismatch(1, 4)));
    }

    #[test]
    fn paste_copies_every_band() {
        let mut child = TileCanvas::new(2, 2);
        child.band_mut(0).fill(7);
        child.band_mut(1).fill(255);
        let mut parent = TileCanvas::new(4, 2);
        parent.paste(&child, 2, 0).unwrap();
        assert_eq!(parent.band(0)[2], 7);
        assert_eq!(parent.band(1)[3], 255);
        assert_eq!(parent.band(0)[0], 0);
        assert_eq!(parent.band(1)[8], 0);
    }

    #[test]
    fn paste_rejects_band_mismatch() {
        let child = TileCanvas::new(2, 4);
        let mut parent = TileCanvas::new(4, 2);
        let err = parent.paste(&child, 0, 0).unwrap_err();
        assert!(matches!(err, ProviderError::BandCountMismatch(4, 2)));
    }

    #[test]
    fn rgba_round_trip_through_dynamic() {
        let mut canvas = TileCanvas::new(2, 4);
        canvas.band_mut(0).copy_from_slice(&[1, 2, 3, 4]);
        canvas.band_mut(1).copy_from_slice(&[5, 6, 7, 8]);
        canvas.band_mut(2).copy_from_slice(&[9, 10, 11, 12]);
        canvas.band_mut(3).copy_from_slice(&[255, 255, 0, 255]);
        let img = DynamicImage::ImageRgba8(canvas.to_rgba().unwrap());
        let back = TileCanvas::from_dynamic(&img, 4).unwrap();
        assert_eq!(back, canvas);
    }

    #[test]
    fn gray_canvas_expands_to_rgba() {
        let mut canvas = TileCanvas::new(1, 2);
        canvas.band_mut(0)[0] = 40;
        canvas.band_mut(1)[0] = 200;
        let rgba = canvas.to_rgba().unwrap();
        assert_eq!(rgba.get_pixel(0, 0).0, [40, 40, 40, 200]);
        let la = canvas.to_gray_alpha().unwrap();
        assert_eq!(la.get_pixel(0, 0).0, [40, 200]);
    }

    // ========================================================================
    // Mock provider
    // ========================================================================

    #[test]
    fn mock_records_read_sequence() {
        let mock = MockProvider::new(100, 100, 3);
        mock.read_window(0, 10, 20, 30, 40, 8, 8).unwrap();
        mock.read_alpha_window(10, 20, 30, 40, 8, 8).unwrap();
        let ops = mock.get_operations();
        assert_eq!(ops.len(), 2);
        assert_eq!(
            ops[0],
            RecordedOp::ReadWindow {
                band: 0,
                rx: 10,
                ry: 20,
                rw: 30,
                rh: 40,
                out_w: 8,
                out_h: 8
            }
        );
    }

    #[test]
    fn mock_rejects_missing_band() {
        let mock = MockProvider::new(10, 10, 1);
        let err = mock.read_window(1, 0, 0, 1, 1, 1, 1).unwrap_err();
        assert!(matches!(err, ProviderError::BandOutOfRange(1, 1)));
    }
}
