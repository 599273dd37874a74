//! Decoded raster held in memory as planar band buffers.

use proj4rs::Proj;

use crate::raster::{GeoTransform, ProviderError, RasterProvider, TileCanvas};
use crate::resampling::Resampling;

/// A fully decoded raster: row-major 8-bit data bands plus an alpha mask,
/// the affine georeference, and the source spatial reference when known.
///
/// Band data is normalized before construction (see [`crate::raster::open`]):
/// one or three data bands, alpha always present even if the source had
/// none.
#[derive(Debug)]
pub struct MemoryRaster {
    size_x: u64,
    size_y: u64,
    geo_transform: GeoTransform,
    bands: Vec<Vec<u8>>,
    alpha: Vec<u8>,
    nodata: Vec<f64>,
    source_epsg: Option<u32>,
}

impl MemoryRaster {
    pub fn new(
        size: (u64, u64),
        geo_transform: GeoTransform,
        bands: Vec<Vec<u8>>,
        alpha: Vec<u8>,
        nodata: Vec<f64>,
        source_epsg: Option<u32>,
    ) -> Result<Self, ProviderError> {
        let pixels = (size.0 * size.1) as usize;
        for band in &bands {
            if band.len() != pixels {
                return Err(ProviderError::BufferSizeMismatch(band.len(), pixels));
            }
        }
        if alpha.len() != pixels {
            return Err(ProviderError::BufferSizeMismatch(alpha.len(), pixels));
        }
        Ok(Self {
            size_x: size.0,
            size_y: size.1,
            geo_transform,
            bands,
            alpha,
            nodata,
            source_epsg,
        })
    }

    pub fn source_epsg(&self) -> Option<u32> {
        self.source_epsg
    }

    fn check_window(&self, rx: i64, ry: i64, rw: i64, rh: i64) -> Result<(), ProviderError> {
        if rx < 0
            || ry < 0
            || rw <= 0
            || rh <= 0
            || rx + rw > self.size_x as i64
            || ry + rh > self.size_y as i64
        {
            return Err(ProviderError::WindowOutOfRange {
                x: rx,
                y: ry,
                w: rw,
                h: rh,
            });
        }
        Ok(())
    }

    /// Nearest-neighbour read of a source window into an `out_w`x`out_h`
    /// buffer, decimating or replicating as the sizes dictate.
    fn sample_window(
        &self,
        data: &[u8],
        rx: i64,
        ry: i64,
        rw: i64,
        rh: i64,
        out_w: u32,
        out_h: u32,
    ) -> Vec<u8> {
        let mut out = Vec::with_capacity(out_w as usize * out_h as usize);
        let stride = self.size_x as usize;
        for j in 0..i64::from(out_h) {
            let sy = ry + (((j as f64 + 0.5) * rh as f64 / f64::from(out_h)) as i64).min(rh - 1);
            let row = sy as usize * stride;
            for i in 0..i64::from(out_w) {
                let sx =
                    rx + (((i as f64 + 0.5) * rw as f64 / f64::from(out_w)) as i64).min(rw - 1);
                out.push(data[row + sx as usize]);
            }
        }
        out
    }
}

impl RasterProvider for MemoryRaster {
    fn size(&self) -> (u64, u64) {
        (self.size_x, self.size_y)
    }

    fn data_bands(&self) -> usize {
        self.bands.len()
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
        if band >= self.bands.len() {
            return Err(ProviderError::BandOutOfRange(band, self.bands.len()));
        }
        self.check_window(rx, ry, rw, rh)?;
        Ok(self.sample_window(&self.bands[band], rx, ry, rw, rh, out_w, out_h))
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
        self.check_window(rx, ry, rw, rh)?;
        Ok(self.sample_window(&self.alpha, rx, ry, rw, rh, out_w, out_h))
    }

    fn resample(
        &self,
        src: &TileCanvas,
        dst: &mut TileCanvas,
        method: Resampling,
    ) -> Result<(), ProviderError> {
        if src.bands() != dst.bands() {
            return Err(ProviderError::BandCountMismatch(src.bands(), dst.bands()));
        }
        let filter = method
            .filter()
            .ok_or(ProviderError::ScaleMismatch(src.size(), dst.size(), method))?;
        for band in 0..src.bands() {
            let img = image::GrayImage::from_raw(src.size(), src.size(), src.band(band).to_vec())
                .ok_or_else(|| {
                    ProviderError::BufferSizeMismatch(
                        src.band(band).len(),
                        src.size() as usize * src.size() as usize,
                    )
                })?;
            let scaled = image::imageops::resize(&img, dst.size(), dst.size(), filter);
            dst.band_mut(band).copy_from_slice(scaled.as_raw());
        }
        Ok(())
    }

    fn box_downsample(
        &self,
        src: &TileCanvas,
        dst: &mut TileCanvas,
    ) -> Result<(), ProviderError> {
        if src.bands() != dst.bands() {
            return Err(ProviderError::BandCountMismatch(src.bands(), dst.bands()));
        }
        if dst.size() == 0 || src.size() % dst.size() != 0 {
            return Err(ProviderError::ScaleMismatch(
                src.size(),
                dst.size(),
                Resampling::Average,
            ));
        }
        let factor = (src.size() / dst.size()) as usize;
        let area = (factor * factor) as u32;
        let src_stride = src.size() as usize;
        let edge = dst.size() as usize;
        for band in 0..src.bands() {
            let data = src.band(band);
            let out = dst.band_mut(band);
            for y in 0..edge {
                for x in 0..edge {
                    let mut sum: u32 = 0;
                    for dy in 0..factor {
                        let row = (y * factor + dy) * src_stride + x * factor;
                        for dx in 0..factor {
                            sum += u32::from(data[row + dx]);
                        }
                    }
                    out[y * edge + x] = ((sum + area / 2) / area) as u8;
                }
            }
        }
        Ok(())
    }

    fn to_geographic(&self, x: f64, y: f64) -> Result<(f64, f64), ProviderError> {
        let code = self
            .source_epsg
            .ok_or_else(|| ProviderError::Transform("source spatial reference is unknown".into()))?;
        if code == 4326 {
            return Ok((x, y));
        }
        let (src, src_geographic) = epsg_proj(code)?;
        let (dst, _) = epsg_proj(4326)?;
        let mut point = (x, y, 0.0);
        if src_geographic {
            point.0 = point.0.to_radians();
            point.1 = point.1.to_radians();
        }
        proj4rs::transform::transform(&src, &dst, &mut point)
            .map_err(|e| ProviderError::Transform(e.to_string()))?;
        Ok((point.0.to_degrees(), point.1.to_degrees()))
    }
}

/// Builds a projection from a compiled-in EPSG definition, flagging
/// geographic systems whose coordinates are angular. The legacy 900913
/// code aliases web mercator.
fn epsg_proj(code: u32) -> Result<(Proj, bool), ProviderError> {
    let code = if code == 900913 { 3857 } else { code };
    let def = u16::try_from(code)
        .ok()
        .and_then(crs_definitions::from_code)
        .ok_or_else(|| ProviderError::Transform(format!("EPSG:{code} has no known definition")))?;
    let proj = Proj::from_proj_string(def.proj4)
        .map_err(|e| ProviderError::Transform(format!("EPSG:{code}: {e}")))?;
    Ok((proj, def.proj4.contains("+proj=longlat")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_raster(size: u64, data: Vec<u8>) -> MemoryRaster {
        let pixels = (size * size) as usize;
        MemoryRaster::new(
            (size, size),
            GeoTransform::north_up(0.0, size as f64, 1.0, -1.0),
            vec![data],
            vec![255; pixels],
            Vec::new(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn construction_checks_buffer_lengths() {
        let err = MemoryRaster::new(
            (4, 4),
            GeoTransform::north_up(0.0, 4.0, 1.0, -1.0),
            vec![vec![0; 15]],
            vec![255; 16],
            Vec::new(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::BufferSizeMismatch(15, 16)));
    }

    #[test]
    fn one_to_one_window_copies_rows() {
        let raster = gray_raster(4, (0..16).collect());
        let out = raster.read_window(0, 1, 1, 2, 2, 2, 2).unwrap();
        assert_eq!(out, vec![5, 6, 9, 10]);
    }

    #[test]
    fn decimation_samples_pixel_centers() {
        let raster = gray_raster(4, (0..16).collect());
        // 4x4 -> 2x2 picks the center of each 2x2 block: columns/rows 1, 3.
        let out = raster.read_window(0, 0, 0, 4, 4, 2, 2).unwrap();
        assert_eq!(out, vec![5, 7, 13, 15]);
    }

    #[test]
    fn replication_upsamples_small_windows() {
        let raster = gray_raster(2, vec![1, 2, 3, 4]);
        let out = raster.read_window(0, 0, 0, 2, 2, 4, 4).unwrap();
        assert_eq!(
            out,
            vec![1, 1, 2, 2, 1, 1, 2, 2, 3, 3, 4, 4, 3, 3, 4, 4]
        );
    }

    #[test]
    fn window_outside_raster_is_rejected() {
        let raster = gray_raster(4, vec![0; 16]);
        assert!(matches!(
            raster.read_window(0, 2, 0, 4, 2, 2, 2),
            Err(ProviderError::WindowOutOfRange { .. })
        ));
        assert!(matches!(
            raster.read_window(0, -1, 0, 2, 2, 2, 2),
            Err(ProviderError::WindowOutOfRange { .. })
        ));
        assert!(matches!(
            raster.read_window(1, 0, 0, 2, 2, 2, 2),
            Err(ProviderError::BandOutOfRange(1, 1))
        ));
    }

    #[test]
    fn alpha_reads_come_from_the_mask() {
        let mut alpha = vec![255u8; 16];
        alpha[5] = 0;
        let raster = MemoryRaster::new(
            (4, 4),
            GeoTransform::north_up(0.0, 4.0, 1.0, -1.0),
            vec![vec![9; 16]],
            alpha,
            Vec::new(),
            None,
        )
        .unwrap();
        let out = raster.read_alpha_window(1, 1, 1, 1, 1, 1).unwrap();
        assert_eq!(out, vec![0]);
    }

    // ========================================================================
    // Canvas scaling
    // ========================================================================

    #[test]
    fn box_downsample_averages_blocks_exactly() {
        let raster = gray_raster(2, vec![0; 4]);
        let mut src = TileCanvas::new(4, 2);
        src.band_mut(0).copy_from_slice(&[
            10, 20, 0, 0, //
            30, 40, 0, 0, //
            0, 0, 100, 100, //
            0, 0, 100, 104,
        ]);
        src.band_mut(1).fill(255);
        let mut dst = TileCanvas::new(2, 2);
        raster.box_downsample(&src, &mut dst).unwrap();
        assert_eq!(dst.band(0), &[25, 0, 0, 101]);
        assert_eq!(dst.band(1), &[255, 255, 255, 255]);
    }

    #[test]
    fn box_downsample_rounds_to_nearest() {
        let raster = gray_raster(2, vec![0; 4]);
        let mut src = TileCanvas::new(2, 2);
        src.band_mut(0).copy_from_slice(&[1, 0, 0, 0]);
        src.band_mut(1).copy_from_slice(&[1, 1, 1, 0]);
        let mut dst = TileCanvas::new(1, 2);
        raster.box_downsample(&src, &mut dst).unwrap();
        // 1/4 rounds down, 3/4 rounds up.
        assert_eq!(dst.band(0), &[0]);
        assert_eq!(dst.band(1), &[1]);
    }

    #[test]
    fn box_downsample_requires_integral_factor() {
        let raster = gray_raster(2, vec![0; 4]);
        let src = TileCanvas::new(3, 2);
        let mut dst = TileCanvas::new(2, 2);
        assert!(matches!(
            raster.box_downsample(&src, &mut dst),
            Err(ProviderError::ScaleMismatch(3, 2, Resampling::Average))
        ));
    }

    #[test]
    fn kernel_resample_preserves_constant_canvases() {
        let raster = gray_raster(2, vec![0; 4]);
        let mut src = TileCanvas::new(8, 2);
        src.band_mut(0).fill(7);
        src.band_mut(1).fill(255);
        for method in [
            Resampling::Near,
            Resampling::Bilinear,
            Resampling::Cubic,
            Resampling::Lanczos,
        ] {
            let mut dst = TileCanvas::new(4, 2);
            raster.resample(&src, &mut dst, method).unwrap();
            assert!(dst.band(0).iter().all(|&v| v == 7), "{method}");
            assert!(dst.band(1).iter().all(|&v| v == 255), "{method}");
        }
    }

    #[test]
    fn kernel_resample_rejects_average() {
        let raster = gray_raster(2, vec![0; 4]);
        let src = TileCanvas::new(4, 2);
        let mut dst = TileCanvas::new(2, 2);
        assert!(matches!(
            raster.resample(&src, &mut dst, Resampling::Average),
            Err(ProviderError::ScaleMismatch(4, 2, Resampling::Average))
        ));
    }

    // ========================================================================
    // Geographic transform
    // ========================================================================

    #[test]
    fn geographic_source_passes_through() {
        let raster = MemoryRaster::new(
            (1, 1),
            GeoTransform::north_up(0.0, 1.0, 1.0, -1.0),
            vec![vec![0]],
            vec![255],
            Vec::new(),
            Some(4326),
        )
        .unwrap();
        assert_eq!(raster.to_geographic(12.5, -33.0).unwrap(), (12.5, -33.0));
    }

    #[test]
    fn utm_meters_transform_to_degrees() {
        let raster = MemoryRaster::new(
            (1, 1),
            GeoTransform::north_up(0.0, 1.0, 1.0, -1.0),
            vec![vec![0]],
            vec![255],
            Vec::new(),
            Some(32633),
        )
        .unwrap();
        // The UTM 33N false-easting origin sits on the 15°E meridian.
        let (lon, lat) = raster.to_geographic(500000.0, 0.0).unwrap();
        assert!((lon - 15.0).abs() < 1e-6, "{lon}");
        assert!(lat.abs() < 1e-6, "{lat}");
    }

    #[test]
    fn unknown_source_reference_fails() {
        let raster = gray_raster(2, vec![0; 4]);
        assert!(matches!(
            raster.to_geographic(0.0, 0.0),
            Err(ProviderError::Transform(_))
        ));
    }
}
