//! Opening a source raster: image decoding, georeference discovery, spatial
//! reference checks, and band normalization into a [`MemoryRaster`].
//!
//! Georeferencing is looked up in two places, in order: embedded GeoTIFF
//! tags (pixel scale + tiepoint, or a full transformation matrix), then an
//! ESRI world file next to the image. The raster profile tolerates a bare
//! image and falls back to a unit pixel grid; the global profiles refuse to
//! guess.
//!
//! Bands are normalized so the rest of the pipeline sees exactly two
//! shapes: gray + alpha or RGB + alpha. Sources without an alpha channel
//! get an opaque mask, and a NODATA value (from `--srcnodata` or the GDAL
//! TIFF tag) replaces the mask with full transparency wherever every data
//! band matches its value.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use thiserror::Error;
use tiff::decoder::Decoder;
use tiff::tags::Tag;

use crate::geo::ProfileKind;
use crate::raster::{GeoTransform, MemoryRaster, ProviderError};

#[derive(Error, Debug)]
pub enum OpenError {
    #[error("failed to read {0}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to decode {0}")]
    Decode(PathBuf, #[source] image::ImageError),

    #[error("failed to read TIFF tags from {0}")]
    TiffTags(PathBuf, #[source] tiff::TiffError),

    #[error("world file {0} is malformed")]
    BadWorldFile(PathBuf),

    #[error(
        "{0} carries no georeference; supply a GeoTIFF or world file, or use the raster profile"
    )]
    NoGeoreference(PathBuf),

    #[error("{0} is not north-up; warp rotated or skewed rasters before tiling")]
    Rotated(PathBuf),

    #[error(
        "source reference EPSG:{found} does not fit the {profile} profile; reproject to {wanted} first"
    )]
    SrsMismatch {
        found: u32,
        profile: ProfileKind,
        wanted: &'static str,
    },

    #[error("source spatial reference is unknown; pass --s-srs")]
    UnknownSrs,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Georeferencing gleaned from embedded GeoTIFF tags.
#[derive(Debug, Default)]
struct TiffGeoRef {
    geo_transform: Option<GeoTransform>,
    epsg: Option<u32>,
    nodata: Option<f64>,
}

/// Decodes `path` and assembles the in-memory raster the pyramid reads
/// from. `s_srs` overrides any spatial reference found in the file;
/// `nodata_override` replaces any NODATA declaration, cycled across bands.
pub fn open_raster(
    path: &Path,
    profile: ProfileKind,
    s_srs: Option<u32>,
    nodata_override: &[f64],
) -> Result<MemoryRaster, OpenError> {
    let img = image::ImageReader::open(path)
        .map_err(|e| OpenError::Io(path.to_path_buf(), e))?
        .decode()
        .map_err(|e| OpenError::Decode(path.to_path_buf(), e))?;

    let tags = if is_tiff(path) {
        read_geotiff_tags(path)?
    } else {
        TiffGeoRef::default()
    };

    let geo_transform = match tags.geo_transform {
        Some(gt) => Some(gt),
        None => read_world_file(path)?,
    };
    let geo_transform = match (geo_transform, profile) {
        (Some(gt), _) => gt,
        // A bare image still tiles in its own pixel grid.
        (None, ProfileKind::Raster) => GeoTransform::north_up(0.0, 0.0, 1.0, -1.0),
        (None, _) => return Err(OpenError::NoGeoreference(path.to_path_buf())),
    };
    if !geo_transform.is_north_up() {
        return Err(OpenError::Rotated(path.to_path_buf()));
    }

    let epsg = s_srs.or(tags.epsg);
    match profile {
        ProfileKind::Mercator => match epsg {
            Some(3857 | 3785 | 900913) => {}
            Some(found) => {
                return Err(OpenError::SrsMismatch {
                    found,
                    profile,
                    wanted: "EPSG:3857",
                })
            }
            None => return Err(OpenError::UnknownSrs),
        },
        ProfileKind::Geodetic => match epsg {
            Some(code) if epsg_is_geographic(code) => {}
            Some(found) => {
                return Err(OpenError::SrsMismatch {
                    found,
                    profile,
                    wanted: "EPSG:4326",
                })
            }
            None => return Err(OpenError::UnknownSrs),
        },
        ProfileKind::Raster => {}
    }

    let (bands, mut alpha) = split_planes(&img);
    let nodata = if !nodata_override.is_empty() {
        broadcast(nodata_override, bands.len())
    } else if let Some(value) = tags.nodata {
        vec![value; bands.len()]
    } else {
        Vec::new()
    };
    if !nodata.is_empty() {
        apply_nodata_mask(&bands, &nodata, &mut alpha);
    }

    let size = (u64::from(img.width()), u64::from(img.height()));
    Ok(MemoryRaster::new(
        size,
        geo_transform,
        bands,
        alpha,
        nodata,
        epsg,
    )?)
}

fn is_tiff(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff")
    )
}

/// Splits the decoded image into planar data bands plus an alpha mask.
/// Anything with three or more channels becomes RGB, the rest gray;
/// sources without alpha get an opaque mask.
fn split_planes(img: &DynamicImage) -> (Vec<Vec<u8>>, Vec<u8>) {
    let pixels = img.width() as usize * img.height() as usize;
    if img.color().channel_count() >= 3 {
        let rgba = img.to_rgba8();
        let mut bands = vec![Vec::with_capacity(pixels); 3];
        let mut alpha = Vec::with_capacity(pixels);
        for px in rgba.pixels() {
            bands[0].push(px.0[0]);
            bands[1].push(px.0[1]);
            bands[2].push(px.0[2]);
            alpha.push(px.0[3]);
        }
        (bands, alpha)
    } else {
        let la = img.to_luma_alpha8();
        let mut gray = Vec::with_capacity(pixels);
        let mut alpha = Vec::with_capacity(pixels);
        for px in la.pixels() {
            gray.push(px.0[0]);
            alpha.push(px.0[1]);
        }
        (vec![gray], alpha)
    }
}

/// Cycles a NODATA list across the band count, so one value can cover
/// three bands and a short list repeats.
fn broadcast(values: &[f64], count: usize) -> Vec<f64> {
    (0..count).map(|i| values[i % values.len()]).collect()
}

/// Masks out pixels where every data band matches its NODATA value.
fn apply_nodata_mask(bands: &[Vec<u8>], nodata: &[f64], alpha: &mut [u8]) {
    for (i, a) in alpha.iter_mut().enumerate() {
        let masked = bands
            .iter()
            .zip(nodata)
            .all(|(band, &nd)| f64::from(band[i]) == nd);
        *a = if masked { 0 } else { 255 };
    }
}

fn epsg_is_geographic(code: u32) -> bool {
    code == 4326
        || u16::try_from(code)
            .ok()
            .and_then(crs_definitions::from_code)
            .map(|def| def.proj4.contains("+proj=longlat"))
            .unwrap_or(false)
}

fn read_geotiff_tags(path: &Path) -> Result<TiffGeoRef, OpenError> {
    let file = File::open(path).map_err(|e| OpenError::Io(path.to_path_buf(), e))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(|e| OpenError::TiffTags(path.to_path_buf(), e))?;
    let terr = |e| OpenError::TiffTags(path.to_path_buf(), e);

    let mut tags = TiffGeoRef::default();

    if let Some(value) = decoder.find_tag(Tag::ModelTransformationTag).map_err(terr)? {
        let m = value.into_f64_vec().map_err(terr)?;
        if m.len() >= 8 {
            tags.geo_transform = Some(GeoTransform {
                origin_x: m[3],
                pixel_width: m[0],
                row_rotation: m[1],
                origin_y: m[7],
                column_rotation: m[4],
                pixel_height: m[5],
            });
        }
    }
    if tags.geo_transform.is_none() {
        let scale = decoder
            .find_tag(Tag::ModelPixelScaleTag)
            .map_err(terr)?
            .map(|v| v.into_f64_vec())
            .transpose()
            .map_err(terr)?;
        let tiepoint = decoder
            .find_tag(Tag::ModelTiepointTag)
            .map_err(terr)?
            .map(|v| v.into_f64_vec())
            .transpose()
            .map_err(terr)?;
        if let (Some(scale), Some(tie)) = (scale, tiepoint) {
            if scale.len() >= 2 && tie.len() >= 6 {
                // A tiepoint anchors raster position (i, j) at geo (x, y).
                let origin_x = tie[3] - tie[0] * scale[0];
                let origin_y = tie[4] + tie[1] * scale[1];
                tags.geo_transform =
                    Some(GeoTransform::north_up(origin_x, origin_y, scale[0], -scale[1]));
            }
        }
    }

    if let Some(value) = decoder.find_tag(Tag::GeoKeyDirectoryTag).map_err(terr)? {
        let keys = value.into_u16_vec().map_err(terr)?;
        let mut projected = None;
        let mut geographic = None;
        if keys.len() >= 4 {
            for entry in keys[4..].chunks_exact(4) {
                let (key_id, location, code) = (entry[0], entry[1], entry[3]);
                // Inline SHORT values only; 32767 means user-defined.
                if location != 0 || code == 0 || code == 32767 {
                    continue;
                }
                match key_id {
                    3072 => projected = Some(u32::from(code)),
                    2048 => geographic = Some(u32::from(code)),
                    _ => {}
                }
            }
        }
        tags.epsg = projected.or(geographic);
    }

    if let Some(value) = decoder.find_tag(Tag::GdalNodata).map_err(terr)? {
        if let Ok(text) = value.into_string() {
            let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
            tags.nodata = text.parse::<f64>().ok();
        }
    }

    Ok(tags)
}

/// Looks for an ESRI world file next to the image: the extension-derived
/// name first (`.tfw` for `.tif`, `.pgw` for `.png`), then generic `.wld`.
fn read_world_file(path: &Path) -> Result<Option<GeoTransform>, OpenError> {
    for sidecar in world_file_candidates(path) {
        if !sidecar.is_file() {
            continue;
        }
        let text =
            std::fs::read_to_string(&sidecar).map_err(|e| OpenError::Io(sidecar.clone(), e))?;
        let values: Vec<f64> = text
            .split_whitespace()
            .map_while(|token| token.parse::<f64>().ok())
            .collect();
        if values.len() < 6 {
            return Err(OpenError::BadWorldFile(sidecar));
        }
        let [a, d, b, e, c, f] = [values[0], values[1], values[2], values[3], values[4], values[5]];
        // World files anchor the center of the top-left pixel.
        return Ok(Some(GeoTransform {
            origin_x: c - a / 2.0 - b / 2.0,
            pixel_width: a,
            row_rotation: b,
            origin_y: f - d / 2.0 - e / 2.0,
            column_rotation: d,
            pixel_height: e,
        }));
    }
    Ok(None)
}

fn world_file_candidates(path: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        let lower = ext.to_ascii_lowercase();
        let mut chars = lower.chars();
        if let (Some(first), Some(last)) = (chars.next(), lower.chars().next_back()) {
            if lower.len() >= 2 {
                candidates.push(path.with_extension(format!("{first}{last}w")));
            }
        }
    }
    candidates.push(path.with_extension("wld"));
    candidates
}
