//! Descriptive artifacts written next to the tiles.
//!
//! Three files land in the output root alongside the `{z}/{x}/{y}.png`
//! tree:
//!
//! - **`tilemapresource.xml`**: the TMS resource document most tile
//!   consumers (MapProxy, QGIS, gdal's TMS driver) read to discover the
//!   grid, with one `<TileSet>` entry per generated zoom level.
//! - **`leaflet.html`**: a self-contained Leaflet viewer, written for the
//!   two global profiles only. The raster profile has no web-mappable
//!   coordinate system, so a browser page would be meaningless there.
//! - **`metadata.json`**: a machine-readable summary of the run's
//!   parameters for tooling that would rather not parse XML.
//!
//! All three are written before tile generation starts. They only depend
//! on the resolved parameters, and having them on disk early means an
//! interrupted run already describes itself to whatever serves it.
//!
//! ## Axis order
//!
//! `<BoundingBox>` is written in the natural axis order, `minx` = west.
//! The TMS 1.0 document is explicit about this, even though plenty of
//! generators historically swapped the pairs.

use std::io;
use std::path::{Path, PathBuf};

use maud::{html, Markup, PreEscaped, DOCTYPE};
use serde::Serialize;
use thiserror::Error;

use crate::geo::{BoundingBox, Profile, ProfileKind};
use crate::pyramid::TileMatrix;
use crate::raster::RasterProvider;
use crate::resampling::Resampling;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("failed to write {0}")]
    Io(PathBuf, #[source] io::Error),

    #[error("failed to serialize metadata")]
    Json(#[from] serde_json::Error),
}

/// Everything the metadata writers need to know about the tile set.
pub struct TileSetInfo<'a> {
    pub title: &'a str,
    pub profile: &'a Profile,
    pub matrix: &'a TileMatrix,
    /// Mapped extent in profile coordinates.
    pub bounds: BoundingBox,
    /// Source pixel width, used for raster-profile resolutions.
    pub pixel_width: f64,
    pub source_epsg: Option<u32>,
    /// Absolute base URL for tile hrefs; relative paths when absent.
    pub publish_url: Option<&'a str>,
    pub resampling: Resampling,
}

/// Writes the metadata files into the output root, returning the names of
/// the files actually written. With `resume`, files already on disk are
/// left alone.
pub fn write_metadata(
    info: &TileSetInfo<'_>,
    wgs84: Option<&BoundingBox>,
    output: &Path,
    resume: bool,
) -> Result<Vec<&'static str>, MetadataError> {
    std::fs::create_dir_all(output).map_err(|e| MetadataError::Io(output.to_path_buf(), e))?;
    let mut written = Vec::new();

    let xml_path = output.join("tilemapresource.xml");
    if !(resume && xml_path.exists()) {
        std::fs::write(&xml_path, tilemapresource_xml(info))
            .map_err(|e| MetadataError::Io(xml_path, e))?;
        written.push("tilemapresource.xml");
    }

    let json_path = output.join("metadata.json");
    if !(resume && json_path.exists()) {
        std::fs::write(&json_path, metadata_json(info, wgs84)?)
            .map_err(|e| MetadataError::Io(json_path, e))?;
        written.push("metadata.json");
    }

    if matches!(info.profile.kind(), ProfileKind::Mercator | ProfileKind::Geodetic) {
        let html_path = output.join("leaflet.html");
        if !(resume && html_path.exists()) {
            std::fs::write(&html_path, leaflet_html(info, wgs84).into_string())
                .map_err(|e| MetadataError::Io(html_path, e))?;
            written.push("leaflet.html");
        }
    }

    Ok(written)
}

/// Geographic (WGS84) extent of the mapped bounds, clamped to each
/// profile's legal range.
///
/// The global profiles convert with closed-form math; the raster profile
/// asks the provider, and a source without a usable reference yields
/// `None`.
pub fn geographic_bounds(
    provider: &impl RasterProvider,
    profile: &Profile,
    bounds: &BoundingBox,
) -> Option<BoundingBox> {
    const MERCATOR_LAT_LIMIT: f64 = 85.05112878;
    match profile {
        Profile::Mercator(grid) => {
            let (south, west) = grid.meters_to_lat_lon(bounds.min_x, bounds.min_y);
            let (north, east) = grid.meters_to_lat_lon(bounds.max_x, bounds.max_y);
            Some(BoundingBox::new(
                west.clamp(-180.0, 180.0),
                south.clamp(-MERCATOR_LAT_LIMIT, MERCATOR_LAT_LIMIT),
                east.clamp(-180.0, 180.0),
                north.clamp(-MERCATOR_LAT_LIMIT, MERCATOR_LAT_LIMIT),
            ))
        }
        Profile::Geodetic(_) => Some(BoundingBox::new(
            bounds.min_x.clamp(-180.0, 180.0),
            bounds.min_y.clamp(-90.0, 90.0),
            bounds.max_x.clamp(-180.0, 180.0),
            bounds.max_y.clamp(-90.0, 90.0),
        )),
        Profile::Raster(_) => {
            let (west, south) = provider.to_geographic(bounds.min_x, bounds.min_y).ok()?;
            let (east, north) = provider.to_geographic(bounds.max_x, bounds.max_y).ok()?;
            Some(BoundingBox::new(west, south, east, north))
        }
    }
}

/// Ground units covered by one tile pixel at the given zoom.
fn units_per_pixel(info: &TileSetInfo<'_>, zoom: u8) -> f64 {
    match info.profile {
        Profile::Mercator(grid) => grid.resolution(zoom),
        Profile::Geodetic(grid) => grid.resolution(zoom),
        Profile::Raster(grid) => {
            2f64.powi(i32::from(grid.native_zoom()) - i32::from(zoom)) * info.pixel_width
        }
    }
}

/// SRS label for the resource document. The raster profile reports the
/// source's EPSG code when one is known, otherwise an empty element.
fn srs_label(info: &TileSetInfo<'_>) -> String {
    match info.profile.srs() {
        Some(srs) => srs.to_string(),
        None => info
            .source_epsg
            .map(|code| format!("EPSG:{code}"))
            .unwrap_or_default(),
    }
}

// ============================================================================
// tilemapresource.xml
// ============================================================================

/// Renders the TMS 1.0 resource document.
pub fn tilemapresource_xml(info: &TileSetInfo<'_>) -> String {
    let tile_size = info.profile.tile_size();
    let bounds = info.bounds;
    let range = info.matrix.range();

    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    xml.push_str("<TileMap version=\"1.0.0\" tilemapservice=\"http://tms.osgeo.org/1.0.0\">\n");
    xml.push_str(&format!("  <Title>{}</Title>\n", xml_escape(info.title)));
    xml.push_str("  <Abstract></Abstract>\n");
    xml.push_str(&format!("  <SRS>{}</SRS>\n", xml_escape(&srs_label(info))));
    xml.push_str(&format!(
        "  <BoundingBox minx=\"{}\" miny=\"{}\" maxx=\"{}\" maxy=\"{}\"/>\n",
        bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y
    ));
    xml.push_str(&format!(
        "  <Origin x=\"{}\" y=\"{}\"/>\n",
        bounds.min_x, bounds.min_y
    ));
    xml.push_str(&format!(
        "  <TileFormat width=\"{tile_size}\" height=\"{tile_size}\" mime-type=\"image/png\" extension=\"png\"/>\n",
    ));
    xml.push_str(&format!(
        "  <TileSets profile=\"{}\">\n",
        info.profile.kind().as_str()
    ));
    for zoom in range.min..=range.max {
        let href = match info.publish_url {
            Some(url) => format!("{url}{zoom}"),
            None => zoom.to_string(),
        };
        xml.push_str(&format!(
            "    <TileSet href=\"{}\" units-per-pixel=\"{}\" order=\"{zoom}\"/>\n",
            xml_escape(&href),
            units_per_pixel(info, zoom)
        ));
    }
    xml.push_str("  </TileSets>\n");
    xml.push_str("</TileMap>\n");
    xml
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// leaflet.html
// ============================================================================

/// Renders the Leaflet viewer page. Only meaningful for the mercator and
/// geodetic profiles.
pub fn leaflet_html(info: &TileSetInfo<'_>, wgs84: Option<&BoundingBox>) -> Markup {
    let range = info.matrix.range();
    let crs = match info.profile.kind() {
        ProfileKind::Geodetic => "L.CRS.EPSG4326",
        _ => "L.CRS.EPSG3857",
    };
    let extent = wgs84
        .copied()
        .unwrap_or_else(|| BoundingBox::new(-180.0, -85.05112878, 180.0, 85.05112878));
    let tile_url = match info.publish_url {
        Some(url) => format!("{url}{{z}}/{{x}}/{{y}}.png"),
        None => "./{z}/{x}/{y}.png".to_string(),
    };
    let script = format!(
        "var map = L.map('map', {{ crs: {crs} }});\n\
         var bounds = L.latLngBounds([[{south}, {west}], [{north}, {east}]]);\n\
         L.tileLayer('{tile_url}', {{\n\
           tms: true,\n\
           minZoom: {min_zoom},\n\
           maxZoom: {max_zoom},\n\
           bounds: bounds,\n\
           attribution: '{title}'\n\
         }}).addTo(map);\n\
         map.fitBounds(bounds);\n",
        south = extent.min_y,
        west = extent.min_x,
        north = extent.max_y,
        east = extent.max_x,
        min_zoom = range.min,
        max_zoom = range.max,
        title = info.title.replace('\\', "\\\\").replace('\'', "\\'"),
    );

    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (info.title) }
                link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
                script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js" {}
                style { (PreEscaped("html, body, #map { height: 100%; margin: 0; }")) }
            }
            body {
                div id="map" {}
                script { (PreEscaped(script)) }
            }
        }
    }
}

// ============================================================================
// metadata.json
// ============================================================================

#[derive(Serialize)]
struct MetadataDoc<'a> {
    title: &'a str,
    profile: ProfileKind,
    srs: String,
    tile_size: u32,
    format: &'static str,
    zoom: ZoomDoc,
    bounds: BoundsDoc,
    #[serde(skip_serializing_if = "Option::is_none")]
    wgs84: Option<BoundsDoc>,
    resampling: Resampling,
    generator: String,
}

#[derive(Serialize)]
struct ZoomDoc {
    min: u8,
    max: u8,
}

#[derive(Serialize)]
struct BoundsDoc {
    west: f64,
    south: f64,
    east: f64,
    north: f64,
}

impl From<BoundingBox> for BoundsDoc {
    fn from(b: BoundingBox) -> Self {
        Self {
            west: b.min_x,
            south: b.min_y,
            east: b.max_x,
            north: b.max_y,
        }
    }
}

/// Renders the JSON summary document.
pub fn metadata_json(
    info: &TileSetInfo<'_>,
    wgs84: Option<&BoundingBox>,
) -> Result<String, MetadataError> {
    let range = info.matrix.range();
    let doc = MetadataDoc {
        title: info.title,
        profile: info.profile.kind(),
        srs: srs_label(info),
        tile_size: info.profile.tile_size(),
        format: "png",
        zoom: ZoomDoc { min: range.min, max: range.max },
        bounds: info.bounds.into(),
        wgs84: wgs84.copied().map(BoundsDoc::from),
        resampling: info.resampling,
        generator: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
    };
    let mut json = serde_json::to_string_pretty(&doc)?;
    json.push('\n');
    Ok(json)
}

// ============================================================================
// Tests
// ============================================================================
