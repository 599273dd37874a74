//! # Tilebake
//!
//! A batch tile-pyramid baker for web maps. One georeferenced raster goes
//! in; a directory of `{z}/{x}/{y}.png` tiles in TMS layout comes out,
//! ready for any slippy-map client — no tile server, no database, just
//! files.
//!
//! # Architecture: One Pass Down, One Pass Up
//!
//! A run is a fixed sequence over a tile matrix derived from the raster's
//! georeference:
//!
//! ```text
//! 1. Open       raster file  →  MemoryRaster      (decode, georeference, bands)
//! 2. Matrix     georeference →  TileMatrix        (tile rectangles per zoom)
//! 3. Metadata   matrix       →  xml/json/html     (TMS resource + viewer)
//! 4. Base       raster       →  deepest zoom      (read, scale, encode)
//! 5. Overviews  tiles        →  shallower zooms   (four children → one parent)
//! ```
//!
//! Base tiles are the only stage that touches source pixels; every
//! shallower level is composed from the four tiles directly beneath it,
//! reading finished PNGs back from the output directory. That makes levels
//! strictly sequential, while tiles within a level are embarrassingly
//! parallel.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | CLI option parsing and validation into a typed job config |
//! | [`geo`] | Tile grid math: mercator, geodetic and raster-native profiles |
//! | [`raster`] | Source pixel access behind the [`raster::RasterProvider`] trait |
//! | [`pyramid`] | Zoom-range resolution and per-zoom tile rectangles |
//! | [`resampling`] | Method selection: oversampling factor + scaling kernel |
//! | [`generate`] | The two tile passes: base tiles and overview composition |
//! | [`store`] | `{z}/{x}/{y}.png` layout, PNG encode/decode, resume checks |
//! | [`metadata`] | `tilemapresource.xml`, `metadata.json`, Leaflet viewer |
//! | [`output`] | Progress formatting — level lines, ticks, run summary |
//!
//! # Design Decisions
//!
//! ## The Whole Raster in Memory
//!
//! The source is decoded once into planar band buffers and every tile reads
//! from them ([`raster::MemoryRaster`]). Window reads become slice
//! arithmetic, tiles parallelize without I/O contention, and the provider
//! trait stays narrow enough that tests drive the full pipeline with a
//! recording mock. The trade-off is bounded input size — this is a baker
//! for map-sized rasters, not a streaming COG reader.
//!
//! ## PNG-Only Tiles
//!
//! Every tile is PNG: lossless, alpha-capable, and universally supported
//! by map clients. Alpha is not optional here — partial edge tiles and
//! NODATA regions must come out transparent, or seams show wherever a
//! client overlays the layer. Gray sources encode as gray+alpha, color as
//! RGBA.
//!
//! ## Overviews From Finished Tiles
//!
//! Overview levels could re-read the source at coarser resolutions, but
//! composing them from the four child tiles is dramatically cheaper and
//! guarantees the pyramid is self-consistent: what you see at zoom 5 is
//! exactly the average of what you see at zoom 6. Children land in fixed
//! quadrants by coordinate parity, so a parent never depends on which
//! subset of children exists — world-edge parents just keep transparent
//! quadrants.
//!
//! ## Maud Over Template Engines
//!
//! The viewer page is generated with [Maud](https://maud.lambda.xyz/),
//! a compile-time HTML macro: malformed markup is a build error, titles
//! are escaped by default, and there is no template directory to ship.
//! One self-contained `leaflet.html` next to the tiles is enough to look
//! at a pyramid straight off a file server.
//!
//! ## TMS Row Order
//!
//! Tile rows are counted from the south, per the OSGeo TMS specification,
//! and `tilemapresource.xml` declares as much. Clients expecting the XYZ
//! convention (rows from the north) flip with `y = 2^z - 1 - y`; the
//! bundled viewer sets `tms: true` instead.

pub mod config;
pub mod generate;
pub mod geo;
pub mod metadata;
pub mod output;
pub mod pyramid;
pub mod raster;
pub mod resampling;
pub mod store;
