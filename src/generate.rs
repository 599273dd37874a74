//! Tile generation: cutting base tiles from the source raster and
//! composing overview levels from the level below.
//!
//! Levels run strictly in sequence because an overview reads the files of
//! the level beneath it, but tiles within one level are independent and
//! fan out over the rayon pool. Progress flows through an optional channel
//! so the rendering loop never blocks on terminal output.
//!
//! ## Base tiles
//!
//! Each base tile maps its georeferenced extent back onto the source
//! raster with [`geo_query`] (or, for the raster profile, straight pixel
//! arithmetic via [`raster_tile_window`]), reads that window band by band
//! into a working canvas, and scales the canvas down to tile size with the
//! selected resampling method.
//!
//! ## Overviews
//!
//! An overview tile pastes its up-to-four children from the level below
//! onto a double-size canvas and halves it. Children outside the source's
//! tile rectangle are world-edge gaps and their quadrant stays
//! transparent; a child inside the rectangle must exist on disk.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use image::imageops::FilterType;
use rayon::prelude::*;
use thiserror::Error;

use crate::geo::window::{geo_query, raster_tile_window, QueryWindow};
use crate::geo::Profile;
use crate::pyramid::TileMatrix;
use crate::raster::{ProviderError, RasterProvider, TileCanvas};
use crate::resampling::Resampling;
use crate::store::{StoreError, TileStore};

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Cooperative stop flag shared with the tile loops.
///
/// Once cancelled, in-flight tiles finish, nothing further is written, and
/// a later resume run picks up from whatever reached disk.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Tile counts for one generation stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub written: u64,
    pub skipped: u64,
}

impl std::ops::Add for RunStats {
    type Output = RunStats;

    fn add(self, other: RunStats) -> RunStats {
        RunStats {
            written: self.written + other.written,
            skipped: self.skipped + other.skipped,
        }
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} tiles written, {} skipped", self.written, self.skipped)
    }
}

/// Progress notifications from the generation loops, consumed by the
/// output layer on its own thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    LevelStarted { zoom: u8, tiles: u64, overview: bool },
    TileFinished { index: u64, total: u64, name: String, skipped: bool },
}

/// Sizes rayon's global pool. Later calls are no-ops, so repeated runs in
/// one process (tests, mostly) stay harmless.
pub fn init_thread_pool(threads: usize) {
    let _ = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global();
}

fn notify(events: Option<&Sender<ProgressEvent>>, event: ProgressEvent) {
    if let Some(sender) = events {
        let _ = sender.send(event);
    }
}

/// Cuts every tile of the base (maximum) zoom level from the source
/// raster.
pub fn generate_base_tiles(
    provider: &impl RasterProvider,
    profile: &Profile,
    matrix: &TileMatrix,
    store: &TileStore,
    resampling: Resampling,
    resume: bool,
    cancel: &CancelToken,
    events: Option<&Sender<ProgressEvent>>,
) -> Result<RunStats, GenerateError> {
    let zoom = matrix.max_zoom();
    let rect = matrix.rect(zoom);
    let total = rect.count();
    notify(
        events,
        ProgressEvent::LevelStarted { zoom, tiles: total, overview: false },
    );

    let written = AtomicU64::new(0);
    let skipped = AtomicU64::new(0);
    let index = AtomicU64::new(0);
    let tiles: Vec<(i64, i64)> = rect.tiles().collect();
    tiles.into_par_iter().try_for_each_with(
        events.cloned(),
        |events, (tx, ty)| -> Result<(), GenerateError> {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let skip = resume && store.exists(zoom, tx, ty);
            if skip {
                skipped.fetch_add(1, Ordering::Relaxed);
            } else {
                write_base_tile(provider, profile, matrix, store, resampling, zoom, tx, ty)?;
                written.fetch_add(1, Ordering::Relaxed);
            }
            let finished = index.fetch_add(1, Ordering::Relaxed) + 1;
            notify(
                events.as_ref(),
                ProgressEvent::TileFinished {
                    index: finished,
                    total,
                    name: TileStore::tile_name(zoom, tx, ty),
                    skipped: skip,
                },
            );
            Ok(())
        },
    )?;

    Ok(RunStats {
        written: written.load(Ordering::Relaxed),
        skipped: skipped.load(Ordering::Relaxed),
    })
}

/// Composes all overview levels, from one below the base down to the
/// minimum zoom.
pub fn generate_overview_tiles(
    provider: &impl RasterProvider,
    profile: &Profile,
    matrix: &TileMatrix,
    store: &TileStore,
    resampling: Resampling,
    resume: bool,
    cancel: &CancelToken,
    events: Option<&Sender<ProgressEvent>>,
) -> Result<RunStats, GenerateError> {
    let tile_size = profile.tile_size();
    let bands = provider.data_bands() + 1;
    let total = matrix.overview_tile_count();
    let written = AtomicU64::new(0);
    let skipped = AtomicU64::new(0);
    let index = AtomicU64::new(0);

    for zoom in (matrix.min_zoom()..matrix.max_zoom()).rev() {
        if cancel.is_cancelled() {
            break;
        }
        let rect = matrix.rect(zoom);
        notify(
            events,
            ProgressEvent::LevelStarted { zoom, tiles: rect.count(), overview: true },
        );
        let tiles: Vec<(i64, i64)> = rect.tiles().collect();
        tiles.into_par_iter().try_for_each_with(
            events.cloned(),
            |events, (tx, ty)| -> Result<(), GenerateError> {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                let skip = resume && store.exists(zoom, tx, ty);
                if skip {
                    skipped.fetch_add(1, Ordering::Relaxed);
                } else {
                    write_overview_tile(
                        provider, matrix, store, resampling, tile_size, bands, zoom, tx, ty,
                    )?;
                    written.fetch_add(1, Ordering::Relaxed);
                }
                let finished = index.fetch_add(1, Ordering::Relaxed) + 1;
                notify(
                    events.as_ref(),
                    ProgressEvent::TileFinished {
                        index: finished,
                        total,
                        name: TileStore::tile_name(zoom, tx, ty),
                        skipped: skip,
                    },
                );
                Ok(())
            },
        )?;
    }

    Ok(RunStats {
        written: written.load(Ordering::Relaxed),
        skipped: skipped.load(Ordering::Relaxed),
    })
}

/// Reads the raster window behind one base tile and writes the finished
/// tile. A tile whose window misses the raster entirely still produces a
/// fully transparent file, keeping the level's tile population complete.
fn write_base_tile(
    provider: &impl RasterProvider,
    profile: &Profile,
    matrix: &TileMatrix,
    store: &TileStore,
    resampling: Resampling,
    zoom: u8,
    tx: i64,
    ty: i64,
) -> Result<(), GenerateError> {
    let tile_size = profile.tile_size();
    let bands = provider.data_bands() + 1;

    let (window, query_size) = match profile {
        Profile::Mercator(grid) => {
            let query_size = resampling.query_size(tile_size);
            let extent = grid.tile_bounds(tx, ty, zoom);
            (
                geo_query(&provider.geo_transform(), provider.size(), &extent, query_size),
                query_size,
            )
        }
        Profile::Geodetic(grid) => {
            let query_size = resampling.query_size(tile_size);
            let extent = grid.tile_bounds(tx, ty, zoom);
            (
                geo_query(&provider.geo_transform(), provider.size(), &extent, query_size),
                query_size,
            )
        }
        Profile::Raster(grid) => {
            // At and above the native zoom the read is already 1:1 or
            // finer, so oversampling would only blur it.
            let query_size = if zoom >= grid.native_zoom() {
                tile_size
            } else {
                resampling.query_size(tile_size)
            };
            let span = grid.tile_span(zoom).ceil() as i64;
            let rect = matrix.rect(zoom);
            (
                raster_tile_window(
                    provider.size(),
                    span,
                    (tx, ty),
                    (rect.max_x, rect.max_y),
                    query_size,
                ),
                query_size,
            )
        }
    };

    if query_size == tile_size {
        let mut tile = TileCanvas::new(tile_size, bands);
        fill_canvas(provider, &mut tile, &window)?;
        store.write(zoom, tx, ty, &tile)?;
    } else {
        let mut query = TileCanvas::new(query_size, bands);
        fill_canvas(provider, &mut query, &window)?;
        let mut tile = TileCanvas::new(tile_size, bands);
        if !scale_query_to_tile(provider, store, resampling, &query, &mut tile, zoom, tx, ty)? {
            store.write(zoom, tx, ty, &tile)?;
        }
    }
    Ok(())
}

/// Merges the up-to-four children of an overview tile into a double-size
/// canvas and scales it down by half.
fn write_overview_tile(
    provider: &impl RasterProvider,
    matrix: &TileMatrix,
    store: &TileStore,
    resampling: Resampling,
    tile_size: u32,
    bands: usize,
    zoom: u8,
    tx: i64,
    ty: i64,
) -> Result<(), GenerateError> {
    let mut query = TileCanvas::new(2 * tile_size, bands);
    let children = matrix.rect(zoom + 1);
    for child_y in (2 * ty)..=(2 * ty + 1) {
        for child_x in (2 * tx)..=(2 * tx + 1) {
            if !children.contains(child_x, child_y) {
                continue;
            }
            let child = store.read(zoom + 1, child_x, child_y, bands)?;
            // TMS y grows northward, canvas rows southward.
            let col = (child_x - 2 * tx) as u32 * tile_size;
            let row = (1 - (child_y - 2 * ty)) as u32 * tile_size;
            query.paste(&child, col, row)?;
        }
    }

    let mut tile = TileCanvas::new(tile_size, bands);
    if !scale_query_to_tile(provider, store, resampling, &query, &mut tile, zoom, tx, ty)? {
        store.write(zoom, tx, ty, &tile)?;
    }
    Ok(())
}

/// Copies the windowed band reads onto the canvas. An empty window leaves
/// the canvas untouched, fully transparent.
fn fill_canvas(
    provider: &impl RasterProvider,
    canvas: &mut TileCanvas,
    window: &QueryWindow,
) -> Result<(), GenerateError> {
    if window.is_empty() {
        return Ok(());
    }
    let (out_w, out_h) = (window.wx_size as u32, window.wy_size as u32);
    for band in 0..provider.data_bands() {
        let data = provider.read_window(
            band,
            window.rx,
            window.ry,
            window.rx_size,
            window.ry_size,
            out_w,
            out_h,
        )?;
        canvas.write_window(band, window.wx, window.wy, window.wx_size, window.wy_size, &data)?;
    }
    let alpha = provider.read_alpha_window(
        window.rx,
        window.ry,
        window.rx_size,
        window.ry_size,
        out_w,
        out_h,
    )?;
    let alpha_band = canvas.alpha_band();
    canvas.write_window(
        alpha_band,
        window.wx,
        window.wy,
        window.wx_size,
        window.wy_size,
        &alpha,
    )?;
    Ok(())
}

/// Scales the working canvas down to tile size with the selected method.
///
/// Returns true when the method wrote the tile file itself, as antialias
/// does after compositing over whatever is already on disk.
fn scale_query_to_tile(
    provider: &impl RasterProvider,
    store: &TileStore,
    resampling: Resampling,
    query: &TileCanvas,
    tile: &mut TileCanvas,
    zoom: u8,
    tx: i64,
    ty: i64,
) -> Result<bool, GenerateError> {
    match resampling {
        Resampling::Average => {
            provider.box_downsample(query, tile)?;
            Ok(false)
        }
        Resampling::Antialias => {
            let scaled = image::imageops::resize(
                &query.to_rgba()?,
                tile.size(),
                tile.size(),
                FilterType::Lanczos3,
            );
            let composited = if store.exists(zoom, tx, ty) {
                let mut existing = store.read_rgba(zoom, tx, ty)?;
                image::imageops::overlay(&mut existing, &scaled, 0, 0);
                existing
            } else {
                scaled
            };
            store.write_rgba(zoom, tx, ty, &composited)?;
            Ok(true)
        }
        _ => {
            provider.resample(query, tile, resampling)?;
            Ok(false)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
