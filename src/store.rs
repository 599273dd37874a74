//! On-disk TMS tile tree.
//!
//! Tiles land at `{root}/{z}/{x}/{y}.png` with TMS row order (y grows
//! northward). Two-band canvases encode as gray + alpha PNGs, four-band as
//! RGBA; either way a missing tile is simply an absent file, which is what
//! resume mode keys on.

use std::path::{Path, PathBuf};

use image::RgbaImage;
use thiserror::Error;

use crate::raster::{ProviderError, TileCanvas};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to write {0}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to encode {0}")]
    Encode(PathBuf, #[source] image::ImageError),

    #[error("failed to decode {0}")]
    Decode(PathBuf, #[source] image::ImageError),

    #[error(transparent)]
    Canvas(#[from] ProviderError),
}

/// Tile tree rooted at the output directory.
#[derive(Debug, Clone)]
pub struct TileStore {
    root: PathBuf,
}

impl TileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tile_path(&self, zoom: u8, tx: i64, ty: i64) -> PathBuf {
        self.root
            .join(zoom.to_string())
            .join(tx.to_string())
            .join(format!("{ty}.png"))
    }

    /// Tile address relative to the root, for progress lines and URLs.
    pub fn tile_name(zoom: u8, tx: i64, ty: i64) -> String {
        format!("{zoom}/{tx}/{ty}.png")
    }

    pub fn exists(&self, zoom: u8, tx: i64, ty: i64) -> bool {
        self.tile_path(zoom, tx, ty).is_file()
    }

    pub fn ensure_tile_dir(&self, zoom: u8, tx: i64) -> Result<(), StoreError> {
        let dir = self.root.join(zoom.to_string()).join(tx.to_string());
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Io(dir, e))
    }

    /// Encodes a canvas to its PNG slot, creating directories as needed.
    pub fn write(&self, zoom: u8, tx: i64, ty: i64, canvas: &TileCanvas) -> Result<(), StoreError> {
        self.ensure_tile_dir(zoom, tx)?;
        let path = self.tile_path(zoom, tx, ty);
        match canvas.bands() {
            2 => canvas
                .to_gray_alpha()?
                .save(&path)
                .map_err(|e| StoreError::Encode(path, e)),
            _ => canvas
                .to_rgba()?
                .save(&path)
                .map_err(|e| StoreError::Encode(path, e)),
        }
    }

    /// Writes an already-composited RGBA image, bypassing the canvas.
    pub fn write_rgba(
        &self,
        zoom: u8,
        tx: i64,
        ty: i64,
        img: &RgbaImage,
    ) -> Result<(), StoreError> {
        self.ensure_tile_dir(zoom, tx)?;
        let path = self.tile_path(zoom, tx, ty);
        img.save(&path).map_err(|e| StoreError::Encode(path, e))
    }

    /// Decodes a stored tile back into a planar canvas with the given band
    /// count.
    pub fn read(
        &self,
        zoom: u8,
        tx: i64,
        ty: i64,
        bands: usize,
    ) -> Result<TileCanvas, StoreError> {
        let path = self.tile_path(zoom, tx, ty);
        let img = image::open(&path).map_err(|e| StoreError::Decode(path, e))?;
        Ok(TileCanvas::from_dynamic(&img, bands)?)
    }

    pub fn read_rgba(&self, zoom: u8, tx: i64, ty: i64) -> Result<RgbaImage, StoreError> {
        let path = self.tile_path(zoom, tx, ty);
        let img = image::open(&path).map_err(|e| StoreError::Decode(path, e))?;
        Ok(img.to_rgba8())
    }
}
