//! Run configuration: turning raw CLI options into validated parameters.
//!
//! The CLI surface is deliberately flat (one verb, flags only), so there is
//! no config file; this module owns the option formats that need real
//! parsing and the defaults that depend on other options:
//!
//! - **Zoom range** `-z`: `"7"` means just level 7, `"2-5"` a closed range,
//!   and a dangling `"5-"` collapses to `"5"`. Anything outside `0..=31` or
//!   inverted is rejected before any raster is touched.
//! - **NODATA list** `-a`: comma-separated per-band values. Fewer values
//!   than bands are broadcast by cycling at open time; parsing only checks
//!   the numbers.
//! - **Source SRS** `-s`: `EPSG:<code>` or a bare numeric code, for inputs
//!   whose georeferencing carries no reference system.
//! - **Publish URL** `-u`: normalized to end in `<output-basename>/` so the
//!   generated metadata can address tiles absolutely.
//! - **Thread count** `--processes`: capped at the machine's core count.
//!   Users can constrain down, never up.
//!
//! Everything lands in a [`JobConfig`] that the rest of the pipeline treats
//! as immutable.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::geo::{ProfileKind, MAX_ZOOM};
use crate::resampling::Resampling;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid zoom range {0:?}: expected N or N-M")]
    ZoomSyntax(String),

    #[error("invalid zoom range {min}-{max}: minimum exceeds maximum")]
    ZoomInverted { min: u8, max: u8 },

    #[error("zoom {0} is beyond the deepest supported level {max}", max = MAX_ZOOM)]
    ZoomTooDeep(u8),

    #[error("invalid NODATA list {0:?}: expected comma-separated numbers")]
    NodataSyntax(String),

    #[error("invalid source SRS {0:?}: expected EPSG:<code>")]
    SrsSyntax(String),

    #[error("tile size must be a positive number of pixels")]
    ZeroTileSize,

    #[error("input raster {0} does not exist")]
    MissingInput(PathBuf),
}

/// Fully validated run parameters, resolved from the raw CLI options.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub profile: ProfileKind,
    pub resampling: Resampling,
    pub tile_size: u32,
    /// Explicit zoom override; the pyramid derives its own range when absent.
    pub zoom: Option<(u8, u8)>,
    pub resume: bool,
    pub nodata: Vec<f64>,
    pub source_epsg: Option<u32>,
    pub publish_url: Option<String>,
    pub title: String,
    pub threads: usize,
    pub write_metadata: bool,
    pub verbose: bool,
    pub quiet: bool,
}

/// Parses a `-z` zoom argument: `N`, `N-M`, or `N-`.
pub fn parse_zoom_range(arg: &str) -> Result<(u8, u8), ConfigError> {
    let arg = arg.trim();
    let syntax = || ConfigError::ZoomSyntax(arg.to_string());
    let (min, max) = match arg.split_once('-') {
        None => {
            let z: u8 = arg.parse().map_err(|_| syntax())?;
            (z, z)
        }
        Some((lo, "")) => {
            let z: u8 = lo.trim().parse().map_err(|_| syntax())?;
            (z, z)
        }
        Some((lo, hi)) => (
            lo.trim().parse().map_err(|_| syntax())?,
            hi.trim().parse().map_err(|_| syntax())?,
        ),
    };
    for z in [min, max] {
        if z > MAX_ZOOM {
            return Err(ConfigError::ZoomTooDeep(z));
        }
    }
    if min > max {
        return Err(ConfigError::ZoomInverted { min, max });
    }
    Ok((min, max))
}

/// Parses a `-a` NODATA argument: comma-separated numeric values.
pub fn parse_nodata_list(arg: &str) -> Result<Vec<f64>, ConfigError> {
    arg.split(',')
        .map(|part| {
            part.trim()
                .parse()
                .map_err(|_| ConfigError::NodataSyntax(arg.to_string()))
        })
        .collect()
}

/// Parses a `-s` source SRS argument: `EPSG:<code>` or a bare code.
pub fn parse_epsg(arg: &str) -> Result<u32, ConfigError> {
    let arg = arg.trim();
    let code = match arg.split_once(':') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("epsg") => rest,
        Some(_) => return Err(ConfigError::SrsSyntax(arg.to_string())),
        None => arg,
    };
    code.trim()
        .parse()
        .map_err(|_| ConfigError::SrsSyntax(arg.to_string()))
}

/// Normalizes a `-u` publish URL: guarantees a trailing slash, then appends
/// the output directory's basename so tile hrefs resolve under it.
pub fn normalize_publish_url(url: &str, output: &Path) -> String {
    let mut url = url.to_string();
    if !url.ends_with('/') {
        url.push('/');
    }
    if let Some(name) = output.file_name().and_then(|n| n.to_str()) {
        url.push_str(name);
        url.push('/');
    }
    url
}

/// Default map title: the input file's stem.
pub fn default_title(input: &Path) -> String {
    input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string())
}

/// Resolves the worker count: all cores by default, a user request only
/// ever constrains it downward.
pub fn effective_threads(requested: Option<usize>) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    requested.map(|n| n.max(1).min(cores)).unwrap_or(cores)
}

/// Checks that the input raster exists before any work starts.
pub fn validate_input(input: &Path) -> Result<(), ConfigError> {
    if input.is_file() {
        Ok(())
    } else {
        Err(ConfigError::MissingInput(input.to_path_buf()))
    }
}

/// Checks the tile edge length is usable.
pub fn validate_tile_size(tile_size: u32) -> Result<(), ConfigError> {
    if tile_size == 0 {
        Err(ConfigError::ZeroTileSize)
    } else {
        Ok(())
    }
}
