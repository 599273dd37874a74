//! Resampling method selection and its two knock-on choices: the working
//! canvas oversampling factor and the convolution kernel, where one exists.
//!
//! Methods fall into three groups with different scaling machinery:
//!
//! * `average` runs an exact area mean over an integer-factor canvas
//! * `antialias` composites the canvas to RGBA and Lanczos-filters it
//! * everything else maps to a [`FilterType`] kernel applied per band

use std::fmt;

use clap::ValueEnum;
use image::imageops::FilterType;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    /// Exact area average of the covered source pixels.
    Average,
    /// Nearest neighbour, the cheapest and sharpest option.
    Near,
    Bilinear,
    Cubic,
    #[value(name = "cubicspline")]
    CubicSpline,
    Lanczos,
    /// Lanczos over an RGBA composite, blending onto tiles already on disk.
    Antialias,
}

impl Resampling {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resampling::Average => "average",
            Resampling::Near => "near",
            Resampling::Bilinear => "bilinear",
            Resampling::Cubic => "cubic",
            Resampling::CubicSpline => "cubicspline",
            Resampling::Lanczos => "lanczos",
            Resampling::Antialias => "antialias",
        }
    }

    /// Edge of the working canvas a base tile is read into before scaling
    /// down to the tile size. Oversampling buys the kernels context; nearest
    /// needs none and bilinear little.
    pub fn query_size(&self, tile_size: u32) -> u32 {
        match self {
            Resampling::Near => tile_size,
            Resampling::Bilinear => tile_size * 2,
            _ => tile_size * 4,
        }
    }

    /// Convolution kernel for the per-band scaling path. `None` for the
    /// methods with dedicated machinery.
    pub fn filter(&self) -> Option<FilterType> {
        match self {
            Resampling::Near => Some(FilterType::Nearest),
            Resampling::Bilinear => Some(FilterType::Triangle),
            Resampling::Cubic => Some(FilterType::CatmullRom),
            Resampling::CubicSpline => Some(FilterType::Gaussian),
            Resampling::Lanczos => Some(FilterType::Lanczos3),
            Resampling::Average | Resampling::Antialias => None,
        }
    }
}

impl fmt::Display for Resampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_size_per_method() {
        assert_eq!(Resampling::Near.query_size(256), 256);
        assert_eq!(Resampling::Bilinear.query_size(256), 512);
        assert_eq!(Resampling::Average.query_size(256), 1024);
        assert_eq!(Resampling::Lanczos.query_size(256), 1024);
        assert_eq!(Resampling::Antialias.query_size(256), 1024);
    }

    #[test]
    fn kernel_methods_map_to_filters() {
        assert_eq!(Resampling::Near.filter(), Some(FilterType::Nearest));
        assert_eq!(Resampling::Bilinear.filter(), Some(FilterType::Triangle));
        assert_eq!(Resampling::Cubic.filter(), Some(FilterType::CatmullRom));
        assert_eq!(Resampling::CubicSpline.filter(), Some(FilterType::Gaussian));
        assert_eq!(Resampling::Lanczos.filter(), Some(FilterType::Lanczos3));
    }

    #[test]
    fn dedicated_paths_have_no_kernel() {
        assert_eq!(Resampling::Average.filter(), None);
        assert_eq!(Resampling::Antialias.filter(), None);
    }

    #[test]
    fn cli_names_match_the_classic_spelling() {
        let parsed = <Resampling as ValueEnum>::from_str("cubicspline", false);
        assert_eq!(parsed, Ok(Resampling::CubicSpline));
        let parsed = <Resampling as ValueEnum>::from_str("average", false);
        assert_eq!(parsed, Ok(Resampling::Average));
    }

    #[test]
    fn display_uses_the_cli_spelling() {
        assert_eq!(Resampling::CubicSpline.to_string(), "cubicspline");
        assert_eq!(Resampling::Near.to_string(), "near");
    }
}
