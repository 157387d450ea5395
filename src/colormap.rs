//! Rendering error maps to color images.
//!
//! Error values in [0, 1] are mapped through a perceptually uniform color map
//! and written as 8-bit RGB. Viridis and magma use Matt Zucker's degree-6
//! polynomial fits of the matplotlib tables. With [`ColorScale::Normalized`]
//! the map's own finite min..max is stretched over the color map instead.

use std::path::Path;

use image::{Rgb, RgbImage};
use imgref::ImgRef;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const VIRIDIS: [[f32; 3]; 7] = [
    [0.277_727_33, 0.005_407_344_5, 0.334_099_8],
    [0.105_093_04, 1.404_613_5, 1.384_590_2],
    [-0.330_861_83, 0.214_847_56, 0.095_095_16],
    [-4.634_230_5, -5.799_101, -19.332_441],
    [6.228_27, 14.179_933, 56.690_55],
    [4.776_385, -13.745_145, -65.353_03],
    [-5.435_456, 4.645_852_6, 26.312_435],
];

const MAGMA: [[f32; 3]; 7] = [
    [-0.002_136_485, -0.000_749_655_05, -0.005_386_128],
    [0.251_660_54, 0.677_523_2, 2.494_026_6],
    [8.353_717, -3.577_719_5, 0.314_467_9],
    [-27.668_733, 14.264_731, -13.649_213],
    [52.176_14, -27.943_607, 12.944_169],
    [-50.768_524, 29.046_583, 4.234_153],
    [18.655_706, -11.489_773, -5.601_961_5],
];

/// Color map used when saving error maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMap {
    /// matplotlib's default map.
    #[default]
    Viridis,
    /// The map FLIP's own tools use.
    Magma,
    /// Black to white.
    Grayscale,
}

/// Range of error values spread over the color map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScale {
    /// [0, 1], comparable across images.
    #[default]
    Fixed,
    /// The error map's own min..max. A constant map renders as 0.
    Normalized,
}

impl ColorScale {
    /// Affine transform `(offset, factor)` taking error values into [0, 1].
    fn transform(self, values: &[f32]) -> (f32, f32) {
        match self {
            Self::Fixed => (0.0, 1.0),
            Self::Normalized => {
                let (min, max) = values
                    .iter()
                    .filter(|v| v.is_finite())
                    .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                        (lo.min(*v), hi.max(*v))
                    });
                if max > min {
                    (min, 1.0 / (max - min))
                } else {
                    (0.0, 0.0)
                }
            }
        }
    }
}

impl std::fmt::Display for ColorScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::Normalized => write!(f, "normalized"),
        }
    }
}

impl ColorMap {
    /// Map an error value to RGB8. Values outside [0, 1] are clamped.
    #[must_use]
    pub fn map(self, value: f32) -> [u8; 3] {
        let t = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        let rgb = match self {
            Self::Viridis => polynomial(&VIRIDIS, t),
            Self::Magma => polynomial(&MAGMA, t),
            Self::Grayscale => [t, t, t],
        };
        rgb.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
    }

    /// Render a whole error map.
    #[must_use]
    pub fn render(self, error_map: ImgRef<'_, f32>, scale: ColorScale) -> RgbImage {
        let width = error_map.width() as u32;
        let height = error_map.height() as u32;
        let values: Vec<f32> = error_map.pixels().collect();
        let (offset, factor) = scale.transform(&values);

        let mut out = RgbImage::new(width, height);
        for (y, row) in error_map.rows().enumerate() {
            for (x, v) in row.iter().enumerate() {
                out.put_pixel(x as u32, y as u32, Rgb(self.map((v - offset) * factor)));
            }
        }
        out
    }
}

impl std::fmt::Display for ColorMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Viridis => write!(f, "viridis"),
            Self::Magma => write!(f, "magma"),
            Self::Grayscale => write!(f, "grayscale"),
        }
    }
}

impl std::str::FromStr for ColorMap {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "viridis" => Ok(Self::Viridis),
            "magma" => Ok(Self::Magma),
            "grayscale" | "gray" | "grey" => Ok(Self::Grayscale),
            other => Err(format!("unknown color map '{other}' (expected viridis, magma, grayscale)")),
        }
    }
}

fn polynomial(coeffs: &[[f32; 3]; 7], t: f32) -> [f32; 3] {
    let mut acc = [0.0f32; 3];
    for c in coeffs.iter().rev() {
        for (a, k) in acc.iter_mut().zip(c) {
            *a = *a * t + k;
        }
    }
    acc
}

/// Render `error_map` with `color_map` and write it as PNG to `path`.
pub fn save_error_map(
    error_map: ImgRef<'_, f32>,
    color_map: ColorMap,
    scale: ColorScale,
    path: &Path,
) -> Result<()> {
    color_map
        .render(error_map, scale)
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| Error::ImageWrite {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}
