//! Perceptual difference metrics.
//!
//! The batch runner treats the metric as a collaborator behind
//! [`PerceptualMetric`]: two linear-light RGB images and a dynamic-range mode
//! go in; a per-pixel error map, its mean and a diagnostic parameter bundle
//! come out. [`flip::Flip`] is the implementation shipped with the crate.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`color`] | sRGB, XYZ, YCxCz, CIELab, Hunt and HyAB |
//! | [`filter`] | Contrast sensitivity and feature detection kernels |
//! | [`tonemap`] | HDR tone mappers and exposure bracketing |
//! | [`flip`] | LDR-FLIP and HDR-FLIP |

pub mod color;
pub mod filter;
pub mod flip;
pub mod tonemap;

use std::path::Path;

use imgref::{ImgRef, ImgVec};
use rgb::RGB;
use serde::{Deserialize, Serialize};

use crate::decode::load_linear_rgb;
use crate::error::{Error, Result};
use tonemap::{ExposureRange, ToneMapper};

/// How pixel values are interpreted by the metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DynamicRange {
    /// Display-referred images in [0, 1].
    #[default]
    Ldr,
    /// Scene-referred linear images, compared over an exposure bracket.
    Hdr,
}

impl DynamicRange {
    /// Infer the range from a file extension: `exr` and `hdr` are HDR.
    #[must_use]
    pub fn from_extension(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("exr" | "hdr") => Self::Hdr,
            _ => Self::Ldr,
        }
    }
}

impl std::fmt::Display for DynamicRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ldr => write!(f, "LDR"),
            Self::Hdr => write!(f, "HDR"),
        }
    }
}

impl std::str::FromStr for DynamicRange {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ldr" => Ok(Self::Ldr),
            "hdr" => Ok(Self::Hdr),
            other => Err(format!("unknown dynamic range '{other}' (expected ldr or hdr)")),
        }
    }
}

/// Diagnostic values describing how an error map was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlipParameters {
    /// Pixels per degree used by the spatial filters.
    pub ppd: f64,
    /// Mode the images were compared in.
    pub range: DynamicRange,
    /// Tone mapper (HDR only).
    pub tone_mapper: Option<ToneMapper>,
    /// Exposure bracket (HDR only).
    pub exposures: Option<ExposureRange>,
}

/// Output of a metric evaluation.
#[derive(Debug, Clone)]
pub struct MetricOutput {
    /// Per-pixel error, same dimensions as the inputs.
    pub error_map: ImgVec<f32>,
    /// Spatial average of the error map (>= 0).
    pub mean_error: f64,
    /// Diagnostic parameters.
    pub parameters: FlipParameters,
}

/// A perceptual image difference metric.
pub trait PerceptualMetric: Send + Sync {
    /// Short metric name used in logs and reports.
    fn name(&self) -> &str;

    /// Compare two linear-light RGB images of identical dimensions.
    fn evaluate(
        &self,
        reference: ImgRef<'_, RGB<f32>>,
        test: ImgRef<'_, RGB<f32>>,
        range: DynamicRange,
    ) -> Result<MetricOutput>;
}

/// Load two image files and evaluate them with `metric`.
pub fn evaluate_paths(
    metric: &dyn PerceptualMetric,
    reference: &Path,
    test: &Path,
    range: DynamicRange,
) -> Result<MetricOutput> {
    let reference = load_linear_rgb(reference)?;
    let test = load_linear_rgb(test)?;
    metric.evaluate(reference.as_ref(), test.as_ref(), range)
}

/// Reject empty images and mismatched dimensions.
pub(crate) fn check_dimensions(
    reference: ImgRef<'_, RGB<f32>>,
    test: ImgRef<'_, RGB<f32>>,
) -> Result<()> {
    if reference.width() != test.width() || reference.height() != test.height() {
        return Err(Error::DimensionMismatch {
            expected: (reference.width(), reference.height()),
            actual: (test.width(), test.height()),
        });
    }
    if reference.width() == 0 || reference.height() == 0 {
        return Err(Error::MetricCalculation {
            metric: "FLIP".to_string(),
            reason: "empty image".to_string(),
        });
    }
    Ok(())
}
