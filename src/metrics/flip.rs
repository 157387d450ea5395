//! FLIP perceptual difference (LDR and HDR).
//!
//! LDR-FLIP compares two images in [0, 1] along two axes:
//!
//! 1. **Color**: both images are filtered with contrast sensitivity functions
//!    in YCxCz, converted to Hunt-adjusted CIELab and compared with HyAB.
//! 2. **Features**: edges and points are detected on luminance, and the larger
//!    of the two detector differences is kept.
//!
//! The per-pixel error is `color^(1 - feature)`, in [0, 1].
//!
//! HDR-FLIP tone maps both images at a bracket of exposures chosen from the
//! reference, runs LDR-FLIP on each, and keeps the per-pixel maximum.

use imgref::{ImgRef, ImgVec};
use rgb::RGB;

use super::color::{
    Tristimulus, hyab, linear_rgb_to_hunt_lab, linear_rgb_to_xyz, reference_white,
    xyz_to_linear_rgb, xyz_to_ycxcz, ycxcz_to_xyz,
};
use super::filter::{CsfFilter, FeatureFilter};
use super::tonemap::{ExposureRange, ToneMapper};
use super::{DynamicRange, FlipParameters, MetricOutput, PerceptualMetric, check_dimensions};
use crate::error::{Error, Result};
use crate::viewing::ViewingCondition;

/// Exponent applied to the HyAB color difference.
const QC: f32 = 0.7;
/// Fraction of the maximum color difference where the remapping knee sits.
const PC: f32 = 0.4;
/// Error value assigned at the knee.
const PT: f32 = 0.95;
/// Feature detector width, in degrees.
const FEATURE_WIDTH: f32 = 0.082;
/// Exponent applied to the feature difference.
const QF: f32 = 0.5;

/// The FLIP metric.
///
/// # Example
///
/// ```
/// use flip_batch::metrics::{DynamicRange, PerceptualMetric, flip::Flip};
/// use imgref::ImgVec;
/// use rgb::RGB;
///
/// let img = ImgVec::new(vec![RGB::new(0.2f32, 0.4, 0.6); 16], 4, 4);
/// let out = Flip::default().evaluate(img.as_ref(), img.as_ref(), DynamicRange::Ldr).unwrap();
/// assert_eq!(out.mean_error, 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct Flip {
    ppd: f32,
    tone_mapper: ToneMapper,
    parallel_rows: bool,
    csf: CsfFilter,
    features: FeatureFilter,
    max_color_difference: f32,
}

impl Flip {
    /// Create the metric for a viewing condition.
    pub fn new(viewing: &ViewingCondition) -> Result<Self> {
        let ppd = viewing.pixels_per_degree();
        if !ppd.is_finite() || ppd <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "pixels per degree must be positive, got {ppd}"
            )));
        }
        Ok(Self::with_ppd(ppd as f32))
    }

    fn with_ppd(ppd: f32) -> Self {
        let white = reference_white();
        let green = linear_rgb_to_hunt_lab([0.0, 1.0, 0.0], white);
        let blue = linear_rgb_to_hunt_lab([0.0, 0.0, 1.0], white);

        Self {
            ppd,
            tone_mapper: ToneMapper::default(),
            parallel_rows: false,
            csf: CsfFilter::new(ppd),
            features: FeatureFilter::new(ppd, FEATURE_WIDTH),
            max_color_difference: hyab(green, blue).powf(QC),
        }
    }

    /// Tone mapper used for HDR evaluation.
    #[must_use]
    pub fn with_tone_mapper(mut self, tone_mapper: ToneMapper) -> Self {
        self.tone_mapper = tone_mapper;
        self
    }

    /// Run the spatial filters on the rayon pool, row by row.
    #[must_use]
    pub fn with_parallel_rows(mut self, parallel: bool) -> Self {
        self.parallel_rows = parallel;
        self
    }

    /// Pixels per degree this instance was built for.
    #[must_use]
    pub fn pixels_per_degree(&self) -> f32 {
        self.ppd
    }

    /// LDR-FLIP error map of two linear images; values are clamped to [0, 1].
    pub fn ldr_error_map(
        &self,
        reference: ImgRef<'_, RGB<f32>>,
        test: ImgRef<'_, RGB<f32>>,
    ) -> Result<ImgVec<f32>> {
        check_dimensions(reference, test)?;
        let width = reference.width();
        let reference: Vec<Tristimulus> = reference.pixels().map(|p| clamp_unit([p.r, p.g, p.b])).collect();
        let test: Vec<Tristimulus> = test.pixels().map(|p| clamp_unit([p.r, p.g, p.b])).collect();
        Ok(self.ldr_core(&reference, &test, width))
    }

    /// HDR-FLIP error map of two linear images, with the exposure bracket used.
    pub fn hdr_error_map(
        &self,
        reference: ImgRef<'_, RGB<f32>>,
        test: ImgRef<'_, RGB<f32>>,
    ) -> Result<(ImgVec<f32>, ExposureRange)> {
        check_dimensions(reference, test)?;
        let width = reference.width();
        let height = reference.height();
        let reference: Vec<Tristimulus> = reference.pixels().map(|p| [p.r, p.g, p.b]).collect();
        let test: Vec<Tristimulus> = test.pixels().map(|p| [p.r, p.g, p.b]).collect();

        for (name, pixels) in [("reference", &reference), ("test", &test)] {
            if let Some(pos) = pixels.iter().position(|p| p.iter().any(|c| !c.is_finite())) {
                return Err(Error::MetricCalculation {
                    metric: "FLIP".to_string(),
                    reason: format!(
                        "{name} image has a non-finite value at ({}, {})",
                        pos % width,
                        pos / width
                    ),
                });
            }
        }

        let range = ExposureRange::from_reference(reference.iter(), self.tone_mapper);
        let mut max_map = vec![0.0f32; width * height];

        for i in 0..range.count {
            let scale = range.exposure(i).exp2();
            let tm = |img: &[Tristimulus]| -> Vec<Tristimulus> {
                img.iter()
                    .map(|p| p.map(|c| self.tone_mapper.apply(scale * c)))
                    .collect()
            };
            let map = self.ldr_core(&tm(&reference), &tm(&test), width);
            for (m, v) in max_map.iter_mut().zip(map.buf()) {
                *m = m.max(*v);
            }
            tracing::trace!(exposure = range.exposure(i), "evaluated HDR exposure");
        }

        Ok((ImgVec::new(max_map, width, height), range))
    }

    /// LDR-FLIP on row-major linear pixels already in [0, 1].
    fn ldr_core(&self, reference: &[Tristimulus], test: &[Tristimulus], width: usize) -> ImgVec<f32> {
        let height = reference.len() / width;
        let white = reference_white();

        let ref_ycxcz = to_ycxcz_planes(reference, width, height, white);
        let test_ycxcz = to_ycxcz_planes(test, width, height, white);

        let filter = |planes: &[ImgVec<f32>; 3]| -> [ImgVec<f32>; 3] {
            [0, 1, 2].map(|c| self.csf.apply(c, planes[c].as_ref(), self.parallel_rows))
        };
        let ref_filtered = filter(&ref_ycxcz);
        let test_filtered = filter(&test_ycxcz);

        // Feature detection runs on unfiltered luminance normalized to [0, 1].
        let normalized_luma = |planes: &[ImgVec<f32>; 3]| -> ImgVec<f32> {
            let buf = planes[0].buf().iter().map(|y| (y + 16.0) / 116.0).collect();
            ImgVec::new(buf, width, height)
        };
        let ref_features = self
            .features
            .detect(normalized_luma(&ref_ycxcz).as_ref(), self.parallel_rows);
        let test_features = self
            .features
            .detect(normalized_luma(&test_ycxcz).as_ref(), self.parallel_rows);

        let cmax = self.max_color_difference;
        let mut errors = Vec::with_capacity(width * height);
        for i in 0..width * height {
            let hunt = |planes: &[ImgVec<f32>; 3]| {
                let ycxcz = [planes[0].buf()[i], planes[1].buf()[i], planes[2].buf()[i]];
                linear_rgb_to_hunt_lab(xyz_to_linear_rgb(ycxcz_to_xyz(ycxcz, white)), white)
            };
            let color = remap_color(hyab(hunt(&ref_filtered), hunt(&test_filtered)).powf(QC), cmax);

            let edge = (ref_features.edges.buf()[i] - test_features.edges.buf()[i]).abs();
            let point = (ref_features.points.buf()[i] - test_features.points.buf()[i]).abs();
            let feature = (edge.max(point) * std::f32::consts::FRAC_1_SQRT_2).powf(QF);

            errors.push(color.powf(1.0 - feature).clamp(0.0, 1.0));
        }

        ImgVec::new(errors, width, height)
    }
}

impl Default for Flip {
    fn default() -> Self {
        Self::with_ppd(ViewingCondition::default().pixels_per_degree() as f32)
    }
}

impl PerceptualMetric for Flip {
    fn name(&self) -> &str {
        "FLIP"
    }

    fn evaluate(
        &self,
        reference: ImgRef<'_, RGB<f32>>,
        test: ImgRef<'_, RGB<f32>>,
        range: DynamicRange,
    ) -> Result<MetricOutput> {
        let (error_map, exposures) = match range {
            DynamicRange::Ldr => (self.ldr_error_map(reference, test)?, None),
            DynamicRange::Hdr => {
                let (map, exposures) = self.hdr_error_map(reference, test)?;
                (map, Some(exposures))
            }
        };

        let mean_error = mean(error_map.buf());
        Ok(MetricOutput {
            error_map,
            mean_error,
            parameters: FlipParameters {
                ppd: f64::from(self.ppd),
                range,
                tone_mapper: exposures.map(|_| self.tone_mapper),
                exposures,
            },
        })
    }
}

#[inline]
fn clamp_unit(p: Tristimulus) -> Tristimulus {
    p.map(|c| c.clamp(0.0, 1.0))
}

fn to_ycxcz_planes(
    pixels: &[Tristimulus],
    width: usize,
    height: usize,
    white: Tristimulus,
) -> [ImgVec<f32>; 3] {
    let mut planes = [
        Vec::with_capacity(pixels.len()),
        Vec::with_capacity(pixels.len()),
        Vec::with_capacity(pixels.len()),
    ];
    for p in pixels {
        let v = xyz_to_ycxcz(linear_rgb_to_xyz(*p), white);
        for (plane, c) in planes.iter_mut().zip(v) {
            plane.push(c);
        }
    }
    planes.map(|buf| ImgVec::new(buf, width, height))
}

/// Compress color differences so that `pc * cmax` maps to `pt` and `cmax` to 1.
#[inline]
fn remap_color(delta: f32, cmax: f32) -> f32 {
    let pc = PC * cmax;
    if delta < pc {
        (PT / pc) * delta
    } else {
        PT + ((delta - pc) / (cmax - pc)) * (1.0 - PT)
    }
}

fn mean(values: &[f32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| f64::from(*v)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(color: [f32; 3], width: usize, height: usize) -> ImgVec<RGB<f32>> {
        ImgVec::new(vec![RGB::new(color[0], color[1], color[2]); width * height], width, height)
    }

    fn gradient(width: usize, height: usize) -> ImgVec<RGB<f32>> {
        let buf = (0..width * height)
            .map(|i| {
                let x = (i % width) as f32 / width as f32;
                let y = (i / width) as f32 / height as f32;
                RGB::new(x, y, 0.5 * (x + y))
            })
            .collect();
        ImgVec::new(buf, width, height)
    }

    #[test]
    fn test_identical_images_score_zero() {
        let img = gradient(24, 16);
        let out = Flip::default()
            .evaluate(img.as_ref(), img.as_ref(), DynamicRange::Ldr)
            .unwrap();
        assert_eq!(out.mean_error, 0.0);
        assert!(out.error_map.buf().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_error_map_matches_input_dimensions() {
        let reference = gradient(13, 7);
        let test = solid([0.3, 0.3, 0.3], 13, 7);
        for range in [DynamicRange::Ldr, DynamicRange::Hdr] {
            let out = Flip::default()
                .evaluate(reference.as_ref(), test.as_ref(), range)
                .unwrap();
            assert_eq!(out.error_map.width(), 13);
            assert_eq!(out.error_map.height(), 7);
            assert!(out.mean_error > 0.0);
            assert!(out.mean_error <= 1.0);
            assert!(out.error_map.buf().iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn test_black_vs_white_is_large() {
        let black = solid([0.0; 3], 8, 8);
        let white = solid([1.0; 3], 8, 8);
        let out = Flip::default()
            .evaluate(black.as_ref(), white.as_ref(), DynamicRange::Ldr)
            .unwrap();
        assert!(out.mean_error > 0.5, "{}", out.mean_error);
    }

    #[test]
    fn test_small_change_scores_lower_than_large_change() {
        let reference = solid([0.5; 3], 8, 8);
        let near = solid([0.52, 0.5, 0.5], 8, 8);
        let far = solid([0.9, 0.1, 0.1], 8, 8);
        let flip = Flip::default();
        let small = flip.evaluate(reference.as_ref(), near.as_ref(), DynamicRange::Ldr).unwrap();
        let large = flip.evaluate(reference.as_ref(), far.as_ref(), DynamicRange::Ldr).unwrap();
        assert!(small.mean_error < large.mean_error);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = solid([0.5; 3], 4, 4);
        let b = solid([0.5; 3], 8, 4);
        let result = Flip::default().evaluate(a.as_ref(), b.as_ref(), DynamicRange::Ldr);
        assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn test_hdr_reports_exposures() {
        let reference = solid([4.0, 2.0, 1.0], 6, 6);
        let test = solid([3.0, 2.0, 1.0], 6, 6);
        let out = Flip::default()
            .with_tone_mapper(ToneMapper::Reinhard)
            .evaluate(reference.as_ref(), test.as_ref(), DynamicRange::Hdr)
            .unwrap();
        let exposures = out.parameters.exposures.unwrap();
        assert!(exposures.count >= 2);
        assert_eq!(out.parameters.tone_mapper, Some(ToneMapper::Reinhard));
        assert!(out.mean_error > 0.0);
    }

    #[test]
    fn test_hdr_rejects_infinite_pixel() {
        let mut reference = solid([0.5; 3], 4, 4);
        reference.buf_mut()[5] = RGB::new(f32::INFINITY, 1.0, 1.0);
        let test = solid([0.5; 3], 4, 4);
        let result = Flip::default().evaluate(reference.as_ref(), test.as_ref(), DynamicRange::Hdr);
        match result {
            Err(Error::MetricCalculation { reason, .. }) => {
                assert!(reason.contains("reference"), "{reason}");
                assert!(reason.contains("(1, 1)"), "{reason}");
            }
            other => panic!("expected a metric error, got {other:?}"),
        }

        let result = Flip::default().evaluate(test.as_ref(), reference.as_ref(), DynamicRange::Hdr);
        assert!(matches!(result, Err(Error::MetricCalculation { .. })));
    }

    #[test]
    fn test_ldr_parameters_have_no_exposures() {
        let img = solid([0.5; 3], 4, 4);
        let out = Flip::default()
            .evaluate(img.as_ref(), img.as_ref(), DynamicRange::Ldr)
            .unwrap();
        assert!(out.parameters.exposures.is_none());
        assert!((out.parameters.ppd - 67.0206).abs() < 1e-2);
    }

    #[test]
    fn test_rejects_non_positive_ppd() {
        let viewing = ViewingCondition::default().with_ppd_override(0.0);
        assert!(matches!(Flip::new(&viewing), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_parallel_rows_give_same_result() {
        let reference = gradient(20, 12);
        let test = solid([0.4, 0.2, 0.7], 20, 12);
        let a = Flip::default()
            .evaluate(reference.as_ref(), test.as_ref(), DynamicRange::Ldr)
            .unwrap();
        let b = Flip::default()
            .with_parallel_rows(true)
            .evaluate(reference.as_ref(), test.as_ref(), DynamicRange::Ldr)
            .unwrap();
        assert_eq!(a.error_map.buf(), b.error_map.buf());
    }

    #[test]
    fn test_remap_knee() {
        let cmax = 40.0;
        assert!((remap_color(PC * cmax, cmax) - PT).abs() < 1e-6);
        assert!((remap_color(cmax, cmax) - 1.0).abs() < 1e-6);
        assert_eq!(remap_color(0.0, cmax), 0.0);
    }
}
