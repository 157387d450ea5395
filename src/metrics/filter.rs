//! Separable spatial filters used by FLIP.
//!
//! Both the contrast sensitivity filters and the edge/point detectors are sums
//! of separable 2D kernels, so every convolution here is a horizontal pass
//! followed by a vertical pass. Borders clamp to the nearest edge pixel.

use imgref::{ImgRef, ImgVec};
use rayon::prelude::*;

use std::f32::consts::PI;

/// One sum-of-Gaussians contrast sensitivity term: `a * sqrt(pi / b) * exp(-pi^2 x^2 / b)`.
#[derive(Debug, Clone, Copy)]
struct CsfTerm {
    a: f32,
    b: f32,
}

// Luminance, red-green and blue-yellow CSF parameters (a1, b1, a2, b2).
const CSF_PARAMS: [[CsfTerm; 2]; 3] = [
    [CsfTerm { a: 1.0, b: 0.0047 }, CsfTerm { a: 0.0, b: 1.0e-5 }],
    [CsfTerm { a: 1.0, b: 0.0053 }, CsfTerm { a: 0.0, b: 1.0e-5 }],
    [CsfTerm { a: 34.1, b: 0.04 }, CsfTerm { a: 13.5, b: 0.025 }],
];

/// A 1D kernel of odd length `2 * radius + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    weights: Vec<f32>,
}

impl Kernel {
    fn from_fn(radius: usize, f: impl Fn(f32) -> f32) -> Self {
        let r = radius as i64;
        let weights = (-r..=r).map(|i| f(i as f32)).collect();
        Self { weights }
    }

    /// Kernel radius in pixels.
    #[must_use]
    pub fn radius(&self) -> usize {
        self.weights.len() / 2
    }

    /// Kernel taps, from offset `-radius` to `+radius`.
    #[must_use]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    fn normalized(mut self) -> Self {
        let sum: f32 = self.weights.iter().sum();
        if sum != 0.0 {
            self.weights.iter_mut().for_each(|w| *w /= sum);
        }
        self
    }

    /// Scale positive taps to sum to 1 and negative taps to sum to -1.
    fn normalized_signed(mut self) -> Self {
        let pos: f32 = self.weights.iter().filter(|w| **w > 0.0).sum();
        let neg: f32 = -self.weights.iter().filter(|w| **w < 0.0).sum::<f32>();
        for w in &mut self.weights {
            if *w > 0.0 && pos > 0.0 {
                *w /= pos;
            } else if *w < 0.0 && neg > 0.0 {
                *w /= neg;
            }
        }
        self
    }
}

#[inline]
fn clamp_index(i: i64, len: usize) -> usize {
    i.clamp(0, len as i64 - 1) as usize
}

/// Convolve a plane with `horizontal` along rows then `vertical` along columns.
pub fn convolve_separable(
    src: ImgRef<'_, f32>,
    horizontal: &Kernel,
    vertical: &Kernel,
    parallel: bool,
) -> ImgVec<f32> {
    let width = src.width();
    let height = src.height();
    let stride = src.stride();
    let buf = src.buf();

    let mut tmp = vec![0.0f32; width * height];
    let hr = horizontal.radius() as i64;
    let row_pass = |(y, out_row): (usize, &mut [f32])| {
        let row = &buf[y * stride..y * stride + width];
        for (x, out) in out_row.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (k, w) in horizontal.weights.iter().enumerate() {
                let sx = clamp_index(x as i64 + k as i64 - hr, width);
                acc += w * row[sx];
            }
            *out = acc;
        }
    };
    if parallel {
        tmp.par_chunks_mut(width).enumerate().for_each(row_pass);
    } else {
        tmp.chunks_mut(width).enumerate().for_each(row_pass);
    }

    let mut out = vec![0.0f32; width * height];
    let vr = vertical.radius() as i64;
    let column_pass = |(y, out_row): (usize, &mut [f32])| {
        for (k, w) in vertical.weights.iter().enumerate() {
            let sy = clamp_index(y as i64 + k as i64 - vr, height);
            let src_row = &tmp[sy * width..(sy + 1) * width];
            for (o, s) in out_row.iter_mut().zip(src_row) {
                *o += w * s;
            }
        }
    };
    if parallel {
        out.par_chunks_mut(width).enumerate().for_each(column_pass);
    } else {
        out.chunks_mut(width).enumerate().for_each(column_pass);
    }

    ImgVec::new(out, width, height)
}

/// Contrast sensitivity filters for the three YCxCz channels.
#[derive(Debug, Clone)]
pub struct CsfFilter {
    /// Per channel: (coefficient, 1D kernel) for each non-zero term.
    channels: [Vec<(f32, Kernel)>; 3],
}

impl CsfFilter {
    /// Build the filters for a viewing distance of `ppd` pixels per degree.
    #[must_use]
    pub fn new(ppd: f32) -> Self {
        let max_b = CSF_PARAMS
            .iter()
            .flatten()
            .map(|t| t.b)
            .fold(0.0f32, f32::max);
        let radius = (3.0 * (max_b / (2.0 * PI * PI)).sqrt() * ppd).ceil() as usize;
        let dx = 1.0 / ppd;

        let channels = CSF_PARAMS.map(|terms| {
            let kernels: Vec<(f32, Kernel)> = terms
                .iter()
                .filter(|t| t.a > 0.0)
                .map(|t| {
                    let k = Kernel::from_fn(radius, |i| {
                        let x = i * dx;
                        (-PI * PI * x * x / t.b).exp()
                    });
                    (t.a * (PI / t.b).sqrt(), k)
                })
                .collect();

            // 2D sum of each separable term is scale * (sum of 1D taps)^2.
            let total: f32 = kernels
                .iter()
                .map(|(scale, k)| {
                    let s: f32 = k.weights.iter().sum();
                    scale * s * s
                })
                .sum();
            kernels
                .into_iter()
                .map(|(scale, k)| (scale / total, k))
                .collect()
        });

        Self { channels }
    }

    /// Filter radius in pixels.
    #[must_use]
    pub fn radius(&self) -> usize {
        self.channels[0].first().map_or(0, |(_, k)| k.radius())
    }

    /// Filter one channel (0 = Y, 1 = Cx, 2 = Cz).
    pub fn apply(&self, channel: usize, plane: ImgRef<'_, f32>, parallel: bool) -> ImgVec<f32> {
        let mut acc = vec![0.0f32; plane.width() * plane.height()];
        for (coeff, kernel) in &self.channels[channel] {
            let filtered = convolve_separable(plane, kernel, kernel, parallel);
            for (a, v) in acc.iter_mut().zip(filtered.buf()) {
                *a += coeff * v;
            }
        }
        ImgVec::new(acc, plane.width(), plane.height())
    }
}

/// Edge and point detectors on normalized luminance.
#[derive(Debug, Clone)]
pub struct FeatureFilter {
    gaussian: Kernel,
    first_derivative: Kernel,
    second_derivative: Kernel,
}

/// Edge and point strength planes.
#[derive(Debug, Clone)]
pub struct Features {
    pub edges: ImgVec<f32>,
    pub points: ImgVec<f32>,
}

impl FeatureFilter {
    /// Build detectors with standard deviation `0.5 * width * ppd` pixels.
    #[must_use]
    pub fn new(ppd: f32, feature_width: f32) -> Self {
        let sigma = 0.5 * feature_width * ppd;
        let radius = (3.0 * sigma).ceil().max(1.0) as usize;
        let inv_two_sigma_sq = 1.0 / (2.0 * sigma * sigma);
        let g = |x: f32| (-x * x * inv_two_sigma_sq).exp();

        Self {
            gaussian: Kernel::from_fn(radius, g).normalized(),
            first_derivative: Kernel::from_fn(radius, |x| -x * g(x)).normalized_signed(),
            second_derivative: Kernel::from_fn(radius, |x| (x * x / (sigma * sigma) - 1.0) * g(x))
                .normalized_signed(),
        }
    }

    /// Detector radius in pixels.
    #[must_use]
    pub fn radius(&self) -> usize {
        self.gaussian.radius()
    }

    /// Compute edge and point magnitudes of a luminance plane.
    pub fn detect(&self, luma: ImgRef<'_, f32>, parallel: bool) -> Features {
        let magnitude = |derivative: &Kernel| {
            let dx = convolve_separable(luma, derivative, &self.gaussian, parallel);
            let dy = convolve_separable(luma, &self.gaussian, derivative, parallel);
            let buf: Vec<f32> = dx
                .buf()
                .iter()
                .zip(dy.buf())
                .map(|(x, y)| (x * x + y * y).sqrt())
                .collect();
            ImgVec::new(buf, luma.width(), luma.height())
        };

        Features {
            edges: magnitude(&self.first_derivative),
            points: magnitude(&self.second_derivative),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_plane(value: f32, width: usize, height: usize) -> ImgVec<f32> {
        ImgVec::new(vec![value; width * height], width, height)
    }

    #[test]
    fn test_csf_preserves_constant_plane() {
        let filter = CsfFilter::new(67.0);
        let plane = constant_plane(0.42, 16, 12);
        for channel in 0..3 {
            let out = filter.apply(channel, plane.as_ref(), false);
            assert_eq!(out.width(), 16);
            assert_eq!(out.height(), 12);
            for v in out.buf() {
                assert!((v - 0.42).abs() < 1e-4, "channel {channel}: {v}");
            }
        }
    }

    #[test]
    fn test_csf_radius_at_default_ppd() {
        // 3 * sqrt(0.04 / (2 pi^2)) * 67 = 9.05
        assert_eq!(CsfFilter::new(67.02).radius(), 10);
    }

    #[test]
    fn test_signed_normalization() {
        let filter = FeatureFilter::new(67.0, 0.082);
        for kernel in [&filter.first_derivative, &filter.second_derivative] {
            let pos: f32 = kernel.weights().iter().filter(|w| **w > 0.0).sum();
            let neg: f32 = kernel.weights().iter().filter(|w| **w < 0.0).sum();
            assert!((pos - 1.0).abs() < 1e-5);
            assert!((neg + 1.0).abs() < 1e-5);
        }
        let sum: f32 = filter.gaussian.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_no_features_in_flat_plane() {
        let filter = FeatureFilter::new(67.0, 0.082);
        let features = filter.detect(constant_plane(0.5, 8, 8).as_ref(), false);
        assert!(features.edges.buf().iter().all(|v| v.abs() < 1e-5));
        assert!(features.points.buf().iter().all(|v| v.abs() < 1e-5));
    }

    #[test]
    fn test_edge_detected_at_step() {
        let width = 32;
        let height = 8;
        let buf: Vec<f32> = (0..width * height)
            .map(|i| if i % width < width / 2 { 0.0 } else { 1.0 })
            .collect();
        let plane = ImgVec::new(buf, width, height);
        let filter = FeatureFilter::new(67.0, 0.082);
        let features = filter.detect(plane.as_ref(), false);
        let at_step = features.edges.buf()[4 * width + width / 2];
        let far = features.edges.buf()[4 * width + 1];
        assert!(at_step > 0.1, "edge response {at_step}");
        assert!(far < 1e-4, "far response {far}");
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let width = 20;
        let height = 9;
        let buf: Vec<f32> = (0..width * height).map(|i| ((i * 37) % 17) as f32 / 17.0).collect();
        let plane = ImgVec::new(buf, width, height);
        let kernel = Kernel::from_fn(3, |x| (-x * x / 4.0).exp()).normalized();
        let a = convolve_separable(plane.as_ref(), &kernel, &kernel, false);
        let b = convolve_separable(plane.as_ref(), &kernel, &kernel, true);
        assert_eq!(a.buf(), b.buf());
    }
}
