//! Tone mapping and exposure range selection for HDR-FLIP.
//!
//! HDR-FLIP evaluates LDR-FLIP on a bracket of exposures of both images. The
//! bracket starts at the exposure where the brightest reference pixel maps to
//! 0.85 after tone mapping and stops where the median pixel does.

use serde::{Deserialize, Serialize};

use super::color::luminance;

/// Tone mapping value at which the exposure range is anchored.
const TARGET_DISPLAY_VALUE: f32 = 0.85;

/// Tone mapping curve applied to each exposure before LDR-FLIP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToneMapper {
    /// Narkowicz's fit of the ACES filmic curve.
    #[default]
    Aces,
    /// Reinhard, `x / (1 + x)`.
    Reinhard,
    /// Hable's Uncharted 2 curve, normalized to a white point of 11.2.
    Hable,
}

impl ToneMapper {
    /// Map a linear value to display range [0, 1].
    #[must_use]
    pub fn apply(self, x: f32) -> f32 {
        let x = x.max(0.0);
        let y = match self {
            Self::Aces => {
                let x = 0.6 * x;
                (x * (2.51 * x + 0.03)) / (x * (2.43 * x + 0.59) + 0.14)
            }
            Self::Reinhard => x / (1.0 + x),
            Self::Hable => hable(x) / hable(11.2),
        };
        y.clamp(0.0, 1.0)
    }

    /// Smallest linear input that maps to `target`.
    fn inverse(self, target: f32) -> f32 {
        let mut lo = 0.0f32;
        let mut hi = 1.0f32;
        while self.apply(hi) < target && hi < 1.0e9 {
            lo = hi;
            hi *= 2.0;
        }
        for _ in 0..64 {
            let mid = 0.5 * (lo + hi);
            if self.apply(mid) < target {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        hi
    }
}

impl std::fmt::Display for ToneMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aces => write!(f, "aces"),
            Self::Reinhard => write!(f, "reinhard"),
            Self::Hable => write!(f, "hable"),
        }
    }
}

impl std::str::FromStr for ToneMapper {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aces" => Ok(Self::Aces),
            "reinhard" => Ok(Self::Reinhard),
            "hable" => Ok(Self::Hable),
            other => Err(format!("unknown tone mapper '{other}' (expected aces, reinhard, hable)")),
        }
    }
}

fn hable(x: f32) -> f32 {
    const A: f32 = 0.15;
    const B: f32 = 0.50;
    const C: f32 = 0.10;
    const D: f32 = 0.20;
    const E: f32 = 0.02;
    const F: f32 = 0.30;
    ((x * (A * x + C * B) + D * E) / (x * (A * x + B) + D * F)) - E / F
}

/// Upper bound on the number of exposures in a bracket.
pub const MAX_EXPOSURES: usize = 64;

/// Exposure bracket, in stops, for an HDR reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExposureRange {
    /// First (darkest) exposure.
    pub start: f32,
    /// Last (brightest) exposure.
    pub stop: f32,
    /// Number of exposures, at least 2.
    pub count: usize,
}

impl ExposureRange {
    /// Exposure of bracket entry `i`.
    #[must_use]
    pub fn exposure(&self, i: usize) -> f32 {
        if self.count < 2 {
            return self.start;
        }
        self.start + i as f32 * (self.stop - self.start) / (self.count - 1) as f32
    }

    /// Derive the bracket from the luminance of a linear reference image.
    ///
    /// Non-finite luminance is ignored. Images with no positive luminance get
    /// a degenerate `[0, 0]` bracket with two entries. The bracket holds at
    /// most [`MAX_EXPOSURES`] entries.
    #[must_use]
    pub fn from_reference<'a>(
        pixels: impl Iterator<Item = &'a [f32; 3]>,
        tone_mapper: ToneMapper,
    ) -> Self {
        let mut lum: Vec<f32> = pixels
            .map(|p| luminance(*p))
            .filter(|l| l.is_finite())
            .map(|l| l.max(0.0))
            .collect();
        lum.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let max = lum.last().copied().unwrap_or(0.0);
        if max <= 0.0 {
            return Self {
                start: 0.0,
                stop: 0.0,
                count: 2,
            };
        }

        let mut median = lum[lum.len() / 2];
        if median <= 0.0 {
            median = lum.iter().copied().find(|v| *v > 0.0).unwrap_or(max);
        }

        let x_max = tone_mapper.inverse(TARGET_DISPLAY_VALUE);
        let start = (x_max / max).log2();
        let stop = (x_max / median).log2();
        let count = ((stop - start).ceil() as usize).clamp(2, MAX_EXPOSURES);

        Self { start, stop, count }
    }
}
