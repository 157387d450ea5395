//! Viewing condition modeling for the perceptual metric.
//!
//! FLIP filters images with contrast sensitivity functions expressed in cycles
//! per degree of visual angle, so it needs to know how many image pixels fall
//! within one degree. That number (PPD, pixels per degree) follows from the
//! monitor geometry and the observer distance:
//!
//! ```text
//! ppd = distance * (resolution_x / width) * (pi / 180)
//! ```
//!
//! The default condition is a 0.7 m wide 4K monitor viewed from 0.7 m, which
//! gives roughly 67 PPD.

use serde::{Deserialize, Serialize};

/// Viewing condition used to derive pixels per degree.
///
/// # Example
///
/// ```
/// use flip_batch::ViewingCondition;
///
/// let condition = ViewingCondition::default();
/// assert!((condition.pixels_per_degree() - 67.0206).abs() < 1e-3);
///
/// let laptop = ViewingCondition::laptop();
/// assert!(laptop.pixels_per_degree() < condition.pixels_per_degree());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewingCondition {
    /// Distance from the observer to the monitor, in meters.
    pub monitor_distance: f64,

    /// Physical width of the monitor, in meters.
    pub monitor_width: f64,

    /// Horizontal resolution of the monitor, in pixels.
    pub monitor_resolution_x: f64,

    /// Override for the computed PPD.
    ///
    /// If `Some`, this value is used directly instead of computing from
    /// the monitor geometry.
    pub ppd: Option<f64>,
}

impl ViewingCondition {
    /// Create a viewing condition from monitor geometry.
    #[must_use]
    pub fn new(monitor_distance: f64, monitor_width: f64, monitor_resolution_x: f64) -> Self {
        Self {
            monitor_distance,
            monitor_width,
            monitor_resolution_x,
            ppd: None,
        }
    }

    /// Desktop 4K monitor, 0.7 m wide, viewed from 0.7 m (~67 PPD).
    #[must_use]
    pub fn desktop_4k() -> Self {
        Self::new(0.7, 0.7, 3840.0)
    }

    /// Desktop 1080p monitor, 0.53 m wide, viewed from 0.6 m (~38 PPD).
    #[must_use]
    pub fn desktop_1080p() -> Self {
        Self::new(0.6, 0.53, 1920.0)
    }

    /// Laptop panel, 0.31 m wide at 1920 px, viewed from 0.45 m (~49 PPD).
    #[must_use]
    pub fn laptop() -> Self {
        Self::new(0.45, 0.31, 1920.0)
    }

    /// Use a fixed PPD regardless of geometry.
    #[must_use]
    pub fn with_ppd_override(mut self, ppd: f64) -> Self {
        self.ppd = Some(ppd);
        self
    }

    /// Pixels per degree of visual angle for this condition.
    #[must_use]
    pub fn pixels_per_degree(&self) -> f64 {
        if let Some(ppd) = self.ppd {
            return ppd;
        }
        self.monitor_distance * (self.monitor_resolution_x / self.monitor_width)
            * (std::f64::consts::PI / 180.0)
    }
}

impl Default for ViewingCondition {
    fn default() -> Self {
        Self::desktop_4k()
    }
}
