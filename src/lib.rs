//! # flip-batch
//!
//! Batch perceptual comparison of rendered images.
//!
//! Test renders are paired with reference renders by a label taken from their
//! filenames. Every pair is scored with FLIP, and the error map is written as
//! `<label>_<meanError>.png`. Results can also be appended to a CSV table and
//! a JSON report.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flip_batch::{BatchConfig, BatchRunner, ModeSelection};
//!
//! let config = BatchConfig::builder()
//!     .reference_dir("dump/ref")
//!     .test_dir("dump/test")
//!     .output_dir("dump/results")
//!     .mode(ModeSelection::Auto)
//!     .build()?;
//!
//! let summary = BatchRunner::new(config)?.run()?;
//! ```
//!
//! ## Modules
//!
//! - [`error`]: Error types for the library
//! - [`viewing`]: Viewing condition modeling for perceptual metrics
//! - [`decode`]: Loading images into linear RGB
//! - [`metrics`]: The metric trait and the FLIP implementation
//! - [`colormap`]: Error map rendering
//! - [`stats`]: Descriptive statistics
//! - [`batch`]: Discovery, matching, the runner and its reports

pub mod batch;
pub mod colormap;
pub mod decode;
pub mod error;
pub mod metrics;
pub mod stats;
pub mod viewing;

// Re-export commonly used types
pub use batch::{
    AmbiguityPolicy, BatchConfig, BatchRunner, ComparisonResult, Label, LabelRule, MatchStrategy,
    ModeSelection, PairFailure, RunSummary, TableConfig,
};
pub use colormap::{ColorMap, ColorScale};
pub use error::{Error, ErrorKind, Result};
pub use metrics::flip::Flip;
pub use metrics::tonemap::ToneMapper;
pub use metrics::{DynamicRange, MetricOutput, PerceptualMetric};
pub use stats::Summary;
pub use viewing::ViewingCondition;
