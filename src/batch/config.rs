//! Batch run configuration.
//!
//! [`BatchConfig`] is built with [`BatchConfig::builder`] or loaded from a
//! JSON job file holding several runs:
//!
//! ```json
//! {
//!   "jobs": [
//!     {
//!       "name": "breakfast-reflection",
//!       "reference_dir": "dump/ref",
//!       "test_dir": "dump/breakfast_reflection",
//!       "output_dir": "dump/breakfast_reflection_results",
//!       "table": { "path": "flipresults.csv", "columns": [{ "name": "Step Size", "value": "0.5" }] }
//!     }
//!   ]
//! }
//! ```
//!
//! Fields left out take their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::label::LabelRule;
use super::matching::{AmbiguityPolicy, MatchStrategy, PairMatcher};
use super::report::TableConfig;
use crate::colormap::{ColorMap, ColorScale};
use crate::error::{Error, Result};
use crate::metrics::DynamicRange;
use crate::metrics::tonemap::ToneMapper;
use crate::viewing::ViewingCondition;

/// How the dynamic range of a pair is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeSelection {
    /// Always LDR.
    #[default]
    Ldr,
    /// Always HDR.
    Hdr,
    /// HDR when either file is `exr` or `hdr`, LDR otherwise.
    Auto,
}

impl ModeSelection {
    /// Resolve the mode for a pair of files.
    #[must_use]
    pub fn resolve(self, reference: &Path, test: &Path) -> DynamicRange {
        match self {
            Self::Ldr => DynamicRange::Ldr,
            Self::Hdr => DynamicRange::Hdr,
            Self::Auto => {
                if DynamicRange::from_extension(reference) == DynamicRange::Hdr
                    || DynamicRange::from_extension(test) == DynamicRange::Hdr
                {
                    DynamicRange::Hdr
                } else {
                    DynamicRange::Ldr
                }
            }
        }
    }
}

impl std::fmt::Display for ModeSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ldr => write!(f, "ldr"),
            Self::Hdr => write!(f, "hdr"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl std::str::FromStr for ModeSelection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ldr" => Ok(Self::Ldr),
            "hdr" => Ok(Self::Hdr),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown mode '{other}' (expected ldr, hdr, auto)")),
        }
    }
}

/// Configuration for one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Directory of reference renders.
    pub reference_dir: PathBuf,

    /// Directory of test renders.
    pub test_dir: PathBuf,

    /// Directory error maps are written to.
    pub output_dir: PathBuf,

    /// Dynamic range selection.
    pub mode: ModeSelection,

    /// Label extraction rule.
    pub label_rule: LabelRule,

    /// Matching strategy.
    pub strategy: MatchStrategy,

    /// Ambiguity policy.
    pub on_ambiguous: AmbiguityPolicy,

    /// Color map for saved error maps.
    pub color_map: ColorMap,

    /// Error range spread over the color map.
    pub color_scale: ColorScale,

    /// Tone mapper for HDR pairs.
    pub tone_mapper: ToneMapper,

    /// Viewing condition for the metric.
    pub viewing: ViewingCondition,

    /// Results table, if any.
    pub table: Option<TableConfig>,

    /// JSON report path, if any.
    pub report: Option<PathBuf>,

    /// Worker threads: 1 runs sequentially, 0 uses all cores.
    pub threads: usize,

    /// Keep error maps in the returned results.
    pub keep_error_maps: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            reference_dir: PathBuf::from("dump/ref"),
            test_dir: PathBuf::from("dump/test"),
            output_dir: PathBuf::from("dump/results"),
            mode: ModeSelection::default(),
            label_rule: LabelRule::default(),
            strategy: MatchStrategy::default(),
            on_ambiguous: AmbiguityPolicy::default(),
            color_map: ColorMap::default(),
            color_scale: ColorScale::default(),
            tone_mapper: ToneMapper::default(),
            viewing: ViewingCondition::default(),
            table: None,
            report: None,
            threads: 1,
            keep_error_maps: false,
        }
    }
}

impl BatchConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder::default()
    }

    /// Matcher for this configuration.
    #[must_use]
    pub fn matcher(&self) -> PairMatcher {
        PairMatcher::new(
            self.label_rule.clone(),
            self.strategy.clone(),
            self.on_ambiguous,
        )
    }

    /// Check values that cannot be expressed in the types.
    pub fn validate(&self) -> Result<()> {
        let ppd = self.viewing.pixels_per_degree();
        if !ppd.is_finite() || ppd <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "pixels per degree must be positive, got {ppd}"
            )));
        }
        if let Some(table) = &self.table {
            if !table.delimiter.is_ascii() {
                return Err(Error::InvalidConfig(format!(
                    "table delimiter '{}' is not ASCII",
                    table.delimiter
                )));
            }
        }
        Ok(())
    }

    /// One-line description for logs and reports.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "reference_dir={} test_dir={} output_dir={} mode={} strategy={} on_ambiguous={} color_map={} color_scale={} ppd={:.2}",
            self.reference_dir.display(),
            self.test_dir.display(),
            self.output_dir.display(),
            self.mode,
            self.strategy,
            self.on_ambiguous,
            self.color_map,
            self.color_scale,
            self.viewing.pixels_per_degree(),
        )
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug, Default)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    /// Set the reference directory.
    #[must_use]
    pub fn reference_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.reference_dir = path.into();
        self
    }

    /// Set the test directory.
    #[must_use]
    pub fn test_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.test_dir = path.into();
        self
    }

    /// Set the output directory.
    #[must_use]
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_dir = path.into();
        self
    }

    /// Set the dynamic range selection.
    #[must_use]
    pub fn mode(mut self, mode: ModeSelection) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set the label extraction rule.
    #[must_use]
    pub fn label_rule(mut self, rule: LabelRule) -> Self {
        self.config.label_rule = rule;
        self
    }

    /// Set the matching strategy.
    #[must_use]
    pub fn strategy(mut self, strategy: MatchStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Set the ambiguity policy.
    #[must_use]
    pub fn on_ambiguous(mut self, policy: AmbiguityPolicy) -> Self {
        self.config.on_ambiguous = policy;
        self
    }

    /// Set the error-map color map.
    #[must_use]
    pub fn color_map(mut self, color_map: ColorMap) -> Self {
        self.config.color_map = color_map;
        self
    }

    /// Set the color scale of saved error maps.
    #[must_use]
    pub fn color_scale(mut self, scale: ColorScale) -> Self {
        self.config.color_scale = scale;
        self
    }

    /// Set the HDR tone mapper.
    #[must_use]
    pub fn tone_mapper(mut self, tone_mapper: ToneMapper) -> Self {
        self.config.tone_mapper = tone_mapper;
        self
    }

    /// Set the viewing condition.
    #[must_use]
    pub fn viewing(mut self, viewing: ViewingCondition) -> Self {
        self.config.viewing = viewing;
        self
    }

    /// Write a results table.
    #[must_use]
    pub fn table(mut self, table: TableConfig) -> Self {
        self.config.table = Some(table);
        self
    }

    /// Write a JSON report.
    #[must_use]
    pub fn report(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.report = Some(path.into());
        self
    }

    /// Set the number of worker threads.
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.config.threads = threads;
        self
    }

    /// Keep error maps in the results.
    #[must_use]
    pub fn keep_error_maps(mut self, keep: bool) -> Self {
        self.config.keep_error_maps = keep;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if the viewing condition gives a non-positive
    /// PPD or the table delimiter is not ASCII.
    pub fn build(self) -> Result<BatchConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// A named batch run inside a job file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    /// Job name used in logs.
    #[serde(default)]
    pub name: Option<String>,

    /// Run configuration.
    #[serde(flatten)]
    pub config: BatchConfig,
}

impl BatchJob {
    /// Name for logs: the job name, or the test directory.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.config.test_dir.display().to_string())
    }
}

/// Several batch runs loaded from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobFile {
    /// Runs in execution order.
    pub jobs: Vec<BatchJob>,
}

impl JobFile {
    /// Load and validate a job file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        let file: Self = serde_json::from_str(&text)?;
        for job in &file.jobs {
            job.config.validate()?;
        }
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BatchConfig::builder().build().unwrap();
        assert_eq!(config.reference_dir, PathBuf::from("dump/ref"));
        assert_eq!(config.test_dir, PathBuf::from("dump/test"));
        assert_eq!(config.output_dir, PathBuf::from("dump/results"));
        assert_eq!(config.mode, ModeSelection::Ldr);
        assert_eq!(config.on_ambiguous, AmbiguityPolicy::CompareAll);
        assert_eq!(config.color_map, ColorMap::Viridis);
        assert_eq!(config.color_scale, ColorScale::Fixed);
        assert_eq!(config.threads, 1);
        assert!(config.table.is_none());
    }

    #[test]
    fn test_builder_rejects_bad_ppd() {
        let result = BatchConfig::builder()
            .viewing(ViewingCondition::default().with_ppd_override(0.0))
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_mode_resolution() {
        let png = Path::new("a.png");
        let exr = Path::new("a.exr");
        assert_eq!(ModeSelection::Auto.resolve(png, png), DynamicRange::Ldr);
        assert_eq!(ModeSelection::Auto.resolve(exr, png), DynamicRange::Hdr);
        assert_eq!(ModeSelection::Ldr.resolve(exr, exr), DynamicRange::Ldr);
        assert_eq!(ModeSelection::Hdr.resolve(png, png), DynamicRange::Hdr);
        assert_eq!("AUTO".parse::<ModeSelection>(), Ok(ModeSelection::Auto));
    }

    #[test]
    fn test_job_file_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(
            &path,
            r#"{
                "jobs": [
                    { "name": "reflection", "test_dir": "dump/reflection", "on_ambiguous": "reject" },
                    {
                        "test_dir": "dump/gi",
                        "strategy": "exact",
                        "mode": "auto",
                        "color_scale": "normalized",
                        "label_rule": { "end_markers": ["_v"] },
                        "table": { "path": "gi.csv", "label_column": true }
                    }
                ]
            }"#,
        )
        .unwrap();

        let file = JobFile::load(&path).unwrap();
        assert_eq!(file.jobs.len(), 2);

        let first = &file.jobs[0];
        assert_eq!(first.display_name(), "reflection");
        assert_eq!(first.config.reference_dir, PathBuf::from("dump/ref"));
        assert_eq!(first.config.on_ambiguous, AmbiguityPolicy::Reject);

        let second = &file.jobs[1];
        assert_eq!(second.display_name(), "dump/gi");
        assert!(matches!(second.config.strategy, MatchStrategy::Exact));
        assert_eq!(second.config.mode, ModeSelection::Auto);
        assert_eq!(second.config.color_scale, ColorScale::Normalized);
        assert_eq!(second.config.label_rule.end_markers, vec!["_v".to_string()]);
        assert_eq!(second.config.label_rule.trim_chars, LabelRule::default().trim_chars);
        let table = second.config.table.as_ref().unwrap();
        assert!(table.label_column);
        assert_eq!(table.header().last().unwrap(), "Mean Error");
    }

    #[test]
    fn test_job_file_missing() {
        let result = JobFile::load(Path::new("/nonexistent/flip-batch/jobs.json"));
        assert!(matches!(result, Err(Error::FileNotFound { .. })));
    }

    #[test]
    fn test_job_file_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(JobFile::load(&path), Err(Error::Json(_))));
    }

    #[test]
    fn test_summary_mentions_dirs() {
        let config = BatchConfig::builder()
            .reference_dir("r")
            .test_dir("t")
            .build()
            .unwrap();
        let summary = config.summary();
        assert!(summary.contains("reference_dir=r"));
        assert!(summary.contains("test_dir=t"));
        assert!(summary.contains("mode=ldr"));
    }
}
