//! Batch comparison runner.
//!
//! [`BatchRunner`] lists both directories, matches test renders to
//! references, evaluates the metric for every pair and writes one error map
//! per pair. A failing pair is recorded in the [`RunSummary`] and the batch
//! moves on; only unreadable input directories, a table with a different
//! header and table/report write errors abort a run.
//!
//! # Example
//!
//! ```rust,ignore
//! use flip_batch::batch::{BatchConfig, BatchRunner};
//!
//! let config = BatchConfig::builder()
//!     .reference_dir("dump/ref")
//!     .test_dir("dump/breakfast_reflection")
//!     .output_dir("dump/results")
//!     .build()?;
//!
//! let summary = BatchRunner::new(config)?.run()?;
//! println!("{} ok, {} failed", summary.succeeded(), summary.failed());
//! ```

use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::config::BatchConfig;
use super::discovery::list_images;
use super::label::Label;
use super::matching::{ImagePair, ImageRef, ImageTest, MatchPlan};
use super::report::{
    ComparisonResult, OutputNames, PairFailure, ResultRow, RunReport, RunSummary, append_table,
};
use crate::colormap::save_error_map;
use crate::decode::load_linear_rgb;
use crate::error::{Error, Result};
use crate::metrics::flip::Flip;
use crate::metrics::{DynamicRange, MetricOutput, PerceptualMetric};
use crate::stats::Summary;

/// Runs batches of reference/test comparisons.
pub struct BatchRunner {
    config: BatchConfig,
    metric: Arc<dyn PerceptualMetric>,
}

impl BatchRunner {
    /// Create a runner using FLIP for the configured viewing condition.
    pub fn new(config: BatchConfig) -> Result<Self> {
        config.validate()?;
        let metric = Flip::new(&config.viewing)?.with_tone_mapper(config.tone_mapper);
        Ok(Self {
            config,
            metric: Arc::new(metric),
        })
    }

    /// Create a runner with a caller-supplied metric.
    #[must_use]
    pub fn with_metric(config: BatchConfig, metric: Arc<dyn PerceptualMetric>) -> Self {
        Self { config, metric }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// List both directories and match them.
    ///
    /// # Errors
    ///
    /// [`Error::DirectoryUnreadable`] if either directory cannot be listed.
    pub fn plan(&self) -> Result<MatchPlan> {
        let references = list_images(&self.config.reference_dir)?;
        let tests = list_images(&self.config.test_dir)?;
        let plan = self.config.matcher().plan(&references, &tests);
        debug!(
            references = references.len(),
            tests = tests.len(),
            pairs = plan.pairs.len(),
            ambiguous = plan.ambiguous.len(),
            skipped = plan.skipped.len(),
            "matching done"
        );
        Ok(plan)
    }

    /// Run the whole batch.
    pub fn run(&self) -> Result<RunSummary> {
        info!(config = %self.config.summary(), metric = self.metric.name(), "starting batch");
        let plan = self.plan()?;
        self.run_plan(plan)
    }

    /// Evaluate an already computed plan.
    pub fn run_plan(&self, plan: MatchPlan) -> Result<RunSummary> {
        if let Some(table) = &self.config.table {
            table.check_existing_header()?;
        }

        let mut summary = RunSummary {
            reference_dir: Some(self.config.reference_dir.clone()),
            test_dir: Some(self.config.test_dir.clone()),
            ..RunSummary::default()
        };

        for skipped in &plan.skipped {
            warn!(
                test = %skipped.path.display(),
                label = skipped.label.as_ref().map(Label::as_str),
                reason = %skipped.reason,
                "skipping test image"
            );
        }
        summary.skipped = plan.skipped;

        for ambiguous in plan.ambiguous {
            let error = Error::AmbiguousMatch {
                label: ambiguous.test.label.to_string(),
                candidates: ambiguous.candidates,
            };
            warn!(test = %ambiguous.test.path.display(), error = %error, "pair rejected");
            summary.failures.push(PairFailure {
                label: ambiguous.test.label.to_string(),
                reference: None,
                test: ambiguous.test.path,
                kind: error.kind(),
                message: error.to_string(),
            });
        }

        if plan.pairs.is_empty() {
            warn!(
                reference_dir = %self.config.reference_dir.display(),
                test_dir = %self.config.test_dir.display(),
                "no pairs matched"
            );
        } else {
            std::fs::create_dir_all(&self.config.output_dir)?;
            self.evaluate_pairs(&plan.pairs, &mut summary)?;
        }

        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            skipped = summary.skipped_count(),
            "batch finished"
        );

        self.write_outputs(&summary)?;
        Ok(summary)
    }

    /// Compare one explicit pair of files.
    ///
    /// `label` names the output; it defaults to the label extracted from the
    /// test filename, or the test file stem.
    pub fn run_pair(
        &self,
        reference: &Path,
        test: &Path,
        label: Option<&str>,
    ) -> Result<ComparisonResult> {
        let label = match label {
            Some(l) => Label::new(l)
                .ok_or_else(|| Error::InvalidConfig("output label is empty".to_string()))?,
            None => self.default_label(test)?,
        };
        if label.as_str().contains(['/', '\\']) {
            return Err(Error::InvalidConfig(format!(
                "output label '{label}' contains a path separator"
            )));
        }

        let pair = ImagePair {
            reference: ImageRef::from_path(reference, &self.config.label_rule),
            test: ImageTest {
                path: test.to_path_buf(),
                stem: test
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                label,
            },
        };

        std::fs::create_dir_all(&self.config.output_dir)?;
        let (mode, output) = self.evaluate(&pair);
        let result = output.and_then(|o| self.finish(&pair, mode, o, &mut OutputNames::new()));

        match &result {
            Ok(r) => info!(
                label = %r.label,
                mean_error = r.mean_error,
                output = %r.output_path.display(),
                "pair compared"
            ),
            Err(e) => warn!(test = %test.display(), error = %e, "pair failed"),
        }

        let result = result?;
        if let Some(table) = &self.config.table {
            let row = ResultRow {
                label: result.label.to_string(),
                parameters: table.columns.clone(),
                mean_error: result.mean_error,
            };
            append_table(table, &[row])?;
        }
        Ok(result)
    }

    fn default_label(&self, test: &Path) -> Result<Label> {
        if let Some(label) = self.config.label_rule.extract_from_path(test) {
            return Ok(label);
        }
        test.file_stem()
            .and_then(|s| Label::new(s.to_string_lossy()))
            .ok_or_else(|| {
                Error::InvalidConfig(format!("cannot derive a label from {}", test.display()))
            })
    }

    fn evaluate_pairs(&self, pairs: &[ImagePair], summary: &mut RunSummary) -> Result<()> {
        let mut names = OutputNames::new();

        if self.config.threads == 1 {
            for pair in pairs {
                let (mode, output) = self.evaluate(pair);
                self.record(pair, mode, output, &mut names, summary);
            }
            return Ok(());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("cannot start worker pool: {e}")))?;
        let chunk = pool.current_num_threads().max(1) * 2;
        debug!(threads = pool.current_num_threads(), "evaluating in parallel");

        // Error maps of one chunk are held at a time; naming and saving stay
        // on this thread in pair order.
        for batch in pairs.chunks(chunk) {
            let outputs: Vec<_> =
                pool.install(|| batch.par_iter().map(|p| self.evaluate(p)).collect());
            for (pair, (mode, output)) in batch.iter().zip(outputs) {
                self.record(pair, mode, output, &mut names, summary);
            }
        }
        Ok(())
    }

    fn evaluate(&self, pair: &ImagePair) -> (DynamicRange, Result<MetricOutput>) {
        let mode = self
            .config
            .mode
            .resolve(&pair.reference.path, &pair.test.path);
        let output = load_linear_rgb(&pair.reference.path).and_then(|reference| {
            let test = load_linear_rgb(&pair.test.path)?;
            self.metric.evaluate(reference.as_ref(), test.as_ref(), mode)
        });
        (mode, output)
    }

    fn record(
        &self,
        pair: &ImagePair,
        mode: DynamicRange,
        output: Result<MetricOutput>,
        names: &mut OutputNames,
        summary: &mut RunSummary,
    ) {
        match output.and_then(|o| self.finish(pair, mode, o, names)) {
            Ok(result) => {
                info!(
                    label = %result.label,
                    mode = %mode,
                    mean_error = result.mean_error,
                    output = %result.output_path.display(),
                    "pair compared"
                );
                summary.results.push(result);
            }
            Err(error) => {
                warn!(
                    label = %pair.label(),
                    reference = %pair.reference.path.display(),
                    test = %pair.test.path.display(),
                    error = %error,
                    "pair failed"
                );
                summary.failures.push(PairFailure::new(pair, &error));
            }
        }
    }

    fn finish(
        &self,
        pair: &ImagePair,
        mode: DynamicRange,
        output: MetricOutput,
        names: &mut OutputNames,
    ) -> Result<ComparisonResult> {
        let MetricOutput {
            error_map,
            mean_error,
            parameters,
        } = output;

        if !mean_error.is_finite() || mean_error < 0.0 {
            return Err(Error::MetricCalculation {
                metric: self.metric.name().to_string(),
                reason: format!("invalid mean error {mean_error}"),
            });
        }

        let name = names.claim(pair.label(), mean_error);
        let output_path = self.config.output_dir.join(name);
        save_error_map(
            error_map.as_ref(),
            self.config.color_map,
            self.config.color_scale,
            &output_path,
        )?;

        Ok(ComparisonResult {
            label: pair.label().clone(),
            reference: pair.reference.path.clone(),
            test: pair.test.path.clone(),
            mean_error,
            width: error_map.width(),
            height: error_map.height(),
            mode,
            parameters,
            stats: Summary::of_error_map(error_map.buf()),
            output_path,
            error_map: self.config.keep_error_maps.then_some(error_map),
        })
    }

    fn write_outputs(&self, summary: &RunSummary) -> Result<()> {
        if let Some(table) = &self.config.table {
            let rows = summary.rows(&table.columns);
            if !rows.is_empty() {
                append_table(table, &rows)?;
                debug!(path = %table.path.display(), rows = rows.len(), "table written");
            }
        }
        if let Some(path) = &self.config.report {
            RunReport::new(summary.clone(), self.metric.name(), self.config.summary())
                .write_json(path)?;
            debug!(path = %path.display(), "report written");
        }
        Ok(())
    }
}
