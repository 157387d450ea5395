//! Report types for batch comparison runs.
//!
//! Results are written three ways: one error-map PNG per pair (named by
//! [`OutputNames`]), an optional delimited table with one [`ResultRow`] per
//! pair, and an optional JSON [`RunReport`].

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use imgref::ImgVec;
use serde::{Deserialize, Serialize};

use super::label::Label;
use super::matching::{ImagePair, SkippedTest};
use crate::error::{Error, ErrorKind, Result};
use crate::metrics::{DynamicRange, FlipParameters};
use crate::stats::Summary;

/// Format a mean error with exactly six fractional digits.
///
/// Rounds half to even on the exact binary value.
///
/// # Example
///
/// ```
/// use flip_batch::batch::report::format_mean_error;
///
/// assert_eq!(format_mean_error(0.0), "0.000000");
/// assert_eq!(format_mean_error(0.016_680_499_9), "0.016680");
/// assert_eq!(format_mean_error(0.016_680_500_1), "0.016681");
/// ```
#[must_use]
pub fn format_mean_error(mean_error: f64) -> String {
    format!("{mean_error:.6}")
}

/// `<label>_<meanError>.png`
#[must_use]
pub fn output_file_name(label: &Label, mean_error: f64) -> String {
    format!("{label}_{}.png", format_mean_error(mean_error))
}

/// Output file names claimed during one run.
///
/// A name that was already handed out gets a `_2`, `_3`, ... suffix.
#[derive(Debug, Default)]
pub struct OutputNames {
    used: HashSet<String>,
}

impl OutputNames {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a unique file name for `label` and `mean_error`.
    pub fn claim(&mut self, label: &Label, mean_error: f64) -> String {
        let stem = format!("{label}_{}", format_mean_error(mean_error));
        let mut name = format!("{stem}.png");
        let mut n = 2;
        while self.used.contains(&name) {
            name = format!("{stem}_{n}.png");
            n += 1;
        }
        self.used.insert(name.clone());
        name
    }
}

/// Outcome of one successful comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Label naming the output.
    pub label: Label,

    /// Reference image.
    pub reference: PathBuf,

    /// Test image.
    pub test: PathBuf,

    /// Mean of the error map (>= 0).
    pub mean_error: f64,

    /// Image dimensions.
    pub width: usize,
    pub height: usize,

    /// Mode the pair was compared in.
    pub mode: DynamicRange,

    /// Parameters reported by the metric.
    pub parameters: FlipParameters,

    /// Pooled error-map statistics.
    pub stats: Option<Summary>,

    /// Where the error map was written.
    pub output_path: PathBuf,

    /// The error map itself, only kept when requested.
    #[serde(skip)]
    pub error_map: Option<ImgVec<f32>>,
}

/// A pair (or rejected test) that did not produce a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairFailure {
    /// Label of the pair.
    pub label: String,
    /// Reference image, when one was selected.
    pub reference: Option<PathBuf>,
    /// Test image.
    pub test: PathBuf,
    /// Error classification.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl PairFailure {
    /// Record `error` for `pair`.
    #[must_use]
    pub fn new(pair: &ImagePair, error: &Error) -> Self {
        Self {
            label: pair.label().to_string(),
            reference: Some(pair.reference.path.clone()),
            test: pair.test.path.clone(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Counts and records for one batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Reference directory, for directory runs.
    pub reference_dir: Option<PathBuf>,
    /// Test directory, for directory runs.
    pub test_dir: Option<PathBuf>,
    /// Successful comparisons, in processing order.
    pub results: Vec<ComparisonResult>,
    /// Failed pairs, in processing order.
    pub failures: Vec<PairFailure>,
    /// Tests that were never queued.
    pub skipped: Vec<SkippedTest>,
}

impl RunSummary {
    /// Number of successful comparisons.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.len()
    }

    /// Number of failed pairs.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Number of skipped tests.
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// True when no pair was queued at all.
    #[must_use]
    pub fn no_pairs_matched(&self) -> bool {
        self.results.is_empty() && self.failures.is_empty()
    }

    /// True when pairs were attempted and none succeeded.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        self.results.is_empty() && !self.failures.is_empty()
    }

    /// The `NoPairsMatched` condition as an error, for callers that treat it
    /// as fatal.
    #[must_use]
    pub fn no_pairs_error(&self) -> Option<Error> {
        if !self.no_pairs_matched() {
            return None;
        }
        Some(Error::NoPairsMatched {
            reference_dir: self.reference_dir.clone().unwrap_or_default(),
            test_dir: self.test_dir.clone().unwrap_or_default(),
        })
    }

    /// Table rows for the successful comparisons.
    #[must_use]
    pub fn rows(&self, columns: &[TableColumn]) -> Vec<ResultRow> {
        self.results
            .iter()
            .map(|r| ResultRow {
                label: r.label.to_string(),
                parameters: columns.to_vec(),
                mean_error: r.mean_error,
            })
            .collect()
    }

    /// Pooled statistics over the mean errors of all successful pairs.
    #[must_use]
    pub fn mean_error_summary(&self) -> Option<Summary> {
        let means: Vec<f64> = self.results.iter().map(|r| r.mean_error).collect();
        Summary::compute(&means)
    }
}

/// A named run parameter written as a table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumn {
    /// Header text.
    pub name: String,
    /// Cell value, the same for every row of a run.
    #[serde(default)]
    pub value: String,
}

impl TableColumn {
    /// Create a column.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parse `NAME=VALUE`.
    pub fn parse(s: &str) -> Result<Self> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| Error::InvalidConfig(format!("expected NAME=VALUE, got '{s}'")))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidConfig(format!("empty column name in '{s}'")));
        }
        Ok(Self::new(name, value.trim()))
    }
}

/// Parameter columns written when none are configured.
#[must_use]
pub fn default_columns() -> Vec<TableColumn> {
    ["Step Size", "Sun Step Size", "Density Threshold"]
        .into_iter()
        .map(|name| TableColumn::new(name, ""))
        .collect()
}

/// Header of the error column.
pub const MEAN_ERROR_HEADER: &str = "Mean Error";

/// Layout of the results table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Table file. Appended to if it exists.
    pub path: PathBuf,
    /// Parameter columns, before the error column.
    pub columns: Vec<TableColumn>,
    /// Write a leading `Label` column.
    pub label_column: bool,
    /// Field delimiter (ASCII).
    pub delimiter: char,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("flipresults.csv"),
            columns: default_columns(),
            label_column: false,
            delimiter: ',',
        }
    }
}

impl TableConfig {
    /// Table at `path` with the default columns.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Set a column's value, adding the column if it is not present.
    pub fn set_column(&mut self, column: TableColumn) {
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => existing.value = column.value,
            None => self.columns.push(column),
        }
    }

    /// Header record.
    #[must_use]
    pub fn header(&self) -> Vec<String> {
        let mut header = Vec::with_capacity(self.columns.len() + 2);
        if self.label_column {
            header.push("Label".to_string());
        }
        header.extend(self.columns.iter().map(|c| c.name.clone()));
        header.push(MEAN_ERROR_HEADER.to_string());
        header
    }

    /// Check that an existing table file was written with this layout.
    ///
    /// A missing or empty file passes.
    pub fn check_existing_header(&self) -> Result<()> {
        let delimiter = self.delimiter_byte()?;
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(file);
        let Some(existing) = rdr.records().next().transpose()? else {
            return Ok(());
        };

        let expected = self.header();
        if existing.iter().ne(expected.iter().map(String::as_str)) {
            return Err(Error::InvalidConfig(format!(
                "table {} has header [{}], this run writes [{}]",
                self.path.display(),
                existing.iter().collect::<Vec<_>>().join(", "),
                expected.join(", ")
            )));
        }
        Ok(())
    }

    fn delimiter_byte(&self) -> Result<u8> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                Error::InvalidConfig(format!("table delimiter '{}' is not ASCII", self.delimiter))
            })
    }
}

/// One table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Pair label.
    pub label: String,
    /// Run parameters, in column order.
    pub parameters: Vec<TableColumn>,
    /// Mean error of the pair.
    pub mean_error: f64,
}

impl ResultRow {
    fn record(&self, label_column: bool) -> Vec<String> {
        let mut record = Vec::with_capacity(self.parameters.len() + 2);
        if label_column {
            record.push(self.label.clone());
        }
        record.extend(self.parameters.iter().map(|c| c.value.clone()));
        record.push(self.mean_error.to_string());
        record
    }
}

/// Append `rows` to the table, writing the header if the file is new or
/// empty.
///
/// # Errors
///
/// [`Error::InvalidConfig`] if an existing table has a different header.
pub fn append_table(config: &TableConfig, rows: &[ResultRow]) -> Result<()> {
    let delimiter = config.delimiter_byte()?;
    config.check_existing_header()?;

    if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.path)?;
    let needs_header = file.metadata()?.len() == 0;

    let mut wtr = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_writer(file);

    if needs_header {
        wtr.write_record(config.header())?;
    }
    for row in rows {
        wtr.write_record(row.record(config.label_column))?;
    }
    wtr.flush()?;

    Ok(())
}


/// JSON report for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// When this report was generated.
    #[serde(with = "chrono_serde")]
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Metric name.
    pub metric: String,

    /// Configuration used for this run.
    pub config_summary: String,

    /// Number of successful pairs.
    pub succeeded: usize,
    /// Number of failed pairs.
    pub failed: usize,
    /// Number of skipped tests.
    pub skipped: usize,

    /// Statistics over the per-pair mean errors.
    pub mean_error_summary: Option<Summary>,

    /// Full run record.
    pub summary: RunSummary,
}

impl RunReport {
    /// Build a report from a finished run.
    #[must_use]
    pub fn new(summary: RunSummary, metric: impl Into<String>, config_summary: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            metric: metric.into(),
            config_summary: config_summary.into(),
            succeeded: summary.succeeded(),
            failed: summary.failed(),
            skipped: summary.skipped_count(),
            mean_error_summary: summary.mean_error_summary(),
            summary,
        }
    }

    /// Write as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

mod chrono_serde {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        dt.to_rfc3339().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(s: &str) -> Label {
        Label::new(s).unwrap()
    }

    fn row(label: &str, mean_error: f64) -> ResultRow {
        ResultRow {
            label: label.to_string(),
            parameters: vec![
                TableColumn::new("Step Size", "0.5"),
                TableColumn::new("Sun Step Size", "1"),
                TableColumn::new("Density Threshold", "0.01"),
            ],
            mean_error,
        }
    }

    #[test]
    fn test_six_digit_rounding() {
        assert_eq!(format_mean_error(0.016_680_499_9), "0.016680");
        assert_eq!(format_mean_error(0.016_680_500_1), "0.016681");
        assert_eq!(format_mean_error(0.0), "0.000000");
        assert_eq!(format_mean_error(0.25), "0.250000");
        assert_eq!(output_file_name(&label("A"), 0.0), "A_0.000000.png");
    }

    #[test]
    fn test_output_names_suffix_collisions() {
        let mut names = OutputNames::new();
        assert_eq!(names.claim(&label("A"), 0.1), "A_0.100000.png");
        assert_eq!(names.claim(&label("A"), 0.1), "A_0.100000_2.png");
        assert_eq!(names.claim(&label("A"), 0.1), "A_0.100000_3.png");
        assert_eq!(names.claim(&label("A"), 0.2), "A_0.200000.png");
    }

    #[test]
    fn test_table_header_and_append() {
        let dir = tempfile::tempdir().unwrap();
        let config = TableConfig::new(dir.path().join("flipresults.csv"));

        append_table(&config, &[row("A", 0.125)]).unwrap();
        append_table(&config, &[row("B", 0.5)]).unwrap();

        let text = std::fs::read_to_string(&config.path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Step Size,Sun Step Size,Density Threshold,Mean Error",
                "0.5,1,0.01,0.125",
                "0.5,1,0.01,0.5",
            ]
        );
    }

    #[test]
    fn test_table_header_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TableConfig::new(dir.path().join("flipresults.csv"));
        append_table(&config, &[row("A", 0.125)]).unwrap();

        config.set_column(TableColumn::new("Scene", "Kitchen"));
        let err = append_table(&config, &[row("B", 0.5)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);

        let mut labelled = TableConfig::new(&config.path);
        labelled.label_column = true;
        assert!(append_table(&labelled, &[row("B", 0.5)]).is_err());

        let text = std::fs::read_to_string(&config.path).unwrap();
        assert_eq!(text.lines().count(), 2);

        // An empty file still gets a header.
        let empty = TableConfig::new(dir.path().join("empty.csv"));
        std::fs::write(&empty.path, "").unwrap();
        append_table(&empty, &[row("A", 0.0)]).unwrap();
        let text = std::fs::read_to_string(&empty.path).unwrap();
        assert!(text.starts_with("Step Size,"));
    }

    #[test]
    fn test_table_label_column_and_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TableConfig::new(dir.path().join("out/results.tsv"));
        config.label_column = true;
        config.delimiter = '\t';

        append_table(&config, &[row("Kitchen", 0.0)]).unwrap();

        let text = std::fs::read_to_string(&config.path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Label\tStep Size\tSun Step Size\tDensity Threshold\tMean Error"
        );
        assert_eq!(lines.next().unwrap(), "Kitchen\t0.5\t1\t0.01\t0");
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TableConfig::new(dir.path().join("t.csv"));
        config.delimiter = '→';
        let result = append_table(&config, &[]);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_set_column() {
        let mut config = TableConfig::default();
        config.set_column(TableColumn::parse("Step Size=0.25").unwrap());
        config.set_column(TableColumn::parse("Scene = Kitchen").unwrap());
        assert_eq!(config.columns[0].value, "0.25");
        assert_eq!(config.columns.last().unwrap(), &TableColumn::new("Scene", "Kitchen"));
        assert_eq!(
            config.header(),
            vec!["Step Size", "Sun Step Size", "Density Threshold", "Scene", "Mean Error"]
        );
        assert!(TableColumn::parse("novalue").is_err());
        assert!(TableColumn::parse("=3").is_err());
    }

    #[test]
    fn test_empty_summary_flags_no_pairs() {
        let summary = RunSummary {
            reference_dir: Some(PathBuf::from("dump/ref")),
            test_dir: Some(PathBuf::from("dump/test")),
            ..RunSummary::default()
        };
        assert!(summary.no_pairs_matched());
        assert!(!summary.all_failed());
        assert_eq!(summary.no_pairs_error().unwrap().kind(), ErrorKind::NoPairsMatched);
        assert!(summary.mean_error_summary().is_none());
    }

    #[test]
    fn test_run_report_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = RunReport::new(RunSummary::default(), "FLIP", "mode=LDR");
        report.write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["metric"], "FLIP");
        assert_eq!(value["succeeded"], 0);
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
    }
}
