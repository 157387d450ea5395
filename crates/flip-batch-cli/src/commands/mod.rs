//! Subcommand implementations and shared argument handling.

pub mod jobs;
pub mod matching;
pub mod pair;
pub mod run;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use flip_batch::batch::{BatchConfigBuilder, TableColumn};
use flip_batch::{
    BatchConfig, ColorScale, LabelRule, RunSummary, TableConfig, ViewingCondition,
};

use crate::{MatchArgs, MetricArgs, TableArgs};

const DEFAULT_REFERENCE_DIR: &str = "dump/ref";
const DEFAULT_TEST_DIR: &str = "dump/test";

fn label_rule(args: &MatchArgs) -> LabelRule {
    let mut rule = LabelRule::default();
    if !args.end_markers.is_empty() {
        rule = rule.with_end_markers(args.end_markers.iter().cloned());
    }
    if let Some(delimiter) = &args.start_delimiter {
        rule = rule.with_start_delimiter(delimiter.clone());
    }
    rule
}

fn viewing(args: &MetricArgs) -> ViewingCondition {
    match args.ppd {
        Some(ppd) => ViewingCondition::default().with_ppd_override(ppd),
        None => ViewingCondition::default(),
    }
}

fn table_config(args: &TableArgs) -> Result<Option<TableConfig>> {
    let Some(path) = &args.table else {
        if !args.params.is_empty() || args.label_column {
            bail!("--param and --label-column need --table");
        }
        return Ok(None);
    };

    let mut table = TableConfig::new(path);
    table.label_column = args.label_column;
    table.delimiter = args.delimiter;
    for param in &args.params {
        table.set_column(TableColumn::parse(param).context("invalid --param")?);
    }
    Ok(Some(table))
}

/// Builder pre-filled from the metric and table arguments.
fn config_builder(
    metric: &MetricArgs,
    table: &TableArgs,
    output_dir: PathBuf,
) -> Result<BatchConfigBuilder> {
    let mut builder = BatchConfig::builder()
        .output_dir(output_dir)
        .mode(metric.mode)
        .color_map(metric.colormap)
        .color_scale(if metric.normalize {
            ColorScale::Normalized
        } else {
            ColorScale::Fixed
        })
        .tone_mapper(metric.tone_mapper)
        .viewing(viewing(metric));

    if let Some(table) = table_config(table)? {
        builder = builder.table(table);
    }
    Ok(builder)
}

/// Apply the directory and matching arguments.
fn with_matching(builder: BatchConfigBuilder, matching: &MatchArgs) -> BatchConfigBuilder {
    builder
        .reference_dir(
            matching
                .reference_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REFERENCE_DIR)),
        )
        .test_dir(
            matching
                .test_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TEST_DIR)),
        )
        .label_rule(label_rule(matching))
        .strategy(matching.strategy.clone())
        .on_ambiguous(matching.on_ambiguous)
}

/// Print per-pair results, failures and counts.
fn print_summary(summary: &RunSummary) {
    if !summary.results.is_empty() {
        println!("{:<40} {:>12}  Output", "Label", "Mean Error");
        println!("{:-<80}", "");
        for result in &summary.results {
            println!(
                "{:<40} {:>12.6}  {}",
                result.label,
                result.mean_error,
                result.output_path.display()
            );
        }
        println!();
    }

    if !summary.failures.is_empty() {
        println!("Failures:");
        for failure in &summary.failures {
            println!(
                "  {} ({}): {} [{}]",
                failure.label,
                failure.test.display(),
                failure.message,
                failure.kind
            );
        }
        println!();
    }

    if let Some(stats) = summary.mean_error_summary() {
        println!(
            "Mean error over pairs: mean {:.6}, median {:.6}, min {:.6}, max {:.6}",
            stats.mean, stats.median, stats.min, stats.max
        );
    }
    println!(
        "Succeeded: {}, Failed: {}, Skipped: {}",
        summary.succeeded(),
        summary.failed(),
        summary.skipped_count()
    );
}

/// Map a finished run to the process outcome.
fn check_outcome(summary: &RunSummary, explicit_dirs: bool) -> Result<()> {
    if summary.no_pairs_matched() {
        if explicit_dirs {
            if let Some(error) = summary.no_pairs_error() {
                return Err(error.into());
            }
        }
        return Ok(());
    }
    if summary.all_failed() {
        bail!("all {} pairs failed", summary.failed());
    }
    Ok(())
}
