//! Directory batch command.

use anyhow::{Context, Result};
use flip_batch::BatchRunner;

use crate::RunArgs;

pub fn run(args: RunArgs) -> Result<()> {
    let explicit_dirs = args.matching.reference_dir.is_some() || args.matching.test_dir.is_some();

    let builder = super::config_builder(&args.metric, &args.table, args.output_dir.clone())?;
    let mut builder = super::with_matching(builder, &args.matching).threads(args.threads);
    if let Some(report) = &args.report {
        builder = builder.report(report);
    }
    let config = builder.build().context("invalid configuration")?;

    let runner = BatchRunner::new(config).context("cannot set up the metric")?;
    let summary = runner.run().context("batch run failed")?;

    super::print_summary(&summary);
    super::check_outcome(&summary, explicit_dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cli, Commands};
    use clap::Parser;
    use image::{Rgb, RgbImage};
    use std::path::Path;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["flip-batch", "run"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Run(args) => args,
            _ => panic!("expected run"),
        }
    }

    fn write_png(path: &Path, shade: u8) {
        RgbImage::from_pixel(4, 4, Rgb([shade, shade, shade])).save(path).unwrap();
    }

    #[test]
    fn test_run_writes_outputs_and_table() {
        let root = tempfile::tempdir().unwrap();
        let reference = root.path().join("ref");
        let test = root.path().join("test");
        let output = root.path().join("results");
        let table = root.path().join("flipresults.csv");
        std::fs::create_dir_all(&reference).unwrap();
        std::fs::create_dir_all(&test).unwrap();
        write_png(&reference.join("A_ref.png"), 90);
        write_png(&test.join("A_test.png"), 90);

        let args = run_args(&[
            "--reference-dir",
            reference.to_str().unwrap(),
            "--test-dir",
            test.to_str().unwrap(),
            "--output-dir",
            output.to_str().unwrap(),
            "--table",
            table.to_str().unwrap(),
            "--param",
            "Step Size=0.5",
        ]);
        run(args).unwrap();

        assert!(output.join("A_0.000000.png").exists());
        let text = std::fs::read_to_string(&table).unwrap();
        assert_eq!(
            text.lines().collect::<Vec<_>>(),
            vec!["Step Size,Sun Step Size,Density Threshold,Mean Error", "0.5,,,0"]
        );
    }

    #[test]
    fn test_explicit_empty_dirs_fail() {
        let root = tempfile::tempdir().unwrap();
        let reference = root.path().join("ref");
        let test = root.path().join("test");
        std::fs::create_dir_all(&reference).unwrap();
        std::fs::create_dir_all(&test).unwrap();
        write_png(&reference.join("A_ref.png"), 90);

        let args = run_args(&[
            "--reference-dir",
            reference.to_str().unwrap(),
            "--test-dir",
            test.to_str().unwrap(),
            "--output-dir",
            root.path().join("results").to_str().unwrap(),
        ]);
        assert!(run(args).is_err());
    }

    #[test]
    fn test_missing_dir_fails() {
        let root = tempfile::tempdir().unwrap();
        let args = run_args(&[
            "--reference-dir",
            root.path().join("nope").to_str().unwrap(),
            "--output-dir",
            root.path().join("results").to_str().unwrap(),
        ]);
        assert!(run(args).is_err());
    }
}
