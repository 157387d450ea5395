//! Single-pair command.

use anyhow::{Context, Result};
use flip_batch::BatchRunner;

use crate::PairArgs;

pub fn run(args: PairArgs) -> Result<()> {
    let config = super::config_builder(&args.metric, &args.table, args.output_dir.clone())?
        .build()
        .context("invalid configuration")?;

    let runner = BatchRunner::new(config).context("cannot set up the metric")?;
    let result = runner
        .run_pair(&args.reference, &args.test, args.label.as_deref())
        .with_context(|| {
            format!(
                "comparing {} against {}",
                args.test.display(),
                args.reference.display()
            )
        })?;

    println!("Label:      {}", result.label);
    println!("Mode:       {}", result.mode);
    println!("Mean error: {:.6}", result.mean_error);
    if let Some(exposures) = &result.parameters.exposures {
        println!(
            "Exposures:  {:.3} to {:.3} ({} steps)",
            exposures.start, exposures.stop, exposures.count
        );
    }
    println!("Output:     {}", result.output_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cli, Commands};
    use clap::Parser;
    use image::{Rgb, RgbImage};

    fn pair_args(argv: &[&str]) -> PairArgs {
        let mut full = vec!["flip-batch", "pair"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Pair(args) => args,
            _ => panic!("expected pair"),
        }
    }

    #[test]
    fn test_pair_with_label() {
        let root = tempfile::tempdir().unwrap();
        let reference = root.path().join("reference.png");
        let test = root.path().join("test.png");
        let output = root.path().join("out");
        RgbImage::from_pixel(4, 4, Rgb([10, 200, 30])).save(&reference).unwrap();
        RgbImage::from_pixel(4, 4, Rgb([10, 200, 30])).save(&test).unwrap();

        let args = pair_args(&[
            "--reference",
            reference.to_str().unwrap(),
            "--test",
            test.to_str().unwrap(),
            "--label",
            "Singlebounce",
            "--output-dir",
            output.to_str().unwrap(),
        ]);
        run(args).unwrap();
        assert!(output.join("Singlebounce_0.000000.png").exists());
    }

    #[test]
    fn test_pair_missing_test_fails() {
        let root = tempfile::tempdir().unwrap();
        let reference = root.path().join("reference.png");
        RgbImage::from_pixel(4, 4, Rgb([10, 200, 30])).save(&reference).unwrap();

        let args = pair_args(&[
            "--reference",
            reference.to_str().unwrap(),
            "--test",
            root.path().join("missing.png").to_str().unwrap(),
            "--output-dir",
            root.path().join("out").to_str().unwrap(),
        ]);
        assert!(run(args).is_err());
    }
}
