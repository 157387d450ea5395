//! Dry-run matching command.

use anyhow::{Context, Result};
use flip_batch::batch::discovery::list_images;
use flip_batch::batch::matching::ImageTest;

use crate::MatchArgs;

pub fn run(args: MatchArgs) -> Result<()> {
    let config = super::with_matching(flip_batch::BatchConfig::builder(), &args)
        .build()
        .context("invalid configuration")?;

    let references = list_images(&config.reference_dir)?;
    let tests = list_images(&config.test_dir)?;
    let matcher = config.matcher();

    println!("References ({}):", references.len());
    for path in &references {
        println!("  {}", path.display());
    }
    println!();

    println!("Tests ({}):", tests.len());
    for path in &tests {
        let label = ImageTest::from_path(path, matcher.rule())
            .map_or_else(|| "<no label>".to_string(), |t| t.label.to_string());
        println!("  {:<40} {}", label, path.display());
    }
    println!();

    let plan = matcher.plan(&references, &tests);

    println!("Pairs ({}):", plan.pairs.len());
    for pair in &plan.pairs {
        println!(
            "  {:<40} {} -> {}",
            pair.label(),
            pair.test.path.display(),
            pair.reference.path.display()
        );
    }

    if !plan.ambiguous.is_empty() {
        println!();
        println!("Ambiguous ({}):", plan.ambiguous.len());
        for ambiguous in &plan.ambiguous {
            println!(
                "  {:<40} {} ({} candidates)",
                ambiguous.test.label,
                ambiguous.test.path.display(),
                ambiguous.candidates
            );
        }
    }

    if !plan.skipped.is_empty() {
        println!();
        println!("Skipped ({}):", plan.skipped.len());
        for skipped in &plan.skipped {
            println!("  {} ({})", skipped.path.display(), skipped.reason);
        }
    }

    Ok(())
}
