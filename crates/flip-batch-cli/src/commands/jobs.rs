//! Job file command.

use std::path::Path;

use anyhow::{Context, Result, bail};
use flip_batch::BatchRunner;
use flip_batch::batch::JobFile;
use tracing::{error, info};

pub fn run(file: &Path) -> Result<()> {
    let jobs = JobFile::load(file)
        .with_context(|| format!("loading job file {}", file.display()))?;
    info!(jobs = jobs.jobs.len(), file = %file.display(), "loaded job file");

    let mut failed = Vec::new();
    for job in jobs.jobs {
        let name = job.display_name();
        println!("== {name}");

        let outcome = BatchRunner::new(job.config).and_then(|runner| runner.run());
        match outcome {
            Ok(summary) => {
                super::print_summary(&summary);
                if let Err(e) = super::check_outcome(&summary, true) {
                    error!(job = %name, error = %e, "job failed");
                    println!("Job failed: {e}");
                    failed.push(name);
                }
            }
            Err(e) => {
                error!(job = %name, error = %e, "job failed");
                println!("Job failed: {e}");
                failed.push(name);
            }
        }
        println!();
    }

    if !failed.is_empty() {
        bail!("{} job(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}
