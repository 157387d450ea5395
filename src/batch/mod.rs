//! Batch comparison of reference and test renders.
//!
//! - [`label`]: Label extraction from filenames
//! - [`discovery`]: Listing candidate images
//! - [`matching`]: Pairing tests with references
//! - [`report`]: Results, output naming, table and JSON export
//! - [`config`]: Run configuration and job files
//! - [`runner::BatchRunner`]: Evaluates a batch with per-pair failure isolation

pub mod config;
pub mod discovery;
pub mod label;
pub mod matching;
pub mod report;
pub mod runner;

pub use config::{BatchConfig, BatchConfigBuilder, BatchJob, JobFile, ModeSelection};
pub use label::{Label, LabelRule};
pub use matching::{AmbiguityPolicy, ImagePair, MatchPlan, MatchStrategy, PairMatcher};
pub use report::{ComparisonResult, PairFailure, RunReport, RunSummary, TableColumn, TableConfig};
pub use runner::BatchRunner;
