//! flip-batch CLI - batch FLIP comparison of rendered images

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use flip_batch::{AmbiguityPolicy, ColorMap, MatchStrategy, ModeSelection, ToneMapper};

mod commands;

/// Perceptual comparison of test renders against reference renders.
#[derive(Parser)]
#[command(name = "flip-batch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare every matched pair in two directories
    Run(RunArgs),

    /// Compare one reference/test pair
    Pair(PairArgs),

    /// Run the batches listed in a JSON job file
    Jobs {
        /// Job file
        file: PathBuf,
    },

    /// Show extracted labels and matched pairs without comparing
    Match(MatchArgs),
}

// Where to look and how to pair.
#[derive(Args, Clone)]
struct MatchArgs {
    /// Directory of reference renders [default: dump/ref]
    #[arg(long)]
    reference_dir: Option<PathBuf>,

    /// Directory of test renders [default: dump/test]
    #[arg(long)]
    test_dir: Option<PathBuf>,

    /// How a test label selects references (contains, exact, prefix)
    #[arg(long, default_value = "contains")]
    strategy: MatchStrategy,

    /// What to do with ambiguous matches (all, reject, first)
    #[arg(long, default_value = "all")]
    on_ambiguous: AmbiguityPolicy,

    /// Marker ending the label; repeat for several [default: GI-1.1, test]
    #[arg(long = "end-marker")]
    end_markers: Vec<String>,

    /// Text preceding the label
    #[arg(long)]
    start_delimiter: Option<String>,
}

// Metric and rendering options.
#[derive(Args, Clone)]
struct MetricArgs {
    /// Dynamic range (ldr, hdr, auto)
    #[arg(long, default_value = "ldr")]
    mode: ModeSelection,

    /// Error map color map (viridis, magma, grayscale)
    #[arg(long, default_value = "viridis")]
    colormap: ColorMap,

    /// Stretch each error map's own min..max over the color map
    #[arg(long)]
    normalize: bool,

    /// HDR tone mapper (aces, reinhard, hable)
    #[arg(long, default_value = "aces")]
    tone_mapper: ToneMapper,

    /// Pixels per degree, overriding the default 4K desktop geometry
    #[arg(long)]
    ppd: Option<f64>,
}

// Results table options.
#[derive(Args, Clone)]
struct TableArgs {
    /// Append one row per pair to this table
    #[arg(long)]
    table: Option<PathBuf>,

    /// Run parameter written as a table column, NAME=VALUE
    #[arg(long = "param")]
    params: Vec<String>,

    /// Write a leading Label column
    #[arg(long)]
    label_column: bool,

    /// Table field delimiter
    #[arg(long, default_value_t = ',')]
    delimiter: char,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    matching: MatchArgs,

    #[command(flatten)]
    metric: MetricArgs,

    #[command(flatten)]
    table: TableArgs,

    /// Directory error maps are written to
    #[arg(short, long, env = "FLIP_BATCH_OUTPUT_DIR", default_value = "dump/results")]
    output_dir: PathBuf,

    /// Write a JSON report
    #[arg(long)]
    report: Option<PathBuf>,

    /// Worker threads (1 = sequential, 0 = all cores)
    #[arg(long, default_value_t = 1)]
    threads: usize,
}

#[derive(Args)]
struct PairArgs {
    /// Reference image
    #[arg(long)]
    reference: PathBuf,

    /// Test image
    #[arg(long)]
    test: PathBuf,

    /// Output label [default: label from the test filename]
    #[arg(long)]
    label: Option<String>,

    #[command(flatten)]
    metric: MetricArgs,

    #[command(flatten)]
    table: TableArgs,

    /// Directory the error map is written to
    #[arg(short, long, env = "FLIP_BATCH_OUTPUT_DIR", default_value = "dump/results")]
    output_dir: PathBuf,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Pair(args) => commands::pair::run(args),
        Commands::Jobs { file } => commands::jobs::run(&file),
        Commands::Match(args) => commands::matching::run(args),
    }
}
