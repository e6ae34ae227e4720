//! `heap-retention` CLI: load a heap snapshot and ask whether a target
//! object is retained by a set of held objects.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::error;

use heap_retention::config::{AnalysisConfig, OutputFormat};
use heap_retention::observability::init_logging;
use heap_retention::report::render;
use heap_retention::source::{HeapSnapshot, SnapshotValue};
use heap_retention::types::NodeId;
use heap_retention::{run_analysis, Result};

/// Heap retention analysis over heap snapshots
#[derive(Parser, Debug)]
#[command(name = "heap-retention", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Explain why a target object is (or is not) retained
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Heap snapshot (.json, .yaml or .yml)
    #[arg(long)]
    snapshot: PathBuf,

    /// Object id whose retention is tested
    #[arg(long)]
    target: u64,

    /// Object ids presumed retained; repeat for several
    #[arg(long = "held", num_args = 1..)]
    held: Vec<u64>,

    /// Let weak edges explain retention
    #[arg(long)]
    weak: bool,

    /// Analysis config file (.yaml, .yml or .json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format, overriding the config file
    #[arg(long, value_parser = parse_format)]
    format: Option<OutputFormat>,

    /// Append analysis metrics to the output
    #[arg(long)]
    metrics: bool,
}

fn parse_format(raw: &str) -> std::result::Result<OutputFormat, String> {
    OutputFormat::from_str_loose(raw).ok_or_else(|| format!("unknown format {raw:?} (expected text or json)"))
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Command::Analyze(args) => analyze(args),
    };

    match outcome {
        Ok(rendered) => {
            print!("{rendered}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "analysis failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn analyze(args: AnalyzeArgs) -> Result<String> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    }
    .with_env_overrides()?;

    if args.weak {
        config.strong_references_only = false;
    }
    if let Some(format) = args.format {
        config.output.format = format;
    }
    if args.metrics {
        config.output.include_metrics = true;
    }

    let mut snapshot = HeapSnapshot::load(&args.snapshot)?;
    let held: Vec<SnapshotValue> = args.held.iter().map(|id| SnapshotValue::Ref(NodeId(*id))).collect();
    let target = SnapshotValue::Ref(NodeId(args.target));

    let analysis = run_analysis(&mut snapshot, &held, &target, config.strong_references_only)?;
    let metrics = config.output.include_metrics.then_some(&analysis.metrics);
    render(&analysis.result, config.output.format, metrics)
}
