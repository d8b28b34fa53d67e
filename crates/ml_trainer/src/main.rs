//! mlpipe CLI
//!
//! `mlpipe train <config_path>` runs the training pipeline.
//! `mlpipe predict --input-dir .. --model-dir .. --output-dir ..` runs the
//! batch prediction job. Any failure exits non-zero.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mlpipe_core::read_train_pipeline_params;
use mlpipe_trainer::{init_tracing, run_batch_prediction, train_pipeline, BatchJob, RunContext};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "mlpipe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train tabular classifiers and run batch predictions", long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a model from a YAML or TOML config file
    Train {
        /// Path to the training config
        config_path: PathBuf,
    },

    /// Score <input-dir>/data.csv with <model-dir>/model.pkl
    Predict(PredictArgs),
}

#[derive(Args, Debug)]
struct PredictArgs {
    /// Directory holding data.csv
    #[arg(long)]
    input_dir: PathBuf,

    /// Directory holding model.pkl
    #[arg(long)]
    model_dir: PathBuf,

    /// Directory that receives predictions.csv
    #[arg(long)]
    output_dir: PathBuf,

    /// Wait for the data and model files before predicting
    #[arg(long)]
    wait: bool,

    /// Seconds between sensor pokes
    #[arg(long, default_value = "10")]
    poke_interval_secs: u64,

    /// Seconds, from job start, before the sensors give up
    #[arg(long, default_value = "6000")]
    timeout_secs: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Train { config_path } => run_train(&config_path, cli.verbose),
        Command::Predict(args) => run_predict(args, cli.verbose),
    };

    if let Err(err) = &result {
        error!("{:#}", err);
    }
    result
}

fn run_train(config_path: &Path, verbose: bool) -> Result<()> {
    let params = read_train_pipeline_params(config_path);

    // The log file is configurable, so logging comes up after the config
    // is read; a broken config still gets logged to stderr.
    init_tracing(
        verbose,
        params.as_ref().ok().and_then(|p| p.log_path.as_deref()),
    )?;

    let params = params
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    let ctx = RunContext::new("train");
    let outcome = train_pipeline(&params, &ctx).context("Training pipeline failed")?;

    info!("✓ Training run {} completed successfully", ctx.run_id());
    info!("  Model: {}", outcome.model_path.display());
    info!("  Metrics: {}", outcome.metric_path.display());
    for (name, value) in &outcome.metrics {
        info!("  {}: {:.4}", name, value);
    }
    Ok(())
}

fn run_predict(args: PredictArgs, verbose: bool) -> Result<()> {
    init_tracing(verbose, None)?;

    let job = BatchJob::new(args.input_dir, args.model_dir, args.output_dir);
    let ctx = RunContext::new("predict");

    if args.wait {
        ctx.in_scope(|| {
            job.wait_for_inputs(
                Duration::from_secs(args.poke_interval_secs),
                Duration::from_secs(args.timeout_secs),
            )
        })
        .context("Upstream files never appeared")?;
    }

    let outcome = run_batch_prediction(&job, &ctx).context("Batch prediction failed")?;
    info!(
        "✓ Run {}: {} predictions written to {}",
        ctx.run_id(),
        outcome.rows,
        outcome.predictions_path.display()
    );
    Ok(())
}
