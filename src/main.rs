use anyhow::{ensure, Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use salient_rs::cli::Args;
use salient_rs::config::Config;
use salient_rs::grid::{GridPredictor, ResizePolicy};
use salient_rs::model::Model;
use salient_rs::{pipeline, source};

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    args.validate()?;

    let config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load settings from {}", args.config.display()))?;
    let weights = config.weights_path();
    ensure!(
        weights.exists(),
        "weights not found at {} (set model.checkpoint_dir in the settings file)",
        weights.display()
    );

    let source = source::classify(&args.source)?;
    debug!(kind = ?source.kind, files = source.paths.len(), "source classified");

    let policy = ResizePolicy::from_flags(args.fix, &config.inference.resize);
    let model = Model::load(&config, args.gpu, args.device_id, policy)?;

    if args.grid {
        let overlap = config.inference.resize.tile_overlap;
        pipeline::run_with_model(GridPredictor::new(model, overlap), config, &args, &source)?;
    } else {
        pipeline::run_with_model(model, config, &args, &source)?;
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
