//! `tenrso-complete`: low-rank completion of a sparse tensor

use anyhow::{Context, Result};
use clap::Parser;
use tenrso_tc::cli::CompleteArgs;
use tenrso_tc::completion::run;
use tenrso_tc::logging::{init_tracing, TracingConfig};
use tracing::debug;

fn main() -> Result<()> {
    let args = CompleteArgs::parse();
    init_tracing(TracingConfig::from_verbosity(args.verbose)).context("failed to initialize logging")?;
    debug!(?args, "parsed arguments");

    let config = args.to_config()?;
    let summary = run(&config, &mut std::io::stdout())
        .with_context(|| format!("completion of '{}' failed", config.train_path.display()))?;

    debug!(
        epochs = summary.epochs,
        best_epoch = summary.best_epoch,
        threads = rayon::current_num_threads(),
        "run finished"
    );
    Ok(())
}
