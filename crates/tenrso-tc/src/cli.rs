//! Command-line surface of `tenrso-complete`
//!
//! ```bash
//! tenrso-complete train.tns validate.tns [test.tns] \
//!     --alg sgd --rank 10 --step 0.001 --reg 0.02 --time 600
//! ```

use anyhow::{bail, Result};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use tenrso_completion::{Algorithm, CompletionConfig, TcOptions};

/// Complete a sparse tensor with a low-rank CP model
#[derive(Parser, Debug, Clone)]
#[command(name = "tenrso-complete", version, about)]
pub struct CompleteArgs {
    /// Training tensor, validation tensor and an optional test tensor
    #[arg(value_name = "FILE", required = true, num_args = 2..=3)]
    pub files: Vec<PathBuf>,

    /// Maximum number of iterations (default depends on the algorithm)
    #[arg(short = 'i', long = "iters")]
    pub iters: Option<usize>,

    /// Rank of the factorization
    #[arg(short = 'r', long, default_value_t = tenrso_completion::workspace::DEFAULT_RANK)]
    pub rank: usize,

    /// Number of worker threads (default: all cores)
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Optimization algorithm: gd, cg, nlcg, lbfgs, sgd, ccd or als
    #[arg(short = 'a', long = "alg", default_value = "sgd", value_parser = parse_algorithm)]
    pub algorithm: Algorithm,

    /// Do not write factor matrices
    #[arg(long, conflicts_with = "write")]
    pub nowrite: bool,

    /// Write the best factor matrices to mode<m>.mat
    #[arg(long)]
    pub write: bool,

    /// Learning rate (default: 0.001)
    #[arg(short = 's', long)]
    pub step: Option<f64>,

    /// Regularization on every mode (default: 0.02)
    #[arg(long)]
    pub reg: Option<f64>,

    /// Random seed (default: current time)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Training time limit in seconds; zero or negative disables it (default: 1000)
    #[arg(long, allow_negative_numbers = true)]
    pub time: Option<f64>,

    /// Convergence tolerance on validation RMSE (default: 1e-4)
    #[arg(long)]
    pub tol: Option<f64>,

    /// SGD: keep the first shuffled order instead of reshuffling every epoch
    #[arg(long)]
    pub norand: bool,

    /// SGD: update factor rows without locking
    #[arg(long)]
    pub hogwild: bool,

    /// SGD: number of folds per epoch
    #[arg(long, default_value_t = 1)]
    pub folds: usize,

    /// Number of in-process participants sharing the mode-0 rows
    #[arg(long, default_value_t = 1)]
    pub participants: usize,

    /// Directory receiving the factor matrix files
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,
}

fn parse_algorithm(s: &str) -> Result<Algorithm, String> {
    s.parse::<Algorithm>().map_err(|e| e.to_string())
}

impl CompleteArgs {
    /// Run options carried by the flags
    pub fn options(&self) -> TcOptions {
        TcOptions {
            algorithm: self.algorithm,
            rank: self.rank,
            write: self.write && !self.nowrite,
            max_its: self.iters.unwrap_or(0),
            max_seconds: self.time,
            tolerance: self.tol,
            learn_rate: self.step,
            reg: self.reg,
            threads: self.threads,
            seed: self.seed,
            rand_per_iteration: !self.norand,
            hogwild: self.hogwild,
            folds: self.folds,
        }
    }

    pub fn to_config(&self) -> Result<CompletionConfig> {
        let (train, validate, test) = match self.files.as_slice() {
            [train, validate] => (train, validate, None),
            [train, validate, test] => (train, validate, Some(test.clone())),
            other => bail!("expected 2 or 3 tensor files, got {}", other.len()),
        };

        Ok(CompletionConfig {
            test_path: test,
            options: self.options(),
            participants: self.participants,
            output_dir: self.output_dir.clone(),
            ..CompletionConfig::new(train, validate)
        })
    }
}
