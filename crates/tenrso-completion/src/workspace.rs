//! Run options and the optimization workspace
//!
//! [`TcOptions`] holds what the user asked for; [`TcWorkspace::alloc`]
//! resolves it against the algorithm defaults into the parameters the
//! trainers read. The workspace also carries the state shared by every
//! trainer: the training clock, the best model seen so far and the
//! convergence bookkeeping.

use crate::algorithm::Algorithm;
use crate::error::{CompletionError, CompletionResult};
use crate::metrics::{self, ErrorStats};
use crate::model::TcModel;
use crate::topology::Communicator;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tenrso_sparse::SparseTensor;
use tracing::{debug, info};

/// Rank used when none is given
pub const DEFAULT_RANK: usize = 10;
/// Learning rate used when none is given
pub const DEFAULT_LEARN_RATE: f64 = 0.001;
/// Per-mode regularization used when none is given
pub const DEFAULT_REG: f64 = 0.02;
/// Training time limit in seconds used when none is given
pub const DEFAULT_MAX_SECONDS: f64 = 1000.0;
/// Validation improvement below which a check counts as bad
pub const DEFAULT_TOLERANCE: f64 = 1e-4;
/// Consecutive bad checks after which training stops
pub const MAX_BAD_EPOCHS: usize = 20;

/// User-facing run options
///
/// `None` and zero-valued overrides fall back to the per-algorithm defaults
/// when the workspace is allocated.
#[derive(Debug, Clone, PartialEq)]
pub struct TcOptions {
    pub algorithm: Algorithm,
    pub rank: usize,
    /// Write the factor matrices after training
    pub write: bool,
    /// Iteration cap; `0` selects the algorithm default
    pub max_its: usize,
    /// Training time limit in seconds; `<= 0` disables it
    pub max_seconds: Option<f64>,
    pub tolerance: Option<f64>,
    pub learn_rate: Option<f64>,
    /// Regularization applied to every mode
    pub reg: Option<f64>,
    pub threads: Option<usize>,
    pub seed: Option<u64>,
    /// Reshuffle the SGD order every epoch
    pub rand_per_iteration: bool,
    /// Lock-free SGD updates
    pub hogwild: bool,
    /// SGD convergence checks per epoch
    pub folds: usize,
}

impl Default for TcOptions {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Sgd,
            rank: DEFAULT_RANK,
            write: false,
            max_its: 0,
            max_seconds: None,
            tolerance: None,
            learn_rate: None,
            reg: None,
            threads: None,
            seed: None,
            rand_per_iteration: true,
            hogwild: false,
            folds: 1,
        }
    }
}

impl TcOptions {
    /// Reject option combinations that cannot run over `participants`
    pub fn validate(&self, participants: usize) -> CompletionResult<()> {
        if self.rank == 0 {
            return Err(CompletionError::InvalidConfig(
                "rank must be at least 1".to_string(),
            ));
        }
        if self.folds == 0 {
            return Err(CompletionError::InvalidConfig(
                "folds must be at least 1".to_string(),
            ));
        }
        if self.threads == Some(0) {
            return Err(CompletionError::InvalidConfig(
                "thread count must be at least 1".to_string(),
            ));
        }
        if participants == 0 {
            return Err(CompletionError::InvalidConfig(
                "need at least one participant".to_string(),
            ));
        }
        if let Some(reg) = self.reg {
            if reg.is_nan() || reg < 0.0 {
                return Err(CompletionError::InvalidConfig(format!(
                    "regularization must be non-negative, got {reg}"
                )));
            }
        }
        if let Some(step) = self.learn_rate {
            if step.is_nan() || step <= 0.0 {
                return Err(CompletionError::InvalidConfig(format!(
                    "step size must be positive, got {step}"
                )));
            }
        }
        if participants > 1 && !self.algorithm.supports_distributed() {
            return Err(CompletionError::Unsupported(format!(
                "{} does not support distributed runs; use sgd or a single participant",
                self.algorithm
            )));
        }
        Ok(())
    }
}

/// One convergence check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochRecord {
    /// 1-based check number
    pub epoch: usize,
    /// Sum of squared training errors
    pub loss: f64,
    /// Loss plus regularization penalty
    pub objective: f64,
    pub train_rmse: f64,
    pub val_rmse: f64,
    /// Best validation RMSE after this check
    pub best_rmse: f64,
    /// Seconds since training started
    pub elapsed: f64,
}

/// Resolved parameters and shared training state
pub struct TcWorkspace<'c> {
    pub algorithm: Algorithm,
    pub learn_rate: f64,
    /// Regularization per mode
    pub regularization: Vec<f64>,
    pub max_its: usize,
    /// Training time limit in seconds; `<= 0` means unlimited
    pub max_seconds: f64,
    pub tolerance: f64,
    pub nthreads: usize,
    pub seed: u64,
    pub rand_per_iteration: bool,
    pub hogwild: bool,
    pub num_folds: usize,
    pub max_badepochs: usize,

    /// Observations in the whole training tensor
    pub train_nnz: usize,
    /// Observations in the whole validation tensor
    pub validate_nnz: usize,

    comm: &'c dyn Communicator,
    best_model: TcModel,
    best_rmse: f64,
    best_epoch: usize,
    nbadepochs: usize,
    epoch: usize,
    started: Option<Instant>,
    history: Vec<EpochRecord>,
}

impl<'c> TcWorkspace<'c> {
    /// Resolve `opts` for a run of `model` over the group of `comm`
    pub fn alloc(
        opts: &TcOptions,
        model: &TcModel,
        comm: &'c dyn Communicator,
    ) -> CompletionResult<Self> {
        opts.validate(comm.world_size())?;

        let nthreads = opts.threads.unwrap_or_else(rayon::current_num_threads);
        let max_its = match opts.max_its {
            0 => opts.algorithm.default_max_its(),
            n => n,
        };
        let reg = opts.reg.unwrap_or(DEFAULT_REG);

        Ok(Self {
            algorithm: opts.algorithm,
            learn_rate: opts.learn_rate.unwrap_or(DEFAULT_LEARN_RATE),
            regularization: vec![reg; model.nmodes()],
            max_its,
            max_seconds: opts.max_seconds.unwrap_or(DEFAULT_MAX_SECONDS),
            tolerance: opts.tolerance.unwrap_or(DEFAULT_TOLERANCE),
            nthreads,
            seed: opts.seed.unwrap_or_else(time_seed),
            rand_per_iteration: opts.rand_per_iteration,
            hogwild: opts.hogwild,
            num_folds: opts.folds,
            max_badepochs: MAX_BAD_EPOCHS,
            train_nnz: 0,
            validate_nnz: 0,
            comm,
            best_model: model.clone(),
            best_rmse: f64::INFINITY,
            best_epoch: 0,
            nbadepochs: 0,
            epoch: 0,
            started: None,
            history: Vec::new(),
        })
    }

    pub fn comm(&self) -> &'c dyn Communicator {
        self.comm
    }

    /// Start the training clock
    pub fn start_timer(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Seconds since [`TcWorkspace::start_timer`]
    pub fn elapsed(&self) -> f64 {
        self.started.map_or(0.0, |t| t.elapsed().as_secs_f64())
    }

    pub fn best_model(&self) -> &TcModel {
        &self.best_model
    }

    pub fn best_rmse(&self) -> f64 {
        self.best_rmse
    }

    /// 1-based check at which the best model was recorded; 0 before any check
    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }

    /// Number of convergence checks so far
    pub fn epochs(&self) -> usize {
        self.epoch
    }

    pub fn history(&self) -> &[EpochRecord] {
        &self.history
    }

    /// Evaluate `model` after one epoch (or fold) and decide whether to stop
    ///
    /// The best model is replaced when validation RMSE strictly improves.
    /// A check whose improvement does not exceed the tolerance counts as
    /// bad; training stops after `max_badepochs` bad checks in a row or
    /// once the training clock passes `max_seconds`. All participants reach
    /// the same decision.
    pub fn converge(
        &mut self,
        train: &SparseTensor,
        validate: &SparseTensor,
        model: &TcModel,
    ) -> bool {
        self.epoch += 1;
        let comm = self.comm;

        let train_stats = metrics::error_stats(train, model, comm);
        let penalty = metrics::regularization_penalty(model, &self.regularization, comm);
        let val_stats: ErrorStats = metrics::error_stats(validate, model, comm);
        let val_rmse = val_stats.rmse();
        let elapsed = self.elapsed();

        let mut converged = false;
        if val_rmse - self.best_rmse < -self.tolerance {
            self.nbadepochs = 0;
        } else {
            self.nbadepochs += 1;
            if self.nbadepochs >= self.max_badepochs {
                debug!(epochs = self.nbadepochs, "validation stopped improving");
                converged = true;
            }
        }

        if val_rmse < self.best_rmse {
            self.best_rmse = val_rmse;
            self.best_epoch = self.epoch;
            self.best_model.copy_from(model);
        }

        let timed_out = self.max_seconds > 0.0 && elapsed >= self.max_seconds;
        if comm.any(timed_out) {
            debug!(elapsed, "training time limit reached");
            converged = true;
        }

        let record = EpochRecord {
            epoch: self.epoch,
            loss: train_stats.sse,
            objective: train_stats.sse + penalty,
            train_rmse: train_stats.rmse(),
            val_rmse,
            best_rmse: self.best_rmse,
            elapsed,
        };
        if comm.is_root() {
            info!(
                epoch = record.epoch,
                loss = record.loss,
                obj = record.objective,
                train_rmse = record.train_rmse,
                val_rmse = record.val_rmse,
                time = record.elapsed,
                "epoch"
            );
        }
        self.history.push(record);

        converged
    }
}

/// Size the global rayon pool; a pool that already exists is kept
pub fn init_thread_pool(nthreads: usize) {
    if rayon::ThreadPoolBuilder::new()
        .num_threads(nthreads)
        .build_global()
        .is_err()
    {
        debug!(
            threads = rayon::current_num_threads(),
            "global thread pool already initialized"
        );
    }
}

/// Seed derived from the current UNIX time
pub fn time_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
