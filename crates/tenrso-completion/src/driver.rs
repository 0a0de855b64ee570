//! Completion run driver
//!
//! [`run`] performs a whole completion run:
//!
//! 1. validate the options (before any tensor is read)
//! 2. shape-pass the train, validation and test files and partition mode 0
//!    over the participants, balancing training observations
//! 3. on every participant: read the owned observations, build the model
//!    and workspace, train, and evaluate the best model
//! 4. on the root: print the report and write the factors
//!
//! With one participant the run uses [`SoloCommunicator`] on the calling
//! thread. With more, participants are scoped threads joined by a
//! [`LocalCommunicator`] group.

use crate::algorithm::Algorithm;
use crate::algorithms::trainer_for;
use crate::error::{CompletionError, CompletionResult};
use crate::metrics::{self, ErrorStats};
use crate::model::TcModel;
use crate::output::{self, gather_mode0};
use crate::topology::{Communicator, LocalCommunicator, SoloCommunicator};
use crate::workspace::{init_thread_pool, time_seed, EpochRecord, TcOptions, TcWorkspace};
use scirs2_core::ndarray_ext::Array2;
use std::fmt;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use tenrso_sparse::{read_with_scan, scan_shape, FileSource, Layer, ShapeScan, SparseTensor, TensorStats};
use tracing::{debug, info, warn};

/// Everything a run needs
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub train_path: PathBuf,
    pub validate_path: PathBuf,
    pub test_path: Option<PathBuf>,
    pub options: TcOptions,
    /// Number of participants sharing the mode-0 rows
    pub participants: usize,
    /// Directory receiving `mode{m}.mat` files
    pub output_dir: PathBuf,
}

impl CompletionConfig {
    pub fn new(train_path: impl Into<PathBuf>, validate_path: impl Into<PathBuf>) -> Self {
        Self {
            train_path: train_path.into(),
            validate_path: validate_path.into(),
            test_path: None,
            options: TcOptions::default(),
            participants: 1,
            output_dir: PathBuf::from("."),
        }
    }
}

/// Figures on the test tensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestReport {
    pub nnz: usize,
    pub rmse: f64,
    pub mae: f64,
    /// Entries addressing rows outside the model, predicted as 0
    pub uncovered: usize,
}

/// Outcome of a run, as seen by the root
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub algorithm: Algorithm,
    pub rank: usize,
    pub seed: u64,
    pub participants: usize,
    pub train: TensorStats,
    /// Training observations read over all participants
    pub train_nnz: usize,
    /// Validation observations read over all participants
    pub validate_nnz: usize,
    pub best_rmse: f64,
    pub best_mae: f64,
    /// 1-based check at which the best model was found
    pub best_epoch: usize,
    /// Convergence checks performed
    pub epochs: usize,
    pub history: Vec<EpochRecord>,
    pub test: Option<TestReport>,
    pub written: Vec<PathBuf>,
    pub write_failures: Vec<String>,
    /// Full best model, mode-0 rows gathered from every participant
    pub factors: Vec<Array2<f64>>,
}

/// Shape information and ownership shared by every participant
struct RunPlan<'a> {
    config: &'a CompletionConfig,
    options: TcOptions,
    train: (FileSource, ShapeScan),
    validate: (FileSource, ShapeScan),
    test: Option<(FileSource, ShapeScan)>,
    layers: Vec<Layer>,
    model_dims: Vec<usize>,
}

/// Root-only line printer that keeps the first write error
///
/// A failed print must not make the root leave the collective sequence, so
/// errors are held until the run is over.
struct Report<'w> {
    out: Option<&'w mut (dyn Write + Send)>,
    error: Option<io::Error>,
}

impl Report<'_> {
    fn line(&mut self, args: fmt::Arguments<'_>) {
        if self.error.is_some() {
            return;
        }
        if let Some(out) = self.out.as_mut() {
            if let Err(err) = out.write_fmt(args).and_then(|()| out.write_all(b"\n")) {
                self.error = Some(err);
            }
        }
    }

    fn finish(self) -> CompletionResult<()> {
        match self.error {
            Some(err) => Err(CompletionError::Report(err)),
            None => Ok(()),
        }
    }
}

/// Run a completion, printing the report to `out`
pub fn run(config: &CompletionConfig, out: &mut (dyn Write + Send)) -> CompletionResult<RunSummary> {
    let mut options = config.options.clone();
    options.validate(config.participants)?;
    options.seed.get_or_insert_with(time_seed);
    if let Some(threads) = options.threads {
        init_thread_pool(threads);
    }

    let plan = plan_run(config, options)?;

    let stats = TensorStats::from_scan(plan.train.0.path().display().to_string(), &plan.train.1);
    writeln!(out, "{stats}\n").map_err(CompletionError::Report)?;

    let npes = config.participants;
    if npes == 1 {
        let summary = participate(&plan, &SoloCommunicator, Some(out))?;
        return summary.ok_or(CompletionError::PeerFailed);
    }

    let comms = LocalCommunicator::group(npes);
    let mut out = Some(out);
    let results: Vec<CompletionResult<Option<RunSummary>>> = std::thread::scope(|s| {
        let plan = &plan;
        let handles: Vec<_> = comms
            .iter()
            .map(|comm| {
                let out = if comm.is_root() { out.take() } else { None };
                s.spawn(move || guarded(comm, || participate(plan, comm, out)))
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, h)| {
                h.join()
                    .unwrap_or(Err(CompletionError::ParticipantPanicked { rank }))
            })
            .collect()
    });

    collect_results(results)
}

/// Run `f` for one group member; a panic withdraws the member from the group
/// so its peers finish instead of waiting on it
fn guarded<T>(
    comm: &LocalCommunicator,
    f: impl FnOnce() -> CompletionResult<T>,
) -> CompletionResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => {
            comm.leave();
            warn!(rank = comm.rank(), "participant panicked, leaving the group");
            Err(CompletionError::ParticipantPanicked { rank: comm.rank() })
        }
    }
}

/// Root summary, or the most informative participant error
fn collect_results(
    results: Vec<CompletionResult<Option<RunSummary>>>,
) -> CompletionResult<RunSummary> {
    let mut summary = None;
    let mut first_error = None;
    for result in results {
        match result {
            Ok(Some(s)) => summary = Some(s),
            Ok(None) => {}
            Err(CompletionError::PeerFailed) => {
                first_error.get_or_insert(CompletionError::PeerFailed);
            }
            Err(err) => {
                if matches!(first_error, None | Some(CompletionError::PeerFailed)) {
                    first_error = Some(err);
                }
            }
        }
    }
    match (first_error, summary) {
        (Some(err), _) => Err(err),
        (None, Some(summary)) => Ok(summary),
        (None, None) => Err(CompletionError::PeerFailed),
    }
}

/// Shape-pass every input and decide ownership
fn plan_run(config: &CompletionConfig, options: TcOptions) -> CompletionResult<RunPlan<'_>> {
    let scan = |path: &PathBuf| -> CompletionResult<(FileSource, ShapeScan)> {
        let source = FileSource::new(path);
        let shape = scan_shape(&source, None)?;
        Ok((source, shape))
    };

    let train = scan(&config.train_path)?;
    let validate = scan(&config.validate_path)?;
    let test = config.test_path.as_ref().map(scan).transpose()?;

    let nmodes = train.1.nmodes;
    for (label, other) in std::iter::once(("validation", &validate)).chain(test.as_ref().map(|t| ("test", t))) {
        if other.1.nmodes != nmodes {
            return Err(CompletionError::ShapeMismatch(format!(
                "training tensor has {nmodes} modes but the {label} tensor has {}",
                other.1.nmodes
            )));
        }
    }

    // validation entries must be addressable by the model
    let model_dims: Vec<usize> = train
        .1
        .dims
        .iter()
        .zip(&validate.1.dims)
        .map(|(&a, &b)| a.max(b))
        .collect();

    let layers = if config.participants == 1 {
        vec![Layer::whole(model_dims[0])]
    } else {
        Layer::partition_balanced(&train.1.slice_nnz, model_dims[0], config.participants)?
    };
    Layer::validate_cover(&layers, model_dims[0])?;
    debug!(?layers, "mode-0 ownership");

    Ok(RunPlan {
        config,
        options,
        train,
        validate,
        test,
        layers,
        model_dims,
    })
}

fn read_local(
    input: &(FileSource, ShapeScan),
    layer: &Layer,
) -> CompletionResult<SparseTensor> {
    let (source, scan) = input;
    Ok(read_with_scan(source, Some(layer), &scan.restrict(layer))?)
}

/// Layer used for the test tensor: the last participant also owns any
/// slices past the model extent
fn test_layer(plan: &RunPlan<'_>, rank: usize, scan: &ShapeScan) -> CompletionResult<Layer> {
    let layer = plan.layers[rank];
    if rank + 1 == plan.layers.len() {
        Ok(Layer::new(layer.start(), layer.end().max(scan.dims[0]))?)
    } else {
        Ok(layer)
    }
}

struct LocalData {
    train: SparseTensor,
    validate: SparseTensor,
    test: Option<SparseTensor>,
}

fn read_inputs(plan: &RunPlan<'_>, rank: usize) -> CompletionResult<LocalData> {
    let layer = &plan.layers[rank];
    let train = read_local(&plan.train, layer)?;
    let validate = read_local(&plan.validate, layer)?;
    let test = match &plan.test {
        Some(input) => Some(read_local(input, &test_layer(plan, rank, &input.1)?)?),
        None => None,
    };
    Ok(LocalData {
        train,
        validate,
        test,
    })
}

fn print_options(report: &mut Report<'_>, plan: &RunPlan<'_>, ws: &TcWorkspace<'_>, rank: usize) {
    let maxtime = if ws.max_seconds > 0.0 {
        format!("{:.1}s", ws.max_seconds)
    } else {
        "NONE".to_string()
    };

    report.line(format_args!(
        "Factoring ------------------------------------------------------"
    ));
    report.line(format_args!(
        "NFACTORS={rank} MAXITS={} MAXTIME={maxtime} TOL={:.1e} SEED={} THREADS={}",
        ws.max_its, ws.tolerance, ws.seed, ws.nthreads
    ));
    report.line(format_args!(
        "STEP={:.3e} REG={:.3e}",
        ws.learn_rate,
        ws.regularization.first().copied().unwrap_or(0.0)
    ));
    report.line(format_args!(
        "VALIDATION={}",
        plan.config.validate_path.display()
    ));
    if let Some(test) = &plan.config.test_path {
        report.line(format_args!("TEST={}", test.display()));
    }
    if ws.algorithm == Algorithm::Sgd {
        report.line(format_args!(
            "ALG={} rand_per_iteration={} hogwild={} folds={}",
            ws.algorithm,
            u8::from(ws.rand_per_iteration),
            u8::from(ws.hogwild),
            ws.num_folds
        ));
    } else {
        report.line(format_args!("ALG={}", ws.algorithm));
    }
    if plan.config.participants > 1 {
        report.line(format_args!("PARTICIPANTS={}", plan.config.participants));
    }
    report.line(format_args!(""));
}

/// One participant's share of the run; the root returns the summary
fn participate(
    plan: &RunPlan<'_>,
    comm: &dyn Communicator,
    out: Option<&mut (dyn Write + Send)>,
) -> CompletionResult<Option<RunSummary>> {
    let rank = comm.rank();
    let mut report = Report { out, error: None };

    let local = read_inputs(plan, rank);
    if comm.any(local.is_err()) {
        return Err(local.err().unwrap_or(CompletionError::PeerFailed));
    }
    let LocalData {
        train,
        validate,
        test,
    } = local?;
    debug!(rank, train_nnz = train.nnz(), validate_nnz = validate.nnz(), "local observations");

    let train_nnz = comm.all_reduce_count(train.nnz());
    let validate_nnz = comm.all_reduce_count(validate.nnz());

    let opts = &plan.options;
    let seed = opts.seed.unwrap_or_default();
    let mut dims = plan.model_dims.clone();
    dims[0] = plan.layers[rank].width();
    let mut model = TcModel::random(&dims, opts.rank, seed, rank)?;
    let covered = model
        .check_covers(&train)
        .and_then(|()| model.check_covers(&validate));
    if comm.any(covered.is_err()) {
        return Err(covered.err().unwrap_or(CompletionError::PeerFailed));
    }

    let mut ws = TcWorkspace::alloc(opts, &model, comm)?;
    ws.train_nnz = train_nnz;
    ws.validate_nnz = validate_nnz;

    print_options(&mut report, plan, &ws, opts.rank);
    report.line(format_args!("validation nnz: {validate_nnz}"));
    if comm.is_root() {
        info!(
            alg = %ws.algorithm,
            rank = opts.rank,
            participants = comm.world_size(),
            train_nnz,
            validate_nnz,
            "training"
        );
    }

    ws.start_timer();
    trainer_for(ws.algorithm).train(&train, &validate, &mut model, &mut ws)?;

    let best = ws.best_model();
    let val_stats = metrics::error_stats(&validate, best, comm);
    report.line(format_args!(
        "BEST VALIDATION RMSE: {:0.5} MAE: {:0.5} (epoch {})",
        val_stats.rmse(),
        val_stats.mae(),
        ws.best_epoch()
    ));

    let test_report = test.as_ref().map(|tt| {
        let stats: ErrorStats = metrics::error_stats(tt, best, comm);
        TestReport {
            nnz: stats.count,
            rmse: stats.rmse(),
            mae: stats.mae(),
            uncovered: stats.uncovered,
        }
    });
    if let Some(t) = &test_report {
        if t.uncovered > 0 && comm.is_root() {
            warn!(
                entries = t.uncovered,
                "test entries outside the trained model predicted as 0"
            );
        }
        report.line(format_args!("test nnz: {}", t.nnz));
        report.line(format_args!("TEST RMSE: {:0.5} MAE: {:0.5}", t.rmse, t.mae));
    }

    let emitted = if opts.write {
        output::write_factors(best, comm, &plan.config.output_dir)
    } else {
        output::EmitReport::default()
    };

    let mode0 = gather_mode0(best, comm);
    report.finish()?;

    let Some(mode0) = mode0 else {
        return Ok(None);
    };
    let mut factors = Vec::with_capacity(best.nmodes());
    factors.push(mode0);
    factors.extend(best.factors()[1..].iter().cloned());

    Ok(Some(RunSummary {
        algorithm: ws.algorithm,
        rank: opts.rank,
        seed: ws.seed,
        participants: comm.world_size(),
        train: TensorStats::from_scan(
            plan.train.0.path().display().to_string(),
            &plan.train.1,
        ),
        train_nnz,
        validate_nnz,
        best_rmse: val_stats.rmse(),
        best_mae: val_stats.mae(),
        best_epoch: ws.best_epoch(),
        epochs: ws.epochs(),
        history: ws.history().to_vec(),
        test: test_report,
        written: emitted.written,
        write_failures: emitted.failed.iter().map(|e| e.to_string()).collect(),
        factors,
    }))
}
