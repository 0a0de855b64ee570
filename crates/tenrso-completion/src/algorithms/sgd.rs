//! Stochastic gradient descent
//!
//! Observations are visited in a shuffled order, split into `num_folds`
//! folds with one convergence check after each. Within a fold, chunks of
//! observations are processed in parallel against [`SharedFactors`]:
//!
//! - hogwild: rows are read and written without coordination
//! - locked: the rows an update touches are guarded by striped locks, taken
//!   in ascending mode order
//!
//! In a distributed run every participant updates its own mode-0 rows and
//! its replica of the other modes; replicas are averaged after every fold.
//! The learning rate follows a bold-driver schedule: it grows by 5% after
//! an epoch that lowers the objective and halves otherwise.

use super::common::shuffle;
use super::Trainer;
use crate::algorithm::Algorithm;
use crate::error::CompletionResult;
use crate::model::TcModel;
use crate::topology::Communicator;
use crate::workspace::TcWorkspace;
use parking_lot::Mutex;
use rayon::prelude::*;
use scirs2_core::random::{rngs::StdRng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use tenrso_sparse::{SparseTensor, MAX_NMODES};
use tracing::debug;

/// Observations per parallel work item
const CHUNK: usize = 1024;
/// Lock stripes per mode
const NLOCKS: usize = 1024;

/// Factor entries readable and writable from many threads
pub struct SharedFactors {
    rank: usize,
    modes: Vec<Vec<AtomicU64>>,
}

impl SharedFactors {
    pub fn from_model(model: &TcModel) -> Self {
        let modes = model
            .factors()
            .iter()
            .map(|f| f.iter().map(|v| AtomicU64::new(v.to_bits())).collect())
            .collect();
        Self {
            rank: model.rank(),
            modes,
        }
    }

    #[inline]
    pub fn get(&self, mode: usize, row: usize, r: usize) -> f64 {
        f64::from_bits(self.modes[mode][row * self.rank + r].load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, mode: usize, row: usize, r: usize, value: f64) {
        self.modes[mode][row * self.rank + r].store(value.to_bits(), Ordering::Relaxed);
    }

    /// Copy every entry into `model`
    pub fn store_into(&self, model: &mut TcModel) {
        for (m, cells) in self.modes.iter().enumerate() {
            let factor = model.factor_mut(m);
            for (dst, cell) in factor.iter_mut().zip(cells) {
                *dst = f64::from_bits(cell.load(Ordering::Relaxed));
            }
        }
    }

    /// Overwrite every entry from `model`
    pub fn load_from(&self, model: &TcModel) {
        for (cells, factor) in self.modes.iter().zip(model.factors()) {
            for (cell, v) in cells.iter().zip(factor.iter()) {
                cell.store(v.to_bits(), Ordering::Relaxed);
            }
        }
    }
}

/// Striped row locks, one pool per mode
struct RowLocks {
    pools: Vec<Vec<Mutex<()>>>,
}

impl RowLocks {
    fn new(nmodes: usize) -> Self {
        let pools = (0..nmodes)
            .map(|_| (0..NLOCKS).map(|_| Mutex::new(())).collect())
            .collect();
        Self { pools }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sgd;

/// One SGD step on observation `n`
///
/// All modes are updated from the rows read before the step.
fn update(
    train: &SparseTensor,
    factors: &SharedFactors,
    n: usize,
    learn_rate: f64,
    reg: &[f64],
    rows: &mut [Vec<f64>],
) {
    let nmodes = train.nmodes();
    let rank = factors.rank;

    for (m, row) in rows.iter_mut().enumerate().take(nmodes) {
        let i = train.ind(m)[n];
        for (r, v) in row.iter_mut().enumerate() {
            *v = factors.get(m, i, r);
        }
    }

    let est: f64 = (0..rank)
        .map(|r| rows[..nmodes].iter().map(|row| row[r]).product::<f64>())
        .sum();
    let err = train.vals()[n] - est;

    for m in 0..nmodes {
        let i = train.ind(m)[n];
        for r in 0..rank {
            let others: f64 = (0..nmodes)
                .filter(|&k| k != m)
                .map(|k| rows[k][r])
                .product();
            let cur = rows[m][r];
            factors.set(m, i, r, cur + learn_rate * (err * others - reg[m] * cur));
        }
    }
}

/// Run one fold of updates in parallel
fn process_fold(
    train: &SparseTensor,
    factors: &SharedFactors,
    locks: Option<&RowLocks>,
    fold: &[usize],
    learn_rate: f64,
    reg: &[f64],
) {
    let nmodes = train.nmodes();
    let rank = factors.rank;

    fold.par_chunks(CHUNK).for_each(|chunk| {
        let mut rows = vec![vec![0.0; rank]; nmodes];
        for &n in chunk {
            match locks {
                None => update(train, factors, n, learn_rate, reg, &mut rows),
                Some(locks) => {
                    let mut guards = Vec::with_capacity(MAX_NMODES);
                    for (m, pool) in locks.pools.iter().enumerate() {
                        guards.push(pool[train.ind(m)[n] % NLOCKS].lock());
                    }
                    update(train, factors, n, learn_rate, reg, &mut rows);
                    drop(guards);
                }
            }
        }
    });
}

/// Arrange the visit order for `epoch`
///
/// The first epoch always shuffles; later epochs reshuffle only when
/// `rand_per_iteration` is set, otherwise the first order is kept.
fn next_order(order: &mut [usize], rng: &mut StdRng, epoch: usize, rand_per_iteration: bool) {
    if epoch == 0 || rand_per_iteration {
        shuffle(order, rng);
    }
}

/// Average the replicated modes (1..) over all participants
fn average_replicas(model: &mut TcModel, comm: &dyn Communicator) {
    let npes = comm.world_size();
    if npes == 1 {
        return;
    }

    let mut buf: Vec<f64> = model.factors()[1..]
        .iter()
        .flat_map(|f| f.iter().copied())
        .collect();
    comm.all_reduce_sum(&mut buf);

    let scale = 1.0 / npes as f64;
    let mut values = buf.into_iter();
    for m in 1..model.nmodes() {
        for (dst, src) in model.factor_mut(m).iter_mut().zip(values.by_ref()) {
            *dst = src * scale;
        }
    }
}

impl Trainer for Sgd {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Sgd
    }

    fn train(
        &self,
        train: &SparseTensor,
        validate: &SparseTensor,
        model: &mut TcModel,
        ws: &mut TcWorkspace<'_>,
    ) -> CompletionResult<()> {
        let comm = ws.comm();
        let nnz = train.nnz();
        let reg = ws.regularization.clone();
        let factors = SharedFactors::from_model(model);
        let locks = (!ws.hogwild).then(|| RowLocks::new(model.nmodes()));

        let mut rng = StdRng::seed_from_u64(ws.seed.wrapping_add(comm.rank() as u64));
        let mut order: Vec<usize> = (0..nnz).collect();

        let folds = ws.num_folds.max(1);
        let fold_len = nnz.div_ceil(folds).max(1);
        let mut prev_obj = f64::INFINITY;

        'epochs: for epoch in 0..ws.max_its {
            next_order(&mut order, &mut rng, epoch, ws.rand_per_iteration);

            for f in 0..folds {
                let start = (f * fold_len).min(nnz);
                let end = ((f + 1) * fold_len).min(nnz);
                process_fold(
                    train,
                    &factors,
                    locks.as_ref(),
                    &order[start..end],
                    ws.learn_rate,
                    &reg,
                );

                factors.store_into(model);
                if comm.world_size() > 1 {
                    average_replicas(model, comm);
                    factors.load_from(model);
                }

                if ws.converge(train, validate, model) {
                    break 'epochs;
                }
            }

            let obj = ws.history().last().map_or(f64::INFINITY, |rec| rec.objective);
            if obj < prev_obj {
                ws.learn_rate *= 1.05;
            } else {
                ws.learn_rate *= 0.5;
                debug!(learn_rate = ws.learn_rate, "objective rose, step reduced");
            }
            prev_obj = obj;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics;
    use crate::topology::SoloCommunicator;
    use crate::workspace::TcOptions;

    #[test]
    fn test_shared_factors_round_trip() {
        let model = TcModel::random(&[3, 4], 2, 1, 0).unwrap();
        let factors = SharedFactors::from_model(&model);
        assert_eq!(factors.get(1, 2, 1), model.factor(1)[[2, 1]]);

        factors.set(0, 1, 0, 7.5);
        let mut copy = model.clone();
        factors.store_into(&mut copy);
        assert_eq!(copy.factor(0)[[1, 0]], 7.5);

        factors.load_from(&model);
        factors.store_into(&mut copy);
        assert_eq!(copy, model);
    }

    #[test]
    fn test_single_update_moves_toward_observation() {
        let tt = SparseTensor::new(vec![1, 1], vec![vec![0], vec![0]], vec![4.0]).unwrap();
        let mut model = TcModel::zeros(&[1, 1], 1).unwrap();
        model.factor_mut(0).fill(1.0);
        model.factor_mut(1).fill(1.0);

        let factors = SharedFactors::from_model(&model);
        let mut rows = vec![vec![0.0; 1]; 2];
        update(&tt, &factors, 0, 0.1, &[0.0, 0.0], &mut rows);

        // err = 3, each entry grows by 0.1 * 3 * 1
        assert!((factors.get(0, 0, 0) - 1.3).abs() < 1e-12);
        assert!((factors.get(1, 0, 0) - 1.3).abs() < 1e-12);
    }

    #[test]
    fn test_locked_and_hogwild_agree_on_one_thread_order() {
        let tt = SparseTensor::new(
            vec![2, 2],
            vec![vec![0, 1, 1], vec![1, 0, 1]],
            vec![1.0, 2.0, 3.0],
        )
        .unwrap();
        let model = TcModel::random(&[2, 2], 2, 4, 0).unwrap();
        let order = vec![2, 0, 1];

        let racy = SharedFactors::from_model(&model);
        process_fold(&tt, &racy, None, &order, 0.05, &[0.01, 0.01]);

        let locked = SharedFactors::from_model(&model);
        let locks = RowLocks::new(2);
        process_fold(&tt, &locked, Some(&locks), &order, 0.05, &[0.01, 0.01]);

        let (mut a, mut b) = (model.clone(), model.clone());
        racy.store_into(&mut a);
        locked.store_into(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_order_kept_without_reshuffle() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut order: Vec<usize> = (0..64).collect();

        next_order(&mut order, &mut rng, 0, false);
        assert_ne!(order, (0..64).collect::<Vec<_>>());
        let first = order.clone();

        for epoch in 1..5 {
            next_order(&mut order, &mut rng, epoch, false);
            assert_eq!(order, first, "epoch {epoch} changed the order");
        }
    }

    #[test]
    fn test_order_reshuffled_every_epoch() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut order: Vec<usize> = (0..64).collect();

        next_order(&mut order, &mut rng, 0, true);
        let mut previous = order.clone();
        for epoch in 1..5 {
            next_order(&mut order, &mut rng, epoch, true);
            assert_ne!(order, previous, "epoch {epoch} kept the order");

            let mut sorted = order.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, (0..64).collect::<Vec<_>>());
            previous = order.clone();
        }
    }

    /// Rank-one 20x15x12 tensor; the training part spans several chunks
    fn chunked_sample() -> (SparseTensor, SparseTensor) {
        let dims = [20, 15, 12];
        let mut train = SparseTensor::with_capacity(dims.to_vec(), 0).unwrap();
        let mut validate = SparseTensor::with_capacity(dims.to_vec(), 0).unwrap();
        for i in 0..dims[0] {
            for j in 0..dims[1] {
                for k in 0..dims[2] {
                    let v = (0.8 + 0.02 * i as f64) * (0.6 + 0.03 * j as f64) * (1.0 + 0.04 * k as f64);
                    let target = if (i + 2 * j + 3 * k) % 5 == 0 {
                        &mut validate
                    } else {
                        &mut train
                    };
                    target.push(&[i, j, k], v).unwrap();
                }
            }
        }
        (train, validate)
    }

    #[test]
    fn test_parallel_folds_improve_validation() {
        let (train, validate) = chunked_sample();
        assert!(train.nnz() > 2 * CHUNK);

        for (hogwild, rand_per_iteration) in [(true, true), (false, false), (true, false)] {
            let opts = TcOptions {
                algorithm: Algorithm::Sgd,
                rank: 2,
                max_its: 20,
                learn_rate: Some(0.01),
                reg: Some(1e-3),
                seed: Some(8),
                hogwild,
                rand_per_iteration,
                ..TcOptions::default()
            };
            let mut model = TcModel::random(&[20, 15, 12], 2, 8, 0).unwrap();
            let comm = SoloCommunicator;
            let initial = metrics::rmse(&validate, &model, &comm);

            let mut ws = TcWorkspace::alloc(&opts, &model, &comm).unwrap();
            ws.start_timer();
            Sgd.train(&train, &validate, &mut model, &mut ws).unwrap();

            assert!(
                ws.best_rmse() < 0.5 * initial,
                "hogwild={hogwild} rand={rand_per_iteration}: best {} vs initial {initial}",
                ws.best_rmse()
            );
            assert!(ws.best_model().factors().iter().all(|f| f.iter().all(|v| v.is_finite())));
        }
    }
}
