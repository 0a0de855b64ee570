//! Completion trainers
//!
//! Every algorithm implements [`Trainer`]. A trainer refines the model in
//! place and calls [`TcWorkspace::converge`] after every epoch (or SGD fold),
//! which evaluates the model, keeps the best one seen so far and decides
//! when to stop. Trainers never stop on their own except at the iteration
//! cap.
//!
//! | Algorithm | Trainer | Update |
//! |-----------|---------|--------|
//! | `gd` | [`GradientDescent`] | full gradient, backtracking line search |
//! | `nlcg` (`cg`) | [`NonlinearCg`] | Polak-Ribière+ directions |
//! | `lbfgs` | [`Lbfgs`] | two-loop recursion over 5 pairs |
//! | `sgd` | [`Sgd`] | per-observation updates, hogwild or locked |
//! | `ccd` | [`Ccd`] | rank-one coordinate descent on the residual |
//! | `als` | [`Als`] | per-row regularized least squares |

pub mod als;
pub mod ccd;
pub mod common;
pub mod gd;
pub mod lbfgs;
pub mod nlcg;
pub mod sgd;

pub use als::Als;
pub use ccd::Ccd;
pub use gd::GradientDescent;
pub use lbfgs::Lbfgs;
pub use nlcg::NonlinearCg;
pub use sgd::{SharedFactors, Sgd};

use crate::algorithm::Algorithm;
use crate::error::CompletionResult;
use crate::model::TcModel;
use crate::workspace::TcWorkspace;
use tenrso_sparse::SparseTensor;

/// A completion algorithm
pub trait Trainer: Send + Sync {
    fn algorithm(&self) -> Algorithm;

    /// Fit `model` to `train`, checking convergence against `validate`
    ///
    /// On return the workspace holds the best model seen.
    fn train(
        &self,
        train: &SparseTensor,
        validate: &SparseTensor,
        model: &mut TcModel,
        ws: &mut TcWorkspace<'_>,
    ) -> CompletionResult<()>;
}

/// Trainer implementing `alg`
pub fn trainer_for(alg: Algorithm) -> &'static dyn Trainer {
    match alg {
        Algorithm::Gd => &GradientDescent,
        Algorithm::Nlcg => &NonlinearCg,
        Algorithm::Lbfgs => &Lbfgs,
        Algorithm::Sgd => &Sgd,
        Algorithm::Ccd => &Ccd,
        Algorithm::Als => &Als,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::SoloCommunicator;
    use crate::workspace::TcOptions;

    #[test]
    fn test_lookup_table_is_consistent() {
        for alg in Algorithm::ALL {
            assert_eq!(trainer_for(alg).algorithm(), alg);
        }
    }

    /// Low-rank 3-mode tensor observed on a regular subset of its entries
    fn low_rank_sample() -> (SparseTensor, SparseTensor) {
        let dims = [6, 5, 4];
        let value = |i: usize, j: usize, k: usize| {
            (1.0 + 0.1 * i as f64) * (0.5 + 0.2 * j as f64) * (1.0 + 0.05 * k as f64)
        };
        let mut train = SparseTensor::with_capacity(dims.to_vec(), 0).unwrap();
        let mut validate = SparseTensor::with_capacity(dims.to_vec(), 0).unwrap();
        for i in 0..dims[0] {
            for j in 0..dims[1] {
                for k in 0..dims[2] {
                    let target = if (i + 2 * j + 3 * k) % 5 == 0 {
                        &mut validate
                    } else {
                        &mut train
                    };
                    target.push(&[i, j, k], value(i, j, k)).unwrap();
                }
            }
        }
        (train, validate)
    }

    #[test]
    fn test_every_trainer_improves_validation() {
        let (train, validate) = low_rank_sample();
        for alg in Algorithm::ALL {
            let mut model = TcModel::random(&[6, 5, 4], 2, 17, 0).unwrap();
            let opts = TcOptions {
                algorithm: alg,
                rank: 2,
                max_its: 30,
                learn_rate: Some(0.01),
                reg: Some(1e-3),
                seed: Some(17),
                ..TcOptions::default()
            };
            let comm = SoloCommunicator;
            let mut ws = TcWorkspace::alloc(&opts, &model, &comm).unwrap();
            let initial = crate::metrics::rmse(&validate, &model, &comm);

            ws.start_timer();
            trainer_for(alg)
                .train(&train, &validate, &mut model, &mut ws)
                .unwrap();

            assert!(ws.epochs() >= 1, "{alg} ran no epochs");
            assert!(
                ws.best_rmse() < initial,
                "{alg}: best {} not below initial {initial}",
                ws.best_rmse()
            );
        }
    }
}
