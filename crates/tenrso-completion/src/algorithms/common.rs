//! Pieces shared by the trainers
//!
//! The batch trainers (GD, NLCG, L-BFGS) minimize
//!
//! ```text
//! f(A) = ½ Σ_n (x_n − x̂_n)² + ½ Σ_m reg_m ‖A_m‖²
//! ```
//!
//! over the flattened factor entries (see [`TcModel::to_flat`]). ALS and
//! CCD++ work row by row and use [`ModeIndex`] to find the observations of a
//! row.

use crate::error::CompletionResult;
use crate::model::TcModel;
use rayon::prelude::*;
use scirs2_core::random::{rngs::StdRng, Rng};
use tenrso_sparse::SparseTensor;

/// Sufficient-decrease constant of the Armijo condition
const ARMIJO_C: f64 = 1e-4;
/// Step shrink factor between line search trials
const BACKTRACK: f64 = 0.5;
const MAX_TRIALS: usize = 30;

/// Observations grouped by their row in one mode (CSR layout)
#[derive(Debug, Clone)]
pub struct ModeIndex {
    ptr: Vec<usize>,
    nnz_ids: Vec<usize>,
}

impl ModeIndex {
    /// Group the observations of `tt` by their index in `mode`; `rows` must
    /// cover every index in that mode
    pub fn build(tt: &SparseTensor, mode: usize, rows: usize) -> Self {
        let ind = tt.ind(mode);
        let mut ptr = vec![0usize; rows + 1];
        for &i in ind {
            ptr[i + 1] += 1;
        }
        for i in 0..rows {
            ptr[i + 1] += ptr[i];
        }

        let mut next = ptr.clone();
        let mut nnz_ids = vec![0usize; ind.len()];
        for (n, &i) in ind.iter().enumerate() {
            nnz_ids[next[i]] = n;
            next[i] += 1;
        }

        Self { ptr, nnz_ids }
    }

    /// One index per mode of `model`
    pub fn build_all(tt: &SparseTensor, model: &TcModel) -> Vec<Self> {
        (0..model.nmodes())
            .map(|m| Self::build(tt, m, model.dims()[m]))
            .collect()
    }

    pub fn rows(&self) -> usize {
        self.ptr.len() - 1
    }

    /// Observation ids of `row`, in file order
    #[inline]
    pub fn row(&self, row: usize) -> &[usize] {
        &self.nnz_ids[self.ptr[row]..self.ptr[row + 1]]
    }
}

/// Product of column `r` over every mode but `skip` at observation `n`
#[inline]
pub fn khatri_rao_entry(tt: &SparseTensor, model: &TcModel, n: usize, skip: usize, r: usize) -> f64 {
    let mut prod = 1.0;
    for m in 0..model.nmodes() {
        if m != skip {
            prod *= model.factor(m)[[tt.ind(m)[n], r]];
        }
    }
    prod
}

/// Regularized least-squares objective over the training observations
pub struct Objective<'a> {
    train: &'a SparseTensor,
    reg: &'a [f64],
    indices: Vec<ModeIndex>,
}

impl<'a> Objective<'a> {
    pub fn new(train: &'a SparseTensor, reg: &'a [f64], model: &TcModel) -> Self {
        Self {
            train,
            reg,
            indices: ModeIndex::build_all(train, model),
        }
    }

    /// Residuals `x_n − x̂_n`
    pub fn residuals(&self, model: &TcModel) -> Vec<f64> {
        let vals = self.train.vals();
        (0..self.train.nnz())
            .into_par_iter()
            .map(|n| vals[n] - model.predict_nnz(self.train, n))
            .collect()
    }

    pub fn value(&self, model: &TcModel) -> f64 {
        let sse: f64 = self.residuals(model).iter().map(|e| e * e).sum();
        let penalty: f64 = (0..model.nmodes())
            .map(|m| self.reg[m] * model.frobenius_sq(m))
            .sum();
        0.5 * (sse + penalty)
    }

    /// Gradient with respect to the flattened factor entries
    pub fn gradient(&self, model: &TcModel) -> Vec<f64> {
        let residuals = self.residuals(model);
        let rank = model.rank();
        let mut grad = Vec::with_capacity(model.len());

        for (m, index) in self.indices.iter().enumerate() {
            let factor = model.factor(m);
            let rows: Vec<Vec<f64>> = (0..index.rows())
                .into_par_iter()
                .map(|i| {
                    let mut row: Vec<f64> = (0..rank).map(|r| self.reg[m] * factor[[i, r]]).collect();
                    for &n in index.row(i) {
                        for (r, g) in row.iter_mut().enumerate() {
                            *g -= residuals[n] * khatri_rao_entry(self.train, model, n, m, r);
                        }
                    }
                    row
                })
                .collect();
            for row in rows {
                grad.extend(row);
            }
        }

        grad
    }
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Backtracking line search along `dir` from the flattened point `x`
///
/// On success the model holds `x + step·dir` and the accepted step and
/// objective value are returned. When `dir` is not a descent direction or
/// no trial satisfies the Armijo condition the model is restored to `x`.
pub fn line_search(
    objective: &Objective<'_>,
    model: &mut TcModel,
    x: &[f64],
    fx: f64,
    grad: &[f64],
    dir: &[f64],
    initial_step: f64,
) -> CompletionResult<Option<(f64, f64)>> {
    let slope = dot(grad, dir);
    if slope.is_nan() || slope >= 0.0 {
        model.assign_flat(x)?;
        return Ok(None);
    }

    let mut step = initial_step;
    let mut trial = vec![0.0; x.len()];
    for _ in 0..MAX_TRIALS {
        for ((t, &xi), &di) in trial.iter_mut().zip(x).zip(dir) {
            *t = xi + step * di;
        }
        model.assign_flat(&trial)?;
        let f = objective.value(model);
        if f <= fx + ARMIJO_C * step * slope {
            return Ok(Some((step, f)));
        }
        step *= BACKTRACK;
    }

    model.assign_flat(x)?;
    Ok(None)
}

/// Fisher-Yates shuffle
pub fn shuffle(order: &mut [usize], rng: &mut StdRng) {
    for i in (1..order.len()).rev() {
        let j = rng.random_range(0..=i);
        order.swap(i, j);
    }
}
