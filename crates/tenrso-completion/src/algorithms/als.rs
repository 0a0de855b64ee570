//! Alternating least squares
//!
//! Each sweep updates every mode in turn. Row `i` of mode `m` solves the
//! regularized normal equations over the observations in that row:
//!
//! ```text
//! (Σ_n h_n h_nᵀ + reg_m·I) a_i = Σ_n x_n h_n
//! ```
//!
//! where `h_n` is the elementwise product of the other modes' rows at
//! observation `n`. Rows without observations keep their values.

use super::common::{khatri_rao_entry, ModeIndex};
use super::Trainer;
use crate::algorithm::Algorithm;
use crate::error::CompletionResult;
use crate::model::TcModel;
use crate::workspace::TcWorkspace;
use rayon::prelude::*;
use scirs2_core::ndarray_ext::{Array1, Array2};
use scirs2_linalg::lstsq;
use tenrso_sparse::SparseTensor;

#[derive(Debug, Clone, Copy, Default)]
pub struct Als;

/// Solve the normal equations of one row; `None` for a row without observations
fn solve_row(
    train: &SparseTensor,
    model: &TcModel,
    mode: usize,
    nnz_ids: &[usize],
    reg: f64,
) -> CompletionResult<Option<Array1<f64>>> {
    if nnz_ids.is_empty() {
        return Ok(None);
    }

    let rank = model.rank();
    let vals = train.vals();
    let mut gram = Array2::<f64>::zeros((rank, rank));
    let mut rhs = Array1::<f64>::zeros(rank);
    let mut h = vec![0.0; rank];

    for &n in nnz_ids {
        for (r, hr) in h.iter_mut().enumerate() {
            *hr = khatri_rao_entry(train, model, n, mode, r);
        }
        for r in 0..rank {
            rhs[r] += vals[n] * h[r];
            for c in 0..rank {
                gram[[r, c]] += h[r] * h[c];
            }
        }
    }
    for r in 0..rank {
        gram[[r, r]] += reg;
    }

    let solution = lstsq(&gram.view(), &rhs.view(), None)?;
    Ok(Some(solution.x))
}

/// Update every row of one mode
fn update_mode(
    train: &SparseTensor,
    model: &mut TcModel,
    index: &ModeIndex,
    mode: usize,
    reg: f64,
) -> CompletionResult<()> {
    let rows: Vec<Option<Array1<f64>>> = {
        let model: &TcModel = model;
        (0..index.rows())
            .into_par_iter()
            .map(|i| solve_row(train, model, mode, index.row(i), reg))
            .collect::<CompletionResult<_>>()?
    };

    let factor = model.factor_mut(mode);
    for (i, row) in rows.into_iter().enumerate() {
        if let Some(row) = row {
            factor.row_mut(i).assign(&row);
        }
    }
    Ok(())
}

impl Trainer for Als {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Als
    }

    fn train(
        &self,
        train: &SparseTensor,
        validate: &SparseTensor,
        model: &mut TcModel,
        ws: &mut TcWorkspace<'_>,
    ) -> CompletionResult<()> {
        let indices = ModeIndex::build_all(train, model);

        for _ in 0..ws.max_its {
            for (m, index) in indices.iter().enumerate() {
                update_mode(train, model, index, m, ws.regularization[m])?;
            }

            if ws.converge(train, validate, model) {
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_one_row_solution() {
        // one observation x = 6 with h = 2: (4 + reg) a = 12
        let tt = SparseTensor::new(vec![1, 1], vec![vec![0], vec![0]], vec![6.0]).unwrap();
        let mut model = TcModel::zeros(&[1, 1], 1).unwrap();
        model.factor_mut(1).fill(2.0);

        let row = solve_row(&tt, &model, 0, &[0], 0.0).unwrap().unwrap();
        assert!((row[0] - 3.0).abs() < 1e-10);

        let row = solve_row(&tt, &model, 0, &[0], 2.0).unwrap().unwrap();
        assert!((row[0] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_empty_row_unchanged() {
        let tt = SparseTensor::new(vec![2, 1], vec![vec![0], vec![0]], vec![6.0]).unwrap();
        let mut model = TcModel::zeros(&[2, 1], 1).unwrap();
        model.factor_mut(0).fill(5.0);
        model.factor_mut(1).fill(2.0);

        let index = ModeIndex::build(&tt, 0, 2);
        update_mode(&tt, &mut model, &index, 0, 0.0).unwrap();
        assert!((model.factor(0)[[0, 0]] - 3.0).abs() < 1e-10);
        assert_eq!(model.factor(0)[[1, 0]], 5.0);
    }
}
