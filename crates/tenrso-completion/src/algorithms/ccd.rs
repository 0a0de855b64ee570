//! Coordinate descent (CCD++)
//!
//! Rank-one components are refit one at a time against a residual that is
//! kept up to date: the residual gains component `r` back, every mode's
//! column `r` is solved in closed form, and the refit component is removed
//! again.

use super::common::{khatri_rao_entry, ModeIndex};
use super::Trainer;
use crate::algorithm::Algorithm;
use crate::error::CompletionResult;
use crate::model::TcModel;
use crate::workspace::TcWorkspace;
use rayon::prelude::*;
use tenrso_sparse::SparseTensor;

/// Inner passes over the modes for each rank-one component
const INNER_ITS: usize = 1;

#[derive(Debug, Clone, Copy, Default)]
pub struct Ccd;

/// Value of rank-one component `r` at every observation
fn component(train: &SparseTensor, model: &TcModel, r: usize) -> Vec<f64> {
    (0..train.nnz())
        .into_par_iter()
        .map(|n| {
            (0..model.nmodes())
                .map(|m| model.factor(m)[[train.ind(m)[n], r]])
                .product::<f64>()
        })
        .collect()
}

/// Closed-form update of column `r` of one mode
fn update_column(
    train: &SparseTensor,
    model: &mut TcModel,
    residual: &[f64],
    index: &ModeIndex,
    mode: usize,
    r: usize,
    reg: f64,
) {
    let column: Vec<Option<f64>> = {
        let model: &TcModel = model;
        (0..index.rows())
            .into_par_iter()
            .map(|i| {
                let nnz_ids = index.row(i);
                if nnz_ids.is_empty() {
                    return None;
                }
                let mut num = 0.0;
                let mut denom = reg;
                for &n in nnz_ids {
                    let h = khatri_rao_entry(train, model, n, mode, r);
                    num += residual[n] * h;
                    denom += h * h;
                }
                (denom > 0.0).then(|| num / denom)
            })
            .collect()
    };

    let factor = model.factor_mut(mode);
    for (i, value) in column.into_iter().enumerate() {
        if let Some(value) = value {
            factor[[i, r]] = value;
        }
    }
}

impl Trainer for Ccd {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Ccd
    }

    fn train(
        &self,
        train: &SparseTensor,
        validate: &SparseTensor,
        model: &mut TcModel,
        ws: &mut TcWorkspace<'_>,
    ) -> CompletionResult<()> {
        let indices = ModeIndex::build_all(train, model);
        let vals = train.vals();
        let mut residual: Vec<f64> = (0..train.nnz())
            .into_par_iter()
            .map(|n| vals[n] - model.predict_nnz(train, n))
            .collect();

        for _ in 0..ws.max_its {
            for r in 0..model.rank() {
                let old = component(train, model, r);
                residual
                    .par_iter_mut()
                    .zip(&old)
                    .for_each(|(res, c)| *res += c);

                for _ in 0..INNER_ITS {
                    for (m, index) in indices.iter().enumerate() {
                        update_column(
                            train,
                            model,
                            &residual,
                            index,
                            m,
                            r,
                            ws.regularization[m],
                        );
                    }
                }

                let new = component(train, model, r);
                residual
                    .par_iter_mut()
                    .zip(&new)
                    .for_each(|(res, c)| *res -= c);
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
    fn test_column_update_closed_form() {
        // residual 6 with h = 2 and reg 0: a = 12 / 4
        let tt = SparseTensor::new(vec![1, 1], vec![vec![0], vec![0]], vec![6.0]).unwrap();
        let mut model = TcModel::zeros(&[1, 1], 1).unwrap();
        model.factor_mut(1).fill(2.0);

        let index = ModeIndex::build(&tt, 0, 1);
        update_column(&tt, &mut model, &[6.0], &index, 0, 0, 0.0);
        assert!((model.factor(0)[[0, 0]] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_component_values() {
        let tt = SparseTensor::new(vec![2, 1], vec![vec![0, 1], vec![0, 0]], vec![1.0, 1.0])
            .unwrap();
        let mut model = TcModel::zeros(&[2, 1], 2).unwrap();
        model.factor_mut(0)[[1, 1]] = 3.0;
        model.factor_mut(1)[[0, 1]] = 2.0;
        assert_eq!(component(&tt, &model, 1), vec![0.0, 6.0]);
        assert_eq!(component(&tt, &model, 0), vec![0.0, 0.0]);
    }
}
