//! Gradient descent with backtracking line search

use super::common::{line_search, Objective};
use super::Trainer;
use crate::algorithm::Algorithm;
use crate::error::CompletionResult;
use crate::model::TcModel;
use crate::workspace::TcWorkspace;
use tenrso_sparse::SparseTensor;
use tracing::debug;

/// Steepest descent; the accepted step is doubled to seed the next search
#[derive(Debug, Clone, Copy, Default)]
pub struct GradientDescent;

impl Trainer for GradientDescent {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Gd
    }

    fn train(
        &self,
        train: &SparseTensor,
        validate: &SparseTensor,
        model: &mut TcModel,
        ws: &mut TcWorkspace<'_>,
    ) -> CompletionResult<()> {
        let reg = ws.regularization.clone();
        let objective = Objective::new(train, &reg, model);

        let mut x = model.to_flat();
        let mut fx = objective.value(model);
        let mut step = ws.learn_rate;

        for _ in 0..ws.max_its {
            let grad = objective.gradient(model);
            let dir: Vec<f64> = grad.iter().map(|g| -g).collect();

            match line_search(&objective, model, &x, fx, &grad, &dir, step)? {
                Some((accepted, f)) => {
                    fx = f;
                    x = model.to_flat();
                    step = accepted * 2.0;
                }
                None => debug!("line search made no progress"),
            }

            if ws.converge(train, validate, model) {
                break;
            }
        }

        Ok(())
    }
}
