//! Nonlinear conjugate gradient (Polak-Ribière+)

use super::common::{dot, line_search, Objective};
use super::Trainer;
use crate::algorithm::Algorithm;
use crate::error::CompletionResult;
use crate::model::TcModel;
use crate::workspace::TcWorkspace;
use tenrso_sparse::SparseTensor;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct NonlinearCg;

impl Trainer for NonlinearCg {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Nlcg
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
        let mut grad = objective.gradient(model);
        let mut dir: Vec<f64> = grad.iter().map(|g| -g).collect();
        let mut step = ws.learn_rate;

        for _ in 0..ws.max_its {
            match line_search(&objective, model, &x, fx, &grad, &dir, step)? {
                Some((accepted, f)) => {
                    fx = f;
                    x = model.to_flat();
                    step = accepted * 2.0;

                    let next = objective.gradient(model);
                    let denom = dot(&grad, &grad);
                    let beta = if denom > 0.0 {
                        let num: f64 = next.iter().zip(&grad).map(|(n, g)| n * (n - g)).sum();
                        (num / denom).max(0.0)
                    } else {
                        0.0
                    };
                    for (d, n) in dir.iter_mut().zip(&next) {
                        *d = -n + beta * *d;
                    }
                    grad = next;

                    // restart along the gradient when the direction stops descending
                    if dot(&grad, &dir) >= 0.0 {
                        dir = grad.iter().map(|g| -g).collect();
                    }
                }
                None => {
                    debug!("line search failed, restarting along the gradient");
                    dir = grad.iter().map(|g| -g).collect();
                }
            }

            if ws.converge(train, validate, model) {
                break;
            }
        }

        Ok(())
    }
}
