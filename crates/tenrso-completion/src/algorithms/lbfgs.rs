//! Limited-memory BFGS

use super::common::{dot, line_search, Objective};
use super::Trainer;
use crate::algorithm::Algorithm;
use crate::error::CompletionResult;
use crate::model::TcModel;
use crate::workspace::TcWorkspace;
use std::collections::VecDeque;
use tenrso_sparse::SparseTensor;
use tracing::debug;

/// Correction pairs kept
const MEMORY: usize = 5;

#[derive(Debug, Clone, Copy, Default)]
pub struct Lbfgs;

/// Two-loop recursion: `-H·grad` from the stored `(s, y)` pairs
fn search_direction(grad: &[f64], pairs: &VecDeque<(Vec<f64>, Vec<f64>)>) -> Vec<f64> {
    let mut q = grad.to_vec();
    let mut alphas = Vec::with_capacity(pairs.len());

    for (s, y) in pairs.iter().rev() {
        let rho = 1.0 / dot(y, s);
        let alpha = rho * dot(s, &q);
        for (qi, yi) in q.iter_mut().zip(y) {
            *qi -= alpha * yi;
        }
        alphas.push((rho, alpha));
    }

    if let Some((s, y)) = pairs.back() {
        let gamma = dot(s, y) / dot(y, y);
        q.iter_mut().for_each(|qi| *qi *= gamma);
    }

    for ((s, y), (rho, alpha)) in pairs.iter().zip(alphas.into_iter().rev()) {
        let beta = rho * dot(y, &q);
        for (qi, si) in q.iter_mut().zip(s) {
            *qi += (alpha - beta) * si;
        }
    }

    q.iter_mut().for_each(|qi| *qi = -*qi);
    q
}

impl Trainer for Lbfgs {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Lbfgs
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
        let mut pairs: VecDeque<(Vec<f64>, Vec<f64>)> = VecDeque::with_capacity(MEMORY);

        for _ in 0..ws.max_its {
            let dir = search_direction(&grad, &pairs);
            let step = if pairs.is_empty() { ws.learn_rate } else { 1.0 };

            match line_search(&objective, model, &x, fx, &grad, &dir, step)? {
                Some((_, f)) => {
                    let next_x = model.to_flat();
                    let next_grad = objective.gradient(model);
                    let s: Vec<f64> = next_x.iter().zip(&x).map(|(a, b)| a - b).collect();
                    let y: Vec<f64> = next_grad.iter().zip(&grad).map(|(a, b)| a - b).collect();

                    // curvature condition
                    if dot(&s, &y) > 1e-12 {
                        if pairs.len() == MEMORY {
                            pairs.pop_front();
                        }
                        pairs.push_back((s, y));
                    }

                    x = next_x;
                    grad = next_grad;
                    fx = f;
                }
                None => {
                    debug!("line search failed, clearing curvature history");
                    pairs.clear();
                }
            }

            if ws.converge(train, validate, model) {
                break;
            }
        }

        Ok(())
    }
}
