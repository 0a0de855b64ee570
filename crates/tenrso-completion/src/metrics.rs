//! Distributed error metrics
//!
//! Errors are accumulated locally over the observations a participant owns
//! and then summed over the group, so every participant sees the global
//! figures. Local sums use fixed-size chunks reduced in order, which keeps
//! the result independent of the thread count.

use crate::model::TcModel;
use crate::topology::Communicator;
use rayon::prelude::*;
use tenrso_sparse::SparseTensor;

/// Observations per reduction chunk
const CHUNK: usize = 4096;

/// Summed prediction errors over a set of observations
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ErrorStats {
    /// Sum of squared errors
    pub sse: f64,
    /// Sum of absolute errors
    pub sae: f64,
    /// Number of observations
    pub count: usize,
    /// Observations addressing rows beyond the model, predicted as 0
    pub uncovered: usize,
}

impl ErrorStats {
    fn merge(self, other: ErrorStats) -> ErrorStats {
        ErrorStats {
            sse: self.sse + other.sse,
            sae: self.sae + other.sae,
            count: self.count + other.count,
            uncovered: self.uncovered + other.uncovered,
        }
    }

    /// Root-mean-squared error; 0 over an empty set
    pub fn rmse(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        (self.sse / self.count as f64).sqrt()
    }

    /// Mean absolute error; 0 over an empty set
    pub fn mae(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sae / self.count as f64
    }

    /// Sum the statistics of all participants
    pub fn all_reduce(self, comm: &dyn Communicator) -> ErrorStats {
        let mut buf = [
            self.sse,
            self.sae,
            self.count as f64,
            self.uncovered as f64,
        ];
        comm.all_reduce_sum(&mut buf);
        ErrorStats {
            sse: buf[0],
            sae: buf[1],
            count: buf[2] as usize,
            uncovered: buf[3] as usize,
        }
    }
}

/// Error statistics over the observations held locally
pub fn local_error_stats(tt: &SparseTensor, model: &TcModel) -> ErrorStats {
    let nnz = tt.nnz();
    let vals = tt.vals();
    let partials: Vec<ErrorStats> = (0..nnz.div_ceil(CHUNK))
        .into_par_iter()
        .map(|chunk| {
            let start = chunk * CHUNK;
            let end = (start + CHUNK).min(nnz);
            let mut stats = ErrorStats::default();
            for n in start..end {
                let est = if model.covers(tt, n) {
                    model.predict_nnz(tt, n)
                } else {
                    stats.uncovered += 1;
                    0.0
                };
                let err = vals[n] - est;
                stats.sse += err * err;
                stats.sae += err.abs();
                stats.count += 1;
            }
            stats
        })
        .collect();

    partials
        .into_iter()
        .fold(ErrorStats::default(), ErrorStats::merge)
}

/// Global error statistics over every participant's observations
pub fn error_stats(tt: &SparseTensor, model: &TcModel, comm: &dyn Communicator) -> ErrorStats {
    local_error_stats(tt, model).all_reduce(comm)
}

/// Global root-mean-squared error
pub fn rmse(tt: &SparseTensor, model: &TcModel, comm: &dyn Communicator) -> f64 {
    error_stats(tt, model, comm).rmse()
}

/// Global mean absolute error
pub fn mae(tt: &SparseTensor, model: &TcModel, comm: &dyn Communicator) -> f64 {
    error_stats(tt, model, comm).mae()
}

/// Global regularization penalty `Σ_m reg[m] · ‖A_m‖²`
///
/// Mode 0 is partitioned across participants and summed over the group; the
/// other modes are replicated and counted once.
pub fn regularization_penalty(model: &TcModel, reg: &[f64], comm: &dyn Communicator) -> f64 {
    let mut mode0 = [reg[0] * model.frobenius_sq(0)];
    comm.all_reduce_sum(&mut mode0);
    let rest: f64 = (1..model.nmodes())
        .map(|m| reg[m] * model.frobenius_sq(m))
        .sum();
    mode0[0] + rest
}
