//! CP completion model
//!
//! A [`TcModel`] holds one dense factor matrix per mode. Entry `(i_0, ..,
//! i_{N-1})` of the completed tensor is predicted as
//!
//! ```text
//! x̂ = Σ_r Π_m A_m[i_m, r]
//! ```
//!
//! In a distributed run every participant holds the rows of mode 0 it owns
//! (relative to its layer start) and full copies of the other modes.

use crate::error::{CompletionError, CompletionResult};
use scirs2_core::ndarray_ext::Array2;
use scirs2_core::random::{rngs::StdRng, Rng, SeedableRng};
use tenrso_sparse::SparseTensor;

/// Offset between the per-participant mode-0 random streams
const MODE0_STREAM: u64 = 0x9E37_79B9_7F4A_7C15;

/// Rank-`rank` CP model with one `dims[m] × rank` factor per mode
#[derive(Debug, Clone, PartialEq)]
pub struct TcModel {
    rank: usize,
    dims: Vec<usize>,
    factors: Vec<Array2<f64>>,
}

impl TcModel {
    /// Zero-initialized model
    pub fn zeros(dims: &[usize], rank: usize) -> CompletionResult<Self> {
        if rank == 0 {
            return Err(CompletionError::InvalidConfig(
                "rank must be at least 1".to_string(),
            ));
        }
        if dims.is_empty() {
            return Err(CompletionError::ShapeMismatch(
                "a model needs at least one mode".to_string(),
            ));
        }
        let factors = dims.iter().map(|&d| Array2::zeros((d, rank))).collect();
        Ok(Self {
            rank,
            dims: dims.to_vec(),
            factors,
        })
    }

    /// Model with entries drawn uniformly from `[0, 1/√rank)`
    ///
    /// Modes 1.. are drawn from a stream seeded by `seed` alone, so every
    /// participant of a run holds the same replicated factors. Mode 0 is
    /// drawn from a stream that also depends on `participant`.
    pub fn random(
        dims: &[usize],
        rank: usize,
        seed: u64,
        participant: usize,
    ) -> CompletionResult<Self> {
        let mut model = Self::zeros(dims, rank)?;
        let scale = 1.0 / (rank as f64).sqrt();

        let mut shared = StdRng::seed_from_u64(seed);
        for factor in model.factors.iter_mut().skip(1) {
            factor.mapv_inplace(|_| shared.random::<f64>() * scale);
        }

        let stream = seed.wrapping_add(MODE0_STREAM.wrapping_mul(participant as u64 + 1));
        let mut local = StdRng::seed_from_u64(stream);
        model.factors[0].mapv_inplace(|_| local.random::<f64>() * scale);

        Ok(model)
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn nmodes(&self) -> usize {
        self.dims.len()
    }

    /// Row count of every factor
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn factor(&self, mode: usize) -> &Array2<f64> {
        &self.factors[mode]
    }

    pub fn factor_mut(&mut self, mode: usize) -> &mut Array2<f64> {
        &mut self.factors[mode]
    }

    pub fn factors(&self) -> &[Array2<f64>] {
        &self.factors
    }

    /// Total number of factor entries
    pub fn len(&self) -> usize {
        self.dims.iter().map(|d| d * self.rank).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Predicted value of observation `n` of `tt`
    #[inline]
    pub fn predict_nnz(&self, tt: &SparseTensor, n: usize) -> f64 {
        let mut est = 0.0;
        for r in 0..self.rank {
            let mut prod = 1.0;
            for (m, factor) in self.factors.iter().enumerate() {
                prod *= factor[[tt.ind(m)[n], r]];
            }
            est += prod;
        }
        est
    }

    /// Whether every index of observation `n` addresses a row of the model
    pub fn covers(&self, tt: &SparseTensor, n: usize) -> bool {
        tt.nmodes() == self.nmodes() && (0..self.nmodes()).all(|m| tt.ind(m)[n] < self.dims[m])
    }

    /// Check that every observation of `tt` addresses a row of the model
    pub fn check_covers(&self, tt: &SparseTensor) -> CompletionResult<()> {
        if tt.nmodes() != self.nmodes() {
            return Err(CompletionError::ShapeMismatch(format!(
                "tensor has {} modes but the model has {}",
                tt.nmodes(),
                self.nmodes()
            )));
        }
        for (m, (&extent, &rows)) in tt.dims().iter().zip(&self.dims).enumerate() {
            if extent > rows {
                return Err(CompletionError::ShapeMismatch(format!(
                    "mode {} has extent {extent} but the model has {rows} rows",
                    m + 1
                )));
            }
        }
        Ok(())
    }

    /// Squared Frobenius norm of one factor
    pub fn frobenius_sq(&self, mode: usize) -> f64 {
        self.factors[mode].iter().map(|v| v * v).sum()
    }

    /// Copy every factor entry of `other`, which must have the same shape
    pub fn copy_from(&mut self, other: &TcModel) {
        for (dst, src) in self.factors.iter_mut().zip(&other.factors) {
            dst.assign(src);
        }
    }

    /// All factor entries, mode by mode in row-major order
    pub fn to_flat(&self) -> Vec<f64> {
        let mut flat = Vec::with_capacity(self.len());
        for factor in &self.factors {
            flat.extend(factor.iter().copied());
        }
        flat
    }

    /// Overwrite every factor entry from a buffer laid out like [`TcModel::to_flat`]
    pub fn assign_flat(&mut self, flat: &[f64]) -> CompletionResult<()> {
        if flat.len() != self.len() {
            return Err(CompletionError::ShapeMismatch(format!(
                "flat buffer has {} entries, model has {}",
                flat.len(),
                self.len()
            )));
        }
        let mut offset = 0;
        for factor in &mut self.factors {
            let n = factor.len();
            for (dst, &src) in factor.iter_mut().zip(&flat[offset..offset + n]) {
                *dst = src;
            }
            offset += n;
        }
        Ok(())
    }
}
