//! Coordinate sparse tensor with mode-major index storage
//!
//! A [`SparseTensor`] keeps one index array per mode plus one value array,
//! all of length `nnz`:
//!
//! - `inds[m][n]`: 0-based index of observation `n` in mode `m`
//! - `vals[n]`: observed value
//! - `dims[m]`: extent of mode `m`
//!
//! Mode-major storage lets the completion kernels stream a single mode's
//! indices without touching the others.
//!
//! # Examples
//!
//! ```
//! use tenrso_sparse::coo::SparseTensor;
//!
//! let inds = vec![vec![0, 1, 2], vec![1, 0, 2]];
//! let vals = vec![2.5, 3.0, 1.5];
//! let tt = SparseTensor::new(vec![3, 4], inds, vals).unwrap();
//! assert_eq!(tt.nnz(), 3);
//! assert_eq!(tt.dims(), &[3, 4]);
//! assert_eq!(tt.coord(1), vec![1, 0]);
//! ```

use crate::error::{SparseError, SparseResult, ValidationError};

/// Largest mode count a tensor may have
pub const MAX_NMODES: usize = 8;

/// Sparse tensor of `(index tuple, value)` observations
#[derive(Debug, Clone, PartialEq)]
pub struct SparseTensor {
    /// Extent of each mode
    dims: Vec<usize>,

    /// One index array per mode
    inds: Vec<Vec<usize>>,

    /// Observed values
    vals: Vec<f64>,
}

impl SparseTensor {
    /// Create a sparse tensor from mode-major index arrays
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `dims` is empty or has more than [`MAX_NMODES`] entries
    /// - the number of index arrays differs from the number of modes
    /// - any index array length differs from the value count
    /// - any index is outside its mode's extent
    pub fn new(dims: Vec<usize>, inds: Vec<Vec<usize>>, vals: Vec<f64>) -> SparseResult<Self> {
        check_mode_count(dims.len())?;

        if inds.len() != dims.len() {
            return Err(ValidationError::ShapeDimsMismatch {
                expected: dims.len(),
                got: inds.len(),
            }
            .into());
        }

        for (mode, ind) in inds.iter().enumerate() {
            if ind.len() != vals.len() {
                return Err(ValidationError::LengthMismatch {
                    indices: ind.len(),
                    values: vals.len(),
                }
                .into());
            }
            if let Some(pos) = ind.iter().position(|&i| i >= dims[mode]) {
                let index = inds.iter().map(|ind| ind[pos]).collect();
                return Err(SparseError::index_out_of_bounds(index, dims));
            }
        }

        Ok(Self { dims, inds, vals })
    }

    /// Create an empty tensor with room for `nnz` observations
    pub fn with_capacity(dims: Vec<usize>, nnz: usize) -> SparseResult<Self> {
        check_mode_count(dims.len())?;

        let inds = (0..dims.len()).map(|_| Vec::with_capacity(nnz)).collect();
        Ok(Self {
            dims,
            inds,
            vals: Vec::with_capacity(nnz),
        })
    }

    /// Append one observation
    pub fn push(&mut self, index: &[usize], value: f64) -> SparseResult<()> {
        if index.len() != self.dims.len() {
            return Err(ValidationError::ShapeDimsMismatch {
                expected: self.dims.len(),
                got: index.len(),
            }
            .into());
        }
        if index.iter().zip(&self.dims).any(|(&i, &d)| i >= d) {
            return Err(SparseError::index_out_of_bounds(
                index.to_vec(),
                self.dims.clone(),
            ));
        }

        for (ind, &i) in self.inds.iter_mut().zip(index) {
            ind.push(i);
        }
        self.vals.push(value);
        Ok(())
    }

    /// Number of modes
    pub fn nmodes(&self) -> usize {
        self.dims.len()
    }

    /// Number of stored observations
    pub fn nnz(&self) -> usize {
        self.vals.len()
    }

    /// Extent of every mode
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Index array of one mode
    pub fn ind(&self, mode: usize) -> &[usize] {
        &self.inds[mode]
    }

    /// All index arrays, mode-major
    pub fn inds(&self) -> &[Vec<usize>] {
        &self.inds
    }

    /// Observed values
    pub fn vals(&self) -> &[f64] {
        &self.vals
    }

    /// Index tuple of observation `n`
    pub fn coord(&self, n: usize) -> Vec<usize> {
        self.inds.iter().map(|ind| ind[n]).collect()
    }

    /// Fraction of the index space that is observed
    pub fn density(&self) -> f64 {
        let total: f64 = self.dims.iter().map(|&d| d as f64).product();
        if total == 0.0 {
            return 0.0;
        }
        self.nnz() as f64 / total
    }

    /// Sum of squared values
    pub fn frobenius_sq(&self) -> f64 {
        self.vals.iter().map(|v| v * v).sum()
    }
}

fn check_mode_count(nmodes: usize) -> SparseResult<()> {
    if nmodes == 0 {
        return Err(ValidationError::EmptyShape.into());
    }
    if nmodes > MAX_NMODES {
        return Err(SparseError::TooManyModes {
            found: nmodes,
            max: MAX_NMODES,
        });
    }
    Ok(())
}
