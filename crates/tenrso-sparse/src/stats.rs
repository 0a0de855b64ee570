//! Basic tensor statistics block

use crate::coo::SparseTensor;
use crate::io::ShapeScan;
use std::fmt;

/// Name, extents and observation count of a tensor
#[derive(Debug, Clone, PartialEq)]
pub struct TensorStats {
    pub name: String,
    pub dims: Vec<usize>,
    pub nnz: usize,
}

impl TensorStats {
    pub fn from_tensor(name: impl Into<String>, tt: &SparseTensor) -> Self {
        Self {
            name: name.into(),
            dims: tt.dims().to_vec(),
            nnz: tt.nnz(),
        }
    }

    /// Statistics of the whole source described by a shape pass
    pub fn from_scan(name: impl Into<String>, scan: &ShapeScan) -> Self {
        Self {
            name: name.into(),
            dims: scan.dims.clone(),
            nnz: scan.total_nnz,
        }
    }

    pub fn density(&self) -> f64 {
        let total: f64 = self.dims.iter().map(|&d| d as f64).product();
        if total == 0.0 {
            0.0
        } else {
            self.nnz as f64 / total
        }
    }
}

impl fmt::Display for TensorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.dims.iter().map(|d| d.to_string()).collect();
        writeln!(
            f,
            "Tensor information ---------------------------------------------"
        )?;
        writeln!(f, "FILE={}", self.name)?;
        write!(
            f,
            "DIMS={} NNZ={} DENSITY={:e}",
            dims.join("x"),
            self.nnz,
            self.density()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_display() {
        let stats = TensorStats {
            name: "train.tns".to_string(),
            dims: vec![3, 3, 3],
            nnz: 5,
        };
        let text = stats.to_string();
        assert!(text.contains("FILE=train.tns"));
        assert!(text.contains("DIMS=3x3x3 NNZ=5"));
        assert!((stats.density() - 5.0 / 27.0).abs() < 1e-12);
    }
}
