//! Ownership partitions over mode-0 indices
//!
//! Each participant of a distributed run owns one contiguous, half-open
//! [`Layer`] of mode-0 slices. A set of layers is a valid partition of an
//! extent when the layers are ordered, start at 0, end at the extent and
//! share their boundaries (no gap, no overlap). Layers may be empty when
//! there are more participants than slices.
//!
//! # Examples
//!
//! ```
//! use tenrso_sparse::partition::Layer;
//!
//! let layers = Layer::partition_uniform(10, 3).unwrap();
//! assert_eq!(layers, vec![Layer::new(0, 4).unwrap(), Layer::new(4, 7).unwrap(), Layer::new(7, 10).unwrap()]);
//! assert!(Layer::validate_cover(&layers, 10).is_ok());
//! ```

use crate::error::{SparseError, SparseResult};

/// Contiguous half-open range `[start, end)` of mode-0 indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layer {
    start: usize,
    end: usize,
}

impl Layer {
    /// Create a layer; `start` must not exceed `end`
    pub fn new(start: usize, end: usize) -> SparseResult<Self> {
        if start > end {
            return Err(SparseError::InvalidPartition(format!(
                "layer start {start} is past its end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The single layer owning `[0, extent)`
    pub fn whole(extent: usize) -> Self {
        Self {
            start: 0,
            end: extent,
        }
    }

    /// First owned index
    pub fn start(&self) -> usize {
        self.start
    }

    /// One past the last owned index
    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of owned slices
    pub fn width(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether mode-0 index `i` (0-based, global) is owned by this layer
    #[inline]
    pub fn contains(&self, i: usize) -> bool {
        i >= self.start && i < self.end
    }

    /// Split `[0, extent)` into `npes` layers of near-equal width
    ///
    /// The first `extent % npes` layers receive one extra slice.
    pub fn partition_uniform(extent: usize, npes: usize) -> SparseResult<Vec<Layer>> {
        if npes == 0 {
            return Err(SparseError::InvalidPartition(
                "cannot partition over zero participants".to_string(),
            ));
        }

        let base = extent / npes;
        let extra = extent % npes;
        let mut layers = Vec::with_capacity(npes);
        let mut start = 0;
        for p in 0..npes {
            let width = base + usize::from(p < extra);
            layers.push(Layer {
                start,
                end: start + width,
            });
            start += width;
        }

        Ok(layers)
    }

    /// Split `[0, extent)` into `npes` layers holding near-equal observation counts
    ///
    /// `slice_nnz[i]` is the number of observations in mode-0 slice `i`;
    /// slices past the end of `slice_nnz` count as empty. Falls back to
    /// [`Layer::partition_uniform`] when there are no observations at all.
    pub fn partition_balanced(
        slice_nnz: &[usize],
        extent: usize,
        npes: usize,
    ) -> SparseResult<Vec<Layer>> {
        if npes == 0 {
            return Err(SparseError::InvalidPartition(
                "cannot partition over zero participants".to_string(),
            ));
        }
        if slice_nnz.len() > extent {
            return Err(SparseError::InvalidPartition(format!(
                "{} slice counts exceed extent {extent}",
                slice_nnz.len()
            )));
        }

        let total: usize = slice_nnz.iter().sum();
        if total == 0 {
            return Self::partition_uniform(extent, npes);
        }

        let mut bounds = Vec::with_capacity(npes + 1);
        bounds.push(0);

        let mut cum = 0usize;
        let mut i = 0usize;
        for p in 1..npes {
            let target = (total as u128 * p as u128 / npes as u128) as usize;
            while i < slice_nnz.len() && cum < target {
                cum += slice_nnz[i];
                i += 1;
            }
            bounds.push(i);
        }
        bounds.push(extent);

        Ok(bounds
            .windows(2)
            .map(|w| Layer {
                start: w[0],
                end: w[1],
            })
            .collect())
    }

    /// Check that `layers` covers `[0, extent)` with no gap and no overlap
    pub fn validate_cover(layers: &[Layer], extent: usize) -> SparseResult<()> {
        let mut expected_start = 0;
        for (p, layer) in layers.iter().enumerate() {
            if layer.start != expected_start {
                return Err(SparseError::InvalidPartition(format!(
                    "layer {p} starts at {} but the previous layer ends at {expected_start}",
                    layer.start
                )));
            }
            expected_start = layer.end;
        }
        if expected_start != extent {
            return Err(SparseError::InvalidPartition(format!(
                "layers end at {expected_start} but the extent is {extent}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_partition() {
        let layers = Layer::partition_uniform(3, 2).unwrap();
        assert_eq!(layers[0], Layer::new(0, 2).unwrap());
        assert_eq!(layers[1], Layer::new(2, 3).unwrap());
        assert!(Layer::validate_cover(&layers, 3).is_ok());
    }

    #[test]
    fn test_more_participants_than_slices() {
        let layers = Layer::partition_uniform(2, 4).unwrap();
        assert_eq!(layers.len(), 4);
        assert!(layers[2].is_empty() && layers[3].is_empty());
        assert!(Layer::validate_cover(&layers, 2).is_ok());
    }

    #[test]
    fn test_balanced_partition() {
        // slice 0 is heavy, the rest light
        let slice_nnz = vec![6, 1, 1, 1, 1];
        let layers = Layer::partition_balanced(&slice_nnz, 5, 2).unwrap();
        assert_eq!(layers[0], Layer::new(0, 1).unwrap());
        assert_eq!(layers[1], Layer::new(1, 5).unwrap());
        assert!(Layer::validate_cover(&layers, 5).is_ok());
    }

    #[test]
    fn test_balanced_extends_to_extent() {
        let layers = Layer::partition_balanced(&[2, 2], 6, 2).unwrap();
        assert_eq!(layers.last().unwrap().end(), 6);
        assert!(Layer::validate_cover(&layers, 6).is_ok());
    }

    #[test]
    fn test_zero_participants_rejected() {
        assert!(Layer::partition_uniform(4, 0).is_err());
        assert!(Layer::partition_balanced(&[1], 1, 0).is_err());
    }

    #[test]
    fn test_validate_cover_detects_gap() {
        let layers = vec![Layer::new(0, 2).unwrap(), Layer::new(3, 5).unwrap()];
        assert!(Layer::validate_cover(&layers, 5).is_err());
    }

    #[test]
    fn test_contains() {
        let layer = Layer::new(2, 4).unwrap();
        assert!(!layer.contains(1));
        assert!(layer.contains(2));
        assert!(layer.contains(3));
        assert!(!layer.contains(4));
        assert_eq!(layer.width(), 2);
    }
}
