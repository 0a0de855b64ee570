//! # tenrso-sparse
//!
//! Sparse tensor storage and I/O for tensor completion.
//!
//! This crate provides:
//! - [`SparseTensor`]: coordinate storage with one index array per mode
//! - [`Layer`]: contiguous ownership ranges over mode-0 slices
//! - [`io`]: a two-pass, streaming reader for the text tensor format that
//!   keeps only the observations owned by a layer
//! - [`TensorStats`]: the basic statistics block printed before factoring

#![deny(warnings)]

pub mod coo;
pub mod error;
pub mod io;
pub mod partition;
pub mod stats;

#[cfg(test)]
mod property_tests;

// Re-exports
pub use coo::*;
pub use error::*;
pub use io::{
    read_tensor, read_tensor_file, read_with_scan, scan_shape, FileSource, LineSource,
    MemorySource, Record, Records, ShapeScan,
};
pub use partition::Layer;
pub use stats::TensorStats;
