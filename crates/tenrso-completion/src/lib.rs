//! # tenrso-completion
//!
//! Low-rank CP completion of sparse tensors, on one participant or on a
//! group of participants that each own a layer of mode-0 slices.
//!
//! This crate provides:
//! - [`TcModel`]: one dense factor matrix per mode
//! - [`TcOptions`] and [`TcWorkspace`]: run options resolved against the
//!   per-algorithm defaults, plus the shared convergence state
//! - [`algorithms`]: GD, NLCG, L-BFGS, SGD, CCD++ and ALS behind the
//!   [`Trainer`] trait
//! - [`topology`]: the [`Communicator`] collectives used to combine results
//! - [`metrics`]: global RMSE and MAE
//! - [`output`]: factor matrix files
//! - [`driver`]: the end-to-end run
//!
//! # Examples
//!
//! ```
//! use tenrso_completion::prelude::*;
//! use tenrso_sparse::SparseTensor;
//!
//! let train = SparseTensor::new(
//!     vec![3, 3],
//!     vec![vec![0, 1, 2, 0], vec![0, 1, 2, 2]],
//!     vec![1.0, 2.0, 3.0, 0.5],
//! )
//! .unwrap();
//! let validate = SparseTensor::new(vec![3, 3], vec![vec![1], vec![0]], vec![1.0]).unwrap();
//!
//! let opts = TcOptions {
//!     algorithm: Algorithm::Als,
//!     rank: 2,
//!     max_its: 5,
//!     seed: Some(1),
//!     ..TcOptions::default()
//! };
//! let mut model = TcModel::random(&[3, 3], opts.rank, 1, 0).unwrap();
//! let comm = SoloCommunicator;
//! let mut ws = TcWorkspace::alloc(&opts, &model, &comm).unwrap();
//! ws.start_timer();
//! trainer_for(opts.algorithm)
//!     .train(&train, &validate, &mut model, &mut ws)
//!     .unwrap();
//! assert!(ws.epochs() >= 1);
//! ```

#![deny(warnings)]

pub mod algorithm;
pub mod algorithms;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod model;
pub mod output;
pub mod topology;
pub mod workspace;


pub use algorithm::Algorithm;
pub use algorithms::{trainer_for, Trainer};
pub use driver::{run, CompletionConfig, RunSummary, TestReport};
pub use error::{CompletionError, CompletionResult};
pub use metrics::ErrorStats;
pub use model::TcModel;
pub use topology::{Communicator, LocalCommunicator, SoloCommunicator};
pub use workspace::{EpochRecord, TcOptions, TcWorkspace};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::algorithm::Algorithm;
    pub use crate::algorithms::{trainer_for, Trainer};
    pub use crate::driver::{run, CompletionConfig, RunSummary};
    pub use crate::error::{CompletionError, CompletionResult};
    pub use crate::model::TcModel;
    pub use crate::topology::{Communicator, LocalCommunicator, SoloCommunicator};
    pub use crate::workspace::{TcOptions, TcWorkspace};
}
