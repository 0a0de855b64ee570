//! # tenrso-tc - Sparse Tensor Completion
//!
//! This is the **meta crate** that re-exports the completion stack and hosts
//! the `tenrso-complete` command.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tenrso_tc::prelude::*;
//!
//! let mut config = CompletionConfig::new("train.tns", "validate.tns");
//! config.options.algorithm = Algorithm::Ccd;
//! config.options.rank = 8;
//!
//! let summary = run(&config, &mut std::io::stdout())?;
//! println!("best RMSE {:.5} at epoch {}", summary.best_rmse, summary.best_epoch);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Components
//!
//! ### Sparse Tensors ([`sparse`])
//!
//! Coordinate storage, the text tensor reader and mode-0 ownership layers.
//!
//! ```
//! use tenrso_tc::sparse::{read_tensor, MemorySource};
//!
//! let source = MemorySource::new("inline", "1 1 1 1.5\n2 3 1 2.0\n");
//! let tt = read_tensor(&source, None).unwrap();
//! assert_eq!(tt.dims(), &[2, 3, 1]);
//! ```
//!
//! ### Completion ([`completion`])
//!
//! The model, six training algorithms, distributed metrics, factor output
//! and the end-to-end driver.
//!
//! ### Command Line ([`cli`], [`logging`])
//!
//! `tenrso-complete <train> <validate> [test]`; see `--help` for the flags.

#![deny(warnings)]

pub mod cli;
pub mod logging;

pub use tenrso_completion as completion;
pub use tenrso_sparse as sparse;

pub mod prelude {
    //! Prelude module for convenient imports

    pub use crate::completion::prelude::*;
    pub use crate::sparse::{read_tensor, read_tensor_file, Layer, SparseTensor, TensorStats};
}
