//! Completion algorithm names and defaults

use crate::error::CompletionError;
use std::fmt;
use std::str::FromStr;

/// Optimization algorithm used to fit the factor matrices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Gradient descent with backtracking line search
    Gd,
    /// Nonlinear conjugate gradient (Polak-Ribiere+)
    Nlcg,
    /// Limited-memory BFGS
    Lbfgs,
    /// Stochastic gradient descent
    Sgd,
    /// Coordinate descent (CCD++)
    Ccd,
    /// Alternating least squares
    Als,
}

/// Accepted command-line names; `cg` is an alias of `nlcg`
const NAMES: &[(&str, Algorithm)] = &[
    ("gd", Algorithm::Gd),
    ("cg", Algorithm::Nlcg),
    ("nlcg", Algorithm::Nlcg),
    ("lbfgs", Algorithm::Lbfgs),
    ("sgd", Algorithm::Sgd),
    ("ccd", Algorithm::Ccd),
    ("als", Algorithm::Als),
];

impl Algorithm {
    pub const ALL: [Algorithm; 6] = [
        Algorithm::Gd,
        Algorithm::Nlcg,
        Algorithm::Lbfgs,
        Algorithm::Sgd,
        Algorithm::Ccd,
        Algorithm::Als,
    ];

    /// Find an algorithm by its exact (case-sensitive) name
    pub fn lookup(name: &str) -> Option<Algorithm> {
        NAMES
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|&(_, alg)| alg)
    }

    /// Canonical name
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Gd => "gd",
            Algorithm::Nlcg => "nlcg",
            Algorithm::Lbfgs => "lbfgs",
            Algorithm::Sgd => "sgd",
            Algorithm::Ccd => "ccd",
            Algorithm::Als => "als",
        }
    }

    /// Iteration cap used when none is given
    pub fn default_max_its(self) -> usize {
        match self {
            Algorithm::Gd | Algorithm::Nlcg | Algorithm::Lbfgs | Algorithm::Sgd => 500,
            Algorithm::Ccd | Algorithm::Als => 100,
        }
    }

    /// Whether the algorithm can run over more than one participant
    pub fn supports_distributed(self) -> bool {
        matches!(self, Algorithm::Sgd)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name().to_uppercase())
    }
}

impl FromStr for Algorithm {
    type Err = CompletionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::lookup(s).ok_or_else(|| CompletionError::UnknownAlgorithm(s.to_string()))
    }
}
