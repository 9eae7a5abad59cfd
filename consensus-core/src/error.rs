//! Error types for the feasibility solver.

use thiserror::Error;

/// Numerical faults inside a trajectory or projection.
///
/// These never cross the public `solve` boundary: a worker that hits one
/// aborts its own trajectory with the best point it has seen and the
/// controller carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    /// A constraint body summed to NaN.
    #[error("constraint {row} body evaluated to NaN")]
    NanBody {
        /// Index of the offending row.
        row: usize,
    },

    /// A candidate point contains NaN components.
    #[error("point contains NaN components")]
    NanPoint,
}
