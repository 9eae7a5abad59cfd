//! Parallel constraint consensus feasibility solver for sparse linear
//! systems.
//!
//! Given `m` linear row constraints (≤, ≥, =, or ranged) and `n` variables
//! with bounds, the solver searches for a point satisfying every
//! constraint and bound within a numerical tolerance. No objective is
//! optimized; feasibility is the goal.
//!
//! # Algorithm
//!
//! The core is the **constraint consensus** method run as a multi-start
//! swarm:
//!
//! - Each violated constraint proposes a *feasibility vector*, the
//!   minimum-norm correction onto its bounding hyperplane; the proposals
//!   are aggregated into a *consensus vector* (four variants: mean,
//!   longest-FV overlay, violation-weighted, raw sum).
//! - A **projector** extrapolates along the consensus direction, linearly
//!   and by a quadratic fit, chasing the point where the summed
//!   feasibility distance reaches zero.
//! - A **swarm controller** launches one trajectory per seed in parallel
//!   each round, keeps the best point ever seen as the incumbent, and
//!   contracts the sampling box around the promising returns with a
//!   Welford mean/variance sweep until a feasible point appears or the
//!   round budget runs out.
//!
//! # Example
//!
//! ```ignore
//! use consensus_core::{solve, SolverSettings, SparseModel};
//! use consensus_core::model::{ColSpec, RowKind, RowSpec, PLINFY};
//! use consensus_core::sparse;
//!
//! // x1 + x2 >= 4 over [0, 10]^2
//! let a = sparse::from_triplets(1, 2, vec![(0, 0, 1.0), (0, 1, 1.0)]);
//! let model = SparseModel::from_csc(
//!     "demo",
//!     vec![RowSpec { name: "r1".into(), kind: RowKind::Greater, rhs_lo: 4.0, rhs_up: PLINFY }],
//!     vec![
//!         ColSpec { name: "x1".into(), integer: false, bnd_lo: 0.0, bnd_up: 10.0 },
//!         ColSpec { name: "x2".into(), integer: false, bnd_lo: 0.0, bnd_up: 10.0 },
//!     ],
//!     &a,
//!     1e-6,
//! )?;
//!
//! let report = solve(&model, &SolverSettings::default());
//! println!("status: {}", report.status);
//! println!("x = {:?}", report.x);
//! ```

#![warn(clippy::all)]
#![allow(missing_docs)]

pub mod consensus;
pub mod error;
pub mod impact;
pub mod incumbent;
pub mod model;
pub mod project;
pub mod sampling;
pub mod settings;
pub mod sparse;
pub mod swarm;
pub mod violation;
pub mod worker;

pub use error::SolverError;
pub use incumbent::IncumbentOrder;
pub use model::{ModelError, SparseModel};
pub use settings::SolverSettings;
pub use swarm::{SolveReport, SolveStats, SolveStatus};

/// Main solve entry point.
///
/// Runs the swarm controller over the model and returns the final point
/// with diagnostics. Numerical faults inside trajectories are recovered
/// locally; the only unsuccessful outcome is an exhausted round budget,
/// reported in `SolveReport::status`.
pub fn solve(model: &SparseModel, settings: &SolverSettings) -> SolveReport {
    swarm::solve(model, settings)
}
