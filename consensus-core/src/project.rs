//! Projection along an update vector.
//!
//! Given a base point and an update vector (usually the consensus vector),
//! look past the updated point for a better one. Four points matter:
//!
//! - `Pt0`: the base point
//! - `Pt1`: `Pt0 + v`
//! - `Pt2`: linear extrapolation from `Pt0` through `Pt1`, scaled so the
//!   SFD gradient along `v` reaches zero
//! - `Pt3`: the minimum of a quadratic fitted through the SFD values at
//!   `Pt0`, `Pt1`, `Pt2`
//!
//! Numerical trouble anywhere degrades gracefully: the projection reports
//! no progress or falls back to the best evaluated candidate, it never
//! aborts the trajectory.

use crate::error::SolverError;
use crate::model::SparseModel;
use crate::settings::SolverSettings;
use crate::violation::point_stats;

/// Outcome of a projection attempt.
#[derive(Debug, Clone)]
pub enum Projection {
    /// A feasible point was found.
    Feasible(Vec<f64>),
    /// A point strictly better than the base point.
    Improved(Vec<f64>),
    /// The update vector does not decrease the SFD.
    NoProgress,
}

/// Success/failure counters for the two extrapolation stages.
#[derive(Debug, Clone, Default)]
pub struct ProjectionStats {
    /// Linear extrapolations that improved on `Pt1`.
    pub lin_succeeds: u64,
    /// Linear extrapolations that did not.
    pub lin_fails: u64,
    /// Accumulated fractional improvement of successful linear steps.
    pub lin_frac: f64,
    /// Quadratic fits that improved on the linear stage.
    pub quad_succeeds: u64,
    /// Quadratic fits that did not.
    pub quad_fails: u64,
    /// Accumulated fractional improvement of successful quadratic steps.
    pub quad_frac: f64,
}

impl ProjectionStats {
    /// Fold another counter set into this one.
    pub fn merge(&mut self, other: &ProjectionStats) {
        self.lin_succeeds += other.lin_succeeds;
        self.lin_fails += other.lin_fails;
        self.lin_frac += other.lin_frac;
        self.quad_succeeds += other.quad_succeeds;
        self.quad_fails += other.quad_fails;
        self.quad_frac += other.quad_frac;
    }

    /// Mean fractional improvement of successful linear steps.
    pub fn avg_lin_improvement(&self) -> f64 {
        if self.lin_succeeds == 0 {
            0.0
        } else {
            self.lin_frac / self.lin_succeeds as f64
        }
    }

    /// Mean fractional improvement of successful quadratic steps.
    pub fn avg_quad_improvement(&self) -> f64 {
        if self.quad_succeeds == 0 {
            0.0
        } else {
            self.quad_frac / self.quad_succeeds as f64
        }
    }
}

/// Project from `p0` along `v`.
///
/// The returned point never has a larger SFD than the better of `p0` and
/// `Pt1`; `NoProgress` is returned when `Pt1` fails to improve on `p0`.
pub fn project(
    model: &SparseModel,
    s: &SolverSettings,
    p0: &[f64],
    v: &[f64],
    stats: &mut ProjectionStats,
) -> Result<Projection, SolverError> {
    let st0 = point_stats(model, p0, s)?;
    if st0.is_feasible() {
        return Ok(Projection::Feasible(p0.to_vec()));
    }

    let mut p1 = vec![0.0; p0.len()];
    let mut v_len_sq = 0.0;
    for j in 0..p0.len() {
        p1[j] = p0[j] + v[j];
        v_len_sq += v[j] * v[j];
    }
    let st1 = point_stats(model, &p1, s)?;
    if st1.is_feasible() {
        return Ok(Projection::Feasible(p1));
    }
    if st1.sfd >= st0.sfd {
        return Ok(Projection::NoProgress);
    }

    // The update improved; see how far the improvement extrapolates.
    let delta = st0.sfd - st1.sfd;
    if delta < s.featol {
        return Ok(Projection::Improved(p1));
    }
    let v_len = v_len_sq.sqrt();
    if v_len < s.featol {
        return Ok(Projection::Improved(p1));
    }
    let grad = delta / v_len;
    if grad < s.featol {
        return Ok(Projection::Improved(p1));
    }

    // Linear stage: step to where the SFD gradient reaches zero.
    let project_len = st0.sfd / grad;
    let p2: Vec<f64> = (0..p0.len())
        .map(|j| p0[j] + project_len * v[j] / v_len)
        .collect();
    let st2 = match point_stats(model, &p2, s) {
        Ok(st) => st,
        Err(_) => {
            stats.lin_fails += 1;
            return Ok(Projection::Improved(p1));
        }
    };
    if st2.is_feasible() {
        stats.lin_succeeds += 1;
        stats.lin_frac += 1.0;
        return Ok(Projection::Feasible(p2));
    }
    let mut best_is_p2 = false;
    if st2.sfd < st1.sfd {
        stats.lin_succeeds += 1;
        stats.lin_frac += 1.0 - st2.sfd / st1.sfd;
        best_is_p2 = true;
    } else {
        stats.lin_fails += 1;
    }

    // Quadratic stage.
    let p3 = match quad_min(p0, &p1, &p2, st0.sfd, st1.sfd, st2.sfd, s.featol) {
        Some(p3) => p3,
        None => {
            stats.quad_fails += 1;
            return Ok(Projection::Improved(if best_is_p2 { p2 } else { p1 }));
        }
    };
    let st3 = match point_stats(model, &p3, s) {
        Ok(st) => st,
        Err(_) => {
            stats.quad_fails += 1;
            return Ok(Projection::Improved(if best_is_p2 { p2 } else { p1 }));
        }
    };
    if st3.is_feasible() {
        stats.quad_succeeds += 1;
        stats.quad_frac += 1.0;
        return Ok(Projection::Feasible(p3));
    }
    let reference = st1.sfd.min(st2.sfd);
    if st3.sfd < reference {
        stats.quad_succeeds += 1;
        stats.quad_frac += 1.0 - st3.sfd / reference;
        return Ok(Projection::Improved(p3));
    }
    stats.quad_fails += 1;
    Ok(Projection::Improved(if best_is_p2 { p2 } else { p1 }))
}

/// Minimum of the quadratic through three collinear points.
///
/// Distance along the line is the scalar axis: `X0 = 0` at `p0`, `X1 = 1`
/// at `p1`, and `X2` is measured in the same units. Returns `None` when the
/// fitted curvature is below `featol` (flat or concave fit) or the minimum
/// is not finite.
pub(crate) fn quad_min(
    p0: &[f64],
    p1: &[f64],
    p2: &[f64],
    y0: f64,
    y1: f64,
    y2: f64,
    featol: f64,
) -> Option<Vec<f64>> {
    let mut d1_sq = 0.0;
    let mut d2_sq = 0.0;
    for j in 0..p0.len() {
        let v1 = p1[j] - p0[j];
        let v2 = p2[j] - p0[j];
        d1_sq += v1 * v1;
        d2_sq += v2 * v2;
    }
    let d1 = d1_sq.sqrt();
    if d1 == 0.0 {
        return None;
    }
    let x0 = 0.0;
    let x1 = 1.0;
    let x2 = d2_sq.sqrt() / d1;

    // Second-derivative numerator of the Lagrange fit; its sign and size
    // gate whether a minimum exists at all.
    let a = (2.0 * y0) / ((x0 - x1) * (x0 - x2))
        + (2.0 * y1) / ((x1 - x0) * (x1 - x2))
        + (2.0 * y2) / ((x2 - x0) * (x2 - x1));
    if !(a >= featol) {
        return None;
    }
    let b = (y0 * (x2 + x1)) / ((x0 - x1) * (x0 - x2))
        + (y1 * (x2 + x0)) / ((x1 - x0) * (x1 - x2))
        + (y2 * (x1 + x0)) / ((x2 - x0) * (x2 - x1));
    let x_min = b / a;
    if !x_min.is_finite() {
        return None;
    }

    Some(
        (0..p0.len())
            .map(|j| p0[j] + x_min * (p1[j] - p0[j]))
            .collect(),
    )
}
