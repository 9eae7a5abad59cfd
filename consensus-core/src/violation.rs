//! Violation evaluation.
//!
//! Classifies a row at a point, measures the signed violation, and
//! aggregates feasibility distances over the whole model. The signed
//! violation is `rhs_lo − body` when the body falls below the lower
//! right-hand side (positive) and `rhs_up − body` when it exceeds the upper
//! one (negative), so `violation · aᵢⱼ / grad_len_sq` is always the
//! feasibility-vector component that moves the point toward the row.

use crate::error::SolverError;
use crate::model::{RowKind, SparseModel};
use crate::settings::SolverSettings;

/// Classification of one row at a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowStatus {
    /// Free row: never binding.
    NonBinding,
    /// Satisfied with slack beyond the tolerance band.
    Satisfied,
    /// Within `featol` of a bounding right-hand side.
    Tight,
    /// Violated, with the signed violation.
    Violated(f64),
}

/// Evaluate one row at a point.
pub fn row_violation(
    model: &SparseModel,
    irow: usize,
    x: &[f64],
    featol: f64,
) -> Result<RowStatus, SolverError> {
    let row = &model.rows[irow];
    if row.kind == RowKind::Free {
        return Ok(RowStatus::NonBinding);
    }

    let mut body = 0.0;
    for &iel in &row.elements {
        let el = &model.elements[iel];
        body += el.value * x[el.col];
    }
    if body.is_nan() {
        return Err(SolverError::NanBody { row: irow });
    }

    let status = match row.kind {
        RowKind::Greater => {
            if body < row.rhs_lo - featol {
                RowStatus::Violated(row.rhs_lo - body)
            } else if body - row.rhs_lo <= featol {
                RowStatus::Tight
            } else {
                RowStatus::Satisfied
            }
        }
        RowKind::Less => {
            if body > row.rhs_up + featol {
                RowStatus::Violated(row.rhs_up - body)
            } else if row.rhs_up - body <= featol {
                RowStatus::Tight
            } else {
                RowStatus::Satisfied
            }
        }
        RowKind::Equal | RowKind::Range => {
            if body < row.rhs_lo - featol {
                RowStatus::Violated(row.rhs_lo - body)
            } else if body > row.rhs_up + featol {
                RowStatus::Violated(row.rhs_up - body)
            } else if row.kind == RowKind::Equal
                || (body - row.rhs_lo).abs() <= featol
                || (row.rhs_up - body).abs() <= featol
            {
                // An equality inside its band is tight by definition; a
                // range is tight only against one of its sides.
                RowStatus::Tight
            } else {
                RowStatus::Satisfied
            }
        }
        RowKind::Free => unreachable!(),
    };
    Ok(status)
}

/// Squared length of the feasibility vector for a violated row.
pub(crate) fn fv_len_sq(model: &SparseModel, irow: usize, violation: f64) -> f64 {
    let row = &model.rows[irow];
    let mut acc = 0.0;
    for &iel in &row.elements {
        let c = violation * model.elements[iel].value / row.grad_len_sq;
        acc += c * c;
    }
    acc
}

/// Aggregate feasibility distances of a point.
#[derive(Debug, Clone)]
pub struct PointStats {
    /// Sum of feasibility distances over violated rows and bounds.
    pub sfd: f64,
    /// Number of violated rows plus bound violations.
    pub ninf: usize,
    /// Longest single feasibility distance.
    pub max_fd: f64,
    /// Row carrying `max_fd`, when it comes from a row.
    pub max_fd_row: Option<usize>,
    /// Column carrying `max_fd`, when it comes from a bound.
    pub max_fd_col: Option<usize>,
}

impl PointStats {
    /// Whether the point satisfies everything within tolerance.
    pub fn is_feasible(&self) -> bool {
        self.ninf == 0
    }
}

/// Sum of feasibility distances at a point.
///
/// A violated row whose feasibility vector is shorter than `alpha` does not
/// count; bound violations beyond `alpha` contribute their excess directly.
pub fn point_stats(
    model: &SparseModel,
    x: &[f64],
    s: &SolverSettings,
) -> Result<PointStats, SolverError> {
    if x.iter().any(|v| v.is_nan()) {
        return Err(SolverError::NanPoint);
    }

    let mut st = PointStats {
        sfd: 0.0,
        ninf: 0,
        max_fd: 0.0,
        max_fd_row: None,
        max_fd_col: None,
    };

    for irow in 0..model.n_rows() {
        let violation = match row_violation(model, irow, x, s.featol)? {
            RowStatus::Violated(v) => v,
            _ => continue,
        };
        let len_sq = fv_len_sq(model, irow, violation);
        if len_sq < s.alpha * s.alpha {
            continue;
        }
        let len = len_sq.sqrt();
        st.sfd += len;
        st.ninf += 1;
        if len > st.max_fd {
            st.max_fd = len;
            st.max_fd_row = Some(irow);
            st.max_fd_col = None;
        }
    }

    for (j, col) in model.cols.iter().enumerate() {
        let excess = if col.bnd_lo - x[j] > s.alpha {
            col.bnd_lo - x[j]
        } else if x[j] - col.bnd_up > s.alpha {
            x[j] - col.bnd_up
        } else {
            continue;
        };
        st.sfd += excess;
        st.ninf += 1;
        if excess > st.max_fd {
            st.max_fd = excess;
            st.max_fd_row = None;
            st.max_fd_col = Some(j);
        }
    }

    if st.ninf == 0 {
        st.sfd = 0.0;
        st.max_fd = 0.0;
    }
    Ok(st)
}

/// Classical LHS−RHS assessment of a point, for reporting.
#[derive(Debug, Clone, Default)]
pub struct PointAssessment {
    /// Violated constraints plus bounds.
    pub ninf: usize,
    /// Satisfied constraints plus bounds.
    pub num_sat: usize,
    /// Tight constraints plus bounds (subset of satisfied).
    pub num_tight: usize,
    /// Sum of absolute violations.
    pub sinf: f64,
    /// Largest single violation.
    pub max_viol: f64,
    /// Mean violation over the violated set.
    pub avg_viol: f64,
}

/// Assess a point the way a classical solver would: by absolute LHS−RHS
/// and bound differences against `featol`, with no `alpha` filtering.
pub fn assess_point(
    model: &SparseModel,
    x: &[f64],
    s: &SolverSettings,
) -> Result<PointAssessment, SolverError> {
    let mut a = PointAssessment::default();

    for irow in 0..model.n_rows() {
        match row_violation(model, irow, x, s.featol)? {
            RowStatus::NonBinding => {}
            RowStatus::Satisfied => a.num_sat += 1,
            RowStatus::Tight => {
                a.num_sat += 1;
                a.num_tight += 1;
            }
            RowStatus::Violated(v) => {
                let v = v.abs();
                a.ninf += 1;
                a.sinf += v;
                a.max_viol = a.max_viol.max(v);
            }
        }
    }

    for (j, col) in model.cols.iter().enumerate() {
        if col.bnd_lo > -s.plinfy {
            if x[j] >= col.bnd_lo - s.featol {
                a.num_sat += 1;
                if x[j] <= col.bnd_lo + s.featol {
                    a.num_tight += 1;
                }
            } else {
                let v = col.bnd_lo - x[j];
                a.ninf += 1;
                a.sinf += v;
                a.max_viol = a.max_viol.max(v);
            }
        }
        if col.bnd_up < s.plinfy {
            if x[j] <= col.bnd_up + s.featol {
                a.num_sat += 1;
                if x[j] >= col.bnd_up - s.featol {
                    a.num_tight += 1;
                }
            } else {
                let v = x[j] - col.bnd_up;
                a.ninf += 1;
                a.sinf += v;
                a.max_viol = a.max_viol.max(v);
            }
        }
    }

    if a.ninf > 0 {
        a.avg_viol = a.sinf / a.ninf as f64;
    }
    Ok(a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColSpec, RowSpec, SparseModel, PLINFY};
    use crate::sparse;

    fn two_var_model(kind: RowKind, lo: f64, up: f64) -> SparseModel {
        let a = sparse::from_triplets(1, 2, vec![(0, 0, 2.0), (0, 1, 1.0)]);
        SparseModel::from_csc(
            "t",
            vec![RowSpec {
                name: "r".into(),
                kind,
                rhs_lo: lo,
                rhs_up: up,
            }],
            vec![
                ColSpec {
                    name: "x1".into(),
                    integer: false,
                    bnd_lo: 0.0,
                    bnd_up: 10.0,
                },
                ColSpec {
                    name: "x2".into(),
                    integer: false,
                    bnd_lo: 0.0,
                    bnd_up: 10.0,
                },
            ],
            &a,
            1e-6,
        )
        .unwrap()
    }

    #[test]
    fn test_greater_row_classification() {
        let model = two_var_model(RowKind::Greater, 4.0, PLINFY);
        // body = 0 at the origin: violated by 4
        match row_violation(&model, 0, &[0.0, 0.0], 1e-6).unwrap() {
            RowStatus::Violated(v) => assert!((v - 4.0).abs() < 1e-12),
            other => panic!("expected violation, got {:?}", other),
        }
        // body = 4 exactly: tight
        assert_eq!(
            row_violation(&model, 0, &[1.5, 1.0], 1e-6).unwrap(),
            RowStatus::Tight
        );
        // body = 6: satisfied
        assert_eq!(
            row_violation(&model, 0, &[2.5, 1.0], 1e-6).unwrap(),
            RowStatus::Satisfied
        );
    }

    #[test]
    fn test_less_row_negative_violation() {
        let model = two_var_model(RowKind::Less, -PLINFY, 3.0);
        match row_violation(&model, 0, &[2.0, 1.0], 1e-6).unwrap() {
            RowStatus::Violated(v) => assert!((v + 2.0).abs() < 1e-12), // 3 - 5
            other => panic!("expected violation, got {:?}", other),
        }
    }

    #[test]
    fn test_range_tight_at_either_side() {
        let model = two_var_model(RowKind::Range, 2.0, 6.0);
        assert_eq!(
            row_violation(&model, 0, &[1.0, 0.0], 1e-6).unwrap(),
            RowStatus::Tight
        );
        assert_eq!(
            row_violation(&model, 0, &[3.0, 0.0], 1e-6).unwrap(),
            RowStatus::Tight
        );
        assert_eq!(
            row_violation(&model, 0, &[2.0, 0.0], 1e-6).unwrap(),
            RowStatus::Satisfied
        );
    }

    #[test]
    fn test_nan_body_is_error() {
        let model = two_var_model(RowKind::Greater, 4.0, PLINFY);
        assert!(row_violation(&model, 0, &[f64::NAN, 0.0], 1e-6).is_err());
    }

    #[test]
    fn test_point_stats_sfd_is_normalized_distance() {
        let model = two_var_model(RowKind::Greater, 4.0, PLINFY);
        let s = SolverSettings::default();
        let st = point_stats(&model, &[0.0, 0.0], &s).unwrap();
        assert_eq!(st.ninf, 1);
        // Distance to the hyperplane 2x1 + x2 = 4 from the origin: 4/sqrt(5)
        assert!((st.sfd - 4.0 / 5.0f64.sqrt()).abs() < 1e-12);
        assert_eq!(st.max_fd_row, Some(0));
    }

    #[test]
    fn test_point_stats_counts_bound_excess() {
        let model = two_var_model(RowKind::Greater, 4.0, PLINFY);
        let s = SolverSettings::default();
        let st = point_stats(&model, &[12.0, -3.0], &s).unwrap();
        // Row satisfied (body = 21), x1 over by 2, x2 under by 3.
        assert_eq!(st.ninf, 2);
        assert!((st.sfd - 5.0).abs() < 1e-12);
        assert_eq!(st.max_fd_col, Some(1));
    }

    #[test]
    fn test_bound_at_featol_is_tight_not_violated() {
        let model = two_var_model(RowKind::Greater, 4.0, PLINFY);
        let s = SolverSettings::default();
        let x = [s.featol, 4.0];
        let a = assess_point(&model, &x, &s).unwrap();
        assert_eq!(a.ninf, 0);
        assert!(a.num_tight >= 1);
    }

    #[test]
    fn test_feasible_iff_zero_sfd() {
        let model = two_var_model(RowKind::Greater, 4.0, PLINFY);
        let s = SolverSettings::default();
        let st = point_stats(&model, &[3.0, 2.0], &s).unwrap();
        assert!(st.is_feasible());
        assert_eq!(st.sfd, 0.0);
    }
}
