//! Equilibration scaling.
//!
//! Iteratively scales rows and columns of the parsed problem toward unit
//! maximum magnitude, which evens out wildly different coefficient ranges
//! before the solver sees them. Right-hand sides and variable bounds are
//! scaled consistently, and the returned factors unscale the solution
//! point. Infinity sentinels are never scaled.

use consensus_core::model::RowKind;

use crate::mps::MpsProblem;

/// Accumulated row/column scale factors.
#[derive(Debug, Clone)]
pub struct Equilibration {
    /// Per-row factors applied to the matrix and RHS.
    pub row_scale: Vec<f64>,
    /// Per-column factors applied to the matrix; bounds are divided by
    /// them and the solution is multiplied back.
    pub col_scale: Vec<f64>,
}

impl Equilibration {
    /// Identity scaling.
    pub fn identity(n_rows: usize, n_cols: usize) -> Self {
        Equilibration {
            row_scale: vec![1.0; n_rows],
            col_scale: vec![1.0; n_cols],
        }
    }

    /// Map a point of the scaled problem back to original coordinates.
    pub fn unscale_point(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(&self.col_scale)
            .map(|(&xi, &cj)| cj * xi)
            .collect()
    }
}

/// Equilibrate the problem in place over `iters` sweeps.
///
/// Each sweep divides every row by the square root of its largest
/// magnitude, then every column likewise. A handful of sweeps settles the
/// magnitudes; ten matches common practice.
pub fn equilibrate(problem: &mut MpsProblem, plinfy: f64, iters: usize) -> Equilibration {
    let n_rows = problem.rows.len();
    let n_cols = problem.cols.len();
    let mut eq = Equilibration::identity(n_rows, n_cols);

    for _ in 0..iters {
        let mut row_max = vec![0.0f64; n_rows];
        let mut col_max = vec![0.0f64; n_cols];
        for &(i, j, v) in &problem.triplets {
            row_max[i] = row_max[i].max(v.abs());
            col_max[j] = col_max[j].max(v.abs());
        }

        let d_r: Vec<f64> = row_max
            .iter()
            .map(|&m| if m > 0.0 { 1.0 / m.sqrt() } else { 1.0 })
            .collect();
        let d_c: Vec<f64> = col_max
            .iter()
            .map(|&m| if m > 0.0 { 1.0 / m.sqrt() } else { 1.0 })
            .collect();

        for t in problem.triplets.iter_mut() {
            t.2 *= d_r[t.0] * d_c[t.1];
        }
        for i in 0..n_rows {
            eq.row_scale[i] *= d_r[i];
        }
        for j in 0..n_cols {
            eq.col_scale[j] *= d_c[j];
        }
    }

    // Scale the right-hand sides with their rows.
    for (i, row) in problem.rows.iter_mut().enumerate() {
        if row.kind == RowKind::Free {
            continue;
        }
        if row.rhs_lo > -plinfy {
            row.rhs_lo *= eq.row_scale[i];
        }
        if row.rhs_up < plinfy {
            row.rhs_up *= eq.row_scale[i];
        }
    }

    // Bounds move opposite to the matrix columns: x' = x / c.
    for (j, col) in problem.cols.iter_mut().enumerate() {
        if col.bnd_lo > -plinfy {
            col.bnd_lo /= eq.col_scale[j];
        }
        if col.bnd_up < plinfy {
            col.bnd_up /= eq.col_scale[j];
        }
    }

    eq
}
