//! Consensus vector construction.
//!
//! One pass over the model at a point produces every consensus-vector
//! variant at once, together with the violation summary. All four variants
//! share the same per-column accumulators, so the cost per iteration stays
//! O(elements) no matter which variant a worker consumes.
//!
//! Variable bounds participate as pseudo-rows: a variable outside its
//! bounds by more than `alpha` contributes a feasibility vector with a
//! single component in its own column.

use crate::error::SolverError;
use crate::model::SparseModel;
use crate::settings::SolverSettings;
use crate::violation::{self, RowStatus};

/// The consensus-vector variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CvKind {
    /// Per-column mean of feasibility-vector components.
    Mean,
    /// `Mean` with the longest feasibility vector's components overlaid.
    MaxFv,
    /// Components weighted by violation magnitude.
    Weighted,
    /// Plain component sum, no averaging.
    Sum,
}

/// Violation summary returned by a build.
#[derive(Debug, Clone, Copy)]
pub struct ConsensusSummary {
    /// Sum of feasibility distances.
    pub sfd: f64,
    /// Sum of absolute violations.
    pub sinf: f64,
    /// Number of violated rows and bounds.
    pub ninf: usize,
}

/// Scratch-owning builder for the consensus vectors.
///
/// A worker creates one builder per trajectory and rebuilds it at each
/// iteration; the accumulators are reused across builds.
pub struct ConsensusBuilder<'a> {
    model: &'a SparseModel,
    settings: &'a SolverSettings,

    num_viol: Vec<usize>,
    sum_viol: Vec<f64>,
    sum_weighted: Vec<f64>,
    sum_weights: Vec<f64>,
    fv_longest: Vec<f64>,
    row_violated: Vec<bool>,

    cv_mean: Vec<f64>,
    cv_max_fv: Vec<f64>,
    cv_weighted: Vec<f64>,
    cv_sum: Vec<f64>,
    short: [bool; 4],
}

impl<'a> ConsensusBuilder<'a> {
    /// Create a builder with zeroed scratch.
    pub fn new(model: &'a SparseModel, settings: &'a SolverSettings) -> Self {
        let n = model.n_cols();
        Self {
            model,
            settings,
            num_viol: vec![0; n],
            sum_viol: vec![0.0; n],
            sum_weighted: vec![0.0; n],
            sum_weights: vec![0.0; n],
            fv_longest: vec![0.0; n],
            row_violated: vec![false; model.n_rows()],
            cv_mean: vec![0.0; n],
            cv_max_fv: vec![0.0; n],
            cv_weighted: vec![0.0; n],
            cv_sum: vec![0.0; n],
            short: [false; 4],
        }
    }

    /// Evaluate the point and rebuild every consensus vector.
    pub fn build(&mut self, x: &[f64]) -> Result<ConsensusSummary, SolverError> {
        if x.iter().any(|v| v.is_nan()) {
            return Err(SolverError::NanPoint);
        }

        let s = self.settings;
        let model = self.model;
        let n = model.n_cols();

        self.num_viol.fill(0);
        self.sum_viol.fill(0.0);
        self.sum_weighted.fill(0.0);
        self.sum_weights.fill(0.0);
        self.fv_longest.fill(0.0);
        self.row_violated.fill(false);

        let mut ninf = 0usize;
        let mut sfd = 0.0;
        let mut sinf = 0.0;
        let mut max_fv_len = -s.plinfy;

        for irow in 0..model.n_rows() {
            let violation = match violation::row_violation(model, irow, x, s.featol)? {
                RowStatus::Violated(v) => v,
                _ => continue,
            };
            let len_sq = violation::fv_len_sq(model, irow, violation);
            if len_sq < s.alpha * s.alpha {
                // Pull is numerically negligible; the row does not vote.
                continue;
            }
            let fv_len = len_sq.sqrt();
            self.row_violated[irow] = true;
            ninf += 1;
            sfd += fv_len;
            sinf += violation.abs();

            let new_longest = fv_len > max_fv_len;
            if new_longest {
                max_fv_len = fv_len;
                self.fv_longest.fill(0.0);
            }

            let row = &model.rows[irow];
            for &iel in &row.elements {
                let el = &model.elements[iel];
                let component = violation * el.value / row.grad_len_sq;
                self.num_viol[el.col] += 1;
                self.sum_viol[el.col] += component;
                self.sum_weighted[el.col] += component * violation.abs();
                self.sum_weights[el.col] += violation.abs();
                if new_longest {
                    self.fv_longest[el.col] = component;
                }
            }
        }

        for (j, col) in model.cols.iter().enumerate() {
            // A bound violation acts like a one-element row pointing back
            // inside the bound.
            let component = if col.bnd_lo - x[j] > s.alpha {
                col.bnd_lo - x[j]
            } else if x[j] - col.bnd_up > s.alpha {
                col.bnd_up - x[j]
            } else {
                continue;
            };
            let fv_len = component.abs();
            ninf += 1;
            sfd += fv_len;
            sinf += fv_len;
            self.num_viol[j] += 1;
            self.sum_viol[j] += component;
            self.sum_weighted[j] += component * fv_len;
            self.sum_weights[j] += fv_len;
            if fv_len > max_fv_len {
                max_fv_len = fv_len;
                self.fv_longest.fill(0.0);
                self.fv_longest[j] = component;
            }
        }

        if ninf == 0 {
            self.cv_mean.fill(0.0);
            self.cv_max_fv.fill(0.0);
            self.cv_weighted.fill(0.0);
            self.cv_sum.fill(0.0);
            self.short = [true; 4];
            return Ok(ConsensusSummary {
                sfd: 0.0,
                sinf: 0.0,
                ninf: 0,
            });
        }

        let mut len_sq = [0.0f64; 4];
        for j in 0..n {
            if self.num_viol[j] == 0 {
                self.cv_mean[j] = 0.0;
                self.cv_max_fv[j] = 0.0;
                self.cv_weighted[j] = 0.0;
                self.cv_sum[j] = 0.0;
                continue;
            }
            self.cv_mean[j] = self.sum_viol[j] / self.num_viol[j] as f64;
            self.cv_max_fv[j] = if self.fv_longest[j] != 0.0 {
                self.fv_longest[j]
            } else {
                self.cv_mean[j]
            };
            self.cv_weighted[j] = self.sum_weighted[j] / self.sum_weights[j];
            self.cv_sum[j] = self.sum_viol[j];

            len_sq[0] += self.cv_mean[j] * self.cv_mean[j];
            len_sq[1] += self.cv_max_fv[j] * self.cv_max_fv[j];
            len_sq[2] += self.cv_weighted[j] * self.cv_weighted[j];
            len_sq[3] += self.cv_sum[j] * self.cv_sum[j];
        }
        for (i, l) in len_sq.iter().enumerate() {
            self.short[i] = l.sqrt() < s.beta;
        }

        Ok(ConsensusSummary { sfd, sinf, ninf })
    }

    /// A consensus-vector variant from the last build.
    pub fn cv(&self, kind: CvKind) -> &[f64] {
        match kind {
            CvKind::Mean => &self.cv_mean,
            CvKind::MaxFv => &self.cv_max_fv,
            CvKind::Weighted => &self.cv_weighted,
            CvKind::Sum => &self.cv_sum,
        }
    }

    /// Whether a variant came out shorter than `beta`.
    pub fn is_short(&self, kind: CvKind) -> bool {
        match kind {
            CvKind::Mean => self.short[0],
            CvKind::MaxFv => self.short[1],
            CvKind::Weighted => self.short[2],
            CvKind::Sum => self.short[3],
        }
    }

    /// The longest feasibility vector from the last build (zero elsewhere).
    pub fn longest_fv(&self) -> &[f64] {
        &self.fv_longest
    }

    /// Per-column vote counts from the last build.
    pub fn votes(&self) -> &[usize] {
        &self.num_viol
    }

    /// Which rows were violated (and long enough to vote) at the last build.
    pub fn violated_rows(&self) -> &[bool] {
        &self.row_violated
    }
}
