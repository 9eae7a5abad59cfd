//! Constraint consensus trajectory workers.
//!
//! A worker owns one starting point and iterates the consensus/projection
//! loop until it exits feasible, runs out of iterations, or hits a
//! numerical fault. It owns all its scratch and returns exactly one
//! result; the controller is the only writer of shared state.

use crate::consensus::{ConsensusBuilder, CvKind};
use crate::model::SparseModel;
use crate::project::{self, Projection, ProjectionStats};
use crate::settings::SolverSettings;
use crate::violation::{self, RowStatus};

/// Trajectory flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    /// One consensus step, no projection, no fallback. Cheap fleet probe.
    Simple,
    /// Full state machine with a primary CV variant and the longest-FV
    /// overlay as fallback.
    Standard {
        /// Primary consensus-vector variant.
        primary: CvKind,
    },
    /// Like `Standard`, but the fallback overlays the feasibility vector
    /// of the highest-vote-impact violated row.
    Impact,
    /// Sequential Kaczmarz-style sweeps over rows in impact order.
    SeqImpact,
}

impl WorkerKind {
    /// Variant assignment by point id.
    ///
    /// The low ids (the special seeds) get one deep trajectory per primary
    /// CV variant plus the two impact flavours; the remaining
    /// Latin-hypercube seeds alternate between deep mean-CV trajectories
    /// and cheap single-step probes.
    pub fn for_point(point_id: usize) -> WorkerKind {
        match point_id {
            0 => WorkerKind::Standard {
                primary: CvKind::Mean,
            },
            1 => WorkerKind::Standard {
                primary: CvKind::MaxFv,
            },
            2 => WorkerKind::Standard {
                primary: CvKind::Weighted,
            },
            3 => WorkerKind::Standard {
                primary: CvKind::Sum,
            },
            4 => WorkerKind::Impact,
            5 => WorkerKind::SeqImpact,
            i if i % 2 == 0 => WorkerKind::Standard {
                primary: CvKind::Mean,
            },
            _ => WorkerKind::Simple,
        }
    }
}

/// What a worker hands back to the controller.
#[derive(Debug, Clone)]
pub struct WorkerResult {
    /// Best point this trajectory produced.
    pub point: Vec<f64>,
    /// SFD at that point (`f64::INFINITY` if nothing was evaluated).
    pub sfd: f64,
    /// NINF at that point.
    pub ninf: usize,
    /// Whether the point is feasible.
    pub feasible: bool,
    /// Seed id this trajectory started from.
    pub point_id: usize,
    /// Consensus iterations performed.
    pub iterations: usize,
    /// Projection counters accumulated along the trajectory.
    pub projection: ProjectionStats,
}

/// Run one trajectory from `seed`.
pub fn run(
    model: &SparseModel,
    settings: &SolverSettings,
    impact_order: &[usize],
    seed: &[f64],
    kind: WorkerKind,
    point_id: usize,
) -> WorkerResult {
    match kind {
        WorkerKind::Simple => run_simple(model, settings, seed, point_id),
        WorkerKind::Standard { primary } => {
            run_consensus(model, settings, seed, point_id, primary, Fallback::LongestFv)
        }
        WorkerKind::Impact => run_consensus(
            model,
            settings,
            seed,
            point_id,
            CvKind::Mean,
            Fallback::ImpactRow,
        ),
        WorkerKind::SeqImpact => run_seq_impact(model, settings, impact_order, seed, point_id),
    }
}

/// Fallback vector used when the primary CV stalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallback {
    LongestFv,
    ImpactRow,
}

struct Best {
    point: Vec<f64>,
    sfd: f64,
    ninf: usize,
}

impl Best {
    fn new(seed: &[f64]) -> Self {
        Best {
            point: seed.to_vec(),
            sfd: f64::INFINITY,
            ninf: usize::MAX,
        }
    }

    fn offer(&mut self, point: &[f64], sfd: f64, ninf: usize) {
        if sfd < self.sfd {
            self.point.copy_from_slice(point);
            self.sfd = sfd;
            self.ninf = ninf;
        }
    }

    fn into_result(self, point_id: usize, iterations: usize, projection: ProjectionStats) -> WorkerResult {
        WorkerResult {
            feasible: self.ninf == 0,
            point: self.point,
            sfd: self.sfd,
            ninf: self.ninf,
            point_id,
            iterations,
            projection,
        }
    }
}

fn feasible_result(
    point: Vec<f64>,
    point_id: usize,
    iterations: usize,
    projection: ProjectionStats,
) -> WorkerResult {
    log::info!(
        "trajectory {} feasible after {} iterations",
        point_id,
        iterations
    );
    WorkerResult {
        point,
        sfd: 0.0,
        ninf: 0,
        feasible: true,
        point_id,
        iterations,
        projection,
    }
}

/// Full consensus state machine shared by `Standard` and `Impact`.
fn run_consensus(
    model: &SparseModel,
    settings: &SolverSettings,
    seed: &[f64],
    point_id: usize,
    primary: CvKind,
    fallback: Fallback,
) -> WorkerResult {
    let mut builder = ConsensusBuilder::new(model, settings);
    let mut x = seed.to_vec();
    let mut best = Best::new(seed);
    let mut proj_stats = ProjectionStats::default();
    let mut prev_cv_len = 0.0;

    for itn in 0..settings.max_itns {
        let summary = match builder.build(&x) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("trajectory {} aborted at iteration {}: {}", point_id, itn, e);
                return best.into_result(point_id, itn, proj_stats);
            }
        };
        if summary.ninf == 0 {
            return feasible_result(x, point_id, itn, proj_stats);
        }
        best.offer(&x, summary.sfd, summary.ninf);

        let mut cv = builder.cv(primary).to_vec();
        let cv_short = builder.is_short(primary);

        if settings.use_projection {
            match project::project(model, settings, &x, &cv, &mut proj_stats) {
                Ok(Projection::Feasible(p)) => {
                    return feasible_result(p, point_id, itn, proj_stats);
                }
                Ok(Projection::Improved(p)) => {
                    // Adopt the projected point and re-evaluate from there.
                    x = p;
                    prev_cv_len = norm(&cv);
                    continue;
                }
                Ok(Projection::NoProgress) => {}
                Err(e) => {
                    log::warn!("trajectory {} aborted at iteration {}: {}", point_id, itn, e);
                    return best.into_result(point_id, itn, proj_stats);
                }
            }
        }

        // Projection refused (or is off): step by the consensus vector,
        // substituting the fallback when the primary has stalled.
        let mut cv_len = norm(&cv);
        if itn > 0 && (cv_short || cv_len / prev_cv_len > 1.0) {
            match fallback {
                Fallback::LongestFv => {
                    cv.copy_from_slice(builder.cv(CvKind::MaxFv));
                }
                Fallback::ImpactRow => {
                    overlay_impact_row(model, settings, &builder, &x, &mut cv);
                }
            }
            cv_len = norm(&cv);
        }
        for j in 0..x.len() {
            x[j] += cv[j];
        }
        prev_cv_len = cv_len;
    }

    best.into_result(point_id, settings.max_itns, proj_stats)
}

/// Overlay the feasibility vector of the violated row with the most votes
/// across its columns.
fn overlay_impact_row(
    model: &SparseModel,
    settings: &SolverSettings,
    builder: &ConsensusBuilder<'_>,
    x: &[f64],
    cv: &mut [f64],
) {
    let votes = builder.votes();
    let mut impact_row: Option<usize> = None;
    let mut best_score = 0usize;
    for (irow, &violated) in builder.violated_rows().iter().enumerate() {
        if !violated {
            continue;
        }
        let score: usize = model.rows[irow]
            .elements
            .iter()
            .map(|&iel| votes[model.elements[iel].col])
            .sum();
        if impact_row.is_none() || score > best_score {
            best_score = score;
            impact_row = Some(irow);
        }
    }
    let Some(irow) = impact_row else {
        return;
    };
    let violation = match violation::row_violation(model, irow, x, settings.featol) {
        Ok(RowStatus::Violated(v)) => v,
        _ => return,
    };
    let row = &model.rows[irow];
    for &iel in &row.elements {
        let el = &model.elements[iel];
        cv[el.col] = violation * el.value / row.grad_len_sq;
    }
}

/// Single consensus step, re-evaluated so the reported SFD/NINF describe
/// the returned point.
fn run_simple(
    model: &SparseModel,
    settings: &SolverSettings,
    seed: &[f64],
    point_id: usize,
) -> WorkerResult {
    let mut builder = ConsensusBuilder::new(model, settings);
    let mut x = seed.to_vec();
    let mut best = Best::new(seed);

    let summary = match builder.build(&x) {
        Ok(s) => s,
        Err(e) => {
            log::warn!("trajectory {} aborted at iteration 0: {}", point_id, e);
            return best.into_result(point_id, 0, ProjectionStats::default());
        }
    };
    if summary.ninf == 0 {
        return feasible_result(x, point_id, 0, ProjectionStats::default());
    }
    best.offer(&x, summary.sfd, summary.ninf);

    let cv = builder.cv(CvKind::Mean);
    for j in 0..x.len() {
        x[j] += cv[j];
    }

    match builder.build(&x) {
        Ok(after) => {
            if after.ninf == 0 {
                return feasible_result(x, point_id, 1, ProjectionStats::default());
            }
            best.offer(&x, after.sfd, after.ninf);
        }
        Err(e) => {
            log::warn!("trajectory {} aborted at iteration 1: {}", point_id, e);
        }
    }
    best.into_result(point_id, 1, ProjectionStats::default())
}

/// Sequential impact-ordered sweeps: snap bound violations onto their
/// nearest bound, then apply each violated row's feasibility vector
/// directly, most-coupled rows first.
fn run_seq_impact(
    model: &SparseModel,
    settings: &SolverSettings,
    impact_order: &[usize],
    seed: &[f64],
    point_id: usize,
) -> WorkerResult {
    let mut x = seed.to_vec();
    let mut best = Best::new(seed);

    for itn in 0..settings.max_itns {
        let mut ninf = 0usize;
        let mut sfd = 0.0;

        for (j, col) in model.cols.iter().enumerate() {
            let below = col.bnd_lo - x[j];
            if below > settings.featol {
                x[j] = col.bnd_lo;
                ninf += 1;
                sfd += below;
                continue;
            }
            let above = x[j] - col.bnd_up;
            if above > settings.featol {
                x[j] = col.bnd_up;
                ninf += 1;
                sfd += above;
            }
        }

        for &irow in impact_order {
            let violation =
                match violation::row_violation(model, irow, &x, settings.featol) {
                    Ok(RowStatus::Violated(v)) => v,
                    Ok(_) => continue,
                    Err(e) => {
                        log::warn!(
                            "trajectory {} aborted at iteration {}: {}",
                            point_id,
                            itn,
                            e
                        );
                        return best.into_result(point_id, itn, ProjectionStats::default());
                    }
                };
            let len_sq = violation::fv_len_sq(model, irow, violation);
            if len_sq < settings.alpha * settings.alpha {
                continue;
            }
            ninf += 1;
            sfd += len_sq.sqrt();

            let row = &model.rows[irow];
            for &iel in &row.elements {
                let el = &model.elements[iel];
                x[el.col] += violation * el.value / row.grad_len_sq;
            }
        }

        if ninf == 0 {
            return feasible_result(x, point_id, itn, ProjectionStats::default());
        }
        best.offer(&x, sfd, ninf);
    }

    best.into_result(point_id, settings.max_itns, ProjectionStats::default())
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|c| c * c).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impact;
    use crate::model::{ColSpec, RowKind, RowSpec, SparseModel, PLINFY};
    use crate::sparse;

    fn identity_model() -> SparseModel {
        // x1 + x2 = 2 over [0,10]^2
        let a = sparse::from_triplets(1, 2, vec![(0, 0, 1.0), (0, 1, 1.0)]);
        SparseModel::from_csc(
            "id",
            vec![RowSpec {
                name: "r".into(),
                kind: RowKind::Equal,
                rhs_lo: 2.0,
                rhs_up: 2.0,
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
    fn test_feasible_seed_returned_unchanged() {
        let model = identity_model();
        let s = SolverSettings::default();
        let order = impact::impact_order(&model);
        for kind in [
            WorkerKind::Simple,
            WorkerKind::Standard {
                primary: CvKind::Mean,
            },
            WorkerKind::Impact,
            WorkerKind::SeqImpact,
        ] {
            let r = run(&model, &s, &order, &[1.0, 1.0], kind, 0);
            assert!(r.feasible, "{:?}", kind);
            assert_eq!(r.ninf, 0);
            assert_eq!(r.iterations, 0, "{:?}", kind);
            assert_eq!(r.point, vec![1.0, 1.0], "{:?}", kind);
        }
    }

    #[test]
    fn test_standard_solves_single_inequality() {
        // 2x1 + x2 >= 4, seeded at the origin.
        let a = sparse::from_triplets(1, 2, vec![(0, 0, 2.0), (0, 1, 1.0)]);
        let model = SparseModel::from_csc(
            "g",
            vec![RowSpec {
                name: "r".into(),
                kind: RowKind::Greater,
                rhs_lo: 4.0,
                rhs_up: PLINFY,
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
        .unwrap();
        let s = SolverSettings::default();
        let order = impact::impact_order(&model);
        let r = run(
            &model,
            &s,
            &order,
            &[0.0, 0.0],
            WorkerKind::Standard {
                primary: CvKind::Mean,
            },
            0,
        );
        assert!(r.feasible);
        // First consensus step is the feasibility vector (1.6, 0.8); the
        // trajectory must end on the constraint within tolerance.
        assert!(2.0 * r.point[0] + r.point[1] >= 4.0 - 1e-4);
        assert!(r.point.iter().all(|&v| (-1e-6..=10.0 + 1e-6).contains(&v)));
    }

    #[test]
    fn test_seq_impact_snaps_bounds_first() {
        let model = identity_model();
        let s = SolverSettings::default();
        let order = impact::impact_order(&model);
        // Start far outside the bounds; the first sweep snaps onto the box
        // and then walks onto the hyperplane.
        let r = run(&model, &s, &order, &[-50.0, 40.0], WorkerKind::SeqImpact, 5);
        assert!(r.feasible);
        assert!((r.point[0] + r.point[1] - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_simple_reports_advanced_point() {
        let model = identity_model();
        let s = SolverSettings::default();
        let order = impact::impact_order(&model);
        let r = run(&model, &s, &order, &[0.0, 0.0], WorkerKind::Simple, 7);
        // One step from the origin along the FV of x1+x2=2 lands on the
        // hyperplane.
        assert!(r.feasible);
        assert!((r.point[0] - 1.0).abs() < 1e-9);
        assert!((r.point[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_infeasible_model_reports_best_point() {
        // x >= 2 and x <= 1: empty feasible set.
        let a = sparse::from_triplets(2, 1, vec![(0, 0, 1.0), (1, 0, 1.0)]);
        let model = SparseModel::from_csc(
            "inf",
            vec![
                RowSpec {
                    name: "ge".into(),
                    kind: RowKind::Greater,
                    rhs_lo: 2.0,
                    rhs_up: PLINFY,
                },
                RowSpec {
                    name: "le".into(),
                    kind: RowKind::Less,
                    rhs_lo: -PLINFY,
                    rhs_up: 1.0,
                },
            ],
            vec![ColSpec {
                name: "x".into(),
                integer: false,
                bnd_lo: 0.0,
                bnd_up: 10.0,
            }],
            &a,
            1e-6,
        )
        .unwrap();
        let s = SolverSettings::default();
        let order = impact::impact_order(&model);
        let r = run(
            &model,
            &s,
            &order,
            &[5.0],
            WorkerKind::Standard {
                primary: CvKind::Mean,
            },
            0,
        );
        assert!(!r.feasible);
        assert!(r.sfd.is_finite());
        // Anywhere between the two hyperplanes the SFD is exactly 1.
        assert!(r.sfd >= 1.0 - 1e-9);
    }
}
