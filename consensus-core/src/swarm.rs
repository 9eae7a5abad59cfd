//! Swarm controller.
//!
//! Owns the incumbent, the sample box, and every global counter. Each
//! round it seeds up to K points (special points plus Latin hypercube
//! fill), runs one trajectory per seed in parallel, folds the results into
//! the incumbent and the box statistics, optionally runs the geometric
//! post-swarm search, and contracts the box. Workers communicate only
//! through their returned `WorkerResult`; joining the round's fleet is the
//! only suspension point.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::fmt;

use crate::consensus::{ConsensusBuilder, CvKind};
use crate::impact;
use crate::incumbent::{IncumbentTracker, Source, UpdateOutcome};
use crate::model::SparseModel;
use crate::project::{self, Projection, ProjectionStats};
use crate::sampling::{self, SampleBox, Welford};
use crate::settings::SolverSettings;
use crate::violation::point_stats;
use crate::worker::{self, WorkerKind};

/// Overall solve outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// A point satisfying every constraint and bound was found.
    Feasible,
    /// The round budget ran out; the incumbent is the best point seen.
    BudgetExhausted,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Feasible => write!(f, "Feasible"),
            SolveStatus::BudgetExhausted => write!(f, "Budget Exhausted"),
        }
    }
}

/// Global diagnostics accumulated over the solve.
#[derive(Debug, Clone)]
pub struct SolveStats {
    /// Incumbent replacements after the incumbent was established.
    pub total_updates: u64,
    /// Improvements per source slot (workers first, then forward /
    /// reflection / reflected-forward search).
    pub updates_by_source: Vec<u64>,
    /// Mean fractional improvement per source slot.
    pub avg_frac_by_source: Vec<f64>,
    /// Linear/quadratic projection counters, all workers merged.
    pub projection: ProjectionStats,
    /// Trajectories completed.
    pub cc_runs: u64,
    /// Rounds commenced.
    pub rounds: usize,
}

/// Solve result: the point, its quality, and the diagnostics.
#[derive(Debug, Clone)]
pub struct SolveReport {
    /// Outcome status.
    pub status: SolveStatus,
    /// Final point (the incumbent on budget exhaustion).
    pub x: Vec<f64>,
    /// SFD at the final point.
    pub sfd: f64,
    /// NINF at the final point.
    pub ninf: usize,
    /// Who produced the final point.
    pub final_source: Option<Source>,
    /// Counters.
    pub stats: SolveStats,
}

struct PoolPoint {
    point: Vec<f64>,
    sfd: f64,
}

/// Search for a feasible point of the model.
pub fn solve(model: &SparseModel, settings: &SolverSettings) -> SolveReport {
    // Every round needs room for the special points plus at least one
    // Latin hypercube seed.
    let k = settings.max_swarm_pts.max(sampling::NUM_SPECIAL_POINTS + 1);
    let n = model.n_cols();

    let impact_order = impact::impact_order(model);
    let mut rng = match settings.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut tracker = IncumbentTracker::new(settings.incumbent_order, n, k);
    let mut proj_stats = ProjectionStats::default();
    let mut cc_runs = 0u64;

    let mut bx = SampleBox::initial(model, settings);
    let mut last_avg_sfd = f64::INFINITY;
    let mut rounds = 0;

    for round in 0..settings.max_boxes {
        rounds = round + 1;
        log::info!(
            "round {}: box avg width {:.6e}, max width {:.6e}",
            round,
            bx.avg_width(),
            bx.max_width()
        );

        let swarm = seed_points(model, settings, &tracker, &bx, round, k, &mut rng);

        let results: Vec<worker::WorkerResult> = swarm
            .par_iter()
            .enumerate()
            .map(|(i, seed)| worker::run(model, settings, &impact_order, seed, WorkerKind::for_point(i), i))
            .collect();
        cc_runs += results.len() as u64;

        let mut acc = Welford::new(n);
        let mut sum_sfd = 0.0;
        let mut n_sfd = 0usize;
        let mut feasible = false;

        for r in &results {
            proj_stats.merge(&r.projection);
            if r.sfd.is_finite() {
                sum_sfd += r.sfd;
                n_sfd += 1;
                if r.sfd <= last_avg_sfd {
                    acc.push(&r.point);
                }
            }
            if tracker.try_update(&r.point, r.sfd, r.ninf, Source::Point(r.point_id))
                == UpdateOutcome::Feasible
            {
                feasible = true;
            }
        }
        if feasible {
            return report(SolveStatus::Feasible, tracker, proj_stats, cc_runs, rounds);
        }
        if n_sfd > 0 {
            last_avg_sfd = sum_sfd / n_sfd as f64;
        }

        if settings.swarm_search && tracker.has_incumbent() {
            let mut pool: Vec<PoolPoint> = results
                .into_iter()
                .filter(|r| r.sfd.is_finite())
                .map(|r| PoolPoint {
                    point: r.point,
                    sfd: r.sfd,
                })
                .collect();
            if search_pool(model, settings, &mut tracker, &mut proj_stats, &mut pool) {
                return report(SolveStatus::Feasible, tracker, proj_stats, cc_runs, rounds);
            }
        }

        if acc.count() > 0 {
            bx.contract(&acc, model);
        }
    }

    report(
        SolveStatus::BudgetExhausted,
        tracker,
        proj_stats,
        cc_runs,
        rounds,
    )
}

fn report(
    status: SolveStatus,
    tracker: IncumbentTracker,
    projection: ProjectionStats,
    cc_runs: u64,
    rounds: usize,
) -> SolveReport {
    log::info!(
        "solve finished: {} after {} rounds, {} trajectories",
        status,
        rounds,
        cc_runs
    );
    SolveReport {
        status,
        sfd: tracker.sfd,
        ninf: if tracker.has_incumbent() { tracker.ninf } else { usize::MAX },
        final_source: tracker.final_source,
        stats: SolveStats {
            total_updates: tracker.total_updates,
            updates_by_source: tracker.update_counts().to_vec(),
            avg_frac_by_source: tracker.avg_fractional_improvements(),
            projection,
            cc_runs,
            rounds,
        },
        x: tracker.point,
    }
}

/// Assemble one round's seeds: special points first, Latin hypercube fill
/// for the rest.
fn seed_points(
    model: &SparseModel,
    settings: &SolverSettings,
    tracker: &IncumbentTracker,
    bx: &SampleBox,
    round: usize,
    k: usize,
    rng: &mut StdRng,
) -> Vec<Vec<f64>> {
    let n = model.n_cols();
    let mut seeds = if round == 0 || !tracker.has_incumbent() {
        sampling::special_points_initial(bx)
    } else {
        incumbent_specials(model, settings, tracker, round)
    };
    seeds.truncate(k);

    let n_lhs = k - seeds.len();
    let mut lhs = vec![vec![0.0; n]; n_lhs];
    sampling::latin_hypercube(rng, bx, &mut lhs);
    seeds.extend(lhs);
    seeds
}

/// Special seeds derived from the incumbent and its consensus state:
/// incumbent + longest FV, incumbent + raw component sum, incumbent pushed
/// `SFD · round` along the unit consensus direction, and the incumbent
/// itself.
fn incumbent_specials(
    model: &SparseModel,
    settings: &SolverSettings,
    tracker: &IncumbentTracker,
    round: usize,
) -> Vec<Vec<f64>> {
    let inc = &tracker.point;
    let mut builder = ConsensusBuilder::new(model, settings);
    let summary = match builder.build(inc) {
        Ok(s) => s,
        Err(e) => {
            log::warn!("incumbent evaluation failed ({}); reseeding from the incumbent only", e);
            return vec![inc.clone()];
        }
    };

    let n = inc.len();
    let fv = builder.longest_fv();
    let raw_sum = builder.cv(CvKind::Sum);
    let cv = builder.cv(CvKind::Mean);
    let cv_len = cv.iter().map(|c| c * c).sum::<f64>().sqrt();

    let plus_fv: Vec<f64> = (0..n).map(|j| inc[j] + fv[j]).collect();
    let plus_sum: Vec<f64> = (0..n).map(|j| inc[j] + raw_sum[j]).collect();
    let along_cv: Vec<f64> = if cv_len > 0.0 {
        (0..n)
            .map(|j| inc[j] + cv[j] / cv_len * summary.sfd * round as f64)
            .collect()
    } else {
        inc.clone()
    };

    vec![plus_fv, plus_sum, along_cv, inc.clone()]
}

/// Geometric refinement over the round's returned points.
///
/// For each pool point: project along the vector to the incumbent; if that
/// stalls, reflect the point through the incumbent and project again from
/// the better end. Any incumbent improvement restarts the sweep. Returns
/// true as soon as a feasible point lands in the tracker.
fn search_pool(
    model: &SparseModel,
    settings: &SolverSettings,
    tracker: &mut IncumbentTracker,
    proj_stats: &mut ProjectionStats,
    pool: &mut [PoolPoint],
) -> bool {
    let mut restart = true;
    let mut tries = 0u64;

    while restart {
        restart = false;
        for i in 0..pool.len() {
            // The incumbent itself and points already in its neighbourhood
            // have nothing to teach the search.
            if pool[i].point == tracker.point || pool[i].sfd < tracker.sfd + 10.0 * settings.alpha
            {
                continue;
            }

            let vector: Vec<f64> = (0..pool[i].point.len())
                .map(|j| tracker.point[j] - pool[i].point[j])
                .collect();
            tries += 1;
            let forward = match project::project(model, settings, &pool[i].point, &vector, proj_stats)
            {
                Ok(p) => p,
                Err(e) => {
                    log::warn!("swarm search projection failed: {}", e);
                    continue;
                }
            };

            match forward {
                Projection::Feasible(p) => {
                    tracker.try_update(&p, 0.0, 0, Source::ForwardSearch);
                    return true;
                }
                Projection::NoProgress => continue,
                Projection::Improved(p) => {
                    if p != tracker.point {
                        let st = match point_stats(model, &p, settings) {
                            Ok(st) => st,
                            Err(e) => {
                                log::warn!("swarm search evaluation failed: {}", e);
                                continue;
                            }
                        };
                        if st.is_feasible() {
                            tracker.try_update(&p, 0.0, 0, Source::ForwardSearch);
                            return true;
                        }
                        if st.sfd < pool[i].sfd {
                            pool[i].point = p;
                            pool[i].sfd = st.sfd;
                            match tracker.try_update(
                                &pool[i].point,
                                st.sfd,
                                st.ninf,
                                Source::ForwardSearch,
                            ) {
                                UpdateOutcome::Feasible => return true,
                                UpdateOutcome::Improved => restart = true,
                                UpdateOutcome::NotImproved => {}
                            }
                            continue;
                        }
                    }
                    // Forward projection went nowhere useful: reflect.
                    tries += 1;
                    match reflect_step(model, settings, tracker, proj_stats, &mut pool[i]) {
                        ReflectOutcome::Feasible => return true,
                        ReflectOutcome::Restart => restart = true,
                        ReflectOutcome::Nothing => {}
                    }
                }
            }
        }
    }

    log::info!("swarm search exhausted after {} projections", tries);
    false
}

enum ReflectOutcome {
    Feasible,
    Restart,
    Nothing,
}

fn reflect_step(
    model: &SparseModel,
    settings: &SolverSettings,
    tracker: &mut IncumbentTracker,
    proj_stats: &mut ProjectionStats,
    pool_pt: &mut PoolPoint,
) -> ReflectOutcome {
    let inc = tracker.point.clone();
    let n = inc.len();
    let reflected: Vec<f64> = (0..n)
        .map(|j| inc[j] - (pool_pt.point[j] - inc[j]))
        .collect();

    let st = match point_stats(model, &reflected, settings) {
        Ok(st) => st,
        Err(e) => {
            log::warn!("swarm search reflection failed: {}", e);
            return ReflectOutcome::Nothing;
        }
    };
    if st.is_feasible() {
        tracker.try_update(&reflected, 0.0, 0, Source::Reflection);
        return ReflectOutcome::Feasible;
    }
    if st.sfd < pool_pt.sfd {
        pool_pt.point = reflected.clone();
        pool_pt.sfd = st.sfd;
    }

    // Project through the incumbent from whichever end is worse.
    let (base, vector): (Vec<f64>, Vec<f64>) = if st.sfd < tracker.sfd {
        (
            inc.clone(),
            (0..n).map(|j| reflected[j] - inc[j]).collect(),
        )
    } else {
        (
            reflected.clone(),
            (0..n).map(|j| inc[j] - reflected[j]).collect(),
        )
    };

    let outcome = match project::project(model, settings, &base, &vector, proj_stats) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("swarm search projection failed: {}", e);
            return ReflectOutcome::Nothing;
        }
    };
    match outcome {
        Projection::Feasible(p) => {
            tracker.try_update(&p, 0.0, 0, Source::ReflectedForward);
            ReflectOutcome::Feasible
        }
        Projection::NoProgress => ReflectOutcome::Nothing,
        Projection::Improved(p) => {
            if p == inc {
                return ReflectOutcome::Nothing;
            }
            let st2 = match point_stats(model, &p, settings) {
                Ok(st) => st,
                Err(e) => {
                    log::warn!("swarm search evaluation failed: {}", e);
                    return ReflectOutcome::Nothing;
                }
            };
            if st2.is_feasible() {
                tracker.try_update(&p, 0.0, 0, Source::ReflectedForward);
                return ReflectOutcome::Feasible;
            }
            if st2.sfd < pool_pt.sfd {
                pool_pt.point = p;
                pool_pt.sfd = st2.sfd;
                match tracker.try_update(
                    &pool_pt.point,
                    st2.sfd,
                    st2.ninf,
                    Source::ReflectedForward,
                ) {
                    UpdateOutcome::Feasible => return ReflectOutcome::Feasible,
                    UpdateOutcome::Improved => return ReflectOutcome::Restart,
                    UpdateOutcome::NotImproved => {}
                }
            }
            ReflectOutcome::Nothing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColSpec, RowKind, RowSpec, PLINFY};
    use crate::sparse;

    fn settings_for_tests() -> SolverSettings {
        SolverSettings {
            max_boxes: 5,
            max_swarm_pts: 8,
            seed: Some(11),
            ..SolverSettings::default()
        }
    }

    fn col(name: &str, lo: f64, up: f64) -> ColSpec {
        ColSpec {
            name: name.to_string(),
            integer: false,
            bnd_lo: lo,
            bnd_up: up,
        }
    }

    #[test]
    fn test_solves_small_system() {
        // x1 + x2 >= 4, x1 - x2 <= 1 over [0,10]^2.
        let a = sparse::from_triplets(
            2,
            2,
            vec![(0, 0, 1.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, -1.0)],
        );
        let model = SparseModel::from_csc(
            "small",
            vec![
                RowSpec {
                    name: "r1".into(),
                    kind: RowKind::Greater,
                    rhs_lo: 4.0,
                    rhs_up: PLINFY,
                },
                RowSpec {
                    name: "r2".into(),
                    kind: RowKind::Less,
                    rhs_lo: -PLINFY,
                    rhs_up: 1.0,
                },
            ],
            vec![col("x1", 0.0, 10.0), col("x2", 0.0, 10.0)],
            &a,
            1e-6,
        )
        .unwrap();

        let report = solve(&model, &settings_for_tests());
        assert_eq!(report.status, SolveStatus::Feasible);
        assert_eq!(report.ninf, 0);
        let x = &report.x;
        assert!(x[0] + x[1] >= 4.0 - 1e-4);
        assert!(x[0] - x[1] <= 1.0 + 1e-4);
    }

    #[test]
    fn test_incumbent_monotone_on_infeasible_model() {
        // x >= 2 and x <= 1: infeasible; incumbent SFD settles at 1.
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
            vec![col("x", 0.0, 10.0)],
            &a,
            1e-6,
        )
        .unwrap();

        let report = solve(&model, &settings_for_tests());
        assert_eq!(report.status, SolveStatus::BudgetExhausted);
        assert!((report.sfd - 1.0).abs() < 1e-3);
        assert!(report.ninf >= 1);
        assert_eq!(report.stats.rounds, 5);
    }
}
