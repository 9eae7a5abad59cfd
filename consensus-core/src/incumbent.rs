//! Incumbent bookkeeping.
//!
//! The incumbent is the best point seen in the whole solve under the
//! active ordering. The rest of the system only ever asks "would this
//! replace the incumbent?"; which metric leads is a policy choice fixed at
//! configuration time.

use std::fmt;

/// Incumbent replacement policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncumbentOrder {
    /// Lexicographic (SFD, NINF): smaller SFD wins, NINF breaks ties.
    #[default]
    Sfd,
    /// Lexicographic (NINF, SFD): fewer violations win, SFD breaks ties.
    Ninf,
}

/// Who produced an improvement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// A trajectory worker, by seed id.
    Point(usize),
    /// Forward post-swarm projection.
    ForwardSearch,
    /// Reflection through the incumbent.
    Reflection,
    /// Projection restarted from the reflected point.
    ReflectedForward,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Point(id) => write!(f, "point {}", id),
            Source::ForwardSearch => write!(f, "forward swarm search"),
            Source::Reflection => write!(f, "reflected point"),
            Source::ReflectedForward => write!(f, "reflected forward search"),
        }
    }
}

/// Result of an update attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The new point is feasible.
    Feasible,
    /// The incumbent was replaced.
    Improved,
    /// The candidate does not beat the incumbent.
    NotImproved,
}

/// The incumbent point plus per-source improvement tallies.
#[derive(Debug, Clone)]
pub struct IncumbentTracker {
    order: IncumbentOrder,
    /// Best point seen so far.
    pub point: Vec<f64>,
    /// SFD at the incumbent (`f64::INFINITY` before the first update).
    pub sfd: f64,
    /// NINF at the incumbent.
    pub ninf: usize,
    /// Improvements recorded after the incumbent was first established.
    pub total_updates: u64,
    /// Who produced the current incumbent.
    pub final_source: Option<Source>,
    num_update: Vec<u64>,
    frac_update: Vec<f64>,
    n_points: usize,
}

impl IncumbentTracker {
    /// Tracker over `n_cols` dimensions with `n_points` worker sources.
    pub fn new(order: IncumbentOrder, n_cols: usize, n_points: usize) -> Self {
        IncumbentTracker {
            order,
            point: vec![0.0; n_cols],
            sfd: f64::INFINITY,
            ninf: usize::MAX,
            total_updates: 0,
            final_source: None,
            num_update: vec![0; n_points + 3],
            frac_update: vec![0.0; n_points + 3],
            n_points,
        }
    }

    fn source_index(&self, source: Source) -> usize {
        match source {
            Source::Point(id) => id.min(self.n_points - 1),
            Source::ForwardSearch => self.n_points,
            Source::Reflection => self.n_points + 1,
            Source::ReflectedForward => self.n_points + 2,
        }
    }

    /// Whether any point has been accepted yet.
    pub fn has_incumbent(&self) -> bool {
        self.sfd.is_finite()
    }

    /// Offer a candidate point under the active ordering.
    pub fn try_update(
        &mut self,
        point: &[f64],
        sfd: f64,
        ninf: usize,
        source: Source,
    ) -> UpdateOutcome {
        let improved = match self.order {
            IncumbentOrder::Sfd => {
                sfd < self.sfd || (sfd == self.sfd && ninf < self.ninf)
            }
            IncumbentOrder::Ninf => {
                ninf < self.ninf || (ninf == self.ninf && sfd < self.sfd)
            }
        };
        if !improved {
            return UpdateOutcome::NotImproved;
        }

        // The very first acceptance establishes the incumbent; only later
        // replacements count as updates.
        if self.has_incumbent() {
            self.total_updates += 1;
            let idx = self.source_index(source);
            self.num_update[idx] += 1;
            let frac = match self.order {
                IncumbentOrder::Sfd => 1.0 - sfd / self.sfd,
                IncumbentOrder::Ninf => {
                    if self.ninf == 0 {
                        0.0
                    } else {
                        1.0 - ninf as f64 / self.ninf as f64
                    }
                }
            };
            self.frac_update[idx] += frac;
        }

        self.point.copy_from_slice(point);
        self.sfd = sfd;
        self.ninf = ninf;
        self.final_source = Some(source);
        log::info!(
            "new incumbent: sfd {:.6e} ninf {} generated by {}",
            sfd,
            ninf,
            source
        );

        if ninf == 0 {
            log::info!("feasible point found by {}", source);
            UpdateOutcome::Feasible
        } else {
            UpdateOutcome::Improved
        }
    }

    /// Improvement counts per source slot (workers first, then the three
    /// search sources).
    pub fn update_counts(&self) -> &[u64] {
        &self.num_update
    }

    /// Mean fractional improvement per source slot.
    pub fn avg_fractional_improvements(&self) -> Vec<f64> {
        self.num_update
            .iter()
            .zip(&self.frac_update)
            .map(|(&n, &f)| if n == 0 { 0.0 } else { f / n as f64 })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sfd_order_lexicographic() {
        let mut t = IncumbentTracker::new(IncumbentOrder::Sfd, 2, 4);
        assert_eq!(
            t.try_update(&[1.0, 1.0], 5.0, 3, Source::Point(0)),
            UpdateOutcome::Improved
        );
        // Same SFD, fewer violations: accepted.
        assert_eq!(
            t.try_update(&[1.0, 2.0], 5.0, 2, Source::Point(1)),
            UpdateOutcome::Improved
        );
        // Same SFD, same NINF: rejected.
        assert_eq!(
            t.try_update(&[0.0, 0.0], 5.0, 2, Source::Point(2)),
            UpdateOutcome::NotImproved
        );
        // Larger SFD, smaller NINF: rejected under SFD order.
        assert_eq!(
            t.try_update(&[0.0, 0.0], 6.0, 1, Source::Point(2)),
            UpdateOutcome::NotImproved
        );
    }

    #[test]
    fn test_ninf_order_prefers_fewer_violations() {
        let mut t = IncumbentTracker::new(IncumbentOrder::Ninf, 2, 4);
        t.try_update(&[1.0, 1.0], 5.0, 3, Source::Point(0));
        assert_eq!(
            t.try_update(&[2.0, 2.0], 9.0, 2, Source::Point(1)),
            UpdateOutcome::Improved
        );
        assert_eq!(t.ninf, 2);
    }

    #[test]
    fn test_feasible_outcome_and_final_source() {
        let mut t = IncumbentTracker::new(IncumbentOrder::Sfd, 1, 4);
        t.try_update(&[0.5], 2.0, 1, Source::Point(3));
        assert_eq!(
            t.try_update(&[0.0], 0.0, 0, Source::ForwardSearch),
            UpdateOutcome::Feasible
        );
        assert_eq!(t.final_source, Some(Source::ForwardSearch));
        assert_eq!(t.update_counts()[4], 1);
    }

    #[test]
    fn test_first_acceptance_not_tallied() {
        let mut t = IncumbentTracker::new(IncumbentOrder::Sfd, 1, 4);
        t.try_update(&[0.5], 2.0, 1, Source::Point(0));
        assert_eq!(t.total_updates, 0);
        t.try_update(&[0.5], 1.0, 1, Source::Point(0));
        assert_eq!(t.total_updates, 1);
        // Halving the SFD is a 0.5 fractional improvement.
        let fracs = t.avg_fractional_improvements();
        assert!((fracs[0] - 0.5).abs() < 1e-12);
    }
}
