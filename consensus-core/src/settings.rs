//! Solver settings and tolerances.

use crate::incumbent::IncumbentOrder;

/// Settings for the constraint consensus swarm solver.
///
/// The three tolerances interact: `alpha` decides when a single feasibility
/// vector is too short to matter, `beta` decides when a whole consensus
/// vector is too short to move on, and `featol` is the classical LHS−RHS
/// feasibility tolerance. Setting `alpha <= featol` makes consensus success
/// imply classical feasibility.
#[derive(Debug, Clone)]
pub struct SolverSettings {
    /// Feasibility distance tolerance: a violated row whose feasibility
    /// vector is shorter than this is treated as satisfied.
    pub alpha: f64,

    /// Movement tolerance: a consensus vector shorter than this is "short"
    /// and triggers the fallback vector.
    pub beta: f64,

    /// Feasibility tolerance on constraint bodies and bounds.
    pub featol: f64,

    /// Large finite stand-in for plus infinity. Bounds at `±plinfy` are
    /// absent; anything strictly inside is a real bound.
    pub plinfy: f64,

    /// Maximum consensus iterations per trajectory.
    pub max_itns: usize,

    /// Swarm size K: trajectories launched per round.
    pub max_swarm_pts: usize,

    /// Maximum number of sample boxes (rounds).
    pub max_boxes: usize,

    /// Edge length of the round-0 launch box.
    pub box_side: f64,

    /// Incumbent replacement policy.
    pub incumbent_order: IncumbentOrder,

    /// Try linear/quadratic projection each iteration. When false every
    /// iteration takes the consensus-vector fallback path.
    pub use_projection: bool,

    /// Run the geometric post-swarm search after each round.
    pub swarm_search: bool,

    /// RNG seed for reproducible sampling (None = from entropy).
    pub seed: Option<u64>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        // Environment overrides for the knobs most often varied in batch
        // experiments.
        let max_boxes = std::env::var("CONSENSUS_MAX_BOXES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(100);
        let seed = std::env::var("CONSENSUS_SEED")
            .ok()
            .and_then(|s| s.parse::<u64>().ok());

        Self {
            alpha: 1.0e-6,
            beta: 1.0e-4,
            featol: 1.0e-6,
            plinfy: 1.0e10,
            max_itns: 50,
            max_swarm_pts: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            max_boxes,
            box_side: 10_000.0,
            incumbent_order: IncumbentOrder::default(),
            use_projection: true,
            swarm_search: true,
            seed,
        }
    }
}

impl SolverSettings {
    /// Set the round budget.
    pub fn with_max_boxes(mut self, max_boxes: usize) -> Self {
        self.max_boxes = max_boxes;
        self
    }

    /// Set the per-trajectory iteration budget.
    pub fn with_max_itns(mut self, max_itns: usize) -> Self {
        self.max_itns = max_itns;
        self
    }

    /// Set the swarm size.
    pub fn with_swarm_pts(mut self, k: usize) -> Self {
        self.max_swarm_pts = k;
        self
    }

    /// Set the incumbent replacement policy.
    pub fn with_order(mut self, order: IncumbentOrder) -> Self {
        self.incumbent_order = order;
        self
    }

    /// Fix the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = SolverSettings::default();
        assert_eq!(s.alpha, 1.0e-6);
        assert_eq!(s.beta, 1.0e-4);
        assert_eq!(s.featol, 1.0e-6);
        assert_eq!(s.plinfy, 1.0e10);
        assert_eq!(s.max_itns, 50);
        assert!(s.max_swarm_pts >= 1);
        assert!(s.use_projection);
    }

    #[test]
    fn test_builders() {
        let s = SolverSettings::default()
            .with_max_boxes(7)
            .with_max_itns(12)
            .with_swarm_pts(9)
            .with_seed(42);
        assert_eq!(s.max_boxes, 7);
        assert_eq!(s.max_itns, 12);
        assert_eq!(s.max_swarm_pts, 9);
        assert_eq!(s.seed, Some(42));
    }
}
