//! Sample box management and seed generation.
//!
//! Each round draws its swarm from an axis-aligned box: a handful of
//! deterministic special points plus Latin hypercube samples. Between
//! rounds the box contracts around the promising returns using a Welford
//! mean/variance sweep.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::model::SparseModel;
use crate::settings::SolverSettings;

/// Special seeds reserved per round (rounds past the first).
pub const NUM_SPECIAL_POINTS: usize = 4;

/// Axis-aligned sampling hyperrectangle.
#[derive(Debug, Clone)]
pub struct SampleBox {
    /// Per-dimension lower edge.
    pub lo: Vec<f64>,
    /// Per-dimension upper edge.
    pub up: Vec<f64>,
}

impl SampleBox {
    /// Round-0 launch box.
    ///
    /// Columns with a finite lower bound span `[bnd_lo, min(bnd_lo +
    /// box_side, bnd_up)]`. Columns unbounded below extend `box_side` down
    /// from the upper bound; fully free columns get a `box_side`-wide box
    /// centred on zero.
    pub fn initial(model: &SparseModel, s: &SolverSettings) -> Self {
        let n = model.n_cols();
        let mut lo = vec![0.0; n];
        let mut up = vec![0.0; n];
        for (j, col) in model.cols.iter().enumerate() {
            if col.bnd_lo > -s.plinfy {
                lo[j] = col.bnd_lo;
                up[j] = (col.bnd_lo + s.box_side).min(col.bnd_up);
            } else if col.bnd_up < s.plinfy {
                up[j] = col.bnd_up;
                lo[j] = col.bnd_up - s.box_side;
            } else {
                lo[j] = -0.5 * s.box_side;
                up[j] = 0.5 * s.box_side;
            }
        }
        SampleBox { lo, up }
    }

    /// Number of dimensions.
    pub fn dims(&self) -> usize {
        self.lo.len()
    }

    /// Width of one side.
    pub fn width(&self, j: usize) -> f64 {
        self.up[j] - self.lo[j]
    }

    /// Mean side width.
    pub fn avg_width(&self) -> f64 {
        if self.dims() == 0 {
            return 0.0;
        }
        (0..self.dims()).map(|j| self.width(j)).sum::<f64>() / self.dims() as f64
    }

    /// Longest side width.
    pub fn max_width(&self) -> f64 {
        (0..self.dims()).map(|j| self.width(j)).fold(0.0, f64::max)
    }

    /// Centre point.
    pub fn centre(&self) -> Vec<f64> {
        (0..self.dims())
            .map(|j| (self.lo[j] + self.up[j]) / 2.0)
            .collect()
    }

    /// Contract to `[μ − 1.5σ, μ + 1.5σ]` around the accumulated sample,
    /// clipped inside the original variable bounds. A side inverted by
    /// clipping collapses to a point.
    pub fn contract(&mut self, acc: &Welford, model: &SparseModel) {
        for j in 0..self.dims() {
            let sigma = acc.std_dev(j);
            let mu = acc.mean(j);
            let col = &model.cols[j];
            let lo = (mu - 1.5 * sigma).max(col.bnd_lo).min(col.bnd_up);
            let mut up = (mu + 1.5 * sigma).max(col.bnd_lo).min(col.bnd_up);
            if up < lo {
                log::warn!("box side {} inverted by clipping; collapsed to a point", j);
                up = lo;
            }
            self.lo[j] = lo;
            self.up[j] = up;
        }
    }
}

/// Streaming per-dimension mean and variance.
#[derive(Debug, Clone)]
pub struct Welford {
    count: usize,
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl Welford {
    /// Empty accumulator over `n` dimensions.
    pub fn new(n: usize) -> Self {
        Welford {
            count: 0,
            mean: vec![0.0; n],
            m2: vec![0.0; n],
        }
    }

    /// Points accumulated so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Fold in one point.
    pub fn push(&mut self, x: &[f64]) {
        self.count += 1;
        if self.count == 1 {
            self.mean.copy_from_slice(x);
            self.m2.fill(0.0);
            return;
        }
        let k = self.count as f64;
        for j in 0..self.mean.len() {
            let d = x[j] - self.mean[j];
            self.mean[j] += d / k;
            self.m2[j] += (k - 1.0) * d * d / k;
        }
    }

    /// Mean along dimension `j`.
    pub fn mean(&self, j: usize) -> f64 {
        self.mean[j]
    }

    /// Population standard deviation along dimension `j`.
    pub fn std_dev(&self, j: usize) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2[j] / self.count as f64).sqrt()
        }
    }
}

/// Fill `points` with one Latin hypercube sample per box-side bin.
///
/// Each dimension is split into `points.len()` equal bins with one uniform
/// draw per bin, then the bin-to-point assignment is permuted per
/// dimension independently.
pub fn latin_hypercube<R: Rng>(rng: &mut R, bx: &SampleBox, points: &mut [Vec<f64>]) {
    let n = points.len();
    if n == 0 {
        return;
    }
    let mut perm: Vec<usize> = (0..n).collect();
    let mut vals = vec![0.0; n];
    for j in 0..bx.dims() {
        let bin = bx.width(j) / n as f64;
        for (i, v) in vals.iter_mut().enumerate() {
            *v = bx.lo[j] + i as f64 * bin + rng.gen::<f64>() * bin;
        }
        perm.shuffle(rng);
        for (i, p) in points.iter_mut().enumerate() {
            p[j] = vals[perm[i]];
        }
    }
}

/// Deterministic round-0 seeds: the origin, the box centre, and the bound
/// closest to zero in each dimension. Exact duplicates are dropped so their
/// slots go to Latin hypercube samples instead.
pub fn special_points_initial(bx: &SampleBox) -> Vec<Vec<f64>> {
    let n = bx.dims();
    let origin = vec![0.0; n];
    let centre = bx.centre();
    let near_zero: Vec<f64> = (0..n)
        .map(|j| {
            if bx.lo[j] <= 0.0 && bx.up[j] >= 0.0 {
                0.0
            } else if bx.lo[j].abs() < bx.up[j].abs() {
                bx.lo[j]
            } else {
                bx.up[j]
            }
        })
        .collect();

    let mut specials = vec![origin];
    for candidate in [centre, near_zero] {
        if specials.iter().all(|p| p != &candidate) {
            specials.push(candidate);
        }
    }
    specials
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColSpec, RowKind, RowSpec, SparseModel, PLINFY};
    use crate::sparse;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn model_with_bounds(bounds: &[(f64, f64)]) -> SparseModel {
        let n = bounds.len();
        let triplets: Vec<(usize, usize, f64)> = (0..n).map(|j| (0, j, 1.0)).collect();
        let a = sparse::from_triplets(1, n, triplets);
        SparseModel::from_csc(
            "b",
            vec![RowSpec {
                name: "r".into(),
                kind: RowKind::Less,
                rhs_lo: -PLINFY,
                rhs_up: 1e6,
            }],
            bounds
                .iter()
                .enumerate()
                .map(|(j, &(lo, up))| ColSpec {
                    name: format!("x{}", j),
                    integer: false,
                    bnd_lo: lo,
                    bnd_up: up,
                })
                .collect(),
            &a,
            1e-6,
        )
        .unwrap()
    }

    #[test]
    fn test_initial_box_clamps_to_upper_bound() {
        let s = SolverSettings::default();
        let model = model_with_bounds(&[(0.0, 5.0), (2.0, PLINFY), (-PLINFY, PLINFY)]);
        let bx = SampleBox::initial(&model, &s);
        assert_eq!(bx.lo[0], 0.0);
        assert_eq!(bx.up[0], 5.0);
        assert_eq!(bx.lo[1], 2.0);
        assert_eq!(bx.up[1], 2.0 + s.box_side);
        assert_eq!(bx.lo[2], -0.5 * s.box_side);
        assert_eq!(bx.up[2], 0.5 * s.box_side);
    }

    #[test]
    fn test_latin_hypercube_one_seed_per_bin() {
        // K = 8 over a single dimension [0, 8]: each unit bin holds exactly
        // one seed.
        let bx = SampleBox {
            lo: vec![0.0],
            up: vec![8.0],
        };
        let mut rng = StdRng::seed_from_u64(7);
        let mut points = vec![vec![0.0]; 8];
        latin_hypercube(&mut rng, &bx, &mut points);

        let mut bins = vec![0usize; 8];
        for p in &points {
            assert!((0.0..8.0).contains(&p[0]));
            bins[p[0] as usize] += 1;
        }
        assert!(bins.iter().all(|&b| b == 1));
    }

    #[test]
    fn test_welford_matches_population_moments() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
        let mut acc = Welford::new(1);
        for &x in &xs {
            acc.push(&[x]);
        }
        assert_eq!(acc.count(), 5);
        assert!((acc.mean(0) - 3.0).abs() < 1e-12);
        // Population variance of 1..5 is 2.
        assert!((acc.std_dev(0) - 2.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_contracted_box_side_is_three_sigma() {
        let s = SolverSettings::default();
        let model = model_with_bounds(&[(-1000.0, 1000.0); 10]);
        let mut bx = SampleBox::initial(&model, &s);

        // Ten returned points spread along every dimension.
        let mut acc = Welford::new(10);
        for i in 0..10 {
            acc.push(&vec![i as f64; 10]);
        }
        bx.contract(&acc, &model);
        for j in 0..10 {
            let sigma = acc.std_dev(j);
            assert!((bx.width(j) - 3.0 * sigma).abs() < 1e-9);
        }
    }

    #[test]
    fn test_contract_collapses_outside_bounds() {
        let s = SolverSettings::default();
        let model = model_with_bounds(&[(0.0, 1.0)]);
        let mut bx = SampleBox::initial(&model, &s);
        let mut acc = Welford::new(1);
        // Sample well above the upper bound.
        acc.push(&[5.0]);
        acc.push(&[6.0]);
        bx.contract(&acc, &model);
        assert_eq!(bx.lo[0], 1.0);
        assert_eq!(bx.up[0], 1.0);
    }

    #[test]
    fn test_special_points_dedup() {
        // Box [0, 0] in every dimension: all three specials coincide.
        let bx = SampleBox {
            lo: vec![0.0, 0.0],
            up: vec![0.0, 0.0],
        };
        let specials = special_points_initial(&bx);
        assert_eq!(specials.len(), 1);

        let bx = SampleBox {
            lo: vec![0.0, 0.0],
            up: vec![8.0, 8.0],
        };
        let specials = special_points_initial(&bx);
        assert_eq!(specials.len(), 2); // origin == near-zero bound
    }
}
