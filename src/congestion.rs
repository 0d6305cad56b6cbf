//! Pairwise congestion ("closeness") scoring: the objective function the
//! layout refiner minimizes. Unitless, inverse-square in 2D distance, and
//! deliberately not a physical energy.

use crate::molecule::Mol;

/// Marker stored on the diagonal and on bonded pairs; those cells never enter
/// the total.
pub const BONDED_SENTINEL: f64 = -1.0;

#[derive(Debug, Clone)]
pub struct CongestionModel {
    n: usize,
    min_dist: f64,
    /// Symmetric pair table. `scores[i][j] == scores[j][i]`.
    scores: Vec<Vec<f64>>,
    total: f64,
}

impl CongestionModel {
    /// Builds the full table for the molecule's current coordinates.
    pub fn new(mol: &Mol, min_dist: f64) -> Self {
        let n = mol.atom_count();
        let mut model = Self {
            n,
            min_dist,
            scores: vec![vec![0.0; n]; n],
            total: 0.0,
        };
        model.recompute(mol);
        model
    }

    pub fn min_dist(&self) -> f64 {
        self.min_dist
    }

    /// Contribution of one unbonded pair at squared distance `d_sq`.
    fn contribution(&self, d_sq: f64) -> f64 {
        1.0 / d_sq.max(self.min_dist * self.min_dist)
    }

    fn raw_pair(&self, mol: &Mol, i: usize, j: usize) -> f64 {
        use petgraph::graph::NodeIndex;
        if i == j {
            return BONDED_SENTINEL;
        }
        let (a, b) = (NodeIndex::new(i), NodeIndex::new(j));
        if mol.bond_between(a, b).is_some() {
            return BONDED_SENTINEL;
        }
        match (mol.position(a), mol.position(b)) {
            (Some(pa), Some(pb)) => self.contribution(pa.distance_sq(pb)),
            // Unplaced atoms do not congest anything yet.
            _ => 0.0,
        }
    }

    /// Rebuilds every cell and the running total from scratch.
    pub fn recompute(&mut self, mol: &Mol) {
        self.total = 0.0;
        for i in 0..self.n {
            for j in i..self.n {
                let v = self.raw_pair(mol, i, j);
                self.scores[i][j] = v;
                self.scores[j][i] = v;
                if i != j && v != BONDED_SENTINEL {
                    self.total += v;
                }
            }
        }
    }

    /// Recomputes only the cells touching a moved atom, keeping the running
    /// total consistent in O(|moved| × N).
    pub fn update(&mut self, mol: &Mol, moved: &[usize]) {
        let mut is_moved = vec![false; self.n];
        for &m in moved {
            is_moved[m] = true;
        }
        for &i in moved {
            for j in 0..self.n {
                if j == i {
                    continue;
                }
                // Each moved-moved pair must be refreshed once, not twice.
                if is_moved[j] && j < i {
                    continue;
                }
                let old = self.scores[i][j];
                let new = self.raw_pair(mol, i, j);
                self.scores[i][j] = new;
                self.scores[j][i] = new;
                if old != BONDED_SENTINEL {
                    self.total -= old;
                }
                if new != BONDED_SENTINEL {
                    self.total += new;
                }
            }
        }
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    /// Current contribution of pair (i, j); sentinel for bonded/diagonal.
    pub fn score(&self, i: usize, j: usize) -> f64 {
        self.scores[i][j]
    }

    /// The score a pair sitting exactly at the minimum allowed distance has.
    /// Pairs scoring above this are considered congested.
    pub fn congestion_limit(&self) -> f64 {
        1.0 / (4.0 * self.min_dist * self.min_dist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::molecule::{Atom, Bond};
    use petgraph::graph::NodeIndex;

    fn grid_mol(n: usize) -> Mol {
        let mut mol = Mol::new();
        let atoms: Vec<NodeIndex> = (0..n).map(|_| mol.add_atom(Atom::carbon())).collect();
        for w in atoms.windows(2) {
            mol.add_bond(w[0], w[1], Bond::default());
        }
        for (i, &a) in atoms.iter().enumerate() {
            mol.set_position(a, Point::new(i as f64 * 1.5, (i % 3) as f64));
        }
        mol
    }

    /// Tiny deterministic LCG for reproducible perturbations.
    struct Lcg(u64);
    impl Lcg {
        fn next_f64(&mut self) -> f64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((self.0 >> 33) as f64 / (1u64 << 31) as f64) - 0.5
        }
    }

    #[test]
    fn bonded_pairs_are_sentinel() {
        let mol = grid_mol(4);
        let model = CongestionModel::new(&mol, 0.75);
        assert_eq!(model.score(0, 1), BONDED_SENTINEL);
        assert_eq!(model.score(0, 0), BONDED_SENTINEL);
        assert!(model.score(0, 2) > 0.0);
    }

    #[test]
    fn total_is_upper_triangle_sum() {
        let mol = grid_mol(6);
        let model = CongestionModel::new(&mol, 0.75);
        let mut sum = 0.0;
        for i in 0..6 {
            for j in (i + 1)..6 {
                let s = model.score(i, j);
                if s != BONDED_SENTINEL {
                    sum += s;
                }
            }
        }
        assert!((model.total() - sum).abs() < 1e-9);
    }

    #[test]
    fn close_pair_score_is_clamped() {
        let mut mol = Mol::new();
        let a = mol.add_atom(Atom::carbon());
        let b = mol.add_atom(Atom::carbon());
        mol.set_position(a, Point::new(0.0, 0.0));
        mol.set_position(b, Point::new(0.1, 0.0));
        let model = CongestionModel::new(&mol, 0.75);
        // Closer than the minimum distance clamps to 1/min².
        assert!((model.score(0, 1) - 1.0 / (0.75 * 0.75)).abs() < 1e-9);
    }

    #[test]
    fn incremental_update_matches_full_recompute() {
        let mut mol = grid_mol(8);
        let mut incremental = CongestionModel::new(&mol, 0.75);
        let mut rng = Lcg(42);

        for round in 0..20 {
            let moved: Vec<usize> = match round % 3 {
                0 => vec![2],
                1 => vec![0, 5],
                _ => vec![1, 3, 7],
            };
            for &m in &moved {
                let idx = NodeIndex::new(m);
                let p = mol.position(idx).unwrap();
                mol.set_position(
                    idx,
                    Point::new(p.x + rng.next_f64(), p.y + rng.next_f64()),
                );
            }
            incremental.update(&mol, &moved);

            let full = CongestionModel::new(&mol, 0.75);
            assert!(
                (incremental.total() - full.total()).abs() < 1e-9,
                "drift after round {}: {} vs {}",
                round,
                incremental.total(),
                full.total()
            );
            for i in 0..8 {
                for j in 0..8 {
                    assert!((incremental.score(i, j) - full.score(i, j)).abs() < 1e-9);
                }
            }
        }
    }
}
