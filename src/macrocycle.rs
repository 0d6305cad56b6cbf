//! Template-driven layout for large rings.
//!
//! A macrocycle (≥ 10 atoms, at least one bond of its own) looks terrible as
//! a regular polygon. Instead, candidate template shapes are tried at every
//! rotation offset and direction, scored by how well fused-ring attachment
//! atoms land on convex vertices and heteroatoms on concave ones, and the
//! best-scoring assignment is applied.

use std::f64::consts::PI;

use petgraph::graph::NodeIndex;

use crate::geometry::{centroid, polygon_winding, turn, Point};
use crate::molecule::Mol;
use crate::rings::{Ring, RingSystem};

/// Rings smaller than this are never macrocycles.
pub const MACROCYCLE_MIN_SIZE: usize = 10;

/// Shape library for macrocycle layout. Shapes are closed polygons with
/// roughly unit edges; even vertex counts only (odd rings are padded with a
/// phantom vertex during matching).
#[derive(Debug, Clone)]
pub struct MacrocycleTemplates {
    shapes: Vec<Vec<Point>>,
}

impl MacrocycleTemplates {
    pub fn empty() -> Self {
        Self { shapes: Vec::new() }
    }

    pub fn add_shape(&mut self, points: Vec<Point>) {
        if points.len() >= MACROCYCLE_MIN_SIZE && points.len() % 2 == 0 {
            self.shapes.push(points);
        }
    }

    pub fn shapes_of_len(&self, n: usize) -> impl Iterator<Item = &Vec<Point>> {
        self.shapes.iter().filter(move |s| s.len() == n)
    }

    /// Built-in shapes for 10–16 vertices: a plain polygon plus a "crown"
    /// with alternating radii whose inner vertices are concave.
    pub fn builtin() -> Self {
        let mut t = Self::empty();
        for n in [10usize, 12, 14, 16] {
            t.shapes.push(regular_shape(n));
            t.shapes.push(crown_shape(n));
        }
        t
    }
}

impl Default for MacrocycleTemplates {
    fn default() -> Self {
        Self::builtin()
    }
}

fn regular_shape(n: usize) -> Vec<Point> {
    let r = 1.0 / (2.0 * (PI / n as f64).sin());
    (0..n)
        .map(|i| Point::polar(2.0 * PI * i as f64 / n as f64) * r)
        .collect()
}

fn crown_shape(n: usize) -> Vec<Point> {
    let r_out = 1.0 / (2.0 * (PI / n as f64).sin());
    let r_in = r_out * 0.72;
    (0..n)
        .map(|i| {
            let r = if i % 2 == 0 { r_out } else { r_in };
            Point::polar(2.0 * PI * i as f64 / n as f64) * r
        })
        .collect()
}

/// True when the ring qualifies for macrocycle treatment: at least
/// [`MACROCYCLE_MIN_SIZE`] atoms and at least one bond it does not share with
/// another ring of its system.
pub fn is_macrocycle(ring: &Ring, rings: &[Ring], system: &RingSystem) -> bool {
    ring.len() >= MACROCYCLE_MIN_SIZE
        && ring
            .bonds
            .iter()
            .any(|&b| !system.bond_is_shared(rings, b))
}

/// Per-vertex shape classification against the polygon's global winding.
fn convexity(shape: &[Point]) -> Vec<bool> {
    let n = shape.len();
    let global = polygon_winding(shape);
    (0..n)
        .map(|i| {
            let prev = shape[(i + n - 1) % n];
            let next = shape[(i + 1) % n];
            let t = turn(prev, shape[i], next);
            t * global >= 0.0
        })
        .collect()
}

/// Attempts macrocycle layout. Returns the ring atoms that were placed (and
/// should carry a macrocycle hint), or `None` when no template of the right
/// size exists; the caller then falls back to a regular polygon.
pub fn place_macrocycle(
    mol: &mut Mol,
    ring: &Ring,
    rings: &[Ring],
    system: &RingSystem,
    templates: &MacrocycleTemplates,
    bond_length: f64,
) -> Option<Vec<NodeIndex>> {
    let m = ring.len();
    // Templates are even-sized; odd rings get one phantom vertex.
    let padded = m + m % 2;

    // Which ring atoms are fused attachment points (shared with another ring).
    let shared: Vec<bool> = ring
        .atoms
        .iter()
        .map(|&a| {
            system
                .rings
                .iter()
                .filter(|&&r| rings[r].contains_atom(a))
                .count()
                > 1
        })
        .collect();
    let hetero: Vec<bool> = ring
        .atoms
        .iter()
        .map(|&a| {
            let z = mol.atom(a).atomic_num;
            z != 6 && z != 1
        })
        .collect();

    let mut best: Option<(i64, &Vec<Point>, usize, i64)> = None;
    for shape in templates.shapes_of_len(padded) {
        let concave: Vec<bool> = convexity(shape).iter().map(|&c| !c).collect();
        for direction in [1i64, -1] {
            for offset in 0..padded {
                let score = score_assignment(&shared, &hetero, &concave, offset, direction);
                // Strict improvement only: ties stay with the first found.
                if best.map_or(true, |(s, _, _, _)| score > s) {
                    best = Some((score, shape, offset, direction));
                }
            }
        }
    }

    let (_, shape, offset, direction) = best?;
    let scale = bond_length / mean_edge(shape);
    let center = centroid(shape);

    for (k, &atom) in ring.atoms.iter().enumerate() {
        let v = vertex_for(k, offset, direction, padded);
        let p = (shape[v] - center) * scale;
        mol.set_position(atom, p);
    }
    Some(ring.atoms.clone())
}

fn vertex_for(k: usize, offset: usize, direction: i64, n: usize) -> usize {
    let signed = offset as i64 + direction * k as i64;
    signed.rem_euclid(n as i64) as usize
}

fn mean_edge(shape: &[Point]) -> f64 {
    let n = shape.len();
    let total: f64 = (0..n)
        .map(|i| shape[i].distance(shape[(i + 1) % n]))
        .sum();
    total / n as f64
}

/// Scores one (template, offset, direction) assignment.
///
/// Fused attachment runs want to sit flat on the outline: a two-atom shared
/// edge between convex vertices scores highest, a three-atom share wants the
/// strict convex-concave-convex kink, four-atom shares the double kink.
/// Heteroatoms prefer concave vertices.
fn score_assignment(
    shared: &[bool],
    hetero: &[bool],
    concave: &[bool],
    offset: usize,
    direction: i64,
) -> i64 {
    let m = shared.len();
    let n = concave.len();
    let mut score = 0i64;

    for k in 0..m {
        if hetero[k] && concave[vertex_for(k, offset, direction, n)] {
            score += 1;
        }
    }

    // Maximal runs of consecutive shared atoms along the ring. Scanning
    // starts at an unshared atom so a run wrapping past index 0 is seen
    // whole; a ring with no unshared atom has no free bond and never gets
    // here.
    if let Some(start) = (0..m).find(|&i| !shared[i]) {
        let mut k = 0;
        while k < m {
            let idx = (start + k) % m;
            if !shared[idx] {
                k += 1;
                continue;
            }
            let mut len = 0;
            while len < m && shared[(idx + len) % m] {
                len += 1;
            }
            let conc: Vec<bool> = (0..len)
                .map(|i| concave[vertex_for((idx + i) % m, offset, direction, n)])
                .collect();
            score += match len {
                2 if !conc[0] && !conc[1] => 16,
                3 if !conc[0] && conc[1] && !conc[2] => 24,
                3 if conc.iter().all(|&c| !c) => 8,
                4 if !conc[0] && conc[1] && conc[2] && !conc[3] => 20,
                _ => 0,
            };
            k += len;
        }
    }
    score
}
