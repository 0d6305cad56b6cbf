//! Places individual rings as regular polygons: standalone, spiro onto one
//! shared atom, fused across a shared bond, or bridged over a longer shared
//! arc. Also fans non-ring substituents out around a placed ring.

use std::f64::consts::PI;

use petgraph::graph::NodeIndex;

use crate::geometry::Point;
use crate::molecule::Mol;
use crate::rings::Ring;

/// Radius of the circle circumscribing a regular polygon of `ring_size`
/// vertices with side `bond_length`.
pub fn ring_radius(bond_length: f64, ring_size: usize) -> f64 {
    bond_length / (2.0 * (PI / ring_size as f64).sin())
}

/// First-vertex angle for a standalone regular polygon.
///
/// Small sizes use tuned values so the customary depictions come out (apex-up
/// triangle, edge-down square, apex-up pentagon); everything else derives
/// from the polygon step.
fn start_angle(ring_size: usize) -> f64 {
    match ring_size {
        3 => PI / 2.0,
        4 => PI / 4.0,
        5 => PI / 2.0,
        7 => PI / 2.0 + PI / 7.0,
        8 => PI / 8.0,
        n => PI / 2.0 + PI / n as f64,
    }
}

/// Computes positions for the unplaced atoms of `ring`.
///
/// `shared` lists the ring atoms that already have coordinates (in ring
/// order of appearance); `shared_center` is their center of gravity and
/// `center_direction` points from the already-placed structure toward where
/// the new ring body should grow. Dispatch follows the shared-atom count:
/// none → standalone polygon, one → spiro, two → fused, more → bridged.
pub fn place_ring(
    mol: &mut Mol,
    ring: &Ring,
    shared: &[NodeIndex],
    shared_center: Point,
    center_direction: Point,
    bond_length: f64,
) {
    let placed_shared: Vec<NodeIndex> = shared
        .iter()
        .copied()
        .filter(|&a| mol.position(a).is_some())
        .collect();

    match placed_shared.len() {
        0 => place_standalone(mol, ring, shared_center, bond_length),
        1 => place_spiro(
            mol,
            ring,
            placed_shared[0],
            center_direction,
            bond_length,
        ),
        2 if mol.bond_between(placed_shared[0], placed_shared[1]).is_some() => place_fused(
            mol,
            ring,
            placed_shared[0],
            placed_shared[1],
            center_direction,
            bond_length,
        ),
        _ => place_bridged(mol, ring, &placed_shared, center_direction, bond_length),
    }
}

fn place_standalone(mol: &mut Mol, ring: &Ring, center: Point, bond_length: f64) {
    let n = ring.len();
    let r = ring_radius(bond_length, n);
    let a0 = start_angle(n);
    let step = 2.0 * PI / n as f64;
    for (i, &atom) in ring.atoms.iter().enumerate() {
        let angle = a0 + step * i as f64;
        mol.set_position(atom, center + Point::polar(angle) * r);
    }
}

fn place_spiro(
    mol: &mut Mol,
    ring: &Ring,
    spiro_atom: NodeIndex,
    direction: Point,
    bond_length: f64,
) {
    let n = ring.len();
    let r = ring_radius(bond_length, n);
    let anchor = mol.position(spiro_atom).unwrap_or(Point::ZERO);
    let center = anchor + direction.normalized() * r;

    let ordered = rotate_ring_to(ring, spiro_atom);
    let a0 = center.angle_to(anchor);
    let step = 2.0 * PI / n as f64;
    for (i, &atom) in ordered.iter().enumerate().skip(1) {
        // Atoms with coordinates keep them; the bridged fallback routes
        // through here with several ring atoms already pinned.
        if mol.position(atom).is_some() {
            continue;
        }
        let angle = a0 + step * i as f64;
        mol.set_position(atom, center + Point::polar(angle) * r);
    }
}

fn place_fused(
    mol: &mut Mol,
    ring: &Ring,
    a: NodeIndex,
    b: NodeIndex,
    direction: Point,
    bond_length: f64,
) {
    let n = ring.len();
    let r = ring_radius(bond_length, n);
    let pa = mol.position(a).unwrap_or(Point::ZERO);
    let pb = mol.position(b).unwrap_or(Point::ZERO);

    let chord = pa.distance(pb);
    let half = chord / 2.0;
    let apothem = (r * r - half * half).max(0.0).sqrt();

    // New ring center sits across the shared bond from the old ring body.
    let mid = (pa + pb) * 0.5;
    let mut perp = (pb - pa).perp().normalized();
    if perp.x * direction.x + perp.y * direction.y < 0.0 {
        perp = -perp;
    }
    let center = mid + perp * apothem;

    // The shared bond occupies an arc of 2·asin(chord/2r); the remaining
    // n-1 steps split the rest of the circle evenly.
    let occupied = 2.0 * (half / r).min(1.0).asin();
    let step = (2.0 * PI - occupied) / (n - 1) as f64;

    let ordered = ring_path_between(ring, a, b);
    let theta_a = center.angle_to(pa);
    let theta_b = center.angle_to(pb);

    // Walk from a to b the long way around; pick the turn direction whose
    // endpoint actually lands on b.
    let sign = arc_sign(theta_a, theta_b, 2.0 * PI - occupied);
    for (i, &atom) in ordered.iter().enumerate() {
        if i == 0 || i == ordered.len() - 1 {
            continue;
        }
        let angle = theta_a + sign * step * i as f64;
        mol.set_position(atom, center + Point::polar(angle) * r);
    }
}

fn place_bridged(
    mol: &mut Mol,
    ring: &Ring,
    placed_shared: &[NodeIndex],
    direction: Point,
    bond_length: f64,
) {
    let n = ring.len();
    let shared_count = placed_shared.len();
    let r = ring_radius(bond_length, n);

    let Some((b1, b2)) = bridgeheads(ring, placed_shared) else {
        // Shared atoms without a clean two-bridgehead structure: fill the
        // gaps from the first placed atom as a spiro fallback. The other
        // placed atoms keep their positions.
        if let Some(&first) = placed_shared.first() {
            place_spiro(mol, ring, first, direction, bond_length);
        }
        return;
    };

    let pa = mol.position(b1).unwrap_or(Point::ZERO);
    let pb = mol.position(b2).unwrap_or(Point::ZERO);
    let chord = pa.distance(pb);
    let half = chord / 2.0;
    let apothem = (r * r - half * half).max(0.0).sqrt();

    let mid = (pa + pb) * 0.5;
    let mut perp = (pb - pa).perp().normalized();
    if perp.x * direction.x + perp.y * direction.y < 0.0 {
        perp = -perp;
    }
    let center = mid + perp * apothem;

    let occupied = 2.0 * (half / r).min(1.0).asin();
    let unplaced = n - shared_count;
    let step = (2.0 * PI - occupied) / (unplaced + 1) as f64;

    let path = unplaced_path(ring, b1, b2, placed_shared);
    let theta_a = center.angle_to(pa);
    let theta_b = center.angle_to(pb);
    let sign = arc_sign(theta_a, theta_b, 2.0 * PI - occupied);

    for (i, &atom) in path.iter().enumerate() {
        let angle = theta_a + sign * step * (i + 1) as f64;
        mol.set_position(atom, center + Point::polar(angle) * r);
    }
}

/// The two shared atoms that have only one shared-atom neighbor along the
/// ring cycle.
fn bridgeheads(ring: &Ring, shared: &[NodeIndex]) -> Option<(NodeIndex, NodeIndex)> {
    let n = ring.len();
    let mut heads = Vec::new();
    for (i, &atom) in ring.atoms.iter().enumerate() {
        if !shared.contains(&atom) {
            continue;
        }
        let prev = ring.atoms[(i + n - 1) % n];
        let next = ring.atoms[(i + 1) % n];
        let shared_neighbors =
            shared.contains(&prev) as usize + shared.contains(&next) as usize;
        if shared_neighbors == 1 {
            heads.push(atom);
        }
    }
    if heads.len() == 2 {
        Some((heads[0], heads[1]))
    } else {
        None
    }
}

/// Ring atoms from `from` to `to` walking the direction that avoids atoms in
/// `exclude` (the placed bridge); endpoints excluded.
fn unplaced_path(
    ring: &Ring,
    from: NodeIndex,
    to: NodeIndex,
    exclude: &[NodeIndex],
) -> Vec<NodeIndex> {
    let n = ring.len();
    let start = ring.atoms.iter().position(|&a| a == from).unwrap_or(0);
    for dir in [1isize, -1] {
        let mut path = Vec::new();
        let mut i = start as isize;
        let mut ok = true;
        loop {
            i = (i + dir).rem_euclid(n as isize);
            let atom = ring.atoms[i as usize];
            if atom == to {
                break;
            }
            if exclude.contains(&atom) {
                ok = false;
                break;
            }
            path.push(atom);
        }
        if ok {
            return path;
        }
    }
    Vec::new()
}

/// Ring atoms reordered to start at `start`, preserving cycle direction.
fn rotate_ring_to(ring: &Ring, start: NodeIndex) -> Vec<NodeIndex> {
    let n = ring.len();
    let at = ring.atoms.iter().position(|&a| a == start).unwrap_or(0);
    (0..n).map(|i| ring.atoms[(at + i) % n]).collect()
}

/// Ring atoms from `a` to `b` inclusive, walking the longer way around (the
/// side holding the unplaced body of the ring).
fn ring_path_between(ring: &Ring, a: NodeIndex, b: NodeIndex) -> Vec<NodeIndex> {
    let n = ring.len();
    let ia = ring.atoms.iter().position(|&x| x == a).unwrap_or(0);
    let ib = ring.atoms.iter().position(|&x| x == b).unwrap_or(0);

    let forward_len = (ib + n - ia) % n;
    let backward_len = n - forward_len;
    let (dir, len) = if forward_len >= backward_len {
        (1isize, forward_len)
    } else {
        (-1isize, backward_len)
    };

    let mut path = Vec::with_capacity(len + 1);
    let mut i = ia as isize;
    path.push(a);
    for _ in 0..len {
        i = (i + dir).rem_euclid(n as isize);
        path.push(ring.atoms[i as usize]);
    }
    path
}

/// Turn direction (+1 ccw / −1 cw) for an arc of `span` radians from
/// `theta_a` that should end at `theta_b`.
fn arc_sign(theta_a: f64, theta_b: f64, span: f64) -> f64 {
    let wrap = |x: f64| {
        let two_pi = 2.0 * PI;
        ((x % two_pi) + two_pi) % two_pi
    };
    let ccw_end = wrap(theta_a + span);
    let cw_end = wrap(theta_a - span);
    let target = wrap(theta_b);
    let diff = |x: f64| {
        let d = (x - target).abs();
        d.min(2.0 * PI - d)
    };
    if diff(ccw_end) <= diff(cw_end) {
        1.0
    } else {
        -1.0
    }
}

/// Places every unplaced non-ring neighbor of the ring's atoms, spreading
/// them evenly through the angular gap that faces away from the ring center.
pub fn place_ring_substituents(mol: &mut Mol, ring: &Ring, bond_length: f64) -> Vec<NodeIndex> {
    let center = ring.center(mol);
    let mut placed = Vec::new();

    for &ring_atom in &ring.atoms {
        let Some(origin) = mol.position(ring_atom) else {
            continue;
        };
        let subs: Vec<NodeIndex> = mol
            .neighbors(ring_atom)
            .filter(|&nb| !ring.contains_atom(nb) && mol.position(nb).is_none())
            .collect();
        if subs.is_empty() {
            continue;
        }

        let outward = center.angle_to(origin);
        let count = subs.len();
        // Fan out symmetrically around the outward direction, 60° apart.
        let spread = PI / 3.0;
        for (i, &sub) in subs.iter().enumerate() {
            let offset = (i as f64 - (count - 1) as f64 / 2.0) * spread;
            let angle = outward + offset;
            mol.set_position(sub, origin + Point::polar(angle) * bond_length);
            placed.push(sub);
        }
    }
    placed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecule::{Atom, Bond};
    use crate::rings::elementary_cycles;

    const L: f64 = 1.5;

    fn ring_mol(size: usize) -> (Mol, Ring) {
        let mut mol = Mol::new();
        let atoms: Vec<NodeIndex> = (0..size).map(|_| mol.add_atom(Atom::carbon())).collect();
        for i in 0..size {
            mol.add_bond(atoms[i], atoms[(i + 1) % size], Bond::default());
        }
        let ring = elementary_cycles(&mol).remove(0);
        (mol, ring)
    }

    #[test]
    fn radius_formula_holds_for_small_rings() {
        for n in 3..=8 {
            let expected = L / (2.0 * (PI / n as f64).sin());
            assert!((ring_radius(L, n) - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn standalone_polygon_has_uniform_bond_lengths() {
        for size in [3, 4, 5, 6, 7, 8] {
            let (mut mol, ring) = ring_mol(size);
            place_ring(&mut mol, &ring, &[], Point::ZERO, Point::new(1.0, 0.0), L);
            for i in 0..size {
                let a = mol.position(ring.atoms[i]).unwrap();
                let b = mol.position(ring.atoms[(i + 1) % size]).unwrap();
                assert!(
                    (a.distance(b) - L).abs() < 1e-6,
                    "size {}: bond {} length {}",
                    size,
                    i,
                    a.distance(b)
                );
            }
        }
    }

    #[test]
    fn spiro_ring_keeps_anchor_on_circle() {
        let (mut mol, ring) = ring_mol(5);
        let anchor = ring.atoms[0];
        mol.set_position(anchor, Point::new(2.0, 1.0));
        place_ring(
            &mut mol,
            &ring,
            &[anchor],
            Point::new(2.0, 1.0),
            Point::new(1.0, 0.0),
            L,
        );
        // All atoms placed, ring bonds uniform.
        for i in 0..5 {
            let a = mol.position(ring.atoms[i]).unwrap();
            let b = mol.position(ring.atoms[(i + 1) % 5]).unwrap();
            assert!((a.distance(b) - L).abs() < 1e-6);
        }
        // Anchor untouched.
        assert_eq!(mol.position(anchor), Some(Point::new(2.0, 1.0)));
    }

    #[test]
    fn fused_ring_preserves_shared_bond() {
        let (mut mol, ring) = ring_mol(6);
        let a = ring.atoms[0];
        let b = ring.atoms[1];
        let pa = Point::new(0.0, 0.0);
        let pb = Point::new(L, 0.0);
        mol.set_position(a, pa);
        mol.set_position(b, pb);
        place_ring(
            &mut mol,
            &ring,
            &[a, b],
            (pa + pb) * 0.5,
            Point::new(0.0, 1.0),
            L,
        );
        assert_eq!(mol.position(a), Some(pa));
        assert_eq!(mol.position(b), Some(pb));
        for i in 0..6 {
            let p = mol.position(ring.atoms[i]).unwrap();
            let q = mol.position(ring.atoms[(i + 1) % 6]).unwrap();
            assert!(
                (p.distance(q) - L).abs() < 1e-6,
                "bond {} length {}",
                i,
                p.distance(q)
            );
        }
        // The ring body grew upward, as requested.
        let body_y: f64 = ring
            .atoms
            .iter()
            .skip(2)
            .map(|&x| mol.position(x).unwrap().y)
            .sum();
        assert!(body_y > 0.0);
    }

    #[test]
    fn bridged_fallback_leaves_placed_atoms_alone() {
        // Three placed atoms alternating around the ring give no clean
        // bridgehead pair; the fallback must fill the gaps without moving
        // them.
        let (mut mol, ring) = ring_mol(6);
        let fixed = [ring.atoms[0], ring.atoms[2], ring.atoms[4]];
        let spots = [
            Point::new(0.0, 0.0),
            Point::new(1.8, 0.2),
            Point::new(0.9, 1.9),
        ];
        for (&a, &p) in fixed.iter().zip(spots.iter()) {
            mol.set_position(a, p);
        }

        place_ring(&mut mol, &ring, &fixed, Point::ZERO, Point::new(1.0, 0.0), L);

        for (&a, &p) in fixed.iter().zip(spots.iter()) {
            assert_eq!(mol.position(a), Some(p), "pinned atom moved");
        }
        for &a in &ring.atoms {
            assert!(mol.position(a).is_some());
        }
    }

    #[test]
    fn substituents_point_away_from_ring() {
        let (mut mol, ring) = ring_mol(6);
        place_ring(&mut mol, &ring, &[], Point::ZERO, Point::new(1.0, 0.0), L);
        let sub = mol.add_atom(Atom::of(17));
        mol.add_bond(ring.atoms[0], sub, Bond::default());

        let placed = place_ring_substituents(&mut mol, &ring, L);
        assert_eq!(placed, vec![sub]);

        let origin = mol.position(ring.atoms[0]).unwrap();
        let p = mol.position(sub).unwrap();
        assert!((origin.distance(p) - L).abs() < 1e-9);
        // Farther from the ring center than its attachment atom.
        let center = ring.center(&mol);
        assert!(center.distance(p) > center.distance(origin));
    }
}
