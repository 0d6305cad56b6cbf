//! Subgraph matching for special-group finalization.
//!
//! Patterns are small connected [`Mol`]s. Matching is a backtracking walk:
//! pattern atoms are visited in breadth-first order so every atom after the
//! first is constrained by an already-mapped neighbor, and a candidate target
//! atom must satisfy the caller's atom matcher plus every pattern bond into
//! the mapped region, bond order included.

use std::collections::VecDeque;

use petgraph::graph::NodeIndex;

use crate::molecule::{Atom, Mol};

/// All injective mappings of `pattern` into `target`. In each returned
/// mapping, slot `i` holds the target atom matched to pattern atom `i`.
/// `matcher` decides atom compatibility and receives the pattern atom first.
pub fn find_all_mappings(
    pattern: &Mol,
    target: &Mol,
    matcher: &dyn Fn(&Atom, &Atom) -> bool,
) -> Vec<Vec<NodeIndex>> {
    let np = pattern.atom_count();
    if np == 0 || np > target.atom_count() {
        return Vec::new();
    }

    let order = bfs_order(pattern);
    let mut mappings = Vec::new();
    let mut assigned: Vec<Option<NodeIndex>> = vec![None; np];
    let mut used = vec![false; target.atom_count()];
    extend(
        pattern,
        target,
        matcher,
        &order,
        0,
        &mut assigned,
        &mut used,
        &mut mappings,
    );
    mappings
}

/// Pattern atoms in breadth-first order from atom 0, ties by index.
fn bfs_order(pattern: &Mol) -> Vec<NodeIndex> {
    let np = pattern.atom_count();
    let mut seen = vec![false; np];
    let mut order = Vec::with_capacity(np);
    for start in pattern.atoms() {
        if seen[start.index()] {
            continue;
        }
        seen[start.index()] = true;
        let mut queue = VecDeque::from([start]);
        while let Some(a) = queue.pop_front() {
            order.push(a);
            let mut nbs: Vec<NodeIndex> = pattern
                .neighbors(a)
                .filter(|nb| !seen[nb.index()])
                .collect();
            nbs.sort_by_key(|nb| nb.index());
            for nb in nbs {
                seen[nb.index()] = true;
                queue.push_back(nb);
            }
        }
    }
    order
}

#[allow(clippy::too_many_arguments)]
fn extend(
    pattern: &Mol,
    target: &Mol,
    matcher: &dyn Fn(&Atom, &Atom) -> bool,
    order: &[NodeIndex],
    depth: usize,
    assigned: &mut Vec<Option<NodeIndex>>,
    used: &mut Vec<bool>,
    mappings: &mut Vec<Vec<NodeIndex>>,
) {
    if depth == order.len() {
        mappings.push(assigned.iter().filter_map(|&a| a).collect());
        return;
    }

    let p = order[depth];
    // After the first pattern atom, some neighbor is always mapped already
    // (BFS order), so candidates come from its image's neighborhood.
    let anchor = pattern.neighbors(p).find_map(|q| assigned[q.index()]);
    let candidates: Vec<NodeIndex> = match anchor {
        Some(tq) => target.neighbors(tq).collect(),
        None => target.atoms().collect(),
    };

    for t in candidates {
        if used[t.index()] || !matcher(pattern.atom(p), target.atom(t)) {
            continue;
        }
        if !bonds_compatible(pattern, target, p, t, assigned) {
            continue;
        }
        assigned[p.index()] = Some(t);
        used[t.index()] = true;
        extend(pattern, target, matcher, order, depth + 1, assigned, used, mappings);
        used[t.index()] = false;
        assigned[p.index()] = None;
    }
}

/// Every pattern bond from `p` into the mapped region must exist in the
/// target with the same order.
fn bonds_compatible(
    pattern: &Mol,
    target: &Mol,
    p: NodeIndex,
    t: NodeIndex,
    assigned: &[Option<NodeIndex>],
) -> bool {
    for b in pattern.bonds_of(p) {
        let Some(q) = pattern.other_end(b, p) else {
            continue;
        };
        let Some(tq) = assigned[q.index()] else {
            continue;
        };
        match target.bond_between(t, tq) {
            Some(tb) if target.bond(tb).order == pattern.bond(b).order => {}
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecule::{Bond, BondOrder};

    fn by_element(p: &Atom, t: &Atom) -> bool {
        p.atomic_num == t.atomic_num
    }

    fn chain(nums: &[u8]) -> Mol {
        let mut mol = Mol::new();
        let atoms: Vec<NodeIndex> = nums.iter().map(|&z| mol.add_atom(Atom::of(z))).collect();
        for w in atoms.windows(2) {
            mol.add_bond(w[0], w[1], Bond::default());
        }
        mol
    }

    #[test]
    fn edge_pattern_finds_every_embedding() {
        // A C-C pattern in propane: two bonds, each matchable both ways round.
        let pattern = chain(&[6, 6]);
        let target = chain(&[6, 6, 6]);
        let hits = find_all_mappings(&pattern, &target, &by_element);
        assert_eq!(hits.len(), 4);
        for hit in &hits {
            assert!(target.bond_between(hit[0], hit[1]).is_some());
        }
    }

    #[test]
    fn bond_order_must_match() {
        let mut pattern = chain(&[6, 8]);
        let e = pattern.bond_between(NodeIndex::new(0), NodeIndex::new(1)).unwrap();
        pattern.bond_mut(e).order = BondOrder::Double;

        let single_target = chain(&[6, 8]);
        assert!(find_all_mappings(&pattern, &single_target, &by_element).is_empty());

        let mut double_target = chain(&[6, 8]);
        let t = double_target
            .bond_between(NodeIndex::new(0), NodeIndex::new(1))
            .unwrap();
        double_target.bond_mut(t).order = BondOrder::Double;
        assert_eq!(find_all_mappings(&pattern, &double_target, &by_element).len(), 1);
    }

    #[test]
    fn branched_pattern_matches_once() {
        // A carboxyl fork in a longer chain pins the central carbon.
        let mut pattern = Mol::new();
        let c = pattern.add_atom(Atom::carbon());
        let o1 = pattern.add_atom(Atom::of(8));
        let o2 = pattern.add_atom(Atom::of(8));
        pattern.add_bond(c, o1, Bond::of(BondOrder::Double));
        pattern.add_bond(c, o2, Bond::default());

        let mut target = chain(&[6, 6]);
        let head = NodeIndex::new(1);
        let to1 = target.add_atom(Atom::of(8));
        let to2 = target.add_atom(Atom::of(8));
        target.add_bond(head, to1, Bond::of(BondOrder::Double));
        target.add_bond(head, to2, Bond::default());

        let hits = find_all_mappings(&pattern, &target, &by_element);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0][0], head);
        assert_eq!(hits[0][1], to1);
        assert_eq!(hits[0][2], to2);
    }

    #[test]
    fn oversized_pattern_never_matches() {
        let pattern = chain(&[6, 6, 6]);
        let target = chain(&[6, 6]);
        assert!(find_all_mappings(&pattern, &target, &by_element).is_empty());
    }
}
