//! Elementary cycles, ring systems, and the partition between them.
//!
//! Ring perception proper is a seam: [`partition_ring_systems`] accepts any
//! caller-supplied cycle set. [`elementary_cycles`] is a bundled
//! smallest-cycle-per-bond perception so the crate works standalone.

use std::collections::VecDeque;

use petgraph::graph::{EdgeIndex, NodeIndex};

use crate::geometry::{centroid, Point};
use crate::molecule::Mol;

/// One elementary cycle: atoms in traversal order plus the bond closing each
/// consecutive pair (bond `i` joins atom `i` and atom `i+1 mod n`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ring {
    pub atoms: Vec<NodeIndex>,
    pub bonds: Vec<EdgeIndex>,
}

impl Ring {
    pub fn from_atom_cycle(mol: &Mol, atoms: Vec<NodeIndex>) -> Option<Self> {
        let n = atoms.len();
        let mut bonds = Vec::with_capacity(n);
        for i in 0..n {
            bonds.push(mol.bond_between(atoms[i], atoms[(i + 1) % n])?);
        }
        Some(Ring { atoms, bonds })
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn contains_atom(&self, idx: NodeIndex) -> bool {
        self.atoms.contains(&idx)
    }

    pub fn contains_bond(&self, idx: EdgeIndex) -> bool {
        self.bonds.contains(&idx)
    }

    /// Center of gravity of the placed ring atoms. Unplaced atoms are skipped.
    pub fn center(&self, mol: &Mol) -> Point {
        let placed: Vec<Point> = self
            .atoms
            .iter()
            .filter_map(|&a| mol.position(a))
            .collect();
        centroid(&placed)
    }

    /// Canonical atom-set key used for deduplication.
    fn atom_key(&self) -> Vec<usize> {
        let mut key: Vec<usize> = self.atoms.iter().map(|a| a.index()).collect();
        key.sort_unstable();
        key
    }
}

/// Finds the smallest cycle through every cyclic bond of the graph.
///
/// For each bond, a breadth-first search from one endpoint to the other with
/// the bond itself removed yields the shortest closing path; distinct atom
/// sets are kept. The result covers every ring bond and contains each fused
/// face of ordinary polycycles once.
pub fn elementary_cycles(mol: &Mol) -> Vec<Ring> {
    let mut rings: Vec<Ring> = Vec::new();
    let mut seen: Vec<Vec<usize>> = Vec::new();

    for edge in mol.bonds() {
        let Some((a, b)) = mol.bond_endpoints(edge) else {
            continue;
        };
        if let Some(path) = shortest_path_avoiding(mol, a, b, edge) {
            if path.len() < 3 {
                continue;
            }
            if let Some(ring) = Ring::from_atom_cycle(mol, path) {
                let key = ring.atom_key();
                if !seen.contains(&key) {
                    seen.push(key);
                    rings.push(ring);
                }
            }
        }
    }

    rings.sort_by_key(Ring::len);
    rings
}

/// BFS shortest path from `from` to `to` that never crosses `forbidden`.
fn shortest_path_avoiding(
    mol: &Mol,
    from: NodeIndex,
    to: NodeIndex,
    forbidden: EdgeIndex,
) -> Option<Vec<NodeIndex>> {
    let n = mol.atom_count();
    let mut pred: Vec<Option<NodeIndex>> = vec![None; n];
    let mut visited = vec![false; n];
    visited[from.index()] = true;
    let mut queue = VecDeque::new();
    queue.push_back(from);

    while let Some(current) = queue.pop_front() {
        for bond in mol.bonds_of(current) {
            if bond == forbidden {
                continue;
            }
            let Some(neighbor) = mol.other_end(bond, current) else {
                continue;
            };
            if visited[neighbor.index()] {
                continue;
            }
            visited[neighbor.index()] = true;
            pred[neighbor.index()] = Some(current);
            if neighbor == to {
                let mut path = vec![to];
                let mut node = to;
                while let Some(p) = pred[node.index()] {
                    path.push(p);
                    node = p;
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back(neighbor);
        }
    }
    None
}

/// Sets the `is_ring` flag on every bond belonging to a perceived cycle and
/// clears it everywhere else.
pub fn mark_ring_bonds(mol: &mut Mol, rings: &[Ring]) {
    let all: Vec<EdgeIndex> = mol.bonds().collect();
    for bond in all {
        mol.bond_mut(bond).is_ring = false;
    }
    for ring in rings {
        for &bond in &ring.bonds {
            mol.bond_mut(bond).is_ring = true;
        }
    }
}

/// A maximal set of rings connected through shared atoms (fused, bridged, or
/// spiro). Ring indices refer to the cycle slice the system was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingSystem {
    pub rings: Vec<usize>,
    pub atoms: Vec<NodeIndex>,
}

impl RingSystem {
    pub fn contains_atom(&self, idx: NodeIndex) -> bool {
        self.atoms.contains(&idx)
    }

    /// Number of distinct bonds across all member rings.
    pub fn bond_count(&self, rings: &[Ring]) -> usize {
        let mut bonds: Vec<EdgeIndex> = self
            .rings
            .iter()
            .flat_map(|&r| rings[r].bonds.iter().copied())
            .collect();
        bonds.sort_unstable();
        bonds.dedup();
        bonds.len()
    }

    /// True when `bond` is part of more than one member ring.
    pub fn bond_is_shared(&self, rings: &[Ring], bond: EdgeIndex) -> bool {
        self.rings
            .iter()
            .filter(|&&r| rings[r].contains_bond(bond))
            .count()
            > 1
    }
}

/// Groups a cycle set into maximal ring systems by union-find over shared
/// atoms.
pub fn partition_ring_systems(mol: &Mol, rings: &[Ring]) -> Vec<RingSystem> {
    let n = rings.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut Vec<usize>, i: usize) -> usize {
        let mut root = i;
        while parent[root] != root {
            root = parent[root];
        }
        let mut node = i;
        while parent[node] != root {
            let next = parent[node];
            parent[node] = root;
            node = next;
        }
        root
    }

    let mut member_of: Vec<Vec<usize>> = vec![Vec::new(); mol.atom_count()];
    for (i, ring) in rings.iter().enumerate() {
        for &atom in &ring.atoms {
            member_of[atom.index()].push(i);
        }
    }
    for members in &member_of {
        for window in members.windows(2) {
            let a = find(&mut parent, window[0]);
            let b = find(&mut parent, window[1]);
            if a != b {
                parent[a] = b;
            }
        }
    }

    let mut systems: Vec<RingSystem> = Vec::new();
    let mut root_to_system: Vec<Option<usize>> = vec![None; n];
    for i in 0..n {
        let root = find(&mut parent, i);
        let slot = match root_to_system[root] {
            Some(s) => s,
            None => {
                systems.push(RingSystem {
                    rings: Vec::new(),
                    atoms: Vec::new(),
                });
                root_to_system[root] = Some(systems.len() - 1);
                systems.len() - 1
            }
        };
        systems[slot].rings.push(i);
        for &atom in &rings[i].atoms {
            if !systems[slot].atoms.contains(&atom) {
                systems[slot].atoms.push(atom);
            }
        }
    }
    systems
}
