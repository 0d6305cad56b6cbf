//! Canonical atom ordering and the structural fingerprints that key the
//! template store.
//!
//! Ordering works on Morgan-refined invariant ranks: each atom starts from a
//! hash of its local invariant, ranks are iteratively sharpened with sorted
//! neighbor ranks, and remaining ties are broken by deterministic promotion.
//! Fingerprints are emitted at three specificity levels so a query can fall
//! back from an exact substituted match to a bare or fully anonymized
//! skeleton.

use std::hash::{Hash, Hasher};

use petgraph::graph::NodeIndex;

use crate::molecule::{BondOrder, Mol};

struct Fnv1aHasher(u64);

impl Fnv1aHasher {
    fn new() -> Self {
        Self(0xcbf29ce484222325)
    }
}

impl Hasher for Fnv1aHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(0x100000001b3);
        }
    }
}

/// How much atom identity a fingerprint retains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Specificity {
    /// Elements, charges, and substituent stubs (degrees) all included.
    Substituted,
    /// Elements and connectivity only.
    Skeleton,
    /// Connectivity only; every atom is an anonymous vertex.
    Anonymous,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct AtomInvariant {
    atomic_num: u8,
    formal_charge: i8,
    hydrogen_count: u8,
    degree: u8,
    singles: u8,
    doubles: u8,
    triples: u8,
    aromatics: u8,
}

fn atom_invariant(mol: &Mol, idx: NodeIndex, level: Specificity) -> AtomInvariant {
    let atom = mol.atom(idx);
    let degree = mol.degree(idx) as u8;

    let mut inv = AtomInvariant {
        atomic_num: 0,
        formal_charge: 0,
        hydrogen_count: 0,
        degree,
        singles: 0,
        doubles: 0,
        triples: 0,
        aromatics: 0,
    };
    if level == Specificity::Anonymous {
        return inv;
    }
    inv.atomic_num = atom.atomic_num;
    if level == Specificity::Skeleton {
        return inv;
    }
    inv.formal_charge = atom.formal_charge;
    inv.hydrogen_count = atom.hydrogen_count;
    for bond in mol.bonds_of(idx) {
        match mol.bond(bond).order {
            BondOrder::Single => inv.singles += 1,
            BondOrder::Double => inv.doubles += 1,
            BondOrder::Triple => inv.triples += 1,
            BondOrder::Aromatic => inv.aromatics += 1,
        }
    }
    inv
}

fn hash_invariant(inv: &AtomInvariant) -> u64 {
    let mut h = Fnv1aHasher::new();
    inv.hash(&mut h);
    h.finish()
}

fn ranks_from_values(values: &[u64]) -> Vec<usize> {
    let n = values.len();
    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by_key(|&i| values[i]);
    let mut ranks = vec![0usize; n];
    if n == 0 {
        return ranks;
    }
    ranks[indices[0]] = 0;
    for i in 1..n {
        ranks[indices[i]] = if values[indices[i]] == values[indices[i - 1]] {
            ranks[indices[i - 1]]
        } else {
            i
        };
    }
    ranks
}

fn count_distinct(ranks: &[usize]) -> usize {
    let mut sorted: Vec<usize> = ranks.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.len()
}

fn morgan_refine(mol: &Mol, ranks: &mut Vec<usize>) {
    let n = mol.atom_count();
    let mut prev_distinct = count_distinct(ranks);

    loop {
        let mut new_values = vec![0u64; n];
        for node in mol.atoms() {
            let i = node.index();
            let mut neighbor_ranks: Vec<usize> =
                mol.neighbors(node).map(|nb| ranks[nb.index()]).collect();
            neighbor_ranks.sort_unstable();

            let mut h = Fnv1aHasher::new();
            ranks[i].hash(&mut h);
            neighbor_ranks.hash(&mut h);
            new_values[i] = h.finish();
        }
        let new_ranks = ranks_from_values(&new_values);
        let distinct = count_distinct(&new_ranks);
        if distinct <= prev_distinct {
            return;
        }
        *ranks = new_ranks;
        prev_distinct = distinct;
    }
}

fn break_ties(mol: &Mol, ranks: &mut Vec<usize>, invariants: &[AtomInvariant]) {
    let n = ranks.len();

    loop {
        if count_distinct(ranks) == n {
            return;
        }

        let mut counts = std::collections::HashMap::new();
        for &r in ranks.iter() {
            *counts.entry(r).or_insert(0usize) += 1;
        }
        let min_tied_rank = counts
            .into_iter()
            .filter(|&(_, count)| count > 1)
            .map(|(rank, _)| rank)
            .min()
            .unwrap();

        let tied_atoms: Vec<usize> = (0..n).filter(|&i| ranks[i] == min_tied_rank).collect();
        let max_rank = *ranks.iter().max().unwrap();

        // Promote each tied atom in turn and keep whichever promotion yields
        // the lexicographically smallest invariant trace, so the outcome does
        // not depend on input atom numbering.
        let mut best_trace: Option<Vec<u64>> = None;
        let mut best_ranks: Option<Vec<usize>> = None;

        for &candidate in &tied_atoms {
            let mut trial = ranks.clone();
            trial[candidate] = max_rank + 1;
            morgan_refine(mol, &mut trial);

            let mut indexed: Vec<(usize, usize)> = trial.iter().copied().enumerate().collect();
            indexed.sort_by_key(|&(_, r)| r);
            let trace: Vec<u64> = indexed
                .iter()
                .map(|&(atom_i, _)| {
                    let mut h = Fnv1aHasher::new();
                    invariants[atom_i].hash(&mut h);
                    let mut nb_ranks: Vec<usize> = mol
                        .neighbors(NodeIndex::new(atom_i))
                        .map(|nb| trial[nb.index()])
                        .collect();
                    nb_ranks.sort_unstable();
                    nb_ranks.hash(&mut h);
                    h.finish()
                })
                .collect();
            if best_trace.as_ref().map_or(true, |best| trace < *best) {
                best_trace = Some(trace);
                best_ranks = Some(trial);
            }
        }

        *ranks = best_ranks.unwrap();
    }
}

/// Canonical rank of every atom (0-based, dense, all distinct).
///
/// The rank vector is indexed by atom index; `ranks[i]` is atom `i`'s position
/// in the canonical ordering at the given specificity level.
pub fn canonical_ranks(mol: &Mol, level: Specificity) -> Vec<usize> {
    let n = mol.atom_count();
    if n == 0 {
        return Vec::new();
    }

    let invariants: Vec<AtomInvariant> = (0..n)
        .map(|i| atom_invariant(mol, NodeIndex::new(i), level))
        .collect();

    let initial_values: Vec<u64> = invariants.iter().map(hash_invariant).collect();
    let mut ranks = ranks_from_values(&initial_values);

    morgan_refine(mol, &mut ranks);

    if count_distinct(&ranks) < n {
        break_ties(mol, &mut ranks, &invariants);
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by_key(|&i| ranks[i]);
    let mut final_ranks = vec![0usize; n];
    for (rank, &atom_idx) in indices.iter().enumerate() {
        final_ranks[atom_idx] = rank;
    }
    final_ranks
}

/// Canonical fingerprint string plus the rank vector that produced it.
///
/// Implicit hydrogen counts on heavy atoms are zeroed for the duration of the
/// computation so tautomers that differ only in H placement collide, and are
/// restored before returning on every path.
pub fn fingerprint(mol: &mut Mol, level: Specificity) -> (String, Vec<usize>) {
    let saved: Vec<(NodeIndex, u8)> = mol
        .atoms()
        .filter(|&a| mol.atom(a).atomic_num > 1)
        .map(|a| (a, mol.atom(a).hydrogen_count))
        .collect();
    for &(a, _) in &saved {
        mol.atom_mut(a).hydrogen_count = 0;
    }

    let result = fingerprint_inner(mol, level);

    for &(a, h) in &saved {
        mol.atom_mut(a).hydrogen_count = h;
    }
    result
}

fn fingerprint_inner(mol: &Mol, level: Specificity) -> (String, Vec<usize>) {
    let ranks = canonical_ranks(mol, level);
    let n = mol.atom_count();

    let mut order: Vec<usize> = vec![0; n];
    for (i, &r) in ranks.iter().enumerate() {
        order[r] = i;
    }

    let mut out = String::new();
    match level {
        Specificity::Substituted => out.push_str("s:"),
        Specificity::Skeleton => out.push_str("k:"),
        Specificity::Anonymous => out.push_str("a:"),
    }

    for (pos, &atom_i) in order.iter().enumerate() {
        if pos > 0 {
            out.push(',');
        }
        let inv = atom_invariant(mol, NodeIndex::new(atom_i), level);
        out.push_str(&inv.atomic_num.to_string());
        if inv.formal_charge != 0 {
            out.push_str(&format!("{:+}", inv.formal_charge));
        }
        out.push('~');
        out.push_str(&inv.degree.to_string());
    }

    let mut bond_codes: Vec<String> = Vec::with_capacity(mol.bond_count());
    for bond in mol.bonds() {
        let Some((a, b)) = mol.bond_endpoints(bond) else {
            continue;
        };
        let (lo, hi) = {
            let (ra, rb) = (ranks[a.index()], ranks[b.index()]);
            if ra < rb {
                (ra, rb)
            } else {
                (rb, ra)
            }
        };
        let order_code = if level == Specificity::Substituted {
            match mol.bond(bond).order {
                BondOrder::Single => '-',
                BondOrder::Double => '=',
                BondOrder::Triple => '#',
                BondOrder::Aromatic => ':',
            }
        } else {
            '-'
        };
        bond_codes.push(format!("{}{}{}", lo, order_code, hi));
    }
    bond_codes.sort();
    out.push(';');
    out.push_str(&bond_codes.join(";"));

    (out, ranks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecule::{Atom, Bond};

    fn chain(mol: &mut Mol, nums: &[u8]) -> Vec<NodeIndex> {
        let atoms: Vec<NodeIndex> = nums.iter().map(|&z| mol.add_atom(Atom::of(z))).collect();
        for w in atoms.windows(2) {
            mol.add_bond(w[0], w[1], Bond::default());
        }
        atoms
    }

    #[test]
    fn ranks_are_dense_and_distinct() {
        let mut mol = Mol::new();
        chain(&mut mol, &[6, 6, 8]);
        let ranks = canonical_ranks(&mol, Specificity::Substituted);
        let mut sorted = ranks.clone();
        sorted.sort();
        assert_eq!(sorted, vec![0, 1, 2]);
    }

    #[test]
    fn fingerprint_invariant_under_renumbering() {
        let mut a = Mol::new();
        chain(&mut a, &[8, 6, 6]);

        let mut b = Mol::new();
        chain(&mut b, &[6, 6, 8]);

        let (fa, _) = fingerprint(&mut a, Specificity::Substituted);
        let (fb, _) = fingerprint(&mut b, Specificity::Substituted);
        assert_eq!(fa, fb);
    }

    #[test]
    fn anonymous_level_erases_elements() {
        let mut a = Mol::new();
        chain(&mut a, &[6, 7, 6]);
        let mut b = Mol::new();
        chain(&mut b, &[6, 6, 6]);

        let (fa, _) = fingerprint(&mut a, Specificity::Anonymous);
        let (fb, _) = fingerprint(&mut b, Specificity::Anonymous);
        assert_eq!(fa, fb);

        let (ka, _) = fingerprint(&mut a, Specificity::Skeleton);
        let (kb, _) = fingerprint(&mut b, Specificity::Skeleton);
        assert_ne!(ka, kb);
    }

    #[test]
    fn hydrogen_counts_restored() {
        let mut mol = Mol::new();
        let c = mol.add_atom(Atom {
            atomic_num: 6,
            hydrogen_count: 3,
            ..Atom::default()
        });
        let o = mol.add_atom(Atom {
            atomic_num: 8,
            hydrogen_count: 1,
            ..Atom::default()
        });
        mol.add_bond(c, o, Bond::default());

        fingerprint(&mut mol, Specificity::Substituted);
        assert_eq!(mol.atom(c).hydrogen_count, 3);
        assert_eq!(mol.atom(o).hydrogen_count, 1);
    }

    #[test]
    fn symmetric_ring_breaks_ties_deterministically() {
        let mut mol = Mol::new();
        let atoms: Vec<NodeIndex> = (0..6).map(|_| mol.add_atom(Atom::carbon())).collect();
        for i in 0..6 {
            mol.add_bond(atoms[i], atoms[(i + 1) % 6], Bond::default());
        }
        let r1 = canonical_ranks(&mol, Specificity::Substituted);
        let r2 = canonical_ranks(&mol, Specificity::Substituted);
        assert_eq!(r1, r2);
        let mut sorted = r1.clone();
        sorted.sort();
        assert_eq!(sorted, (0..6).collect::<Vec<_>>());
    }
}
