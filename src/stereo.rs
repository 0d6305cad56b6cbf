//! Non-planar bond assignment: turning stereo descriptors into wedge, hatch,
//! wavy, and crossed bond labels once 2D placement is final.
//!
//! All labels are cleared and recomputed, so running the phase twice on
//! unchanged geometry yields identical output.

use std::collections::VecDeque;

use petgraph::graph::{EdgeIndex, NodeIndex};

use crate::error::DepictError;
use crate::geometry::Point;
use crate::molecule::{
    permutation_parity, BondLabel, BondOrder, Mol, StereoWinding,
};

/// Assigns depiction labels for every stereo descriptor on the molecule.
///
/// Tetrahedral centers are processed in decreasing order of adjacent
/// stereocenter count so that two neighboring centers do not compete for the
/// same bond, then cumulated centers, then double bonds without resolved
/// geometry.
pub fn assign_nonplanar_bonds(mol: &mut Mol) -> Result<(), DepictError> {
    clear_labels(mol);

    let mut tetra: Vec<usize> = (0..mol.tetrahedral_stereo().len()).collect();
    tetra.sort_by_key(|&i| {
        let center = mol.tetrahedral_stereo()[i].center;
        let adjacent = mol
            .neighbors(center)
            .filter(|&nb| mol.is_stereocenter(nb))
            .count();
        std::cmp::Reverse(adjacent)
    });

    for i in tetra {
        let stereo = mol.tetrahedral_stereo()[i];
        if stereo.winding == StereoWinding::Unspecified {
            continue;
        }
        let ligands: Vec<NodeIndex> = stereo
            .ligands
            .iter()
            .copied()
            .filter(|&l| l != stereo.center)
            .collect();
        label_center(mol, stereo.center, &ligands, stereo.winding)?;
    }

    for i in 0..mol.cumulated_stereo().len() {
        let stereo = mol.cumulated_stereo()[i];
        if stereo.winding == StereoWinding::Unspecified {
            continue;
        }
        // An allene's wedge goes on one of the four peripheral bonds; the
        // peripheral atoms play the role of the ligands, anchored at the
        // nearer end of the cumulated axis.
        label_cumulated(mol, &stereo)?;
    }

    for i in 0..mol.double_bond_stereo().len() {
        let stereo = mol.double_bond_stereo()[i];
        if stereo.winding != StereoWinding::Unspecified {
            continue;
        }
        mark_unspecified_double_bond(mol, stereo.bond);
    }

    Ok(())
}

fn clear_labels(mol: &mut Mol) {
    let bonds: Vec<EdgeIndex> = mol.bonds().collect();
    for bond in bonds {
        mol.bond_mut(bond).label = BondLabel::None;
    }
}

/// Chooses the bond to carry the wedge for one center and sets its label.
fn label_center(
    mol: &mut Mol,
    center: NodeIndex,
    ligands: &[NodeIndex],
    winding: StereoWinding,
) -> Result<(), DepictError> {
    let center_pos = mol
        .position(center)
        .ok_or(DepictError::MissingCoordinates {
            atom: center.index(),
        })?;

    let chosen = choose_label_bond(mol, center)?;
    let chosen_neighbor = mol
        .other_end(chosen, center)
        .ok_or(DepictError::UndepictableStereo {
            atom: center.index(),
        })?;

    let up = wedge_points_up(mol, center_pos, ligands, chosen_neighbor, winding)?;
    mol.bond_mut(chosen).label = if up {
        BondLabel::WedgeUp
    } else {
        BondLabel::WedgeDown
    };
    Ok(())
}

fn label_cumulated(mol: &mut Mol, stereo: &crate::molecule::CumulatedStereo) -> Result<(), DepictError> {
    let center_pos = mol
        .position(stereo.center)
        .ok_or(DepictError::MissingCoordinates {
            atom: stereo.center.index(),
        })?;
    let peripherals: Vec<NodeIndex> = stereo.peripherals.to_vec();

    // The label goes on a bond from an axis end to a peripheral atom; pick
    // via the axis end adjacent to an eligible peripheral bond.
    let mut candidate: Option<(EdgeIndex, NodeIndex)> = None;
    let mut anchors: Vec<NodeIndex> = mol.neighbors(stereo.center).collect();
    anchors.sort_by_key(|a| a.index());
    'outer: for anchor in anchors {
        let mut bonds: Vec<EdgeIndex> = eligible_bonds(mol, anchor);
        sort_candidates(mol, anchor, &mut bonds);
        for bond in bonds {
            if let Some(nb) = mol.other_end(bond, anchor) {
                if peripherals.contains(&nb) {
                    candidate = Some((bond, nb));
                    break 'outer;
                }
            }
        }
    }
    let (bond, neighbor) = candidate.ok_or(DepictError::UndepictableStereo {
        atom: stereo.center.index(),
    })?;

    let up = wedge_points_up(mol, center_pos, &peripherals, neighbor, stereo.winding)?;
    mol.bond_mut(bond).label = if up {
        BondLabel::WedgeUp
    } else {
        BondLabel::WedgeDown
    };
    Ok(())
}

/// Eligible wedge carriers: unlabeled single bonds at `center`.
fn eligible_bonds(mol: &Mol, center: NodeIndex) -> Vec<EdgeIndex> {
    mol.bonds_of(center)
        .filter(|&b| {
            let bond = mol.bond(b);
            bond.order == BondOrder::Single && bond.label == BondLabel::None
        })
        .collect()
}

/// Candidate priority: a neighbor that is not itself a stereocenter, then an
/// acyclic bond, then a more terminal (lower-degree) neighbor, then a lower
/// atomic number.
fn sort_candidates(mol: &Mol, center: NodeIndex, bonds: &mut Vec<EdgeIndex>) {
    bonds.sort_by_key(|&b| {
        let nb = mol.other_end(b, center).unwrap_or(center);
        (
            mol.is_stereocenter(nb),
            mol.bond(b).is_ring,
            mol.degree(nb),
            mol.atom(nb).atomic_num,
            b.index(),
        )
    });
}

fn choose_label_bond(mol: &Mol, center: NodeIndex) -> Result<EdgeIndex, DepictError> {
    let mut bonds = eligible_bonds(mol, center);
    if bonds.is_empty() {
        return Err(DepictError::UndepictableStereo {
            atom: center.index(),
        });
    }
    sort_candidates(mol, center, &mut bonds);
    Ok(bonds[0])
}

/// Decides wedge direction from the descriptor winding and the parity
/// between the reference ligand order and the clockwise angular order the
/// final layout produces around the center.
fn wedge_points_up(
    mol: &Mol,
    center_pos: Point,
    reference: &[NodeIndex],
    carrier: NodeIndex,
    winding: StereoWinding,
) -> Result<bool, DepictError> {
    let mut angular: Vec<(f64, NodeIndex)> = Vec::with_capacity(reference.len());
    for &lig in reference {
        let p = mol.position(lig).ok_or(DepictError::MissingCoordinates {
            atom: lig.index(),
        })?;
        // Negated angle sorts clockwise.
        angular.push((-center_pos.angle_to(p), lig));
    }
    angular.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let clockwise: Vec<NodeIndex> = angular.into_iter().map(|(_, l)| l).collect();

    let even = permutation_parity(reference, &clockwise);
    // The carrier leaving the plane flips perceived handedness when it sits
    // in an odd slot of the reference order.
    let carrier_odd = reference
        .iter()
        .position(|&l| l == carrier)
        .map(|i| i % 2 == 1)
        .unwrap_or(false);

    let up = match winding {
        StereoWinding::Clockwise => even,
        StereoWinding::Anticlockwise => !even,
        StereoWinding::Unspecified => true,
    };
    Ok(up ^ carrier_odd)
}

/// Wavy-or-crossed handling for a double bond with no stored configuration.
fn mark_unspecified_double_bond(mol: &mut Mol, bond: EdgeIndex) {
    let Some((u, v)) = mol.bond_endpoints(bond) else {
        return;
    };

    // Ends with their own double bonds draw their geometry elsewhere.
    let only_singles = |end: NodeIndex| {
        mol.bonds_of(end)
            .filter(|&b| b != bond)
            .all(|b| mol.bond(b).order == BondOrder::Single)
    };
    if !only_singles(u) || !only_singles(v) {
        return;
    }

    if ends_symmetric(mol, u, v) {
        mol.bond_mut(bond).label = BondLabel::Crossed;
        return;
    }

    let mut candidates: Vec<(NodeIndex, EdgeIndex)> = Vec::new();
    for end in [u, v] {
        for b in eligible_bonds(mol, end) {
            candidates.push((end, b));
        }
    }
    if let Some(&(_, b)) = candidates.iter().min_by_key(|&&(end, b)| {
        let nb = mol.other_end(b, end).unwrap_or(end);
        (mol.bond(b).is_ring, mol.degree(nb), mol.atom(nb).atomic_num, b.index())
    }) {
        mol.bond_mut(b).label = BondLabel::Wavy;
    } else {
        mol.bond_mut(bond).label = BondLabel::Crossed;
    }
}

/// Lockstep outward walk from each end of the bond (u, v), comparing atom
/// environments level by level. Equal walks mean a wavy bond could not name
/// a distinguishable side, so the ends are considered symmetric.
fn ends_symmetric(mol: &Mol, u: NodeIndex, v: NodeIndex) -> bool {
    let levels_u = walk_levels(mol, u, v);
    let levels_v = walk_levels(mol, v, u);
    levels_u == levels_v
}

type AtomKey = (u8, i8, u16, u8, usize);

fn atom_key(mol: &Mol, idx: NodeIndex) -> AtomKey {
    let atom = mol.atom(idx);
    (
        atom.atomic_num,
        atom.formal_charge,
        atom.isotope,
        atom.hydrogen_count,
        mol.degree(idx),
    )
}

fn walk_levels(mol: &Mol, start: NodeIndex, blocked: NodeIndex) -> Vec<Vec<AtomKey>> {
    let n = mol.atom_count();
    let mut visited = vec![false; n];
    visited[start.index()] = true;
    visited[blocked.index()] = true;

    let mut levels = Vec::new();
    let mut frontier = VecDeque::new();
    frontier.push_back(start);

    while !frontier.is_empty() {
        let mut next = VecDeque::new();
        let mut keys = Vec::new();
        while let Some(atom) = frontier.pop_front() {
            for nb in mol.neighbors(atom) {
                if !visited[nb.index()] {
                    visited[nb.index()] = true;
                    keys.push(atom_key(mol, nb));
                    next.push_back(nb);
                }
            }
        }
        if keys.is_empty() {
            break;
        }
        keys.sort();
        levels.push(keys);
        frontier = next;
    }
    levels
}
