use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use crate::geometry::Point;

/// Intrinsic atomic properties of a graph node, as supplied by the caller.
///
/// Everything layout-specific (placement flags, priorities, macrocycle hints)
/// lives in per-run tables keyed by node index, never on the atom itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Atom {
    /// Atomic number (1 = H, 6 = C, 7 = N, …).
    pub atomic_num: u8,
    /// Formal charge in elementary charge units.
    pub formal_charge: i8,
    /// Mass number. `0` means natural isotopic abundance.
    pub isotope: u16,
    /// Number of suppressed (implicit) hydrogens.
    pub hydrogen_count: u8,
    /// Whether the atom is part of an aromatic ring.
    pub is_aromatic: bool,
}

impl Atom {
    pub fn carbon() -> Self {
        Atom {
            atomic_num: 6,
            ..Atom::default()
        }
    }

    pub fn of(atomic_num: u8) -> Self {
        Atom {
            atomic_num,
            ..Atom::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BondOrder {
    #[default]
    Single,
    Double,
    Triple,
    Aromatic,
}

/// Depiction annotation carried by a bond.
///
/// Owned exclusively by the non-planar bond assignment phase, which clears
/// every label before recomputing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BondLabel {
    #[default]
    None,
    /// Solid wedge: the far atom points out of the plane.
    WedgeUp,
    /// Hatched wedge: the far atom points into the plane.
    WedgeDown,
    /// Wavy single bond: configuration deliberately unspecified.
    Wavy,
    /// Crossed double bond: cis/trans geometry unknown.
    Crossed,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bond {
    pub order: BondOrder,
    /// Set during ring perception; ring bonds are never stretched or rotated.
    pub is_ring: bool,
    pub label: BondLabel,
}

impl Bond {
    pub fn of(order: BondOrder) -> Self {
        Bond {
            order,
            ..Bond::default()
        }
    }
}

/// Sense of rotation of a stereo descriptor, as perceived by the upstream
/// chemistry model (typically from 3D coordinates or parsed notation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StereoWinding {
    #[default]
    Unspecified,
    Clockwise,
    Anticlockwise,
}

/// Tetrahedral stereocenter: a focus atom and its ligands in reference order.
///
/// A ligand slot holding the center's own index stands for an implicit
/// hydrogen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TetrahedralStereo {
    pub center: NodeIndex,
    pub ligands: [NodeIndex; 4],
    pub winding: StereoWinding,
}

/// Cumulated (allene-like) stereocenter: the central sp carbon of an even
/// cumulene plus the four peripheral substituents at the two ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CumulatedStereo {
    pub center: NodeIndex,
    pub peripherals: [NodeIndex; 4],
    pub winding: StereoWinding,
}

/// Double-bond configuration descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DoubleBondStereo {
    pub bond: EdgeIndex,
    pub winding: StereoWinding,
}

/// Molecular graph in the form this crate consumes and mutates: connectivity,
/// per-atom optional 2D coordinates, and stereo descriptors.
///
/// The coordinate table is kept in lockstep with the node set; `add_atom`
/// starts every atom without a point.
pub struct Mol {
    graph: UnGraph<Atom, Bond>,
    coords: Vec<Option<Point>>,
    tetrahedral: Vec<TetrahedralStereo>,
    cumulated: Vec<CumulatedStereo>,
    double_bond: Vec<DoubleBondStereo>,
    attachment_bond: Option<EdgeIndex>,
}

impl Mol {
    pub fn new() -> Self {
        Self {
            graph: UnGraph::default(),
            coords: Vec::new(),
            tetrahedral: Vec::new(),
            cumulated: Vec::new(),
            double_bond: Vec::new(),
            attachment_bond: None,
        }
    }

    pub fn graph(&self) -> &UnGraph<Atom, Bond> {
        &self.graph
    }

    pub fn atom(&self, idx: NodeIndex) -> &Atom {
        &self.graph[idx]
    }

    pub fn atom_mut(&mut self, idx: NodeIndex) -> &mut Atom {
        &mut self.graph[idx]
    }

    pub fn bond(&self, idx: EdgeIndex) -> &Bond {
        &self.graph[idx]
    }

    pub fn bond_mut(&mut self, idx: EdgeIndex) -> &mut Bond {
        &mut self.graph[idx]
    }

    pub fn add_atom(&mut self, atom: Atom) -> NodeIndex {
        let idx = self.graph.add_node(atom);
        if self.coords.len() <= idx.index() {
            self.coords.resize(idx.index() + 1, None);
        }
        idx
    }

    pub fn add_bond(&mut self, a: NodeIndex, b: NodeIndex, bond: Bond) -> EdgeIndex {
        self.graph.add_edge(a, b, bond)
    }

    pub fn atom_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn bond_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn atoms(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn bonds(&self) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.graph.edge_indices()
    }

    pub fn neighbors(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors(idx)
    }

    pub fn bonds_of(&self, idx: NodeIndex) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.graph.edges(idx).map(|e| e.id())
    }

    pub fn degree(&self, idx: NodeIndex) -> usize {
        self.graph.neighbors(idx).count()
    }

    pub fn bond_between(&self, a: NodeIndex, b: NodeIndex) -> Option<EdgeIndex> {
        self.graph.find_edge(a, b)
    }

    pub fn bond_endpoints(&self, idx: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(idx)
    }

    /// The endpoint of `bond` that is not `from`.
    pub fn other_end(&self, bond: EdgeIndex, from: NodeIndex) -> Option<NodeIndex> {
        let (a, b) = self.graph.edge_endpoints(bond)?;
        if a == from {
            Some(b)
        } else if b == from {
            Some(a)
        } else {
            None
        }
    }

    pub fn position(&self, idx: NodeIndex) -> Option<Point> {
        self.coords.get(idx.index()).copied().flatten()
    }

    pub fn set_position(&mut self, idx: NodeIndex, p: Point) {
        if self.coords.len() <= idx.index() {
            self.coords.resize(idx.index() + 1, None);
        }
        self.coords[idx.index()] = Some(p);
    }

    /// Drops every stored 2D point. Called at the start of a generation run.
    pub fn clear_positions(&mut self) {
        for c in &mut self.coords {
            *c = None;
        }
    }

    pub fn tetrahedral_stereo(&self) -> &[TetrahedralStereo] {
        &self.tetrahedral
    }

    pub fn add_tetrahedral_stereo(&mut self, stereo: TetrahedralStereo) {
        self.tetrahedral.push(stereo);
    }

    pub fn tetrahedral_stereo_for(&self, center: NodeIndex) -> Option<&TetrahedralStereo> {
        self.tetrahedral.iter().find(|s| s.center == center)
    }

    pub fn cumulated_stereo(&self) -> &[CumulatedStereo] {
        &self.cumulated
    }

    pub fn add_cumulated_stereo(&mut self, stereo: CumulatedStereo) {
        self.cumulated.push(stereo);
    }

    pub fn double_bond_stereo(&self) -> &[DoubleBondStereo] {
        &self.double_bond
    }

    pub fn add_double_bond_stereo(&mut self, stereo: DoubleBondStereo) {
        self.double_bond.push(stereo);
    }

    /// Designates the bond through which this structure attaches to a parent
    /// context (an R-group stub, a polymer backbone). When set, the final
    /// orientation lays this bond horizontally instead of maximizing width.
    pub fn set_attachment_bond(&mut self, bond: Option<EdgeIndex>) {
        self.attachment_bond = bond;
    }

    pub fn attachment_bond(&self) -> Option<EdgeIndex> {
        self.attachment_bond
    }

    /// True when `idx` appears as the focus of any stereo descriptor.
    pub fn is_stereocenter(&self, idx: NodeIndex) -> bool {
        self.tetrahedral.iter().any(|s| s.center == idx)
            || self.cumulated.iter().any(|s| s.center == idx)
    }
}

impl Default for Mol {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Mol {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            coords: self.coords.clone(),
            tetrahedral: self.tetrahedral.clone(),
            cumulated: self.cumulated.clone(),
            double_bond: self.double_bond.clone(),
            attachment_bond: self.attachment_bond,
        }
    }
}

impl std::fmt::Debug for Mol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mol")
            .field("atom_count", &self.atom_count())
            .field("bond_count", &self.bond_count())
            .field("tetrahedral", &self.tetrahedral)
            .field("cumulated", &self.cumulated)
            .field("double_bond", &self.double_bond)
            .finish()
    }
}

/// Whether mapping `from` onto `to` is an even permutation.
pub(crate) fn permutation_parity<T: Eq>(from: &[T], to: &[T]) -> bool {
    let n = from.len();
    if n != to.len() {
        return true;
    }
    let perm: Vec<usize> = from
        .iter()
        .map(|f| to.iter().position(|t| t == f).unwrap_or(0))
        .collect();
    let mut visited = vec![false; n];
    let mut swaps = 0usize;
    for i in 0..n {
        if visited[i] {
            continue;
        }
        let mut cycle_len = 0;
        let mut j = i;
        while !visited[j] {
            visited[j] = true;
            j = perm[j];
            cycle_len += 1;
        }
        swaps += cycle_len - 1;
    }
    swaps % 2 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_track_atoms() {
        let mut mol = Mol::new();
        let a = mol.add_atom(Atom::carbon());
        let b = mol.add_atom(Atom::carbon());
        assert_eq!(mol.position(a), None);
        mol.set_position(a, Point::new(1.0, 2.0));
        assert_eq!(mol.position(a), Some(Point::new(1.0, 2.0)));
        assert_eq!(mol.position(b), None);
        mol.clear_positions();
        assert_eq!(mol.position(a), None);
    }

    #[test]
    fn other_end_resolves_both_directions() {
        let mut mol = Mol::new();
        let a = mol.add_atom(Atom::carbon());
        let b = mol.add_atom(Atom::of(8));
        let e = mol.add_bond(a, b, Bond::default());
        assert_eq!(mol.other_end(e, a), Some(b));
        assert_eq!(mol.other_end(e, b), Some(a));
    }

    #[test]
    fn parity_of_swap_is_odd() {
        assert!(permutation_parity(&[1, 2, 3, 4], &[1, 2, 3, 4]));
        assert!(!permutation_parity(&[1, 2, 3, 4], &[2, 1, 3, 4]));
        assert!(permutation_parity(&[1, 2, 3, 4], &[2, 1, 4, 3]));
    }
}
