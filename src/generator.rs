//! The generation pipeline: ring perception, ring-system placement (identity
//! templates, macrocycle shapes, or polygon construction), acyclic zigzag
//! extension, double-bond geometry correction, fragment tiling, non-planar
//! bond assignment, congestion refinement, and final orientation.

use std::collections::VecDeque;
use std::f64::consts::PI;

use petgraph::graph::NodeIndex;

use crate::error::DepictError;
use crate::fingerprint::{canonical_ranks, Specificity};
use crate::geometry::{centroid, turn, BoundingBox, Point};
use crate::macrocycle::{is_macrocycle, place_macrocycle, MacrocycleTemplates};
use crate::molecule::{Atom, Mol, StereoWinding};
use crate::refiner::{Refiner, DEFAULT_ITERATIONS};
use crate::ring_placer::{place_ring, place_ring_substituents};
use crate::rings::{
    elementary_cycles, mark_ring_bonds, partition_ring_systems, Ring, RingSystem,
};
use crate::stereo::assign_nonplanar_bonds;
use crate::substruct::find_all_mappings;
use crate::template::TemplateStore;

/// Knobs for one generation run.
#[derive(Debug, Clone)]
pub struct DepictConfig {
    /// Target bond length in layout units.
    pub bond_length: f64,
    /// Upper bound on refinement passes.
    pub refine_iterations: usize,
}

impl Default for DepictConfig {
    fn default() -> Self {
        Self {
            bond_length: 1.5,
            refine_iterations: DEFAULT_ITERATIONS,
        }
    }
}

/// Progression of a generation run. Each phase moves the run strictly
/// forward; the order is load-bearing (labels are assigned from geometry
/// before refinement perturbs it, orientation is a rigid motion so it cannot
/// invalidate anything earlier).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Unplaced,
    RingsPlaced,
    ChainsPlaced,
    AllPlaced,
    StereoAssigned,
    Refined,
    Oriented,
    Finalized,
}

fn advance(stage: &mut Stage, to: Stage) {
    debug_assert!(to > *stage, "pipeline may only move forward");
    *stage = to;
}

/// Structure-diagram generator. Owns the identity template store and the
/// macrocycle shape library; one instance can depict any number of molecules.
pub struct Generator {
    config: DepictConfig,
    templates: TemplateStore,
    macro_templates: MacrocycleTemplates,
    special_groups: Vec<Mol>,
}

impl Generator {
    pub fn new() -> Self {
        Self::with_config(DepictConfig::default())
    }

    pub fn with_config(config: DepictConfig) -> Self {
        Self {
            config,
            templates: TemplateStore::new(),
            macro_templates: MacrocycleTemplates::builtin(),
            special_groups: Vec::new(),
        }
    }

    pub fn config(&self) -> &DepictConfig {
        &self.config
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn templates_mut(&mut self) -> &mut TemplateStore {
        &mut self.templates
    }

    pub fn set_macrocycle_templates(&mut self, templates: MacrocycleTemplates) {
        self.macro_templates = templates;
    }

    /// Registers a special group: a laid-out pattern whose drawing replaces
    /// the computed geometry wherever the pattern occurs in a depicted
    /// molecule. Returns `false` when the pattern has fewer than two atoms
    /// or any unplaced atom.
    pub fn add_special_group(&mut self, pattern: Mol) -> bool {
        if pattern.atom_count() < 2 || pattern.atoms().any(|a| pattern.position(a).is_none()) {
            return false;
        }
        self.special_groups.push(pattern);
        true
    }

    /// Computes 2D coordinates and depiction labels for the molecule.
    /// Existing coordinates are discarded.
    pub fn generate(&self, mol: &mut Mol) -> Result<(), DepictError> {
        mol.clear_positions();
        let n = mol.atom_count();
        let length = self.config.bond_length;

        if n == 0 {
            return Ok(());
        }
        if n == 1 {
            let a = mol.atoms().next().ok_or(DepictError::MissingCoordinates { atom: 0 })?;
            mol.set_position(a, Point::ZERO);
            return Ok(());
        }
        if n == 2 && mol.bond_count() == 1 {
            let atoms: Vec<NodeIndex> = mol.atoms().collect();
            mol.set_position(atoms[0], Point::ZERO);
            mol.set_position(atoms[1], Point::new(length, 0.0));
            return Ok(());
        }

        let mut stage = Stage::Unplaced;

        let rings = elementary_cycles(mol);
        mark_ring_bonds(mol, &rings);
        let systems = partition_ring_systems(mol, &rings);
        let priority = canonical_ranks(mol, Specificity::Substituted);

        let mut system_of: Vec<Option<usize>> = vec![None; n];
        for (si, system) in systems.iter().enumerate() {
            for &a in &system.atoms {
                system_of[a.index()] = Some(si);
            }
        }
        let mut system_placed = vec![false; systems.len()];
        let mut macro_hint = vec![false; n];

        let frags = ordered_fragments(mol);

        // Each fragment starts from its biggest ring system.
        for frag in &frags {
            let primary = systems
                .iter()
                .enumerate()
                .filter(|(_, s)| frag.contains(&s.atoms[0]))
                .max_by_key(|(si, s)| (s.bond_count(&rings), std::cmp::Reverse(*si)))
                .map(|(si, _)| si);
            if let Some(si) = primary {
                self.place_system(mol, &rings, &systems[si], None, &mut macro_hint);
                system_placed[si] = true;
            }
        }
        advance(&mut stage, Stage::RingsPlaced);

        for frag in &frags {
            self.extend_fragment(
                mol,
                frag,
                &rings,
                &systems,
                &system_of,
                &mut system_placed,
                &priority,
                &mut macro_hint,
            );
        }
        advance(&mut stage, Stage::ChainsPlaced);

        self.correct_double_bonds(mol, &priority);
        self.tile_fragments(mol, &frags);
        advance(&mut stage, Stage::AllPlaced);

        assign_nonplanar_bonds(mol)?;
        advance(&mut stage, Stage::StereoAssigned);

        {
            let mut refiner = Refiner::new(
                mol,
                length,
                system_of.clone(),
                priority.clone(),
                macro_hint.clone(),
            );
            refiner.refine(self.config.refine_iterations);
        }
        advance(&mut stage, Stage::Refined);

        self.orient(mol);
        advance(&mut stage, Stage::Oriented);

        self.finalize_special_groups(mol);
        advance(&mut stage, Stage::Finalized);
        debug_assert_eq!(stage, Stage::Finalized);
        Ok(())
    }

    /// Places one ring system: identity template if the store knows it,
    /// otherwise ring by ring from the system's core outward. `anchor` is an
    /// already-placed attachment atom and the direction the system should
    /// grow in.
    fn place_system(
        &self,
        mol: &mut Mol,
        rings: &[Ring],
        system: &RingSystem,
        anchor: Option<(NodeIndex, Point)>,
        macro_hint: &mut [bool],
    ) {
        let length = self.config.bond_length;
        if self.try_template(mol, system, anchor) {
            return;
        }

        let order = ring_order(rings, system, anchor.map(|(a, _)| a));
        for &ri in &order {
            let ring = &rings[ri];
            let placed: Vec<NodeIndex> = ring
                .atoms
                .iter()
                .copied()
                .filter(|&a| mol.position(a).is_some())
                .collect();
            if placed.len() == ring.len() {
                continue;
            }
            if placed.is_empty() {
                if is_macrocycle(ring, rings, system) {
                    if let Some(hinted) = place_macrocycle(
                        mol,
                        ring,
                        rings,
                        system,
                        &self.macro_templates,
                        length,
                    ) {
                        for a in hinted {
                            macro_hint[a.index()] = true;
                        }
                        continue;
                    }
                }
                place_ring(mol, ring, &[], Point::ZERO, Point::new(1.0, 0.0), length);
                continue;
            }

            let shared_pts: Vec<Point> = placed
                .iter()
                .filter_map(|&a| mol.position(a))
                .collect();
            let shared_center = centroid(&shared_pts);
            let body_pts: Vec<Point> = system
                .atoms
                .iter()
                .filter_map(|&a| mol.position(a))
                .collect();
            let mut direction = shared_center - centroid(&body_pts);
            if direction.length() < 1e-9 {
                direction = anchor.map(|(_, d)| d).unwrap_or(Point::new(1.0, 0.0));
            }
            place_ring(mol, ring, &placed, shared_center, direction, length);
        }
    }

    /// Looks the whole ring system up in the template store and, on a hit,
    /// transplants the stored geometry (rigidly re-anchored when the system
    /// hangs off already-placed structure).
    fn try_template(
        &self,
        mol: &mut Mol,
        system: &RingSystem,
        anchor: Option<(NodeIndex, Point)>,
    ) -> bool {
        if self.templates.is_empty() {
            return false;
        }
        let atoms = &system.atoms;
        let mut sub = Mol::new();
        for &a in atoms {
            sub.add_atom(mol.atom(a).clone());
        }
        for i in 0..atoms.len() {
            for j in (i + 1)..atoms.len() {
                if let Some(e) = mol.bond_between(atoms[i], atoms[j]) {
                    sub.add_bond(
                        NodeIndex::new(i),
                        NodeIndex::new(j),
                        mol.bond(e).clone(),
                    );
                }
            }
        }
        let Some(points) = self.templates.lookup(&mut sub) else {
            return false;
        };

        match anchor {
            None => {
                let c = centroid(&points);
                for (k, &a) in atoms.iter().enumerate() {
                    mol.set_position(a, points[k] - c);
                }
            }
            Some((a, dir)) => {
                let Some(ai) = atoms.iter().position(|&x| x == a) else {
                    return false;
                };
                let Some(target) = mol.position(a) else {
                    return false;
                };
                let pivot = points[ai];
                let c = centroid(&points);
                let inward = if pivot.distance(c) > 1e-9 {
                    pivot.angle_to(c)
                } else {
                    0.0
                };
                let theta = dir.y.atan2(dir.x) - inward;
                let shift = target - pivot;
                for (k, &atom) in atoms.iter().enumerate() {
                    let p = points[k].rotated_around(pivot, theta) + shift;
                    mol.set_position(atom, p);
                }
            }
        }
        true
    }

    /// Grows the placed skeleton of one fragment until every atom has a
    /// position: chains extend in 120° zigzags, branches fan into the widest
    /// open angular gap, and attached ring systems are placed whole when the
    /// walk first reaches one of their atoms.
    #[allow(clippy::too_many_arguments)]
    fn extend_fragment(
        &self,
        mol: &mut Mol,
        frag: &[NodeIndex],
        rings: &[Ring],
        systems: &[RingSystem],
        system_of: &[Option<usize>],
        system_placed: &mut [bool],
        priority: &[usize],
        macro_hint: &mut [bool],
    ) {
        let length = self.config.bond_length;
        let mut queue: VecDeque<NodeIndex> = frag
            .iter()
            .copied()
            .filter(|&a| mol.position(a).is_some())
            .collect();
        if queue.is_empty() {
            let start = chain_start(mol, frag);
            mol.set_position(start, Point::ZERO);
            queue.push_back(start);
        }

        while let Some(a) = queue.pop_front() {
            if let Some(si) = system_of[a.index()] {
                if !system_placed[si] {
                    let direction = incoming_direction(mol, a);
                    self.place_system(mol, rings, &systems[si], Some((a, direction)), macro_hint);
                    system_placed[si] = true;
                    for &ri in &systems[si].rings {
                        let subs = place_ring_substituents(mol, &rings[ri], length);
                        queue.extend(subs);
                    }
                    queue.extend(systems[si].atoms.iter().copied());
                    continue;
                }
            }

            let mut next: Vec<NodeIndex> = mol
                .neighbors(a)
                .filter(|&nb| mol.position(nb).is_none())
                .collect();
            next.sort_by_key(|&nb| (std::cmp::Reverse(priority[nb.index()]), nb.index()));
            for nb in next {
                if mol.position(nb).is_some() {
                    continue;
                }
                self.place_neighbor(mol, a, nb);
                queue.push_back(nb);
            }
        }
    }

    /// Positions one unplaced neighbor of a placed atom.
    fn place_neighbor(&self, mol: &mut Mol, a: NodeIndex, nb: NodeIndex) {
        let Some(origin) = mol.position(a) else {
            return;
        };
        let placed: Vec<(NodeIndex, f64)> = mol
            .neighbors(a)
            .filter_map(|x| mol.position(x).map(|p| (x, origin.angle_to(p))))
            .collect();

        let angle = match placed.len() {
            // Fresh chain start: first bond points down-right so the zigzag
            // straddles the horizontal.
            0 => -PI / 6.0,
            1 => {
                let (p, theta) = placed[0];
                let incoming = theta + PI;
                incoming + zigzag_sign(mol, a, p) * PI / 3.0
            }
            _ => best_open_angle(&placed.iter().map(|&(_, t)| t).collect::<Vec<f64>>()),
        };
        mol.set_position(nb, origin + Point::polar(angle) * self.config.bond_length);
    }

    /// Reflects one acyclic side of each configured double bond when the
    /// drawn geometry contradicts the descriptor. Clockwise winding means
    /// trans; the smaller side moves.
    fn correct_double_bonds(&self, mol: &mut Mol, priority: &[usize]) {
        let stereos = mol.double_bond_stereo().to_vec();
        for stereo in stereos {
            if stereo.winding == StereoWinding::Unspecified {
                continue;
            }
            let Some((u, v)) = mol.bond_endpoints(stereo.bond) else {
                continue;
            };
            if mol.bond(stereo.bond).is_ring {
                continue;
            }
            let highest = |end: NodeIndex, other: NodeIndex| {
                mol.neighbors(end)
                    .filter(|&x| x != other)
                    .max_by_key(|&x| priority[x.index()])
            };
            let (Some(ru), Some(rv)) = (highest(u, v), highest(v, u)) else {
                continue;
            };
            let (Some(pu), Some(pv), Some(pru), Some(prv)) = (
                mol.position(u),
                mol.position(v),
                mol.position(ru),
                mol.position(rv),
            ) else {
                continue;
            };

            let su = turn(pru, pu, pv);
            let sv = turn(pu, pv, prv);
            if su.abs() < 1e-9 || sv.abs() < 1e-9 {
                continue;
            }
            let drawn_trans = su * sv < 0.0;
            let want_trans = stereo.winding == StereoWinding::Clockwise;
            if drawn_trans == want_trans {
                continue;
            }

            let side_u = side_atoms(mol, u, v);
            let side_v = side_atoms(mol, v, u);
            let side = if side_u.len() < side_v.len() {
                side_u
            } else {
                side_v
            };
            for atom in side {
                if let Some(p) = mol.position(atom) {
                    mol.set_position(atom, p.reflected_across(pu, pv));
                }
            }
        }
    }

    /// Translates each fragment into its own cell of a roughly square grid.
    fn tile_fragments(&self, mol: &mut Mol, frags: &[Vec<NodeIndex>]) {
        if frags.len() <= 1 {
            return;
        }
        let boxes: Vec<BoundingBox> = frags
            .iter()
            .filter_map(|f| BoundingBox::of(f.iter().filter_map(|&a| mol.position(a))))
            .collect();
        if boxes.len() != frags.len() {
            return;
        }
        let margin = self.config.bond_length;
        let cell_w = boxes.iter().map(|b| b.width()).fold(0.0, f64::max) + margin;
        let cell_h = boxes.iter().map(|b| b.height()).fold(0.0, f64::max) + margin;

        let count = frags.len();
        let rows = ((count as f64).sqrt().floor() as usize).max(1);
        let cols = (count + rows - 1) / rows;

        for (i, frag) in frags.iter().enumerate() {
            let row = i / cols;
            let col = i % cols;
            let target = Point::new(col as f64 * cell_w, -(row as f64) * cell_h);
            let center = (boxes[i].min + boxes[i].max) * 0.5;
            let delta = target - center;
            for &a in frag {
                if let Some(p) = mol.position(a) {
                    mol.set_position(a, p + delta);
                }
            }
        }
    }

    /// Final rigid rotation. A designated attachment bond is laid flat with
    /// the bulk of the drawing above it; otherwise the twelve 30° rotations
    /// of the finished drawing are tried and the widest kept, near-ties
    /// going to the rotation with the most bonds lying at ±30° from the
    /// horizontal.
    fn orient(&self, mol: &mut Mol) {
        let atoms: Vec<NodeIndex> = mol.atoms().collect();
        let pts: Vec<Point> = atoms.iter().filter_map(|&a| mol.position(a)).collect();
        if pts.len() < 2 {
            return;
        }
        if self.orient_to_attachment(mol, &atoms) {
            return;
        }
        let pivot = centroid(&pts);

        let bond_angles: Vec<f64> = mol
            .bonds()
            .filter_map(|b| {
                let (u, v) = mol.bond_endpoints(b)?;
                let (pu, pv) = (mol.position(u)?, mol.position(v)?);
                Some(pu.angle_to(pv))
            })
            .collect();

        let mut best_k = 0usize;
        let mut best_width = f64::NEG_INFINITY;
        let mut best_aligned = 0usize;
        for k in 0..12 {
            let theta = k as f64 * PI / 6.0;
            let rotated: Vec<Point> = pts.iter().map(|p| p.rotated_around(pivot, theta)).collect();
            let Some(bbox) = BoundingBox::of(rotated) else {
                continue;
            };
            let width = bbox.width();
            let aligned = bond_angles
                .iter()
                .filter(|&&a| {
                    let d = (a + theta).rem_euclid(PI);
                    (d - PI / 6.0).abs() < 1e-3 || (d - 5.0 * PI / 6.0).abs() < 1e-3
                })
                .count();
            if width > best_width + 1e-6
                || (width > best_width - 1e-6 && aligned > best_aligned)
            {
                best_k = k;
                best_width = width;
                best_aligned = aligned;
            }
        }
        if best_k == 0 {
            return;
        }
        let theta = best_k as f64 * PI / 6.0;
        for &a in &atoms {
            if let Some(p) = mol.position(a) {
                mol.set_position(a, p.rotated_around(pivot, theta));
            }
        }
    }

    /// Rotates the drawing so the designated attachment bond lies
    /// horizontal, then spins it half a turn if more of the structure hangs
    /// below the bond than above. Returns `false` when no usable designation
    /// exists.
    fn orient_to_attachment(&self, mol: &mut Mol, atoms: &[NodeIndex]) -> bool {
        let Some(bond) = mol.attachment_bond() else {
            return false;
        };
        let Some((u, v)) = mol.bond_endpoints(bond) else {
            return false;
        };
        let (Some(pu), Some(pv)) = (mol.position(u), mol.position(v)) else {
            return false;
        };
        if pu.distance(pv) < 1e-9 {
            return false;
        }

        let theta = -pu.angle_to(pv);
        for &a in atoms {
            if let Some(p) = mol.position(a) {
                mol.set_position(a, p.rotated_around(pu, theta));
            }
        }

        let balance: f64 = atoms
            .iter()
            .filter(|&&a| a != u && a != v)
            .filter_map(|&a| mol.position(a))
            .map(|p| p.y - pu.y)
            .sum();
        if balance < 0.0 {
            // A half turn keeps the bond horizontal and puts the bulk on top.
            for &a in atoms {
                if let Some(p) = mol.position(a) {
                    mol.set_position(a, p.rotated_around(pu, PI));
                }
            }
        }
        true
    }

    /// Stamps each registered special-group drawing over its occurrences.
    /// Every non-overlapping match keeps the frame of its first pattern bond
    /// and takes the group's internal geometry via a rigid transform.
    fn finalize_special_groups(&self, mol: &mut Mol) {
        if self.special_groups.is_empty() {
            return;
        }
        let matcher = |p: &Atom, t: &Atom| {
            p.atomic_num == t.atomic_num && p.formal_charge == t.formal_charge
        };
        let mut taken = vec![false; mol.atom_count()];

        for pattern in &self.special_groups {
            let Some(p0) = pattern.atoms().next() else {
                continue;
            };
            let Some(p1) = pattern.neighbors(p0).next() else {
                continue;
            };
            let (Some(f0), Some(f1)) = (pattern.position(p0), pattern.position(p1)) else {
                continue;
            };
            for mapping in find_all_mappings(pattern, mol, &matcher) {
                if mapping.iter().any(|&t| taken[t.index()]) {
                    continue;
                }
                let (t0, t1) = (mapping[p0.index()], mapping[p1.index()]);
                let (Some(to0), Some(to1)) = (mol.position(t0), mol.position(t1)) else {
                    continue;
                };
                for (pi, &t) in mapping.iter().enumerate() {
                    if let Some(p) = pattern.position(NodeIndex::new(pi)) {
                        mol.set_position(t, p);
                    }
                    taken[t.index()] = true;
                }
                align_rigid(mol, &mapping, (f0, f1), (to0, to1));
            }
        }
    }
}

impl Default for Generator {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot layout with default configuration and an empty template store.
pub fn depict(mol: &mut Mol) -> Result<(), DepictError> {
    Generator::new().generate(mol)
}

/// Rigidly maps laid-out atoms onto a new frame: the transform sending
/// `from.0` to `to.0` and the direction `from.0 → from.1` to the direction
/// `to.0 → to.1` is applied to every listed atom. Used to splice a finished
/// sub-layout (an expanded shorthand group, a repeat unit) back into a parent
/// drawing.
pub fn align_rigid(
    mol: &mut Mol,
    atoms: &[NodeIndex],
    from: (Point, Point),
    to: (Point, Point),
) {
    let theta = to.0.angle_to(to.1) - from.0.angle_to(from.1);
    let shift = to.0 - from.0;
    for &a in atoms {
        if let Some(p) = mol.position(a) {
            mol.set_position(a, p.rotated_around(from.0, theta) + shift);
        }
    }
}

/// Connected components in ascending index order, with charged fragments
/// regrouped so each cation is followed by an anion where possible. The
/// pairing only reorders the list; it decides grid adjacency, nothing else.
fn ordered_fragments(mol: &Mol) -> Vec<Vec<NodeIndex>> {
    let n = mol.atom_count();
    let mut seen = vec![false; n];
    let mut frags: Vec<Vec<NodeIndex>> = Vec::new();
    for start in mol.atoms() {
        if seen[start.index()] {
            continue;
        }
        let mut comp = Vec::new();
        let mut queue = VecDeque::from([start]);
        seen[start.index()] = true;
        while let Some(a) = queue.pop_front() {
            comp.push(a);
            for nb in mol.neighbors(a) {
                if !seen[nb.index()] {
                    seen[nb.index()] = true;
                    queue.push_back(nb);
                }
            }
        }
        comp.sort_by_key(|a| a.index());
        frags.push(comp);
    }

    let charges: Vec<i32> = frags
        .iter()
        .map(|f| f.iter().map(|&a| mol.atom(a).formal_charge as i32).sum())
        .collect();
    regroup_ionic(&charges)
        .into_iter()
        .map(|i| std::mem::take(&mut frags[i]))
        .collect()
}

/// Greedy counter-ion pairing over fragment net charges. Returns the new
/// fragment order.
fn regroup_ionic(charges: &[i32]) -> Vec<usize> {
    let n = charges.len();
    let mut order = Vec::with_capacity(n);
    let mut used = vec![false; n];
    for i in 0..n {
        if used[i] {
            continue;
        }
        used[i] = true;
        order.push(i);
        if charges[i] != 0 {
            let want = -charges[i].signum();
            if let Some(j) = ((i + 1)..n).find(|&j| !used[j] && charges[j].signum() == want) {
                used[j] = true;
                order.push(j);
            }
        }
    }
    order
}

/// An endpoint of the longest path through the fragment, found with the
/// usual double sweep.
fn chain_start(mol: &Mol, frag: &[NodeIndex]) -> NodeIndex {
    let farthest = |from: NodeIndex| {
        let mut seen = vec![false; mol.atom_count()];
        seen[from.index()] = true;
        let mut queue = VecDeque::from([from]);
        let mut last = from;
        while let Some(a) = queue.pop_front() {
            last = a;
            let mut nbs: Vec<NodeIndex> = mol
                .neighbors(a)
                .filter(|nb| !seen[nb.index()])
                .collect();
            nbs.sort_by_key(|nb| nb.index());
            for nb in nbs {
                seen[nb.index()] = true;
                queue.push_back(nb);
            }
        }
        last
    };
    farthest(farthest(frag[0]))
}

/// Direction of the placed bond arriving at `a`, or east when none exists.
fn incoming_direction(mol: &Mol, a: NodeIndex) -> Point {
    let Some(pa) = mol.position(a) else {
        return Point::new(1.0, 0.0);
    };
    for nb in mol.neighbors(a) {
        if let Some(p) = mol.position(nb) {
            let d = pa - p;
            if d.length() > 1e-9 {
                return d.normalized();
            }
        }
    }
    Point::new(1.0, 0.0)
}

/// Sign of the next zigzag turn at `a`, opposite to the turn made at its
/// placed parent `p`.
fn zigzag_sign(mol: &Mol, a: NodeIndex, p: NodeIndex) -> f64 {
    let (Some(pp), Some(pa)) = (mol.position(p), mol.position(a)) else {
        return 1.0;
    };
    for q in mol.neighbors(p) {
        if q == a {
            continue;
        }
        if let Some(pq) = mol.position(q) {
            let t = turn(pq, pp, pa);
            if t.abs() > 1e-9 {
                return -t.signum();
            }
        }
    }
    1.0
}

/// The 30°-grid direction farthest from every occupied direction at an atom.
fn best_open_angle(occupied: &[f64]) -> f64 {
    let circ = |x: f64, y: f64| {
        let d = (x - y).rem_euclid(2.0 * PI);
        d.min(2.0 * PI - d)
    };
    let mut best = (f64::NEG_INFINITY, 0usize);
    for k in 0..12 {
        let cand = k as f64 * PI / 6.0;
        let gap = occupied
            .iter()
            .map(|&a| circ(cand, a))
            .fold(f64::INFINITY, f64::min);
        if gap > best.0 + 1e-9 {
            best = (gap, k);
        }
    }
    best.1 as f64 * PI / 6.0
}

/// Atoms reachable from `start` without crossing `blocked`, `start` included.
fn side_atoms(mol: &Mol, start: NodeIndex, blocked: NodeIndex) -> Vec<NodeIndex> {
    let mut seen = vec![false; mol.atom_count()];
    seen[start.index()] = true;
    seen[blocked.index()] = true;
    let mut out = vec![start];
    let mut stack = vec![start];
    while let Some(a) = stack.pop() {
        for nb in mol.neighbors(a) {
            if !seen[nb.index()] {
                seen[nb.index()] = true;
                out.push(nb);
                stack.push(nb);
            }
        }
    }
    out
}

/// Placement order for the rings of one system: peel fusion leaves to find
/// the core, start there (or at the ring holding the anchor atom), then walk
/// the fusion adjacency breadth-first.
fn ring_order(rings: &[Ring], system: &RingSystem, anchor: Option<NodeIndex>) -> Vec<usize> {
    let members = &system.rings;
    let m = members.len();
    if m <= 1 {
        return members.clone();
    }

    let adjacent = |i: usize, j: usize| {
        rings[members[i]]
            .atoms
            .iter()
            .any(|&a| rings[members[j]].contains_atom(a))
    };

    // Peel leaves of the fusion tree; whatever survives is the core.
    let mut remaining = vec![true; m];
    let mut count = m;
    loop {
        let leaf = (0..m).find(|&i| {
            remaining[i]
                && count > 1
                && (0..m).filter(|&j| j != i && remaining[j] && adjacent(i, j)).count() <= 1
        });
        match leaf {
            Some(i) => {
                remaining[i] = false;
                count -= 1;
            }
            None => break,
        }
    }

    let start = anchor
        .and_then(|a| (0..m).find(|&i| rings[members[i]].contains_atom(a)))
        .unwrap_or_else(|| {
            (0..m)
                .filter(|&i| remaining[i])
                .max_by_key(|&i| (rings[members[i]].bonds.len(), std::cmp::Reverse(i)))
                .unwrap_or(0)
        });

    let mut order = Vec::with_capacity(m);
    let mut seen = vec![false; m];
    let mut queue = VecDeque::from([start]);
    seen[start] = true;
    while let Some(i) = queue.pop_front() {
        order.push(members[i]);
        for j in 0..m {
            if !seen[j] && adjacent(i, j) {
                seen[j] = true;
                queue.push_back(j);
            }
        }
    }
    // Disconnected members cannot occur inside one system, but stay total.
    for j in 0..m {
        if !seen[j] {
            order.push(members[j]);
        }
    }
    order
}
