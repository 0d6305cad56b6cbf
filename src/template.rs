//! Identity templates: stored 2D layouts keyed by canonical fingerprint.
//!
//! A template's point array is ordered by the canonical atom ordering that
//! produced its fingerprint, so applying one to a query structure is a matter
//! of recomputing the query's ranks and indexing by rank. The store is loaded
//! once and treated as read-mostly for the lifetime of the process.

use std::collections::HashMap;
use std::fmt;

use crate::fingerprint::{fingerprint, Specificity};
use crate::geometry::Point;
use crate::molecule::Mol;

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateEntry {
    pub fingerprint: String,
    /// Coordinates in canonical-rank order.
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    entries: Vec<TemplateEntry>,
    index: HashMap<String, Vec<usize>>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stores the molecule's current layout under all three fingerprint
    /// levels, so [`lookup`](Self::lookup) can fall back from an exact
    /// substituted match to the bare or anonymized skeleton. Returns `false`
    /// (and stores nothing) when any atom lacks a 2D point.
    pub fn add(&mut self, mol: &mut Mol) -> bool {
        if mol.atoms().any(|a| mol.position(a).is_none()) {
            return false;
        }
        for level in [
            Specificity::Substituted,
            Specificity::Skeleton,
            Specificity::Anonymous,
        ] {
            self.add_at(mol, level);
        }
        true
    }

    pub fn add_at(&mut self, mol: &mut Mol, level: Specificity) -> bool {
        let n = mol.atom_count();
        let mut by_atom: Vec<Point> = Vec::with_capacity(n);
        for atom in mol.atoms() {
            match mol.position(atom) {
                Some(p) => by_atom.push(p),
                None => return false,
            }
        }

        let (fp, ranks) = fingerprint(mol, level);
        let mut points = vec![Point::ZERO; n];
        for (i, &r) in ranks.iter().enumerate() {
            points[r] = by_atom[i];
        }
        self.insert(TemplateEntry {
            fingerprint: fp,
            points,
        });
        true
    }

    fn insert(&mut self, entry: TemplateEntry) {
        self.index
            .entry(entry.fingerprint.clone())
            .or_default()
            .push(self.entries.len());
        self.entries.push(entry);
    }

    /// All stored layouts matching the query at the given level, each
    /// re-ordered so that slot `i` is the point for query atom `i`.
    pub fn lookup_at(&self, mol: &mut Mol, level: Specificity) -> Vec<Vec<Point>> {
        let (fp, ranks) = fingerprint(mol, level);
        let n = mol.atom_count();
        let Some(slots) = self.index.get(&fp) else {
            return Vec::new();
        };
        slots
            .iter()
            .filter_map(|&slot| {
                let entry = &self.entries[slot];
                if entry.points.len() != n {
                    return None;
                }
                Some((0..n).map(|i| entry.points[ranks[i]]).collect())
            })
            .collect()
    }

    /// First stored layout found, trying substituted, then skeleton, then
    /// anonymized fingerprints.
    pub fn lookup(&self, mol: &mut Mol) -> Option<Vec<Point>> {
        for level in [
            Specificity::Substituted,
            Specificity::Skeleton,
            Specificity::Anonymous,
        ] {
            if let Some(first) = self.lookup_at(mol, level).into_iter().next() {
                return Some(first);
            }
        }
        None
    }

    /// One line per entry: `<fingerprint> |(<x>,<y>,...)|`.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.fingerprint);
            out.push(' ');
            out.push_str("|(");
            for p in &entry.points {
                out.push_str(&encode_coord(p.x));
                out.push(',');
                out.push_str(&encode_coord(p.y));
                out.push(',');
            }
            out.push_str(")|");
            out.push('\n');
        }
        out
    }

    /// Parses the text format produced by [`serialize`](Self::serialize).
    /// `#`-prefixed lines and blank lines are skipped.
    pub fn deserialize(text: &str) -> Result<Self, TemplateParseError> {
        let mut store = Self::new();
        store.merge(text)?;
        Ok(store)
    }

    /// Parses `text` and appends its entries to this store.
    pub fn merge(&mut self, text: &str) -> Result<(), TemplateParseError> {
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (fp, encoded) = line.split_once(' ').ok_or(TemplateParseError {
                line: lineno + 1,
                kind: TemplateParseErrorKind::MissingSeparator,
            })?;
            let body = encoded
                .strip_prefix("|(")
                .and_then(|s| s.strip_suffix(")|"))
                .ok_or(TemplateParseError {
                    line: lineno + 1,
                    kind: TemplateParseErrorKind::MalformedPointList,
                })?;

            let coords: Vec<f64> = body
                .split(',')
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<f64>().map_err(|_| TemplateParseError {
                        line: lineno + 1,
                        kind: TemplateParseErrorKind::BadCoordinate,
                    })
                })
                .collect::<Result<_, _>>()?;
            if coords.len() % 2 != 0 {
                return Err(TemplateParseError {
                    line: lineno + 1,
                    kind: TemplateParseErrorKind::OddCoordinateCount,
                });
            }

            let points = coords
                .chunks_exact(2)
                .map(|c| Point::new(c[0], c[1]))
                .collect();
            self.insert(TemplateEntry {
                fingerprint: fp.to_string(),
                points,
            });
        }
        Ok(())
    }

    /// Re-keys every entry after a fingerprint normalization change.
    ///
    /// `f` maps an old fingerprint to its replacement; `None` keeps the old
    /// key. The lookup index is rebuilt afterwards.
    pub fn rekey(&mut self, f: impl Fn(&str) -> Option<String>) {
        for entry in &mut self.entries {
            if let Some(new_fp) = f(&entry.fingerprint) {
                entry.fingerprint = new_fp;
            }
        }
        self.index.clear();
        for i in 0..self.entries.len() {
            self.index
                .entry(self.entries[i].fingerprint.clone())
                .or_default()
                .push(i);
        }
    }
}

/// 2-decimal fixed point with compact notation: the leading integer zero and
/// trailing fractional zeros are stripped (`0.50` → `.5`, `-0.30` → `-.3`).
fn encode_coord(v: f64) -> String {
    let mut s = format!("{:.2}", v);
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    if let Some(rest) = s.strip_prefix("0.") {
        s = format!(".{}", rest);
    } else if let Some(rest) = s.strip_prefix("-0.") {
        s = format!("-.{}", rest);
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateParseError {
    pub line: usize,
    pub kind: TemplateParseErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateParseErrorKind {
    /// No space between fingerprint and point list.
    MissingSeparator,
    /// Point list not delimited by `|(` and `)|`.
    MalformedPointList,
    /// A coordinate failed to parse as a number.
    BadCoordinate,
    /// The list held an x without a matching y.
    OddCoordinateCount,
}

impl fmt::Display for TemplateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            TemplateParseErrorKind::MissingSeparator => "missing fingerprint/points separator",
            TemplateParseErrorKind::MalformedPointList => "point list not wrapped in |( )|",
            TemplateParseErrorKind::BadCoordinate => "unparsable coordinate",
            TemplateParseErrorKind::OddCoordinateCount => "odd number of coordinates",
        };
        write!(f, "template line {}: {}", self.line, what)
    }
}

impl std::error::Error for TemplateParseError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecule::{Atom, Bond};
    use petgraph::graph::NodeIndex;

    fn placed_chain(nums: &[u8], pts: &[(f64, f64)]) -> Mol {
        let mut mol = Mol::new();
        let atoms: Vec<NodeIndex> = nums.iter().map(|&z| mol.add_atom(Atom::of(z))).collect();
        for w in atoms.windows(2) {
            mol.add_bond(w[0], w[1], Bond::default());
        }
        for (i, &(x, y)) in pts.iter().enumerate() {
            mol.set_position(atoms[i], Point::new(x, y));
        }
        mol
    }

    #[test]
    fn encode_strips_zeros() {
        assert_eq!(encode_coord(0.50), ".5");
        assert_eq!(encode_coord(-0.30), "-.3");
        assert_eq!(encode_coord(0.0), "0");
        assert_eq!(encode_coord(12.0), "12");
        assert_eq!(encode_coord(1.25), "1.25");
    }

    #[test]
    fn add_requires_full_coordinates() {
        let mut store = TemplateStore::new();
        let mut mol = Mol::new();
        mol.add_atom(Atom::carbon());
        assert!(!store.add(&mut mol));
        assert!(store.is_empty());
    }

    #[test]
    fn lookup_reorders_to_query_numbering() {
        let mut store = TemplateStore::new();
        let mut stored = placed_chain(&[8, 6, 6], &[(0.0, 0.0), (1.5, 0.0), (3.0, 0.0)]);
        assert!(store.add(&mut stored));

        // Same molecule, numbered from the other end.
        let mut query = placed_chain(&[6, 6, 8], &[(9.0, 9.0), (9.0, 9.0), (9.0, 9.0)]);
        let hit = store.lookup(&mut query).expect("template should match");
        // The oxygen (query atom 2) must land where the stored oxygen was.
        assert!((hit[2].x - 0.0).abs() < 1e-9);
        assert!((hit[0].x - 3.0).abs() < 1e-9);
    }

    #[test]
    fn roundtrip_within_truncation_tolerance() {
        let mut store = TemplateStore::new();
        let mut mol = placed_chain(
            &[6, 6, 8],
            &[(0.123, -0.456), (1.501, 2.999), (-3.004, 0.0)],
        );
        assert!(store.add(&mut mol));

        let text = store.serialize();
        let restored = TemplateStore::deserialize(&text).unwrap();
        assert_eq!(restored.len(), store.len());
        let hits = {
            let mut query = mol.clone();
            restored.lookup_at(&mut query, Specificity::Substituted)
        };
        assert_eq!(hits.len(), 1);
        for (atom, &(x, y)) in mol
            .atoms()
            .zip([(0.123, -0.456), (1.501, 2.999), (-3.004, 0.0)].iter())
        {
            let got = hits[0][atom.index()];
            assert!((got.x - x).abs() <= 0.01, "x off: {} vs {}", got.x, x);
            assert!((got.y - y).abs() <= 0.01, "y off: {} vs {}", got.y, y);
        }
    }

    #[test]
    fn comments_and_blanks_skipped() {
        let text = "# macrocycle shapes\n\ns:6~1;0-1 |(.5,-.3,1.2,0,)|\n";
        let store = TemplateStore::deserialize(text).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.entries[0].points[0], Point::new(0.5, -0.3));
    }

    #[test]
    fn malformed_line_reports_position() {
        let text = "# ok\nbroken-line-without-space\n";
        let err = TemplateStore::deserialize(text).unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, TemplateParseErrorKind::MissingSeparator);
    }

    #[test]
    fn added_template_matches_through_anonymous_fallback() {
        // Benzene stored once; pyridine shares neither the substituted nor
        // the skeleton fingerprint, but the anonymized ring is identical.
        let hexagon = |nums: [u8; 6]| {
            let mut mol = Mol::new();
            let atoms: Vec<NodeIndex> = nums.iter().map(|&z| mol.add_atom(Atom::of(z))).collect();
            for i in 0..6 {
                mol.add_bond(atoms[i], atoms[(i + 1) % 6], Bond::default());
            }
            for (i, &a) in atoms.iter().enumerate() {
                let angle = std::f64::consts::PI / 3.0 * i as f64;
                mol.set_position(a, Point::polar(angle) * 1.5);
            }
            mol
        };

        let mut store = TemplateStore::new();
        let mut benzene = hexagon([6; 6]);
        assert!(store.add(&mut benzene));

        let mut pyridine = hexagon([7, 6, 6, 6, 6, 6]);
        assert!(store
            .lookup_at(&mut pyridine, Specificity::Substituted)
            .is_empty());
        assert!(store
            .lookup_at(&mut pyridine, Specificity::Skeleton)
            .is_empty());
        assert!(store.lookup(&mut pyridine).is_some());
    }

    #[test]
    fn skeleton_fallback_matches_when_charges_differ() {
        let mut store = TemplateStore::new();
        let mut stored = placed_chain(&[6, 6, 8], &[(0.0, 0.0), (1.5, 0.0), (3.0, 0.0)]);
        assert!(store.add_at(&mut stored, Specificity::Skeleton));

        let mut query = placed_chain(&[6, 6, 8], &[(0.0, 0.0), (0.0, 0.0), (0.0, 0.0)]);
        query.atom_mut(NodeIndex::new(2)).formal_charge = -1;
        // Substituted level misses (charge differs), skeleton level hits.
        assert!(store
            .lookup_at(&mut query, Specificity::Substituted)
            .is_empty());
        assert!(store.lookup(&mut query).is_some());
    }

    #[test]
    fn rekey_rebuilds_index() {
        let mut store = TemplateStore::new();
        let mut mol = placed_chain(&[6, 6], &[(0.0, 0.0), (1.5, 0.0)]);
        assert!(store.add(&mut mol));
        let old_fp = store.entries[0].fingerprint.clone();

        store.rekey(|fp| Some(format!("v2|{}", fp)));
        assert!(store.index.get(&old_fp).is_none());
        assert!(store.index.contains_key(&format!("v2|{}", old_fp)));
    }
}
