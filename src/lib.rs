pub mod congestion;
pub mod error;
pub mod fingerprint;
pub mod generator;
pub mod geometry;
pub mod macrocycle;
pub mod molecule;
pub mod refiner;
pub mod ring_placer;
pub mod rings;
pub mod stereo;
pub mod substruct;
pub mod template;

pub use congestion::CongestionModel;
pub use error::DepictError;
pub use fingerprint::{canonical_ranks, fingerprint, Specificity};
pub use generator::{align_rigid, depict, DepictConfig, Generator};
pub use geometry::{BoundingBox, Point};
pub use macrocycle::MacrocycleTemplates;
pub use molecule::{
    Atom, Bond, BondLabel, BondOrder, CumulatedStereo, DoubleBondStereo, Mol, StereoWinding,
    TetrahedralStereo,
};
pub use refiner::Refiner;
pub use rings::{elementary_cycles, partition_ring_systems, Ring, RingSystem};
pub use stereo::assign_nonplanar_bonds;
pub use substruct::find_all_mappings;
pub use template::{TemplateParseError, TemplateStore};
