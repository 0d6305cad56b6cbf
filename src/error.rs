use std::fmt;

/// Errors produced while generating a structure diagram.
///
/// Only structurally fatal conditions surface here. Heuristic shortfalls
/// (template misses, refiner iteration exhaustion, molecules without rings)
/// fall back to deterministic alternatives and never error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepictError {
    /// An atom had no 2D point at a phase that geometrically requires one.
    MissingCoordinates { atom: usize },
    /// A stereocenter has no adjacent bond that can carry a wedge or hatch
    /// label, so its configuration cannot be depicted.
    UndepictableStereo { atom: usize },
}

impl fmt::Display for DepictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCoordinates { atom } => {
                write!(f, "atom {} has no 2D coordinates", atom)
            }
            Self::UndepictableStereo { atom } => {
                write!(
                    f,
                    "stereocenter at atom {} has no bond eligible for a wedge or hatch label",
                    atom
                )
            }
        }
    }
}

impl std::error::Error for DepictError {}
