//! The translation matrix library contract (§6): given a level's box width
//! and (for high-frequency levels) a direction, returns the small dense
//! operators M2M/M2L/L2L need. The core treats this purely as a lookup —
//! it never derives these matrices itself.

use crate::linalg::ThreeFactor;
use crate::Complex64;
use ddfmm_geometry::Index3;

/// `(uc2ue, ue2uc, dc2de, de2dc)` for one `(width, direction)` pair.
/// `uc2ue`/`dc2de` are the three-factor SVD pseudo-inverse conversions;
/// `ue2uc`/`de2dc` are 8-way tensors, one matrix per child octant.
#[derive(Clone)]
pub struct TranslationOperators {
    pub uc2ue: ThreeFactor,
    pub ue2uc: [Vec<Complex64>; 8],
    pub dc2de: ThreeFactor,
    pub de2dc: [Vec<Complex64>; 8],
    /// Shared row/col extent of every `ue2uc[i]`/`de2dc[i]` entry.
    pub child_op_rows: usize,
    pub child_op_cols: usize,
}

/// Looks up the translation operators for a box width and (at
/// high-frequency levels) a direction. Non-directional (low-frequency)
/// lookups pass `None`.
pub trait Mlib {
    fn lookup(&self, width: f64, direction: Option<Index3>) -> TranslationOperators;
}
