//! Box keys and (box, direction) keys, the two unit-of-ownership keys that
//! flow through the distributed associative vector and the partition
//! descriptors.

use crate::index3::Index3;
use memoffset::offset_of;
use mpi::datatype::{Equivalence, UncommittedUserDatatype, UserDatatype};

/// A box in the hierarchy: `(level, index3)`. Level 0 is the root, the
/// single box spanning the whole domain; level increases toward finer
/// boxes. Ordering is level-major, then lexicographic on the index —
/// this is the order the partitioning sort (§4.7) relies on.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BoxKey {
    pub level: u32,
    pub index: Index3,
}

impl BoxKey {
    pub fn new(level: u32, index: Index3) -> Self {
        Self { level, index }
    }

    pub fn root() -> Self {
        Self::new(0, Index3::default())
    }

    pub fn parent(&self) -> Option<BoxKey> {
        if self.level == 0 {
            return None;
        }
        Some(BoxKey::new(
            self.level - 1,
            Index3::new(
                self.index.i.div_euclid(2),
                self.index.j.div_euclid(2),
                self.index.k.div_euclid(2),
            ),
        ))
    }

    pub fn children(&self) -> [BoxKey; 8] {
        let l = self.level + 1;
        let base = Index3::new(self.index.i * 2, self.index.j * 2, self.index.k * 2);
        let mut out = [BoxKey::default(); 8];
        let mut n = 0;
        for di in 0..2 {
            for dj in 0..2 {
                for dk in 0..2 {
                    out[n] = BoxKey::new(l, Index3::new(base.i + di, base.j + dj, base.k + dk));
                    n += 1;
                }
            }
        }
        out
    }

    /// Position of `self` among its seven siblings (octant index 0..8), used
    /// to pick the right child-indexed operator out of an 8-way tensor.
    pub fn sibling_index(&self) -> usize {
        ((self.index.i & 1) + 2 * (self.index.j & 1) + 4 * (self.index.k & 1)) as usize
    }

    /// `true` iff `other` is one of the 26 same-level boxes sharing a face,
    /// edge, or corner with `self` (Chebyshev distance 1).
    pub fn is_adjacent(&self, other: &BoxKey) -> bool {
        self.level == other.level && self.index.chebyshev_distance(&other.index) <= 1
    }

    /// Reduce a low-frequency box key to its ancestor at the unit level `u`,
    /// per the ancestor map in §4.2: `(ell, idx) -> (u, idx / 2^(ell-u))`.
    pub fn ancestor_at(&self, unit_level: u32) -> BoxKey {
        assert!(self.level >= unit_level);
        let factor = 1i64 << (self.level - unit_level);
        BoxKey::new(unit_level, self.index.scale_down(factor))
    }
}

unsafe impl Equivalence for BoxKey {
    type Out = UserDatatype;
    fn equivalent_datatype() -> Self::Out {
        UserDatatype::structured(
            &[1, 3],
            &[
                offset_of!(BoxKey, level) as mpi::Address,
                offset_of!(BoxKey, index) as mpi::Address,
            ],
            &[
                UncommittedUserDatatype::contiguous(1, &u32::equivalent_datatype()),
                UncommittedUserDatatype::contiguous(3, &i64::equivalent_datatype()),
            ],
        )
    }
}

/// The synthetic direction used to route unit-level box payloads through the
/// (box, direction) transfer machinery (§4.7 step 6).
pub const UNIT_LEVEL_DIRECTION: Index3 = Index3 { i: 1, j: 1, k: 1 };

/// A `(BoxKey, direction)` key, the unit of ownership at high-frequency
/// levels. Ordering compares the box key first, then the direction, matching
/// the global sort in §4.7.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BoxDirKey {
    pub boxkey: BoxKey,
    pub direction: Index3,
}

impl BoxDirKey {
    pub fn new(boxkey: BoxKey, direction: Index3) -> Self {
        Self { boxkey, direction }
    }

    pub fn unit_level(boxkey: BoxKey) -> Self {
        Self::new(boxkey, UNIT_LEVEL_DIRECTION)
    }
}

unsafe impl Equivalence for BoxDirKey {
    type Out = UserDatatype;
    fn equivalent_datatype() -> Self::Out {
        // Flattened field layout: level (u32), box index (3 x i64), direction (3 x i64).
        UserDatatype::structured(
            &[1, 3, 3],
            &[
                offset_of!(BoxDirKey, boxkey.level) as mpi::Address,
                offset_of!(BoxDirKey, boxkey.index) as mpi::Address,
                offset_of!(BoxDirKey, direction) as mpi::Address,
            ],
            &[
                UncommittedUserDatatype::contiguous(1, &u32::equivalent_datatype()),
                UncommittedUserDatatype::contiguous(3, &i64::equivalent_datatype()),
                UncommittedUserDatatype::contiguous(3, &i64::equivalent_datatype()),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_child_roundtrip() {
        let parent = BoxKey::new(2, Index3::new(1, 3, 0));
        for child in parent.children() {
            assert_eq!(child.parent(), Some(parent));
        }
    }

    #[test]
    fn sibling_index_is_unique_per_child() {
        let parent = BoxKey::new(3, Index3::new(0, 0, 0));
        let mut seen = std::collections::HashSet::new();
        for child in parent.children() {
            assert!(seen.insert(child.sibling_index()));
        }
    }

    #[test]
    fn box_ordering_is_level_major() {
        let a = BoxKey::new(1, Index3::new(5, 5, 5));
        let b = BoxKey::new(2, Index3::new(0, 0, 0));
        assert!(a < b);
    }

    #[test]
    fn ancestor_reduction_matches_spec_formula() {
        let b = BoxKey::new(5, Index3::new(13, 2, 7));
        let a = b.ancestor_at(2);
        assert_eq!(a.level, 2);
        assert_eq!(a.index, Index3::new(13 / 8, 2 / 8, 7 / 8));
    }
}
