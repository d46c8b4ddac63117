//! Integer lattice coordinates, used for box indices and quantized directions.

use std::ops::{Add, Sub};

/// An integer triple, e.g. a box's position within its level's lattice, or
/// a quantized direction on a wedge grid.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Index3 {
    pub i: i64,
    pub j: i64,
    pub k: i64,
}

impl Index3 {
    pub fn new(i: i64, j: i64, k: i64) -> Self {
        Self { i, j, k }
    }

    /// Chebyshev (L-infinity) distance, used by the standard FMM adjacency tests.
    pub fn chebyshev_distance(&self, other: &Index3) -> i64 {
        (self.i - other.i)
            .abs()
            .max((self.j - other.j).abs())
            .max((self.k - other.k).abs())
    }

    pub fn scale_down(&self, factor: i64) -> Index3 {
        assert!(factor > 0);
        Index3::new(
            self.i.div_euclid(factor),
            self.j.div_euclid(factor),
            self.k.div_euclid(factor),
        )
    }
}

impl Add for Index3 {
    type Output = Index3;
    fn add(self, rhs: Index3) -> Index3 {
        Index3::new(self.i + rhs.i, self.j + rhs.j, self.k + rhs.k)
    }
}

impl Sub for Index3 {
    type Output = Index3;
    fn sub(self, rhs: Index3) -> Index3 {
        Index3::new(self.i - rhs.i, self.j - rhs.j, self.k - rhs.k)
    }
}
