//! Cartesian vectors and points in three dimensions.

/// Scalar type used for all physical coordinates.
pub type Coord = f64;

/// A point or displacement in `R^3`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vector3 {
    pub x: Coord,
    pub y: Coord,
    pub z: Coord,
}

impl Vector3 {
    pub fn new(x: Coord, y: Coord, z: Coord) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn sub(&self, other: &Vector3) -> Vector3 {
        Vector3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn add(&self, other: &Vector3) -> Vector3 {
        Vector3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn scale(&self, s: Coord) -> Vector3 {
        Vector3::new(self.x * s, self.y * s, self.z * s)
    }

    pub fn dot(&self, other: &Vector3) -> Coord {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn norm(&self) -> Coord {
        self.dot(self).sqrt()
    }

    /// Unit vector in the direction of `self`; panics on the zero vector.
    pub fn normalize(&self) -> Vector3 {
        let n = self.norm();
        assert!(n > 0.0, "cannot normalize the zero vector");
        self.scale(1.0 / n)
    }
}
