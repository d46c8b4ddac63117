//! Geometry primitives shared by the hierarchy builder, the partitioning
//! layer, and both translation passes: Cartesian vectors, integer lattice
//! indices, box and (box, direction) keys, and the directional wedge
//! quantization.

pub mod boxkey;
pub mod direction;
pub mod index3;
pub mod vector3;

pub use boxkey::{BoxDirKey, BoxKey, UNIT_LEVEL_DIRECTION};
pub use index3::Index3;
pub use vector3::{Coord, Vector3};

/// Box width at `level`, in wavelengths, for a domain spanning `k`
/// wavelengths: `W(level) = k * 2^(-level)`.
pub fn box_width(k: f64, level: u32) -> f64 {
    k * 2f64.powi(-(level as i32))
}

/// The unit level `U`: the coarsest level with `W <= 1`, i.e.
/// `U = ceil(log2(k))`.
pub fn unit_level(k: f64) -> u32 {
    if k <= 1.0 {
        0
    } else {
        k.log2().ceil() as u32
    }
}

/// `true` iff `level` is in the high-frequency regime (box width `> 1`).
pub fn is_high_frequency(k: f64, level: u32) -> bool {
    level < unit_level(k)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_level_is_the_w_le_1_boundary() {
        let k = 8.0;
        let u = unit_level(k);
        assert!(box_width(k, u) <= 1.0);
        if u > 0 {
            assert!(box_width(k, u - 1) > 1.0);
        }
    }

    #[test]
    fn k_less_than_one_has_unit_level_zero() {
        assert_eq!(unit_level(0.5), 0);
        assert!(!is_high_frequency(0.5, 0));
    }
}
