//! Upward/downward equivalent and check surfaces (`uep`/`dcp`/`dep`): the
//! sample points M2M/M2L/L2L operators are defined on.

use ddfmm_geometry::Vector3;

/// Samples a cube surface of half-width `radius` centered at `center`,
/// `npq` points per edge per face (six faces, `6 * npq^2` points total).
pub fn cube_surface(center: Vector3, radius: f64, npq: usize) -> Vec<Vector3> {
    let npq = npq.max(2);
    let mut out = Vec::with_capacity(6 * npq * npq);
    let step = 2.0 / (npq as f64 - 1.0);
    let coord = |i: usize| -1.0 + step * i as f64;
    for face in 0..3 {
        for sign in [-1.0, 1.0] {
            for a in 0..npq {
                for b in 0..npq {
                    let (u, v) = (coord(a), coord(b));
                    let local = match face {
                        0 => Vector3::new(sign, u, v),
                        1 => Vector3::new(u, sign, v),
                        _ => Vector3::new(u, v, sign),
                    };
                    out.push(center.add(&local.scale(radius)));
                }
            }
        }
    }
    out
}

/// Upward equivalent surface: slightly inside the box, radius `0.9 *
/// half_width`.
pub fn upward_equivalent_surface(center: Vector3, half_width: f64, npq: usize) -> Vec<Vector3> {
    cube_surface(center, 0.9 * half_width, npq)
}

/// Upward check surface: slightly outside the box, radius `1.5 *
/// half_width`.
pub fn upward_check_surface(center: Vector3, half_width: f64, npq: usize) -> Vec<Vector3> {
    cube_surface(center, 1.5 * half_width, npq)
}

/// Downward equivalent surface: slightly outside the box (symmetric to the
/// upward check surface), radius `1.5 * half_width`.
pub fn downward_equivalent_surface(center: Vector3, half_width: f64, npq: usize) -> Vec<Vector3> {
    cube_surface(center, 1.5 * half_width, npq)
}

/// Downward check surface: slightly inside the box, radius `0.9 *
/// half_width`.
pub fn downward_check_surface(center: Vector3, half_width: f64, npq: usize) -> Vec<Vector3> {
    cube_surface(center, 0.9 * half_width, npq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_point_count_matches_formula() {
        let pts = cube_surface(Vector3::zero(), 1.0, 4);
        assert_eq!(pts.len(), 6 * 4 * 4);
    }
}
