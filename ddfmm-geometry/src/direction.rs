//! Directional wedge machinery: quantizes a unit center-separation vector
//! into a canonical direction on a level-width-dependent grid, and maps a
//! child direction to its parent on the next coarser (doubled-width) level.
//!
//! Directions are encoded as an `Index3` `(face, a, b)`: `face` picks one of
//! the six faces of a cube-map projection (the dominant axis and its sign),
//! `a`/`b` are the quantized in-face coordinates. The number of cells per
//! face grows with the box width `W`, giving the `O(W^2)` wedge count the
//! plane-wave error bound requires.

use crate::index3::Index3;
use crate::vector3::Vector3;

/// Number of quantization cells spanning `[-1, 1]` along one in-face axis at
/// box width `W`. Grows with `W` so the wedge angular resolution keeps pace
/// with the plane-wave approximation error at that width.
fn resolution(width: f64) -> i64 {
    width.abs().round().max(1.0) as i64
}

fn quantize(a: f64, n: i64) -> i64 {
    let idx = ((a + 1.0) * n as f64).floor() as i64;
    idx.clamp(0, 2 * n - 1)
}

fn cell_center(idx: i64, n: i64) -> f64 {
    ((idx as f64 + 0.5) / n as f64) - 1.0
}

/// `(face, a, b)` decomposition of a unit vector under cube-map projection.
/// `face` is `2*axis + (sign < 0)`, `axis` in `{0=x, 1=y, 2=z}`.
fn project(d: &Vector3) -> (i64, f64, f64) {
    let (ax, ay, az) = (d.x.abs(), d.y.abs(), d.z.abs());
    if ax >= ay && ax >= az {
        let face = if d.x >= 0.0 { 0 } else { 1 };
        (face, d.y / ax, d.z / ax)
    } else if ay >= ax && ay >= az {
        let face = if d.y >= 0.0 { 2 } else { 3 };
        (face, d.x / ay, d.z / ay)
    } else {
        let face = if d.z >= 0.0 { 4 } else { 5 };
        (face, d.x / az, d.y / az)
    }
}

/// Maps a unit center-separation vector `d` at box width `width` to its
/// canonical direction. `d` need not be pre-normalized.
pub fn direction(d: &Vector3, width: f64) -> Index3 {
    let d = d.normalize();
    let n = resolution(width);
    let (face, a, b) = project(&d);
    Index3::new(face, quantize(a, n), quantize(b, n))
}

/// The parent (coarser, width `2 * child_width`) direction containing the
/// child direction `d`. Reconstructs the child wedge's center point and
/// requantizes it at the parent's (coarser) resolution, so the child wedge
/// is always geometrically contained in the returned parent wedge.
/// Maps a direction `d` at `child_width` onto the direction grid of the next
/// coarser tree level (width `2 * child_width`): takes `d`'s cell center in
/// the cube-map face coordinates and requantizes it at the parent level's own
/// resolution. Because the wedge count grows with width (`O(W^2)`, so that the
/// plane-wave approximation stays accurate as boxes get electrically larger),
/// the parent's grid is never coarser than the child's — `n_parent >= n_child`
/// — so this is a deterministic *nearest-wedge* map, not a literal solid-angle
/// superset: the child's representative direction always lands inside the
/// returned parent wedge, but the child's whole wedge footprint need not. HF-
/// M2M/L2L only ever need the former (grouping children by their mapped
/// parent direction), so that is the contract this function promises.
pub fn parent_direction(d: Index3, child_width: f64) -> Index3 {
    let n_child = resolution(child_width);
    let n_parent = resolution(child_width * 2.0);
    let a = cell_center(d.j, n_child);
    let b = cell_center(d.k, n_child);
    Index3::new(d.i, quantize(a, n_parent), quantize(b, n_parent))
}

/// Enumerates every direction that occurs at box width `width`, in
/// `(face, a, b)` order. Used by the hierarchy builder to size per-box
/// directional storage and by direction-surjectivity tests.
pub fn enumerate_directions(width: f64) -> Vec<Index3> {
    let n = resolution(width);
    let mut out = Vec::with_capacity((6 * (2 * n) * (2 * n)) as usize);
    for face in 0..6 {
        for a in 0..(2 * n) {
            for b in 0..(2 * n) {
                out.push(Index3::new(face, a, b));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_aligned_vectors_round_trip_face() {
        let d = direction(&Vector3::new(1.0, 0.0, 0.0), 4.0);
        assert_eq!(d.i, 0);
        let d = direction(&Vector3::new(-1.0, 0.0, 0.0), 4.0);
        assert_eq!(d.i, 1);
    }

    #[test]
    fn parent_direction_is_enumerated_at_coarser_level() {
        let width = 8.0;
        for d in enumerate_directions(width) {
            let p = parent_direction(d, width);
            let parent_set: std::collections::HashSet<_> =
                enumerate_directions(width * 2.0).into_iter().collect();
            assert!(
                parent_set.contains(&p),
                "parent direction {:?} of child {:?} at width {} not enumerated at width {}",
                p,
                d,
                width,
                width * 2.0
            );
        }
    }

    #[test]
    fn wedge_count_grows_with_width() {
        assert!(enumerate_directions(16.0).len() > enumerate_directions(2.0).len());
    }
}
