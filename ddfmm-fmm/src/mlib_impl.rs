//! A reference `Mlib` (§6): builds M2M/M2L/L2L operators from direct kernel
//! evaluations between the equivalent/check surfaces of §4.5/§4.6, caching
//! them per `(width_bits, direction)` so repeated levels reuse the same
//! dense blocks. Real deployments are expected to swap in a translation
//! matrix library tuned for the target kernel; this one exists so the rest
//! of the crate has something concrete to translate against.

use crate::surfaces::{
    downward_check_surface, downward_equivalent_surface, upward_check_surface,
    upward_equivalent_surface,
};
use ddfmm_geometry::{Index3, Vector3};
use ddfmm_traits::{Complex64, Kernel, Mlib, ThreeFactor, TranslationOperators};
use std::collections::HashMap;
use std::sync::Mutex;

/// Regularization floor added to the check-to-equivalent normal equations;
/// keeps the solve well-posed when the surface sampling is coarse relative
/// to the kernel's oscillation.
const REGULARIZATION: f64 = 1e-10;

pub struct SurfaceMlib<'k> {
    kernel: &'k dyn Kernel,
    npq: usize,
    cache: Mutex<HashMap<(u64, Option<Index3>), TranslationOperators>>,
}

impl<'k> SurfaceMlib<'k> {
    pub fn new(kernel: &'k dyn Kernel, npq: usize) -> Self {
        Self {
            kernel,
            npq,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn build(&self, width: f64, direction: Option<Index3>) -> TranslationOperators {
        let half_width = width / 2.0;
        let origin = Vector3::zero();

        let uc = upward_check_surface(origin, half_width, self.npq);
        let ue = upward_equivalent_surface(origin, half_width, self.npq);
        let dc = downward_check_surface(origin, half_width, self.npq);
        let de = downward_equivalent_surface(origin, half_width, self.npq);

        let uc2ue = surface_pseudo_inverse(self.kernel, &uc, &ue);
        let dc2de = surface_pseudo_inverse(self.kernel, &dc, &de);

        let child_half_width = half_width / 2.0;
        let mut ue2uc: [Vec<Complex64>; 8] = Default::default();
        let mut de2dc: [Vec<Complex64>; 8] = Default::default();
        for octant in 0..8usize {
            let offset = octant_offset(octant).scale(child_half_width);
            let child_ue = upward_equivalent_surface(offset, child_half_width, self.npq);
            let child_dc = downward_check_surface(offset, child_half_width, self.npq);
            ue2uc[octant] = self.kernel.evaluate(&uc, &child_ue);
            de2dc[octant] = self.kernel.evaluate(&child_dc, &de);
        }

        // Every surface is sampled with the same `npq`, so `uc`, `ue`, `dc`,
        // and `de` all carry the same point count and the child-indexed
        // operators share one `(rows, cols)` shape.
        TranslationOperators {
            uc2ue,
            ue2uc,
            dc2de,
            de2dc,
            child_op_rows: uc.len(),
            child_op_cols: ue.len(),
        }
    }
}

/// The unit cube displacement of child octant `o` (sibling-index encoding,
/// matching `BoxKey::sibling_index`): bit 0 -> x, bit 1 -> y, bit 2 -> z.
fn octant_offset(o: usize) -> Vector3 {
    let sign = |bit: usize| if o & (1 << bit) != 0 { 1.0 } else { -1.0 };
    Vector3::new(sign(0), sign(1), sign(2))
}

/// `(A^H A + eps I)^-1 A^H` for `A = kernel(check, equivalent)`, returned as
/// a `ThreeFactor` with a trivial `(U, S, V) = (pinv, 1, I)` split so
/// `ThreeFactor::apply` reduces to a single `pinv * check` product.
fn surface_pseudo_inverse(kernel: &dyn Kernel, check: &[Vector3], equivalent: &[Vector3]) -> ThreeFactor {
    let m = check.len();
    let n = equivalent.len();
    let a = kernel.evaluate(check, equivalent); // m x n

    // gram = A^H A (n x n), rhs = A^H (n x m)
    let mut gram = vec![Complex64::new(0.0, 0.0); n * n];
    let mut rhs = vec![Complex64::new(0.0, 0.0); n * m];
    for i in 0..n {
        for j in 0..n {
            let mut acc = Complex64::new(0.0, 0.0);
            for r in 0..m {
                acc += a[r * n + i].conj() * a[r * n + j];
            }
            gram[i * n + j] = acc;
        }
        gram[i * n + i] += Complex64::new(REGULARIZATION, 0.0);
        for r in 0..m {
            rhs[i * m + r] = a[r * n + i].conj();
        }
    }

    let pinv = solve_dense(gram, n, rhs, m); // n x m

    ThreeFactor {
        u: pinv,
        u_rows: n,
        u_cols: m,
        s: vec![1.0; n],
        v: identity(n),
        v_rows: n,
        v_cols: n,
    }
}

fn identity(n: usize) -> Vec<Complex64> {
    let mut out = vec![Complex64::new(0.0, 0.0); n * n];
    for i in 0..n {
        out[i * n + i] = Complex64::new(1.0, 0.0);
    }
    out
}

/// Solves `a * x = b` for the `n x n` matrix `a` and `n x cols` right-hand
/// side `b`, both row-major, via Gaussian elimination with partial
/// pivoting. Returns `x`, `n x cols` row-major.
fn solve_dense(mut a: Vec<Complex64>, n: usize, mut b: Vec<Complex64>, cols: usize) -> Vec<Complex64> {
    for col in 0..n {
        let mut pivot = col;
        let mut best = a[col * n + col].norm();
        for row in (col + 1)..n {
            let mag = a[row * n + col].norm();
            if mag > best {
                best = mag;
                pivot = row;
            }
        }
        if pivot != col {
            for k in 0..n {
                a.swap(col * n + k, pivot * n + k);
            }
            for k in 0..cols {
                b.swap(col * cols + k, pivot * cols + k);
            }
        }
        let diag = a[col * n + col];
        let diag = if diag.norm() < 1e-300 { Complex64::new(1e-300, 0.0) } else { diag };
        for row in (col + 1)..n {
            let factor = a[row * n + col] / diag;
            if factor.norm() == 0.0 {
                continue;
            }
            for k in col..n {
                a[row * n + k] -= factor * a[col * n + k];
            }
            for k in 0..cols {
                b[row * cols + k] -= factor * b[col * cols + k];
            }
        }
    }

    for col in (0..n).rev() {
        let diag = a[col * n + col];
        let diag = if diag.norm() < 1e-300 { Complex64::new(1e-300, 0.0) } else { diag };
        for k in 0..cols {
            let mut acc = b[col * cols + k];
            for j in (col + 1)..n {
                acc -= a[col * n + j] * b[j * cols + k];
            }
            b[col * cols + k] = acc / diag;
        }
    }
    b
}

impl<'k> Mlib for SurfaceMlib<'k> {
    fn lookup(&self, width: f64, direction: Option<Index3>) -> TranslationOperators {
        let key = (width.to_bits(), direction);
        if let Some(cached) = self.cache.lock().unwrap().get(&key) {
            return cached.clone();
        }
        let ops = self.build(width, direction);
        self.cache.lock().unwrap().insert(key, ops.clone());
        ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddfmm_traits::kernel::HelmholtzKernel;

    #[test]
    fn lookup_is_cached_across_repeated_calls() {
        let kernel = HelmholtzKernel { wavenumber: 1.0 };
        let mlib = SurfaceMlib::new(&kernel, 3);
        let a = mlib.lookup(1.0, None);
        let b = mlib.lookup(1.0, None);
        assert_eq!(a.child_op_cols, b.child_op_cols);
    }

    #[test]
    fn uc2ue_round_trips_a_surface_sampled_density() {
        let kernel = HelmholtzKernel { wavenumber: 0.5 };
        let mlib = SurfaceMlib::new(&kernel, 3);
        let ops = mlib.lookup(1.0, None);
        let gemv = ddfmm_traits::linalg::ScalarGemv;
        let check = vec![Complex64::new(1.0, 0.0); ops.uc2ue.u_cols];
        let equivalent = ops.uc2ue.apply(&gemv, &check);
        assert_eq!(equivalent.len(), ops.uc2ue.v_rows);
    }
}
