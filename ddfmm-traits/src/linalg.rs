//! Dense linear algebra contract (§6): `gemv` is supplied externally; the
//! core only ever calls it, shaped by the small per-wedge operator
//! matrices that come out of the translation matrix library.

use crate::Complex64;

/// `y := alpha * A * x + beta * y`, `A` row-major `m x n`.
pub trait Gemv: Sync {
    fn gemv(
        &self,
        alpha: Complex64,
        a: &[Complex64],
        m: usize,
        n: usize,
        x: &[Complex64],
        beta: Complex64,
        y: &mut [Complex64],
    );
}

/// Reference `gemv`: a plain scalar triple loop, no external BLAS binding.
/// Correct for any `m`/`n` and the only implementation this crate ships;
/// swap in a BLAS-backed `Gemv` for production-scale problem sizes.
pub struct ScalarGemv;

impl Gemv for ScalarGemv {
    fn gemv(
        &self,
        alpha: Complex64,
        a: &[Complex64],
        m: usize,
        n: usize,
        x: &[Complex64],
        beta: Complex64,
        y: &mut [Complex64],
    ) {
        assert_eq!(a.len(), m * n);
        assert_eq!(x.len(), n);
        assert_eq!(y.len(), m);
        for (i, yi) in y.iter_mut().enumerate() {
            let mut acc = Complex64::new(0.0, 0.0);
            for j in 0..n {
                acc += a[i * n + j] * x[j];
            }
            *yi = alpha * acc + beta * *yi;
        }
    }
}

/// A three-factor check-to-equivalent conversion, `V . diag(S) . U`,
/// precomputed once per wedge/level by the translation matrix library (the
/// SVD pseudo-inverse of the check-to-equivalent Gram matrix).
#[derive(Clone, Debug)]
pub struct ThreeFactor {
    pub u: Vec<Complex64>,
    pub u_rows: usize,
    pub u_cols: usize,
    pub s: Vec<f64>,
    pub v: Vec<Complex64>,
    pub v_rows: usize,
    pub v_cols: usize,
}

impl ThreeFactor {
    /// Applies `V . diag(S) . U` to a check-value vector, producing the
    /// equivalent-density vector. `gemv` is the externally-supplied dense
    /// linear algebra collaborator (§6).
    pub fn apply(&self, gemv: &dyn Gemv, check: &[Complex64]) -> Vec<Complex64> {
        assert_eq!(check.len(), self.u_cols);
        let mut stage1 = vec![Complex64::new(0.0, 0.0); self.u_rows];
        gemv.gemv(
            Complex64::new(1.0, 0.0),
            &self.u,
            self.u_rows,
            self.u_cols,
            check,
            Complex64::new(0.0, 0.0),
            &mut stage1,
        );
        assert_eq!(stage1.len(), self.s.len());
        for (v, s) in stage1.iter_mut().zip(self.s.iter()) {
            *v *= *s;
        }
        let mut out = vec![Complex64::new(0.0, 0.0); self.v_rows];
        gemv.gemv(
            Complex64::new(1.0, 0.0),
            &self.v,
            self.v_rows,
            self.v_cols,
            &stage1,
            Complex64::new(0.0, 0.0),
            &mut out,
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RefGemv;
    impl Gemv for RefGemv {
        fn gemv(
            &self,
            alpha: Complex64,
            a: &[Complex64],
            m: usize,
            n: usize,
            x: &[Complex64],
            beta: Complex64,
            y: &mut [Complex64],
        ) {
            for i in 0..m {
                let mut acc = Complex64::new(0.0, 0.0);
                for j in 0..n {
                    acc += a[i * n + j] * x[j];
                }
                y[i] = alpha * acc + beta * y[i];
            }
        }
    }

    #[test]
    fn identity_three_factor_is_a_no_op() {
        let id = vec![
            Complex64::new(1.0, 0.0),
            Complex64::new(0.0, 0.0),
            Complex64::new(0.0, 0.0),
            Complex64::new(1.0, 0.0),
        ];
        let tf = ThreeFactor {
            u: id.clone(),
            u_rows: 2,
            u_cols: 2,
            s: vec![1.0, 1.0],
            v: id,
            v_rows: 2,
            v_cols: 2,
        };
        let x = vec![Complex64::new(3.0, -1.0), Complex64::new(0.5, 2.0)];
        let y = tf.apply(&RefGemv, &x);
        assert_eq!(y, x);
    }
}
