//! The kernel contract (§6): fills a dense matrix of kernel evaluations
//! between target and source point sets. The core never constructs a
//! kernel itself; it is supplied by the acoustic front-end.

use crate::Complex64;
use ddfmm_geometry::Vector3;

/// `kernel(targets, sources) -> M[m x n]`, row-major, `M[t * n + s]` the
/// interaction between `targets[t]` and `sources[s]`.
pub trait Kernel: Sync {
    /// Must be deterministic for a fixed kernel configuration.
    fn evaluate(&self, targets: &[Vector3], sources: &[Vector3]) -> Vec<Complex64>;
}

/// The free-space Helmholtz Green's function `exp(i*kappa*r) / (4*pi*r)`,
/// used directly by tests that compare the FMM result against a brute-force
/// `O(N^2)` sum (§8 scenarios 1-3).
pub struct HelmholtzKernel {
    pub wavenumber: f64,
}

impl Kernel for HelmholtzKernel {
    fn evaluate(&self, targets: &[Vector3], sources: &[Vector3]) -> Vec<Complex64> {
        let mut out = Vec::with_capacity(targets.len() * sources.len());
        for t in targets {
            for s in sources {
                let r = t.sub(s).norm();
                if r < 1e-14 {
                    out.push(Complex64::new(0.0, 0.0));
                } else {
                    let phase = Complex64::new(0.0, self.wavenumber * r).exp();
                    out.push(phase / (4.0 * std::f64::consts::PI * r));
                }
            }
        }
        out
    }
}
