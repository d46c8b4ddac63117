//! The FFT contract (§6): fixed-plan forward/backward 3D complex
//! transforms on `(2P, 2P, 2P)` grids, used by the low-frequency V-list
//! translation (§4.5).

use crate::Complex64;
use fftw::array::AlignedVec;
use fftw::plan::{C2CPlan, C2CPlan64};
use fftw::types::{Flag, Sign};

pub trait Fft {
    /// Side length `2P` of the cubic transform grid.
    fn side(&self) -> usize;
    fn forward(&mut self, grid: &mut [Complex64]);
    fn backward(&mut self, grid: &mut [Complex64]);
}

/// Fixed-plan `fftw` transform over a `(side, side, side)` grid, planned
/// once at construction and reused for every V-list sweep.
pub struct FftwFft {
    side: usize,
    forward_plan: C2CPlan64,
    backward_plan: C2CPlan64,
    scratch: AlignedVec<fftw::types::c64>,
}

impl FftwFft {
    pub fn new(side: usize) -> Self {
        let dims = [side, side, side];
        let forward_plan = C2CPlan64::aligned(&dims, Sign::Forward, Flag::MEASURE)
            .expect("failed to plan forward FFT");
        let backward_plan = C2CPlan64::aligned(&dims, Sign::Backward, Flag::MEASURE)
            .expect("failed to plan backward FFT");
        Self {
            side,
            forward_plan,
            backward_plan,
            scratch: AlignedVec::new(side * side * side),
        }
    }
}

impl Fft for FftwFft {
    fn side(&self) -> usize {
        self.side
    }

    fn forward(&mut self, grid: &mut [Complex64]) {
        assert_eq!(grid.len(), self.side * self.side * self.side);
        for (dst, src) in self.scratch.iter_mut().zip(grid.iter()) {
            *dst = fftw::types::c64::new(src.re, src.im);
        }
        self.forward_plan
            .c2c(&mut self.scratch.clone(), &mut self.scratch)
            .expect("forward FFT failed");
        for (dst, src) in grid.iter_mut().zip(self.scratch.iter()) {
            *dst = Complex64::new(src.re, src.im);
        }
    }

    fn backward(&mut self, grid: &mut [Complex64]) {
        assert_eq!(grid.len(), self.side * self.side * self.side);
        for (dst, src) in self.scratch.iter_mut().zip(grid.iter()) {
            *dst = fftw::types::c64::new(src.re, src.im);
        }
        self.backward_plan
            .c2c(&mut self.scratch.clone(), &mut self.scratch)
            .expect("backward FFT failed");
        for (dst, src) in grid.iter_mut().zip(self.scratch.iter()) {
            *dst = Complex64::new(src.re, src.im);
        }
    }
}

/// An in-memory reference transform, used by unit tests that want an exact
/// DFT without linking `fftw`.
pub struct NaiveDft {
    side: usize,
}

impl NaiveDft {
    pub fn new(side: usize) -> Self {
        Self { side }
    }

    fn transform(&self, grid: &mut [Complex64], sign: f64) {
        let n = self.side;
        let total = n * n * n;
        let mut out = vec![Complex64::new(0.0, 0.0); total];
        let idx = |a: usize, b: usize, c: usize| (a * n + b) * n + c;
        for (oa, oo) in out.chunks_mut(n * n).enumerate() {
            for (ob, oline) in oo.chunks_mut(n).enumerate() {
                for (oc, slot) in oline.iter_mut().enumerate() {
                    let mut acc = Complex64::new(0.0, 0.0);
                    for a in 0..n {
                        for b in 0..n {
                            for c in 0..n {
                                let phase = sign
                                    * 2.0
                                    * std::f64::consts::PI
                                    * ((oa * a) as f64 / n as f64
                                        + (ob * b) as f64 / n as f64
                                        + (oc * c) as f64 / n as f64);
                                acc += grid[idx(a, b, c)] * Complex64::new(0.0, phase).exp();
                            }
                        }
                    }
                    *slot = acc;
                }
            }
        }
        grid.copy_from_slice(&out);
    }
}

impl Fft for NaiveDft {
    fn side(&self) -> usize {
        self.side
    }

    fn forward(&mut self, grid: &mut [Complex64]) {
        self.transform(grid, -1.0);
    }

    fn backward(&mut self, grid: &mut [Complex64]) {
        self.transform(grid, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naive_dft_forward_backward_round_trips() {
        let n = 4;
        let mut dft = NaiveDft::new(n);
        let mut grid: Vec<Complex64> = (0..n * n * n)
            .map(|i| Complex64::new(i as f64, 0.0))
            .collect();
        let original = grid.clone();
        dft.forward(&mut grid);
        dft.backward(&mut grid);
        let scale = (n * n * n) as f64;
        for (a, b) in grid.iter().zip(original.iter()) {
            assert!((a / scale - b).norm() < 1e-9);
        }
    }
}
