//! Single-process evaluation sequencing (§4.8): upward traversal, the
//! unit-level handoff, downward traversal. Distributing this across
//! processes — prefetching required data before each level via the DAV —
//! is the root crate's job; this module is the part of the driver that is
//! the same whether or not MPI is involved.

use crate::{high_frequency, low_frequency};
use ddfmm_geometry::BoxDirKey;
use ddfmm_traits::{Complex64, Fft, Gemv, Kernel, Mlib};
use ddfmm_tree::{BoxDirData, Hierarchy};
use log::debug;
use std::collections::HashMap;
use std::time::Instant;

/// Per-phase wall-clock time in milliseconds, keyed by phase name.
pub type TimeDict = HashMap<String, u128>;

pub struct Evaluator<'a> {
    pub hierarchy: &'a mut Hierarchy,
    pub boxdir: HashMap<BoxDirKey, BoxDirData>,
}

impl<'a> Evaluator<'a> {
    pub fn new(hierarchy: &'a mut Hierarchy) -> Self {
        Self {
            hierarchy,
            boxdir: HashMap::new(),
        }
    }

    fn max_level(&self) -> u32 {
        self.hierarchy.boxes.keys().map(|k| k.level).max().unwrap_or(0)
    }

    /// Upward traversal: finest to coarsest, L-M2M for `level >= U`, then
    /// HF-M2M for `level < U`.
    pub fn upward_pass(
        &mut self,
        mlib: &dyn Mlib,
        gemv: &dyn Gemv,
        kernel: &dyn Kernel,
        npq: usize,
    ) -> TimeDict {
        let unit_level = self.hierarchy.unit_level();
        let max_level = self.max_level();
        let mut times = TimeDict::new();

        let start = Instant::now();
        for level in (unit_level..=max_level).rev() {
            debug!("upward pass: L-M2M at level {level}");
            let deltas = low_frequency::l_m2m(self.hierarchy, level, mlib, gemv, kernel, npq);
            for (key, density) in deltas {
                self.hierarchy.boxes.get_mut(&key).unwrap().upward_equivalent_density = density;
            }
        }
        times.insert("l_m2m".to_string(), start.elapsed().as_millis());

        if unit_level == 0 {
            return times;
        }
        let start = Instant::now();
        for level in (0..unit_level).rev() {
            debug!("upward pass: HF-M2M at level {level}");
            let deltas = high_frequency::hf_m2m(self.hierarchy, &self.boxdir, level, mlib, gemv);
            for (key, density) in deltas {
                self.boxdir.entry(key).or_default().upward_equivalent_density = density;
            }
        }
        times.insert("hf_m2m".to_string(), start.elapsed().as_millis());
        times
    }

    /// Downward traversal: HF-M2L/HF-L2L coarsest to `U-1`, then L-M2L/L-L2L
    /// `U` to the leaves.
    pub fn downward_pass(
        &mut self,
        mlib: &dyn Mlib,
        gemv: &dyn Gemv,
        kernel: &dyn Kernel,
        fft: &mut dyn Fft,
        npq: usize,
    ) -> TimeDict {
        let unit_level = self.hierarchy.unit_level();
        let max_level = self.max_level();
        let mut times = TimeDict::new();

        let start = Instant::now();
        for level in 0..unit_level {
            debug!("downward pass: HF-M2L/HF-L2L at level {level}");
            let m2l_deltas = high_frequency::hf_m2l(self.hierarchy, &self.boxdir, level, kernel, gemv, npq);
            for (key, check) in m2l_deltas {
                let entry = self.boxdir.entry(key).or_default();
                if entry.downward_check_value.is_empty() {
                    entry.downward_check_value = check;
                } else {
                    for (a, b) in entry.downward_check_value.iter_mut().zip(check.iter()) {
                        *a += *b;
                    }
                }
            }
            let (dir_deltas, plain_deltas) = high_frequency::hf_l2l(self.hierarchy, &self.boxdir, level, mlib, gemv);
            for (key, check) in dir_deltas {
                add_check(&mut self.boxdir.entry(key).or_default().downward_check_value, &check);
            }
            for (key, check) in plain_deltas {
                let b = self.hierarchy.boxes.get_mut(&key).unwrap();
                add_check(&mut b.downward_check_value, &check);
            }
        }
        times.insert("hf_m2l_l2l".to_string(), start.elapsed().as_millis());

        let start = Instant::now();
        for level in unit_level..=max_level {
            debug!("downward pass: L-M2L/L-L2L at level {level}");
            let (target_deltas, check_deltas) =
                low_frequency::l_m2l(self.hierarchy, level, mlib, gemv, kernel, fft, npq);
            for (key, values) in target_deltas {
                let b = self.hierarchy.boxes.get_mut(&key).unwrap();
                if b.target_values.is_empty() {
                    b.target_values = values;
                } else {
                    add_check(&mut b.target_values, &values);
                }
            }
            for (key, check) in check_deltas {
                add_check(&mut self.hierarchy.boxes.get_mut(&key).unwrap().downward_check_value, &check);
            }

            let (child_check, target_contrib) = low_frequency::l_l2l(self.hierarchy, level, mlib, gemv, kernel, npq);
            for (key, check) in child_check {
                add_check(&mut self.hierarchy.boxes.get_mut(&key).unwrap().downward_check_value, &check);
            }
            for (key, values) in target_contrib {
                let b = self.hierarchy.boxes.get_mut(&key).unwrap();
                if b.target_values.is_empty() {
                    b.target_values = values;
                } else {
                    add_check(&mut b.target_values, &values);
                }
            }
        }
        times.insert("l_m2l_l2l".to_string(), start.elapsed().as_millis());
        times
    }

    pub fn run(&mut self, mlib: &dyn Mlib, gemv: &dyn Gemv, kernel: &dyn Kernel, fft: &mut dyn Fft, npq: usize) -> TimeDict {
        let mut times = self.upward_pass(mlib, gemv, kernel, npq);
        times.extend(self.downward_pass(mlib, gemv, kernel, fft, npq));
        times
    }
}

fn add_check(dst: &mut Vec<Complex64>, src: &[Complex64]) {
    if dst.is_empty() {
        *dst = src.to_vec();
        return;
    }
    for (a, b) in dst.iter_mut().zip(src.iter()) {
        *a += *b;
    }
}
