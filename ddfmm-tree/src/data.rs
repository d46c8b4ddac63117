//! Per-box data (§3 Box data / Lifecycle).

use ddfmm_geometry::{BoxKey, Index3, Vector3};
use ddfmm_traits::Complex64;
use std::collections::HashMap;

/// A box's near-field lists, keyed at the low-frequency leaves/internals,
/// plus the directional E-list at high-frequency target boxes.
#[derive(Clone, Debug, Default)]
pub struct NearFieldLists {
    /// Direct neighbors (same level, adjacent).
    pub u: Vec<BoxKey>,
    /// Interaction list: same level, parent-adjacent, self not adjacent.
    pub v: Vec<BoxKey>,
    /// Coarser near-source boxes.
    pub w: Vec<BoxKey>,
    /// Finer near-source boxes.
    pub x: Vec<BoxKey>,
    /// Directional far-field list, grouped by direction (`fndeidxvec`).
    pub e: HashMap<Index3, Vec<BoxKey>>,
}

/// The FFT cache for a source box's upward equivalent density (§3, §4.5
/// V-list). Materialized lazily by the first V-list consumer and freed once
/// `fftcnt` reaches `fftnum`.
#[derive(Clone, Debug, Default)]
pub struct FftCache {
    pub transform: Option<Vec<Complex64>>,
    pub fftcnt: usize,
    pub fftnum: usize,
}

impl FftCache {
    /// Records one more consumer having used the cached transform; frees it
    /// once every expected consumer (`fftnum`) has done so.
    pub fn record_use(&mut self) {
        assert!(
            self.transform.is_some(),
            "recorded a V-list use of an unmaterialized FFT cache"
        );
        self.fftcnt += 1;
        if self.fftcnt >= self.fftnum {
            self.transform = None;
            self.fftcnt = 0;
        }
    }
}

/// The data carried by one occupied box: external particle data at leaves,
/// the multipole/local representation, and the near-field lists.
#[derive(Clone, Debug, Default)]
pub struct BoxData {
    pub terminal: bool,

    pub source_positions: Vec<Vector3>,
    pub source_densities: Vec<Complex64>,
    pub target_positions: Vec<Vector3>,
    pub target_values: Vec<Complex64>,

    pub upward_equivalent_density: Vec<Complex64>,
    pub downward_check_value: Vec<Complex64>,

    pub fft_cache: FftCache,

    pub lists: NearFieldLists,
}

impl BoxData {
    pub fn sparse(&self) -> bool {
        self.terminal && self.source_positions.len() + self.target_positions.len() < 32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fft_cache_frees_after_expected_consumer_count() {
        let mut cache = FftCache {
            transform: Some(vec![Complex64::new(1.0, 0.0)]),
            fftcnt: 0,
            fftnum: 3,
        };
        cache.record_use();
        cache.record_use();
        assert!(cache.transform.is_some());
        cache.record_use();
        assert!(cache.transform.is_none());
        assert_eq!(cache.fftcnt, 0);
    }
}

/// The outgoing/incoming data attached to a `(box, direction)` key at a
/// high-frequency level (§3).
#[derive(Clone, Debug, Default)]
pub struct BoxDirData {
    pub upward_equivalent_density: Vec<Complex64>,
    pub downward_check_value: Vec<Complex64>,
    /// Source boxes whose center-separation direction from this target
    /// equals the key's direction.
    pub interaction_list: Vec<BoxKey>,
}

impl BoxDirData {
    pub fn is_outgoing(&self) -> bool {
        !self.upward_equivalent_density.is_empty()
    }

    pub fn is_incoming(&self) -> bool {
        !self.interaction_list.is_empty()
    }
}
