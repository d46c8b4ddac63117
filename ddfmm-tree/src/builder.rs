//! The hierarchy builder (§4.3): recursive octree subdivision from source
//! and target points, and the per-box U/V/W/X/E near-field lists.

use crate::data::{BoxData, NearFieldLists};
use ddfmm_geometry::{box_width, direction, unit_level, BoxKey, Index3, Vector3};
use ddfmm_traits::Complex64;
use itertools::iproduct;
use log::debug;
use std::collections::HashMap;

/// The sparse adaptive octree: occupied boxes and their data, plus the
/// domain frame used to map points to box keys and back.
pub struct Hierarchy {
    pub boxes: HashMap<BoxKey, BoxData>,
    pub domain_center: Vector3,
    pub domain_side: f64,
    pub maxlevel: u32,
    pub k: f64,
}

impl Hierarchy {
    /// Box center in physical coordinates.
    pub fn box_center(&self, key: &BoxKey) -> Vector3 {
        let cell = self.domain_side / 2f64.powi(key.level as i32);
        let origin = self.domain_center.sub(&Vector3::new(
            self.domain_side / 2.0,
            self.domain_side / 2.0,
            self.domain_side / 2.0,
        ));
        Vector3::new(
            origin.x + (key.index.i as f64 + 0.5) * cell,
            origin.y + (key.index.j as f64 + 0.5) * cell,
            origin.z + (key.index.k as f64 + 0.5) * cell,
        )
    }

    pub fn box_half_width(&self, key: &BoxKey) -> f64 {
        0.5 * self.domain_side / 2f64.powi(key.level as i32)
    }

    pub fn unit_level(&self) -> u32 {
        unit_level(self.k)
    }

    pub fn is_high_frequency(&self, level: u32) -> bool {
        ddfmm_geometry::is_high_frequency(self.k, level)
    }

    fn map_point_to_index(&self, p: &Vector3, level: u32) -> Index3 {
        let n = 2f64.powi(level as i32);
        let origin = self.domain_center.sub(&Vector3::new(
            self.domain_side / 2.0,
            self.domain_side / 2.0,
            self.domain_side / 2.0,
        ));
        let to_idx = |coord: f64, orig: f64| -> i64 {
            let u = (coord - orig) / self.domain_side;
            ((u * n).floor() as i64).clamp(0, n as i64 - 1)
        };
        Index3::new(
            to_idx(p.x, origin.x),
            to_idx(p.y, origin.y),
            to_idx(p.z, origin.z),
        )
    }

    fn physically_adjacent(&self, a: &BoxKey, b: &BoxKey) -> bool {
        let ca = self.box_center(a);
        let cb = self.box_center(b);
        let gap = (ca.x - cb.x)
            .abs()
            .max((ca.y - cb.y).abs())
            .max((ca.z - cb.z).abs());
        gap <= self.box_half_width(a) + self.box_half_width(b) + 1e-9
    }

    /// Builds the sparse octree from source and target points, subdividing
    /// any box holding more than `ptsmax` points down to `maxlevel`.
    pub fn build(
        sources: Vec<(Vector3, Complex64)>,
        targets: Vec<(Vector3, Complex64)>,
        ptsmax: usize,
        maxlevel: u32,
        domain_center: Vector3,
        domain_side: f64,
        k: f64,
    ) -> Self {
        let mut tree = Hierarchy {
            boxes: HashMap::new(),
            domain_center,
            domain_side,
            maxlevel,
            k,
        };
        tree.subdivide(BoxKey::root(), sources, targets, ptsmax);
        debug!("hierarchy built: {} occupied boxes, unit level {}", tree.boxes.len(), tree.unit_level());
        tree
    }

    fn subdivide(
        &mut self,
        key: BoxKey,
        sources: Vec<(Vector3, Complex64)>,
        targets: Vec<(Vector3, Complex64)>,
        ptsmax: usize,
    ) {
        if sources.is_empty() && targets.is_empty() {
            return;
        }
        let total = sources.len() + targets.len();
        if total <= ptsmax || key.level >= self.maxlevel {
            let data = BoxData {
                terminal: true,
                source_positions: sources.iter().map(|(p, _)| *p).collect(),
                source_densities: sources.iter().map(|(_, d)| *d).collect(),
                target_positions: targets.iter().map(|(p, _)| *p).collect(),
                target_values: vec![Complex64::new(0.0, 0.0); targets.len()],
                ..Default::default()
            };
            self.boxes.insert(key, data);
            return;
        }

        let mut child_sources: HashMap<usize, Vec<(Vector3, Complex64)>> = HashMap::new();
        let mut child_targets: HashMap<usize, Vec<(Vector3, Complex64)>> = HashMap::new();
        let children = key.children();
        let child_level = key.level + 1;
        for (p, d) in sources {
            let idx = self.map_point_to_index(&p, child_level);
            let slot = children
                .iter()
                .position(|c| c.index == idx)
                .expect("point mapped outside the octant grid");
            child_sources.entry(slot).or_default().push((p, d));
        }
        for (p, d) in targets {
            let idx = self.map_point_to_index(&p, child_level);
            let slot = children
                .iter()
                .position(|c| c.index == idx)
                .expect("point mapped outside the octant grid");
            child_targets.entry(slot).or_default().push((p, d));
        }

        self.boxes.insert(
            key,
            BoxData {
                terminal: false,
                ..Default::default()
            },
        );

        for (slot, child) in children.into_iter().enumerate() {
            let s = child_sources.remove(&slot).unwrap_or_default();
            let t = child_targets.remove(&slot).unwrap_or_default();
            self.subdivide(child, s, t, ptsmax);
        }
    }

    /// Computes U/V/W/X lists for every low-frequency box and the
    /// directional E-list for every high-frequency box.
    pub fn compute_lists(&mut self) {
        debug!("computing near-field lists for {} boxes", self.boxes.len());
        let keys: Vec<BoxKey> = self.boxes.keys().copied().collect();
        let u = self.unit_level();

        let mut lists: HashMap<BoxKey, NearFieldLists> = HashMap::new();
        for &key in &keys {
            let list = if key.level >= u {
                self.low_frequency_lists(key, &keys)
            } else {
                self.high_frequency_lists(key, &keys)
            };
            lists.insert(key, list);
        }
        for (key, list) in lists {
            if let Some(b) = self.boxes.get_mut(&key) {
                b.lists = list;
            }
        }
    }

    fn occupied_at_level(&self, index: Index3, level: u32, all: &[BoxKey]) -> Option<BoxKey> {
        let target = BoxKey::new(level, index);
        all.iter().find(|k| **k == target).copied()
    }

    fn neighbor_indices(key: &BoxKey) -> Vec<Index3> {
        iproduct!(-1..=1, -1..=1, -1..=1)
            .filter(|&(di, dj, dk)| (di, dj, dk) != (0, 0, 0))
            .map(|(di, dj, dk)| Index3::new(key.index.i + di, key.index.j + dj, key.index.k + dk))
            .collect()
    }

    fn low_frequency_lists(&self, key: BoxKey, all: &[BoxKey]) -> NearFieldLists {
        let mut lists = NearFieldLists::default();

        for idx in Self::neighbor_indices(&key) {
            if let Some(n) = self.occupied_at_level(idx, key.level, all) {
                if self.boxes[&n].terminal {
                    lists.u.push(n);
                }
            }
        }

        if key.level >= 2 {
            if let Some(parent) = key.parent() {
                for pidx in Self::neighbor_indices(&parent) {
                    let pn = BoxKey::new(parent.level, pidx);
                    for child in pn.children() {
                        if all.contains(&child) && child.index.chebyshev_distance(&key.index) > 1 {
                            lists.v.push(child);
                        }
                    }
                }
            }
        }

        // W-list: coarser occupied-terminal boxes near an ancestor of `key`
        // that are not themselves adjacent to `key`.
        let mut ancestor = key.parent();
        while let Some(a) = ancestor {
            for aidx in Self::neighbor_indices(&a) {
                let cand = BoxKey::new(a.level, aidx);
                if let Some(found) = all.iter().find(|k| **k == cand) {
                    if self.boxes[found].terminal && !self.physically_adjacent(found, &key) {
                        lists.w.push(*found);
                    }
                }
            }
            ancestor = a.parent();
        }

        // X-list: finer occupied-terminal descendants of `key`'s same-level
        // neighbors that are not adjacent to `key`.
        for idx in Self::neighbor_indices(&key) {
            if self.occupied_at_level(idx, key.level, all).is_some() {
                continue; // already handled as U
            }
            for cand in all {
                if cand.level > key.level
                    && !self.physically_adjacent(cand, &key)
                    && self.boxes[cand].terminal
                    && cand.ancestor_at(key.level).index == idx
                {
                    lists.x.push(*cand);
                }
            }
        }

        lists
    }

    fn high_frequency_lists(&self, key: BoxKey, all: &[BoxKey]) -> NearFieldLists {
        let mut lists = NearFieldLists::default();
        let w = box_width(self.k, key.level);
        let center = self.box_center(&key);
        for &s in all {
            if s == key || s.level != key.level {
                continue;
            }
            if key.index.chebyshev_distance(&s.index) <= 1 {
                continue;
            }
            let d = center.sub(&self.box_center(&s));
            let dir = direction(&d, w);
            lists.e.entry(dir).or_default().push(s);
        }
        lists
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(n: usize, seed: u64) -> Vec<(Vector3, Complex64)> {
        let mut state = seed;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((state >> 33) as f64 / u32::MAX as f64) - 0.5
        };
        (0..n)
            .map(|_| (Vector3::new(next(), next(), next()), Complex64::new(1.0, 0.0)))
            .collect()
    }

    #[test]
    fn single_box_stays_at_root_under_ptsmax() {
        let h = Hierarchy::build(pts(10, 1), pts(10, 2), 100, 5, Vector3::zero(), 1.0, 0.5);
        assert_eq!(h.boxes.len(), 1);
        assert!(h.boxes[&BoxKey::root()].terminal);
    }

    #[test]
    fn subdivision_respects_ptsmax() {
        let h = Hierarchy::build(pts(500, 3), pts(500, 4), 50, 6, Vector3::zero(), 1.0, 1.0);
        for (key, data) in &h.boxes {
            if data.terminal {
                assert!(
                    data.source_positions.len() + data.target_positions.len() <= 50
                        || key.level >= h.maxlevel
                );
            }
        }
    }

    #[test]
    fn parent_occupied_iff_child_occupied() {
        let mut h = Hierarchy::build(pts(500, 5), pts(500, 6), 20, 6, Vector3::zero(), 1.0, 1.0);
        h.compute_lists();
        for key in h.boxes.keys() {
            if key.level > 0 {
                assert!(h.boxes.contains_key(&key.parent().unwrap()));
            }
        }
    }
}
