//! Partition descriptors (§4.2): per-level owner lookups over a pair of
//! parallel `start[]`/`end[]` interval arrays, one interval per process.

use ddfmm_geometry::BoxKey;
use mpi::Rank;

/// Sentinel returned by `owner` when a key falls in none of the intervals —
/// a consistency-check failure, not a normal outcome.
pub const UNASSIGNED: Rank = -1;

/// `start[i]..=end[i]` is the closed interval of keys owned by rank `i`.
/// Built once per level by the partitioning pipeline (§4.7 step 4) from an
/// all-gather of each rank's first and last post-sort key.
#[derive(Clone, Debug, Default)]
pub struct PartitionDescriptor<K> {
    start: Vec<K>,
    end: Vec<K>,
}

impl<K: Ord + Clone> PartitionDescriptor<K> {
    pub fn new(start: Vec<K>, end: Vec<K>) -> Self {
        assert_eq!(start.len(), end.len());
        Self { start, end }
    }

    pub fn process_count(&self) -> usize {
        self.start.len()
    }

    /// Binary search for the largest `i` with `start[i] <= key`; `UNASSIGNED`
    /// if `key` also exceeds `end[i]`, or if `key` precedes every interval.
    pub fn owner(&self, key: &K) -> Rank {
        if self.start.is_empty() {
            return UNASSIGNED;
        }
        // `partition_point` finds the first index where `start[i] > key`,
        // so `i - 1` is the candidate interval (mirrors `std::lower_bound`
        // followed by `--ind` in the source's `FindInd`).
        let split = self.start.partition_point(|s| s <= key);
        if split == 0 {
            return UNASSIGNED;
        }
        let i = split - 1;
        if *key > self.end[i] {
            UNASSIGNED
        } else {
            i as Rank
        }
    }

    /// Non-overlap check used by the owner-map-totality tests (§8 #2): every
    /// interval's end must precede the next interval's start.
    pub fn is_non_overlapping(&self) -> bool {
        for i in 1..self.start.len() {
            if self.end[i - 1] >= self.start[i] {
                return false;
            }
        }
        true
    }

    /// Rebuilds this descriptor's intervals under a key mapping that
    /// preserves order, so a partition formed over one key type can route
    /// transfers keyed by a derived type (e.g. a `BoxKey` partition routing
    /// `(box, direction)` payloads via the unit-level's synthetic direction).
    pub fn map<K2: Ord + Clone>(&self, f: impl Fn(&K) -> K2) -> PartitionDescriptor<K2> {
        PartitionDescriptor {
            start: self.start.iter().map(&f).collect(),
            end: self.end.iter().map(&f).collect(),
        }
    }
}

/// The low-frequency (box-only) partition, keyed by the unit-level ancestor
/// reduction of §4.2 so coarse boxes inherit the unit-level owner.
#[derive(Clone, Debug, Default)]
pub struct LowFrequencyBoxPartition {
    pub unit_level: u32,
    pub unit_partition: PartitionDescriptor<BoxKey>,
}

impl LowFrequencyBoxPartition {
    pub fn owner(&self, key: &BoxKey) -> Rank {
        let ancestor = key.ancestor_at(self.unit_level);
        self.unit_partition.owner(&ancestor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddfmm_geometry::Index3;

    fn bk(i: i64) -> BoxKey {
        BoxKey::new(3, Index3::new(i, 0, 0))
    }

    #[test]
    fn owner_is_total_over_covered_range() {
        let desc = PartitionDescriptor::new(vec![bk(0), bk(4), bk(8)], vec![bk(3), bk(7), bk(11)]);
        for i in 0..12 {
            assert_eq!(desc.owner(&bk(i)), (i / 4) as Rank);
        }
    }

    #[test]
    fn owner_is_unassigned_outside_coverage() {
        let desc = PartitionDescriptor::new(vec![bk(4)], vec![bk(8)]);
        assert_eq!(desc.owner(&bk(0)), UNASSIGNED);
        assert_eq!(desc.owner(&bk(20)), UNASSIGNED);
    }

    #[test]
    fn intervals_are_non_overlapping() {
        let desc = PartitionDescriptor::new(vec![bk(0), bk(4)], vec![bk(3), bk(7)]);
        assert!(desc.is_non_overlapping());
        let bad = PartitionDescriptor::new(vec![bk(0), bk(3)], vec![bk(4), bk(7)]);
        assert!(!bad.is_non_overlapping());
    }

    #[test]
    fn ancestor_reduction_inherits_unit_level_owner() {
        let unit_partition = PartitionDescriptor::new(vec![BoxKey::new(2, Index3::new(0, 0, 0))], vec![BoxKey::new(2, Index3::new(3, 3, 3))]);
        let lf = LowFrequencyBoxPartition { unit_level: 2, unit_partition };
        let fine = BoxKey::new(5, Index3::new(13, 2, 7));
        assert_eq!(lf.owner(&fine), 0);
    }
}
