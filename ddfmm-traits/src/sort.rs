//! The distributed sort contract (§6): a comparison sort over arbitrary
//! keys, used by the partitioning layer to globally order `(box, direction)`
//! keys per level (§4.7 step 3). The core does not implement the sort.

use mpi::datatype::Equivalence;
use mpi::topology::SimpleCommunicator;

/// A distributed comparison sort. `hyksort` performs this via distributed
/// sampling rather than a literal bitonic network, but satisfies the same
/// contract: a globally-ordered redistribution of `local` across `comm`.
pub trait Sort {
    fn sort<T>(&self, local: &mut Vec<T>, comm: &SimpleCommunicator)
    where
        T: Equivalence + Clone + PartialOrd + Send;
}

pub struct HyksSort {
    /// Oversampling factor passed to `hyksort`; larger values reduce load
    /// imbalance at the cost of extra sampling rounds.
    pub k: i32,
}

impl Default for HyksSort {
    fn default() -> Self {
        Self { k: 2 }
    }
}

impl Sort for HyksSort {
    fn sort<T>(&self, local: &mut Vec<T>, comm: &SimpleCommunicator)
    where
        T: Equivalence + Clone + PartialOrd + Send,
    {
        hyksort::hyksort(local, self.k, comm.duplicate());
    }
}
