//! The distributed associative vector, partition descriptors, and the
//! per-level partitioning/data-transfer pipeline (§4.1, §4.2, §4.7).

pub mod dav;
pub mod mpi_util;
pub mod partition;
pub mod transfer;

pub use dav::Dav;
pub use partition::{LowFrequencyBoxPartition, PartitionDescriptor, UNASSIGNED};
