//! Small helpers around the `mpi` crate's variable-count collectives, shared
//! by the DAV's prefetch/push phases and by the partitioning pipeline.

use itertools::izip;
use mpi::collective::SystemOperation;
use mpi::datatype::{Partition, PartitionMut};
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use mpi::Count;

/// Ships `send[r]` to rank `r` for every `r`, returning what every other
/// rank shipped to us, in rank order. This is the building block behind
/// `ScatterKeys`-style coarse redistribution (§4.7 step 2) and the DAV's
/// pull/push phases (§4.1).
pub fn all_to_allv<T>(comm: &SimpleCommunicator, send: &[Vec<T>]) -> Vec<Vec<T>>
where
    T: Equivalence + Clone + Default,
{
    let size = comm.size() as usize;
    assert_eq!(send.len(), size);

    let send_counts: Vec<Count> = send.iter().map(|v| v.len() as Count).collect();
    let mut recv_counts = vec![0 as Count; size];
    comm.all_to_all_into(&send_counts, &mut recv_counts);

    let send_flat: Vec<T> = send.iter().flat_map(|v| v.iter().cloned()).collect();
    let send_displs = displacements(&send_counts);
    let recv_displs = displacements(&recv_counts);
    let total_recv: usize = recv_counts.iter().map(|&c| c as usize).sum();
    let mut recv_flat = vec![T::default(); total_recv];

    let send_partition = Partition::new(&send_flat, send_counts.clone(), send_displs.clone());
    let mut recv_partition = PartitionMut::new(&mut recv_flat, recv_counts.clone(), recv_displs.clone());
    comm.all_to_all_varcount_into(&send_partition, &mut recv_partition);

    izip!(recv_counts.iter(), recv_displs.iter())
        .map(|(&len, &start)| recv_flat[start as usize..(start + len) as usize].to_vec())
        .collect()
}

fn displacements(counts: &[Count]) -> Vec<Count> {
    counts
        .iter()
        .scan(0, |running, &c| {
            let displ = *running;
            *running += c;
            Some(displ)
        })
        .collect()
}

/// `Allreduce` with `MIN`, used to find the global minimum rank that still
/// has unresolved work (e.g. the ring-neighbor pop-pass at the unit level).
pub fn allreduce_min_i32(comm: &SimpleCommunicator, value: i32) -> i32 {
    let mut out = 0i32;
    comm.all_reduce_into(&value, &mut out, SystemOperation::min());
    out
}

pub fn next_rank(comm: &SimpleCommunicator) -> i32 {
    let rank = comm.rank();
    let size = comm.size();
    if rank + 1 < size {
        rank + 1
    } else {
        0
    }
}

pub fn previous_rank(comm: &SimpleCommunicator) -> i32 {
    let rank = comm.rank();
    let size = comm.size();
    if rank > 0 {
        rank - 1
    } else {
        size - 1
    }
}
