//! Partitioning and data transfer (§4.7): per-level coarse redistribute,
//! global sort, partition formation, and payload movement.

use crate::dav::Dav;
use crate::mpi_util::{all_to_allv, next_rank, previous_rank};
use crate::partition::PartitionDescriptor;
use ddfmm_geometry::{BoxDirKey, BoxKey, UNIT_LEVEL_DIRECTION};
use ddfmm_traits::{Complex64, Sort};
use log::debug;
use memoffset::offset_of;
use mpi::datatype::{Equivalence, UncommittedUserDatatype, UserDatatype};
use mpi::point_to_point as p2p;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

/// Step 2: each process ships `floor(n_i / P)` of its keys to every other
/// process; the residue (`n_i mod P` items) stays local. Preserved as
/// specified even though the consequence for sort load balance is not
/// obvious (§9 Design Note c).
pub fn coarse_redistribute<T>(comm: &SimpleCommunicator, local: Vec<T>) -> Vec<T>
where
    T: Equivalence + Clone + Default,
{
    let size = comm.size() as usize;
    let n = local.len();
    let chunk = n / size;
    let residue = n % size;

    let mut send = vec![Vec::new(); size];
    for (j, slot) in send.iter_mut().enumerate() {
        let start = residue + j * chunk;
        *slot = local[start..start + chunk].to_vec();
    }
    let received = all_to_allv(comm, &send);

    let mut out = local[..residue].to_vec();
    for chunk_from_rank in received {
        out.extend(chunk_from_rank);
    }
    out
}

/// Steps 2-4: coarse redistribute, global sort, and partition formation for
/// one level's keys. Returns the locally-held shard after the sort (kept
/// around so payload movement in step 6 has something to route) and the
/// resulting partition descriptor.
pub fn partition_level<K>(
    comm: &SimpleCommunicator,
    local_keys: Vec<K>,
    sort: &impl Sort,
) -> (Vec<K>, PartitionDescriptor<K>)
where
    K: Equivalence + Ord + Clone + Default + Send,
{
    let mut redistributed = coarse_redistribute(comm, local_keys);
    debug!("partition_level: sorting {} redistributed keys", redistributed.len());
    sort.sort(&mut redistributed, comm);
    let partition = form_partition(comm, &redistributed);
    (redistributed, partition)
}

/// Step 4: an all-gather of each rank's first and last post-sort key forms
/// the `start[]`/`end[]` partition arrays. Ranks that hold no keys after the
/// sort degrade gracefully: they report a "closed" interval that cannot own
/// anything, so ownership still resolves uniquely on the ranks that do hold
/// keys.
fn form_partition<K>(comm: &SimpleCommunicator, sorted_local: &[K]) -> PartitionDescriptor<K>
where
    K: Equivalence + Ord + Clone + Default,
{
    let (first, last) = match (sorted_local.first(), sorted_local.last()) {
        (Some(f), Some(l)) => (f.clone(), l.clone()),
        _ => (K::default(), K::default()),
    };
    let size = comm.size() as usize;
    let mut starts = vec![K::default(); size];
    let mut ends = vec![K::default(); size];
    comm.all_gather_into(&first, &mut starts[..]);
    comm.all_gather_into(&last, &mut ends[..]);
    PartitionDescriptor::new(starts, ends)
}

/// Step 5: before forming the unit-level box partition, trim trailing boxes
/// that duplicate the next rank's first box. Rank `i` receives rank `i+1`'s
/// starting box via `Sendrecv` with the ring neighbors and drops any
/// trailing entries equal to it.
pub fn pop_pass_trim_unit_level(comm: &SimpleCommunicator, sorted_boxes: &mut Vec<BoxKey>) {
    let next = next_rank(comm);
    let prev = previous_rank(comm);
    let my_first = sorted_boxes.first().copied().unwrap_or_default();

    let mut incoming_first = BoxKey::default();
    p2p::send_receive_into(&my_first, &comm.process_at_rank(next), &mut incoming_first, &comm.process_at_rank(prev));

    let before = sorted_boxes.len();
    while sorted_boxes.len() > 1 && *sorted_boxes.last().unwrap() == incoming_first {
        sorted_boxes.pop();
    }
    debug!("pop_pass_trim_unit_level: dropped {} duplicate boxes", before - sorted_boxes.len());
}

/// Step 6, `(box, direction)` payload movement. Delivers every locally held
/// `(box, direction)` key to the outgoing-partition owner (if the key has
/// outgoing density), the incoming-partition owner (if its interaction list
/// is nonempty), or both.
pub fn move_boxdir_payloads<V>(
    dav: &mut Dav<BoxDirKey, V>,
    keys: &[BoxDirKey],
    tag: u64,
    outgoing_partition: &PartitionDescriptor<BoxDirKey>,
    incoming_partition: &PartitionDescriptor<BoxDirKey>,
    is_outgoing: impl Fn(&BoxDirKey, &V) -> bool,
    is_incoming: impl Fn(&BoxDirKey, &V) -> bool,
) where
    V: Equivalence + Clone + Default,
{
    let policy = move |key: &BoxDirKey, value: &V| -> Vec<mpi::Rank> {
        let mut owners = Vec::new();
        if is_outgoing(key, value) {
            owners.push(outgoing_partition.owner(key));
        }
        if is_incoming(key, value) {
            let o = incoming_partition.owner(key);
            if !owners.contains(&o) {
                owners.push(o);
            }
        }
        owners
    };
    dav.put_begin(keys, tag, &policy);
    dav.put_end(tag);
}

/// Step 6, unit-level box payloads: routed through the same `(box,
/// direction)` machinery using the synthetic direction `(1,1,1)`.
pub fn unit_level_key(b: BoxKey) -> BoxDirKey {
    BoxDirKey::new(b, UNIT_LEVEL_DIRECTION)
}

/// Largest equivalent/check-surface sample count (`6 * NPQ^2`) this
/// fixed-extent wire record can carry. Generous for the `NPQ` range (2)
/// this crate's surfaces are sized for (§6); a density that overflows it is
/// a configuration error, not a silently truncated transfer.
pub const MAX_WIRE_SURFACE_POINTS: usize = 1536;

/// Fixed-extent wire record for one box's upward equivalent density,
/// carried through the unit-level handoff (§4.1 put-phase, §4.7 step 6).
/// `mpi`'s `Equivalence` needs a compile-time-fixed layout, so a variable
/// `Vec<Complex64>` is packed into this padded record and unpacked back to
/// its true length on arrival.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct EquivalentDensityPayload {
    len: u32,
    re: [f64; MAX_WIRE_SURFACE_POINTS],
    im: [f64; MAX_WIRE_SURFACE_POINTS],
}

impl Default for EquivalentDensityPayload {
    fn default() -> Self {
        Self {
            len: 0,
            re: [0.0; MAX_WIRE_SURFACE_POINTS],
            im: [0.0; MAX_WIRE_SURFACE_POINTS],
        }
    }
}

impl EquivalentDensityPayload {
    pub fn pack(density: &[Complex64]) -> Self {
        assert!(
            density.len() <= MAX_WIRE_SURFACE_POINTS,
            "equivalent density of {} samples exceeds the fixed wire extent of {MAX_WIRE_SURFACE_POINTS}",
            density.len()
        );
        let mut payload = Self::default();
        payload.len = density.len() as u32;
        for (i, c) in density.iter().enumerate() {
            payload.re[i] = c.re;
            payload.im[i] = c.im;
        }
        payload
    }

    pub fn unpack(&self) -> Vec<Complex64> {
        (0..self.len as usize).map(|i| Complex64::new(self.re[i], self.im[i])).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

unsafe impl Equivalence for EquivalentDensityPayload {
    type Out = UserDatatype;
    fn equivalent_datatype() -> Self::Out {
        UserDatatype::structured(
            &[1, MAX_WIRE_SURFACE_POINTS as i32, MAX_WIRE_SURFACE_POINTS as i32],
            &[
                offset_of!(EquivalentDensityPayload, len) as mpi::Address,
                offset_of!(EquivalentDensityPayload, re) as mpi::Address,
                offset_of!(EquivalentDensityPayload, im) as mpi::Address,
            ],
            &[
                UncommittedUserDatatype::contiguous(1, &u32::equivalent_datatype()),
                UncommittedUserDatatype::contiguous(MAX_WIRE_SURFACE_POINTS as mpi::Count, &f64::equivalent_datatype()),
                UncommittedUserDatatype::contiguous(MAX_WIRE_SURFACE_POINTS as mpi::Count, &f64::equivalent_datatype()),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coarse_redistribute_residue_formula() {
        // n=10, P=3 -> chunk=3, residue=1 (exercised without MPI by checking
        // the arithmetic the real collective path relies on).
        let n = 10usize;
        let size = 3usize;
        assert_eq!(n / size, 3);
        assert_eq!(n % size, 1);
    }

    #[test]
    fn equivalent_density_payload_round_trips() {
        let density: Vec<Complex64> = (0..24).map(|i| Complex64::new(i as f64, -(i as f64))).collect();
        let payload = EquivalentDensityPayload::pack(&density);
        assert!(!payload.is_empty());
        assert_eq!(payload.unpack(), density);
    }

    #[test]
    fn empty_density_packs_to_an_empty_payload() {
        let payload = EquivalentDensityPayload::pack(&[]);
        assert!(payload.is_empty());
        assert!(payload.unpack().is_empty());
    }
}
