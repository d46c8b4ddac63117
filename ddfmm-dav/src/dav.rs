//! The distributed associative vector (§4.1): a sparse keyed map
//! partitioned across processes, with explicit prefetch (`getBegin`/
//! `getEnd`) and push (`putBegin`/`putEnd`) phases.

use crate::mpi_util::all_to_allv;
use ddfmm_traits::DdfmmError;
use log::debug;
use mpi::datatype::Equivalence;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use mpi::Rank;
use std::collections::HashMap;
use std::hash::Hash;

/// The opaque pending-request object returned conceptually by `getBegin`:
/// here it is resolved eagerly, but kept out of `local` until `getEnd`
/// merges it, so callers that skip `getEnd` still see no progress.
struct PendingGet<K, V> {
    keys: Vec<K>,
    values: Vec<V>,
}

struct PendingPut<K, V> {
    entries: Vec<(K, V)>,
}

/// `owner_policy(key, value) -> list<rank>` for `putBegin`: the set of
/// processes an entry should be delivered to.
pub type OwnerPolicy<'a, K, V> = dyn Fn(&K, &V) -> Vec<Rank> + 'a;

pub struct Dav<'c, K, V> {
    comm: &'c SimpleCommunicator,
    local: HashMap<K, V>,
    pending_gets: HashMap<u64, PendingGet<K, V>>,
    pending_puts: HashMap<u64, PendingPut<K, V>>,
}

impl<'c, K, V> Dav<'c, K, V>
where
    K: Equivalence + Eq + Hash + Clone + Default,
    V: Equivalence + Clone + Default,
{
    pub fn new(comm: &'c SimpleCommunicator) -> Self {
        Self {
            comm,
            local: HashMap::new(),
            pending_gets: HashMap::new(),
            pending_puts: HashMap::new(),
        }
    }

    /// Local insertion; no cross-process traffic.
    pub fn insert(&mut self, key: K, value: V) {
        self.local.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.local.iter()
    }

    /// Returns a reference to a locally present entry; fatal if absent
    /// (§7 — the caller was required to prefetch).
    pub fn access(&self, key: &K) -> Result<&V, DdfmmError>
    where
        K: std::fmt::Debug,
    {
        self.local
            .get(key)
            .ok_or_else(|| DdfmmError::MissingData(format!("{key:?}")))
    }

    /// Safe probe: does not fail on an absent key.
    pub fn contains(&self, key: &K) -> (bool, Option<&V>) {
        match self.local.get(key) {
            Some(v) => (true, Some(v)),
            None => (false, None),
        }
    }

    /// Issues pulls of `keys` from their owners, as determined by `owner`.
    /// Distinct concurrent prefetch streams must use distinct `tag`s.
    pub fn get_begin(&mut self, keys: &[K], tag: u64, owner: impl Fn(&K) -> Rank) {
        debug!("getBegin tag={tag}: prefetching {} keys", keys.len());
        let size = self.comm.size() as usize;
        let mut requests: Vec<Vec<K>> = vec![Vec::new(); size];
        for k in keys {
            let r = owner(k);
            assert!(r >= 0, "prefetch issued for a key with no owner");
            requests[r as usize].push(k.clone());
        }
        let incoming_requests = all_to_allv(self.comm, &requests);

        let mut replies: Vec<Vec<V>> = vec![Vec::new(); size];
        for (r, keys_wanted) in incoming_requests.iter().enumerate() {
            for k in keys_wanted {
                let v = self
                    .local
                    .get(k)
                    .expect("getBegin requested a key not resident on its owner");
                replies[r].push(v.clone());
            }
        }
        let values_by_origin = all_to_allv(self.comm, &replies);

        let mut flat_keys = Vec::with_capacity(keys.len());
        let mut flat_values = Vec::with_capacity(keys.len());
        for (rank_keys, rank_values) in requests.into_iter().zip(values_by_origin.into_iter()) {
            flat_values.extend(rank_values);
            flat_keys.extend(rank_keys);
        }

        self.pending_gets.insert(
            tag,
            PendingGet {
                keys: flat_keys,
                values: flat_values,
            },
        );
    }

    /// Blocks until every key from the matching `getBegin` is resident
    /// locally, after which `access` is safe.
    pub fn get_end(&mut self, tag: u64) {
        let pending = self
            .pending_gets
            .remove(&tag)
            .expect("getEnd with no matching getBegin for this tag");
        for (k, v) in pending.keys.into_iter().zip(pending.values.into_iter()) {
            self.local.insert(k, v);
        }
    }

    /// Delivers locally held entries to the processes named by
    /// `owner_policy(key, value)`.
    pub fn put_begin(&mut self, keys: &[K], tag: u64, owner_policy: &OwnerPolicy<K, V>) {
        debug!("putBegin tag={tag}: pushing {} keys", keys.len());
        let size = self.comm.size() as usize;
        let mut outgoing: Vec<Vec<(K, V)>> = vec![Vec::new(); size];
        for k in keys {
            let v = self
                .local
                .get(k)
                .expect("putBegin referenced a key not held locally")
                .clone();
            for r in owner_policy(k, &v) {
                outgoing[r as usize].push((k.clone(), v.clone()));
            }
        }
        let send_keys: Vec<Vec<K>> = outgoing
            .iter()
            .map(|v| v.iter().map(|(k, _)| k.clone()).collect())
            .collect();
        let send_values: Vec<Vec<V>> = outgoing
            .iter()
            .map(|v| v.iter().map(|(_, val)| val.clone()).collect())
            .collect();
        let recv_keys = all_to_allv(self.comm, &send_keys);
        let recv_values = all_to_allv(self.comm, &send_values);

        let mut entries = Vec::new();
        for (ks, vs) in recv_keys.into_iter().zip(recv_values.into_iter()) {
            entries.extend(ks.into_iter().zip(vs.into_iter()));
        }
        self.pending_puts.insert(tag, PendingPut { entries });
    }

    pub fn put_end(&mut self, tag: u64) {
        let pending = self
            .pending_puts
            .remove(&tag)
            .expect("putEnd with no matching putBegin for this tag");
        for (k, v) in pending.entries {
            self.local.insert(k, v);
        }
    }

    /// Discards every locally held entry, bounding peak memory once a level
    /// is no longer needed (§3 Lifecycle).
    pub fn clear(&mut self) {
        debug!("clearing {} resident entries", self.local.len());
        self.local.clear();
    }
}
