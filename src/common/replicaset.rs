//! Replica set of a `(dc, table, key)` triple, with the parallel
//! transitioning slots populated during a reconfiguration.

use std::fmt;

use crate::common::CommId;

/// Ordered list of KVS replicas responsible for a key, aligned with the
/// incoming configuration's assignments while a reconfiguration is under
/// way. `replicas` and `transitioning` are parallel vectors of the same
/// length; a transitioning slot with no incoming replica holds
/// [`CommId::NULL`].
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct ReplicaSet {
    /// Replication factor the configuration asks for. May exceed
    /// `num_replicas()` when the cluster is under-provisioned.
    pub desired_replication: u8,

    /// Primary replica of each slot.
    pub replicas: Vec<CommId>,

    /// Incoming replica of each slot, or the null sentinel.
    pub transitioning: Vec<CommId>,
}

impl ReplicaSet {
    /// Number of replica slots actually available.
    #[inline]
    pub fn num_replicas(&self) -> usize {
        self.replicas.len()
    }

    /// Finds the slot that lists `id` as its primary or transitioning
    /// member. The null sentinel is never found.
    pub fn slot_of(&self, id: CommId) -> Option<usize> {
        if id.is_null() {
            return None;
        }
        if let Some(i) = self.replicas.iter().position(|&r| r == id) {
            return Some(i);
        }
        self.transitioning.iter().position(|&t| t == id)
    }
}

impl fmt::Display for ReplicaSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{x{} [", self.desired_replication)?;
        for (i, r) in self.replicas.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", r)?;
            let t = self.transitioning.get(i).copied().unwrap_or(CommId::NULL);
            if !t.is_null() {
                write!(f, "~{}", t)?;
            }
        }
        write!(f, "]}}")
    }
}

/// Decides whether two reported replica-set views agree about `node`. Views
/// agree when both place `node` in the same slot and describe identical
/// membership; replicas reporting from different configuration epochs will
/// differ in one of those and therefore disagree.
pub fn replica_sets_agree(
    node: CommId,
    a: &ReplicaSet,
    b: &ReplicaSet,
) -> bool {
    let slot = a.slot_of(node);
    slot.is_some()
        && slot == b.slot_of(node)
        && a.replicas == b.replicas
        && a.transitioning == b.transitioning
}
