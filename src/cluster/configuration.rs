//! Cluster membership snapshot and deterministic replica placement.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::common::{CommId, DataCenterId, ReplicaSet};

/// Immutable snapshot of cluster membership as published by the coordinator.
/// The embedding daemon swaps whole snapshots in; the oracle never mutates
/// one.
///
/// `members` lists the KVS daemons currently responsible for data;
/// `targets` lists the membership the cluster is moving toward. Outside of a
/// reconfiguration the two are equal, and every transitioning slot computed
/// from them is the null sentinel.
#[derive(Debug, Default, Clone)]
pub struct Configuration {
    /// Monotonic version bumped by the coordinator on every change.
    version: u64,

    /// Replication factor the deployment asks for.
    desired_replication: u8,

    /// Live KVS daemons, tagged by their data center.
    members: Vec<(DataCenterId, CommId)>,

    /// Post-reconfiguration membership.
    targets: Vec<(DataCenterId, CommId)>,
}

impl Configuration {
    /// Builds a snapshot. `targets` of `None` means no reconfiguration is
    /// under way.
    pub fn new(
        version: u64,
        desired_replication: u8,
        members: Vec<(DataCenterId, CommId)>,
        targets: Option<Vec<(DataCenterId, CommId)>>,
    ) -> Self {
        let targets = targets.unwrap_or_else(|| members.clone());
        Configuration {
            version,
            desired_replication,
            members,
            targets,
        }
    }

    /// Snapshot version.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Computes the replica set responsible for `(dc, table, key)`, or
    /// `None` when the data center has no live members yet. Pure function of
    /// this snapshot; two calls with the same arguments return identical
    /// results.
    pub fn hash(
        &self,
        dc: DataCenterId,
        table: &[u8],
        key: &[u8],
    ) -> Option<ReplicaSet> {
        let ring = ring_of(&self.members, dc);
        if ring.is_empty() {
            return None;
        }

        let point = placement_point(table, key);
        let num_replicas =
            (self.desired_replication as usize).min(ring.len());
        let start = (point % ring.len() as u64) as usize;
        let replicas: Vec<CommId> = (0..num_replicas)
            .map(|i| ring[(start + i) % ring.len()])
            .collect();

        // overlay the incoming configuration's placement for the same key;
        // slots whose assignment does not change get the null sentinel
        let target_ring = ring_of(&self.targets, dc);
        let transitioning: Vec<CommId> = if target_ring.is_empty() {
            vec![CommId::NULL; num_replicas]
        } else {
            let t_start = (point % target_ring.len() as u64) as usize;
            (0..num_replicas)
                .map(|i| {
                    if i >= target_ring.len() {
                        return CommId::NULL;
                    }
                    let t = target_ring[(t_start + i) % target_ring.len()];
                    if t == replicas[i] {
                        CommId::NULL
                    } else {
                        t
                    }
                })
                .collect()
        };

        Some(ReplicaSet {
            desired_replication: self.desired_replication,
            replicas,
            transitioning,
        })
    }
}

/// Members of one data center in ring order (sorted by id, deduplicated).
fn ring_of(
    list: &[(DataCenterId, CommId)],
    dc: DataCenterId,
) -> Vec<CommId> {
    let mut ring: Vec<CommId> = list
        .iter()
        .filter(|(d, id)| *d == dc && !id.is_null())
        .map(|&(_, id)| id)
        .collect();
    ring.sort_unstable();
    ring.dedup();
    ring
}

/// 64-bit placement point of a `(table, key)` pair.
fn placement_point(table: &[u8], key: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    table.hash(&mut hasher);
    key.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod configuration_tests {
    use super::*;

    const DC: DataCenterId = DataCenterId(1);

    fn members(ids: &[u64]) -> Vec<(DataCenterId, CommId)> {
        ids.iter().map(|&i| (DC, CommId(i))).collect()
    }

    #[test]
    fn empty_dc_returns_none() {
        let config = Configuration::new(1, 3, vec![], None);
        assert!(config.hash(DC, b"tbl", b"key").is_none());

        let other_dc = Configuration::new(1, 3, members(&[1, 2, 3]), None);
        assert!(other_dc.hash(DataCenterId(9), b"tbl", b"key").is_none());
    }

    #[test]
    fn deterministic_placement() {
        let config = Configuration::new(4, 3, members(&[1, 2, 3, 4, 5]), None);
        let a = config.hash(DC, b"tbl", b"key").unwrap();
        let b = config.hash(DC, b"tbl", b"key").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.num_replicas(), 3);
        assert_eq!(a.desired_replication, 3);
        // stable config: no transitioning slots
        assert!(a.transitioning.iter().all(|t| t.is_null()));
        // replicas are distinct live members
        for r in &a.replicas {
            assert!(!r.is_null());
        }
    }

    #[test]
    fn under_provisioned_reports_truthfully() {
        let config = Configuration::new(2, 3, members(&[1, 2]), None);
        let rs = config.hash(DC, b"tbl", b"key").unwrap();
        assert_eq!(rs.num_replicas(), 2);
        assert_eq!(rs.desired_replication, 3);
    }

    #[test]
    fn transition_overlays_incoming_members() {
        let config = Configuration::new(
            7,
            2,
            members(&[1, 2]),
            Some(members(&[3, 4])),
        );
        let rs = config.hash(DC, b"tbl", b"key").unwrap();
        assert_eq!(rs.num_replicas(), 2);
        // every slot changes hands, so every transitioning slot is live
        for (r, t) in rs.replicas.iter().zip(rs.transitioning.iter()) {
            assert!(!r.is_null());
            assert!(!t.is_null());
            assert_ne!(r, t);
        }

        // unchanged membership yields all-null transitioning slots
        let stable = Configuration::new(
            8,
            2,
            members(&[1, 2]),
            Some(members(&[1, 2])),
        );
        let rs = stable.hash(DC, b"tbl", b"key").unwrap();
        assert!(rs.transitioning.iter().all(|t| t.is_null()));
    }

    #[test]
    fn different_keys_spread_across_ring() {
        let config =
            Configuration::new(3, 1, members(&[1, 2, 3, 4, 5, 6, 7, 8]), None);
        let mut seen = std::collections::HashSet::new();
        for i in 0..64u32 {
            let key = i.to_be_bytes();
            let rs = config.hash(DC, b"tbl", &key).unwrap();
            seen.insert(rs.replicas[0]);
        }
        assert!(seen.len() > 1);
    }
}
