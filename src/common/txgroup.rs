//! Transaction group identifier.

use std::fmt;

use crate::common::PaxosGroupId;

/// Durable identifier of a transaction, including the begin timestamp that
/// orders transactions for wound-wait purposes.
///
/// The derived total order is timestamp-major: an older transaction (smaller
/// `timestamp`) orders before a younger one regardless of which Paxos group
/// executes it, so `a < b` directly answers "does `a` win a wound-wait
/// conflict against `b`".
#[derive(
    Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy,
)]
pub struct TransactionGroup {
    /// Begin timestamp assigned by the transaction's home group.
    pub timestamp: u64,

    /// Paxos group of transaction managers that decides this transaction's
    /// outcome.
    pub group: PaxosGroupId,

    /// Sequence number disambiguating transactions begun on the same group
    /// within the same timestamp tick.
    pub number: u64,
}

impl TransactionGroup {
    /// Creates a transaction group identifier.
    pub fn new(timestamp: u64, group: PaxosGroupId, number: u64) -> Self {
        TransactionGroup {
            timestamp,
            group,
            number,
        }
    }

    /// Short token for log line prefixes.
    pub fn log(&self) -> String {
        format!("{}.{}.{}", self.timestamp, self.group, self.number)
    }
}

impl fmt::Display for TransactionGroup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "tg(ts={}, group={}, num={})",
            self.timestamp, self.group, self.number
        )
    }
}

#[cfg(test)]
mod txgroup_tests {
    use super::*;

    #[test]
    fn timestamp_major_order() {
        let old = TransactionGroup::new(10, PaxosGroupId(9), 3);
        let young = TransactionGroup::new(20, PaxosGroupId(1), 1);
        assert!(old < young);

        // same timestamp falls back to group then number
        let a = TransactionGroup::new(10, PaxosGroupId(1), 5);
        let b = TransactionGroup::new(10, PaxosGroupId(2), 0);
        assert!(a < b);
    }

    #[test]
    fn default_is_no_transaction() {
        let none = TransactionGroup::default();
        assert_eq!(none.timestamp, 0);
        assert_eq!(none.number, 0);
    }
}
