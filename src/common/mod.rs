//! Protocol data model shared across the lock-replicator core.

mod ids;
mod lockop;
mod replicaset;
mod txgroup;

pub use ids::{CommId, DataCenterId, PaxosGroupId};
pub use lockop::{LockOp, ReturnCode};
pub use replicaset::{replica_sets_agree, ReplicaSet};
pub use txgroup::TransactionGroup;
