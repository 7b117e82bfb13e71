//! Public interface to the replock core library: the per-operation lock
//! replication machinery run by transaction managers of a geo-distributed
//! transactional key-value store.
//!
//! The crate owns no transport, CLI, or on-disk state; an embedding daemon
//! feeds inbound frames into the [`LockReplicatorRegistry`] and drains the
//! outbound send queue of its [`DaemonContext`].

#[macro_use]
mod utils;

mod cluster;
mod common;
mod replicator;
mod wire;

#[cfg(test)]
mod testutil;

pub use cluster::Configuration;
pub use common::{
    replica_sets_agree, CommId, DataCenterId, LockOp, PaxosGroupId,
    ReplicaSet, ReturnCode, TransactionGroup,
};
pub use replicator::{
    Context, DaemonContext, LockReplicator, LockReplicatorRegistry,
    RegistryConfig, MIN_RESEND_INTERVAL_US,
};
pub use utils::{debug_mode, monotonic_time, set_debug_mode, ReplockError};
pub use wire::{KvsMessage, MsgType, HEADER_SIZE};
