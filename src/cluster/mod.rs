//! Cluster configuration snapshot and the replica-set oracle.

mod configuration;

pub use configuration::Configuration;
