//! Capability handle injected into every lock-replicator entry point.

use std::sync::Arc;

use bytes::Bytes;

use parking_lot::RwLock;

use tokio::sync::mpsc;

use crate::cluster::Configuration;
use crate::common::{CommId, DataCenterId};
use crate::utils::{monotonic_time, ReplockError};

/// Lower bound on the resend interval in monotonic microseconds.
pub const MIN_RESEND_INTERVAL_US: u64 = 10_000;

/// Capabilities a replicator needs from its surrounding daemon: the cluster
/// configuration snapshot, the local data center, the resend interval, a
/// monotonic clock, and a non-blocking outbound send queue.
///
/// Handles are passed into each entry point and never stored; a work cycle
/// only ever sees one configuration snapshot and one clock reading source.
pub trait Context: Send + Sync {
    /// Current cluster configuration snapshot.
    fn get_config(&self) -> Arc<Configuration>;

    /// The local data center.
    fn dc(&self) -> DataCenterId;

    /// Resend timer interval in monotonic microseconds.
    fn resend_interval(&self) -> u64;

    /// Strictly non-decreasing clock reading in microseconds.
    fn monotonic_time(&self) -> u64;

    /// Enqueues a frame for `target`. Never blocks; a failed enqueue is
    /// dropped silently and covered by retransmission.
    fn send(&self, target: CommId, msg: Bytes);
}

/// Production context backed by the daemon's outbound queue and the
/// process-wide monotonic clock.
pub struct DaemonContext {
    /// Local data center identifier.
    us_dc: DataCenterId,

    /// Resend timer interval in monotonic microseconds.
    resend_interval: u64,

    /// Latest installed configuration snapshot.
    config: RwLock<Arc<Configuration>>,

    /// Sender side of the outbound frame queue; the daemon's transport
    /// drains the receiver side.
    tx_send: mpsc::UnboundedSender<(CommId, Bytes)>,
}

impl DaemonContext {
    /// Creates a daemon context. Returns the context paired with the
    /// receiver end of the outbound frame queue.
    pub fn new_and_setup(
        us_dc: DataCenterId,
        resend_interval: u64,
    ) -> Result<
        (Self, mpsc::UnboundedReceiver<(CommId, Bytes)>),
        ReplockError,
    > {
        if resend_interval < MIN_RESEND_INTERVAL_US {
            return logged_err!(
                "invalid resend interval {} us (minimum {} us)",
                resend_interval,
                MIN_RESEND_INTERVAL_US
            );
        }

        let (tx_send, rx_send) = mpsc::unbounded_channel();
        Ok((
            DaemonContext {
                us_dc,
                resend_interval,
                config: RwLock::new(Arc::new(Configuration::default())),
                tx_send,
            },
            rx_send,
        ))
    }

    /// Swaps in a new configuration snapshot. Work cycles already running
    /// keep the snapshot they started with.
    pub fn install_config(&self, config: Configuration) {
        *self.config.write() = Arc::new(config);
    }
}

impl Context for DaemonContext {
    fn get_config(&self) -> Arc<Configuration> {
        self.config.read().clone()
    }

    fn dc(&self) -> DataCenterId {
        self.us_dc
    }

    fn resend_interval(&self) -> u64 {
        self.resend_interval
    }

    fn monotonic_time(&self) -> u64 {
        monotonic_time()
    }

    fn send(&self, target: CommId, msg: Bytes) {
        // receiver gone means the daemon is shutting down; retransmission
        // makes dropping safe
        let _ = self.tx_send.send((target, msg));
    }
}

#[cfg(test)]
mod context_tests {
    use super::*;

    #[test]
    fn rejects_tiny_resend_interval() {
        assert!(DaemonContext::new_and_setup(DataCenterId(1), 9_999).is_err());
        assert!(
            DaemonContext::new_and_setup(DataCenterId(1), 10_000).is_ok()
        );
    }

    #[test]
    fn config_install_and_snapshot() -> Result<(), ReplockError> {
        let (ctx, _rx) =
            DaemonContext::new_and_setup(DataCenterId(1), 250_000)?;
        assert_eq!(ctx.get_config().version(), 0);

        ctx.install_config(Configuration::new(42, 3, vec![], None));
        assert_eq!(ctx.get_config().version(), 42);
        Ok(())
    }

    #[test]
    fn send_enqueues_frame() -> Result<(), ReplockError> {
        let (ctx, mut rx) =
            DaemonContext::new_and_setup(DataCenterId(1), 250_000)?;
        ctx.send(CommId(7), Bytes::from_static(b"frame"));
        let (target, frame) = rx.try_recv().map_err(ReplockError::msg)?;
        assert_eq!(target, CommId(7));
        assert_eq!(frame, Bytes::from_static(b"frame"));
        Ok(())
    }

    #[test]
    fn send_without_receiver_is_silent() -> Result<(), ReplockError> {
        let (ctx, rx) =
            DaemonContext::new_and_setup(DataCenterId(1), 250_000)?;
        drop(rx);
        ctx.send(CommId(7), Bytes::from_static(b"frame"));
        Ok(())
    }
}
