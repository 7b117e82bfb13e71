//! Shared scaffolding for unit tests: a mock daemon context with a settable
//! clock and captured sends, plus configuration builders.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use parking_lot::Mutex;

use crate::cluster::Configuration;
use crate::common::{CommId, DataCenterId};
use crate::replicator::Context;
use crate::wire::KvsMessage;

pub(crate) const TEST_DC: DataCenterId = DataCenterId(1);

/// Builds a single-dc configuration snapshot from raw member ids.
pub(crate) fn test_config(
    version: u64,
    desired: u8,
    members: &[u64],
    targets: Option<&[u64]>,
) -> Configuration {
    let members = members.iter().map(|&i| (TEST_DC, CommId(i))).collect();
    let targets = targets
        .map(|t| t.iter().map(|&i| (TEST_DC, CommId(i))).collect());
    Configuration::new(version, desired, members, targets)
}

/// Context implementation with full control over time, configuration, and
/// observation of everything sent.
pub(crate) struct MockContext {
    dc: DataCenterId,
    resend_interval: u64,
    now: AtomicU64,
    config: Mutex<Arc<Configuration>>,
    sent: Mutex<Vec<(CommId, Bytes)>>,
}

impl MockContext {
    pub(crate) fn new(dc: DataCenterId, resend_interval: u64) -> Self {
        MockContext {
            dc,
            resend_interval,
            now: AtomicU64::new(0),
            config: Mutex::new(Arc::new(Configuration::default())),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn install_config(&self, config: Configuration) {
        *self.config.lock() = Arc::new(config);
    }

    pub(crate) fn set_now(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub(crate) fn advance(&self, delta: u64) {
        self.now.fetch_add(delta, Ordering::SeqCst);
    }

    /// Drains and decodes everything sent so far.
    pub(crate) fn take_sent(&self) -> Vec<(CommId, KvsMessage)> {
        self.sent
            .lock()
            .drain(..)
            .map(|(to, frame)| {
                let msg = KvsMessage::unpack(&frame)
                    .expect("sent frame should decode");
                (to, msg)
            })
            .collect()
    }
}

impl Context for MockContext {
    fn get_config(&self) -> Arc<Configuration> {
        self.config.lock().clone()
    }

    fn dc(&self) -> DataCenterId {
        self.dc
    }

    fn resend_interval(&self) -> u64 {
        self.resend_interval
    }

    fn monotonic_time(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn send(&self, target: CommId, msg: Bytes) {
        self.sent.lock().push((target, msg));
    }
}
