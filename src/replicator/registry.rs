//! Registry of live lock replicators and the inbound/timer dispatcher.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use rand::prelude::*;

use serde::Deserialize;

use tokio::time::{self, Duration, MissedTickBehavior};

use crate::common::{CommId, TransactionGroup};
use crate::replicator::context::{Context, MIN_RESEND_INTERVAL_US};
use crate::replicator::LockReplicator;
use crate::utils::ReplockError;
use crate::wire::KvsMessage;

/// Configuration parameters struct.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistryConfig {
    /// Resend timer interval in monotonic microsecs.
    pub resend_interval_us: u64,

    /// Period of the dispatcher's work iteration in millisecs.
    pub work_tick_ms: u64,

    /// Upper bound of the random extra delay added to each work tick in
    /// millisecs.
    pub work_tick_jitter_ms: u64,

    /// How long a finished replicator lingers before eviction, in monotonic
    /// microsecs. Must cover in-flight responses and resends.
    pub gc_grace_us: u64,
}

#[allow(clippy::derivable_impls)]
impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            resend_interval_us: 250_000,
            work_tick_ms: 100,
            work_tick_jitter_ms: 20,
            gc_grace_us: 5_000_000,
        }
    }
}

/// A registered replicator plus when it was first seen finished.
struct RegistryEntry {
    rep: Arc<LockReplicator>,
    finished_since: Option<u64>,
}

/// Maps state keys to live lock replicators, routes inbound replica
/// responses onto them, fans out cancellations, and periodically ticks
/// every live replicator's resend machinery.
pub struct LockReplicatorRegistry {
    config: RegistryConfig,

    replicators: Mutex<HashMap<u64, RegistryEntry>>,
}

impl LockReplicatorRegistry {
    /// Creates a registry, with config overrides parsed from the given TOML
    /// string if it's not `None`.
    pub fn new_and_setup(
        config_str: Option<&str>,
    ) -> Result<Self, ReplockError> {
        let config = parsed_config!(config_str => RegistryConfig;
                                    resend_interval_us, work_tick_ms,
                                    work_tick_jitter_ms, gc_grace_us)?;
        if config.resend_interval_us < MIN_RESEND_INTERVAL_US {
            return logged_err!(
                "invalid resend_interval_us {} (minimum {})",
                config.resend_interval_us,
                MIN_RESEND_INTERVAL_US
            );
        }
        if config.work_tick_ms == 0 {
            return logged_err!(
                "invalid work_tick_ms {}",
                config.work_tick_ms
            );
        }
        if config.gc_grace_us < 2 * config.resend_interval_us {
            return logged_err!(
                "gc_grace_us {} shorter than two resend intervals",
                config.gc_grace_us
            );
        }

        Ok(LockReplicatorRegistry {
            config,
            replicators: Mutex::new(HashMap::new()),
        })
    }

    /// The active configuration parameters.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Number of registered replicators (finished ones included until
    /// eviction).
    pub fn num_replicators(&self) -> usize {
        self.replicators.lock().len()
    }

    /// Looks up the replicator keyed by `state_key`.
    pub fn get(&self, state_key: u64) -> Option<Arc<LockReplicator>> {
        self.replicators
            .lock()
            .get(&state_key)
            .map(|entry| entry.rep.clone())
    }

    /// Looks up or registers the replicator keyed by `state_key`.
    pub fn get_or_create(&self, state_key: u64) -> Arc<LockReplicator> {
        self.replicators
            .lock()
            .entry(state_key)
            .or_insert_with(|| RegistryEntry {
                rep: Arc::new(LockReplicator::new(state_key)),
                finished_since: None,
            })
            .rep
            .clone()
    }

    /// Routes one inbound frame from peer `from`. Responses for unknown
    /// state keys are dropped; undecodable or out-of-place frames are
    /// errors.
    pub fn dispatch(
        &self,
        from: CommId,
        frame: &[u8],
        ctx: &dyn Context,
    ) -> Result<(), ReplockError> {
        match KvsMessage::unpack(frame)? {
            KvsMessage::RawLockResp { state_key, tg, rs } => {
                match self.get(state_key) {
                    Some(rep) => {
                        rep.response(from, tg, rs, ctx);
                        Ok(())
                    }
                    None => {
                        pf_debug!(
                            "dropped response from {}; no replicator for \
                             state key {}",
                            from,
                            state_key
                        );
                        Ok(())
                    }
                }
            }
            msg => logged_err!(
                "unexpected {} message from {}",
                msg.msg_type(),
                from
            ),
        }
    }

    /// Fans a wound-wait cancellation out to every registered replicator;
    /// each one checks the transaction group itself.
    pub fn abort(&self, tg: &TransactionGroup, ctx: &dyn Context) {
        for rep in self.snapshot() {
            rep.abort(tg, ctx);
        }
    }

    /// Fans a silent cancellation out to every registered replicator.
    pub fn discard(&self, tg: &TransactionGroup) {
        for rep in self.snapshot() {
            rep.discard(tg);
        }
    }

    /// One dispatcher pass: nudge every unfinished replicator's state
    /// machine, and evict replicators that have been finished for longer
    /// than the grace period.
    pub fn work_tick(&self, ctx: &dyn Context) {
        let now = ctx.monotonic_time();
        let mut due: Vec<Arc<LockReplicator>> = Vec::new();

        {
            let mut replicators = self.replicators.lock();
            replicators.retain(|state_key, entry| {
                if entry.rep.finished() {
                    match entry.finished_since {
                        None => {
                            entry.finished_since = Some(now);
                            true
                        }
                        Some(since) => {
                            let expired = now.saturating_sub(since)
                                >= self.config.gc_grace_us;
                            if expired {
                                pf_debug!(
                                    "evicting finished replicator \
                                     state_key={}",
                                    state_key
                                );
                            }
                            !expired
                        }
                    }
                } else {
                    entry.finished_since = None;
                    due.push(entry.rep.clone());
                    true
                }
            });
        }

        // state machines run outside the registry lock
        for rep in due {
            rep.externally_work(ctx);
        }
    }

    /// Dispatcher loop: work ticks at the configured period with random
    /// jitter. Runs until the owning task is dropped.
    pub async fn run(&self, ctx: &dyn Context) {
        pf_debug!(
            "replicator dispatcher running: tick={}ms jitter<={}ms",
            self.config.work_tick_ms,
            self.config.work_tick_jitter_ms
        );

        let mut ticker =
            time::interval(Duration::from_millis(self.config.work_tick_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if self.config.work_tick_jitter_ms > 0 {
                let jitter = thread_rng()
                    .gen_range(0..=self.config.work_tick_jitter_ms);
                time::sleep(Duration::from_millis(jitter)).await;
            }
            self.work_tick(ctx);
        }
    }

    /// Human-readable snapshot of every registered replicator.
    pub fn debug_dump(&self) -> String {
        let mut out = String::new();
        for rep in self.snapshot() {
            out.push_str(&format!("state_key={}\n", rep.state_key()));
            out.push_str(&rep.debug_dump());
        }
        out
    }

    fn snapshot(&self) -> Vec<Arc<LockReplicator>> {
        self.replicators
            .lock()
            .values()
            .map(|entry| entry.rep.clone())
            .collect()
    }
}
