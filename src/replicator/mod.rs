//! Per-operation lock replication machinery of the transaction manager.
//!
//! Locking is different from reading or writing. A write at a timestamp is
//! issued endlessly until a quorum acknowledges it, and every reissue
//! carries the same value, so duplication in the network is harmless. A
//! read looks for the highest value at a quorum and is protected by the
//! locks themselves. A lock operation enjoys neither property: if a "lock"
//! message is duplicated and one copy is delayed past the transaction's
//! subsequent "unlock", the delayed copy would re-lock the lock on behalf
//! of a transaction that no longer exists.
//!
//! Two invariants upheld by the transaction managers make that scenario
//! harmless rather than impossible:
//!
//! I1: a transaction's locks are released only after its commit or abort
//! outcome is durably recorded.
//!
//! I2: unlock operations for a transaction are initiated only by members of
//! the Paxos group that decided that transaction's outcome.
//!
//! Under I1, nothing that happens after the first unlock can change the
//! transaction's outcome, so a lock spuriously re-taken by a delayed
//! message affects liveness but never correctness. Under I2, there is a
//! single place in the system entitled to decide that a lock is held in
//! error, and it is the same place that records outcomes, so the decision
//! to unlock can never violate I1. Liveness is then restored by leaking the
//! current holder to competing transactions: a competitor signals the
//! holder, and the holder either yields to an older transaction by aborting
//! (wound-wait) or unlocks a lock it no longer needs.
//!
//! [`LockReplicator`] drives one lock or unlock operation over the replica
//! quorum of a `(table, key)` pair. [`LockReplicatorRegistry`] demultiplexes
//! replica responses onto live replicators and ticks their resend timers.

mod context;
mod registry;

pub use context::{Context, DaemonContext, MIN_RESEND_INTERVAL_US};
pub use registry::{LockReplicatorRegistry, RegistryConfig};

use std::collections::hash_map::DefaultHasher;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use parking_lot::Mutex;

use crate::common::{
    replica_sets_agree, CommId, LockOp, ReplicaSet, ReturnCode,
    TransactionGroup,
};
use crate::utils::debug_mode;
use crate::wire::KvsMessage;

/// Emit at most one under-replication warning per this many occurrences.
const UNDER_REPLICATION_WARN_EVERY: u64 = 1000;

static UNDER_REPLICATION_WARNINGS: AtomicU64 = AtomicU64::new(0);

/// Per-target request bookkeeping within one replicator: when we last asked
/// the target, and what the target last reported back.
#[derive(Debug, Clone)]
struct LockStub {
    /// The KVS replica this stub talks to.
    target: CommId,

    /// Monotonic time of the last request sent to `target`; zero before
    /// first contact.
    last_request_time: u64,

    /// Transaction group `target` last reported as holding the lock.
    tg: TransactionGroup,

    /// Replica-set view `target` last reported.
    rs: ReplicaSet,
}

impl LockStub {
    fn new(target: CommId) -> Self {
        LockStub {
            target,
            last_request_time: 0,
            tg: TransactionGroup::default(),
            rs: ReplicaSet::default(),
        }
    }
}

/// Mutable state guarded by the replicator's mutex.
struct State {
    init: bool,
    finished: bool,

    /// Originating transaction manager and its request nonce.
    id: CommId,
    nonce: u64,

    /// The locked pair. The `Bytes` handles keep the frame backing these
    /// slices alive for the replicator's lifetime.
    table: Bytes,
    key: Bytes,

    tg: TransactionGroup,
    op: LockOp,

    /// Outstanding per-target request records, in first-contact order.
    /// Small fixed fan-out; a linear scan beats a map here.
    requests: Vec<LockStub>,
}

impl State {
    /// Log line prefix identifying this operation.
    fn logid(&self) -> String {
        let suffix = match self.op {
            LockOp::Lock => "LL",
            LockOp::Unlock => "LU",
        };
        format!(
            "{}:{}-{}-REP",
            table_key_logid(&self.table, &self.key),
            self.tg.log(),
            suffix
        )
    }

    /// Index of the stub targeting `id`, if any contact has happened.
    fn stub_index(&self, id: CommId) -> Option<usize> {
        self.requests.iter().position(|s| s.target == id)
    }

    /// Makes sure a stub for `id` exists. No-op for the null sentinel.
    fn ensure_stub(&mut self, id: CommId) {
        if !id.is_null() && self.stub_index(id).is_none() {
            self.requests.push(LockStub::new(id));
        }
    }

    /// One fixed-point pass over the current replica set: ensure stubs,
    /// count agreeing slots, resend to laggards, respond to the originator
    /// when a quorum of slots agrees.
    fn work_state_machine(&mut self, state_key: u64, ctx: &dyn Context) {
        let config = ctx.get_config();
        let mut rs = match config.hash(ctx.dc(), &self.table, &self.key) {
            Some(rs) => rs,
            // configuration cannot place this key yet; the registry's
            // periodic tick re-enters until it can
            None => return,
        };

        let now = ctx.monotonic_time();
        let resend_interval = ctx.resend_interval();
        let mut complete = 0usize;

        for i in 0..rs.num_replicas() {
            let primary = rs.replicas[i];
            let incoming = rs.transitioning[i];
            self.ensure_stub(primary);
            self.ensure_stub(incoming);

            let p = match self.stub_index(primary) {
                Some(p) => p,
                None => continue,
            };
            let t = self.stub_index(incoming);

            // a slot agrees when its primary (and incoming replica, if the
            // slot is transitioning) reports our transaction and the two
            // reported views describe the same replica set; each slot
            // contributes at most one to the completion count
            let agree = match t {
                None => true,
                Some(t) => replica_sets_agree(
                    primary,
                    &self.requests[p].rs,
                    &self.requests[t].rs,
                ),
            };
            let primary_held = self.requests[p].tg == self.tg;
            let incoming_held =
                t.map_or(true, |t| self.requests[t].tg == self.tg);

            if primary_held && incoming_held && agree {
                complete += 1;
                continue;
            }

            if now.saturating_sub(self.requests[p].last_request_time)
                >= resend_interval
                && (!primary_held || !agree)
            {
                self.send_lock_request(p, state_key, now, ctx);
            }

            if let Some(t) = t {
                if now.saturating_sub(self.requests[t].last_request_time)
                    >= resend_interval
                    && (self.requests[t].tg != self.tg || !agree)
                {
                    self.send_lock_request(t, state_key, now, ctx);
                }
            }
        }

        let mut rc = ReturnCode::Success;
        if (rs.desired_replication as usize) > rs.num_replicas() {
            let missing =
                rs.desired_replication as usize - rs.num_replicas();
            if UNDER_REPLICATION_WARNINGS.fetch_add(1, Ordering::Relaxed)
                % UNDER_REPLICATION_WARN_EVERY
                == 0
            {
                pf_warn!(
                    "too few kvs daemons to achieve desired replication \
                     factor: {} more daemons needed",
                    missing
                );
            }
            rs.desired_replication = rs.num_replicas() as u8;
            rc = ReturnCode::LessDurable;
        }

        let quorum = rs.desired_replication as usize / 2 + 1;
        if complete >= quorum {
            self.finished = true;
            let msg = KvsMessage::LockOpResp {
                nonce: self.nonce,
                rc,
            };
            ctx.send(self.id, msg.pack());
            if debug_mode() {
                pf_info!(
                    "{} response={} id={}",
                    self.logid(),
                    rc,
                    self.id
                );
            }
        }
    }

    /// Sends one lock request to the stub at `idx` and stamps it.
    fn send_lock_request(
        &mut self,
        idx: usize,
        state_key: u64,
        now: u64,
        ctx: &dyn Context,
    ) {
        if debug_mode() {
            pf_info!(
                "{} sending target={}",
                self.logid(),
                self.requests[idx].target
            );
        }

        let msg = KvsMessage::RawLock {
            state_key,
            table: self.table.clone(),
            key: self.key.clone(),
            tg: self.tg,
            op: self.op,
        };
        ctx.send(self.requests[idx].target, msg.pack());
        self.requests[idx].last_request_time = now;
    }
}

/// State machine driving a single lock or unlock operation over the replica
/// quorum of one `(table, key)` pair on behalf of one transaction.
///
/// All public entry points serialize on an internal mutex held for the
/// whole call; a work cycle does no I/O beyond enqueueing outbound frames.
pub struct LockReplicator {
    /// Registry key, echoed verbatim by replicas for demultiplexing.
    state_key: u64,

    inner: Mutex<State>,
}

impl LockReplicator {
    /// Allocates an uninitialized replicator keyed by `state_key`.
    pub fn new(state_key: u64) -> Self {
        LockReplicator {
            state_key,
            inner: Mutex::new(State {
                init: false,
                finished: false,
                id: CommId::NULL,
                nonce: 0,
                table: Bytes::new(),
                key: Bytes::new(),
                tg: TransactionGroup::default(),
                op: LockOp::Lock,
                requests: Vec::new(),
            }),
        }
    }

    /// The registry key.
    pub fn state_key(&self) -> u64 {
        self.state_key
    }

    /// True iff uninitialized or completed.
    pub fn finished(&self) -> bool {
        let state = self.inner.lock();
        !state.init || state.finished
    }

    /// One-shot initialization with the operation's parameters. The `Bytes`
    /// handles keep the table/key backing storage alive for the
    /// replicator's lifetime.
    ///
    /// # Panics
    ///
    /// Panics if called twice.
    pub fn init(
        &self,
        id: CommId,
        nonce: u64,
        table: Bytes,
        key: Bytes,
        tg: TransactionGroup,
        op: LockOp,
    ) {
        let mut state = self.inner.lock();
        assert!(!state.init, "lock replicator initialized twice");
        state.id = id;
        state.nonce = nonce;
        state.table = table;
        state.key = key;
        state.tg = tg;
        state.op = op;
        state.init = true;

        if debug_mode() {
            pf_info!(
                "{} table=\"{}\" key=\"{}\" transaction={} nonce={} id={}",
                state.logid(),
                strescape(&state.table),
                strescape(&state.key),
                tg,
                nonce,
                id
            );
        }
    }

    /// Records an inbound response from `from` and re-evaluates the state
    /// machine. Responses from targets with no outstanding stub are dropped
    /// without creating one.
    pub fn response(
        &self,
        from: CommId,
        tg: TransactionGroup,
        rs: ReplicaSet,
        ctx: &dyn Context,
    ) {
        let mut state = self.inner.lock();

        let idx = match state.stub_index(from) {
            Some(idx) => idx,
            None => {
                pf_debug!(
                    "{} dropped response; no outstanding request to {}",
                    state.logid(),
                    from
                );
                return;
            }
        };

        pf_trace!("{} response from={}", state.logid(), from);
        state.requests[idx].tg = tg;
        state.requests[idx].rs = rs;

        if state.finished {
            return; // stub updated for the record, machine already done
        }
        state.work_state_machine(self.state_key, ctx);
    }

    /// Timer or external nudge to re-evaluate the state machine.
    pub fn externally_work(&self, ctx: &dyn Context) {
        let mut state = self.inner.lock();
        if !state.init || state.finished {
            return;
        }
        state.work_state_machine(self.state_key, ctx);
    }

    /// Wound-wait cancellation: if `tg` is this replicator's transaction,
    /// signal the originating transaction manager to abort it and finish.
    /// Idempotent once finished.
    pub fn abort(&self, tg: &TransactionGroup, ctx: &dyn Context) {
        let mut state = self.inner.lock();
        if !state.init || state.tg != *tg || state.finished {
            return;
        }
        state.finished = true;
        state.requests.clear();

        if debug_mode() {
            pf_info!(
                "{} sending wound message for {}",
                state.logid(),
                tg.log()
            );
        }
        let msg = KvsMessage::Wound { tg: *tg };
        ctx.send(state.id, msg.pack());
    }

    /// Silent cancellation: if `tg` is this replicator's transaction,
    /// finish without any network side effect. Used when the local
    /// transaction manager has already learned the transaction's fate.
    pub fn discard(&self, tg: &TransactionGroup) {
        let mut state = self.inner.lock();
        if state.init && state.tg == *tg && !state.finished {
            state.finished = true;
            state.requests.clear();
            if debug_mode() {
                pf_info!("{} dropping transaction", state.logid());
            }
        }
    }

    /// Human-readable snapshot for debugging endpoints.
    pub fn debug_dump(&self) -> String {
        let state = self.inner.lock();
        let mut out = String::new();
        let _ = writeln!(out, "init={}", if state.init { "yes" } else { "no" });
        let _ = writeln!(
            out,
            "finished={}",
            if state.finished { "yes" } else { "no" }
        );
        let _ = writeln!(
            out,
            "request id={} nonce={}",
            state.id, state.nonce
        );
        let _ = writeln!(out, "table=\"{}\"", strescape(&state.table));
        let _ = writeln!(out, "key=\"{}\"", strescape(&state.key));
        let _ = writeln!(
            out,
            "t/k logid={}",
            table_key_logid(&state.table, &state.key)
        );
        let _ = writeln!(out, "tx logid={}", state.tg.log());
        let _ = writeln!(out, "tx={}", state.tg);
        let _ = writeln!(out, "op={}", state.op);

        for (i, stub) in state.requests.iter().enumerate() {
            let _ = writeln!(
                out,
                "request[{}] target={} last_request_time={} \
                 transaction_group={} replica_set={}",
                i, stub.target, stub.last_request_time, stub.tg, stub.rs
            );
        }

        out
    }
}

/// Fixed-width digest of a `(table, key)` pair for log line prefixes.
fn table_key_logid(table: &[u8], key: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    table.hash(&mut hasher);
    key.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Printable rendering of possibly-binary table/key bytes.
fn strescape(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).escape_default().to_string()
}
