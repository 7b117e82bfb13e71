//! Lock-protocol message encoding.
//!
//! The format is a fixed contract with the KVS daemons: big-endian integers,
//! byte strings as a `u32` length followed by the raw bytes, and a reserved
//! transport header prefix of [`HEADER_SIZE`] zero bytes that the send layer
//! overwrites in place. Decoding is strict: short frames, unknown message
//! types, bad enum encodings, and trailing bytes are all errors.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::common::{
    CommId, LockOp, PaxosGroupId, ReplicaSet, ReturnCode, TransactionGroup,
};
use crate::utils::ReplockError;

/// Bytes reserved at the front of every frame for the transport layer.
pub const HEADER_SIZE: usize = 8;

/// Wire codes of the lock-protocol messages.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u16)]
pub enum MsgType {
    /// Raw lock request, transaction manager -> KVS replica.
    KvsRawLock = 0x4c4b,

    /// Raw lock response, KVS replica -> transaction manager.
    KvsRawLockResp = 0x4c52,

    /// Terminal per-operation response, transaction manager -> client.
    KvsLockOpResp = 0x4c4f,

    /// Wound signal, lock replicator -> originating transaction manager.
    TxmanWound = 0x5457,
}

impl MsgType {
    fn from_wire(w: u16) -> Result<Self, ReplockError> {
        match w {
            0x4c4b => Ok(MsgType::KvsRawLock),
            0x4c52 => Ok(MsgType::KvsRawLockResp),
            0x4c4f => Ok(MsgType::KvsLockOpResp),
            0x5457 => Ok(MsgType::TxmanWound),
            _ => {
                Err(ReplockError(format!("invalid msg type 0x{:04x}", w)))
            }
        }
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MsgType::KvsRawLock => write!(f, "KVS_RAW_LK"),
            MsgType::KvsRawLockResp => write!(f, "KVS_RAW_LK_RESP"),
            MsgType::KvsLockOpResp => write!(f, "KVS_LOCK_OP_RESP"),
            MsgType::TxmanWound => write!(f, "TXMAN_WOUND"),
        }
    }
}

/// Lock-protocol message payloads.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum KvsMessage {
    /// Lock/unlock request sent to each non-agreeing replica. `state_key`
    /// is echoed verbatim by the replica for response demultiplexing.
    RawLock {
        state_key: u64,
        table: Bytes,
        key: Bytes,
        tg: TransactionGroup,
        op: LockOp,
    },

    /// A replica's report of the lock's holder and its replica-set view.
    RawLockResp {
        state_key: u64,
        tg: TransactionGroup,
        rs: ReplicaSet,
    },

    /// Terminal response to the originating client, sent exactly once per
    /// lock operation.
    LockOpResp { nonce: u64, rc: ReturnCode },

    /// Wound signal carrying the transaction to be aborted.
    Wound { tg: TransactionGroup },
}

impl KvsMessage {
    /// Wire code of this message.
    pub fn msg_type(&self) -> MsgType {
        match self {
            KvsMessage::RawLock { .. } => MsgType::KvsRawLock,
            KvsMessage::RawLockResp { .. } => MsgType::KvsRawLockResp,
            KvsMessage::LockOpResp { .. } => MsgType::KvsLockOpResp,
            KvsMessage::Wound { .. } => MsgType::TxmanWound,
        }
    }

    /// Encodes the message into a frame with the transport header prefix
    /// zeroed out.
    pub fn pack(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + 64);
        buf.put_bytes(0, HEADER_SIZE);
        buf.put_u16(self.msg_type() as u16);

        match self {
            KvsMessage::RawLock {
                state_key,
                table,
                key,
                tg,
                op,
            } => {
                buf.put_u64(*state_key);
                put_slice(&mut buf, table);
                put_slice(&mut buf, key);
                put_tg(&mut buf, tg);
                buf.put_u8(op.to_wire());
            }
            KvsMessage::RawLockResp { state_key, tg, rs } => {
                buf.put_u64(*state_key);
                put_tg(&mut buf, tg);
                put_rs(&mut buf, rs);
            }
            KvsMessage::LockOpResp { nonce, rc } => {
                buf.put_u64(*nonce);
                buf.put_u16(rc.to_wire());
            }
            KvsMessage::Wound { tg } => {
                put_tg(&mut buf, tg);
            }
        }

        buf.freeze()
    }

    /// Decodes a full frame (transport header included).
    pub fn unpack(frame: &[u8]) -> Result<Self, ReplockError> {
        if frame.len() < HEADER_SIZE {
            return Err(ReplockError(format!(
                "frame shorter than transport header: {} bytes",
                frame.len()
            )));
        }
        let mut buf = &frame[HEADER_SIZE..];

        let msg_type = MsgType::from_wire(take_u16(&mut buf)?)?;
        let msg = match msg_type {
            MsgType::KvsRawLock => {
                let state_key = take_u64(&mut buf)?;
                let table = take_slice(&mut buf)?;
                let key = take_slice(&mut buf)?;
                let tg = take_tg(&mut buf)?;
                let op = LockOp::from_wire(take_u8(&mut buf)?)?;
                KvsMessage::RawLock {
                    state_key,
                    table,
                    key,
                    tg,
                    op,
                }
            }
            MsgType::KvsRawLockResp => {
                let state_key = take_u64(&mut buf)?;
                let tg = take_tg(&mut buf)?;
                let rs = take_rs(&mut buf)?;
                KvsMessage::RawLockResp { state_key, tg, rs }
            }
            MsgType::KvsLockOpResp => {
                let nonce = take_u64(&mut buf)?;
                let rc = ReturnCode::from_wire(take_u16(&mut buf)?)?;
                KvsMessage::LockOpResp { nonce, rc }
            }
            MsgType::TxmanWound => {
                let tg = take_tg(&mut buf)?;
                KvsMessage::Wound { tg }
            }
        };

        if buf.has_remaining() {
            return Err(ReplockError(format!(
                "{} trailing bytes after {} payload",
                buf.remaining(),
                msg_type
            )));
        }
        Ok(msg)
    }
}

fn put_slice(buf: &mut BytesMut, bytes: &Bytes) {
    debug_assert!(bytes.len() <= u32::MAX as usize);
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

fn put_tg(buf: &mut BytesMut, tg: &TransactionGroup) {
    buf.put_u64(tg.timestamp);
    buf.put_u64(tg.group.0);
    buf.put_u64(tg.number);
}

fn put_rs(buf: &mut BytesMut, rs: &ReplicaSet) {
    debug_assert_eq!(rs.replicas.len(), rs.transitioning.len());
    debug_assert!(rs.replicas.len() <= u8::MAX as usize);
    buf.put_u8(rs.desired_replication);
    buf.put_u8(rs.replicas.len() as u8);
    for (r, t) in rs.replicas.iter().zip(rs.transitioning.iter()) {
        buf.put_u64(r.0);
        buf.put_u64(t.0);
    }
}

fn truncated() -> ReplockError {
    ReplockError("truncated frame".into())
}

fn take_u8(buf: &mut &[u8]) -> Result<u8, ReplockError> {
    if buf.remaining() < 1 {
        return Err(truncated());
    }
    Ok(buf.get_u8())
}

fn take_u16(buf: &mut &[u8]) -> Result<u16, ReplockError> {
    if buf.remaining() < 2 {
        return Err(truncated());
    }
    Ok(buf.get_u16())
}

fn take_u64(buf: &mut &[u8]) -> Result<u64, ReplockError> {
    if buf.remaining() < 8 {
        return Err(truncated());
    }
    Ok(buf.get_u64())
}

fn take_slice(buf: &mut &[u8]) -> Result<Bytes, ReplockError> {
    let len = take_len(buf)?;
    if buf.remaining() < len {
        return Err(truncated());
    }
    let bytes = Bytes::copy_from_slice(&buf[..len]);
    buf.advance(len);
    Ok(bytes)
}

fn take_len(buf: &mut &[u8]) -> Result<usize, ReplockError> {
    if buf.remaining() < 4 {
        return Err(truncated());
    }
    Ok(buf.get_u32() as usize)
}

fn take_tg(buf: &mut &[u8]) -> Result<TransactionGroup, ReplockError> {
    let timestamp = take_u64(buf)?;
    let group = PaxosGroupId(take_u64(buf)?);
    let number = take_u64(buf)?;
    Ok(TransactionGroup {
        timestamp,
        group,
        number,
    })
}

fn take_rs(buf: &mut &[u8]) -> Result<ReplicaSet, ReplockError> {
    let desired_replication = take_u8(buf)?;
    let count = take_u8(buf)? as usize;
    let mut replicas = Vec::with_capacity(count);
    let mut transitioning = Vec::with_capacity(count);
    for _ in 0..count {
        replicas.push(CommId(take_u64(buf)?));
        transitioning.push(CommId(take_u64(buf)?));
    }
    Ok(ReplicaSet {
        desired_replication,
        replicas,
        transitioning,
    })
}

#[cfg(test)]
mod message_tests {
    use super::*;

    fn some_tg() -> TransactionGroup {
        TransactionGroup::new(88, PaxosGroupId(3), 4)
    }

    fn some_rs() -> ReplicaSet {
        ReplicaSet {
            desired_replication: 3,
            replicas: vec![CommId(1), CommId(2), CommId(3)],
            transitioning: vec![CommId::NULL, CommId(9), CommId::NULL],
        }
    }

    #[test]
    fn header_prefix_reserved() {
        let frame = KvsMessage::Wound { tg: some_tg() }.pack();
        assert!(frame.len() > HEADER_SIZE);
        assert!(frame[..HEADER_SIZE].iter().all(|&b| b == 0));
    }

    #[test]
    fn raw_lock_roundtrip() {
        let msg = KvsMessage::RawLock {
            state_key: 0xdead_beef,
            table: Bytes::from_static(b"accounts"),
            key: Bytes::from_static(b"alice"),
            tg: some_tg(),
            op: LockOp::Lock,
        };
        assert_eq!(KvsMessage::unpack(&msg.pack()), Ok(msg));
    }

    #[test]
    fn raw_lock_resp_roundtrip() {
        let msg = KvsMessage::RawLockResp {
            state_key: 42,
            tg: some_tg(),
            rs: some_rs(),
        };
        assert_eq!(KvsMessage::unpack(&msg.pack()), Ok(msg));
    }

    #[test]
    fn lock_op_resp_roundtrip() {
        let msg = KvsMessage::LockOpResp {
            nonce: 7,
            rc: ReturnCode::LessDurable,
        };
        assert_eq!(KvsMessage::unpack(&msg.pack()), Ok(msg));
    }

    #[test]
    fn rejects_malformed_frames() {
        // shorter than the reserved header
        assert!(KvsMessage::unpack(&[0u8; 4]).is_err());

        // unknown message type
        let mut frame = vec![0u8; HEADER_SIZE];
        frame.extend_from_slice(&0xffffu16.to_be_bytes());
        assert!(KvsMessage::unpack(&frame).is_err());

        // truncated payload
        let good = KvsMessage::Wound { tg: some_tg() }.pack();
        assert!(KvsMessage::unpack(&good[..good.len() - 1]).is_err());

        // trailing garbage
        let mut long = good.to_vec();
        long.push(0);
        assert!(KvsMessage::unpack(&long).is_err());
    }
}
