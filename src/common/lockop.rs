//! Lock operation kind and client-visible return codes.

use std::fmt;

use crate::utils::ReplockError;

/// Kind of a per-key lock operation.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum LockOp {
    Lock,
    Unlock,
}

impl LockOp {
    /// Wire byte for this operation.
    pub fn to_wire(self) -> u8 {
        match self {
            LockOp::Lock => 1,
            LockOp::Unlock => 2,
        }
    }

    /// Decodes a wire byte.
    pub fn from_wire(b: u8) -> Result<Self, ReplockError> {
        match b {
            1 => Ok(LockOp::Lock),
            2 => Ok(LockOp::Unlock),
            _ => Err(ReplockError(format!("invalid lock op byte {}", b))),
        }
    }
}

impl fmt::Display for LockOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LockOp::Lock => write!(f, "lock"),
            LockOp::Unlock => write!(f, "unlock"),
        }
    }
}

/// Return code carried in the terminal response to the originating client.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ReturnCode {
    /// Operation reached a quorum of the desired replication factor.
    Success,

    /// Operation reached a quorum, but the configuration could not provide
    /// enough replicas to meet the desired replication factor.
    LessDurable,
}

impl ReturnCode {
    /// Wire code for this return code.
    pub fn to_wire(self) -> u16 {
        match self {
            ReturnCode::Success => 0x2200,
            ReturnCode::LessDurable => 0x2201,
        }
    }

    /// Decodes a wire code.
    pub fn from_wire(w: u16) -> Result<Self, ReplockError> {
        match w {
            0x2200 => Ok(ReturnCode::Success),
            0x2201 => Ok(ReturnCode::LessDurable),
            _ => Err(ReplockError(format!(
                "invalid return code 0x{:04x}",
                w
            ))),
        }
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReturnCode::Success => write!(f, "SUCCESS"),
            ReturnCode::LessDurable => write!(f, "LESS_DURABLE"),
        }
    }
}

#[cfg(test)]
mod lockop_tests {
    use super::*;

    #[test]
    fn op_wire_bytes() {
        assert_eq!(LockOp::from_wire(LockOp::Lock.to_wire()), Ok(LockOp::Lock));
        assert_eq!(
            LockOp::from_wire(LockOp::Unlock.to_wire()),
            Ok(LockOp::Unlock)
        );
        assert!(LockOp::from_wire(0).is_err());
        assert!(LockOp::from_wire(3).is_err());
    }

    #[test]
    fn rc_wire_codes() {
        assert_eq!(
            ReturnCode::from_wire(ReturnCode::Success.to_wire()),
            Ok(ReturnCode::Success)
        );
        assert_eq!(
            ReturnCode::from_wire(ReturnCode::LessDurable.to_wire()),
            Ok(ReturnCode::LessDurable)
        );
        assert!(ReturnCode::from_wire(0xffff).is_err());
    }
}
