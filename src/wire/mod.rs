//! Wire-level message framing shared with the KVS daemons.

mod message;

pub use message::{KvsMessage, MsgType, HEADER_SIZE};
