//! Helper utilities, functions, and macros.

#[macro_use]
mod print;

#[macro_use]
mod config;

mod clock;
mod error;

pub use clock::{debug_mode, monotonic_time, set_debug_mode};
pub use error::ReplockError;
