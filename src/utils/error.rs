//! Customized unified error type.

use std::fmt;
use std::io;

/// Customized error type for replock.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ReplockError(pub String);

impl ReplockError {
    /// Creates an error from anything `ToString`.
    pub fn msg(m: impl ToString) -> Self {
        ReplockError(m.to_string())
    }
}

impl fmt::Display for ReplockError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0) // do not display literal quotes
    }
}

impl std::error::Error for ReplockError {}

// Helper macro for saving boiler-plate `impl From<T>`s for transparent
// conversion from various common error types to `ReplockError`.
macro_rules! impl_from_error {
    ($error:ty) => {
        impl From<$error> for ReplockError {
            fn from(e: $error) -> Self {
                // just store the source error's string representation
                ReplockError(e.to_string())
            }
        }
    };
}

impl_from_error!(io::Error);
impl_from_error!(toml::ser::Error);
impl_from_error!(toml::de::Error);

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn error_display() {
        let e = ReplockError("what the heck?".into());
        assert_eq!(format!("{}", e), String::from("what the heck?"));
    }

    #[test]
    fn from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "oh no!");
        let e = ReplockError::from(io_error);
        assert!(e.0.contains("oh no!"));
    }
}
