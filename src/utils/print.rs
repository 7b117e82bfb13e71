//! Helper macros for logging (console printing).

/// Log TRACE message.
///
/// Example:
/// ```no_run
/// use replock::pf_trace;
/// let msg = "hello";
/// pf_trace!("got {} to print", msg);
/// ```
#[macro_export]
macro_rules! pf_trace {
    ($fmt_str:literal $(, $($fmt_arg:tt)*)?) => {
        log::trace!($fmt_str $(, $($fmt_arg)*)?)
    };
}

/// Log DEBUG message.
///
/// Example:
/// ```no_run
/// use replock::pf_debug;
/// let msg = "hello";
/// pf_debug!("got {} to print", msg);
/// ```
#[macro_export]
macro_rules! pf_debug {
    ($fmt_str:literal $(, $($fmt_arg:tt)*)?) => {
        log::debug!($fmt_str $(, $($fmt_arg)*)?)
    };
}

/// Log INFO message.
///
/// Example:
/// ```no_run
/// use replock::pf_info;
/// let msg = "hello";
/// pf_info!("got {} to print", msg);
/// ```
#[macro_export]
macro_rules! pf_info {
    ($fmt_str:literal $(, $($fmt_arg:tt)*)?) => {
        log::info!($fmt_str $(, $($fmt_arg)*)?)
    };
}

/// Log WARN message.
///
/// Example:
/// ```no_run
/// use replock::pf_warn;
/// let msg = "hello";
/// pf_warn!("got {} to print", msg);
/// ```
#[macro_export]
macro_rules! pf_warn {
    ($fmt_str:literal $(, $($fmt_arg:tt)*)?) => {
        log::warn!($fmt_str $(, $($fmt_arg)*)?)
    };
}

/// Log ERROR message.
///
/// Example:
/// ```no_run
/// use replock::pf_error;
/// let msg = "hello";
/// pf_error!("got {} to print", msg);
/// ```
#[macro_export]
macro_rules! pf_error {
    ($fmt_str:literal $(, $($fmt_arg:tt)*)?) => {
        log::error!($fmt_str $(, $($fmt_arg)*)?)
    };
}

/// Log an error string to logger and then return a `ReplockError`
/// containing the string.
///
/// Example:
/// ```no_run
/// use replock::{logged_err, pf_error, ReplockError};
/// let msg = "hello";
/// let e: Result<(), ReplockError> = logged_err!("got {} to print", msg);
/// ```
#[macro_export]
macro_rules! logged_err {
    ($fmt_str:literal $(, $($fmt_arg:tt)*)?) => {{
        pf_error!($fmt_str $(, $($fmt_arg)*)?);
        Err($crate::ReplockError(format!(
            $fmt_str $(, $($fmt_arg)*)?
        )))
    }};
}

#[cfg(test)]
mod print_tests {
    use crate::utils::ReplockError;

    #[test]
    fn error_no_args() {
        assert_eq!(
            logged_err!("interesting message"),
            Err::<(), ReplockError>(ReplockError(
                "interesting message".into()
            ))
        );
    }

    #[test]
    fn error_with_args() {
        assert_eq!(
            logged_err!("got {} to print", 777),
            Err::<(), ReplockError>(ReplockError("got 777 to print".into()))
        );
    }
}
