//! Internal diagnostics. Compiled out without the `internal-logs` feature.

/// Log a debug event for this crate's own diagnostics.
macro_rules! notifier_debug {
    ($($arg:tt)+) => {
        #[cfg(feature = "internal-logs")]
        {
            tracing::debug!(target: "error_notifier", $($arg)+);
        }
    };
}

/// Log a warning for this crate's own diagnostics.
macro_rules! notifier_warn {
    ($($arg:tt)+) => {
        #[cfg(feature = "internal-logs")]
        {
            tracing::warn!(target: "error_notifier", $($arg)+);
        }
    };
}

pub(crate) use notifier_debug;
pub(crate) use notifier_warn;
