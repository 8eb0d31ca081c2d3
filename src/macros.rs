//! Performance logging macros
//!
//! Timing output for commands and maintenance sweeps, logged under the
//! `perf` target. Compiled in every profile but only emitted by debug builds,
//! so arguments stay type-checked in release.

/// Debug-level timing line, debug builds only
#[macro_export]
macro_rules! perf_debug {
    ($($arg:tt)*) => {
        if cfg!(debug_assertions) {
            log::debug!(target: "perf", $($arg)*);
        }
    };
}

/// Trace-level timing line, debug builds only
#[macro_export]
macro_rules! perf_trace {
    ($($arg:tt)*) => {
        if cfg!(debug_assertions) {
            log::trace!(target: "perf", $($arg)*);
        }
    };
}
