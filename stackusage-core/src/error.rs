//! Error taxonomy for the profiler's internal operations.
//!
//! Nothing here ever crosses the cdylib's C ABI boundary: every value is
//! consumed at the call site by [`crate::sink`], never propagated with `?`
//! to the host program.

use std::fmt;

/// Failure modes the shim can hit while instrumenting a thread.
///
/// All of these are non-fatal to the target process; see spec section 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuError {
    /// The real `pthread_create` symbol could not be resolved via `dlsym`.
    ResolveFailure,
    /// A descriptor, attribute copy, or thread record allocation failed.
    AllocFailure,
    /// Stack bounds or guard size could not be read for the current thread.
    AttrQueryFailure,
    /// `clock_gettime`/`Instant::now` bookkeeping failed to produce a usable time.
    ClockFailure,
    /// The configured report signal could not be installed.
    SignalMisconfig,
}

impl fmt::Display for SuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SuError::ResolveFailure => "failed to resolve underlying pthread_create",
            SuError::AllocFailure => "allocation failed, thread will be untracked",
            SuError::AttrQueryFailure => "failed to query thread stack attributes",
            SuError::ClockFailure => "failed to read monotonic clock",
            SuError::SignalMisconfig => "failed to install report signal handler",
        };
        f.write_str(msg)
    }
}
