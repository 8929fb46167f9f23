//! Process-wide configuration, read once from the environment at init.
//!
//! Mirrors the original `su_get_env()` but extends it with `SU_FILE` and
//! `SU_SIGNO`, per spec section 6.

use std::sync::OnceLock;

use bitflags::bitflags;

bitflags! {
    /// Which sinks the report emitter should write to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Sinks: u8 {
        const STDERR = 0b001;
        const SYSLOG = 0b010;
        const FILE   = 0b100;
    }
}

/// Immutable configuration, captured once during [`crate::shim::su_init`].
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub log_file: Option<String>,
    pub sinks: Sinks,
    pub report_signal: i32,
}

impl GlobalConfig {
    fn from_env() -> Self {
        let log_file = std::env::var("SU_FILE").ok().filter(|s| !s.is_empty());

        let mut sinks = Sinks::empty();
        if log_file.is_some() {
            sinks |= Sinks::FILE;
        }
        if std::env::var_os("SU_STDERR").is_some_and(|v| !v.is_empty()) {
            sinks |= Sinks::STDERR;
        }
        if std::env::var_os("SU_SYSLOG").is_some_and(|v| !v.is_empty()) {
            sinks |= Sinks::SYSLOG;
        }

        let report_signal = std::env::var("SU_SIGNO")
            .ok()
            .and_then(|v| v.parse::<i32>().ok())
            .unwrap_or(0);

        GlobalConfig {
            log_file,
            sinks,
            report_signal,
        }
    }
}

static CONFIG: OnceLock<GlobalConfig> = OnceLock::new();

/// Reads and caches the configuration. Safe to call more than once; later
/// calls are no-ops and return the value captured on the first call.
pub fn init() -> &'static GlobalConfig {
    CONFIG.get_or_init(GlobalConfig::from_env)
}

/// Returns the configuration, reading it from the environment on first use
/// if [`init`] hasn't run yet.
///
/// `pthread_create` can be wrapped re-entrantly before `su_init`'s `ctor`
/// fires (a thread spawned from another library's own constructor); `get`
/// must stay callable from that path without panicking, so it shares
/// `init`'s `OnceLock` rather than requiring `init` to have run first.
pub fn get() -> &'static GlobalConfig {
    init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sinks_combine() {
        let s = Sinks::STDERR | Sinks::FILE;
        assert!(s.contains(Sinks::STDERR));
        assert!(s.contains(Sinks::FILE));
        assert!(!s.contains(Sinks::SYSLOG));
    }
}
