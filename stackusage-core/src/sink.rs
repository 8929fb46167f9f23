//! The profiler's own logging and report-emission channel.
//!
//! This deliberately does *not* go through the `log` crate or install any
//! process-wide logger: the shim is injected into an arbitrary host process,
//! which may have its own `log`/`tracing` setup that a global logger here
//! would clobber. Instead this mirrors the original `SU_LOG`/`SU_LOG_ERR`/
//! `SU_LOG_WARN` macros — format one line, append it to whichever sinks are
//! enabled, done.

use std::ffi::CString;
use std::fs::OpenOptions;
use std::io::Write;

use crate::config::{self, Sinks};
use crate::error::SuError;

const NAME: &str = "stackusage";

/// Appends one line (without a trailing newline) to every enabled sink.
///
/// File sink is opened, appended, and closed on every call for
/// crash-tolerance: a crash mid-run still leaves completed lines on disk.
pub fn write_line(line: &str) {
    let cfg = config::get();
    write_to_sinks(cfg.sinks, cfg.log_file.as_deref(), line);
}

fn write_to_sinks(sinks: Sinks, log_file: Option<&str>, line: &str) {
    if sinks.contains(Sinks::FILE) {
        if let Some(path) = log_file {
            if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) {
                let _ = writeln!(f, "{line}");
            }
        }
    }

    if sinks.contains(Sinks::STDERR) {
        eprintln!("{line}");
    }

    if sinks.contains(Sinks::SYSLOG) {
        log_to_syslog(line);
    }
}

fn log_to_syslog(line: &str) {
    if let Ok(c_line) = CString::new(line) {
        unsafe {
            libc::syslog(libc::LOG_ERR, c"%s".as_ptr(), c_line.as_ptr());
        }
    }
}

/// Logs a non-fatal error condition, e.g. a symbol-resolution failure.
pub fn error(err: SuError, context: &str) {
    write_line(&format!(
        "{NAME} (pid {}): error: {context}: {err}",
        std::process::id()
    ));
}

/// Logs a recoverable warning, e.g. a degraded/untracked thread.
pub fn warn(err: SuError, context: &str) {
    write_line(&format!(
        "{NAME} (pid {}): warning: {context}: {err}",
        std::process::id()
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_sink_appends_without_truncating() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("stackusage-sink-test-{}.log", std::process::id()));
        let path_str = path.to_str().unwrap().to_string();

        write_to_sinks(Sinks::FILE, Some(&path_str), "line one");
        write_to_sinks(Sinks::FILE, Some(&path_str), "line two");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("line one"));
        assert!(contents.contains("line two"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn no_sinks_enabled_does_nothing_observable() {
        write_to_sinks(Sinks::empty(), None, "should not panic");
    }
}
