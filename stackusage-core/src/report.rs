//! Report text formatting (spec section 6).
//!
//! Kept free of any I/O or global state so the column layout can be unit
//! tested directly; [`crate::shim::emit_report`] is the only caller.

use crate::record::{usage_percent, ThreadRecord};

const APP_NAME: &str = "stackusage";

/// `<name> log at <YYYY-MM-DD HH:MM:SS> ----`
pub fn header_line(timestamp: &str) -> String {
    format!("{APP_NAME} log at {timestamp} ----")
}

/// `pid id tid requested actual maxuse max% dur funcP name`
pub fn column_header() -> &'static str {
    "pid id tid requested actual maxuse max% dur funcP name"
}

/// One line per spec.md section 6: integer columns in base 10, `funcP` in
/// hex with a `0x` prefix, `name` trailing (may be empty).
pub fn record_line(pid: i32, record: &ThreadRecord) -> String {
    let percent = usage_percent(record.peak_usage, record.requested_size);
    format!(
        "{pid} {id} {tid} {requested} {actual} {maxuse} {percent} {dur} 0x{funcp:x} {name}",
        id = record.id,
        tid = record.os_tid,
        requested = record.requested_size,
        actual = record.actual_size,
        maxuse = record.peak_usage,
        dur = record.duration_secs(),
        funcp = record.entry_fn,
        name = record.name,
    )
}

/// Joins a header, column header, and one line per record into a single
/// report, ready for a single sink write.
pub fn render(timestamp: &str, pid: i32, records: &[ThreadRecord]) -> String {
    let mut lines = Vec::with_capacity(records.len() + 2);
    lines.push(header_line(timestamp));
    lines.push(column_header().to_string());
    for record in records {
        lines.push(record_line(pid, record));
    }
    lines.join("\n")
}

/// Formats the current wall-clock time as `YYYY-MM-DD HH:MM:SS`, local
/// time, using only `libc` (no time/chrono dependency for a single
/// call site).
pub fn local_timestamp_now() -> String {
    let secs = unsafe { libc::time(std::ptr::null_mut()) };
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    unsafe { libc::localtime_r(&secs, &mut tm) };
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        tm.tm_year + 1900,
        tm.tm_mon + 1,
        tm.tm_mday,
        tm.tm_hour,
        tm.tm_min,
        tm.tm_sec,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{GrowthDirection, ThreadKind};
    use std::time::{Instant, SystemTime};

    fn sample() -> ThreadRecord {
        ThreadRecord {
            id: 3,
            kind: ThreadKind::Child,
            handle: 0,
            os_tid: 4242,
            stack_low: 0,
            stack_high: 0,
            guard_size: 0,
            requested_size: 8 * 1024 * 1024,
            actual_size: 8 * 1024 * 1024,
            peak_usage: 4 * 1024 * 1024,
            growth_direction: GrowthDirection::Down,
            entry_fn: 0x5555_1234,
            name: "worker".to_string(),
            started_at: Instant::now(),
            started_wall: SystemTime::now(),
            stopped_at: None,
            finalized: true,
        }
    }

    #[test]
    fn header_matches_schema() {
        assert_eq!(header_line("2026-01-01 00:00:00"), "stackusage log at 2026-01-01 00:00:00 ----");
    }

    #[test]
    fn column_header_matches_schema() {
        assert_eq!(column_header(), "pid id tid requested actual maxuse max% dur funcP name");
    }

    #[test]
    fn record_line_has_expected_fields_in_order() {
        let line = record_line(100, &sample());
        let fields: Vec<&str> = line.split(' ').collect();
        assert_eq!(fields[0], "100"); // pid
        assert_eq!(fields[1], "3"); // id
        assert_eq!(fields[2], "4242"); // tid
        assert_eq!(fields[3], "8388608"); // requested
        assert_eq!(fields[4], "8388608"); // actual
        assert_eq!(fields[5], "4194304"); // maxuse
        assert_eq!(fields[6], "50"); // max%
        assert_eq!(fields[8], "0x55551234"); // funcP
        assert_eq!(fields[9], "worker"); // name
    }

    #[test]
    fn empty_name_leaves_trailing_space() {
        let mut r = sample();
        r.name = String::new();
        let line = record_line(1, &r);
        assert!(line.ends_with(' '));
    }
}
