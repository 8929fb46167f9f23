//! Scenario 4: signal-triggered report. Reads `SU_SIGNO` itself (the same
//! variable the profiler reads), spawns one long-running thread, raises
//! that signal mid-run to request an on-demand report, then lets the
//! process finish normally so a second, final report is emitted at
//! teardown.
//!
//! Run with e.g.:
//!   SU_SIGNO=10 SU_STDERR=1 LD_PRELOAD=target/debug/libstackusage_core.so \
//!       ./signal_report

use std::thread;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let signo: i32 = std::env::var("SU_SIGNO")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(libc::SIGUSR1);

    let handle = thread::Builder::new()
        .name("long-runner".to_string())
        .spawn(|| {
            let mut buf = [0u8; 8192];
            for (i, b) in buf.iter_mut().enumerate() {
                *b = (i & 0xff) as u8;
            }
            thread::sleep(Duration::from_millis(300));
            std::hint::black_box(&buf);
        })?;

    thread::sleep(Duration::from_millis(50));
    log::info!("signal_report: raising signal {signo} for a mid-run report");
    unsafe {
        libc::raise(signo);
    }

    handle.join().expect("long-runner panicked");
    log::info!("signal_report: done, expect a second report at exit");
    Ok(())
}
