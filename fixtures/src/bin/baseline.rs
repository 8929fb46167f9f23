//! Scenario 1: baseline. Spawns a couple of default-sized threads that do
//! a small, bounded amount of work and join normally, then the process
//! exits normally.
//!
//! Run with e.g.:
//!   SU_STDERR=1 LD_PRELOAD=target/debug/libstackusage_core.so ./baseline

use std::thread;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    log::info!("baseline: starting");

    let handles: Vec<_> = (0..3)
        .map(|i| {
            thread::Builder::new()
                .name(format!("worker-{i}"))
                .spawn(move || do_work(i))
        })
        .collect::<Result<_, _>>()?;

    for h in handles {
        h.join().expect("worker thread panicked");
    }

    log::info!("baseline: all workers joined");
    Ok(())
}

fn do_work(id: usize) -> usize {
    let mut acc = 0usize;
    let scratch = [id as u8; 4096];
    for (i, b) in scratch.iter().enumerate() {
        acc = acc.wrapping_add(*b as usize + i);
    }
    thread::sleep(Duration::from_millis(10));
    acc
}
