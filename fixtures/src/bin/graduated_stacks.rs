//! Scenario 2: graduated stack sizes. Spawns several threads each with a
//! distinct, explicitly requested stack size, so the profiler's
//! requested/actual columns can be checked against known values per
//! thread.

use std::thread;

const SIZES: [usize; 4] = [64 * 1024, 256 * 1024, 1024 * 1024, 4 * 1024 * 1024];

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let handles: Vec<_> = SIZES
        .iter()
        .enumerate()
        .map(|(i, &size)| {
            thread::Builder::new()
                .name(format!("graduated-{i}-{size}"))
                .stack_size(size)
                .spawn(move || touch_fraction_of(size / 4))
        })
        .collect::<Result<_, _>>()?;

    for h in handles {
        h.join().expect("graduated thread panicked");
    }
    log::info!("graduated_stacks: done");
    Ok(())
}

/// Consumes roughly `bytes` of stack via a local array, so peak usage is
/// predictable relative to each thread's requested size.
fn touch_fraction_of(bytes: usize) -> usize {
    let mut buf = vec![0u8; bytes.max(64)];
    for (i, b) in buf.iter_mut().enumerate() {
        *b = (i & 0xff) as u8;
    }
    recurse_lightly(buf.len(), 0)
}

fn recurse_lightly(remaining: usize, depth: usize) -> usize {
    if remaining == 0 || depth > 32 {
        return depth;
    }
    let frame = [depth as u8; 256];
    recurse_lightly(remaining.saturating_sub(256), depth + 1) + frame[0] as usize
}
