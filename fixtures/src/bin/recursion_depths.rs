//! Scenario 3: recursion depths. Each thread recurses to a different,
//! deterministic depth, exercising the peak-usage scan across a spread of
//! high-water marks on threads that all share the same requested size.

use std::thread;

const DEPTHS: [usize; 4] = [8, 64, 512, 4096];
const FRAME_BYTES: usize = 128;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let handles: Vec<_> = DEPTHS
        .iter()
        .copied()
        .map(|depth| {
            thread::Builder::new()
                .name(format!("recurse-{depth}"))
                .stack_size(8 * 1024 * 1024)
                .spawn(move || recurse(depth))
        })
        .collect::<Result<_, _>>()?;

    for h in handles {
        let reached = h.join().expect("recursion thread panicked");
        log::info!("reached depth {reached}");
    }
    Ok(())
}

#[inline(never)]
fn recurse(remaining: usize) -> usize {
    let frame = [remaining as u8; FRAME_BYTES];
    if remaining == 0 {
        return frame[0] as usize;
    }
    std::hint::black_box(&frame);
    1 + recurse(remaining - 1)
}
