//! Scenario 6: deep main stack. Recurses on the main thread itself to a
//! depth deep enough to exercise the pre-touch/paint/scan path near the
//! main thread's `RLIMIT_STACK` boundary, without actually overflowing it.

const FRAME_BYTES: usize = 512;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let depth = std::env::var("DEEP_MAIN_STACK_DEPTH")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(2000usize);

    log::info!("deep_main_stack: recursing to depth {depth} on the main thread");
    let touched = recurse(depth);
    log::info!("deep_main_stack: unwound, touched marker {touched}");
    Ok(())
}

#[inline(never)]
fn recurse(remaining: usize) -> u8 {
    let frame = [remaining as u8; FRAME_BYTES];
    if remaining == 0 {
        return frame[0];
    }
    std::hint::black_box(&frame);
    recurse(remaining - 1)
}
