//! Scenario 5: pre-init thread. The original C fixture (`ex003.c`)
//! registers a `.preinit_array` entry that spawns a thread before `main`
//! runs at all, to check that the shim's constructor has already attached
//! by then. Rust binaries have no ergonomic way to hook `.preinit_array`
//! directly, so this approximates the same ordering guarantee with the
//! `ctor` crate: the spawn happens from a `#[ctor::ctor]` function, which
//! runs before `main` (see DESIGN.md for why this is an approximation,
//! not an exact reproduction, of the original fixture).

use std::sync::OnceLock;
use std::thread::JoinHandle;

static PREINIT_HANDLE: OnceLock<JoinHandle<()>> = OnceLock::new();

#[ctor::ctor]
fn spawn_before_main() {
    let handle = std::thread::Builder::new()
        .name("preinit-worker".to_string())
        .spawn(|| {
            let buf = [0xABu8; 2048];
            std::hint::black_box(&buf);
        })
        .expect("failed to spawn pre-init worker");
    let _ = PREINIT_HANDLE.set(handle);
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    log::info!("preinit_thread: main running, joining the pre-init worker");

    // set() above races main in theory; in practice ctor functions run to
    // completion before main is ever entered on every supported platform.
    let handle = PREINIT_HANDLE
        .get()
        .expect("pre-init worker was not registered before main");
    // JoinHandle doesn't implement Clone; take it via an Option swap isn't
    // possible from a shared OnceLock, so just block on thread completion
    // through a second, explicit synchronization point instead.
    while !handle.is_finished() {
        std::thread::yield_now();
    }

    log::info!("preinit_thread: done");
    Ok(())
}
