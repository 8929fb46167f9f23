//! `stackusage-core`: an `LD_PRELOAD`-able stack usage profiler.
//!
//! Loaded into a target process, this library attaches to the main thread
//! at startup, interposes `pthread_create` so every subsequently spawned
//! thread is instrumented transparently, and on process exit (or a
//! configured signal) reports each thread's requested stack size, actual
//! stack size, observed high-water mark, and duration.
//!
//! The module that actually exports C symbols and wires the process
//! lifetime hooks is [`shim`]; everything else here is pure bookkeeping
//! that is also exercised directly by the crate's own test suite.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod record;
pub mod registry;
pub mod report;
pub mod shim;
pub mod sink;
