//! The interposition shim (spec section 4.3): process-lifetime hooks,
//! the `pthread_create` replacement, the new-thread trampoline, and the
//! report emitter that both the destructor and the signal handler call
//! into.

use std::sync::OnceLock;
use std::time::{Instant, SystemTime};

use crate::config;
use crate::error::SuError;
use crate::fingerprint;
use crate::record::{GrowthDirection, ThreadKind, ThreadRecord};
use crate::registry;
use crate::report;
use crate::sink;

type PthreadCreateFn = unsafe extern "C" fn(
    *mut libc::pthread_t,
    *const libc::pthread_attr_t,
    extern "C" fn(*mut libc::c_void) -> *mut libc::c_void,
    *mut libc::c_void,
) -> libc::c_int;

static REAL_PTHREAD_CREATE: OnceLock<PthreadCreateFn> = OnceLock::new();
static TLS_KEY: OnceLock<libc::pthread_key_t> = OnceLock::new();
static PREVIOUS_HANDLER: OnceLock<libc::sigaction> = OnceLock::new();

/// Resolves and caches the real `pthread_create`, via `dlsym(RTLD_NEXT, ..)`.
fn real_pthread_create() -> Result<PthreadCreateFn, SuError> {
    if let Some(f) = REAL_PTHREAD_CREATE.get() {
        return Ok(*f);
    }
    let sym = unsafe { libc::dlsym(libc::RTLD_NEXT, c"pthread_create".as_ptr()) };
    if sym.is_null() {
        return Err(SuError::ResolveFailure);
    }
    // Safety: dlsym resolved a symbol with the documented pthread_create
    // signature for this libc; the transmute only reinterprets that pointer.
    let f: PthreadCreateFn = unsafe { std::mem::transmute(sym) };
    Ok(*REAL_PTHREAD_CREATE.get_or_init(|| f))
}

fn tls_key() -> libc::pthread_key_t {
    *TLS_KEY.get_or_init(|| {
        let mut key: libc::pthread_key_t = 0;
        let rc = unsafe { libc::pthread_key_create(&mut key, Some(tls_destructor)) };
        if rc != 0 {
            sink::error(SuError::AllocFailure, "creating thread-local finalization key");
        }
        key
    })
}

/// TLS-destructor fallback: fires when a thread terminates by a path other
/// than returning from its start routine (e.g. `pthread_exit` deep in the
/// call stack). The primary finalization path in [`trampoline`] always
/// runs first when reachable, and `finalize_thread` is idempotent, so this
/// is a no-op in the common case.
extern "C" fn tls_destructor(value: *mut libc::c_void) {
    if value.is_null() {
        return;
    }
    let handle = value as usize as libc::pthread_t;
    finalize_thread(handle);
}

fn current_os_tid() -> i32 {
    unsafe { libc::syscall(libc::SYS_gettid) as i32 }
}

fn current_thread_name() -> String {
    let mut buf = [0u8; 16];
    let rc = unsafe {
        libc::pthread_getname_np(libc::pthread_self(), buf.as_mut_ptr() as *mut libc::c_char, buf.len())
    };
    if rc != 0 {
        return String::new();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Registers the main thread. Called once from [`su_init`].
fn register_main_thread() {
    let growth = fingerprint::probe_growth_direction();
    let bounds = match fingerprint::discover_bounds(ThreadKind::Main, None, growth) {
        Ok(b) => b,
        Err(e) => {
            sink::error(e, "discovering main thread stack bounds");
            return;
        }
    };

    fingerprint::pretouch_main_stack(&bounds, growth);
    fingerprint::paint(&bounds, growth, ThreadKind::Main);

    registry::register(ThreadRecord {
        id: 0,
        kind: ThreadKind::Main,
        handle: unsafe { libc::pthread_self() },
        os_tid: current_os_tid(),
        stack_low: bounds.stack_low,
        stack_high: bounds.stack_high,
        guard_size: bounds.guard_size,
        requested_size: bounds.requested_size,
        actual_size: bounds.stack_high.saturating_sub(bounds.stack_low),
        peak_usage: 0,
        growth_direction: growth,
        entry_fn: 0,
        name: current_thread_name(),
        started_at: Instant::now(),
        started_wall: SystemTime::now(),
        stopped_at: None,
        finalized: false,
    });
}

/// Descriptor handed from the `pthread_create` replacement to
/// [`trampoline`] running on the new thread.
struct TrampolineArgs {
    real_start: extern "C" fn(*mut libc::c_void) -> *mut libc::c_void,
    real_arg: *mut libc::c_void,
    requested_size: usize,
}

/// Replacement for `pthread_create`, exported under the real symbol name
/// so the dynamic linker's symbol interposition routes every caller in the
/// process (including libc's own internal spawns) through here.
///
/// # Safety
/// Same contract as `pthread_create`: all pointer arguments must be valid
/// per POSIX, and `start_routine`/`arg` must be safe to invoke on a new
/// thread.
#[no_mangle]
pub unsafe extern "C" fn pthread_create(
    thread: *mut libc::pthread_t,
    attr: *const libc::pthread_attr_t,
    start_routine: extern "C" fn(*mut libc::c_void) -> *mut libc::c_void,
    arg: *mut libc::c_void,
) -> libc::c_int {
    // A panic unwinding past this `extern "C"` boundary would abort the
    // host process outright; catch it here and degrade to an uninstrumented
    // real pthread_create call instead.
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pthread_create_instrumented(thread, attr, start_routine, arg)
    }));
    match outcome {
        Ok(rc) => rc,
        Err(_) => {
            let real = real_pthread_create();
            match real {
                Ok(f) => unsafe { f(thread, attr, start_routine, arg) },
                Err(_) => libc::EAGAIN,
            }
        }
    }
}

fn pthread_create_instrumented(
    thread: *mut libc::pthread_t,
    attr: *const libc::pthread_attr_t,
    start_routine: extern "C" fn(*mut libc::c_void) -> *mut libc::c_void,
    arg: *mut libc::c_void,
) -> libc::c_int {
    let real = match real_pthread_create() {
        Ok(f) => f,
        Err(e) => {
            sink::error(e, "resolving real pthread_create, falling back uninstrumented");
            return libc::EAGAIN;
        }
    };

    let attr_ref = unsafe { attr.as_ref() };
    let requested_size = match fingerprint::requested_size_for_child(attr_ref) {
        Ok(sz) => sz,
        Err(e) => {
            sink::warn(e, "resolving requested child stack size, thread will be untracked");
            return unsafe { real(thread, attr, start_routine, arg) };
        }
    };

    let descriptor = Box::new(TrampolineArgs {
        real_start: start_routine,
        real_arg: arg,
        requested_size,
    });
    let raw = Box::into_raw(descriptor);

    let rc = unsafe { real(thread, attr, trampoline, raw as *mut libc::c_void) };
    if rc != 0 {
        // pthread_create failed; reclaim the descriptor, nothing was spawned.
        unsafe { drop(Box::from_raw(raw)) };
    }
    rc
}

extern "C" fn trampoline(arg: *mut libc::c_void) -> *mut libc::c_void {
    // Safety: `arg` is always a `Box<TrampolineArgs>` raw pointer created in
    // `pthread_create` just above, handed to exactly one trampoline
    // invocation.
    let descriptor = unsafe { Box::from_raw(arg as *mut TrampolineArgs) };
    let TrampolineArgs {
        real_start,
        real_arg,
        requested_size,
    } = *descriptor;

    let handle = unsafe { libc::pthread_self() };

    // Our own bookkeeping must never unwind into the caller's start
    // routine or past this extern "C" frame; swallow and log instead.
    let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        register_child_thread(handle, real_start, requested_size);
        unsafe { libc::pthread_setspecific(tls_key(), handle as usize as *mut libc::c_void) };
    }));

    let result = real_start(real_arg);

    // Primary finalization path: run before returning from the start
    // routine, while the stack is still fully intact. The TLS destructor
    // above is a fallback for threads that never reach this point (e.g.
    // `pthread_exit` called from deeper in the call stack).
    let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| finalize_thread(handle)));

    result
}

fn register_child_thread(
    handle: libc::pthread_t,
    real_start: extern "C" fn(*mut libc::c_void) -> *mut libc::c_void,
    requested_size: usize,
) {
    let growth = fingerprint::probe_growth_direction();
    let bounds = match fingerprint::build_bounds(requested_size, growth) {
        Ok(b) => b,
        Err(e) => {
            sink::warn(e, "discovering child thread stack bounds, thread will be untracked");
            return;
        }
    };
    fingerprint::paint(&bounds, growth, ThreadKind::Child);

    registry::register(ThreadRecord {
        id: 0,
        kind: ThreadKind::Child,
        handle,
        os_tid: current_os_tid(),
        stack_low: bounds.stack_low,
        stack_high: bounds.stack_high,
        guard_size: bounds.guard_size,
        requested_size: bounds.requested_size,
        actual_size: bounds.stack_high.saturating_sub(bounds.stack_low),
        peak_usage: 0,
        growth_direction: growth,
        entry_fn: real_start as usize,
        name: current_thread_name(),
        started_at: Instant::now(),
        started_wall: SystemTime::now(),
        stopped_at: None,
        finalized: false,
    });
}

/// Scans the calling thread's painted stack and marks its record
/// finalized. Idempotent: a thread finalized twice (once from
/// [`trampoline`], once from [`tls_destructor`]) only scans once.
fn finalize_thread(handle: libc::pthread_t) {
    registry::mutate_by_handle(handle, |record| {
        if record.finalized {
            return;
        }
        let bounds = fingerprint::StackBounds {
            stack_low: record.stack_low,
            stack_high: record.stack_high,
            guard_size: record.guard_size,
            requested_size: record.requested_size,
        };
        record.peak_usage = fingerprint::scan_peak(&bounds, record.growth_direction, record.kind);
        record.name = current_thread_name();
        record.stopped_at = Some(Instant::now());
        record.finalized = true;
    });
}

/// Snapshots the registry and writes one report to every configured sink.
///
/// Called from both [`su_fini`] (process teardown) and the `SU_SIGNO`
/// signal handler (on-demand, mid-run report).
pub fn emit_report() {
    let records = registry::snapshot();
    let timestamp = report::local_timestamp_now();
    let pid = std::process::id() as i32;
    sink::write_line(&report::render(&timestamp, pid, &records));
}

extern "C" fn handle_report_signal(signo: libc::c_int, info: *mut libc::siginfo_t, ctx: *mut libc::c_void) {
    emit_report();

    if let Some(prev) = PREVIOUS_HANDLER.get() {
        chain_to_previous(signo, prev, info, ctx);
    }
}

fn chain_to_previous(signo: libc::c_int, prev: &libc::sigaction, info: *mut libc::siginfo_t, ctx: *mut libc::c_void) {
    let flags = prev.sa_flags;
    if flags & libc::SA_SIGINFO != 0 {
        let handler: extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void) =
            unsafe { std::mem::transmute(prev.sa_sigaction) };
        handler(signo, info, ctx);
        return;
    }
    let handler_addr = prev.sa_sigaction;
    if handler_addr == libc::SIG_DFL || handler_addr == libc::SIG_IGN {
        return;
    }
    let handler: extern "C" fn(libc::c_int) = unsafe { std::mem::transmute(handler_addr) };
    handler(signo);
}

fn install_report_signal(signo: i32) {
    if signo == 0 {
        return;
    }
    unsafe {
        let mut new_action: libc::sigaction = std::mem::zeroed();
        new_action.sa_sigaction = handle_report_signal as usize;
        new_action.sa_flags = libc::SA_SIGINFO | libc::SA_RESTART;
        libc::sigemptyset(&mut new_action.sa_mask);

        let mut old_action: libc::sigaction = std::mem::zeroed();
        if libc::sigaction(signo, &new_action, &mut old_action) != 0 {
            sink::error(SuError::SignalMisconfig, "installing report signal handler");
            return;
        }
        let _ = PREVIOUS_HANDLER.set(old_action);
    }
}

/// Process-init hook: captures configuration, registers and paints the
/// main thread's stack, and installs the report signal if configured.
///
/// Runs before `main`, via the `ctor` crate.
#[ctor::ctor]
fn su_init() {
    let cfg = config::init();
    register_main_thread();
    install_report_signal(cfg.report_signal);
}

/// Process-teardown hook: finalizes the main thread and emits the final
/// report. Runs after `main` returns (or after every registered atexit
/// handler, depending on platform ordering), via the `ctor` crate.
#[ctor::dtor]
fn su_fini() {
    let main_handle = unsafe { libc::pthread_self() };
    finalize_thread(main_handle);
    emit_report();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_thread_name_does_not_panic() {
        let _ = current_thread_name();
    }

    #[test]
    fn os_tid_is_positive() {
        assert!(current_os_tid() > 0);
    }
}
