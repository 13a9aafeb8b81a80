//! Lifecycle and locking for the embedded R runtime.
//!
//! R is a process-wide singleton: it can be initialized once, used from
//! one thread at a time, and shut down once. This module owns that state
//! machine and the global call lock every R-touching operation routes
//! through.

use crate::error::{LinkError, LinkResult};
use crate::object::RObject;
use parking_lot::{Mutex, ReentrantMutex};
use rlink_libr::{r_library, r_base_env, r_empty_env, r_global_env};
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle stage of the embedded runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Stage {
    Uninitialized = 0,
    Initialized = 1,
    Ended = 2,
}

impl Stage {
    fn from_u8(value: u8) -> Stage {
        match value {
            0 => Stage::Uninitialized,
            1 => Stage::Initialized,
            _ => Stage::Ended,
        }
    }

    /// The stage transition for an initialization request.
    ///
    /// Returns the next stage and whether the runtime actually needs to
    /// be bootstrapped.
    fn on_init(self) -> LinkResult<(Stage, bool)> {
        match self {
            Stage::Uninitialized => Ok((Stage::Initialized, true)),
            Stage::Initialized => Ok((Stage::Initialized, false)),
            // libR cannot be re-initialized in-process; failing loudly
            // here is the alternative to silent memory corruption
            Stage::Ended => Err(LinkError::RestartUnsupported),
        }
    }

    /// The stage transition for a shutdown request.
    ///
    /// Returns the next stage and whether teardown actually needs to run.
    fn on_end(self) -> LinkResult<(Stage, bool)> {
        match self {
            Stage::Uninitialized => Err(LinkError::NotReady),
            Stage::Initialized => Ok((Stage::Ended, true)),
            Stage::Ended => Ok((Stage::Ended, false)),
        }
    }
}

/// Options for session initialization.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Command-line arguments passed to R at startup.
    pub r_args: Vec<String>,
    /// Whether to install a SIGINT handler that forwards interrupts to R.
    pub interrupt_handler: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            r_args: ["--quiet", "--no-save", "--no-restore-data"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            interrupt_handler: true,
        }
    }
}

/// Root environments captured at initialization.
///
/// Holding them as managed objects keeps the protection registry aware of
/// the roots and gives callers cheap clones.
#[derive(Debug)]
struct Roots {
    global: RObject,
    base: RObject,
    empty: RObject,
}

struct SessionState {
    stage: Stage,
    roots: Option<Roots>,
}

// Lock order: SESSION may be taken before R_LOCK (init and end hold it
// while waiting for the call lock), never after. Code that runs under
// the call lock therefore reads the stage from STAGE, the lock-free
// mirror below, and never touches SESSION.
static SESSION: Mutex<SessionState> = Mutex::new(SessionState {
    stage: Stage::Uninitialized,
    roots: None,
});

/// Lock-free mirror of `SESSION.stage`, published on every transition.
static STAGE: AtomicU8 = AtomicU8::new(Stage::Uninitialized as u8);

/// The global call lock. Reentrant so composed operations can hold it
/// across several R calls without deadlocking on their own inner locks.
static R_LOCK: ReentrantMutex<()> = ReentrantMutex::new(());

/// Run `f` while holding the global R call lock.
///
/// All paths that call into R go through here. The lock is released on
/// unwind.
pub fn with_lock<T>(f: impl FnOnce() -> T) -> T {
    let _guard = R_LOCK.lock();
    f()
}

/// Initialize the embedded R runtime with default options.
///
/// Returns `Ok(true)` when this call performed the bootstrap and
/// `Ok(false)` when the runtime was already initialized.
pub fn init() -> LinkResult<bool> {
    init_with_options(&SessionOptions::default())
}

/// Initialize the embedded R runtime.
///
/// Idempotent while the runtime is live. Once [`end`] has run, further
/// initialization fails with [`LinkError::RestartUnsupported`].
pub fn init_with_options(options: &SessionOptions) -> LinkResult<bool> {
    let mut state = SESSION.lock();
    let (next, bootstrap) = state.stage.on_init()?;
    if !bootstrap {
        return Ok(false);
    }

    let args: Vec<&str> = options.r_args.iter().map(String::as_str).collect();
    with_lock(|| -> LinkResult<()> {
        // Safety: the stage machine guarantees this runs at most once
        // per process.
        unsafe { rlink_libr::initialize_r_embedded_with_args(&args) }?;
        Ok(())
    })?;

    let roots = with_lock(|| -> LinkResult<Roots> {
        unsafe {
            Ok(Roots {
                global: RObject::new(r_global_env()?)?,
                base: RObject::new(r_base_env()?)?,
                empty: RObject::new(r_empty_env()?)?,
            })
        }
    })?;

    if options.interrupt_handler {
        install_interrupt_handler();
    }

    state.roots = Some(roots);
    state.stage = next;
    STAGE.store(next as u8, Ordering::Release);
    log::info!("embedded R session initialized");
    Ok(true)
}

/// Shut down the embedded R runtime.
///
/// Runs R's exit finalizers, forces a garbage collection and ends the
/// embedded interpreter. After this returns, every R-touching operation
/// fails with [`LinkError::NotReady`], and the runtime cannot be brought
/// back in this process. Calling `end` again is a no-op.
pub fn end(exit_code: i32) -> LinkResult<()> {
    let mut state = SESSION.lock();
    let (next, teardown) = state.stage.on_end()?;
    if !teardown {
        return Ok(());
    }

    // Release the roots while R is still alive so their protections are
    // returned before the interpreter goes away.
    let roots = state.roots.take();
    with_lock(|| -> LinkResult<()> {
        drop(roots);
        let lib = r_library()?;
        unsafe {
            (lib.r_runexitfinalizers)();
            (lib.r_gc)();
            (lib.rf_endembeddedr)(exit_code);
        }
        Ok(())
    })?;

    state.stage = next;
    STAGE.store(next as u8, Ordering::Release);
    log::info!("embedded R session ended");
    Ok(())
}

/// Whether the runtime is initialized and not yet ended.
///
/// Reads the lock-free stage mirror, so it is safe to call while holding
/// the global call lock.
pub fn is_ready() -> bool {
    stage() == Stage::Initialized
}

/// The current lifecycle stage.
pub fn stage() -> Stage {
    Stage::from_u8(STAGE.load(Ordering::Acquire))
}

/// Fail with [`LinkError::NotReady`] unless the runtime is live.
pub fn assert_ready() -> LinkResult<()> {
    if is_ready() { Ok(()) } else { Err(LinkError::NotReady) }
}

/// The global environment, as captured at initialization.
pub fn global_env() -> LinkResult<RObject> {
    let state = SESSION.lock();
    match (&state.roots, state.stage) {
        (Some(roots), Stage::Initialized) => Ok(roots.global.clone()),
        _ => Err(LinkError::NotReady),
    }
}

/// The base environment, as captured at initialization.
pub fn base_env() -> LinkResult<RObject> {
    let state = SESSION.lock();
    match (&state.roots, state.stage) {
        (Some(roots), Stage::Initialized) => Ok(roots.base.clone()),
        _ => Err(LinkError::NotReady),
    }
}

/// The empty environment, as captured at initialization.
pub fn empty_env() -> LinkResult<RObject> {
    let state = SESSION.lock();
    match (&state.roots, state.stage) {
        (Some(roots), Stage::Initialized) => Ok(roots.empty.clone()),
        _ => Err(LinkError::NotReady),
    }
}

/// Install a SIGINT handler that forwards the interrupt to R by setting
/// `R_interrupts_pending`.
///
/// Signal dispositions are process state that belongs to the main thread;
/// when initialization happens elsewhere the handler is skipped and
/// interruption of R code is unavailable.
fn install_interrupt_handler() {
    if std::thread::current().name() != Some("main") {
        log::warn!("R initialized off the main thread; SIGINT will not interrupt R code");
        return;
    }
    let result = ctrlc::set_handler(|| {
        if let Ok(lib) = r_library() {
            unsafe {
                if !lib.r_interrupts_pending.is_null() {
                    *lib.r_interrupts_pending = 1;
                }
            }
        }
    });
    if let Err(e) = result {
        log::warn!("could not install interrupt handler: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn stage_machine_init_transitions() {
        assert_eq!(
            Stage::Uninitialized.on_init().unwrap(),
            (Stage::Initialized, true)
        );
        assert_eq!(
            Stage::Initialized.on_init().unwrap(),
            (Stage::Initialized, false)
        );
        assert!(matches!(
            Stage::Ended.on_init(),
            Err(LinkError::RestartUnsupported)
        ));
    }

    #[test]
    fn stage_machine_end_transitions() {
        assert!(matches!(
            Stage::Uninitialized.on_end(),
            Err(LinkError::NotReady)
        ));
        assert_eq!(Stage::Initialized.on_end().unwrap(), (Stage::Ended, true));
        assert_eq!(Stage::Ended.on_end().unwrap(), (Stage::Ended, false));
    }

    #[test]
    fn lock_is_reentrant() {
        let value = with_lock(|| with_lock(|| 7));
        assert_eq!(value, 7);
    }

    #[test]
    fn stage_queries_never_block_on_the_session_mutex() {
        // init and end hold SESSION while waiting for the call lock. A
        // call-lock holder asking about the stage must therefore never
        // take SESSION, or the two sides deadlock.
        let (tx, rx) = std::sync::mpsc::channel();
        let guard = SESSION.lock();
        thread::spawn(move || {
            with_lock(|| {
                let _ = is_ready();
                let _ = stage();
                let _ = assert_ready();
            });
            let _ = tx.send(());
        });
        let finished = rx.recv_timeout(Duration::from_secs(2));
        drop(guard);
        assert!(finished.is_ok(), "stage query blocked on the session mutex");
    }

    #[test]
    fn lock_serializes_threads() {
        // Each worker reads the counter, sleeps, and writes back the
        // incremented value. Without mutual exclusion the read-sleep-write
        // windows overlap and increments are lost.
        let counter = Arc::new(AtomicUsize::new(0));
        let mut workers = Vec::new();
        for _ in 0..4 {
            let counter = Arc::clone(&counter);
            workers.push(thread::spawn(move || {
                for _ in 0..10 {
                    with_lock(|| {
                        let seen = counter.load(Ordering::Relaxed);
                        thread::sleep(Duration::from_micros(50));
                        counter.store(seen + 1, Ordering::Relaxed);
                    });
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 40);
    }
}
