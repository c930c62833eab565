//! Run-scoped interrupt handling.
//!
//! The scheduler must stop on SIGINT/SIGTERM, but a process-wide handler
//! installed once and never removed would leak across embedder calls and
//! stack on repeated runs. Instead a [`SignalGuard`] installs the handlers
//! around one run and restores the previous dispositions on drop, and the
//! handler itself does nothing but set a [`CancelFlag`] through an atomic
//! pointer. Callers that do not want any signal wiring (tests, embedders
//! with their own handling) drive the scheduler with a flag they control.

use std::ffi::c_int;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

use crate::error::{HarnessError, Result};

/// Cloneable cancellation flag shared between a run and its canceller.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates a fresh, uncancelled flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Pointer to the flag of the currently guarded run.
///
/// Null whenever no guard is installed. The handler reads it with a plain
/// atomic load, which is async-signal-safe.
static ACTIVE_FLAG: AtomicPtr<AtomicBool> = AtomicPtr::new(ptr::null_mut());

extern "C" fn on_signal(_signum: c_int) {
    let flag = ACTIVE_FLAG.load(Ordering::Acquire);
    if !flag.is_null() {
        // SAFETY: the installing guard holds the Arc this points into alive
        // until after it clears ACTIVE_FLAG.
        unsafe { (*flag).store(true, Ordering::SeqCst) };
    }
}

/// SIGINT/SIGTERM registration scoped to one scheduler run.
///
/// Install one guard at a time; overlapping guards from several threads
/// would restore the saved dispositions out of order.
#[derive(Debug)]
pub struct SignalGuard {
    // Keeps the flag's allocation alive while ACTIVE_FLAG points at it.
    _flag: CancelFlag,
    prev_int: SigAction,
    prev_term: SigAction,
}

impl SignalGuard {
    /// Installs handlers that cancel `flag`, saving the previous actions.
    pub fn install(flag: &CancelFlag) -> Result<Self> {
        ACTIVE_FLAG.store(Arc::as_ptr(&flag.0).cast_mut(), Ordering::Release);
        let action = SigAction::new(
            SigHandler::Handler(on_signal),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        // SAFETY: the handler only performs an atomic store.
        let prev_int =
            unsafe { sigaction(Signal::SIGINT, &action) }.map_err(HarnessError::Signal)?;
        let prev_term =
            unsafe { sigaction(Signal::SIGTERM, &action) }.map_err(HarnessError::Signal)?;
        Ok(Self {
            _flag: flag.clone(),
            prev_int,
            prev_term,
        })
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        // Restore first, clear the pointer second: between the two stores a
        // late signal still finds a valid flag.
        // SAFETY: restoring dispositions observed at install time.
        unsafe {
            let _ = sigaction(Signal::SIGINT, &self.prev_int);
            let _ = sigaction(Signal::SIGTERM, &self.prev_term);
        }
        ACTIVE_FLAG.store(ptr::null_mut(), Ordering::Release);
    }
}
