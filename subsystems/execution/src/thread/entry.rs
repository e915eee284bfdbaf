//! Shared entry trampoline of every thread.

use super::Thread;
use crate::fatal;

/// First code a fresh thread runs. `arg` is the address of its [`Thread`].
///
/// Never returns: the thread loops on its engine's run slice, leaving the
/// core only through a preemption.
pub(crate) extern "C" fn thread_entry(arg: usize) -> ! {
    // SAFETY: `arg` comes from `Arc::as_ptr` at creation, and the thread
    // manager holds that `Arc` for as long as the thread can be scheduled.
    let thread = unsafe { &*(arg as *const Thread) };

    let engine = match thread.engine() {
        Ok(engine) => engine,
        Err(err) => fatal(err),
    };

    loop {
        if let Err(err) = engine.run_slice() {
            fatal(err);
        }
    }
}
