//! Primitives available to code running inside a coroutine.
//!
//! Every one of them that gives up control copies the calling coroutine's
//! stack into the heap before the next coroutine runs, and copies it back
//! right before the caller continues. Locals, references into the caller's
//! own stack, and the call chain itself all survive the round trip.
//!
//! Called outside of [`Runtime::run`], they fail with
//! [`SchedulerError::NotInCoroutine`].
//!
//! [`Runtime::run`]: crate::runtime::Runtime::run
use crate::context;
use crate::continuation;
use crate::runtime::scheduler::{Handover, fatal};
use crate::runtime::{Scheduler, SchedulerError};
use crate::task::Pid;

fn request<T, F>(f: F) -> Result<T, SchedulerError>
where
    F: FnOnce(&Scheduler) -> Result<T, SchedulerError>,
{
    context::try_with_scheduler(f).unwrap_or(Err(SchedulerError::NotInCoroutine))
}

/// Gives control back to the trampoline.
///
/// # Safety
///
/// `handover` was just returned by the scheduler for the calling coroutine,
/// and no borrow of scheduler state is held across the call.
unsafe fn suspend((from, to): Handover) {
    // Safety: both slots belong to the scheduler owned by the `Runtime` in
    // the middle of `run`, so they outlive the switch.
    unsafe { continuation::switch(from, to) }
}

/// Starts `body` as a new coroutine and runs it until it first gives up
/// control. Returns the new coroutine's pid once the caller is scheduled
/// again, which happens right after that.
///
/// # Errors
///
/// * [`SchedulerError::CapacityExceeded`] if the runtime already holds
///   `max_coroutines` live coroutines.
/// * [`SchedulerError::StackOverflow`] if the caller is too deep into the
///   execution stack to be suspended safely.
/// * [`SchedulerError::NotInCoroutine`] outside of a run.
///
/// # Example
///
/// ```no_run
/// use heapros::{Builder, spawn};
///
/// let runtime = Builder::new().try_build().unwrap();
/// runtime
///     .run(|| {
///         let pid = spawn(|| println!("hello from a coroutine")).unwrap();
///         println!("spawned {pid}");
///     })
///     .unwrap();
/// ```
pub fn spawn<F>(body: F) -> Result<Pid, SchedulerError>
where
    F: FnOnce() + 'static,
{
    let handover = request(|s| s.request_spawn(Box::new(body)))?;

    // Safety: the handover was issued for us, nothing is borrowed.
    unsafe { suspend(handover) };

    match context::try_with_scheduler(|s| s.take_handoff()).flatten() {
        Some(pid) => Ok(pid),
        None => fatal("spawner resumed without the pid of its child"),
    }
}

/// Suspends the calling coroutine behind every coroutine already waiting to
/// run. When nothing else is waiting, this returns right away after a full
/// save and restore of the stack.
pub fn yield_now() -> Result<(), SchedulerError> {
    let handover = request(|s| s.request_yield())?;

    // Safety: the handover was issued for us, nothing is borrowed.
    unsafe { suspend(handover) };
    Ok(())
}

/// Suspends the calling coroutine and resumes `pid` immediately.
///
/// The caller is parked, not queued: it only runs again when some coroutine
/// yields to it by pid. Yielding to oneself returns immediately.
///
/// # Errors
///
/// [`SchedulerError::UnknownCoroutine`] if `pid` is not a suspended
/// coroutine. It may have finished, or never existed.
pub fn yield_to(pid: Pid) -> Result<(), SchedulerError> {
    let Some(handover) = request(|s| s.request_resume(pid))? else {
        return Ok(());
    };

    // Safety: the handover was issued for us, nothing is borrowed.
    unsafe { suspend(handover) };
    Ok(())
}

/// Ends the whole run with `code`. [`Runtime::run`] returns
/// [`Outcome::Exited`] without resuming any other coroutine, and without
/// running the destructors of anything still on their stacks.
///
/// Outside of a run, exits the process instead.
///
/// [`Runtime::run`]: crate::runtime::Runtime::run
/// [`Outcome::Exited`]: crate::runtime::Outcome::Exited
pub fn exit(code: i32) -> ! {
    let Some(handover) = context::try_with_scheduler(|s| s.request_exit(code)).flatten() else {
        std::process::exit(code);
    };

    // Safety: the handover was issued for us, nothing is borrowed.
    unsafe { suspend(handover) };
    fatal("a coroutine that exited was resumed")
}
