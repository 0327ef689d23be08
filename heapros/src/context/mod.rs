use crate::runtime::Scheduler;
use crate::utils::ScopeGuard;
use anyhow::{Result, anyhow};
use std::cell::RefCell;
use std::rc::Rc;
use std::thread_local;

// Exports
pub(crate) mod stack;
pub(crate) use stack::{ExecStack, SAFETY_MARGIN};

// The scheduler of the run in progress on this thread. Coroutine bodies are
// plain closures, so this slot is how `spawn` and friends find it.
thread_local! {
    static CONTEXT: RefCell<Option<Rc<Scheduler>>> = const { RefCell::new(None) };
}

/// Installs `scheduler` for the duration of a run. The slot is cleared when
/// the returned guard drops, including while unwinding.
pub(crate) fn enter(scheduler: Rc<Scheduler>) -> Result<ScopeGuard<'static, impl FnOnce()>> {
    CONTEXT.with(|ctx| -> Result<()> {
        let mut ctx = ctx.borrow_mut();
        if ctx.is_some() {
            return Err(anyhow!(
                "Cannot start a run: a runtime is already running on this thread."
            ));
        }

        *ctx = Some(scheduler);
        Ok(())
    })?;

    Ok(ScopeGuard::new(|| {
        CONTEXT.with(|ctx| ctx.borrow_mut().take());
    }))
}

fn current() -> Option<Rc<Scheduler>> {
    CONTEXT.with(|ctx| ctx.borrow().clone())
}

/// Runs `f` against the active scheduler, if any.
///
/// The scheduler handle is dropped before this returns. Callers about to
/// switch contexts must extract what they need (raw continuation pointers)
/// and not hold on to the scheduler across the switch.
pub(crate) fn try_with_scheduler<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&Scheduler) -> R,
{
    current().map(|scheduler| f(&scheduler))
}

#[track_caller]
pub(crate) fn expect_scheduler<F, R>(f: F) -> R
where
    F: FnOnce(&Scheduler) -> R,
{
    let scheduler = current().expect("Context not initialized");
    f(&scheduler)
}

#[cfg(test)]
pub(crate) fn is_active() -> bool {
    CONTEXT.with(|ctx| ctx.borrow().is_some())
}
