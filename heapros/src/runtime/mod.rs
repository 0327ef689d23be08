use crate::task::Pid;
use std::any::Any;
use std::fmt;

// Public API
pub mod runtime;
pub use runtime::{Builder, Runtime};

pub mod spawn;
pub use spawn::{exit, spawn, yield_now, yield_to};

mod errors;
pub use errors::SchedulerError;

// Exports
pub(crate) use runtime::RuntimeConfig;

pub(crate) mod scheduler;
pub(crate) use scheduler::Scheduler;

#[cfg(test)]
mod tests;

/// A coroutine body, run once on the execution stack.
pub(crate) type Body = Box<dyn FnOnce() + 'static>;

/// Why control came back to the trampoline.
pub(crate) enum Signal {
    /// First entry: launch the root body.
    Start,

    /// The running coroutine suspended inside `spawn`, launch the pending body.
    Spawn,

    /// The running coroutine suspended and asked for `pid` to run next.
    Resume(Pid),

    /// The running coroutine suspended and wants to run again later.
    Yield,

    /// The body of the running coroutine returned.
    Finished,

    /// The running coroutine asked to end the run.
    Exit(i32),

    /// The body of the running coroutine panicked.
    Panicked(Box<dyn Any + Send + 'static>),
}

impl Signal {
    /// Does the coroutine that sent this signal want to be resumed later?
    pub(crate) fn suspends_sender(&self) -> bool {
        matches!(self, Signal::Spawn | Signal::Resume(_) | Signal::Yield)
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Start => f.write_str("Start"),
            Signal::Spawn => f.write_str("Spawn"),
            Signal::Resume(pid) => f.debug_tuple("Resume").field(pid).finish(),
            Signal::Yield => f.write_str("Yield"),
            Signal::Finished => f.write_str("Finished"),
            Signal::Exit(code) => f.debug_tuple("Exit").field(code).finish(),
            Signal::Panicked(_) => f.write_str("Panicked(..)"),
        }
    }
}

/// Where a suspended coroutine goes in the ready queue.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum AddMode {
    /// Back of the queue: runs after everything already waiting.
    Fifo,

    /// Front of the queue: runs next.
    Lifo,
}

/// How a call to [`Runtime::run`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Every coroutine ran to completion.
    Completed,

    /// Nothing was left to run, but these coroutines are still suspended and
    /// nobody will ever resume them. Their stacks are discarded without
    /// running destructors.
    Stalled { parked: Vec<Pid> },

    /// A coroutine called [`exit`].
    Exited(i32),
}

impl Outcome {
    /// Process exit code matching this outcome.
    pub fn code(&self) -> i32 {
        match self {
            Outcome::Completed | Outcome::Stalled { .. } => 0,
            Outcome::Exited(code) => *code,
        }
    }
}
