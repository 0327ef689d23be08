use crate::task::Pid;

/// Recoverable failures of the coroutine primitives.
///
/// These are usage errors: the calling coroutine keeps running and can decide
/// what to do. Internal inconsistencies of the scheduler are not reported
/// here, they abort the process.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("coroutine table is full ({capacity} live coroutines)")]
    CapacityExceeded { capacity: usize },

    #[error("coroutine is {used} bytes deep, too close to the end of the {usable} byte stack")]
    StackOverflow { used: usize, usable: usize },

    #[error("not running inside a coroutine")]
    NotInCoroutine,

    #[error("no suspended coroutine with pid {0}")]
    UnknownCoroutine(Pid),
}
