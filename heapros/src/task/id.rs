use crate::context;
use std::{fmt, num::NonZeroU64};

/// Identifies a coroutine within one [`Runtime::run`].
///
/// Pids are handed out in spawn order starting at 1 and are never reused
/// during a run, even after the coroutine finished. There is no pid 0: the
/// scheduler itself is represented by the absence of a pid, see [`try_id()`].
///
/// [`Runtime::run`]: crate::runtime::Runtime::run
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct Pid(pub(crate) NonZeroU64);

/// Pid of the coroutine handed to [`Runtime::run`].
///
/// [`Runtime::run`]: crate::runtime::Runtime::run
pub const ROOT_PID: Pid = Pid(NonZeroU64::MIN);

/// Returns the [`Pid`] of the currently running coroutine.
///
/// # Panics
///
/// This function panics if called from outside a coroutine. For a version
/// that doesn't panic, see [`try_id()`].
#[track_caller]
pub fn id() -> Pid {
    try_id().expect("Can't get a pid when not inside a coroutine")
}

/// Returns the [`Pid`] of the currently running coroutine, or `None` if called
/// outside of a coroutine.
pub fn try_id() -> Option<Pid> {
    context::try_with_scheduler(|s| s.current()).flatten()
}

impl Pid {
    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Monotonic pid source, one per run.
#[derive(Debug)]
pub(crate) struct PidAllocator {
    next: NonZeroU64,
}

impl PidAllocator {
    pub(crate) fn new() -> Self {
        Self {
            next: ROOT_PID.0,
        }
    }

    pub(crate) fn next(&mut self) -> Pid {
        let pid = Pid(self.next);

        // A run would need to spawn a billion coroutines per second for
        // centuries to get here.
        let Some(next) = self.next.checked_add(1) else {
            Self::exhausted();
        };
        self.next = next;

        pid
    }

    #[cold]
    fn exhausted() -> ! {
        panic!("failed to generate unique pid: bitspace exhausted")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pids_start_at_root_and_increase() {
        let mut pids = PidAllocator::new();

        let first = pids.next();
        assert_eq!(first, ROOT_PID);
        assert_eq!(first.as_u64(), 1);

        let rest = (0..10).map(|_| pids.next()).collect::<Vec<_>>();
        assert!(rest.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(rest.last().map(Pid::as_u64), Some(11));
    }

    #[test]
    fn test_no_pid_outside_a_coroutine() {
        assert_eq!(try_id(), None);
    }
}
