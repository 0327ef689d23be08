use crate::context;
use crate::runtime::{Body, Outcome, Scheduler};
use anyhow::{Result, anyhow};
use std::convert::TryFrom;
use std::rc::Rc;

/// Default size of the execution stack shared by all coroutines.
const STACK_SIZE: usize = 256 * 1024;

/// Smallest execution stack we accept. Anything below leaves almost nothing
/// once the suspend path took its share.
const MIN_STACK_SIZE: usize = 16 * 1024;

/// Default bound on live coroutines.
const MAX_COROUTINES: usize = 100;

/// Default number of bytes below a coroutine's stack pointer that are saved
/// along with its frames.
const GUARD_MARGIN: usize = 0x100;

#[derive(Debug, Clone)]
pub struct Builder {
    /// Size in bytes of the execution stack every coroutine runs on. Each
    /// coroutine gets the whole of it while it is live.
    stack_size: usize,

    /// Maximum number of coroutines alive at once, counting the running one
    /// and every suspended one. Spawning past it fails with
    /// `SchedulerError::CapacityExceeded`.
    max_coroutines: usize,

    /// Extra bytes below the saved stack pointer included in every snapshot.
    guard_margin: usize,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// Returns a new builder with default settings.
    ///
    /// Configuration methods can be chained on the return value.
    pub fn new() -> Builder {
        Self {
            stack_size: STACK_SIZE,
            max_coroutines: MAX_COROUTINES,
            guard_margin: GUARD_MARGIN,
        }
    }

    /// Sets the size in bytes of the execution stack.
    ///
    /// The deepest point any coroutine reaches must fit in it. Suspending only
    /// copies the part in use, so a large stack costs address space rather
    /// than copying time.
    ///
    /// The default is 256 KiB.
    #[track_caller]
    pub fn stack_size(mut self, val: usize) -> Self {
        assert!(val.is_power_of_two(), "stack_size must be a power of two");
        assert!(
            val >= MIN_STACK_SIZE,
            "stack_size must be at least {} bytes",
            MIN_STACK_SIZE
        );
        self.stack_size = val;
        self
    }

    /// Sets the maximum number of live coroutines.
    ///
    /// The default is 100.
    #[track_caller]
    pub fn max_coroutines(mut self, val: usize) -> Self {
        assert!(val > 0, "max_coroutines must be greater than 0");
        self.max_coroutines = val;
        self
    }

    /// Sets how many bytes below the saved stack pointer every snapshot
    /// covers.
    ///
    /// The default is 256 bytes.
    pub fn guard_margin(mut self, val: usize) -> Self {
        self.guard_margin = val;
        self
    }

    /// Creates the configured `Runtime`.
    pub fn try_build(self) -> Result<Runtime> {
        let cfg = RuntimeConfig::try_from(self)?;
        let scheduler = Scheduler::try_new(cfg)?;

        Ok(Runtime {
            scheduler: Rc::new(scheduler),
        })
    }
}

/// Owns the scheduler and its execution stack.
///
/// A runtime is tied to the thread that built it. It can [`run`] any number
/// of times, one after the other; each run starts numbering coroutines at 1.
///
/// [`run`]: Runtime::run
#[derive(Debug)]
pub struct Runtime {
    scheduler: Rc<Scheduler>,
}

impl Runtime {
    /// Runs `body` as the root coroutine and drives everything it spawns.
    ///
    /// Returns once no coroutine is runnable or one of them called
    /// [`exit`]. A panic inside any coroutine ends the run and resumes on the
    /// caller.
    ///
    /// Fails if a run is already in progress on this thread.
    ///
    /// [`exit`]: crate::runtime::exit
    pub fn run<F>(&self, body: F) -> Result<Outcome>
    where
        F: FnOnce() + 'static,
    {
        let _guard = context::enter(self.scheduler.clone())?;
        let _span = tracing::debug_span!("heapros::run").entered();

        let root: Body = Box::new(body);
        Ok(self.scheduler.run(root))
    }
}

// Test-only helpers
#[cfg(test)]
impl Runtime {
    pub(crate) fn expect_scheduler(&self) -> Rc<Scheduler> {
        self.scheduler.clone()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeConfig {
    pub(crate) stack_size: usize,
    pub(crate) max_coroutines: usize,
    pub(crate) guard_margin: usize,
}

impl RuntimeConfig {
    fn validate(&self) -> Result<()> {
        if self.guard_margin >= self.stack_size / 4 {
            return Err(anyhow!(
                "guard_margin ({}) must be less than a quarter of stack_size ({})",
                self.guard_margin,
                self.stack_size
            ));
        }

        Ok(())
    }
}

impl TryFrom<Builder> for RuntimeConfig {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> Result<Self, Self::Error> {
        let cfg = RuntimeConfig {
            stack_size: builder.stack_size,
            max_coroutines: builder.max_coroutines,
            guard_margin: builder.guard_margin,
        };

        cfg.validate()?;

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    assert_impl_all!(RuntimeConfig: Send, Sync, Clone);
    assert_not_impl_any!(Runtime: Send, Sync);

    #[test]
    fn test_default_config() -> Result<()> {
        let cfg = RuntimeConfig::try_from(Builder::new())?;

        assert_eq!(cfg.stack_size, STACK_SIZE);
        assert_eq!(cfg.max_coroutines, MAX_COROUTINES);
        assert_eq!(cfg.guard_margin, GUARD_MARGIN);
        Ok(())
    }

    #[test]
    fn test_guard_margin_must_fit_in_stack() {
        let builder = Builder::new().stack_size(MIN_STACK_SIZE).guard_margin(MIN_STACK_SIZE);
        assert!(RuntimeConfig::try_from(builder).is_err());
    }

    #[test]
    #[should_panic(expected = "stack_size must be a power of two")]
    fn test_stack_size_power_of_two() {
        let _ = Builder::new().stack_size(100_000);
    }

    #[test]
    #[should_panic(expected = "max_coroutines must be greater than 0")]
    fn test_max_coroutines_non_zero() {
        let _ = Builder::new().max_coroutines(0);
    }
}
