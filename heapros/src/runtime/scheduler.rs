use crate::context::stack::current_sp;
use crate::context::{self, ExecStack, SAFETY_MARGIN};
use crate::continuation::{self, Continuation};
use crate::runtime::{AddMode, Body, Outcome, RuntimeConfig, SchedulerError, Signal};
use crate::task::{CoroutineEntry, CoroutineTable, Pid, PidAllocator, StackSnapshot};
#[allow(unused)]
use crate::utils::scheduler::{Call, Method, Tracker};
use anyhow::Result;
use std::cell::{RefCell, UnsafeCell};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// The two continuation slots a coroutine hands to `continuation::switch`
/// when it gives control back: where to save itself, where to jump.
pub(crate) type Handover = (*mut Continuation, *const Continuation);

/// What the trampoline does after handling a signal.
#[derive(Debug)]
enum Next {
    Launch(Pid),
    Resume(Pid),
    Done(Outcome),
}

struct State {
    /// Coroutine live on the execution stack, `None` while the trampoline runs.
    current: Option<Pid>,

    /// Set by a coroutine right before it switches back to the trampoline.
    signal: Option<Signal>,

    /// Body waiting to be launched.
    launch: Option<Body>,

    /// Pid to deliver to the coroutine being resumed, see `CoroutineEntry`.
    handoff: Option<Pid>,

    table: CoroutineTable,

    /// Suspended coroutines that asked to run again, front runs next.
    ready: VecDeque<Pid>,

    pids: PidAllocator,

    /// Launched and not yet finished.
    live: usize,
}

impl State {
    fn new() -> Self {
        Self {
            current: None,
            signal: None,
            launch: None,
            handoff: None,
            table: CoroutineTable::new(),
            ready: VecDeque::new(),
            pids: PidAllocator::new(),
            live: 0,
        }
    }

    fn expect_current(&self) -> Pid {
        match self.current {
            Some(pid) => pid,
            None => fatal("signal received while no coroutine was running"),
        }
    }

    fn enqueue(&mut self, pid: Pid, mode: AddMode) {
        match mode {
            AddMode::Fifo => self.ready.push_back(pid),
            AddMode::Lifo => self.ready.push_front(pid),
        }
    }

    fn next_ready(&mut self) -> Next {
        self.current = None;

        if let Some(pid) = self.ready.pop_front() {
            Next::Resume(pid)
        } else if self.table.is_empty() {
            Next::Done(Outcome::Completed)
        } else {
            Next::Done(Outcome::Stalled {
                parked: self.table.pids(),
            })
        }
    }
}

/// Trampoline plus everything it owns.
///
/// The trampoline runs on the native stack of the thread calling
/// [`Runtime::run`]. Coroutines run on `stack`, one at a time, each starting
/// at the stack floor. Switching away from a coroutine files its registers
/// and a copy of its stack bytes in the table. Switching back replays the
/// bytes, then jumps.
///
/// [`Runtime::run`]: crate::runtime::Runtime::run
pub(crate) struct Scheduler {
    pub(crate) cfg: RuntimeConfig,

    stack: ExecStack,

    /// Resume point of the trampoline. Every coroutine switches back here.
    home: UnsafeCell<Continuation>,

    /// Resume point of the coroutine that is switching away.
    outgoing: UnsafeCell<Continuation>,

    state: RefCell<State>,

    #[cfg(test)]
    pub(crate) tracker: Tracker,
}

impl Scheduler {
    pub(crate) fn try_new(cfg: RuntimeConfig) -> Result<Self> {
        let stack = ExecStack::try_new(cfg.stack_size)?;

        Ok(Self {
            cfg,
            stack,
            home: UnsafeCell::new(Continuation::default()),
            outgoing: UnsafeCell::new(Continuation::default()),
            state: RefCell::new(State::new()),

            #[cfg(test)]
            tracker: Tracker::new(),
        })
    }

    // Small price to pay to get introspection on all scheduler calls during
    // testing. No op in release builds.
    #[allow(unused)]
    #[inline(always)]
    fn track(&self, method: Method, call: Call) {
        #[cfg(test)]
        self.tracker.record(method, call);
    }

    /// Drives `root` and everything it spawns until nothing is runnable.
    pub(crate) fn run(&self, root: Body) -> Outcome {
        {
            let mut state = self.state.borrow_mut();
            *state = State::new();
            state.launch = Some(root);
        }

        tracing::debug!(
            floor = format_args!("{:#x}", self.stack.floor()),
            usable = self.stack.usable(),
            "starting the scheduler"
        );

        let mut signal = Signal::Start;
        loop {
            let next = match signal {
                Signal::Panicked(payload) => {
                    self.reset();
                    panic::resume_unwind(payload);
                }
                signal => self.dispatch(signal),
            };

            match next {
                Next::Launch(pid) => self.launch(pid),
                Next::Resume(pid) => self.resume(pid),
                Next::Done(outcome) => {
                    self.reset();
                    tracing::debug!(?outcome, "scheduler finished");
                    return outcome;
                }
            }

            // Only reached once a coroutine switched back to `home`.
            signal = self.receive();
        }
    }

    fn dispatch(&self, signal: Signal) -> Next {
        let mut state = self.state.borrow_mut();

        match signal {
            Signal::Start => Next::Launch(state.pids.next()),
            Signal::Spawn => {
                let caller = state.expect_current();
                let pid = state.pids.next();

                match state.table.get_mut(&caller) {
                    Some(entry) => entry.handoff = Some(pid),
                    None => fatal("spawning coroutine was not filed"),
                }

                // The spawner picks up right after the child first stops.
                state.enqueue(caller, AddMode::Lifo);
                Next::Launch(pid)
            }
            Signal::Resume(pid) => {
                state.ready.retain(|queued| *queued != pid);
                Next::Resume(pid)
            }
            Signal::Yield => {
                let caller = state.expect_current();
                state.enqueue(caller, AddMode::Fifo);
                state.next_ready()
            }
            Signal::Finished => {
                let pid = state.expect_current();
                state.table.release(&pid);
                state.live -= 1;

                tracing::debug!(%pid, "coroutine finished");
                self.track(Method::Release, Call::Release { pid });
                state.next_ready()
            }
            Signal::Exit(code) => {
                tracing::debug!(pid = ?state.current, code, "coroutine requested exit");
                Next::Done(Outcome::Exited(code))
            }
            Signal::Panicked(_) => fatal("panic signal reached dispatch"),
        }
    }

    /// Picks up the signal left by the coroutine that just switched back, and
    /// files it in the table if it expects to be resumed.
    fn receive(&self) -> Signal {
        let signal = self.state.borrow_mut().signal.take();
        let Some(signal) = signal else {
            fatal("trampoline re-entered without a signal");
        };

        if signal.suspends_sender() {
            self.file_outgoing();
        }

        signal
    }

    fn file_outgoing(&self) {
        // Safety: the coroutine wrote its resume point here as part of the
        // switch that brought us back, nothing else touches this slot.
        let continuation = unsafe { *self.outgoing.get() };

        let sp = continuation.stack_pointer();
        if !self.stack.contains(sp) {
            fatal("suspended coroutine is not on the execution stack");
        }

        let floor = self.stack.floor();
        let start = sp.saturating_sub(self.cfg.guard_margin).max(self.stack.limit());

        // Safety: `[start, floor)` lies inside the execution stack.
        let snapshot = unsafe { StackSnapshot::capture(start, floor) };

        let mut state = self.state.borrow_mut();
        let pid = state.expect_current();

        tracing::trace!(
            %pid,
            addr = format_args!("{:#x}", snapshot.addr()),
            depth = self.stack.depth(sp),
            bytes = snapshot.len(),
            "captured stack snapshot"
        );
        self.track(
            Method::Suspend,
            Call::Suspend {
                pid,
                snapshot_len: snapshot.len(),
            },
        );

        state.table.suspend(CoroutineEntry::new(pid, continuation, snapshot));
    }

    fn launch(&self, pid: Pid) {
        {
            let mut state = self.state.borrow_mut();
            if state.launch.is_none() {
                fatal("nothing to launch");
            }
            state.current = Some(pid);
            state.live += 1;
        }

        tracing::debug!(%pid, "about to run coroutine");
        self.track(Method::Launch, Call::Launch { pid });

        // Safety: the floor is the aligned top of our own stack and every
        // other coroutine has been filed, so nothing live sits on it.
        let target = unsafe { Continuation::launch(self.stack.floor(), coroutine_entry) };

        // Safety: `home` outlives the run, `target` was just built.
        unsafe { continuation::switch(self.home.get(), &target) };
    }

    fn resume(&self, pid: Pid) {
        let target = {
            let mut state = self.state.borrow_mut();
            let Some(entry) = state.table.get_mut(&pid) else {
                fatal("resuming a coroutine that never suspended");
            };

            let snapshot = std::mem::take(&mut entry.snapshot);
            let continuation = entry.continuation;
            let handoff = entry.handoff.take();

            state.handoff = handoff;
            state.current = Some(pid);

            tracing::debug!(%pid, bytes = snapshot.len(), "jumped back to scheduler, resuming");
            self.track(
                Method::Resume,
                Call::Resume {
                    pid,
                    snapshot_len: snapshot.len(),
                },
            );

            // Safety: the snapshot was captured from this stack and the
            // coroutine that used the region last has been filed. The
            // trampoline itself lives on the native stack, so the copy cannot
            // clobber it.
            unsafe { snapshot.restore() };

            continuation
        };

        // Safety: the stack now holds exactly the bytes `target` was
        // captured with.
        unsafe { continuation::switch(self.home.get(), &target) };
    }

    /// Drops everything left from the last run. Destructors of pending bodies
    /// run after the state borrow is released.
    fn reset(&self) {
        let stale = std::mem::replace(&mut *self.state.borrow_mut(), State::new());
        drop(stale);
    }

    // --- Coroutine side ---
    //
    // Everything below runs on the execution stack, inside a coroutine, and
    // returns the `Handover` the caller must switch with.

    pub(crate) fn current(&self) -> Option<Pid> {
        self.state.borrow().current
    }

    fn handover(&self, state: &mut State, signal: Signal) -> Handover {
        state.signal = Some(signal);
        (self.outgoing.get(), self.home.get())
    }

    fn check_headroom(&self) -> Result<(), SchedulerError> {
        let sp = current_sp();

        if self.stack.has_headroom(sp, SAFETY_MARGIN + self.cfg.guard_margin) {
            Ok(())
        } else {
            Err(SchedulerError::StackOverflow {
                used: self.stack.floor().saturating_sub(sp),
                usable: self.stack.usable(),
            })
        }
    }

    pub(crate) fn request_spawn(&self, body: Body) -> Result<Handover, SchedulerError> {
        let mut state = self.state.borrow_mut();
        if state.current.is_none() {
            return Err(SchedulerError::NotInCoroutine);
        }

        self.check_headroom()?;

        if state.live >= self.cfg.max_coroutines {
            return Err(SchedulerError::CapacityExceeded {
                capacity: self.cfg.max_coroutines,
            });
        }

        state.launch = Some(body);
        Ok(self.handover(&mut state, Signal::Spawn))
    }

    pub(crate) fn request_yield(&self) -> Result<Handover, SchedulerError> {
        let mut state = self.state.borrow_mut();
        if state.current.is_none() {
            return Err(SchedulerError::NotInCoroutine);
        }

        self.check_headroom()?;
        Ok(self.handover(&mut state, Signal::Yield))
    }

    /// `None` when `pid` is the caller: there is nothing to switch to.
    pub(crate) fn request_resume(&self, pid: Pid) -> Result<Option<Handover>, SchedulerError> {
        let mut state = self.state.borrow_mut();
        let Some(current) = state.current else {
            return Err(SchedulerError::NotInCoroutine);
        };

        if pid == current {
            return Ok(None);
        }

        if !state.table.contains(&pid) {
            return Err(SchedulerError::UnknownCoroutine(pid));
        }

        self.check_headroom()?;
        Ok(Some(self.handover(&mut state, Signal::Resume(pid))))
    }

    pub(crate) fn request_exit(&self, code: i32) -> Option<Handover> {
        let mut state = self.state.borrow_mut();
        state.current?;

        Some(self.handover(&mut state, Signal::Exit(code)))
    }

    fn finish(&self, signal: Signal) -> Handover {
        let mut state = self.state.borrow_mut();
        self.handover(&mut state, signal)
    }

    fn take_launch(&self) -> Option<Body> {
        self.state.borrow_mut().launch.take()
    }

    pub(crate) fn take_handoff(&self) -> Option<Pid> {
        self.state.borrow_mut().handoff.take()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.try_borrow();
        f.debug_struct("Scheduler")
            .field("cfg", &self.cfg)
            .field("stack", &self.stack)
            .field("current", &state.as_ref().ok().and_then(|s| s.current))
            .finish()
    }
}

/// First frame of every coroutine, sitting right below the stack floor.
extern "C" fn coroutine_entry() -> ! {
    let Some(body) = context::expect_scheduler(|s| s.take_launch()) else {
        fatal("launched a coroutine without a body");
    };

    // Unwinding must stop here: there is no frame above this one.
    let signal = match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(()) => Signal::Finished,
        Err(payload) => Signal::Panicked(payload),
    };

    let (from, to) = context::expect_scheduler(|s| s.finish(signal));

    // Safety: both slots belong to the scheduler, which outlives the run.
    unsafe { continuation::switch(from, to) };

    fatal("a finished coroutine was resumed")
}

/// Internal consistency failure. There is no way to recover a scheduler in
/// this state.
#[cold]
pub(crate) fn fatal(msg: &str) -> ! {
    tracing::error!("FATAL: scheduler error: {}", msg);
    eprintln!("FATAL: scheduler error: {}", msg);
    std::process::abort()
}
