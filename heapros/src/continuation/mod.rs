//! Capture and re-entry of execution points.
//!
//! A [`Continuation`] is the register half of a suspended context: stack
//! pointer, frame pointer, callee-saved registers and the resume address.
//! The stack half lives in [`StackSnapshot`]. Together they are enough to
//! rebuild a coroutine that was switched away from.
//!
//! Everything architecture specific stays in this module. Callers only see
//! [`Continuation::launch`], [`Continuation::stack_pointer`] and [`switch`].
//!
//! [`StackSnapshot`]: crate::task::StackSnapshot

#[cfg(not(all(
    target_os = "linux",
    any(target_arch = "x86_64", target_arch = "aarch64")
)))]
compile_error!("heapros only supports x86_64 and aarch64 Linux");

#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(target_arch = "x86_64")]
use x86_64::Registers;

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
use aarch64::Registers;

/// Entry point of a freshly launched context. It runs on the execution stack
/// and must never return: there is no frame above it to return into.
pub(crate) type EntryFn = extern "C" fn() -> !;

/// One resumable execution point.
///
/// A continuation is plain data. Copying it is fine, but it only stays
/// meaningful while the stack memory it points into holds the bytes it was
/// captured with.
#[repr(transparent)]
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Continuation {
    regs: Registers,
}

impl Continuation {
    /// Builds a continuation that starts `entry` with an empty stack whose
    /// top is `floor`.
    ///
    /// # Safety
    ///
    /// `floor` must be 16-byte aligned and the top of a writable stack region
    /// with at least a few hundred bytes available below it. Nothing else may
    /// be live in that region.
    pub(crate) unsafe fn launch(floor: usize, entry: EntryFn) -> Self {
        debug_assert_eq!(floor % 16, 0, "stack floor must be 16-byte aligned");

        Self {
            // Safety: forwarded from the caller.
            regs: unsafe { Registers::launch(floor, entry) },
        }
    }

    /// Stack pointer at the moment this continuation was captured.
    pub(crate) fn stack_pointer(&self) -> usize {
        self.regs.stack_pointer()
    }
}

unsafe extern "C" {
    fn heapros_switch(from: *mut Registers, to: *const Registers);
}

/// Saves the current execution point into `from` and jumps into `to`.
///
/// Returns when some other context switches back into `from`.
///
/// # Safety
///
/// - `from` must stay valid for the duration of the call (it is written
///   before the jump and not touched afterwards).
/// - `to` must have been produced by [`Continuation::launch`] or by an
///   earlier `switch`, and the stack bytes it refers to must be exactly the
///   bytes that were there when it was captured.
/// - Callers must not hold `RefCell` borrows or other guards that the target
///   context will need: the target runs before this function returns.
#[inline(never)]
pub(crate) unsafe fn switch(from: *mut Continuation, to: *const Continuation) {
    // Safety: `Continuation` is `repr(transparent)` over `Registers`, the
    // rest is forwarded from the caller.
    unsafe { heapros_switch(from.cast::<Registers>(), to.cast::<Registers>()) }
}
