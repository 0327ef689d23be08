use anyhow::{Result, anyhow};
use std::io;
use std::ptr::NonNull;

/// Bytes kept free at the low end of the execution stack for the suspend
/// path itself: the bookkeeping calls made by `spawn`/`yield` between the
/// depth check and the context switch.
pub(crate) const SAFETY_MARGIN: usize = 0x1000;

/// The single stack every coroutine runs on.
///
/// Only one coroutine is live on it at a time. Suspended coroutines have
/// their portion copied out to a [`StackSnapshot`] and copied back in before
/// they resume, always at the same addresses.
///
/// Layout, high addresses first:
///
/// ```text
/// floor  ─┐  top of the mapping, where every coroutine starts
///         │  live coroutine frames grow downwards
/// limit  ─┤  lowest usable byte
///         │  guard page (PROT_NONE)
/// base   ─┘
/// ```
///
/// [`StackSnapshot`]: crate::task::StackSnapshot
#[derive(Debug)]
pub(crate) struct ExecStack {
    base: NonNull<libc::c_void>,
    len: usize,
    guard: usize,
}

impl ExecStack {
    /// Maps `size` usable bytes plus one guard page.
    pub(crate) fn try_new(size: usize) -> Result<Self> {
        let guard = page_size()?;
        let len = size
            .checked_add(guard)
            .ok_or_else(|| anyhow!("stack size {} overflows with guard page", size))?;

        // Safety: anonymous private mapping, no file descriptor involved.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE | libc::MAP_STACK,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(anyhow!(
                "failed to map {} byte execution stack: {}",
                len,
                io::Error::last_os_error()
            ));
        }

        // Safety: mmap never returns null on success for a non-fixed mapping.
        let base = unsafe { NonNull::new_unchecked(ptr) };
        let stack = Self { base, len, guard };

        // Safety: the guard page is the first page of our own mapping.
        if unsafe { libc::mprotect(ptr, guard, libc::PROT_NONE) } != 0 {
            return Err(anyhow!(
                "failed to protect execution stack guard page: {}",
                io::Error::last_os_error()
            ));
        }

        Ok(stack)
    }

    /// Top of the stack. Every coroutine is launched here and every snapshot
    /// ends here.
    pub(crate) fn floor(&self) -> usize {
        (self.base.as_ptr() as usize + self.len) & !0xf
    }

    /// Lowest usable address, right above the guard page.
    pub(crate) fn limit(&self) -> usize {
        self.base.as_ptr() as usize + self.guard
    }

    /// Number of bytes a coroutine may use.
    pub(crate) fn usable(&self) -> usize {
        self.floor() - self.limit()
    }

    pub(crate) fn contains(&self, addr: usize) -> bool {
        (self.limit()..=self.floor()).contains(&addr)
    }

    /// Bytes in use by a coroutine whose stack pointer is `sp`.
    pub(crate) fn depth(&self, sp: usize) -> usize {
        debug_assert!(self.contains(sp), "sp {:#x} outside execution stack", sp);
        self.floor() - sp
    }

    /// Can a coroutine at `sp` still afford `reserve` bytes below it?
    pub(crate) fn has_headroom(&self, sp: usize, reserve: usize) -> bool {
        self.contains(sp) && sp - self.limit() >= reserve
    }
}

impl Drop for ExecStack {
    fn drop(&mut self) {
        // Safety: unmaps exactly what `try_new` mapped.
        unsafe {
            libc::munmap(self.base.as_ptr(), self.len);
        }
    }
}

fn page_size() -> Result<usize> {
    // Safety: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        return Err(anyhow!("sysconf(_SC_PAGESIZE) failed: {}", io::Error::last_os_error()));
    }

    Ok(size as usize)
}

/// Approximate stack pointer of the caller.
#[inline(always)]
pub(crate) fn current_sp() -> usize {
    let marker = 0u8;
    std::hint::black_box(&marker) as *const u8 as usize
}
