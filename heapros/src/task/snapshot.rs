use std::fmt;

/// Heap copy of the stack bytes a suspended coroutine was using.
///
/// A snapshot remembers where it came from and always goes back to the same
/// addresses, so pointers into the coroutine's own frames stay valid across
/// a suspend/resume cycle.
#[derive(Default)]
pub(crate) struct StackSnapshot {
    addr: usize,
    bytes: Box<[u8]>,
}

impl StackSnapshot {
    /// Copies `[start, end)` into a fresh heap buffer.
    ///
    /// # Safety
    ///
    /// The whole range must be readable.
    pub(crate) unsafe fn capture(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "inverted snapshot range");

        // Safety: forwarded from the caller.
        let live = unsafe { std::slice::from_raw_parts(start as *const u8, end - start) };

        Self {
            addr: start,
            bytes: live.into(),
        }
    }

    /// Writes the saved bytes back where they were captured from.
    ///
    /// # Safety
    ///
    /// The original range must be writable and must not hold anything live:
    /// it gets overwritten wholesale.
    pub(crate) unsafe fn restore(&self) {
        // Safety: forwarded from the caller. The heap buffer and the stack
        // range cannot overlap.
        unsafe {
            std::ptr::copy_nonoverlapping(self.bytes.as_ptr(), self.addr as *mut u8, self.len());
        }
    }

    /// Lowest address covered by the snapshot.
    pub(crate) fn addr(&self) -> usize {
        self.addr
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    #[cfg(test)]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for StackSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackSnapshot")
            .field("addr", &format_args!("{:#x}", self.addr))
            .field("len", &self.len())
            .finish()
    }
}
