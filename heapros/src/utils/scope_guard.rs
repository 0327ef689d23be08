use std::marker::PhantomData;

/// Runs a closure when it goes out of scope, whether the scope is left by a
/// normal return, an early `?` or a panic.
pub(crate) struct ScopeGuard<'a, F: FnOnce()> {
    // Taken on drop so the closure runs at most once.
    closure: Option<F>,

    _p: PhantomData<&'a ()>,
}

impl<'a, F: FnOnce()> ScopeGuard<'a, F> {
    /// Creates an armed guard.
    ///
    /// ```ignore
    /// let _guard = ScopeGuard::new(|| CONTEXT.with(|ctx| ctx.borrow_mut().take()));
    /// run_coroutines(); // context slot cleared afterwards, even on panic
    /// ```
    pub(crate) fn new(closure: F) -> Self {
        ScopeGuard {
            closure: Some(closure),
            _p: PhantomData,
        }
    }
}

impl<'a, F: FnOnce()> Drop for ScopeGuard<'a, F> {
    fn drop(&mut self) {
        if let Some(closure) = self.closure.take() {
            closure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_guard_runs_once_on_drop() {
        let hits = Cell::new(0);
        {
            let _guard = ScopeGuard::new(|| hits.set(hits.get() + 1));
            assert_eq!(hits.get(), 0);
        }
        assert_eq!(hits.get(), 1);
    }
}
