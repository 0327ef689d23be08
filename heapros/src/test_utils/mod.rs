use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;

// Exports
mod context;
pub(crate) use context::init_runtime_and_scheduler;

/// Ordered log shared between coroutines of one run. Cloning shares the log.
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, entry: impl Display) {
        self.0.borrow_mut().push(entry.to_string());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}
