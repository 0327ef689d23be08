//! Coroutine identity and the bookkeeping kept for suspended coroutines.

// Public API
pub mod id;
pub use self::id::{Pid, ROOT_PID, id, try_id};

// Re-exports
pub(crate) use self::id::PidAllocator;

mod snapshot;
pub(crate) use self::snapshot::StackSnapshot;

mod table;
pub(crate) use self::table::{CoroutineEntry, CoroutineTable};
