use crate::continuation::Continuation;
use crate::task::{Pid, StackSnapshot};
use std::collections::HashMap;

/// Everything needed to bring a suspended coroutine back.
#[derive(Debug)]
pub(crate) struct CoroutineEntry {
    pub(crate) pid: Pid,

    /// Where to jump back in.
    pub(crate) continuation: Continuation,

    /// Stack bytes to replay before jumping.
    pub(crate) snapshot: StackSnapshot,

    /// Pid produced by the spawn this coroutine is suspended in, delivered
    /// back to it on resume.
    pub(crate) handoff: Option<Pid>,
}

impl CoroutineEntry {
    pub(crate) fn new(pid: Pid, continuation: Continuation, snapshot: StackSnapshot) -> Self {
        Self {
            pid,
            continuation,
            snapshot,
            handoff: None,
        }
    }
}

/// Suspended coroutines by pid.
///
/// A coroutine only gets an entry the first time it suspends. The entry is
/// overwritten on every later suspend and removed once the coroutine
/// finishes.
#[derive(Debug, Default)]
pub(crate) struct CoroutineTable {
    entries: HashMap<Pid, CoroutineEntry>,
}

impl CoroutineTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Files a suspended coroutine, discarding its previous snapshot. Returns
    /// the replaced entry, if any.
    pub(crate) fn suspend(&mut self, entry: CoroutineEntry) -> Option<CoroutineEntry> {
        self.entries.insert(entry.pid, entry)
    }

    #[cfg(test)]
    pub(crate) fn get(&self, pid: &Pid) -> Option<&CoroutineEntry> {
        self.entries.get(pid)
    }

    pub(crate) fn get_mut(&mut self, pid: &Pid) -> Option<&mut CoroutineEntry> {
        self.entries.get_mut(pid)
    }

    pub(crate) fn contains(&self, pid: &Pid) -> bool {
        self.entries.contains_key(pid)
    }

    /// Reclaims the slot of a finished coroutine.
    pub(crate) fn release(&mut self, pid: &Pid) -> Option<CoroutineEntry> {
        self.entries.remove(pid)
    }

    /// Pids of every suspended coroutine, in ascending order.
    pub(crate) fn pids(&self) -> Vec<Pid> {
        let mut pids = self.entries.keys().copied().collect::<Vec<_>>();
        pids.sort_unstable();
        pids
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::PidAllocator;

    fn snapshot_of(bytes: &[u8]) -> StackSnapshot {
        let start = bytes.as_ptr() as usize;
        unsafe { StackSnapshot::capture(start, start + bytes.len()) }
    }

    #[test]
    fn test_suspend_replaces_previous_snapshot() {
        let mut pids = PidAllocator::new();
        let pid = pids.next();
        let mut table = CoroutineTable::new();

        let first = CoroutineEntry::new(pid, Continuation::default(), snapshot_of(&[1; 8]));
        assert!(table.suspend(first).is_none());

        let second = CoroutineEntry::new(pid, Continuation::default(), snapshot_of(&[2; 16]));
        let replaced = table.suspend(second).expect("first entry was filed");

        assert_eq!(replaced.snapshot.as_bytes(), &[1; 8]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&pid).unwrap().snapshot.as_bytes(), &[2; 16]);
    }

    #[test]
    fn test_entries_are_isolated() {
        let mut pids = PidAllocator::new();
        let (a, b) = (pids.next(), pids.next());
        let mut table = CoroutineTable::new();

        table.suspend(CoroutineEntry::new(a, Continuation::default(), snapshot_of(&[0xa; 4])));
        table.suspend(CoroutineEntry::new(b, Continuation::default(), snapshot_of(&[0xb; 4])));
        table.suspend(CoroutineEntry::new(a, Continuation::default(), snapshot_of(&[0xc; 4])));
        table.get_mut(&a).unwrap().handoff = Some(b);

        let entry_b = table.get(&b).unwrap();
        assert_eq!(entry_b.snapshot.as_bytes(), &[0xb; 4]);
        assert_eq!(entry_b.handoff, None);
        assert_eq!(table.pids(), vec![a, b]);
    }

    #[test]
    fn test_release_reclaims_slot() {
        let mut pids = PidAllocator::new();
        let pid = pids.next();
        let mut table = CoroutineTable::new();

        table.suspend(CoroutineEntry::new(pid, Continuation::default(), snapshot_of(&[3; 4])));
        assert!(table.contains(&pid));

        assert!(table.release(&pid).is_some());
        assert!(table.is_empty());
        assert!(table.release(&pid).is_none());
    }
}
