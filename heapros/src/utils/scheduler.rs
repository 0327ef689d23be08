#![allow(unused)]

use crate::task::Pid;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Method {
    Launch,
    Resume,
    Suspend,
    Release,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Launch { pid: Pid },
    Resume { pid: Pid, snapshot_len: usize },
    Suspend { pid: Pid, snapshot_len: usize },
    Release { pid: Pid },
}

impl Call {
    pub(crate) fn pid(&self) -> Pid {
        match self {
            Call::Launch { pid }
            | Call::Resume { pid, .. }
            | Call::Suspend { pid, .. }
            | Call::Release { pid } => *pid,
        }
    }
}

/// Records every scheduler decision so tests can assert on ordering. Calls
/// are also kept in one global sequence, `history`.
#[derive(Debug, Clone)]
pub(crate) struct Tracker {
    calls: Arc<DashMap<Method, Vec<Call>>>,
    history: Arc<DashMap<usize, Call>>,
}

impl Tracker {
    pub(crate) fn new() -> Self {
        let map = DashMap::new();
        map.insert(Method::Launch, Vec::new());
        map.insert(Method::Resume, Vec::new());
        map.insert(Method::Suspend, Vec::new());
        map.insert(Method::Release, Vec::new());

        Self {
            calls: Arc::new(map),
            history: Arc::new(DashMap::new()),
        }
    }

    pub(crate) fn record(&self, method: Method, call: Call) {
        self.history.insert(self.history.len(), call.clone());
        self.calls
            .get_mut(&method)
            .expect("method not found")
            .push(call)
    }

    pub(crate) fn get_calls(&self, method: &Method) -> Vec<Call> {
        self.calls
            .get(method)
            .expect("method not found")
            .value()
            .clone()
    }

    pub(crate) fn num_calls(&self, method: &Method) -> usize {
        self.calls.get(method).map_or(0, |calls| calls.len())
    }

    /// Every recorded call, oldest first.
    pub(crate) fn history(&self) -> Vec<Call> {
        (0..self.history.len())
            .filter_map(|i| self.history.get(&i).map(|call| call.value().clone()))
            .collect()
    }
}
