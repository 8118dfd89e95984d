use crate::state::SystemState;

/// Snapshots of the state observed before each migration of a run.
///
/// Entry `i` is the state `pending[i]` started from, so it is both the "previous" state
/// handed to that unit's health check and the state a rollback of that unit restores.
/// Append-only; lives for one run and is never persisted.
#[derive(Debug, Clone, Default)]
pub struct RunLedger {
    entries: Vec<SystemState>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a snapshot and return its index.
    pub fn push(&mut self, state: SystemState) -> usize {
        self.entries.push(state);
        self.entries.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&SystemState> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Indices from `from` down to 0, the order a rollback visits them in.
    pub fn rollback_order(&self, from: usize) -> impl Iterator<Item = usize> + use<> {
        let start = from.min(self.entries.len().saturating_sub(1));
        let empty = self.entries.is_empty();
        (0..=start).rev().filter(move |_| !empty)
    }
}

impl std::ops::Index<usize> for RunLedger {
    type Output = SystemState;

    fn index(&self, index: usize) -> &SystemState {
        &self.entries[index]
    }
}
