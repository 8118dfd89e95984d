use std::collections::HashMap;
use std::sync::Mutex;

use super::{StateStore, SystemState};
use crate::errors::StateError;

/// In-process state store. Keeps every saved document in order, which makes the
/// checkpoint sequence of a run observable.
#[derive(Default)]
pub struct MemoryStateStore {
    documents: Mutex<HashMap<String, SystemState>>,
    history: Mutex<Vec<(String, SystemState)>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a document without recording it as a save.
    pub fn preload(&self, network: &str, state: SystemState) -> Result<(), StateError> {
        self.documents
            .lock()
            .map_err(|_| Self::poisoned())?
            .insert(network.to_string(), state);
        Ok(())
    }

    /// Every `save` call so far, oldest first.
    pub fn saves(&self) -> Vec<(String, SystemState)> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    /// `latestMigration` of each save for one network, oldest first.
    pub fn checkpoint_sequence(&self, network: &str) -> Vec<i64> {
        self.saves()
            .into_iter()
            .filter(|(n, _)| n == network)
            .map(|(_, s)| s.latest_migration())
            .collect()
    }

    fn poisoned() -> StateError {
        StateError::WriteFailed {
            path: "<memory>".into(),
            source: std::io::Error::other("state store lock poisoned"),
        }
    }
}

impl StateStore for MemoryStateStore {
    fn exists(&self, network: &str) -> bool {
        self.documents
            .lock()
            .map(|d| d.contains_key(network))
            .unwrap_or(false)
    }

    fn load(&self, network: &str) -> Result<SystemState, StateError> {
        let documents = self.documents.lock().map_err(|_| Self::poisoned())?;
        Ok(documents.get(network).cloned().unwrap_or_default())
    }

    fn save(&self, network: &str, state: &SystemState) -> Result<(), StateError> {
        self.documents
            .lock()
            .map_err(|_| Self::poisoned())?
            .insert(network.to_string(), state.clone());
        self.history
            .lock()
            .map_err(|_| Self::poisoned())?
            .push((network.to_string(), state.clone()));
        Ok(())
    }

    fn reset(&self, network: &str) -> Result<(), StateError> {
        self.documents
            .lock()
            .map_err(|_| Self::poisoned())?
            .remove(network);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::NetworkState;

    #[test]
    fn test_checkpoint_sequence_tracks_saves_per_network() {
        let store = MemoryStateStore::new();
        store.save("a", &SystemState::new(1, NetworkState::new())).unwrap();
        store.save("b", &SystemState::new(5, NetworkState::new())).unwrap();
        store.save("a", &SystemState::new(2, NetworkState::new())).unwrap();

        assert_eq!(store.checkpoint_sequence("a"), vec![1, 2]);
        assert_eq!(store.checkpoint_sequence("b"), vec![5]);
        assert_eq!(store.saves().len(), 3);
    }

    #[test]
    fn test_reset_forgets_document_but_keeps_history() {
        let store = MemoryStateStore::new();
        store.save("a", &SystemState::new(1, NetworkState::new())).unwrap();
        store.reset("a").unwrap();
        assert!(!store.exists("a"));
        assert_eq!(store.load("a").unwrap(), SystemState::empty());
        assert_eq!(store.saves().len(), 1);
    }

    #[test]
    fn test_preload_is_not_a_save() {
        let store = MemoryStateStore::new();
        store.preload("a", SystemState::new(3, NetworkState::new())).unwrap();
        assert!(store.exists("a"));
        assert_eq!(store.load("a").unwrap().latest_migration(), 3);
        assert!(store.saves().is_empty());
    }
}
