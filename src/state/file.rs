use std::fs;
use std::path::{Path, PathBuf};

use super::{StateStore, SystemState, validate_network_name};
use crate::errors::StateError;

/// Name of the state document inside a network directory.
pub const STATE_FILE: &str = "state.json";

/// State store backed by one JSON document per network under a data root.
pub struct FileStateStore {
    data_dir: PathBuf,
}

impl FileStateStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding everything persisted for a network.
    pub fn network_dir(&self, network: &str) -> PathBuf {
        self.data_dir.join(network)
    }

    pub fn state_file(&self, network: &str) -> PathBuf {
        self.network_dir(network).join(STATE_FILE)
    }

    /// `network_dir`, refusing names that would resolve outside the data root.
    fn checked_dir(&self, network: &str) -> Result<PathBuf, StateError> {
        validate_network_name(network)?;
        Ok(self.network_dir(network))
    }

    /// Write `data` to `path` via a `.tmp` sibling and rename it into place.
    fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StateError> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data).map_err(|source| StateError::WriteFailed {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, path).map_err(|source| StateError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl StateStore for FileStateStore {
    fn exists(&self, network: &str) -> bool {
        validate_network_name(network).is_ok() && self.state_file(network).is_file()
    }

    fn load(&self, network: &str) -> Result<SystemState, StateError> {
        let path = self.checked_dir(network)?.join(STATE_FILE);
        if !path.exists() {
            return Ok(SystemState::empty());
        }

        let content = fs::read_to_string(&path).map_err(|source| StateError::ReadFailed {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| StateError::Corrupt { path, source })
    }

    fn save(&self, network: &str, state: &SystemState) -> Result<(), StateError> {
        let dir = self.checked_dir(network)?;
        fs::create_dir_all(&dir).map_err(|source| StateError::WriteFailed {
            path: dir.clone(),
            source,
        })?;

        let json = serde_json::to_string_pretty(state).map_err(StateError::Serialize)?;
        Self::atomic_write(&dir.join(STATE_FILE), json.as_bytes())?;

        tracing::debug!(
            network,
            latest_migration = state.latest_migration(),
            "state checkpointed"
        );
        Ok(())
    }

    fn reset(&self, network: &str) -> Result<(), StateError> {
        let dir = self.checked_dir(network)?;
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|source| StateError::ResetFailed { path: dir, source })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{NO_MIGRATION, NetworkState};
    use serde_json::json;
    use tempfile::tempdir;

    fn make_store() -> (FileStateStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        (FileStateStore::new(dir.path().join("data")), dir)
    }

    #[test]
    fn test_load_missing_returns_zero_state_without_persisting() {
        let (store, _dir) = make_store();
        let state = store.load("hardhat").unwrap();
        assert_eq!(state.latest_migration(), NO_MIGRATION);
        assert!(!store.exists("hardhat"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let (store, _dir) = make_store();
        let mut network = NetworkState::new();
        network.insert("proxyAdmin".into(), json!("0x01"));
        store.save("hardhat", &SystemState::new(2, network)).unwrap();

        let loaded = store.load("hardhat").unwrap();
        assert_eq!(loaded.latest_migration(), 2);
        assert_eq!(loaded.network_state["proxyAdmin"], json!("0x01"));
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let (store, _dir) = make_store();
        store.save("hardhat", &SystemState::empty()).unwrap();
        let entries: Vec<_> = fs::read_dir(store.network_dir("hardhat"))
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries, vec![STATE_FILE.to_string()]);
    }

    #[test]
    fn test_document_uses_camel_case_field_names() {
        let (store, _dir) = make_store();
        store.save("hardhat", &SystemState::empty()).unwrap();
        let raw = fs::read_to_string(store.state_file("hardhat")).unwrap();
        assert!(raw.contains("\"migrationState\""));
        assert!(raw.contains("\"latestMigration\": -1"));
        assert!(raw.contains("\"networkState\""));
    }

    #[test]
    fn test_ensure_initialized_is_idempotent() {
        let (store, _dir) = make_store();
        store.ensure_initialized("hardhat").unwrap();
        store
            .save("hardhat", &SystemState::new(3, NetworkState::new()))
            .unwrap();
        store.ensure_initialized("hardhat").unwrap();
        assert_eq!(store.load("hardhat").unwrap().latest_migration(), 3);
    }

    #[test]
    fn test_reset_removes_network_directory() {
        let (store, _dir) = make_store();
        store.save("hardhat", &SystemState::empty()).unwrap();
        fs::create_dir_all(store.network_dir("hardhat").join("runs")).unwrap();

        store.reset("hardhat").unwrap();
        assert!(!store.network_dir("hardhat").exists());
        // resetting again is a no-op
        store.reset("hardhat").unwrap();
    }

    #[test]
    fn test_network_names_cannot_escape_the_data_root() {
        let (store, dir) = make_store();
        let victim = dir.path().join("victim");
        fs::create_dir_all(&victim).unwrap();
        fs::write(victim.join("keep.txt"), "keep").unwrap();

        let err = store.reset("../victim").unwrap_err();
        assert!(matches!(err, StateError::InvalidNetwork { .. }));
        let absolute = victim.to_string_lossy().to_string();
        assert!(store.reset(&absolute).is_err());
        assert!(victim.join("keep.txt").is_file());

        assert!(store.save("../victim", &SystemState::empty()).is_err());
        assert!(store.load("..").is_err());
        assert!(!store.exists("../victim"));
        assert!(!victim.join(STATE_FILE).exists());
    }

    #[test]
    fn test_corrupt_document_is_reported() {
        let (store, _dir) = make_store();
        fs::create_dir_all(store.network_dir("hardhat")).unwrap();
        fs::write(store.state_file("hardhat"), "{ not json").unwrap();
        let err = store.load("hardhat").unwrap_err();
        assert!(matches!(err, StateError::Corrupt { .. }));
    }

    #[test]
    fn test_seed_from_fork_requires_source_document() {
        let (store, _dir) = make_store();
        assert!(store.seed_from_fork("mainnet").is_err());

        store
            .save("mainnet", &SystemState::new(5, NetworkState::new()))
            .unwrap();
        assert_eq!(store.seed_from_fork("mainnet").unwrap().latest_migration(), 5);
    }

    #[test]
    fn test_recovery_after_restart() {
        let dir = tempdir().unwrap();
        {
            let store = FileStateStore::new(dir.path());
            store
                .save("goerli", &SystemState::new(20, NetworkState::new()))
                .unwrap();
        }
        {
            let store = FileStateStore::new(dir.path());
            assert_eq!(store.load("goerli").unwrap().latest_migration(), 20);
        }
    }
}
