//! Migration discovery and ordering.
//!
//! Migrations live as files named `<key>_<description>.toml` in the migrations directory.
//! The key is the leading integer (usually a timestamp); it alone decides execution order.

use glob::glob;
use std::path::{Path, PathBuf};

use crate::errors::MigrationError;

/// File extension of migration files.
pub const MIGRATION_EXTENSION: &str = "toml";

/// Separator between the ordering key and the descriptive suffix.
pub const KEY_DELIMITER: char = '_';

/// A discovered migration, before its implementation is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationDescriptor {
    /// Ordering key parsed from the file name.
    pub key: i64,
    /// File name, used for display and registry lookup.
    pub name: String,
    pub path: PathBuf,
}

impl MigrationDescriptor {
    /// Build a descriptor from a file path, parsing the key from its file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, MigrationError> {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let key = parse_key(&name)?;
        Ok(Self { key, name, path })
    }

    /// File name without extension, e.g. `4_deploy_vault`.
    pub fn stem(&self) -> &str {
        self.name
            .strip_suffix(&format!(".{}", MIGRATION_EXTENSION))
            .unwrap_or(&self.name)
    }
}

/// Parse the ordering key from a migration name: the digits before the first `_`.
pub fn parse_key(name: &str) -> Result<i64, MigrationError> {
    let malformed = || MigrationError::MalformedMigrationName {
        name: name.to_string(),
    };

    let (token, rest) = name.split_once(KEY_DELIMITER).ok_or_else(malformed)?;
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) || rest.is_empty() {
        return Err(malformed());
    }
    token.parse::<i64>().map_err(|_| malformed())
}

/// Validate and order a set of candidate migration paths.
///
/// Fails on the first malformed name, and on any two candidates sharing a key.
pub fn catalog_from_paths<I, P>(paths: I) -> Result<Vec<MigrationDescriptor>, MigrationError>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let mut descriptors = paths
        .into_iter()
        .map(MigrationDescriptor::from_path)
        .collect::<Result<Vec<_>, _>>()?;

    descriptors.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.name.cmp(&b.name)));

    if let Some(pair) = descriptors.windows(2).find(|w| w[0].key == w[1].key) {
        return Err(MigrationError::DuplicateMigrationKey {
            key: pair[0].key,
            first: pair[0].name.clone(),
            second: pair[1].name.clone(),
        });
    }

    Ok(descriptors)
}

/// Scan a migrations directory and return its migrations in ascending key order.
///
/// Hidden files and files with other extensions are ignored.
pub fn discover(migrations_dir: &Path) -> Result<Vec<MigrationDescriptor>, MigrationError> {
    if !migrations_dir.is_dir() {
        return Err(MigrationError::DiscoveryFailed {
            path: migrations_dir.to_path_buf(),
            source: anyhow::anyhow!("not a directory"),
        });
    }

    let pattern = migrations_dir
        .join(format!("*.{}", MIGRATION_EXTENSION))
        .to_string_lossy()
        .to_string();

    let entries = glob(&pattern).map_err(|e| MigrationError::DiscoveryFailed {
        path: migrations_dir.to_path_buf(),
        source: e.into(),
    })?;

    let paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .map(|n| !n.to_string_lossy().starts_with('.'))
                .unwrap_or(false)
        })
        .collect();

    let descriptors = catalog_from_paths(paths)?;
    tracing::debug!(
        dir = %migrations_dir.display(),
        count = descriptors.len(),
        "discovered migrations"
    );
    Ok(descriptors)
}

/// Migrations not yet applied, given the latest applied key, in ascending key order.
pub fn pending(all: &[MigrationDescriptor], latest_migration: i64) -> Vec<MigrationDescriptor> {
    let mut pending: Vec<MigrationDescriptor> = all
        .iter()
        .filter(|d| d.key > latest_migration)
        .cloned()
        .collect();
    // Directory listings carry no ordering guarantee.
    pending.sort_by_key(|d| d.key);
    pending
}
