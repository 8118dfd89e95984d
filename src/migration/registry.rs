use std::collections::HashMap;
use std::sync::Arc;

use super::{ManifestMigration, Migration};
use crate::catalog::MigrationDescriptor;
use crate::errors::{ManifestError, MigrationError};

/// A discovered migration bound to its implementation.
#[derive(Clone)]
pub struct ResolvedMigration {
    pub descriptor: MigrationDescriptor,
    pub unit: Arc<dyn Migration>,
}

impl ResolvedMigration {
    pub fn new(descriptor: MigrationDescriptor, unit: Arc<dyn Migration>) -> Self {
        Self { descriptor, unit }
    }

    pub fn key(&self) -> i64 {
        self.descriptor.key
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

impl std::fmt::Debug for ResolvedMigration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedMigration")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Compiled-in migrations keyed by file stem, built once at startup.
///
/// Lookups that miss fall back to reading the migration file as a manifest.
#[derive(Default, Clone)]
pub struct MigrationRegistry {
    units: HashMap<String, Arc<dyn Migration>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation under a file stem such as `4_deploy_vault`.
    pub fn register(&mut self, stem: impl Into<String>, unit: Arc<dyn Migration>) {
        self.units.insert(stem.into(), unit);
    }

    pub fn contains(&self, stem: &str) -> bool {
        self.units.contains_key(stem)
    }

    pub fn resolve(
        &self,
        descriptor: &MigrationDescriptor,
    ) -> Result<ResolvedMigration, MigrationError> {
        if let Some(unit) = self.units.get(descriptor.stem()) {
            return Ok(ResolvedMigration::new(descriptor.clone(), unit.clone()));
        }

        match ManifestMigration::load(&descriptor.path) {
            Ok(manifest) => Ok(ResolvedMigration::new(
                descriptor.clone(),
                Arc::new(manifest),
            )),
            Err(ManifestError::Read { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Err(MigrationError::UnknownMigration {
                    name: descriptor.name.clone(),
                })
            }
            Err(source) => Err(MigrationError::InvalidManifest {
                name: descriptor.name.clone(),
                source,
            }),
        }
    }

    /// Resolve every descriptor, failing on the first one without an implementation.
    pub fn resolve_all(
        &self,
        descriptors: &[MigrationDescriptor],
    ) -> Result<Vec<ResolvedMigration>, MigrationError> {
        descriptors.iter().map(|d| self.resolve(d)).collect()
    }
}
