// In-memory registry backed by a concurrent map
// Used by tests and for ephemeral runs

use super::{validate_project_id, CustomDomainSet, DomainRegistry};
use crate::error::RegistryError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct MemoryRegistry {
    sets: Arc<DashMap<String, CustomDomainSet>>,
    writes: Arc<AtomicU64>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry with existing domain sets
    pub fn with_sets(sets: impl IntoIterator<Item = CustomDomainSet>) -> Self {
        let registry = Self::new();
        for set in sets {
            registry.sets.insert(set.project_id.clone(), set);
        }
        registry
    }

    /// Number of successful `put` calls so far
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DomainRegistry for MemoryRegistry {
    async fn get_all(&self) -> Result<BTreeMap<String, CustomDomainSet>, RegistryError> {
        Ok(self
            .sets
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }

    async fn get(&self, project_id: &str) -> Result<CustomDomainSet, RegistryError> {
        self.sets
            .get(project_id)
            .map(|set| set.clone())
            .ok_or_else(|| RegistryError::NotFound(project_id.to_string()))
    }

    async fn put(&self, project_id: &str, set: &CustomDomainSet) -> Result<(), RegistryError> {
        validate_project_id(project_id)?;

        let mut stored = set.clone();
        stored.project_id = project_id.to_string();
        self.sets.insert(project_id.to_string(), stored);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
