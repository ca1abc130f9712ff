//! In-memory store, loaded from a roster fixture

use super::{AvailabilityMap, ResourceQuery, ResourceStore, StoreError};
use crate::db::RosterFixture;
use async_trait::async_trait;
use sdk::types::{AvailabilityRecord, Resource};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
pub struct MemoryResourceStore {
    resources: Vec<Resource>,
    availability: HashMap<String, Vec<AvailabilityRecord>>,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: &RosterFixture) -> Self {
        let mut store = Self::new();
        for entry in &fixture.resources {
            store.insert(entry.resource.clone(), entry.availability.clone());
        }
        store
    }

    /// Add or replace a resource
    pub fn insert(&mut self, resource: Resource, availability: Vec<AvailabilityRecord>) {
        self.resources.retain(|r| r.id != resource.id);
        if availability.is_empty() {
            self.availability.remove(&resource.id);
        } else {
            self.availability.insert(resource.id.clone(), availability);
        }
        self.resources.push(resource);
        self.resources.sort_by(|a, b| a.name.cmp(&b.name));
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn find_resources(&self, query: &ResourceQuery) -> Result<Vec<Resource>, StoreError> {
        Ok(self
            .resources
            .iter()
            .filter(|r| query.matches(r))
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn availability(
        &self,
        ids: &[String],
        weeks: &BTreeSet<u32>,
    ) -> Result<AvailabilityMap, StoreError> {
        let mut map = AvailabilityMap::new();
        for id in ids {
            let Some(records) = self.availability.get(id) else {
                continue;
            };
            let mut selected: Vec<AvailabilityRecord> = records
                .iter()
                .filter(|rec| weeks.is_empty() || weeks.contains(&rec.week_number))
                .cloned()
                .collect();
            if selected.is_empty() {
                continue;
            }
            selected.sort_by_key(|rec| rec.week_number);
            map.insert(id.clone(), selected);
        }
        Ok(map)
    }
}
