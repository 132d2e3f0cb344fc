use std::collections::{BTreeMap, BTreeSet};

use pkgwarden_core::{PackageRecord, PackageUpdate, UpdateSet};
use serde::{Deserialize, Serialize};

/// Everything the core persists. Update sets own their package updates;
/// package records are referenced from them by key only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub packages: BTreeMap<String, PackageRecord>,
    #[serde(default)]
    pub update_sets: Vec<UpdateSet>,
    #[serde(default = "first_update_set_id")]
    pub next_update_set_id: u64,
}

impl Default for StateDocument {
    fn default() -> Self {
        Self {
            packages: BTreeMap::new(),
            update_sets: Vec::new(),
            next_update_set_id: first_update_set_id(),
        }
    }
}

impl StateDocument {
    pub fn package(&self, key: &str) -> Option<&PackageRecord> {
        self.packages.get(key)
    }

    pub fn upsert_package(&mut self, record: PackageRecord) {
        self.packages.insert(record.key.clone(), record);
    }

    /// Drops every package record whose key is not in `keep` and returns the
    /// removed keys.
    pub fn retain_packages(&mut self, keep: &BTreeSet<String>) -> Vec<String> {
        let removed = self
            .packages
            .keys()
            .filter(|key| !keep.contains(*key))
            .cloned()
            .collect::<Vec<_>>();
        for key in &removed {
            self.packages.remove(key);
        }
        removed
    }

    pub fn update_set(&self, id: u64) -> Option<&UpdateSet> {
        self.update_sets.iter().find(|set| set.id == id)
    }

    pub fn update_set_mut(&mut self, id: u64) -> Option<&mut UpdateSet> {
        self.update_sets.iter_mut().find(|set| set.id == id)
    }

    /// The oldest set that is neither done nor canceled.
    pub fn active_update_set(&self) -> Option<&UpdateSet> {
        self.update_sets.iter().find(|set| set.is_pending())
    }

    pub fn update_set_by_fingerprint(&self, fingerprint: &str) -> Option<&UpdateSet> {
        self.update_sets
            .iter()
            .find(|set| set.fingerprint == fingerprint)
    }

    pub fn update_set_by_fingerprint_mut(&mut self, fingerprint: &str) -> Option<&mut UpdateSet> {
        self.update_sets
            .iter_mut()
            .find(|set| set.fingerprint == fingerprint)
    }

    /// Cancels every pending set whose fingerprint differs from
    /// `fingerprint`. Done and already canceled sets are untouched.
    pub fn cancel_pending_except(&mut self, fingerprint: &str) -> Vec<u64> {
        self.update_sets
            .iter_mut()
            .filter(|set| set.fingerprint != fingerprint)
            .filter_map(|set| set.cancel().then_some(set.id))
            .collect()
    }

    pub fn create_update_set(
        &mut self,
        fingerprint: &str,
        packages: Vec<PackageUpdate>,
        created_at_unix: u64,
    ) -> u64 {
        let id = self.next_update_set_id;
        self.next_update_set_id += 1;

        let mut set = UpdateSet::new(id, fingerprint, created_at_unix);
        set.packages = packages;
        self.update_sets.push(set);
        id
    }

    pub fn pending_count(&self) -> usize {
        self.update_sets
            .iter()
            .filter(|set| set.is_pending())
            .count()
    }
}

fn first_update_set_id() -> u64 {
    1
}
