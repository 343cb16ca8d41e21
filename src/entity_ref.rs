// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tracks entity-typed field writes so the referenced handle can be
//! nullified when its target despawns, instead of dangling.
//!
//! The teacher has no equivalent (its components are generic Rust values,
//! so an `Entity` field is just data with no lifecycle tie-in). Grounded in
//! the teacher's dual forward/reverse `FxHashMap` index pattern from
//! `src/hierarchy.rs`, applied to `spec.md` §4.13's entity-ref nullification
//! requirement.

use rustc_hash::FxHashMap;

use crate::entity::{Entity, NULL_ENTITY};

/// One entity-typed field write: which (entity, component, field) holds a
/// reference, and what it currently points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RefKey {
    source: Entity,
    component: usize,
    field: usize,
}

/// Indexes entity-valued fields both by holder (for despawn cleanup of the
/// holder itself) and by target (for nullification when the target
/// despawns).
#[derive(Default)]
pub struct EntityRefStore {
    targets: FxHashMap<RefKey, Entity>,
    by_source: FxHashMap<Entity, Vec<RefKey>>,
    by_target: FxHashMap<Entity, Vec<RefKey>>,
}

impl EntityRefStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or update) that `source`'s `(component, field)` now points
    /// at `target`. Pass `NULL_ENTITY` to clear without removing the
    /// tracking entry outright.
    pub fn set(&mut self, source: Entity, component: usize, field: usize, target: Entity) {
        let key = RefKey { source, component, field };

        if let Some(old_target) = self.targets.get(&key).copied() {
            if let Some(v) = self.by_target.get_mut(&old_target) {
                v.retain(|k| k != &key);
            }
        } else {
            self.by_source.entry(source).or_default().push(key);
        }

        self.targets.insert(key, target);
        if target != NULL_ENTITY {
            self.by_target.entry(target).or_default().push(key);
        }
    }

    pub fn get(&self, source: Entity, component: usize, field: usize) -> Entity {
        self.targets
            .get(&RefKey { source, component, field })
            .copied()
            .unwrap_or(NULL_ENTITY)
    }

    /// Called when `target` despawns: nullifies every field that pointed at
    /// it and returns the `(source, component, field)` triples that changed
    /// so the caller can write `NULL_ENTITY` into the archetype column.
    pub fn nullify_target(&mut self, target: Entity) -> Vec<(Entity, usize, usize)> {
        let Some(keys) = self.by_target.remove(&target) else {
            return Vec::new();
        };
        let mut changed = Vec::with_capacity(keys.len());
        for key in keys {
            self.targets.insert(key, NULL_ENTITY);
            changed.push((key.source, key.component, key.field));
        }
        changed
    }

    /// Called when `source` despawns: drops all tracking for fields it
    /// held, without touching the targets' back-references beyond removing
    /// this source's entries.
    pub fn remove_source(&mut self, source: Entity) {
        let Some(keys) = self.by_source.remove(&source) else {
            return;
        };
        for key in keys {
            if let Some(target) = self.targets.remove(&key) {
                if let Some(v) = self.by_target.get_mut(&target) {
                    v.retain(|k| k != &key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(i: u32) -> Entity {
        Entity::from_raw(i, 0)
    }

    #[test]
    fn set_and_get_roundtrip() {
        let mut store = EntityRefStore::new();
        store.set(e(1), 0, 0, e(2));
        assert_eq!(store.get(e(1), 0, 0), e(2));
    }

    #[test]
    fn despawning_target_nullifies_holder_field() {
        let mut store = EntityRefStore::new();
        store.set(e(1), 0, 0, e(2));
        let changed = store.nullify_target(e(2));
        assert_eq!(changed, vec![(e(1), 0, 0)]);
        assert_eq!(store.get(e(1), 0, 0), NULL_ENTITY);
    }

    #[test]
    fn despawning_source_drops_its_tracking() {
        let mut store = EntityRefStore::new();
        store.set(e(1), 0, 0, e(2));
        store.remove_source(e(1));
        assert!(store.nullify_target(e(2)).is_empty());
    }

    #[test]
    fn re_pointing_field_updates_target_index() {
        let mut store = EntityRefStore::new();
        store.set(e(1), 0, 0, e(2));
        store.set(e(1), 0, 0, e(3));
        assert!(store.nullify_target(e(2)).is_empty());
        assert_eq!(store.nullify_target(e(3)), vec![(e(1), 0, 0)]);
    }
}
