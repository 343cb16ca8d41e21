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

//! Typed directed relations between entities, with cascade-delete policy.
//!
//! Grounded in the teacher's `Hierarchy` parent/children secondary-index
//! pair (`src/hierarchy.rs`), generalized from the single hardcoded
//! parent-child relation to an arbitrary registry of named relation types
//! (`spec.md` §4.12), each with its own exclusivity, symmetry, and cascade
//! policy.

use rustc_hash::FxHashMap;

use crate::component::Value;
use crate::entity::Entity;
use crate::error::{EcsError, Result};

/// What happens to a relation edge when one of its endpoints despawns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadePolicy {
    /// Leave the opposite endpoint alone; just drop the edge.
    None,
    /// Despawn the target when the source despawns.
    CascadeTarget,
    /// Despawn the source when the target despawns.
    CascadeSource,
}

#[derive(Debug, Clone)]
pub struct RelationTypeDef {
    pub index: usize,
    pub name: String,
    /// A source may hold at most one outgoing edge of this type.
    pub exclusive: bool,
    /// Relating `a -> b` implicitly relates `b -> a` too.
    pub symmetric: bool,
    pub cascade: CascadePolicy,
}

#[derive(Default)]
struct RelationTypeRegistry {
    defs: Vec<RelationTypeDef>,
    by_name: FxHashMap<String, usize>,
}

impl RelationTypeRegistry {
    fn register(
        &mut self,
        name: impl Into<String>,
        exclusive: bool,
        symmetric: bool,
        cascade: CascadePolicy,
    ) -> Result<usize> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(EcsError::DuplicateRegistration(name));
        }
        let index = self.defs.len();
        self.defs.push(RelationTypeDef {
            index,
            name: name.clone(),
            exclusive,
            symmetric,
            cascade,
        });
        self.by_name.insert(name, index);
        Ok(index)
    }

    fn by_name(&self, name: &str) -> Result<&RelationTypeDef> {
        let idx = self
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| EcsError::UnknownRelation(name.to_string()))?;
        Ok(&self.defs[idx])
    }

    fn by_index(&self, index: usize) -> Option<&RelationTypeDef> {
        self.defs.get(index)
    }
}

type Edge = (Entity, usize, Entity);

/// `(source, relation_type, target) -> Option<data>` store with reverse
/// indices for fast neighbor lookup in both directions.
#[derive(Default)]
pub struct RelationStore {
    types: RelationTypeRegistry,
    data: FxHashMap<Edge, FxHashMap<String, Value>>,
    by_source: FxHashMap<(Entity, usize), Vec<Entity>>,
    by_target: FxHashMap<(Entity, usize), Vec<Entity>>,
}

impl RelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_type(
        &mut self,
        name: impl Into<String>,
        exclusive: bool,
        symmetric: bool,
        cascade: CascadePolicy,
    ) -> Result<usize> {
        self.types.register(name, exclusive, symmetric, cascade)
    }

    pub fn type_index(&self, name: &str) -> Result<usize> {
        Ok(self.types.by_name(name)?.index)
    }

    fn link(&mut self, source: Entity, rel: usize, target: Entity) {
        let sources = self.by_source.entry((source, rel)).or_default();
        if !sources.contains(&target) {
            sources.push(target);
        }
        let targets = self.by_target.entry((target, rel)).or_default();
        if !targets.contains(&source) {
            targets.push(source);
        }
    }

    fn unlink(&mut self, source: Entity, rel: usize, target: Entity) {
        if let Some(v) = self.by_source.get_mut(&(source, rel)) {
            v.retain(|&t| t != target);
        }
        if let Some(v) = self.by_target.get_mut(&(target, rel)) {
            v.retain(|&s| s != source);
        }
    }

    /// Create `source -rel-> target`. If the type is exclusive, any
    /// existing outgoing edge of this type from `source` is replaced. If
    /// symmetric, the reverse edge is created too.
    pub fn relate(
        &mut self,
        source: Entity,
        rel_name: &str,
        target: Entity,
        data: FxHashMap<String, Value>,
    ) -> Result<()> {
        let def = self.types.by_name(rel_name)?.clone();
        let rel = def.index;

        if def.exclusive {
            let existing: Vec<Entity> = self
                .by_source
                .get(&(source, rel))
                .cloned()
                .unwrap_or_default();
            for old_target in existing {
                if old_target != target {
                    self.unlink(source, rel, old_target);
                    self.data.remove(&(source, rel, old_target));
                    if def.symmetric {
                        self.unlink(old_target, rel, source);
                        self.data.remove(&(old_target, rel, source));
                    }
                }
            }
        }

        self.link(source, rel, target);
        self.data.insert((source, rel, target), data.clone());
        if def.symmetric {
            self.link(target, rel, source);
            self.data.insert((target, rel, source), data);
        }
        Ok(())
    }

    pub fn has(&self, source: Entity, rel_name: &str, target: Entity) -> bool {
        let Ok(def) = self.types.by_name(rel_name) else {
            return false;
        };
        self.data.contains_key(&(source, def.index, target))
    }

    /// First target for an exclusive relation (or simply the first edge
    /// recorded, for a non-exclusive one).
    pub fn get_target(&self, source: Entity, rel_name: &str) -> Option<Entity> {
        let def = self.types.by_name(rel_name).ok()?;
        self.by_source
            .get(&(source, def.index))
            .and_then(|v| v.first().copied())
    }

    pub fn get_targets(&self, source: Entity, rel_name: &str) -> Vec<Entity> {
        let Ok(def) = self.types.by_name(rel_name) else {
            return Vec::new();
        };
        self.by_source
            .get(&(source, def.index))
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_sources(&self, target: Entity, rel_name: &str) -> Vec<Entity> {
        let Ok(def) = self.types.by_name(rel_name) else {
            return Vec::new();
        };
        self.by_target
            .get(&(target, def.index))
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_data(&self, source: Entity, rel_name: &str, target: Entity) -> Option<&FxHashMap<String, Value>> {
        let def = self.types.by_name(rel_name).ok()?;
        self.data.get(&(source, def.index, target))
    }

    pub fn set_data(
        &mut self,
        source: Entity,
        rel_name: &str,
        target: Entity,
        data: FxHashMap<String, Value>,
    ) -> Result<()> {
        let rel = self.types.by_name(rel_name)?.index;
        if let Some(existing) = self.data.get_mut(&(source, rel, target)) {
            *existing = data;
            Ok(())
        } else {
            Err(EcsError::UnknownRelation(rel_name.to_string()))
        }
    }

    pub fn unrelate(&mut self, source: Entity, rel_name: &str, target: Entity) -> Result<()> {
        let def = self.types.by_name(rel_name)?.clone();
        self.unlink(source, def.index, target);
        self.data.remove(&(source, def.index, target));
        if def.symmetric {
            self.unlink(target, def.index, source);
            self.data.remove(&(target, def.index, source));
        }
        Ok(())
    }

    /// Remove every edge touching `entity` and return the set of entities
    /// that must be cascade-despawned as a consequence (targets for
    /// `CascadeTarget` relations where `entity` was the source, sources for
    /// `CascadeSource` relations where `entity` was the target).
    pub fn remove_entity(&mut self, entity: Entity) -> Vec<Entity> {
        let mut cascades = Vec::new();

        for def in self.types.defs.clone() {
            let rel = def.index;
            if let Some(targets) = self.by_source.remove(&(entity, rel)) {
                for target in &targets {
                    self.data.remove(&(entity, rel, *target));
                    if let Some(v) = self.by_target.get_mut(&(*target, rel)) {
                        v.retain(|&s| s != entity);
                    }
                    if def.cascade == CascadePolicy::CascadeTarget {
                        cascades.push(*target);
                    }
                }
            }
            if let Some(sources) = self.by_target.remove(&(entity, rel)) {
                for source in &sources {
                    self.data.remove(&(*source, rel, entity));
                    if let Some(v) = self.by_source.get_mut(&(*source, rel)) {
                        v.retain(|&t| t != entity);
                    }
                    if def.cascade == CascadePolicy::CascadeSource {
                        cascades.push(*source);
                    }
                }
            }
        }

        cascades
    }

    pub fn type_def(&self, index: usize) -> Option<&RelationTypeDef> {
        self.types.by_index(index)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.defs.iter().map(|d| d.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(i: u32) -> Entity {
        Entity::from_raw(i, 0)
    }

    #[test]
    fn exclusive_relate_replaces_previous_target() {
        let mut store = RelationStore::new();
        store
            .register_type("equipped_by", true, false, CascadePolicy::None)
            .unwrap();
        store.relate(e(1), "equipped_by", e(2), FxHashMap::default()).unwrap();
        store.relate(e(1), "equipped_by", e(3), FxHashMap::default()).unwrap();
        assert!(!store.has(e(1), "equipped_by", e(2)));
        assert!(store.has(e(1), "equipped_by", e(3)));
    }

    #[test]
    fn symmetric_relate_creates_reverse_edge() {
        let mut store = RelationStore::new();
        store
            .register_type("allied_with", false, true, CascadePolicy::None)
            .unwrap();
        store.relate(e(1), "allied_with", e(2), FxHashMap::default()).unwrap();
        assert!(store.has(e(2), "allied_with", e(1)));
    }

    #[test]
    fn cascade_target_reports_entities_to_despawn() {
        let mut store = RelationStore::new();
        store
            .register_type("owns", false, false, CascadePolicy::CascadeTarget)
            .unwrap();
        store.relate(e(1), "owns", e(2), FxHashMap::default()).unwrap();
        let cascades = store.remove_entity(e(1));
        assert_eq!(cascades, vec![e(2)]);
    }

    #[test]
    fn remove_entity_cleans_up_both_indices() {
        let mut store = RelationStore::new();
        store
            .register_type("contains", false, false, CascadePolicy::None)
            .unwrap();
        store.relate(e(1), "contains", e(2), FxHashMap::default()).unwrap();
        store.remove_entity(e(2));
        assert!(store.get_targets(e(1), "contains").is_empty());
        assert!(!store.has(e(1), "contains", e(2)));
    }
}
