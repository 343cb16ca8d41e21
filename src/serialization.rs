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

//! World snapshots: save/restore to the bit-exact JSON document shape
//! (`spec.md` §6), plus a version migration registry.
//!
//! Grounded in the teacher's `Scene`/`SerializationRegistry` pair
//! (`src/serialization.rs`), which was an MVP stub deferring component
//! reflection to future work. Rebuilt against this crate's schema-driven
//! components, which carry their own field list and so need no `Reflect`
//! trait object to snapshot: a component is just its `ComponentDef` walked
//! field by field.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::component::{PrimitiveType, Value};
use crate::entity::Entity;
use crate::error::{EcsError, Result};
use crate::world::World;

pub const CURRENT_VERSION: &str = "1.1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: u32,
    pub components: Map<String, Json>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationSnapshot {
    #[serde(rename = "type")]
    pub type_name: String,
    pub source: u32,
    pub target: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Json>,
}

/// Bit-exact document shape described by `spec.md` §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub version: String,
    pub tick: u32,
    pub entities: Vec<EntitySnapshot>,
    pub resources: Map<String, Json>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<RelationSnapshot>,
}

fn value_to_json(value: &Value) -> Option<Json> {
    match value {
        Value::Bool(b) => Some(Json::Bool(*b)),
        Value::I8(v) => Some(Json::from(*v)),
        Value::I16(v) => Some(Json::from(*v)),
        Value::I32(v) => Some(Json::from(*v)),
        Value::U8(v) => Some(Json::from(*v)),
        Value::U16(v) => Some(Json::from(*v)),
        Value::U32(v) => Some(Json::from(*v)),
        Value::F32(v) => serde_json::Number::from_f64(*v as f64).map(Json::Number),
        Value::F64(v) => serde_json::Number::from_f64(*v).map(Json::Number),
        Value::Entity(e) => Some(Json::from(e.to_bits())),
        // Pool indices are not part of the snapshot (spec.md §6).
        Value::Str(_) => None,
    }
}

fn json_to_value(json: &Json, primitive: PrimitiveType) -> Option<Value> {
    match primitive {
        PrimitiveType::Bool => json.as_bool().map(Value::Bool),
        PrimitiveType::I8 => json.as_i64().map(|v| Value::I8(v as i8)),
        PrimitiveType::I16 => json.as_i64().map(|v| Value::I16(v as i16)),
        PrimitiveType::I32 => json.as_i64().map(|v| Value::I32(v as i32)),
        PrimitiveType::U8 => json.as_u64().map(|v| Value::U8(v as u8)),
        PrimitiveType::U16 => json.as_u64().map(|v| Value::U16(v as u16)),
        PrimitiveType::U32 => json.as_u64().map(|v| Value::U32(v as u32)),
        PrimitiveType::F32 => json.as_f64().map(|v| Value::F32(v as f32)),
        PrimitiveType::F64 => json.as_f64().map(Value::F64),
        PrimitiveType::Entity => json.as_u64().map(|v| Value::Entity(Entity::from_bits(v as u32))),
        PrimitiveType::String => None,
    }
}

/// Produce a snapshot of everything live in `world`: entities (components
/// minus string-pool fields), resources, and relations.
pub fn save(world: &World) -> Result<SnapshotDocument> {
    let registry = world.registry();
    let mut entities = Vec::new();

    for entity in world.allocator().iter_live() {
        let record = world.allocator().record(entity).expect("live entity has a record");
        let archetype = world.graph().get(record.archetype);
        let mut components = Map::new();

        for &component in &archetype.component_indices {
            let def = registry.by_index(component)?;
            if def.is_tag {
                components.insert(def.name.clone(), Json::Object(Map::new()));
                continue;
            }
            let mut fields = Map::new();
            for (field_index, field) in def.fields.iter().enumerate() {
                if field.primitive == PrimitiveType::String {
                    continue;
                }
                if let Some(value) = world.field_value_by_index(entity, component, field_index) {
                    if let Some(json) = value_to_json(&value) {
                        fields.insert(field.name.clone(), json);
                    }
                }
            }
            components.insert(def.name.clone(), Json::Object(fields));
        }

        entities.push(EntitySnapshot {
            id: entity.to_bits(),
            components,
        });
    }

    let mut resources = Map::new();
    for (key, value) in world.resources().json_iter() {
        resources.insert(key.to_string(), value.clone());
    }

    let relation_type_names: Vec<String> = world.relations().type_names().map(str::to_string).collect();
    let mut relations = Vec::new();
    for entity in world.allocator().iter_live() {
        for name in &relation_type_names {
            for target in world.relation_targets(entity, name) {
                let data = world
                    .relation_data(entity, name, target)
                    .filter(|d| !d.is_empty())
                    .map(|_| Json::Null);
                relations.push(RelationSnapshot {
                    type_name: name.clone(),
                    source: entity.to_bits(),
                    target: target.to_bits(),
                    data,
                });
            }
        }
    }

    Ok(SnapshotDocument {
        version: CURRENT_VERSION.to_string(),
        tick: world.tick(),
        entities,
        resources,
        relations,
    })
}

/// Which kinds of unknown references a restore tolerates instead of
/// failing outright (`spec.md` §6 "Deserializer options").
#[derive(Debug, Clone, Copy, Default)]
pub struct DeserializerOptions {
    pub skip_unknown_components: bool,
    pub skip_unknown_fields: bool,
    pub skip_unknown_relations: bool,
}

/// A migration step between two adjacent snapshot versions.
pub trait Migration: Send + Sync {
    fn from_version(&self) -> &str;
    fn to_version(&self) -> &str;
    fn migrate(&self, doc: Json) -> Result<Json>;
}

struct FnMigration<F> {
    from: String,
    to: String,
    f: F,
}

impl<F: Fn(Json) -> Result<Json> + Send + Sync> Migration for FnMigration<F> {
    fn from_version(&self) -> &str {
        &self.from
    }
    fn to_version(&self) -> &str {
        &self.to
    }
    fn migrate(&self, doc: Json) -> Result<Json> {
        (self.f)(doc)
    }
}

fn boxed(from: &str, to: &str, f: impl Fn(Json) -> Result<Json> + Send + Sync + 'static) -> Box<dyn Migration> {
    Box::new(FnMigration {
        from: from.to_string(),
        to: to.to_string(),
        f,
    })
}

/// Constructors for the migration helpers `spec.md` §6 names: add/remove/
/// rename field, rename component, transform field.
pub mod migrations {
    use super::*;

    pub fn add_field(from: &str, to: &str, component: &str, field: &str, default: Json) -> Box<dyn Migration> {
        let component = component.to_string();
        let field = field.to_string();
        boxed(from, to, move |mut doc| {
            if let Some(entities) = doc.get_mut("entities").and_then(Json::as_array_mut) {
                for entity in entities {
                    if let Some(comp) = entity
                        .get_mut("components")
                        .and_then(|c| c.get_mut(&component))
                        .and_then(Json::as_object_mut)
                    {
                        comp.entry(field.clone()).or_insert_with(|| default.clone());
                    }
                }
            }
            Ok(doc)
        })
    }

    pub fn remove_field(from: &str, to: &str, component: &str, field: &str) -> Box<dyn Migration> {
        let component = component.to_string();
        let field = field.to_string();
        boxed(from, to, move |mut doc| {
            if let Some(entities) = doc.get_mut("entities").and_then(Json::as_array_mut) {
                for entity in entities {
                    if let Some(comp) = entity
                        .get_mut("components")
                        .and_then(|c| c.get_mut(&component))
                        .and_then(Json::as_object_mut)
                    {
                        comp.remove(&field);
                    }
                }
            }
            Ok(doc)
        })
    }

    pub fn rename_field(from: &str, to: &str, component: &str, old_name: &str, new_name: &str) -> Box<dyn Migration> {
        let component = component.to_string();
        let old_name = old_name.to_string();
        let new_name = new_name.to_string();
        boxed(from, to, move |mut doc| {
            if let Some(entities) = doc.get_mut("entities").and_then(Json::as_array_mut) {
                for entity in entities {
                    if let Some(comp) = entity
                        .get_mut("components")
                        .and_then(|c| c.get_mut(&component))
                        .and_then(Json::as_object_mut)
                    {
                        if let Some(value) = comp.remove(&old_name) {
                            comp.insert(new_name.clone(), value);
                        }
                    }
                }
            }
            Ok(doc)
        })
    }

    pub fn rename_component(from: &str, to: &str, old_name: &str, new_name: &str) -> Box<dyn Migration> {
        let old_name = old_name.to_string();
        let new_name = new_name.to_string();
        boxed(from, to, move |mut doc| {
            if let Some(entities) = doc.get_mut("entities").and_then(Json::as_array_mut) {
                for entity in entities {
                    if let Some(comps) = entity.get_mut("components").and_then(Json::as_object_mut) {
                        if let Some(value) = comps.remove(&old_name) {
                            comps.insert(new_name.clone(), value);
                        }
                    }
                }
            }
            Ok(doc)
        })
    }

    pub fn transform_field(
        from: &str,
        to: &str,
        component: &str,
        field: &str,
        transform: impl Fn(Json) -> Json + Send + Sync + 'static,
    ) -> Box<dyn Migration> {
        let component = component.to_string();
        let field = field.to_string();
        boxed(from, to, move |mut doc| {
            if let Some(entities) = doc.get_mut("entities").and_then(Json::as_array_mut) {
                for entity in entities {
                    if let Some(comp) = entity
                        .get_mut("components")
                        .and_then(|c| c.get_mut(&component))
                        .and_then(Json::as_object_mut)
                    {
                        if let Some(value) = comp.remove(&field) {
                            comp.insert(field.clone(), transform(value));
                        }
                    }
                }
            }
            Ok(doc)
        })
    }
}

/// Finds a chain of registered migrations from one version to another via
/// breadth-first search over the `from_version -> to_version` edges, then
/// applies them in order.
#[derive(Default)]
pub struct MigrationRegistry {
    steps: Vec<Box<dyn Migration>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, migration: Box<dyn Migration>) {
        self.steps.push(migration);
    }

    fn find_path(&self, from: &str, to: &str) -> Option<Vec<usize>> {
        if from == to {
            return Some(Vec::new());
        }
        let mut queue = std::collections::VecDeque::new();
        let mut visited = std::collections::HashSet::new();
        queue.push_back((from.to_string(), Vec::new()));
        visited.insert(from.to_string());

        while let Some((current, path)) = queue.pop_front() {
            for (idx, step) in self.steps.iter().enumerate() {
                if step.from_version() != current {
                    continue;
                }
                let next = step.to_version().to_string();
                let mut next_path = path.clone();
                next_path.push(idx);
                if next == to {
                    return Some(next_path);
                }
                if visited.insert(next.clone()) {
                    queue.push_back((next, next_path));
                }
            }
        }
        None
    }

    /// Migrate `doc` from `found_version` up to [`CURRENT_VERSION`]. A
    /// no-op if they already match.
    pub fn migrate(&self, mut doc: Json, found_version: &str) -> Result<Json> {
        if found_version == CURRENT_VERSION {
            return Ok(doc);
        }
        let path = self.find_path(found_version, CURRENT_VERSION).ok_or_else(|| {
            if self.steps.is_empty() {
                EcsError::VersionMismatch {
                    found: found_version.to_string(),
                    expected: CURRENT_VERSION.to_string(),
                }
            } else {
                EcsError::NoMigrationPath {
                    from: found_version.to_string(),
                    to: CURRENT_VERSION.to_string(),
                }
            }
        })?;
        for idx in path {
            doc = self.steps[idx].migrate(doc)?;
        }
        Ok(doc)
    }
}

/// Restore `doc` into `world`, spawning fresh entities (handles are not
/// preserved bit-exact; an injection map from old id to new handle is
/// returned so callers can translate any external references).
pub fn restore(
    world: &mut World,
    doc: &SnapshotDocument,
    migrations: &MigrationRegistry,
    options: &DeserializerOptions,
) -> Result<FxHashMap<u32, Entity>> {
    let migrated = migrations.migrate(serde_json::to_value(doc)?, &doc.version)?;
    let doc: SnapshotDocument =
        serde_json::from_value(migrated).map_err(|e| EcsError::DeserializationError(e.to_string()))?;

    let mut injection = FxHashMap::default();
    let mut pending_entity_fields: Vec<(Entity, usize, String, u32)> = Vec::new();

    for entity_snapshot in &doc.entities {
        let mut names = Vec::new();
        for component_name in entity_snapshot.components.keys() {
            if world.component_index(component_name).is_some() {
                names.push(component_name.clone());
            } else if !options.skip_unknown_components {
                return Err(EcsError::UnknownComponent(component_name.clone()));
            }
        }
        let new_entity = world.spawn_named(&names)?;
        injection.insert(entity_snapshot.id, new_entity);
    }

    for entity_snapshot in &doc.entities {
        let new_entity = injection[&entity_snapshot.id];
        for (component_name, fields) in &entity_snapshot.components {
            let Some(component) = world.component_index(component_name) else {
                continue;
            };
            let def = world.component_def(component)?.clone();
            if def.is_tag {
                continue;
            }
            let Some(fields) = fields.as_object() else {
                continue;
            };
            let mut partial = FxHashMap::default();
            for (field_name, json_value) in fields {
                let Some(field) = def.field(field_name) else {
                    if !options.skip_unknown_fields {
                        return Err(EcsError::UnknownField {
                            component: component_name.clone(),
                            field: field_name.clone(),
                        });
                    }
                    continue;
                };
                if field.primitive == PrimitiveType::Entity {
                    if let Some(raw) = json_value.as_u64() {
                        pending_entity_fields.push((new_entity, component, field_name.clone(), raw as u32));
                    }
                    continue;
                }
                if let Some(value) = json_to_value(json_value, field.primitive) {
                    partial.insert(field_name.clone(), value);
                }
            }
            if !partial.is_empty() {
                world.set(new_entity, component, partial)?;
            }
        }
    }

    for (holder, component, field_name, old_target) in pending_entity_fields {
        let target = injection.get(&old_target).copied().unwrap_or(crate::entity::NULL_ENTITY);
        world.set_entity_ref(holder, component, &field_name, target)?;
    }

    for (key, value) in &doc.resources {
        world.set_resource_json(key.clone(), value.clone());
    }

    for relation in &doc.relations {
        let (Some(&source), Some(&target)) = (injection.get(&relation.source), injection.get(&relation.target))
        else {
            continue;
        };
        match world.relate(source, &relation.type_name, target, FxHashMap::default()) {
            Ok(()) => {}
            Err(EcsError::UnknownRelation(_)) if options.skip_unknown_relations => {}
            Err(err) => return Err(err),
        }
    }

    Ok(injection)
}
