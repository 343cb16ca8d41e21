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

//! Queries, views, and the archetype-list cache that resolves them.
//!
//! Grounded in the teacher's `QuerySignature`/`CachedQueryResult` pair
//! (`src/query.rs`), generalized from compile-time `TypeId` filters to
//! runtime component-index masks plus user predicates over named fields.

use rustc_hash::FxHashMap;

use crate::archetype::{Archetype, ChangeFlag};
use crate::archetype_graph::ArchetypeGraph;
use crate::component::{ComponentRegistry, Value};
use crate::entity::Entity;
use crate::error::Result;
use crate::mask::{ChangeMask, Mask};

/// Which change states a query's change filter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFilter {
    Added,
    Modified,
    Any,
}

/// A user predicate over one resident (component, field).
pub struct Predicate {
    pub component: usize,
    pub field: usize,
    pub test: Box<dyn Fn(&Value) -> bool + Send + Sync>,
}

/// Declared include/exclude masks, change criteria, and predicates.
#[derive(Default)]
pub struct QueryDescriptor {
    pub with: Mask,
    pub without: Mask,
    pub change_filter: Option<ChangeFilter>,
    pub changed_components_mask: Option<ChangeMask>,
    pub predicates: Vec<Predicate>,
}

impl QueryDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, component: usize) -> Self {
        self.with.set(component);
        self
    }

    pub fn without(mut self, component: usize) -> Self {
        self.without.set(component);
        self
    }

    pub fn changed(mut self) -> Self {
        self.change_filter = Some(ChangeFilter::Any);
        self
    }

    pub fn added(mut self) -> Self {
        self.change_filter = Some(ChangeFilter::Added);
        self
    }

    pub fn modified(mut self) -> Self {
        self.change_filter = Some(ChangeFilter::Modified);
        self
    }

    /// Narrow change detection to specific components.
    pub fn changed_component(mut self, component: usize) -> Self {
        self.change_filter.get_or_insert(ChangeFilter::Any);
        let mask = self.changed_components_mask.get_or_insert(ChangeMask::EMPTY);
        mask.set(component);
        self
    }

    pub fn predicate(
        mut self,
        component: usize,
        field: usize,
        test: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicates.push(Predicate {
            component,
            field,
            test: Box::new(test),
        });
        self
    }

    /// Cache key: only the include/exclude masks participate.
    fn cache_key(&self) -> (Mask, Mask) {
        (self.with.clone(), self.without.clone())
    }

    fn has_filters(&self) -> bool {
        self.change_filter.is_some() || !self.predicates.is_empty()
    }
}

/// Cached resolution of `(with, without) -> matching archetypes`, invalidated
/// by archetype-count drift (archetypes are never destroyed, so a count
/// mismatch is both necessary and sufficient to detect staleness).
struct CachedEntry {
    archetypes: Vec<usize>,
    archetype_count_when_computed: usize,
}

#[derive(Default)]
pub struct QueryCache {
    entries: FxHashMap<(Mask, Mask), CachedEntry>,
    hits: u64,
    misses: u64,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, desc: &QueryDescriptor, graph: &ArchetypeGraph) -> Vec<usize> {
        let key = desc.cache_key();
        if let Some(entry) = self.entries.get(&key) {
            if entry.archetype_count_when_computed == graph.len() {
                self.hits += 1;
                return entry.archetypes.clone();
            }
        }
        self.misses += 1;
        let archetypes = graph.matching(&desc.with, &desc.without);
        self.entries.insert(
            key,
            CachedEntry {
                archetypes: archetypes.clone(),
                archetype_count_when_computed: graph.len(),
            },
        );
        archetypes
    }

    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

/// A read/mutate handle to one archetype's rows matching a query.
pub struct View<'a> {
    pub archetype_id: usize,
    archetype: &'a Archetype,
    registry: &'a ComponentRegistry,
    change_filter: Option<ChangeFilter>,
    changed_components_mask: Option<ChangeMask>,
    predicates: &'a [Predicate],
}

impl<'a> View<'a> {
    pub fn new(
        archetype_id: usize,
        archetype: &'a Archetype,
        registry: &'a ComponentRegistry,
        desc: &'a QueryDescriptor,
    ) -> Self {
        Self {
            archetype_id,
            archetype,
            registry,
            change_filter: desc.change_filter,
            changed_components_mask: desc.changed_components_mask,
            predicates: &desc.predicates,
        }
    }

    pub fn row_count(&self) -> usize {
        self.archetype.count()
    }

    pub fn entity(&self, row: usize) -> Entity {
        self.archetype.entity(row)
    }

    pub fn get_change_flag(&self, row: usize) -> ChangeFlag {
        self.archetype.change_flag(row)
    }

    pub fn has_component_changed(&self, row: usize, component: usize) -> bool {
        self.archetype.component_change_mask(row).get(component)
    }

    pub fn column(&self, component: usize, field: &str) -> Result<&crate::archetype::Column> {
        let def = self.registry.by_index(component)?;
        let field_idx = def.field_index(field).ok_or_else(|| {
            crate::error::EcsError::ColumnNotFound {
                component: def.name.clone(),
                field: field.to_string(),
            }
        })?;
        self.archetype.field_column(component, field_idx)
    }

    fn matches_change_mask(&self, row_mask: ChangeMask) -> bool {
        match self.changed_components_mask {
            Some(narrow) => row_mask.intersects(narrow),
            None => !row_mask.is_empty(),
        }
    }

    pub fn matches_change_filter(&self, row: usize) -> bool {
        let Some(filter) = self.change_filter else {
            return true;
        };
        let flag = self.archetype.change_flag(row);
        let row_mask = self.archetype.component_change_mask(row);
        match filter {
            ChangeFilter::Added => flag == ChangeFlag::Added,
            ChangeFilter::Modified => {
                flag == ChangeFlag::Modified && self.matches_change_mask(row_mask)
            }
            ChangeFilter::Any => flag != ChangeFlag::None && self.matches_change_mask(row_mask),
        }
    }

    fn matches_predicates(&self, row: usize) -> bool {
        self.predicates.iter().all(|p| {
            self.archetype
                .field_column(p.component, p.field)
                .map(|col| (p.test)(&col.get(row)))
                .unwrap_or(false)
        })
    }

    pub fn matches(&self, row: usize) -> bool {
        self.matches_change_filter(row) && self.matches_predicates(row)
    }

    /// Fast path check: no filters at all means every row matches.
    pub fn is_unfiltered(&self) -> bool {
        self.change_filter.is_none() && self.predicates.is_empty()
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.row_count()).filter(move |&row| self.matches(row))
    }

    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.iter_rows().map(move |row| self.entity(row))
    }
}

/// A declared query, bound to a registry/graph/cache at resolve time.
pub struct Query {
    pub descriptor: QueryDescriptor,
}

impl Query {
    pub fn new(descriptor: QueryDescriptor) -> Self {
        Self { descriptor }
    }

    fn resolved_archetypes(&self, cache: &mut QueryCache, graph: &ArchetypeGraph) -> Vec<usize> {
        cache.resolve(&self.descriptor, graph)
    }

    pub fn run(
        &self,
        graph: &ArchetypeGraph,
        registry: &ComponentRegistry,
        cache: &mut QueryCache,
        mut callback: impl FnMut(&View),
    ) {
        for archetype_id in self.resolved_archetypes(cache, graph) {
            let archetype = graph.get(archetype_id);
            let view = View::new(archetype_id, archetype, registry, &self.descriptor);
            callback(&view);
        }
    }

    pub fn collect(
        &self,
        graph: &ArchetypeGraph,
        registry: &ComponentRegistry,
        cache: &mut QueryCache,
    ) -> Vec<Entity> {
        let mut out = Vec::new();
        self.run(graph, registry, cache, |view| {
            out.extend(view.iter());
        });
        out
    }

    pub fn count(
        &self,
        graph: &ArchetypeGraph,
        registry: &ComponentRegistry,
        cache: &mut QueryCache,
    ) -> usize {
        let mut total = 0;
        for archetype_id in self.resolved_archetypes(cache, graph) {
            let archetype = graph.get(archetype_id);
            if !self.descriptor.has_filters() {
                total += archetype.count();
            } else {
                let view = View::new(archetype_id, archetype, registry, &self.descriptor);
                total += view.iter_rows().count();
            }
        }
        total
    }

    pub fn first(
        &self,
        graph: &ArchetypeGraph,
        registry: &ComponentRegistry,
        cache: &mut QueryCache,
    ) -> Option<Entity> {
        for archetype_id in self.resolved_archetypes(cache, graph) {
            let archetype = graph.get(archetype_id);
            if !self.descriptor.has_filters() {
                if archetype.count() > 0 {
                    return Some(archetype.entity(0));
                }
                continue;
            }
            let view = View::new(archetype_id, archetype, registry, &self.descriptor);
            if let Some(row) = view.iter_rows().next() {
                return Some(view.entity(row));
            }
        }
        None
    }
}
